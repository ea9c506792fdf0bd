//! Lead capture service.
//!
//! Wraps the core lead rules with persistence and notification: create
//! validates, stores, then queues a notification and returns the receipt
//! without waiting on delivery.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;

use agent_layer_core::lead::{LeadFilter, LeadReceipt, LeadRecord, LeadRequest, LeadStatus};
use agent_layer_core::store::Store;
use agent_layer_core::AgentError;

use crate::config::Config;
use crate::db;
use crate::notify::Notifier;
use crate::sqlite_store::SqliteStore;

#[derive(Clone)]
pub struct LeadService {
    store: Arc<dyn Store>,
    notifier: Notifier,
}

impl LeadService {
    pub fn new(store: Arc<dyn Store>, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    pub async fn create(&self, request: &LeadRequest) -> Result<LeadReceipt> {
        let lead = LeadRecord::from_request(request, Utc::now())?;
        self.store.insert_lead(&lead).await?;
        tracing::info!(
            lead_id = %lead.id,
            vertical = %lead.vertical,
            priority = %lead.priority,
            places = lead.place_ids.len(),
            "lead created"
        );
        self.notifier.notify(&lead);
        Ok(lead.receipt())
    }

    pub async fn get(&self, id: &str) -> Result<Option<LeadRecord>> {
        self.store.get_lead(id).await
    }

    /// Advance a lead's status. Unknown id → `NotFound`; backwards or
    /// same-status moves → `InvalidTransition`.
    pub async fn update_status(
        &self,
        id: &str,
        status: LeadStatus,
        assigned_to: Option<String>,
    ) -> Result<LeadRecord> {
        let mut lead = self
            .store
            .get_lead(id)
            .await?
            .ok_or_else(|| AgentError::not_found("lead", id))?;
        let from = lead.status;
        lead.advance(status, assigned_to, Utc::now())?;
        self.store.update_lead(&lead).await?;
        tracing::info!(lead_id = %lead.id, from = %from, to = %status, "lead status updated");
        Ok(lead)
    }

    pub async fn list(&self, filter: &LeadFilter) -> Result<Vec<LeadRecord>> {
        self.store.list_leads(filter).await
    }
}

/// `agent-layer leads list`.
pub async fn run_list(config: &Config, status: Option<LeadStatus>, limit: usize) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let filter = LeadFilter {
        status,
        limit,
        ..LeadFilter::default()
    };
    let leads = store.list_leads(&filter).await?;

    if leads.is_empty() {
        println!("No leads.");
    } else {
        println!(
            "{:<18} {:<10} {:<11} {:<10} {:<7} {:<28} CREATED",
            "ID", "TYPE", "VERTICAL", "STATUS", "PRIO", "EMAIL"
        );
        for lead in &leads {
            println!(
                "{:<18} {:<10} {:<11} {:<10} {:<7} {:<28} {}",
                lead.id,
                lead.action_type,
                lead.vertical,
                lead.status,
                lead.priority,
                lead.contact.email,
                lead.created_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    pool.close().await;
    Ok(())
}

/// `agent-layer leads status <id> <status> [--assign]`.
pub async fn run_status(
    config: &Config,
    id: &str,
    status: LeadStatus,
    assigned_to: Option<String>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone()));
    // status changes send no notifications
    let (notifier, _rx) = Notifier::channel();
    let service = LeadService::new(store, notifier);

    let lead = service.update_status(id, status, assigned_to).await?;
    println!("lead {}", lead.id);
    println!("  status: {}", lead.status);
    if let Some(who) = &lead.assigned_to {
        println!("  assigned to: {}", who);
    }
    println!("ok");

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_layer_core::lead::LeadPriority;
    use agent_layer_core::store::memory::InMemoryStore;

    fn service() -> (LeadService, tokio::sync::mpsc::UnboundedReceiver<LeadRecord>) {
        let (notifier, rx) = Notifier::channel();
        (LeadService::new(Arc::new(InMemoryStore::new()), notifier), rx)
    }

    fn request(body: serde_json::Value) -> LeadRequest {
        serde_json::from_value(body).unwrap()
    }

    #[tokio::test]
    async fn test_create_stores_and_notifies() {
        let (svc, mut rx) = service();
        let receipt = svc
            .create(&request(serde_json::json!({
                "type": "contact",
                "vertical": "clinic",
                "placeIds": ["p1"],
                "contact": {"email": "a@b.ca"}
            })))
            .await
            .unwrap();

        assert_eq!(receipt.status, "accepted");
        assert_eq!(receipt.priority, LeadPriority::High);
        assert_eq!(receipt.estimated_response, "Within 1 business day");
        assert_eq!(rx.recv().await.unwrap().id, receipt.id);
        assert!(svc.get(&receipt.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalid_email_is_rejected_before_storage() {
        let (svc, mut rx) = service();
        let err = svc
            .create(&request(serde_json::json!({
                "type": "match",
                "vertical": "food",
                "contact": {"email": "not-an-email"}
            })))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AgentError>(),
            Some(AgentError::Validation(_))
        ));
        assert!(rx.try_recv().is_err());
        assert!(svc.list(&LeadFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_moves_forward_only() {
        let (svc, _rx) = service();
        let receipt = svc
            .create(&request(serde_json::json!({
                "type": "book",
                "vertical": "clinic",
                "contact": {"email": "a@b.ca"}
            })))
            .await
            .unwrap();

        let lead = svc
            .update_status(&receipt.id, LeadStatus::Qualified, Some("sam".to_string()))
            .await
            .unwrap();
        assert_eq!(lead.status, LeadStatus::Qualified);
        assert_eq!(lead.assigned_to.as_deref(), Some("sam"));

        let err = svc
            .update_status(&receipt.id, LeadStatus::Contacted, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AgentError>(),
            Some(AgentError::InvalidTransition { .. })
        ));

        let err = svc
            .update_status("lead_missing", LeadStatus::Closed, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AgentError>(),
            Some(AgentError::NotFound { .. })
        ));
    }
}
