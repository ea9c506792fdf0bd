//! Out-of-band lead notifications.
//!
//! Lead creation hands the stored record to a [`Notifier`] and returns
//! immediately. A background task drains the queue and delivers:
//!
//! - a Slack webhook message, when `notifications.slack_webhook_url` is set;
//! - a confirmation e-mail, which is only logged (no provider is wired up).
//!
//! Delivery is best-effort. Failures are logged at `warn` and never retried.

use anyhow::{bail, Result};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;

use agent_layer_core::lead::{LeadAction, LeadPriority, LeadRecord};

use crate::config::NotificationsConfig;

const WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Sending half of the notification queue. Cheap to clone.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<LeadRecord>,
}

impl Notifier {
    /// Start the delivery task on the current tokio runtime.
    pub fn spawn(config: NotificationsConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(drain(rx, config));
        Self { tx }
    }

    /// A notifier whose queue the caller drains. Used by tests.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LeadRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue `lead` for delivery. Never blocks and never fails the caller.
    pub fn notify(&self, lead: &LeadRecord) {
        if self.tx.send(lead.clone()).is_err() {
            tracing::warn!(lead_id = %lead.id, "notification queue closed; dropping");
        }
    }
}

async fn drain(mut rx: mpsc::UnboundedReceiver<LeadRecord>, config: NotificationsConfig) {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "cannot build HTTP client; notifications disabled");
            return;
        }
    };

    while let Some(lead) = rx.recv().await {
        deliver(&client, &config, &lead).await;
    }
}

async fn deliver(client: &reqwest::Client, config: &NotificationsConfig, lead: &LeadRecord) {
    match &config.slack_webhook_url {
        Some(url) => match post_slack(client, url, &slack_message(lead)).await {
            Ok(()) => tracing::info!(lead_id = %lead.id, "slack notification sent"),
            Err(e) => tracing::warn!(lead_id = %lead.id, error = %e, "slack notification failed"),
        },
        None => tracing::debug!(lead_id = %lead.id, "slack webhook not configured"),
    }

    if config.email_api_key.is_some() {
        let (subject, _body) = confirmation_email(lead);
        tracing::info!(
            lead_id = %lead.id,
            to = %lead.contact.email,
            from = %config.from_email,
            subject,
            "confirmation email queued"
        );
    }
}

async fn post_slack(client: &reqwest::Client, url: &str, message: &Value) -> Result<()> {
    let resp = client.post(url).json(message).send().await?;
    if !resp.status().is_success() {
        bail!("Slack API error: HTTP {}", resp.status());
    }
    Ok(())
}

fn priority_marker(priority: LeadPriority) -> &'static str {
    match priority {
        LeadPriority::High => "🔴",
        LeadPriority::Medium => "🟡",
        LeadPriority::Low => "🟢",
    }
}

fn action_label(action: LeadAction) -> &'static str {
    match action {
        LeadAction::Match => "Get Matched",
        LeadAction::Shortlist => "Request Shortlist",
        LeadAction::Contact => "Contact Business",
        LeadAction::Book => "Book Appointment",
    }
}

/// Slack block-kit payload: header, contact and location sections, the
/// optional message, and a context footer with the lead id.
pub fn slack_message(lead: &LeadRecord) -> Value {
    let mut contact = format!(
        "*Contact:* {}\n*Email:* {}",
        lead.contact.name.as_deref().unwrap_or("Anonymous"),
        lead.contact.email
    );
    if let Some(phone) = &lead.contact.phone {
        contact.push_str(&format!("\n*Phone:* {}", phone));
    }

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": {
                "type": "plain_text",
                "text": format!("{} New Lead: {}", priority_marker(lead.priority), action_label(lead.action_type)),
            }
        }),
        json!({ "type": "section", "text": { "type": "mrkdwn", "text": contact } }),
        json!({
            "type": "section",
            "fields": [
                { "type": "mrkdwn", "text": format!("*Location:* {}, {}", lead.city.as_deref().unwrap_or("Unknown"), lead.province) },
                { "type": "mrkdwn", "text": format!("*Vertical:* {}", lead.vertical) },
                { "type": "mrkdwn", "text": format!("*Priority:* {}", lead.priority) },
                { "type": "mrkdwn", "text": format!("*Places:* {}", lead.place_ids.len()) },
            ]
        }),
    ];
    if let Some(message) = &lead.message {
        blocks.push(json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*Message:*\n>{}", message) }
        }));
    }
    blocks.push(json!({ "type": "divider" }));
    blocks.push(json!({
        "type": "context",
        "elements": [{
            "type": "mrkdwn",
            "text": format!("Lead ID: `{}` | Created: {}", lead.id, lead.created_at.to_rfc3339()),
        }]
    }));

    json!({ "blocks": blocks })
}

/// Subject and plain-text body of the confirmation e-mail.
pub fn confirmation_email(lead: &LeadRecord) -> (&'static str, String) {
    let (subject, body) = match lead.action_type {
        LeadAction::Match => (
            "We received your request - Finding your perfect match",
            "Our team is reviewing your preferences and will send you personalized recommendations within 24 hours.",
        ),
        LeadAction::Shortlist => (
            "Your shortlist request is being prepared",
            "We are curating the best options based on your requirements.",
        ),
        LeadAction::Contact => (
            "Your message has been forwarded",
            "The business has been notified and will contact you directly within 24-48 hours.",
        ),
        LeadAction::Book => (
            "Your booking request was received",
            "We are confirming availability and will get back to you within 24 hours.",
        ),
    };
    let greeting = match &lead.contact.name {
        Some(name) => format!("Hello {},", name),
        None => "Hello,".to_string(),
    };
    (subject, format!("{}\n\n{}\n\nReference ID: {}", greeting, body, lead.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_layer_core::lead::LeadRequest;
    use chrono::Utc;

    fn make_lead(message: Option<&str>) -> LeadRecord {
        let req: LeadRequest = serde_json::from_value(json!({
            "type": "contact",
            "vertical": "clinic",
            "placeIds": ["p1"],
            "contact": {"email": "pat@example.ca", "phone": "780-555-0100"},
            "city": "Edmonton",
            "message": message,
        }))
        .unwrap();
        LeadRecord::from_request(&req, Utc::now()).unwrap()
    }

    #[test]
    fn test_slack_message_shape() {
        let lead = make_lead(Some("Need a walk-in today"));
        let msg = slack_message(&lead);
        let blocks = msg["blocks"].as_array().unwrap();
        assert_eq!(blocks[0]["type"], "header");
        assert!(blocks[0]["text"]["text"]
            .as_str()
            .unwrap()
            .contains("New Lead: Contact Business"));
        assert!(blocks[1]["text"]["text"].as_str().unwrap().contains("Anonymous"));
        assert!(blocks[1]["text"]["text"].as_str().unwrap().contains("780-555-0100"));
        assert_eq!(blocks[2]["fields"][0]["text"], "*Location:* edmonton, AB");
        assert_eq!(blocks[3]["text"]["text"], "*Message:*\n>Need a walk-in today");
        assert_eq!(blocks.last().unwrap()["type"], "context");
    }

    #[test]
    fn test_slack_message_without_message_block() {
        let msg = slack_message(&make_lead(None));
        let blocks = msg["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 5);
    }

    #[test]
    fn test_confirmation_email_mentions_reference() {
        let lead = make_lead(None);
        let (subject, body) = confirmation_email(&lead);
        assert_eq!(subject, "Your message has been forwarded");
        assert!(body.starts_with("Hello,"));
        assert!(body.contains(&lead.id));
    }

    #[tokio::test]
    async fn test_channel_receives_queued_lead() {
        let (notifier, mut rx) = Notifier::channel();
        let lead = make_lead(None);
        notifier.notify(&lead);
        assert_eq!(rx.recv().await.unwrap().id, lead.id);
    }

    #[tokio::test]
    async fn test_notify_after_close_does_not_panic() {
        let (notifier, rx) = Notifier::channel();
        drop(rx);
        notifier.notify(&make_lead(None));
    }
}
