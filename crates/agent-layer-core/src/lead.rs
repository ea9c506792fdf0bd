//! Lead capture rules.
//!
//! A lead is a user's request to be matched, shortlisted, contacted, or
//! booked. Priority is derived once from the request and never changes;
//! status only moves forward along `new → contacted → qualified →
//! closed | converted`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::ids;
use crate::models::Vertical;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"));

const DEFAULT_PROVINCE: &str = "AB";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadAction {
    Match,
    Shortlist,
    Contact,
    Book,
}

impl LeadAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadAction::Match => "match",
            LeadAction::Shortlist => "shortlist",
            LeadAction::Contact => "contact",
            LeadAction::Book => "book",
        }
    }
}

impl fmt::Display for LeadAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadAction {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "match" => Ok(LeadAction::Match),
            "shortlist" => Ok(LeadAction::Shortlist),
            "contact" => Ok(LeadAction::Contact),
            "book" => Ok(LeadAction::Book),
            other => Err(AgentError::validation(format!(
                "unknown lead type '{}'; expected match, shortlist, contact, or book",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadTiming {
    Asap,
    ThisWeek,
    ThisMonth,
    Flexible,
}

impl FromStr for LeadTiming {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "asap" => Ok(LeadTiming::Asap),
            "this_week" => Ok(LeadTiming::ThisWeek),
            "this_month" => Ok(LeadTiming::ThisMonth),
            "flexible" => Ok(LeadTiming::Flexible),
            other => Err(AgentError::validation(format!(
                "unknown timing '{}'; expected asap, this_week, this_month, or flexible",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Closed,
    Converted,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 5] = [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::Qualified,
        LeadStatus::Closed,
        LeadStatus::Converted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Closed => "closed",
            LeadStatus::Converted => "converted",
        }
    }

    // closed and converted share the last rank
    fn rank(&self) -> u8 {
        match self {
            LeadStatus::New => 0,
            LeadStatus::Contacted => 1,
            LeadStatus::Qualified => 2,
            LeadStatus::Closed | LeadStatus::Converted => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 3
    }

    pub fn can_transition_to(&self, next: LeadStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        LeadStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == lower)
            .ok_or_else(|| AgentError::validation(format!("unknown lead status '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadPriority {
    Low,
    Medium,
    High,
}

impl LeadPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadPriority::Low => "low",
            LeadPriority::Medium => "medium",
            LeadPriority::High => "high",
        }
    }
}

impl fmt::Display for LeadPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadPriority {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(LeadPriority::Low),
            "medium" => Ok(LeadPriority::Medium),
            "high" => Ok(LeadPriority::High),
            other => Err(AgentError::validation(format!(
                "unknown lead priority '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadContact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// An incoming conversion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRequest {
    #[serde(rename = "type")]
    pub action: LeadAction,
    pub vertical: Vertical,
    #[serde(default)]
    pub place_ids: Vec<String>,
    pub contact: LeadContact,
    #[serde(default = "default_province")]
    pub province: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<LeadTiming>,
}

fn default_province() -> String {
    DEFAULT_PROVINCE.to_string()
}

impl LeadRequest {
    pub fn validate(&self) -> Result<(), AgentError> {
        let email = self.contact.email.trim();
        if email.is_empty() {
            return Err(AgentError::validation("contact email is required"));
        }
        if !EMAIL.is_match(email) {
            return Err(AgentError::validation(format!(
                "'{}' is not a valid email address",
                email
            )));
        }
        if self.province.trim().is_empty() {
            return Err(AgentError::validation("province must not be empty"));
        }
        Ok(())
    }

    /// Place ids with blanks and repeats removed, first occurrence kept.
    fn distinct_place_ids(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for id in &self.place_ids {
            let id = id.trim();
            if !id.is_empty() && !out.iter().any(|o| o == id) {
                out.push(id.to_string());
            }
        }
        out
    }
}

/// Pure priority rule, evaluated once at creation.
pub fn compute_priority(action: LeadAction, place_count: usize) -> LeadPriority {
    match action {
        LeadAction::Contact if place_count >= 1 => LeadPriority::High,
        LeadAction::Shortlist if place_count >= 3 => LeadPriority::High,
        LeadAction::Match => LeadPriority::Medium,
        _ => LeadPriority::Low,
    }
}

pub fn estimated_response(action: LeadAction) -> &'static str {
    match action {
        LeadAction::Book => "Within 24 hours",
        LeadAction::Match => "Within 2 hours",
        LeadAction::Shortlist => "Within 4 hours",
        LeadAction::Contact => "Within 1 business day",
    }
}

pub fn next_steps(action: LeadAction, has_places: bool) -> Vec<String> {
    let mut steps = vec!["Check your email for confirmation".to_string()];
    if action == LeadAction::Book {
        steps.push("Prepare your availability for scheduling".to_string());
    }
    if has_places {
        steps.push("Review the places we matched for you".to_string());
    }
    steps.push("Watch for follow-up questions from our team".to_string());
    steps
}

/// A persisted lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRecord {
    pub id: String,
    pub action_type: LeadAction,
    pub vertical: Vertical,
    pub province: String,
    pub city: Option<String>,
    pub contact: LeadContact,
    pub place_ids: Vec<String>,
    pub message: Option<String>,
    pub requirements: Option<String>,
    /// The full original request, kept for audit.
    pub payload: serde_json::Value,
    pub status: LeadStatus,
    pub priority: LeadPriority,
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeadRecord {
    /// Validate `request` and build a fresh `new` lead from it.
    pub fn from_request(request: &LeadRequest, now: DateTime<Utc>) -> Result<Self, AgentError> {
        request.validate()?;
        let place_ids = request.distinct_place_ids();
        let payload = serde_json::to_value(request)
            .map_err(|e| AgentError::validation(format!("lead request is not serializable: {}", e)))?;

        Ok(Self {
            id: ids::generate_id("lead", None),
            action_type: request.action,
            vertical: request.vertical,
            province: request.province.trim().to_uppercase(),
            city: request
                .city
                .as_deref()
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty()),
            contact: LeadContact {
                name: request.contact.name.clone(),
                email: request.contact.email.trim().to_string(),
                phone: request.contact.phone.clone(),
            },
            priority: compute_priority(request.action, place_ids.len()),
            place_ids,
            message: request.message.clone(),
            requirements: request.requirements.clone(),
            payload,
            status: LeadStatus::New,
            assigned_to: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Move to `next`, optionally recording an assignee.
    pub fn advance(
        &mut self,
        next: LeadStatus,
        assigned_to: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), AgentError> {
        if !self.status.can_transition_to(next) {
            return Err(AgentError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if assigned_to.is_some() {
            self.assigned_to = assigned_to;
        }
        self.updated_at = now.max(self.created_at);
        Ok(())
    }

    pub fn receipt(&self) -> LeadReceipt {
        LeadReceipt {
            id: self.id.clone(),
            status: "accepted".to_string(),
            priority: self.priority,
            created_at: self.created_at,
            estimated_response: estimated_response(self.action_type).to_string(),
            next_steps: next_steps(self.action_type, !self.place_ids.is_empty()),
        }
    }
}

/// What the caller gets back from lead creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadReceipt {
    pub id: String,
    pub status: String,
    pub priority: LeadPriority,
    pub created_at: DateTime<Utc>,
    pub estimated_response: String,
    pub next_steps: Vec<String>,
}

/// Admin listing filter. Results are newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadFilter {
    #[serde(default)]
    pub status: Option<LeadStatus>,
    #[serde(default)]
    pub vertical: Option<Vertical>,
    #[serde(default)]
    pub priority: Option<LeadPriority>,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_list_limit() -> usize {
    50
}

impl Default for LeadFilter {
    fn default() -> Self {
        Self {
            status: None,
            vertical: None,
            priority: None,
            limit: default_list_limit(),
            offset: 0,
        }
    }
}

impl LeadFilter {
    pub fn matches(&self, lead: &LeadRecord) -> bool {
        self.status.is_none_or(|s| lead.status == s)
            && self.vertical.is_none_or(|v| lead.vertical == v)
            && self.priority.is_none_or(|p| lead.priority == p)
    }
}
