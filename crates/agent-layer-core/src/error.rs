//! Error taxonomy shared by the core and the transport layers.
//!
//! Operations return `anyhow::Result`; an [`AgentError`] inside the chain
//! tells the caller which class of failure occurred so it can be mapped to
//! a status code without matching on message text.

use thiserror::Error;

use crate::lead::LeadStatus;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Malformed or missing input. Never retried.
    #[error("{0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Lead status may only move forward.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: LeadStatus, to: LeadStatus },

    /// A storage uniqueness rule was violated (e.g. slug taken within a city).
    #[error("{0}")]
    Conflict(String),
}

impl AgentError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}
