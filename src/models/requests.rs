//! Request DTOs for the diagnostics API
//!
//! Defines the structure of incoming HTTP request bodies and queries.

use serde::Deserialize;
use serde_json::Value;

use crate::epic::{Action, UiState};

/// Longest action type accepted over HTTP
const MAX_KIND_LENGTH: usize = 128;

/// Largest extract page a client may ask for
const MAX_PAGE_SIZE: usize = 200;

/// Query string for DELETE /cache
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClearQuery {
    /// Regex (or plain substring) over keys; everything when absent
    #[serde(default)]
    pub pattern: Option<String>,
}

/// Request body for POST /actions
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl DispatchRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.kind.trim().is_empty() {
            return Some("Action type cannot be empty".to_string());
        }
        if self.kind.len() > MAX_KIND_LENGTH {
            return Some(format!(
                "Action type exceeds maximum length of {} characters",
                MAX_KIND_LENGTH
            ));
        }
        None
    }

    pub fn into_action(self) -> Action {
        Action::new(self.kind, self.payload)
    }
}

/// Request body for PUT /state; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateRequest {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub page_size: Option<usize>,
}

impl StateRequest {
    pub fn validate(&self) -> Option<String> {
        if let Some(account_id) = &self.account_id {
            if account_id.trim().is_empty() {
                return Some("Account id cannot be empty".to_string());
            }
        }
        if let Some(page_size) = self.page_size {
            if page_size == 0 || page_size > MAX_PAGE_SIZE {
                return Some(format!("Page size must be between 1 and {}", MAX_PAGE_SIZE));
            }
        }
        None
    }

    pub fn apply(self, state: &mut UiState) {
        if let Some(account_id) = self.account_id {
            state.account_id = account_id;
        }
        if let Some(page_size) = self.page_size {
            state.page_size = page_size;
        }
    }
}
