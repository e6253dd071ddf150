//! UI state the epics read from.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiState {
    /// Signed-in account whose data the epics load
    pub account_id: String,
    /// Extract page size
    pub page_size: usize,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            page_size: 20,
        }
    }
}
