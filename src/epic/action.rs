//! Actions flowing through the coordinator.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CacheError, Result};

/// Action type names understood by the built-in epics.
pub mod kinds {
    pub const SEARCH_REQUESTED: &str = "search/requested";
    pub const SEARCH_SUCCEEDED: &str = "search/succeeded";
    pub const SEARCH_FAILED: &str = "search/failed";

    pub const FILTER_CHANGED: &str = "filter/changed";
    pub const FILTER_APPLIED: &str = "filter/applied";
    pub const FILTER_FAILED: &str = "filter/failed";

    pub const EXTRACT_SCROLLED: &str = "extract/scrolled";
    pub const EXTRACT_PAGE_LOADED: &str = "extract/page_loaded";
    pub const EXTRACT_PAGE_FAILED: &str = "extract/page_failed";

    pub const DRAFT_CHANGED: &str = "draft/changed";
    pub const AUTOSAVE_STATUS: &str = "autosave/status";

    pub const TRANSACTIONS_FETCH: &str = "transactions/fetch";
    pub const TRANSACTIONS_LOADED: &str = "transactions/loaded";
    pub const TRANSACTIONS_FETCH_FAILED: &str = "transactions/fetch_failed";
    pub const TRANSACTIONS_FETCH_ABANDONED: &str = "transactions/fetch_abandoned";

    pub const TRANSFER_SUBMITTED: &str = "transfer/submitted";
    pub const TRANSFER_COMPLETED: &str = "transfer/completed";
    pub const TRANSFER_FAILED: &str = "transfer/failed";
    pub const TRANSFER_REJECTED: &str = "transfer/rejected";

    pub const PREFETCH_REQUESTED: &str = "prefetch/requested";
    pub const PREFETCH_SCHEDULED: &str = "prefetch/scheduled";
}

/// A dispatched event: a type name plus a free-form JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Action {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Action without a payload.
    pub fn bare(kind: impl Into<String>) -> Self {
        Self::new(kind, Value::Null)
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Decodes the payload into `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|err| {
            CacheError::InvalidRequest(format!("bad payload for {}: {}", self.kind, err))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let action = Action::new(kinds::SEARCH_REQUESTED, json!({ "query": "merc" }));
        let wire = serde_json::to_value(&action).unwrap();
        assert_eq!(wire, json!({ "type": "search/requested", "payload": { "query": "merc" } }));

        let parsed: Action = serde_json::from_str(r#"{"type":"transactions/fetch"}"#).unwrap();
        assert_eq!(parsed, Action::bare(kinds::TRANSACTIONS_FETCH));
    }

    #[test]
    fn test_payload_as() {
        #[derive(Deserialize, Debug)]
        struct Query {
            query: String,
        }

        let action = Action::new(kinds::SEARCH_REQUESTED, json!({ "query": "rent" }));
        let query: Query = action.payload_as().unwrap();
        assert_eq!(query.query, "rent");

        let err = Action::bare(kinds::SEARCH_REQUESTED)
            .payload_as::<Query>()
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidRequest(_)));
    }
}
