//! Response DTOs for the diagnostics API
//!
//! Defines the structure of outgoing HTTP response bodies.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheEntry, CacheStats};
use crate::epic::Action;
use crate::prefetch::PrefetchStats;
use crate::retry::RetryStats;

/// Response body for GET /cache/:key
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub value: Value,
    /// Which cache holds the entry: `cache` or `prefetch`
    pub source: &'static str,
    pub inserted_at: DateTime<Utc>,
    pub ttl_remaining_ms: u64,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, source: &'static str, entry: &CacheEntry<Value>) -> Self {
        Self {
            key: key.into(),
            value: entry.value.clone(),
            source,
            inserted_at: entry.inserted_at,
            ttl_remaining_ms: entry.ttl_remaining().as_millis() as u64,
        }
    }
}

/// Response body for DELETE /cache/:key
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub key: String,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for DELETE /cache
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub pattern: Option<String>,
    /// Entries removed across both caches
    pub removed: usize,
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub cache: CacheStats,
    /// Hit rate of the general cache
    pub hit_rate: f64,
    pub prefetch: PrefetchStats,
    pub retry: RetryStats,
    pub running_epics: usize,
}

impl StatsResponse {
    pub fn new(
        cache: CacheStats,
        prefetch: PrefetchStats,
        retry: RetryStats,
        running_epics: usize,
    ) -> Self {
        Self {
            hit_rate: cache.hit_rate(),
            cache,
            prefetch,
            retry,
            running_epics,
        }
    }
}

/// Response body for POST /actions
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResponse {
    #[serde(rename = "type")]
    pub kind: String,
    /// Action streams that received it
    pub receivers: usize,
}

/// Response body for GET /actions
#[derive(Debug, Clone, Serialize)]
pub struct ActionsResponse {
    pub count: usize,
    /// Oldest first
    pub actions: Vec<Action>,
}

impl ActionsResponse {
    pub fn new(actions: Vec<Action>) -> Self {
        Self {
            count: actions.len(),
            actions,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_get_response_from_entry() {
        let entry = CacheEntry::new(json!({ "balance": 10 }), Duration::from_secs(60));
        let resp = GetResponse::new("balance:acc-1", "cache", &entry);

        assert_eq!(resp.value, json!({ "balance": 10 }));
        assert!(resp.ttl_remaining_ms <= 60_000);
        assert!(resp.ttl_remaining_ms > 59_000);
    }

    #[test]
    fn test_delete_response_serialize() {
        let resp = DeleteResponse::new("deleted_key");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("deleted_key"));
        assert!(json.contains("deleted"));
    }

    #[test]
    fn test_stats_response_hit_rate() {
        let cache = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        let resp = StatsResponse::new(cache, PrefetchStats::default(), RetryStats::default(), 1);
        assert!((resp.hit_rate - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_actions_response_counts() {
        let resp = ActionsResponse::new(vec![Action::bare("a"), Action::bare("b")]);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["count"], 2);
        assert_eq!(json["actions"][1]["type"], "b");
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_error_response_serialize() {
        let resp = ErrorResponse::new("Something went wrong");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("error"));
        assert!(json.contains("Something went wrong"));
    }
}
