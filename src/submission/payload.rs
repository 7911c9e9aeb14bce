//! Request bodies for the collection API.

use super::DeduplicationId;
use crate::activity::ActivityBuckets;
use serde::{Deserialize, Serialize};

/// `POST /submit` body.
///
/// `activity` maps window id to active milliseconds; JSON object keys are
/// the window ids as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub host: String,
    pub plugin_version: String,
    pub session_key: String,
    pub dd_id: String,
    pub activity: ActivityBuckets,
}

impl SubmitRequest {
    pub fn new(
        host: &str,
        plugin_version: &str,
        session_key: &str,
        dd_id: &DeduplicationId,
        activity: ActivityBuckets,
    ) -> Self {
        Self {
            host: host.to_string(),
            plugin_version: plugin_version.to_string(),
            session_key: session_key.to_string(),
            dd_id: dd_id.to_string(),
            activity,
        }
    }

    /// Greatest window id included; the high-water mark on success.
    pub fn max_window(&self) -> Option<i64> {
        self.activity.keys().next_back().copied()
    }

    pub fn total_ms(&self) -> u64 {
        self.activity.values().sum()
    }
}

/// `POST /validate-session-key` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub plugin_version: String,
    pub session_key: String,
}
