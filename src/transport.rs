//! Submission of the assembled request.

use anyhow::Result;
use async_trait::async_trait;

use crate::constants::ALREADY_SENT_CODES;
use crate::request::SendMessageRequest;

/// What the service answered to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResponse {
    /// Service response code, `1000` on success.
    pub code: i64,
    /// Raw response body.
    pub payload: serde_json::Value,
}

impl SendResponse {
    pub const OK: i64 = 1000;

    /// Whether the message is on its way, including when it already was before.
    pub fn is_success(&self) -> bool {
        self.code == Self::OK || ALREADY_SENT_CODES.contains(&self.code)
    }

    pub fn error_message(&self) -> String {
        self.payload
            .get("Error")
            .and_then(|e| e.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("response code {}", self.code))
    }
}

/// Network transport of the service.
#[async_trait]
pub trait SendTransport: Send + Sync {
    async fn submit(&self, request: &SendMessageRequest) -> Result<SendResponse>;
}
