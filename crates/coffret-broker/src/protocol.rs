//! Wire types for the loopback access endpoint.
//!
//! One endpoint, `POST /`, carrying `{action, data, timestamp}` in and
//! `{success, data?, error?}` out. Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

/// An incoming request envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    /// Action name (see the dispatch table in the server).
    pub action: String,
    /// Action-specific payload.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Client-supplied timestamp; informational only.
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// The response envelope. Dispatch-level failures ride in `error` with
/// HTTP 200; transport failures use their natural status codes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessResponse {
    /// Whether the action succeeded.
    pub success: bool,
    /// Action result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Failure message on error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AccessResponse {
    /// A success carrying `data`.
    #[must_use]
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A success with an empty object payload.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self::ok(serde_json::json!({}))
    }

    /// A dispatch-level failure.
    #[must_use]
    pub fn failure(message: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Action payloads
// ---------------------------------------------------------------------------

/// `{projectName}` - used by `listSecretKeys` and `getAllSecrets`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectScope {
    /// Target project.
    pub project_name: String,
}

/// `{projectName, keys}` - used by `getBatchSecrets`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchScope {
    /// Target project.
    pub project_name: String,
    /// Requested keys; missing ones are omitted from the result.
    #[serde(default)]
    pub keys: Vec<String>,
}

/// `{projectName, key}` - used by `getSecret`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyScope {
    /// Target project.
    pub project_name: String,
    /// Target secret key.
    pub key: String,
}

/// `{projectName, key, value}` - used by `setSecret`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSecretData {
    /// Target project.
    pub project_name: String,
    /// Target secret key.
    pub key: String,
    /// New value.
    pub value: String,
    /// Optional expiry.
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// Payload of the `status` action's response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusData {
    /// Whether the vault is unlocked.
    pub is_unlocked: bool,
    /// Broker version.
    pub version: String,
}
