//! Messages exchanged between the coordinator and the page agents.
//!
//! Both directions travel as JSON objects tagged by `type`, the shape the
//! extension messaging API carries. Every receiver decodes through the closed
//! enums below, so an unexpected message is an error instead of a no-op.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::Change;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("message has no string `type` field")]
    MissingKind,
    #[error("unknown message kind `{0}`")]
    UnknownKind(String),
    #[error("malformed `{kind}` message: {reason}")]
    Malformed { kind: String, reason: String },
}

/// Coordinator → agent notifications. None of them expect a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AgentMessage {
    #[serde(rename_all = "camelCase")]
    ToggleNativePopup {
        /// Same as `!host.is_empty()`; agents decide from `host` itself.
        configured: bool,
        host: String,
        user: String,
        pass: String,
    },
    ActiveTabChange,
    #[serde(rename_all = "camelCase")]
    SetLastGerritResponse {
        status: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jira_key: Option<String>,
        /// Echo of the lookup's `requestId`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
    },
    PurgeLocalChanges,
}

impl AgentMessage {
    pub const KINDS: &'static [&'static str] = &[
        "toggleNativePopup",
        "activeTabChange",
        "setLastGerritResponse",
        "purgeLocalChanges",
    ];

    pub fn decode(value: Value) -> Result<Self, ProtocolError> {
        decode_tagged(value, Self::KINDS)
    }
}

/// Agent → coordinator requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CoordinatorRequest {
    #[serde(rename_all = "camelCase")]
    TryGetChangesByJiraKey {
        jira_key: String,
        /// Tags the status report sent back for this lookup.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
    },
    SetListBadge { value: usize },
    SetGerritHost {
        host: String,
        user: String,
        pass: String,
    },
}

impl CoordinatorRequest {
    pub const KINDS: &'static [&'static str] =
        &["tryGetChangesByJiraKey", "setListBadge", "setGerritHost"];

    pub fn decode(value: Value) -> Result<Self, ProtocolError> {
        decode_tagged(value, Self::KINDS)
    }
}

/// Answer to a [`CoordinatorRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Changes(Vec<Change>),
    Done,
    Rejected(String),
}

pub fn encode<T: Serialize>(message: &T) -> Value {
    // Unit and struct variants of the enums above always serialize to an object.
    serde_json::to_value(message).unwrap_or(Value::Null)
}

fn decode_tagged<T>(value: Value, kinds: &[&str]) -> Result<T, ProtocolError>
where
    T: for<'de> Deserialize<'de>,
{
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingKind)?
        .to_string();
    if !kinds.contains(&kind.as_str()) {
        return Err(ProtocolError::UnknownKind(kind));
    }
    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed {
        kind,
        reason: e.to_string(),
    })
}
