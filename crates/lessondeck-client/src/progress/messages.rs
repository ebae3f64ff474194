//! Progress socket wire messages.

use chrono::{DateTime, Utc};
use lessondeck_core::ProgressUpdate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SubscribeJob { job_id: String },
    UnsubscribeJob { job_id: String },
    Ping,
}

impl ClientMessage {
    pub fn to_json(&self) -> String {
        // Serializing a plain tagged enum of strings cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Message received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// One of the six progress update kinds.
    Update(ProgressUpdate),
    Connected {
        client_id: Option<String>,
    },
    SubscriptionResult {
        job_id: Option<String>,
        success: bool,
        message: Option<String>,
    },
    Pong,
    Error {
        message: String,
    },
    /// Anything with a `type` we do not know.
    Unknown(String),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Control {
    Connected {
        #[serde(default)]
        client_id: Option<String>,
    },
    SubscriptionResult {
        #[serde(default)]
        job_id: Option<String>,
        #[serde(default = "default_true")]
        success: bool,
        #[serde(default)]
        message: Option<String>,
    },
    Pong,
    Error {
        #[serde(default, alias = "error")]
        message: Option<String>,
    },
}

const fn default_true() -> bool {
    true
}

const UPDATE_TYPES: [&str; 6] = [
    "progress",
    "step_complete",
    "step_error",
    "job_complete",
    "job_error",
    "job_status",
];

impl ServerMessage {
    /// Parse one text frame.
    ///
    /// Updates without a usable RFC 3339 `timestamp` are stamped with the
    /// receive time, which is what a polled update without `updated_at`
    /// gets too.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let mut value: Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if UPDATE_TYPES.contains(&kind.as_str()) {
            if let Some(object) = value.as_object_mut() {
                let valid_timestamp = object
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .is_some_and(|ts| DateTime::parse_from_rfc3339(ts).is_ok());
                if !valid_timestamp {
                    object.insert("timestamp".to_string(), Value::String(Utc::now().to_rfc3339()));
                }
            }
            return serde_json::from_value(value).map(Self::Update);
        }

        match kind.as_str() {
            "connected" | "subscription_result" | "pong" | "error" => {
                Ok(match serde_json::from_value(value)? {
                    Control::Connected { client_id } => Self::Connected { client_id },
                    Control::SubscriptionResult {
                        job_id,
                        success,
                        message,
                    } => Self::SubscriptionResult {
                        job_id,
                        success,
                        message,
                    },
                    Control::Pong => Self::Pong,
                    Control::Error { message } => Self::Error {
                        message: message.unwrap_or_else(|| "unknown socket error".to_string()),
                    },
                })
            }
            _ => Ok(Self::Unknown(kind)),
        }
    }
}
