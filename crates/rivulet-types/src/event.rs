//! Event and lifecycle types shared by the client and its consumers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Event type dispatched once per successful transition into [`ReadyState::Open`].
pub const OPEN_EVENT: &str = "open";

/// Event type dispatched on every connection failure and on stream termination.
pub const ERROR_EVENT: &str = "error";

/// Default event type for data-bearing events without an `event:` field.
pub const MESSAGE_EVENT: &str = "message";

/// Lifecycle state of an event source connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyState {
    /// Connecting for the first time, or waiting to reconnect.
    Connecting,
    /// Response accepted; events are being received.
    Open,
    /// Terminal. No further attempts are made.
    Closed,
}

impl ReadyState {
    /// Numeric value used by browser-style `readyState` (`0`, `1`, `2`).
    pub const fn as_u8(self) -> u8 {
        match self {
            ReadyState::Connecting => 0,
            ReadyState::Open => 1,
            ReadyState::Closed => 2,
        }
    }
}

impl TryFrom<u8> for ReadyState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReadyState::Connecting),
            1 => Ok(ReadyState::Open),
            2 => Ok(ReadyState::Closed),
            other => Err(other),
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReadyState::Connecting => "CONNECTING",
            ReadyState::Open => "OPEN",
            ReadyState::Closed => "CLOSED",
        })
    }
}

/// Whether credentials accompany requests made by the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialsMode {
    /// Never send credentials.
    Omit,
    /// Send credentials only to the origin of the event source.
    #[default]
    SameOrigin,
    /// Always send credentials.
    Include,
}

/// An event delivered to listeners.
///
/// `open` and `error` events carry no origin or id; `error` events carry a
/// human-readable failure description as `data` when one is available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<String>,
}

impl MessageEvent {
    /// A finalized data-bearing event.
    pub fn message(
        event_type: impl Into<String>,
        data: impl Into<String>,
        origin: impl Into<String>,
        last_event_id: Option<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            data: Some(data.into()),
            origin: Some(origin.into()),
            last_event_id,
        }
    }

    pub fn open() -> Self {
        Self {
            event_type: OPEN_EVENT.to_string(),
            data: None,
            origin: None,
            last_event_id: None,
        }
    }

    pub fn error(description: Option<String>) -> Self {
        Self {
            event_type: ERROR_EVENT.to_string(),
            data: description,
            origin: None,
            last_event_id: None,
        }
    }
}
