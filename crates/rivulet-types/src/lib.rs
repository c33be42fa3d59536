//! Shared event types and error hierarchy for Rivulet.

pub mod error;
pub mod event;

pub use error::{ConfigError, EventSourceError};
pub use event::{
    CredentialsMode, ERROR_EVENT, MESSAGE_EVENT, MessageEvent, OPEN_EVENT, ReadyState,
};
