//! Server-Sent Events client with automatic reconnection for Rivulet.
//!
//! Bytes from a streaming HTTP response flow through the [`Utf8Decoder`], the
//! [`LineBuffer`] and the [`EventAssembler`], and finalized events are
//! delivered to listeners registered on an [`EventSource`].

mod decoder;
mod event_source;
mod listeners;
mod retry;
mod sse;
mod transport;

pub use decoder::Utf8Decoder;
pub use event_source::{DebugLog, EventSource, EventSourceOptions};
pub use listeners::{Listener, ListenerRegistry};
pub use retry::{ReconnectConfig, calculate_delay};
pub use sse::{EventAssembler, LineBuffer, SseDirective, SseEvent, SseLine, SseParser, parse_line};
pub use transport::{
    ByteStream, ReqwestTransport, Transport, TransportFuture, TransportRequest, TransportResponse,
};

pub use rivulet_types::{CredentialsMode, EventSourceError, MessageEvent, ReadyState};
