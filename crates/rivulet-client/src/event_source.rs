//! Long-lived event source connection with server-directed reconnection.
//!
//! An [`EventSource`] owns one logical subscription. It runs each connection
//! attempt as a Tokio task that validates the response, then feeds body chunks
//! through the [`SseParser`] and dispatches finalized events to listeners. On
//! failure it moves back to `CONNECTING`, fires an `error` event, and arms a
//! single reconnection timer. [`EventSource::close`] cancels both the attempt
//! and the timer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use rivulet_types::{CredentialsMode, EventSourceError, MessageEvent, ReadyState};
use serde_json::{Value, json};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::listeners::{Listener, ListenerRegistry};
use crate::retry::{ReconnectConfig, calculate_delay};
use crate::sse::{SseDirective, SseParser};
use crate::transport::{ReqwestTransport, Transport, TransportRequest};

const EVENT_STREAM_MIME: &str = "text/event-stream";
const LAST_EVENT_ID: &str = "last-event-id";

/// Diagnostic sink: called with a message and optional structured data.
pub type DebugLog = Arc<dyn Fn(&str, Option<&Value>) + Send + Sync>;

/// Options for an [`EventSource`].
#[derive(Clone, Default)]
pub struct EventSourceOptions {
    /// Extra request headers. These override the `Accept` and
    /// `Cache-Control` defaults when they name the same header.
    pub headers: HeaderMap,
    pub credentials: CredentialsMode,
    pub reconnect: ReconnectConfig,
    pub debug_log: Option<DebugLog>,
    /// Listeners registered before the first connection attempt starts.
    pub listeners: Vec<(String, Listener)>,
}

impl EventSourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Add a single request header.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, EventSourceError> {
        let invalid = |message: String| EventSourceError::InvalidHeader {
            name: name.to_string(),
            message,
        };
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    pub fn with_credentials(mut self, credentials: CredentialsMode) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Register `listener` for `event_type` before connecting, so it cannot
    /// miss the first `open` or any early message.
    pub fn with_listener(mut self, event_type: &str, listener: Listener) -> Self {
        self.listeners.push((event_type.to_string(), listener));
        self
    }

    pub fn with_debug_log(
        mut self,
        sink: impl Fn(&str, Option<&Value>) + Send + Sync + 'static,
    ) -> Self {
        self.debug_log = Some(Arc::new(sink));
        self
    }
}

impl std::fmt::Debug for EventSourceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSourceOptions")
            .field("headers", &self.headers)
            .field("credentials", &self.credentials)
            .field("reconnect", &self.reconnect)
            .field("debug_log", &self.debug_log.is_some())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Mutable connection state. Only touched under the lock, never across an
/// `.await`, and never while user callbacks run.
struct ConnectionState {
    ready_state: ReadyState,
    last_event_id: Option<String>,
    server_retry_ms: Option<u64>,
    failures: u32,
    /// Set only by `close()`; suppresses every later dispatch.
    close_requested: bool,
    attempt: Option<CancellationToken>,
    reconnect_timer: Option<JoinHandle<()>>,
}

struct Inner {
    url: Url,
    origin: String,
    options: EventSourceOptions,
    transport: Arc<dyn Transport>,
    runtime: Handle,
    state: Mutex<ConnectionState>,
    listeners: Mutex<ListenerRegistry>,
}

/// Client for a Server-Sent Events endpoint.
///
/// Construction immediately starts connecting. Clones share the same
/// connection. The connection is only torn down by [`close`](Self::close).
#[derive(Clone)]
pub struct EventSource {
    inner: Arc<Inner>,
}

impl EventSource {
    /// Connect to `url` using the default `reqwest` transport.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(url: &str, options: EventSourceOptions) -> Result<Self, EventSourceError> {
        let transport = ReqwestTransport::new()?;
        Self::with_transport(url, options, Arc::new(transport))
    }

    /// Connect to `url` through a custom transport.
    pub fn with_transport(
        url: &str,
        options: EventSourceOptions,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, EventSourceError> {
        let parsed = Url::parse(url).map_err(|e| EventSourceError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let runtime = Handle::try_current().map_err(|_| EventSourceError::NoRuntime)?;

        let mut listeners = ListenerRegistry::new();
        for (event_type, listener) in &options.listeners {
            listeners.add(event_type, listener.clone());
        }

        let inner = Arc::new(Inner {
            origin: parsed.origin().ascii_serialization(),
            url: parsed,
            options,
            transport,
            runtime,
            state: Mutex::new(ConnectionState {
                ready_state: ReadyState::Connecting,
                last_event_id: None,
                server_retry_ms: None,
                failures: 0,
                close_requested: false,
                attempt: None,
                reconnect_timer: None,
            }),
            listeners: Mutex::new(listeners),
        });

        inner.runtime.spawn(Arc::clone(&inner).connect());

        Ok(Self { inner })
    }

    pub fn ready_state(&self) -> ReadyState {
        self.inner.state().ready_state
    }

    pub fn last_event_id(&self) -> Option<String> {
        self.inner.state().last_event_id.clone()
    }

    pub fn url(&self) -> &str {
        self.inner.url.as_str()
    }

    /// ASCII serialization of the URL's origin, as carried by message events.
    pub fn origin(&self) -> &str {
        &self.inner.origin
    }

    pub fn with_credentials(&self) -> bool {
        self.inner.options.credentials == CredentialsMode::Include
    }

    /// Subscribe `listener` to events of `event_type`. Adding the same
    /// listener twice has no further effect.
    pub fn add_event_listener(&self, event_type: &str, listener: &Listener) {
        self.inner.listeners().add(event_type, listener.clone());
    }

    pub fn remove_event_listener(&self, event_type: &str, listener: &Listener) {
        self.inner.listeners().remove(event_type, listener);
    }

    /// Subscribe a closure and return its handle for later removal.
    pub fn on(
        &self,
        event_type: &str,
        handler: impl Fn(&MessageEvent) + Send + Sync + 'static,
    ) -> Listener {
        let listener = Listener::new(handler);
        self.add_event_listener(event_type, &listener);
        listener
    }

    /// Close the connection: abort the in-flight attempt and cancel any
    /// pending reconnection. Idempotent.
    pub fn close(&self) {
        let (attempt, timer, was_closed) = {
            let mut state = self.inner.state();
            let was_closed = state.close_requested;
            state.close_requested = true;
            state.ready_state = ReadyState::Closed;
            (state.attempt.take(), state.reconnect_timer.take(), was_closed)
        };

        if let Some(token) = attempt {
            token.cancel();
        }
        if let Some(timer) = timer {
            timer.abort();
        }

        if !was_closed {
            tracing::info!(url = %self.inner.url, "Event source closed");
            self.inner.debug_log("Closed", None);
        }
    }
}

impl std::fmt::Debug for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSource")
            .field("url", &self.url())
            .field("ready_state", &self.ready_state())
            .field("last_event_id", &self.last_event_id())
            .finish()
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, ListenerRegistry> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.state().ready_state == ReadyState::Closed
    }

    fn debug_log(&self, message: &str, data: Option<Value>) {
        tracing::debug!(url = %self.url, data = ?data, "{message}");
        if let Some(sink) = &self.options.debug_log {
            sink(&format!("[EventSource] {message}"), data.as_ref());
        }
    }

    /// Deliver `event` to every listener currently registered for its type.
    ///
    /// The close flag is re-read before each callback, so once `close()` has
    /// returned no further listener is invoked, including the remaining
    /// listeners of an event whose handler closed the connection.
    fn dispatch(&self, event: &MessageEvent) {
        let listeners = self.listeners().snapshot(&event.event_type);
        for listener in listeners {
            if self.state().close_requested {
                return;
            }
            listener.call(event);
        }
    }

    /// Run one connection attempt to completion.
    async fn connect(self: Arc<Self>) {
        let token = {
            let mut state = self.state();
            if state.ready_state == ReadyState::Closed {
                drop(state);
                self.debug_log("EventSource is closed, not reconnecting", None);
                return;
            }
            // The timer that started this attempt has fired; detach it.
            state.reconnect_timer = None;
            let token = CancellationToken::new();
            if let Some(previous) = state.attempt.replace(token.clone()) {
                previous.cancel();
            }
            token
        };

        let result = tokio::select! {
            _ = token.cancelled() => Err(EventSourceError::Cancelled),
            result = self.run_attempt() => result,
        };

        self.finish_attempt(result);
    }

    fn request_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(EVENT_STREAM_MIME));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.extend(self.options.headers.clone());

        let last_event_id = self.state().last_event_id.clone();
        if let Some(id) = last_event_id {
            match HeaderValue::from_str(&id) {
                Ok(value) => {
                    headers.insert(LAST_EVENT_ID, value);
                }
                Err(_) => tracing::warn!(id = %id, "Last event id is not a valid header value"),
            }
        }

        headers
    }

    /// Returns `Ok(())` when the stream was terminated on purpose (204 or an
    /// explicit close), and `Err` for anything that should reconnect.
    async fn run_attempt(&self) -> Result<(), EventSourceError> {
        let headers = self.request_headers();
        self.debug_log(
            "Connecting",
            Some(json!({
                "url": self.url.as_str(),
                "transport": self.transport.name(),
                "headers": headers_json(&headers),
            })),
        );

        let response = self
            .transport
            .send(TransportRequest {
                url: self.url.clone(),
                headers,
                credentials: self.options.credentials,
            })
            .await?;

        if !response.is_success() {
            self.debug_log("HTTP error", Some(json!({ "status": response.status })));
            return Err(EventSourceError::Status {
                status: response.status,
            });
        }

        if response.status == 204 {
            {
                let mut state = self.state();
                if state.ready_state == ReadyState::Closed {
                    return Ok(());
                }
                state.ready_state = ReadyState::Closed;
            }
            self.debug_log("Server ended the stream (204 No Content)", None);
            self.dispatch(&MessageEvent::error(None));
            return Ok(());
        }

        let content_type = response.header(CONTENT_TYPE.as_str());
        if !content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains(EVENT_STREAM_MIME)) {
            self.debug_log("Invalid Content-Type", Some(json!(content_type)));
            return Err(EventSourceError::ContentType {
                content_type: content_type.map(str::to_owned),
            });
        }

        self.debug_log("Connected", Some(json!({ "status": response.status })));

        let opened = {
            let mut state = self.state();
            if state.ready_state == ReadyState::Connecting {
                state.ready_state = ReadyState::Open;
                state.failures = 0;
                true
            } else {
                false
            }
        };
        if opened {
            self.dispatch(&MessageEvent::open());
        }

        let mut body = response.body.ok_or_else(|| {
            self.debug_log("HTTP response body is missing", None);
            EventSourceError::MissingBody
        })?;

        let mut parser = SseParser::new();
        while let Some(chunk) = body.next().await {
            let directives = parser.feed(&chunk?)?;
            for directive in directives {
                if self.is_closed() {
                    return Ok(());
                }
                self.apply(directive);
            }
        }

        if self.is_closed() {
            return Ok(());
        }
        Err(EventSourceError::StreamEnded)
    }

    fn apply(&self, directive: SseDirective) {
        match directive {
            SseDirective::LastEventId(id) => {
                self.state().last_event_id = id;
            }
            SseDirective::Retry(delay) => {
                let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                self.state().server_retry_ms = Some(ms);
                self.debug_log("Server set reconnection delay", Some(json!(ms)));
            }
            SseDirective::Dispatch(event) => {
                let last_event_id = self.state().last_event_id.clone();
                self.dispatch(&MessageEvent::message(
                    event.event_type,
                    event.data,
                    self.origin.as_str(),
                    last_event_id,
                ));
            }
        }
    }

    fn finish_attempt(self: &Arc<Self>, result: Result<(), EventSourceError>) {
        let error = match result {
            Ok(()) => {
                self.state().attempt = None;
                return;
            }
            Err(error) => error,
        };

        let (delay_ms, exhausted) = {
            let mut state = self.state();
            state.attempt = None;
            if state.ready_state == ReadyState::Closed {
                return;
            }
            state.failures = state.failures.saturating_add(1);
            let config = &self.options.reconnect;
            let exhausted = config.is_exhausted(state.failures);
            state.ready_state = if exhausted {
                ReadyState::Closed
            } else {
                ReadyState::Connecting
            };
            let delay = calculate_delay(config, state.failures - 1, state.server_retry_ms);
            (delay, exhausted)
        };

        tracing::warn!(url = %self.url, "Event source connection failed: {error}");
        self.debug_log("Connection error", Some(json!(error.to_string())));
        self.dispatch(&MessageEvent::error(Some(error.to_string())));

        if exhausted {
            tracing::warn!(url = %self.url, "Giving up after repeated connection failures");
            return;
        }
        self.schedule_reconnect(delay_ms);
    }

    /// Arm the reconnection timer, replacing any pending one.
    fn schedule_reconnect(self: &Arc<Self>, delay_ms: u64) {
        {
            let mut state = self.state();
            if state.ready_state == ReadyState::Closed {
                return;
            }
            if let Some(previous) = state.reconnect_timer.take() {
                previous.abort();
            }
            let inner = Arc::clone(self);
            state.reconnect_timer = Some(self.runtime.spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                inner.connect().await;
            }));
        }
        self.debug_log("Scheduling reconnection after", Some(json!(delay_ms)));
    }
}

fn headers_json(headers: &HeaderMap) -> Value {
    headers
        .iter()
        .map(|(name, value)| {
            let value = value.to_str().unwrap_or("<binary>");
            (name.as_str().to_string(), Value::from(value))
        })
        .collect::<serde_json::Map<_, _>>()
        .into()
}
