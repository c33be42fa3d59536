//! Transport seam: issuing the streaming request and exposing the body as
//! a stream of byte chunks.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::header::{AUTHORIZATION, COOKIE, HeaderMap};
use rivulet_types::{CredentialsMode, EventSourceError};
use url::Url;

/// A boxed stream of body chunks. The stream ending is end-of-stream.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, EventSourceError>> + Send>>;

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TransportResponse, EventSourceError>> + Send + 'a>>;

/// A single GET request for an event stream.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: Url,
    pub headers: HeaderMap,
    pub credentials: CredentialsMode,
}

/// Response head plus the streamed body.
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Option<ByteStream>,
}

impl TransportResponse {
    /// `true` for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Look up a header value as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(|_| "<stream>"))
            .finish()
    }
}

/// Something that can open a streaming HTTP response.
///
/// Dyn-compatible so `EventSource` works with `Arc<dyn Transport>`. Dropping
/// the returned future, or the body stream, must abort the request.
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, request: TransportRequest) -> TransportFuture<'a>;

    /// Transport name for logging.
    fn name(&self) -> &str;
}

/// Default transport backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, EventSourceError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| EventSourceError::Network(e.to_string()))?;
        Ok(Self { http })
    }

    /// Use a preconfigured client (proxies, TLS roots, timeouts).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Transport for ReqwestTransport {
    fn send<'a>(&'a self, request: TransportRequest) -> TransportFuture<'a> {
        Box::pin(async move {
            let mut headers = request.headers;
            if request.credentials == CredentialsMode::Omit {
                headers.remove(AUTHORIZATION);
                headers.remove(COOKIE);
            }

            let response = self
                .http
                .get(request.url)
                .headers(headers)
                .send()
                .await
                .map_err(|e| EventSourceError::Network(e.to_string()))?;

            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| EventSourceError::Network(e.to_string())));

            Ok(TransportResponse {
                status,
                headers,
                body: Some(Box::pin(body) as ByteStream),
            })
        })
    }

    fn name(&self) -> &str {
        "reqwest"
    }
}
