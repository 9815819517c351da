//! HTTP transport abstraction.
//!
//! Every signed request leaves the crate through the [`Transport`] trait.
//! [`HttpTransport`] is the reqwest-backed implementation; hosts and tests
//! can inject their own (recording, replaying, emulator-bound) transports.

use crate::config::ClientSettings;
use crate::error::{AwsError, AwsResult};
use crate::signing::SignedRequest;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Sends one signed request and returns the raw response.
///
/// Implementations must not retry: one call to `send` is one round trip.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: SignedRequest) -> AwsResult<HttpResponse>;
}

/// A response whose body has not necessarily been read yet.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercased.
    pub headers: BTreeMap<String, String>,
    pub body: ByteStream,
}

impl HttpResponse {
    pub fn new(status: u16, body: ByteStream) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The AWS request id header, if present.
    pub fn request_id(&self) -> Option<String> {
        self.headers
            .get("x-amz-request-id")
            .or_else(|| self.headers.get("x-amzn-requestid"))
            .cloned()
    }
}

/// A response body: either fully buffered or a stream of chunks still on
/// the wire.
pub struct ByteStream {
    inner: BoxStream<'static, AwsResult<Bytes>>,
}

impl ByteStream {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            inner: stream::once(async move { Ok(bytes) }).boxed(),
        }
    }

    pub fn empty() -> Self {
        Self {
            inner: stream::empty().boxed(),
        }
    }

    pub fn from_stream(stream: BoxStream<'static, AwsResult<Bytes>>) -> Self {
        Self { inner: stream }
    }

    /// Build a body from pre-cut chunks, some of which may be failures.
    pub fn from_chunks(chunks: Vec<AwsResult<Bytes>>) -> Self {
        Self {
            inner: stream::iter(chunks).boxed(),
        }
    }

    /// Drain the stream into one buffer.
    pub async fn collect(self) -> AwsResult<Bytes> {
        let mut buf = BytesMut::new();
        let mut inner = self.inner;
        while let Some(chunk) = inner.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Drain the stream and decode it as UTF-8 (lossy).
    pub async fn collect_string(self) -> AwsResult<String> {
        let bytes = self.collect().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ByteStream { .. }")
    }
}

// ── reqwest-backed transport ────────────────────────────────────────────

/// Transport over a dedicated reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    user_agent: String,
}

impl HttpTransport {
    pub fn new(settings: &ClientSettings) -> AwsResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .build()
            .map_err(|e| AwsError::transport("http", &format!("failed to build HTTP client: {}", e), false))?;
        Ok(Self {
            http,
            user_agent: settings.user_agent.clone(),
        })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: SignedRequest) -> AwsResult<HttpResponse> {
        let service = request.service.clone();
        let method: reqwest::Method = request.method.parse().map_err(|_| {
            AwsError::transport(&service, &format!("invalid HTTP method: {}", request.method), false)
        })?;

        let mut req = self.http.request(method, &request.url);
        for (key, value) in &request.headers {
            req = req.header(key.as_str(), value.as_str());
        }
        req = req.header("user-agent", &self.user_agent);
        if let Some(body) = request.body {
            req = req.body(body);
        }

        let resp = req.send().await.map_err(|e| {
            AwsError::transport(&service, &e.to_string(), e.is_timeout() || e.is_connect())
        })?;

        let status = resp.status().as_u16();
        let mut headers = BTreeMap::new();
        for (key, value) in resp.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.as_str().to_string(), v.to_string());
            }
        }
        let body_service = service.clone();
        let body = ByteStream::from_stream(
            resp.bytes_stream()
                .map_err(move |e| AwsError::transport(&body_service, &e.to_string(), false))
                .boxed(),
        );

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
