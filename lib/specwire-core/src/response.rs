use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};

use crate::error::{Error, TimeoutError};

/// One-shot read of a transport response body.
///
/// Implemented once per transport. The first body accessor on an
/// [`IncomingResponse`] consumes the source; re-reading an exhausted
/// transport stream is not a thing, so there is deliberately no way to get
/// the source back.
pub trait BodySource: Send {
    /// Reads the entire body.
    fn read(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<Bytes, Error>> + Send>>;
}

/// In-memory [`BodySource`], for tests and transports that buffer eagerly.
#[derive(Debug, Clone)]
pub struct BufferedBody(Bytes);

impl BufferedBody {
    /// Wraps already-buffered bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }
}

impl BodySource for BufferedBody {
    fn read(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<Bytes, Error>> + Send>> {
        let bytes = self.0;
        Box::pin(async move { Ok(bytes) })
    }
}

/// Normalizes a transport-native response into an [`IncomingResponse`].
///
/// The second half of a transport binding, next to
/// [`FutureAdapter`](crate::FutureAdapter): the future adapter produces the
/// raw response, this constructor turns it into the uniform shape the
/// unmarshalling pipeline consumes, capturing the unspent timeout budget for
/// the body-read phase.
pub trait ResponseAdapter {
    /// Transport-native response type.
    type Raw;

    /// Builds the uniform response. `remaining` is the unspent part of the
    /// caller's end-to-end deadline and bounds every body read.
    fn adapt(raw: Self::Raw, remaining: Option<Duration>) -> IncomingResponse;
}

/// Uniform view of an HTTP response, independent of the transport that
/// produced it.
///
/// Status code, headers and reason are zero-cost synchronous reads. The body
/// accessors ([`text`](Self::text), [`raw_bytes`](Self::raw_bytes),
/// [`json`](Self::json)) suspend, race the underlying read against the
/// remaining timeout budget captured at construction, and consume the body:
/// it is readable exactly once, a second read fails with
/// [`Error::BodyAlreadyConsumed`].
///
/// Header lookup is case-insensitive regardless of how the transport stores
/// header names; `headers()` is an [`http::HeaderMap`], which preserves
/// insertion order and normalizes names.
pub struct IncomingResponse {
    status: StatusCode,
    reason: String,
    headers: HeaderMap,
    remaining: Option<Duration>,
    // The mutex makes the one-shot take Sync-safe; it is never held across
    // a suspension point.
    body: Mutex<Option<Box<dyn BodySource>>>,
}

impl fmt::Debug for IncomingResponse {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body_consumed = self
            .body
            .try_lock()
            .map_or(true, |body| body.is_none());
        formatter
            .debug_struct("IncomingResponse")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .field("remaining", &self.remaining)
            .field("body_consumed", &body_consumed)
            .finish()
    }
}

impl IncomingResponse {
    /// Builds a response from its parts.
    ///
    /// Transport bindings call this from their
    /// [`ResponseAdapter::adapt`]; tests typically pair it with
    /// [`BufferedBody`].
    #[must_use]
    pub fn new(
        status: StatusCode,
        reason: impl Into<String>,
        headers: HeaderMap,
        remaining: Option<Duration>,
        body: Box<dyn BodySource>,
    ) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers,
            remaining,
            body: Mutex::new(Some(body)),
        }
    }

    /// HTTP status code.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Reason phrase.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Response headers (ordered, case-insensitive lookup).
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Single header value as text, by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Parsed `Content-Type`, when present and well-formed.
    #[must_use]
    pub fn content_type(&self) -> Option<mime::Mime> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
    }

    /// Unspent timeout budget captured at construction.
    #[must_use]
    pub fn remaining_timeout(&self) -> Option<Duration> {
        self.remaining
    }

    /// Reads the body as raw bytes.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Timeout`] when the remaining budget elapses
    /// before the read completes, with [`Error::BodyAlreadyConsumed`] on a
    /// second read, or with the transport's own error.
    pub async fn raw_bytes(&mut self) -> Result<Bytes, Error> {
        let source = self
            .body
            .get_mut()
            .ok()
            .and_then(Option::take)
            .ok_or(Error::BodyAlreadyConsumed)?;
        let read = source.read();
        match self.remaining {
            Some(budget) => tokio::time::timeout(budget, read)
                .await
                .map_err(|_elapsed| Error::Timeout(TimeoutError::body()))?,
            None => read.await,
        }
    }

    /// Reads the body as text (UTF-8, lossy).
    ///
    /// # Errors
    ///
    /// Same failure modes as [`raw_bytes`](Self::raw_bytes).
    pub async fn text(&mut self) -> Result<String, Error> {
        let bytes = self.raw_bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Reads and parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`raw_bytes`](Self::raw_bytes), plus
    /// [`Error::Json`] when the body is not valid JSON.
    pub async fn json(&mut self) -> Result<serde_json::Value, Error> {
        let bytes = self.raw_bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
