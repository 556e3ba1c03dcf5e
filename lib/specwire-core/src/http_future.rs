use std::future::{Future, IntoFuture};
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::Error;
use crate::response::{IncomingResponse, ResponseAdapter};
use crate::spec::Operation;
use crate::unmarshal::{ResponseCallback, unmarshal_response};

#[cfg(test)]
mod tests;

/// A raw transport response paired with the unspent part of the caller's
/// timeout budget.
#[derive(Debug)]
pub struct TimedResponse<Raw> {
    /// Transport-native response.
    pub response: Raw,
    /// Unspent budget; `None` when the caller set no deadline.
    pub remaining: Option<Duration>,
}

/// Cumulative wall-clock accounting for a single end-to-end deadline.
///
/// Adapters record the time spent in each wait; the effective budget for the
/// next phase is the caller's deadline minus everything spent so far,
/// clamped at zero. The remaining budget is what downstream body reads get,
/// so one deadline covers both call phases instead of being re-armed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeoutBudget {
    spent: Duration,
}

impl TimeoutBudget {
    /// Fresh budget with nothing spent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective wait for the next phase under `timeout`, clamped at zero.
    #[must_use]
    pub fn effective(&self, timeout: Option<Duration>) -> Option<Duration> {
        timeout.map(|timeout| timeout.saturating_sub(self.spent))
    }

    /// Records wall-clock time spent in a phase.
    pub fn record(&mut self, elapsed: Duration) {
        self.spent += elapsed;
    }

    /// Total time spent across recorded phases.
    #[must_use]
    pub fn spent(&self) -> Duration {
        self.spent
    }
}

/// Abstraction over an in-flight transport request.
///
/// Implemented once per transport, next to a matching
/// [`ResponseAdapter`]. The bundled reqwest binding is
/// [`ReqwestFutureAdapter`](crate::ReqwestFutureAdapter).
pub trait FutureAdapter {
    /// Transport-native response type produced on completion.
    type Raw;

    /// Suspends until the request completes or `timeout` elapses.
    ///
    /// Wall-clock time spent waiting accumulates across calls: a later call
    /// is bounded by `timeout` minus everything already spent, never by a
    /// fresh deadline (see [`TimeoutBudget`]). On elapse the adapter fails
    /// with [`Error::Timeout`] and keeps the in-flight request, so a retry
    /// with a larger budget can still succeed.
    fn result(
        &mut self,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<TimedResponse<Self::Raw>, Error>> + Send;

    /// Best-effort cancellation of the in-flight request.
    ///
    /// Transports that cannot cancel let the request run to completion and
    /// discard its result.
    fn cancel(&mut self) {}
}

/// What [`HttpFuture::result`] resolves to.
#[derive(Debug)]
pub enum CallValue {
    /// Decoded operation result; `None` when the matching response declares
    /// no schema.
    Value(Option<serde_json::Value>),
    /// Decoded operation result plus the response it was read from.
    /// Produced when the future was built with `also_return_response`.
    ValueAndResponse(Option<serde_json::Value>, IncomingResponse),
    /// The raw response, unmarshalled by nobody. Produced when the future
    /// was built without an operation (fetching a spec document); this is
    /// the one path where a non-2xx status is not an error.
    Raw(IncomingResponse),
}

impl CallValue {
    /// The decoded value, if this outcome carries one.
    #[must_use]
    pub fn into_value(self) -> Option<serde_json::Value> {
        match self {
            Self::Value(value) | Self::ValueAndResponse(value, _) => value,
            Self::Raw(_) => None,
        }
    }

    /// The response, if this outcome carries one.
    #[must_use]
    pub fn into_response(self) -> Option<IncomingResponse> {
        match self {
            Self::Value(_) => None,
            Self::ValueAndResponse(_, response) | Self::Raw(response) => Some(response),
        }
    }

    /// Splits into `(value, response)`.
    #[must_use]
    pub fn into_parts(self) -> (Option<serde_json::Value>, Option<IncomingResponse>) {
        match self {
            Self::Value(value) => (value, None),
            Self::ValueAndResponse(value, response) => (value, Some(response)),
            Self::Raw(response) => (None, Some(response)),
        }
    }
}

/// Single-use handle for one in-flight operation call.
///
/// Returned by the transport when a request is issued; the caller awaits
/// [`result`](Self::result) (or the future directly, via `IntoFuture`) to
/// get the decoded outcome. Dropping the handle before or during the await
/// cancels the underlying request where the transport supports it.
///
/// # Example
///
/// ```rust,no_run
/// # async fn example() -> Result<(), specwire_core::Error> {
/// # let client = specwire_core::SwaggerClient::from_url(
/// #     &"http://petstore.example.com/swagger.json".parse().expect("url"),
/// # ).await?;
/// use std::time::Duration;
///
/// let pet = client
///     .operation("getPetById")?
///     .param("petId", 42)
///     .call()?
///     .result(Some(Duration::from_secs(5)))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct HttpFuture<A, R> {
    future: A,
    operation: Option<Arc<Operation>>,
    response_callbacks: Vec<ResponseCallback>,
    also_return_response: bool,
    _adapter: PhantomData<R>,
}

impl<A, R> HttpFuture<A, R>
where
    A: FutureAdapter,
    R: ResponseAdapter<Raw = A::Raw>,
{
    /// Wraps an in-flight request.
    ///
    /// `operation` is `None` when the request merely fetches a
    /// specification document; `result()` then yields the raw response.
    #[must_use]
    pub fn new(future: A, operation: Option<Arc<Operation>>) -> Self {
        Self {
            future,
            operation,
            response_callbacks: Vec::new(),
            also_return_response: false,
            _adapter: PhantomData,
        }
    }

    /// Registers a response callback, invoked exactly once when the
    /// response resolves, in registration order, after body decoding and
    /// before the outcome is surfaced.
    #[must_use]
    pub fn with_response_callback(mut self, callback: ResponseCallback) -> Self {
        self.response_callbacks.push(callback);
        self
    }

    /// Replaces the registered response callbacks.
    #[must_use]
    pub fn with_response_callbacks(mut self, callbacks: Vec<ResponseCallback>) -> Self {
        self.response_callbacks = callbacks;
        self
    }

    /// Makes `result()` yield [`CallValue::ValueAndResponse`] instead of
    /// the value alone.
    #[must_use]
    pub fn with_also_return_response(mut self, also_return_response: bool) -> Self {
        self.also_return_response = also_return_response;
        self
    }

    /// Awaits the response and unmarshals it.
    ///
    /// `timeout` is a single end-to-end deadline covering both the wait for
    /// the transport response and the body read; each phase is bounded by
    /// what the previous phases left unspent.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Http`] for non-2xx statuses on the operation
    /// path, [`Error::Timeout`] when the deadline elapses, or any error
    /// surfaced by the adapters or the decode layer.
    pub async fn result(mut self, timeout: Option<Duration>) -> Result<CallValue, Error> {
        debug!(?timeout, "awaiting transport response");
        let timed = self.future.result(timeout).await?;
        let response = R::adapt(timed.response, timed.remaining);
        debug!(status = %response.status_code(), "response received");

        let Some(operation) = self.operation.take() else {
            return Ok(CallValue::Raw(response));
        };

        let (value, response) =
            unmarshal_response(response, &operation, &mut self.response_callbacks).await?;
        if self.also_return_response {
            Ok(CallValue::ValueAndResponse(value, response))
        } else {
            Ok(CallValue::Value(value))
        }
    }

    /// Awaits the response and deserializes the decoded value into `T`.
    ///
    /// A schemaless (or raw) outcome deserializes from JSON `null`.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`result`](Self::result), plus
    /// [`Error::Json`] when the decoded value does not fit `T`.
    pub async fn result_as<T>(self, timeout: Option<Duration>) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let value = self
            .result(timeout)
            .await?
            .into_value()
            .unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(value)?)
    }

    /// Cancels the underlying request (best effort) and discards the
    /// handle.
    pub fn cancel(mut self) {
        self.future.cancel();
    }
}

impl<A, R> IntoFuture for HttpFuture<A, R>
where
    A: FutureAdapter + Send + 'static,
    A::Raw: Send,
    R: ResponseAdapter<Raw = A::Raw> + Send + 'static,
{
    type Output = Result<CallValue, Error>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.result(None))
    }
}
