use serde_json::Value;
use tracing::debug;

use crate::error::{Error, HttpError};
use crate::response::IncomingResponse;
use crate::spec::{Operation, decode_response};

/// Caller-supplied hook observing a resolved response.
///
/// Invoked exactly once per resolved response, in registration order, after
/// body decoding and before the value is returned or the error raised. A
/// failing callback is not caught: its error propagates to the caller and
/// can mask the HTTP error of the response it was observing.
pub type ResponseCallback = Box<
    dyn FnMut(
            &IncomingResponse,
            &Operation,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
        + Send,
>;

/// What the decode phase concluded, before callbacks run and the outcome is
/// surfaced. Errors that must reach the caller as-is (transport, JSON,
/// validation, ...) stay in the surrounding `Result`.
enum Decoded {
    /// Body decoded (or no schema applied).
    Value(Option<Value>),
    /// 5xx: decoding was skipped so the original server error surfaces
    /// undisturbed.
    ServerError,
    /// No declared response matched; the message survives only for 2xx.
    NoMatchingResponse(Option<String>),
}

/// Unmarshals a resolved response against its operation.
///
/// Resolves the declared response for the status code (exact match, then
/// `default`, then none), decodes and validates the body, runs the
/// callbacks, and converts non-2xx statuses into [`Error::Http`].
///
/// Server errors (500–599) never attempt body decoding: the point is to
/// surface the original server error, not a secondary decode error. This
/// suppression is deliberately asymmetric — a 4xx body that fails to decode
/// propagates its decode error.
///
/// # Errors
///
/// Fails with [`Error::Http`] for any non-2xx status (carrying the decoded
/// error body when one was produced), or with whatever the decode layer or
/// a callback surfaced.
pub async fn unmarshal_response(
    mut response: IncomingResponse,
    operation: &Operation,
    response_callbacks: &mut [ResponseCallback],
) -> Result<(Option<Value>, IncomingResponse), Error> {
    let status = response.status_code();

    let decoded = if status.is_server_error() {
        Ok(Decoded::ServerError)
    } else {
        match decode_response(&mut response, operation).await {
            Ok(value) => Ok(Decoded::Value(value)),
            Err(Error::MatchingResponseNotFound { message, .. }) => {
                debug!(%status, "no declared response matched");
                let message = status.is_success().then_some(message);
                Ok(Decoded::NoMatchingResponse(message))
            }
            Err(other) => Err(other),
        }
    };

    // Callbacks run whatever the decode concluded, before any outcome is
    // surfaced. Their errors are not caught.
    for callback in response_callbacks.iter_mut() {
        callback(&response, operation).map_err(|err| Error::Callback {
            message: err.to_string(),
        })?;
    }

    match decoded? {
        Decoded::Value(value) => {
            if status.is_success() {
                Ok((value, response))
            } else {
                Err(HttpError::new(response).with_swagger_result(value).into())
            }
        }
        Decoded::ServerError => Err(HttpError::new(response).into()),
        Decoded::NoMatchingResponse(message) => {
            let mut error = HttpError::new(response);
            if let Some(message) = message {
                error = error.with_message(message);
            }
            Err(error.into())
        }
    }
}
