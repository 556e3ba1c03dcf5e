use std::fmt;

use http::StatusCode;

use crate::response::IncomingResponse;

/// Phase of a call during which the end-to-end deadline elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum TimeoutPhase {
    /// Waiting for the transport to produce a response head.
    #[display("the transport response")]
    Response,
    /// Waiting for the response body to be read.
    #[display("the response body")]
    Body,
}

/// The caller-supplied deadline elapsed before the call completed.
///
/// A single deadline covers both the wait for the transport response and the
/// body read; the phase records which one ran out of budget. Timeouts are
/// always locally recoverable: the in-flight request is kept, so calling
/// [`FutureAdapter::result`](crate::FutureAdapter::result) again with a
/// larger budget can still succeed. The runtime never retries on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Error, derive_more::Display)]
#[display("deadline elapsed while waiting for {phase}")]
pub struct TimeoutError {
    /// Which wait exhausted the deadline.
    pub phase: TimeoutPhase,
}

impl TimeoutError {
    /// Deadline elapsed while waiting for the transport response.
    #[must_use]
    pub fn response() -> Self {
        Self {
            phase: TimeoutPhase::Response,
        }
    }

    /// Deadline elapsed while reading the response body.
    #[must_use]
    pub fn body() -> Self {
        Self {
            phase: TimeoutPhase::Body,
        }
    }
}

/// HTTP status family of an error response.
///
/// Produced by [`StatusFamily::of`], a pure status-to-family mapping:
/// 400–499 is [`ClientError`](Self::ClientError), 500–599 is
/// [`ServerError`](Self::ServerError), everything else (including 1xx/3xx
/// and out-of-range codes) is [`Other`](Self::Other).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFamily {
    /// 400–499.
    ClientError,
    /// 500–599.
    ServerError,
    /// Any code outside the error families.
    Other,
}

impl StatusFamily {
    /// Maps a status code to its family.
    #[must_use]
    pub fn of(status: u16) -> Self {
        match status {
            400..=499 => Self::ClientError,
            500..=599 => Self::ServerError,
            _ => Self::Other,
        }
    }
}

/// A non-success HTTP response, tagged by status family and exact code.
///
/// Carries the [`IncomingResponse`] it was built from, an optional context
/// message (set when a decode-layer condition was translated into an HTTP
/// error), and the decoded error body when the operation declared a schema
/// for the failing status.
///
/// The string form is `"<code> <reason>[: <message>][: <swagger_result>]"`,
/// with the optional parts colon-joined only when present.
#[derive(Debug)]
pub struct HttpError {
    /// The response that produced this error. The body may already be
    /// consumed; the head (status, headers, reason) is always available.
    pub response: IncomingResponse,
    /// Optional context message.
    pub message: Option<String>,
    /// Decoded error body, when one was produced.
    pub swagger_result: Option<serde_json::Value>,
}

impl HttpError {
    /// Builds an error from a response, with no message and no decoded body.
    #[must_use]
    pub fn new(response: IncomingResponse) -> Self {
        Self {
            response,
            message: None,
            swagger_result: None,
        }
    }

    /// Attaches a context message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches the decoded error body.
    #[must_use]
    pub fn with_swagger_result(mut self, swagger_result: Option<serde_json::Value>) -> Self {
        self.swagger_result = swagger_result;
        self
    }

    /// Exact status code of the failing response.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.response.status_code()
    }

    /// Status family of the failing response.
    #[must_use]
    pub fn family(&self) -> StatusFamily {
        StatusFamily::of(self.response.status_code().as_u16())
    }

    /// Whether the status is in 400–499.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.family() == StatusFamily::ClientError
    }

    /// Whether the status is in 500–599.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.family() == StatusFamily::ServerError
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} {}",
            self.response.status_code().as_u16(),
            self.response.reason()
        )?;
        if let Some(message) = &self.message {
            write!(formatter, ": {message}")?;
        }
        if let Some(swagger_result) = &self.swagger_result {
            write!(formatter, ": {swagger_result}")?;
        }
        Ok(())
    }
}

impl std::error::Error for HttpError {}

/// Errors that can occur when loading a specification or invoking an
/// operation.
///
/// All variants implement `std::error::Error`. Variants wrapping another
/// error delegate their display to it.
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum Error {
    /// Typed non-2xx outcome of an operation call.
    ///
    /// The exact subtype is derived from the status code; match on
    /// [`HttpError::family`] for broad handling or [`HttpError::status`]
    /// for narrow handling.
    Http(HttpError),

    /// The end-to-end deadline elapsed in one of the two call phases.
    Timeout(TimeoutError),

    /// Transport error from the underlying reqwest client.
    Transport(reqwest::Error),

    /// URL parsing error when constructing request URLs.
    Url(url::ParseError),

    /// Invalid HTTP header name.
    InvalidHeaderName(http::header::InvalidHeaderName),

    /// Invalid HTTP header value.
    InvalidHeaderValue(http::header::InvalidHeaderValue),

    /// JSON parse or serialization error.
    Json(serde_json::Error),

    /// YAML parse error while loading a specification document.
    Yaml(serde_yaml::Error),

    /// I/O error while loading a specification document from disk.
    Io(std::io::Error),

    /// The in-flight request task was cancelled or panicked before
    /// producing a response.
    #[display("request task was cancelled before completing")]
    RequestCancelled,

    /// A body accessor was called after the body had been consumed.
    #[display("response body already consumed")]
    BodyAlreadyConsumed,

    /// No declared response (exact status or `default`) matched.
    ///
    /// Internal to the unmarshalling pipeline: always translated into an
    /// [`Error::Http`] before reaching `result()` callers.
    #[display("no matching response found for status {status}: {message}")]
    #[from(skip)]
    MatchingResponseNotFound {
        /// Status code with no declared response.
        status: u16,
        /// Description of the lookup that failed.
        message: String,
    },

    /// The decoded body does not satisfy the declared response schema.
    #[display("response does not match schema at '{path}': {message}")]
    #[from(skip)]
    Validation {
        /// Pointer-style path to the offending value.
        path: String,
        /// Description of the mismatch.
        message: String,
    },

    /// The loaded document is not a usable Swagger 2.0 specification.
    #[display("unsupported specification document: {message}")]
    #[from(skip)]
    SpecFormat {
        /// Description of what is wrong with the document.
        message: String,
    },

    /// The specification declares no operation with the requested id.
    #[display("missing operation: {id}")]
    #[from(skip)]
    MissingOperation {
        /// The operation id that was not found.
        id: String,
    },

    /// A required parameter was not supplied before invoking an operation.
    #[display("operation '{operation_id}' is missing required parameter '{name}' ({location})")]
    #[from(skip)]
    MissingParameter {
        /// Operation being invoked.
        operation_id: String,
        /// Declared parameter name.
        name: String,
        /// Declared parameter location (`path`, `query`, ...).
        location: String,
    },

    /// A response callback failed.
    ///
    /// Callback errors are not caught by the unmarshalling pipeline and can
    /// mask the HTTP error of the response they were observing.
    #[display("response callback failed: {message}")]
    #[from(skip)]
    Callback {
        /// Display form of the callback's error.
        message: String,
    },
}

impl Error {
    /// The typed HTTP error carried by this error, if any.
    #[must_use]
    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            Self::Http(http_error) => Some(http_error),
            _ => None,
        }
    }

    /// Whether this error is a deadline elapse.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderMap;
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::response::BufferedBody;

    fn response_500() -> IncomingResponse {
        IncomingResponse::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server Error",
            HeaderMap::new(),
            None,
            Box::new(BufferedBody::new("")),
        )
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_display_response_only() {
        let error = HttpError::new(response_500());
        assert_eq!(error.to_string(), "500 Server Error");
    }

    #[test]
    fn test_display_response_and_message() {
        let error = HttpError::new(response_500()).with_message("Kaboom");
        assert_eq!(error.to_string(), "500 Server Error: Kaboom");
    }

    #[test]
    fn test_display_response_and_swagger_result() {
        let error =
            HttpError::new(response_500()).with_swagger_result(Some(json!({"msg": "Kaboom"})));
        assert_eq!(error.to_string(), r#"500 Server Error: {"msg":"Kaboom"}"#);
    }

    #[test]
    fn test_display_response_and_message_and_swagger_result() {
        let error = HttpError::new(response_500())
            .with_message("Holy moly!")
            .with_swagger_result(Some(json!({"msg": "Kaboom"})));
        insta::assert_snapshot!(
            error.to_string(),
            @r#"500 Server Error: Holy moly!: {"msg":"Kaboom"}"#
        );
    }

    #[rstest]
    #[case(400, StatusFamily::ClientError)]
    #[case(404, StatusFamily::ClientError)]
    #[case(499, StatusFamily::ClientError)]
    #[case(500, StatusFamily::ServerError)]
    #[case(503, StatusFamily::ServerError)]
    #[case(599, StatusFamily::ServerError)]
    #[case(100, StatusFamily::Other)]
    #[case(302, StatusFamily::Other)]
    #[case(600, StatusFamily::Other)]
    fn test_status_family_mapping(#[case] status: u16, #[case] expected: StatusFamily) {
        assert_eq!(StatusFamily::of(status), expected);
    }

    #[test]
    fn test_family_of_unknown_code_is_attached_to_no_family() {
        let response = IncomingResponse::new(
            StatusCode::from_u16(600).expect("code accepted by http crate"),
            "Womp Error",
            HeaderMap::new(),
            None,
            Box::new(BufferedBody::new("")),
        );
        let error = HttpError::new(response);
        assert_eq!(error.family(), StatusFamily::Other);
        assert!(!error.is_client_error());
        assert!(!error.is_server_error());
    }
}
