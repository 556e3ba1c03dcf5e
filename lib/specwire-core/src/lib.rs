//! # Specwire Core
//!
//! Invoke HTTP operations declared in a Swagger 2.0 specification and get
//! schema-checked results back through cancellable, timeout-bounded
//! futures.
//!
//! The crate is built around four pieces:
//!
//! - **[`FutureAdapter`]** — abstraction over an in-flight transport
//!   request, with a single end-to-end timeout budget shared across the
//!   "wait for response" and "read the body" phases.
//! - **[`IncomingResponse`]** (built by a per-transport
//!   [`ResponseAdapter`]) — uniform response shape: status, ordered
//!   case-insensitive headers, and one-shot timeout-bounded body reads.
//! - **[`unmarshal_response`]** — resolves the declared response schema for
//!   the status code, decodes and validates the body, and converts non-2xx
//!   statuses into the typed [`HttpError`].
//! - **[`HttpFuture`]** — the handle callers await; yields the decoded
//!   value, `(value, response)`, or the raw response for spec-document
//!   fetches.
//!
//! A reqwest-backed transport binding ([`ReqwestClient`]) and a spec-aware
//! facade ([`SwaggerClient`]) sit on top.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use specwire_core::SwaggerClient;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), specwire_core::Error> {
//! let url = "http://petstore.example.com/swagger.json".parse().expect("url");
//! let client = SwaggerClient::from_url(&url).await?;
//!
//! // Await the builder directly, or call() for an explicit deadline.
//! let pet = client
//!     .operation("getPetById")?
//!     .param("petId", 42)
//!     .call()?
//!     .result(Some(Duration::from_secs(5)))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error handling
//!
//! Every non-2xx outcome of an operation call is an [`Error::Http`] whose
//! [`HttpError`] carries the response, the exact status code and its
//! family, so callers catch broad or narrow:
//!
//! ```rust,no_run
//! use specwire_core::{Error, StatusFamily};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let url = "http://petstore.example.com/swagger.json".parse().expect("url");
//! # let client = specwire_core::SwaggerClient::from_url(&url).await?;
//! match client.operation("getPetById")?.param("petId", 42).await {
//!     Ok(outcome) => println!("{:?}", outcome.into_value()),
//!     Err(Error::Http(error)) if error.status() == http::StatusCode::NOT_FOUND => {
//!         println!("no such pet");
//!     }
//!     Err(Error::Http(error)) if error.family() == StatusFamily::ServerError => {
//!         println!("server trouble: {error}");
//!     }
//!     Err(other) => return Err(other.into()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Timeouts
//!
//! `result(Some(deadline))` is one budget for the whole call. Time spent
//! waiting for the transport response is subtracted from what the body
//! reads get; the budget is never re-armed between phases. On elapse the
//! call fails with [`Error::Timeout`], and the in-flight request is kept so
//! a retry with a larger budget can still complete.

mod error;
pub use self::error::{Error, HttpError, StatusFamily, TimeoutError, TimeoutPhase};

mod response;
pub use self::response::{BodySource, BufferedBody, IncomingResponse, ResponseAdapter};

mod http_future;
pub use self::http_future::{CallValue, FutureAdapter, HttpFuture, TimedResponse, TimeoutBudget};

mod unmarshal;
pub use self::unmarshal::{ResponseCallback, unmarshal_response};

pub mod spec;
pub use self::spec::{Operation, Schema, SpecConfig, SwaggerSpec, load_file, load_url};

mod transport;
pub use self::transport::{
    FileUpload, ReqwestClient, ReqwestFutureAdapter, ReqwestHttpFuture, ReqwestResponseAdapter,
    RequestParams, shared_client,
};

mod client;
pub use self::client::{OperationCall, SwaggerClient};

mod warning;
