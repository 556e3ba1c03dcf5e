use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use headers::{ContentType, HeaderMapExt};
use http::{HeaderMap, Method};
use indexmap::IndexMap;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

use crate::error::{Error, TimeoutError};
use crate::http_future::{FutureAdapter, HttpFuture, TimedResponse, TimeoutBudget};
use crate::response::{BodySource, IncomingResponse, ResponseAdapter};
use crate::spec::Operation;

/// The future returned by the bundled reqwest binding.
pub type ReqwestHttpFuture = HttpFuture<ReqwestFutureAdapter, ReqwestResponseAdapter>;

/// One file to attach to a multipart form.
#[derive(Debug, Clone)]
pub struct FileUpload {
    /// Form field name.
    pub name: String,
    /// File name reported in the part.
    pub file_name: String,
    /// File content.
    pub content: Bytes,
}

/// Everything needed to issue one transport request.
///
/// Built by the client facade from marshalled operation parameters, or by
/// hand for raw requests (spec fetches). Exactly one body shape applies:
/// files force a multipart form, otherwise form fields are urlencoded,
/// otherwise the raw body (if any) is sent as-is.
#[derive(Debug)]
pub struct RequestParams {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL (path already substituted).
    pub url: Url,
    /// Query parameters, appended in insertion order.
    pub query: IndexMap<String, String>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Form fields.
    pub form: IndexMap<String, String>,
    /// Multipart file uploads.
    pub files: Vec<FileUpload>,
    /// Raw request body.
    pub body: Option<Bytes>,
}

impl RequestParams {
    /// Starts from a method and an absolute URL.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            query: IndexMap::new(),
            headers: HeaderMap::new(),
            form: IndexMap::new(),
            files: Vec::new(),
            body: None,
        }
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Adds a form field.
    #[must_use]
    pub fn with_form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.insert(name.into(), value.into());
        self
    }

    /// Attaches a file, switching the request to a multipart form.
    #[must_use]
    pub fn with_file(mut self, file: FileUpload) -> Self {
        self.files.push(file);
        self
    }

    /// Sets a JSON body (and the matching content type).
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Json`] when the value does not serialize.
    pub fn with_json_body(mut self, value: &serde_json::Value) -> Result<Self, Error> {
        self.headers.typed_insert(ContentType::json());
        self.body = Some(Bytes::from(serde_json::to_vec(value)?));
        Ok(self)
    }
}

/// reqwest-backed [`FutureAdapter`].
///
/// Holds the spawned request task. The deadline budget accumulates across
/// `result` calls; a timeout keeps the task alive so a retry with a larger
/// budget can still complete. Dropping the adapter aborts the task, which
/// is how caller-side cancellation reaches the transport.
#[derive(Debug)]
pub struct ReqwestFutureAdapter {
    handle: Option<JoinHandle<Result<reqwest::Response, reqwest::Error>>>,
    budget: TimeoutBudget,
}

impl ReqwestFutureAdapter {
    /// Spawns the request onto the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, as `tokio::spawn` does.
    #[must_use]
    pub fn spawn<F>(request: F) -> Self
    where
        F: Future<Output = Result<reqwest::Response, reqwest::Error>> + Send + 'static,
    {
        Self {
            handle: Some(tokio::spawn(request)),
            budget: TimeoutBudget::new(),
        }
    }
}

impl FutureAdapter for ReqwestFutureAdapter {
    type Raw = reqwest::Response;

    async fn result(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<TimedResponse<reqwest::Response>, Error> {
        let handle = self.handle.as_mut().ok_or(Error::RequestCancelled)?;

        let effective = self.budget.effective(timeout);
        let started = Instant::now();
        let joined = match effective {
            Some(budget) => match tokio::time::timeout(budget, &mut *handle).await {
                Ok(joined) => joined,
                Err(_elapsed) => {
                    self.budget.record(started.elapsed());
                    return Err(Error::Timeout(TimeoutError::response()));
                }
            },
            None => (&mut *handle).await,
        };
        self.budget.record(started.elapsed());
        self.handle = None;

        let response = joined
            .map_err(|_join_error| Error::RequestCancelled)?
            .map_err(|err| {
                if err.is_timeout() {
                    Error::Timeout(TimeoutError::response())
                } else {
                    Error::Transport(err)
                }
            })?;

        Ok(TimedResponse {
            response,
            remaining: self.budget.effective(timeout),
        })
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for ReqwestFutureAdapter {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

/// reqwest-backed [`ResponseAdapter`].
#[derive(Debug, Clone, Copy)]
pub struct ReqwestResponseAdapter;

impl ResponseAdapter for ReqwestResponseAdapter {
    type Raw = reqwest::Response;

    fn adapt(raw: reqwest::Response, remaining: Option<Duration>) -> IncomingResponse {
        let status = raw.status();
        // reqwest does not surface the server's reason phrase.
        let reason = status.canonical_reason().unwrap_or_default();
        let headers = raw.headers().clone();
        IncomingResponse::new(status, reason, headers, remaining, Box::new(ReqwestBody(raw)))
    }
}

struct ReqwestBody(reqwest::Response);

impl BodySource for ReqwestBody {
    fn read(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<Bytes, Error>> + Send>> {
        Box::pin(async move {
            self.0.bytes().await.map_err(|err| {
                if err.is_timeout() {
                    Error::Timeout(TimeoutError::body())
                } else {
                    Error::Transport(err)
                }
            })
        })
    }
}

/// reqwest-backed transport binding.
///
/// Owns a [`reqwest::Client`] (itself a cheap handle over a shared
/// connection pool). Most callers use one client per process — either this
/// type's [`Default`] or [`shared_client`] — but nothing in the runtime
/// requires it: pass any client you configured yourself.
#[derive(Debug, Clone, Default)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Client over a fresh connection pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Client over an explicitly configured `reqwest::Client`.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Issues a request and returns the future handle for it.
    ///
    /// The request starts immediately on the current tokio runtime; the
    /// returned [`HttpFuture`] is awaited for the outcome. `operation` is
    /// `None` for raw fetches (spec documents), in which case the future
    /// yields the response without unmarshalling it.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Transport`] when the request cannot be built.
    pub fn request(
        &self,
        params: RequestParams,
        operation: Option<Arc<Operation>>,
    ) -> Result<ReqwestHttpFuture, Error> {
        let request = self.build_request(params)?;
        debug!(method = %request.method(), url = %request.url(), "sending...");

        let client = self.client.clone();
        let adapter = ReqwestFutureAdapter::spawn(async move { client.execute(request).await });
        Ok(HttpFuture::new(adapter, operation))
    }

    fn build_request(&self, params: RequestParams) -> Result<reqwest::Request, Error> {
        let RequestParams {
            method,
            url,
            query,
            headers,
            form,
            files,
            body,
        } = params;

        let mut builder = self.client.request(method, url).headers(headers);
        if !query.is_empty() {
            builder = builder.query(&query);
        }

        if files.is_empty() {
            if form.is_empty() {
                if let Some(body) = body {
                    builder = builder.body(body);
                }
            } else {
                builder = builder.form(&form);
            }
        } else {
            let mut multipart = reqwest::multipart::Form::new();
            for (name, value) in form {
                multipart = multipart.text(name, value);
            }
            for file in files {
                let part = reqwest::multipart::Part::bytes(file.content.to_vec())
                    .file_name(file.file_name);
                multipart = multipart.part(file.name, part);
            }
            builder = builder.multipart(multipart);
        }

        Ok(builder.build()?)
    }
}

static SHARED_CLIENT: OnceLock<ReqwestClient> = OnceLock::new();

/// Process-wide [`ReqwestClient`], created lazily on first use.
///
/// Connection reuse, nothing more: every constructor in the crate also
/// accepts an explicitly supplied client.
pub fn shared_client() -> &'static ReqwestClient {
    SHARED_CLIENT.get_or_init(ReqwestClient::new)
}
