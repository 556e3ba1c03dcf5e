use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;

use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;
use url::Url;

use bytes::Bytes;

use crate::error::Error;
use crate::http_future::CallValue;
use crate::response::IncomingResponse;
use crate::spec::{Operation, ParameterLocation, SwaggerSpec, load_url};
use crate::transport::{FileUpload, ReqwestClient, ReqwestHttpFuture, RequestParams, shared_client};
use crate::unmarshal::ResponseCallback;
use crate::warning::warn_for_deprecated_op;

/// Spec-aware client: looks up operations by id and invokes them.
///
/// # Example
///
/// ```rust,no_run
/// use specwire_core::SwaggerClient;
///
/// # async fn example() -> Result<(), specwire_core::Error> {
/// let url = "http://petstore.example.com/swagger.json".parse().expect("url");
/// let client = SwaggerClient::from_url(&url).await?;
///
/// let pet = client
///     .operation("getPetById")?
///     .param("petId", 42)
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SwaggerClient {
    spec: SwaggerSpec,
    transport: ReqwestClient,
}

impl SwaggerClient {
    /// Fetches a specification document and builds a client over the
    /// process-wide shared transport.
    ///
    /// # Errors
    ///
    /// Fails with whatever the fetch or the document build fails with.
    pub async fn from_url(url: &Url) -> Result<Self, Error> {
        Self::from_url_with_client(url, shared_client().clone()).await
    }

    /// Same as [`from_url`](Self::from_url) with an explicit transport.
    ///
    /// # Errors
    ///
    /// See [`from_url`](Self::from_url).
    pub async fn from_url_with_client(url: &Url, transport: ReqwestClient) -> Result<Self, Error> {
        let document = load_url(&transport, url).await?;
        let spec = SwaggerSpec::from_value(document, url)?;
        Ok(Self { spec, transport })
    }

    /// Builds a client from an already-parsed document.
    ///
    /// `origin` is where the document came from; it backfills
    /// `schemes`/`host` when the document omits them.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::SpecFormat`] for non-2.0 documents.
    pub fn from_spec(document: Value, origin: &Url) -> Result<Self, Error> {
        let spec = SwaggerSpec::from_value(document, origin)?;
        Ok(Self {
            spec,
            transport: shared_client().clone(),
        })
    }

    /// Replaces the transport.
    #[must_use]
    pub fn with_transport(mut self, transport: ReqwestClient) -> Self {
        self.transport = transport;
        self
    }

    /// The parsed specification.
    #[must_use]
    pub fn spec(&self) -> &SwaggerSpec {
        &self.spec
    }

    /// Starts an invocation of the operation with this id.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::MissingOperation`] for an unknown id.
    pub fn operation(&self, id: &str) -> Result<OperationCall, Error> {
        let operation = Arc::clone(self.spec.operation(id)?);
        Ok(OperationCall {
            transport: self.transport.clone(),
            base_url: self.spec.base_url().clone(),
            operation,
            arguments: IndexMap::new(),
            files: Vec::new(),
            callbacks: Vec::new(),
            also_return_response: false,
        })
    }
}

/// Builder for one operation invocation.
///
/// Collects arguments, marshals them according to the operation's declared
/// parameter locations, and hands the request to the transport. Awaiting
/// the builder directly is sugar for `call()?.result(None)`.
pub struct OperationCall {
    transport: ReqwestClient,
    base_url: Url,
    operation: Arc<Operation>,
    arguments: IndexMap<String, Value>,
    files: Vec<FileUpload>,
    callbacks: Vec<ResponseCallback>,
    also_return_response: bool,
}

impl std::fmt::Debug for OperationCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationCall")
            .field("transport", &self.transport)
            .field("base_url", &self.base_url)
            .field("operation", &self.operation)
            .field("arguments", &self.arguments)
            .field("files", &self.files)
            .field("callbacks", &self.callbacks.len())
            .field("also_return_response", &self.also_return_response)
            .finish()
    }
}

impl OperationCall {
    /// Supplies an argument for a declared parameter.
    ///
    /// Arguments are routed by the parameter's declared location when the
    /// call is issued; an argument that matches no declared parameter is
    /// dropped with a warning.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    /// Attaches a file for a `formData` file parameter, switching the
    /// request to a multipart form.
    #[must_use]
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        self.files.push(FileUpload {
            name: name.into(),
            file_name: file_name.into(),
            content: content.into(),
        });
        self
    }

    /// Registers a response callback (see
    /// [`ResponseCallback`](crate::ResponseCallback)).
    #[must_use]
    pub fn response_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(
                &IncomingResponse,
                &Operation,
            ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
            + Send
            + 'static,
    {
        self.callbacks.push(Box::new(callback));
        self
    }

    /// Makes the call resolve to `(value, response)` instead of the value
    /// alone.
    #[must_use]
    pub fn also_return_response(mut self) -> Self {
        self.also_return_response = true;
        self
    }

    /// Marshals the arguments and issues the request.
    ///
    /// Emits the deprecation warning side channel when the operation is
    /// flagged deprecated.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::MissingParameter`] before any I/O when a
    /// required parameter has no argument, or with request-building errors
    /// from the transport.
    pub fn call(self) -> Result<ReqwestHttpFuture, Error> {
        let Self {
            transport,
            base_url,
            operation,
            arguments,
            files,
            callbacks,
            also_return_response,
        } = self;

        warn_for_deprecated_op(&operation);
        let params = marshal_parameters(&operation, &base_url, arguments, files)?;
        let future = transport
            .request(params, Some(operation))?
            .with_response_callbacks(callbacks)
            .with_also_return_response(also_return_response);
        Ok(future)
    }
}

impl IntoFuture for OperationCall {
    type Output = Result<CallValue, Error>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.call()?.result(None).await })
    }
}

/// Routes supplied arguments to their declared locations and builds the
/// transport request.
fn marshal_parameters(
    operation: &Operation,
    base_url: &Url,
    mut arguments: IndexMap<String, Value>,
    files: Vec<FileUpload>,
) -> Result<RequestParams, Error> {
    let mut path = operation.path().to_string();
    let mut query = IndexMap::new();
    let mut headers = HeaderMap::new();
    let mut form = IndexMap::new();
    let mut body = None;

    for parameter in operation.parameters() {
        let Some(value) = arguments.shift_remove(&parameter.name) else {
            let satisfied_by_file = files.iter().any(|file| file.name == parameter.name);
            if parameter.is_required() && !satisfied_by_file {
                return Err(Error::MissingParameter {
                    operation_id: operation.operation_id().to_string(),
                    name: parameter.name.clone(),
                    location: parameter.location.as_str().to_string(),
                });
            }
            continue;
        };

        match parameter.location {
            ParameterLocation::Path => {
                path = path.replace(&format!("{{{}}}", parameter.name), &stringify(&value));
            }
            ParameterLocation::Query => {
                query.insert(parameter.name.clone(), stringify(&value));
            }
            ParameterLocation::Header => {
                headers.insert(
                    HeaderName::from_bytes(parameter.name.as_bytes())?,
                    HeaderValue::from_str(&stringify(&value))?,
                );
            }
            ParameterLocation::FormData => {
                form.insert(parameter.name.clone(), stringify(&value));
            }
            ParameterLocation::Body => {
                body = Some(value);
            }
        }
    }

    for name in arguments.keys() {
        warn!(?name, "argument name not found");
    }

    let url = format!(
        "{}/{}",
        base_url.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
    .parse::<Url>()?;

    let mut params = RequestParams::new(operation.method().clone(), url);
    params.query = query;
    params.headers = headers;
    params.form = form;
    params.files = files;
    if let Some(body) = body {
        params = params.with_json_body(&body)?;
    }
    Ok(params)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use http::Method;
    use serde_json::json;

    use super::*;
    use crate::spec::SpecConfig;

    fn operation(parameters: Value) -> Operation {
        Operation::parse(
            Method::GET,
            "/pet/{petId}",
            &json!({
                "operationId": "getPetById",
                "parameters": parameters,
                "responses": {"200": {"description": "ok"}}
            }),
            &SpecConfig::default(),
        )
        .expect("operation parses")
    }

    fn base_url() -> Url {
        "https://petstore.example.com/v2".parse().expect("url")
    }

    #[test]
    fn test_path_parameters_are_substituted() {
        let operation = operation(json!([
            {"name": "petId", "in": "path", "required": true, "type": "integer"}
        ]));
        let mut arguments = IndexMap::new();
        arguments.insert("petId".to_string(), json!(42));

        let params = marshal_parameters(&operation, &base_url(), arguments, Vec::new()).expect("marshals");
        assert_eq!(params.url.as_str(), "https://petstore.example.com/v2/pet/42");
    }

    #[test]
    fn test_query_and_header_and_form_placement() {
        let operation = Operation::parse(
            Method::POST,
            "/pet",
            &json!({
                "operationId": "addPet",
                "parameters": [
                    {"name": "verbose", "in": "query", "type": "boolean"},
                    {"name": "X-Request-Id", "in": "header", "type": "string"},
                    {"name": "name", "in": "formData", "type": "string"}
                ],
                "responses": {"201": {"description": "created"}}
            }),
            &SpecConfig::default(),
        )
        .expect("operation parses");

        let mut arguments = IndexMap::new();
        arguments.insert("verbose".to_string(), json!(true));
        arguments.insert("X-Request-Id".to_string(), json!("abc-123"));
        arguments.insert("name".to_string(), json!("rex"));

        let params = marshal_parameters(&operation, &base_url(), arguments, Vec::new()).expect("marshals");
        assert_eq!(params.query.get("verbose").map(String::as_str), Some("true"));
        assert_eq!(
            params
                .headers
                .get("x-request-id")
                .and_then(|value| value.to_str().ok()),
            Some("abc-123")
        );
        assert_eq!(params.form.get("name").map(String::as_str), Some("rex"));
    }

    #[test]
    fn test_body_parameter_becomes_json_body() {
        let operation = Operation::parse(
            Method::POST,
            "/pet",
            &json!({
                "operationId": "addPet",
                "parameters": [{"name": "body", "in": "body", "required": true, "schema": {}}],
                "responses": {"201": {"description": "created"}}
            }),
            &SpecConfig::default(),
        )
        .expect("operation parses");

        let mut arguments = IndexMap::new();
        arguments.insert("body".to_string(), json!({"name": "rex"}));

        let params = marshal_parameters(&operation, &base_url(), arguments, Vec::new()).expect("marshals");
        let body = params.body.expect("json body");
        assert_eq!(&body[..], br#"{"name":"rex"}"#);
        assert_eq!(
            params
                .headers
                .get(http::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
            Some("application/json")
        );
    }

    #[test]
    fn test_missing_required_parameter_fails_before_io() {
        let operation = operation(json!([
            {"name": "petId", "in": "path", "required": true, "type": "integer"}
        ]));

        let error = marshal_parameters(&operation, &base_url(), IndexMap::new(), Vec::new())
            .expect_err("required parameter missing");
        match error {
            Error::MissingParameter { name, location, .. } => {
                assert_eq!(name, "petId");
                assert_eq!(location, "path");
            }
            other => panic!("expected a missing parameter error, got {other:?}"),
        }
    }

    #[test]
    fn test_undeclared_arguments_are_dropped() {
        let operation = operation(json!([
            {"name": "petId", "in": "path", "required": true, "type": "integer"}
        ]));
        let mut arguments = IndexMap::new();
        arguments.insert("petId".to_string(), json!(7));
        arguments.insert("bogus".to_string(), json!("ignored"));

        let params = marshal_parameters(&operation, &base_url(), arguments, Vec::new()).expect("marshals");
        assert!(params.query.is_empty());
        assert_eq!(params.url.as_str(), "https://petstore.example.com/v2/pet/7");
    }

    #[test]
    fn test_file_argument_satisfies_required_form_parameter() {
        let operation = Operation::parse(
            Method::POST,
            "/pet/picture",
            &json!({
                "operationId": "uploadPicture",
                "parameters": [
                    {"name": "picture", "in": "formData", "required": true, "type": "file"}
                ],
                "responses": {"200": {"description": "ok"}}
            }),
            &SpecConfig::default(),
        )
        .expect("operation parses");

        let files = vec![FileUpload {
            name: "picture".to_string(),
            file_name: "rex.png".to_string(),
            content: Bytes::from_static(b"not really a png"),
        }];
        let params = marshal_parameters(&operation, &base_url(), IndexMap::new(), files)
            .expect("file satisfies the parameter");
        assert_eq!(params.files.len(), 1);
        assert_eq!(params.files[0].file_name, "rex.png");
    }

    #[test]
    fn test_operation_lookup_through_client() {
        let document = json!({
            "swagger": "2.0",
            "host": "petstore.example.com",
            "paths": {
                "/pet/{petId}": {
                    "get": {
                        "operationId": "getPetById",
                        "parameters": [
                            {"name": "petId", "in": "path", "required": true, "type": "integer"}
                        ],
                        "responses": {"200": {"description": "ok"}}
                    }
                }
            }
        });
        let origin = "http://localhost/swagger.json".parse().expect("url");
        let client = SwaggerClient::from_spec(document, &origin).expect("client builds");

        assert!(client.operation("getPetById").is_ok());
        let missing = client.operation("nope").expect_err("unknown id");
        assert!(matches!(missing, Error::MissingOperation { .. }));
    }
}
