//! Spec engine boundary: the parsed Swagger 2.0 document, its operations,
//! and the schema-checked response decode.
//!
//! The runtime core consumes this module through two narrow seams:
//! [`Operation`] (read-only description of a declared endpoint) and
//! [`decode_response`] (body decode + validation for one response).

use std::sync::Arc;

use http::{Method, StatusCode};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;
use url::Url;

use crate::error::Error;
use crate::response::IncomingResponse;

mod loader;
pub use self::loader::{load_file, load_url};

mod schema;
pub use self::schema::Schema;

/// Methods a Swagger 2.0 path item can declare.
const PATH_ITEM_METHODS: [&str; 7] = ["get", "put", "post", "delete", "options", "head", "patch"];

/// Refs deeper than this (i.e. recursive schemas) degrade to unconstrained.
const MAX_REF_DEPTH: usize = 32;

/// Spec-engine knobs.
#[derive(Debug, Clone, Copy)]
pub struct SpecConfig {
    /// Validate decoded bodies against the declared schema. On by default;
    /// switching it off skips structural validation but not JSON parsing.
    pub validate_responses: bool,
}

impl Default for SpecConfig {
    fn default() -> Self {
        Self {
            validate_responses: true,
        }
    }
}

/// Where an operation parameter is marshalled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterLocation {
    /// Substituted into the path template.
    Path,
    /// Appended to the query string.
    Query,
    /// Sent as a request header.
    Header,
    /// Sent as a form field.
    FormData,
    /// Serialized as the JSON request body.
    Body,
}

impl ParameterLocation {
    /// The spec's name for this location.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::FormData => "formData",
            Self::Body => "body",
        }
    }
}

/// Declared operation parameter.
#[derive(Debug, Clone, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name.
    pub name: String,
    /// Declared location.
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    /// Whether the parameter must be supplied. Path parameters are always
    /// required, whatever the document says.
    #[serde(default)]
    pub required: bool,
}

impl ParameterSpec {
    /// Whether a call may omit this parameter.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required || self.location == ParameterLocation::Path
    }
}

/// Declared response for one status code (or `default`).
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseSpec {
    /// Human description from the document.
    #[serde(default)]
    pub description: String,
    /// Body schema; absent means the response declares no content and no
    /// decoding is attempted.
    #[serde(default)]
    pub schema: Option<Schema>,
}

/// One spec-declared API operation.
///
/// Owned by the [`SwaggerSpec`] registry and shared with in-flight calls;
/// the runtime only reads it.
#[derive(Debug, Clone)]
pub struct Operation {
    operation_id: String,
    method: Method,
    path: String,
    op_spec: Value,
    responses: IndexMap<String, ResponseSpec>,
    parameters: Vec<ParameterSpec>,
    validate_responses: bool,
}

impl Operation {
    /// Parses one operation object from a (ref-resolved) document.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::SpecFormat`] when the object is not an
    /// operation, or with [`Error::Json`] when a declared response or
    /// parameter does not deserialize.
    pub fn parse(
        method: Method,
        path: &str,
        op_spec: &Value,
        config: &SpecConfig,
    ) -> Result<Self, Error> {
        if !op_spec.is_object() {
            return Err(Error::SpecFormat {
                message: format!("operation object expected at {method} {path}"),
            });
        }

        let operation_id = op_spec
            .get("operationId")
            .and_then(Value::as_str)
            .map_or_else(|| derive_operation_id(&method, path), str::to_string);

        let mut responses = IndexMap::new();
        if let Some(declared) = op_spec.get("responses").and_then(Value::as_object) {
            for (status, response) in declared {
                let response: ResponseSpec = serde_json::from_value(response.clone())?;
                responses.insert(status.clone(), response);
            }
        }

        let parameters = match op_spec.get("parameters") {
            Some(parameters) => serde_json::from_value(parameters.clone())?,
            None => Vec::new(),
        };

        Ok(Self {
            operation_id,
            method,
            path: path.to_string(),
            op_spec: op_spec.clone(),
            responses,
            parameters,
            validate_responses: config.validate_responses,
        })
    }

    /// Operation id (declared, or derived from method and path).
    #[must_use]
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path template, e.g. `/pet/{petId}`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The raw operation object (carries `deprecated`,
    /// `x-deprecated-date`, `x-removal-date`, ...).
    #[must_use]
    pub fn op_spec(&self) -> &Value {
        &self.op_spec
    }

    /// Whether the document flags this operation as deprecated.
    #[must_use]
    pub fn deprecated(&self) -> bool {
        self.op_spec.get("deprecated").and_then(Value::as_bool) == Some(true)
    }

    /// Declared parameters.
    #[must_use]
    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    /// Declared responses, keyed by decimal status string or `default`.
    #[must_use]
    pub fn responses(&self) -> &IndexMap<String, ResponseSpec> {
        &self.responses
    }

    /// Resolves the declared response for a status code: exact match, then
    /// `default`. The lookup is deterministic and total; `None` means the
    /// "no matching response" condition.
    #[must_use]
    pub fn response_spec(&self, status: StatusCode) -> Option<&ResponseSpec> {
        self.responses
            .get(&status.as_u16().to_string())
            .or_else(|| self.responses.get("default"))
    }

    /// Whether decoded bodies are validated against the declared schema.
    #[must_use]
    pub fn validate_responses(&self) -> bool {
        self.validate_responses
    }
}

fn derive_operation_id(method: &Method, path: &str) -> String {
    let mut id = method.as_str().to_lowercase();
    for part in path.split('/').filter(|part| !part.is_empty()) {
        id.push('_');
        id.extend(part.chars().map(|character| {
            if character.is_alphanumeric() {
                character
            } else {
                '_'
            }
        }));
    }
    id
}

/// Decodes a response body against the operation's declared schema.
///
/// This is the spec engine's decode seam, consumed by the unmarshalling
/// pipeline: resolve the response declaration for the status, sniff the
/// content type (`application/json` and `+json` types parse as JSON,
/// anything else is carried as body text), and validate the decoded value
/// when the spec was built with validation on.
///
/// # Errors
///
/// Fails with [`Error::MatchingResponseNotFound`] when neither an exact nor
/// a `default` response is declared, with [`Error::Json`] when a JSON body
/// does not parse, with [`Error::Validation`] on a schema mismatch, or with
/// a body-read error ([`Error::Timeout`], transport errors).
pub async fn decode_response(
    response: &mut IncomingResponse,
    operation: &Operation,
) -> Result<Option<Value>, Error> {
    let status = response.status_code();
    let Some(response_spec) = operation.response_spec(status) else {
        return Err(Error::MatchingResponseNotFound {
            status: status.as_u16(),
            message: format!(
                "no response matches status {} for operation '{}'",
                status.as_u16(),
                operation.operation_id(),
            ),
        });
    };

    let Some(schema) = &response_spec.schema else {
        return Ok(None);
    };

    if is_json(response.content_type().as_ref()) {
        let value = response.json().await?;
        if operation.validate_responses() {
            schema.validate(&value)?;
        }
        Ok(Some(value))
    } else {
        // Non-JSON content is carried as text; other decoders would slot
        // in here, keyed off the sniffed content type.
        Ok(Some(Value::String(response.text().await?)))
    }
}

fn is_json(content_type: Option<&mime::Mime>) -> bool {
    content_type.is_some_and(|mime| {
        mime.type_() == mime::APPLICATION
            && (mime.subtype() == mime::JSON || mime.suffix() == Some(mime::JSON))
    })
}

/// Parsed Swagger 2.0 document with its operations indexed by id.
#[derive(Debug, Clone)]
pub struct SwaggerSpec {
    document: Value,
    base_url: Url,
    operations: IndexMap<String, Arc<Operation>>,
}

impl SwaggerSpec {
    /// Builds the operation registry from a parsed document.
    ///
    /// `origin` is where the document came from; it fills in whatever
    /// `schemes`/`host` the document leaves out. Local `$ref` indirections
    /// are resolved up front (recursive schemas degrade to unconstrained
    /// past a fixed depth).
    ///
    /// # Errors
    ///
    /// Fails with [`Error::SpecFormat`] when the document is not a
    /// `swagger: "2.0"` specification, or with whatever an operation fails
    /// to parse with.
    pub fn from_value(document: Value, origin: &Url) -> Result<Self, Error> {
        Self::from_value_with_config(document, origin, SpecConfig::default())
    }

    /// Same as [`from_value`](Self::from_value) with explicit knobs.
    ///
    /// # Errors
    ///
    /// See [`from_value`](Self::from_value).
    pub fn from_value_with_config(
        document: Value,
        origin: &Url,
        config: SpecConfig,
    ) -> Result<Self, Error> {
        let version = document.get("swagger").and_then(Value::as_str);
        if version != Some("2.0") {
            return Err(Error::SpecFormat {
                message: format!(
                    "expected a swagger 2.0 document, got version {}",
                    version.unwrap_or("<absent>")
                ),
            });
        }

        let document = resolve_refs(&document);
        let base_url = base_url(&document, origin)?;

        let mut operations = IndexMap::new();
        let paths = document.get("paths").and_then(Value::as_object);
        for (path, path_item) in paths.into_iter().flatten() {
            let shared_parameters = path_item.get("parameters").and_then(Value::as_array);
            for method in PATH_ITEM_METHODS {
                let Some(op_spec) = path_item.get(method) else {
                    continue;
                };
                let method = Method::from_bytes(method.to_uppercase().as_bytes())
                    .map_err(|_invalid| Error::SpecFormat {
                        message: format!("unsupported method '{method}' at {path}"),
                    })?;
                let op_spec = merge_shared_parameters(op_spec, shared_parameters);
                let operation = Operation::parse(method, path, &op_spec, &config)?;
                let id = operation.operation_id().to_string();
                if operations.contains_key(&id) {
                    warn!(operation_id = %id, "duplicate operation id, keeping the last one");
                }
                operations.insert(id, Arc::new(operation));
            }
        }

        Ok(Self {
            document,
            base_url,
            operations,
        })
    }

    /// The (ref-resolved) document this registry was built from.
    #[must_use]
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Base URL every operation path is joined to.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Looks up an operation by id.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::MissingOperation`] for an unknown id.
    pub fn operation(&self, id: &str) -> Result<&Arc<Operation>, Error> {
        self.operations.get(id).ok_or_else(|| Error::MissingOperation {
            id: id.to_string(),
        })
    }

    /// All operations, in document order.
    pub fn operations(&self) -> impl Iterator<Item = &Arc<Operation>> {
        self.operations.values()
    }
}

fn merge_shared_parameters(op_spec: &Value, shared: Option<&Vec<Value>>) -> Value {
    let Some(shared) = shared else {
        return op_spec.clone();
    };
    let mut merged = op_spec.clone();
    if let Some(object) = merged.as_object_mut() {
        let parameters = object
            .entry("parameters")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Some(parameters) = parameters.as_array_mut() {
            parameters.extend(shared.iter().cloned());
        }
    }
    merged
}

fn base_url(document: &Value, origin: &Url) -> Result<Url, Error> {
    let scheme = document
        .get("schemes")
        .and_then(|schemes| schemes.get(0))
        .and_then(Value::as_str)
        .unwrap_or_else(|| origin.scheme());
    let host = document
        .get("host")
        .and_then(Value::as_str)
        .map_or_else(
            || {
                let host = origin.host_str().unwrap_or("localhost");
                match origin.port() {
                    Some(port) => format!("{host}:{port}"),
                    None => host.to_string(),
                }
            },
            str::to_string,
        );
    let base_path = document
        .get("basePath")
        .and_then(Value::as_str)
        .unwrap_or("");
    Ok(Url::parse(&format!("{scheme}://{host}{base_path}"))?)
}

fn resolve_refs(document: &Value) -> Value {
    resolve_value(document, document, 0)
}

fn resolve_value(root: &Value, value: &Value, depth: usize) -> Value {
    match value {
        Value::Object(object) => {
            if let Some(reference) = object.get("$ref").and_then(Value::as_str) {
                if depth >= MAX_REF_DEPTH {
                    return Value::Object(serde_json::Map::new());
                }
                if let Some(target) = reference
                    .strip_prefix('#')
                    .and_then(|pointer| root.pointer(pointer))
                {
                    return resolve_value(root, target, depth + 1);
                }
                warn!(%reference, "unresolvable $ref, treating as unconstrained");
                return Value::Object(serde_json::Map::new());
            }
            Value::Object(
                object
                    .iter()
                    .map(|(key, value)| (key.clone(), resolve_value(root, value, depth)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_value(root, item, depth))
                .collect(),
        ),
        other => other.clone(),
    }
}
