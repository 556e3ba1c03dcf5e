use serde::Deserialize;
use serde_json::Value;

use crate::error::Error;

/// Structural response schema, as declared in a Swagger 2.0 document.
///
/// A deliberately small subset of JSON Schema, matching what response
/// declarations actually use: `type`, `properties`, `required`, `items`,
/// `enum` and `additionalProperties`. `format` is carried but opaque.
/// Anything the subset does not know passes validation, so unknown keywords
/// degrade to "unconstrained" instead of false negatives.
///
/// `$ref` indirections are resolved against the document before the schema
/// reaches this type (see
/// [`SwaggerSpec::from_value`](crate::SwaggerSpec::from_value)).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Schema(Value);

impl Schema {
    /// Wraps a raw schema value.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The raw schema value.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Checks a decoded body against the schema.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Validation`] carrying a pointer-style path to
    /// the first offending value.
    pub fn validate(&self, value: &Value) -> Result<(), Error> {
        validate_at(&self.0, value, "")
    }
}

fn mismatch(path: &str, message: String) -> Error {
    Error::Validation {
        path: if path.is_empty() { "/".to_string() } else { path.to_string() },
        message,
    }
}

fn validate_at(schema: &Value, value: &Value, path: &str) -> Result<(), Error> {
    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(mismatch(path, format!("{value} is not one of {allowed:?}")));
        }
    }

    let declared_type = schema.get("type").and_then(Value::as_str);
    match declared_type {
        Some("object") => validate_object(schema, value, path),
        Some("array") => validate_array(schema, value, path),
        Some("string") => expect(value.is_string(), value, "string", path),
        Some("integer") => {
            let is_integer = value
                .as_number()
                .is_some_and(|number| number.is_i64() || number.is_u64());
            expect(is_integer, value, "integer", path)
        }
        Some("number") => expect(value.is_number(), value, "number", path),
        Some("boolean") => expect(value.is_boolean(), value, "boolean", path),
        Some("null") => expect(value.is_null(), value, "null", path),
        // `file` responses and unknown types are unconstrained; a schema
        // with no `type` may still constrain object properties.
        Some(_) => Ok(()),
        None if schema.get("properties").is_some() && value.is_object() => {
            validate_object(schema, value, path)
        }
        None => Ok(()),
    }
}

fn expect(matches: bool, value: &Value, expected: &str, path: &str) -> Result<(), Error> {
    if matches {
        Ok(())
    } else {
        Err(mismatch(path, format!("{value} is not of type '{expected}'")))
    }
}

fn validate_object(schema: &Value, value: &Value, path: &str) -> Result<(), Error> {
    let Some(object) = value.as_object() else {
        return Err(mismatch(path, format!("{value} is not of type 'object'")));
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(name) {
                return Err(mismatch(path, format!("'{name}' is a required property")));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    if let Some(properties) = properties {
        for (name, property_schema) in properties {
            if let Some(property) = object.get(name) {
                validate_at(property_schema, property, &format!("{path}/{name}"))?;
            }
        }
    }

    if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
        for name in object.keys() {
            let declared = properties.is_some_and(|properties| properties.contains_key(name));
            if !declared {
                return Err(mismatch(
                    path,
                    format!("additional property '{name}' is not allowed"),
                ));
            }
        }
    }

    Ok(())
}

fn validate_array(schema: &Value, value: &Value, path: &str) -> Result<(), Error> {
    let Some(items) = value.as_array() else {
        return Err(mismatch(path, format!("{value} is not of type 'array'")));
    };

    if let Some(item_schema) = schema.get("items") {
        for (index, item) in items.iter().enumerate() {
            validate_at(item_schema, item, &format!("{path}/{index}"))?;
        }
    }

    Ok(())
}
