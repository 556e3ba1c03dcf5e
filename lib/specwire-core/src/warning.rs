use serde_json::Value;
use tracing::warn;

use crate::spec::Operation;

/// Emits the deprecation warning side channel for an operation flagged
/// `deprecated` in the document. Non-fatal; nothing is emitted when the
/// flag is false or missing.
pub(crate) fn warn_for_deprecated_op(operation: &Operation) {
    if let Some(message) = deprecation_warning(operation) {
        warn!("{message}");
    }
}

/// The warning text, or `None` when the operation is not deprecated.
pub(crate) fn deprecation_warning(operation: &Operation) -> Option<String> {
    if !operation.deprecated() {
        return None;
    }
    let deprecation_date = extension_date(operation, "x-deprecated-date");
    let removal_date = extension_date(operation, "x-removal-date");
    Some(format!(
        "[DEPRECATED] {} has now been deprecated. Deprecation Date: {deprecation_date}. \
         Removal Date: {removal_date}",
        operation.operation_id()
    ))
}

fn extension_date(operation: &Operation, key: &str) -> String {
    match operation.op_spec().get(key) {
        Some(Value::String(date)) => date.clone(),
        Some(other) => other.to_string(),
        None => "not provided".to_string(),
    }
}
