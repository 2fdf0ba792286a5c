//! Mapping collected attributes onto caller types.
//!
//! Mapping happens in two steps. The [`AttributeMap`] becomes a flat JSON
//! object with string keys and string values, which is then decoded into
//! the requested type with `serde`. Fields are matched by attribute name,
//! so callers rename with `#[serde(rename = "...")]` where the Rust field
//! name differs from the directory attribute.
//!
//! Multi-valued attributes arrive here already reduced to their first
//! value. A target field typed as a list will not decode.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sds_core::{SdsError, SdsResult};

use crate::search::AttributeMap;

/// Converts an attribute map into a flat JSON object.
#[must_use]
pub fn to_document(map: &AttributeMap) -> Map<String, Value> {
    map.iter()
        .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
        .collect()
}

/// Decodes a document into `T`.
///
/// ## Errors
///
/// Returns [`SdsError::Mapping`] carrying the decode failure when the
/// document does not satisfy `T`.
pub fn from_document<T: DeserializeOwned>(document: Map<String, Value>) -> SdsResult<T> {
    serde_json::from_value(Value::Object(document)).map_err(|source| SdsError::Mapping {
        target: std::any::type_name::<T>(),
        source,
    })
}

/// Maps an attribute map onto `T`.
pub fn map_attributes<T: DeserializeOwned>(map: &AttributeMap) -> SdsResult<T> {
    from_document(to_document(map))
}
