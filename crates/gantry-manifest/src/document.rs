//! Wire form of the API manifest
//!
//! The manifest crosses the boundary as a JSON document with a single `API`
//! key mapping to an ordered sequence of function records:
//!
//! ```json
//! {"API": [{"name": "foo_args", "return_type": "void",
//!           "arguments": [{"name": "arg1", "type": "int"}]}]}
//! ```
//!
//! Wire type names are the stable cross-boundary vocabulary; the `ValueType`
//! ordinals are the in-process one. Parsing maps the first onto the second and
//! rejects anything it does not know, naming the offending function/argument.

use ahash::AHashSet;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::errors::ManifestError;
use crate::types::{ArgumentDescriptor, FunctionDescriptor, Manifest, ValueType};

#[derive(Serialize)]
struct ApiDocument<'a> {
    #[serde(rename = "API")]
    api: Vec<FunctionRecord<'a>>,
}

#[derive(Serialize)]
struct FunctionRecord<'a> {
    name: &'a str,
    return_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    arguments: Option<Vec<ArgumentRecord<'a>>>,
}

#[derive(Serialize)]
struct ArgumentRecord<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    value_type: &'a str,
}

/// Serialize a function list to the wire document.
pub(crate) fn export_functions(functions: &[FunctionDescriptor]) -> Result<String, ManifestError> {
    let api = functions
        .iter()
        .map(|f| FunctionRecord {
            name: &f.name,
            return_type: f.return_type.wire_name(),
            arguments: if f.arguments.is_empty() {
                None
            } else {
                Some(
                    f.arguments
                        .iter()
                        .map(|a| ArgumentRecord {
                            name: &a.name,
                            value_type: a.value_type.wire_name(),
                        })
                        .collect(),
                )
            },
        })
        .collect();

    Ok(serde_json::to_string(&ApiDocument { api })?)
}

/// Parse a wire document into descriptors, validating names and types.
///
/// A malformed document is rejected as a whole; nothing is partially
/// accepted.
pub(crate) fn parse_functions(json: &str) -> Result<Vec<FunctionDescriptor>, ManifestError> {
    let doc: serde_json::Value = serde_json::from_str(json)?;
    let records = doc
        .get("API")
        .and_then(|v| v.as_array())
        .ok_or(ManifestError::MissingApi)?;

    let mut functions: Vec<FunctionDescriptor> = Vec::with_capacity(records.len());
    let mut seen: AHashSet<Arc<str>> = AHashSet::with_capacity(records.len());

    for (idx, record) in records.iter().enumerate() {
        let name = record
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or(ManifestError::UnnamedFunction(idx))?;

        let type_name = record
            .get("return_type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| ManifestError::MissingReturnType(name.to_string()))?;
        let return_type = ValueType::from_wire_name(type_name).ok_or_else(|| {
            ManifestError::UnknownReturnType {
                function: name.to_string(),
                type_name: type_name.to_string(),
            }
        })?;

        let mut descriptor = FunctionDescriptor::new(name, return_type);
        if !seen.insert(Arc::clone(&descriptor.name)) {
            return Err(ManifestError::DuplicateFunction(name.to_string()));
        }

        if let Some(arguments) = record.get("arguments").and_then(|a| a.as_array()) {
            for argument in arguments {
                let arg_name = argument
                    .get("name")
                    .and_then(|n| n.as_str())
                    .ok_or_else(|| ManifestError::UnnamedArgument(name.to_string()))?;

                let arg_type_name = argument
                    .get("type")
                    .and_then(|t| t.as_str())
                    .ok_or_else(|| ManifestError::MissingArgumentType {
                        function: name.to_string(),
                        argument: arg_name.to_string(),
                    })?;
                let value_type = ValueType::from_wire_name(arg_type_name).ok_or_else(|| {
                    ManifestError::UnknownArgumentType {
                        function: name.to_string(),
                        argument: arg_name.to_string(),
                        type_name: arg_type_name.to_string(),
                    }
                })?;

                if descriptor.argument(arg_name).is_some() {
                    return Err(ManifestError::DuplicateArgument {
                        function: name.to_string(),
                        argument: arg_name.to_string(),
                    });
                }

                descriptor.arguments.push(ArgumentDescriptor {
                    name: Arc::from(arg_name),
                    value_type,
                });
            }
        }

        functions.push(descriptor);
    }

    debug!(functions = functions.len(), "parsed API document");
    Ok(functions)
}

impl Manifest {
    /// Serialize to the wire document consumed by the host.
    pub fn export(&self) -> Result<String, ManifestError> {
        export_functions(self.functions())
    }

    /// Parse a wire document produced by `export()`.
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        Ok(Manifest::from_functions(parse_functions(json)?))
    }
}
