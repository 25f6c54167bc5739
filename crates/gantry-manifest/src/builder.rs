//! Imperative manifest assembly
//!
//! A plugin declares its exported surface programmatically so authoring
//! mistakes (duplicate or forward-referenced names) fail before the host
//! ever sees the plugin, not at first invocation.

use ahash::AHashMap;
use std::sync::Arc;
use tracing::trace;

use crate::document;
use crate::errors::ManifestError;
use crate::types::{ArgumentDescriptor, FunctionDescriptor, Manifest, ValueType};

/// Builder for a plugin's API manifest.
///
/// Functions and arguments are kept in append order; the order is part of the
/// declared calling convention, so no reordering operation exists.
#[derive(Debug, Default)]
pub struct ManifestBuilder {
    functions: Vec<FunctionDescriptor>,
    index: AHashMap<Arc<str>, usize>,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        ManifestBuilder::default()
    }

    /// Declare a new exported function with an empty argument list.
    pub fn add_function(&mut self, name: &str, return_type: ValueType) -> Result<(), ManifestError> {
        if self.index.contains_key(name) {
            return Err(ManifestError::DuplicateFunction(name.to_string()));
        }

        trace!(function = name, return_type = %return_type, "declaring export");
        let descriptor = FunctionDescriptor::new(name, return_type);
        self.index
            .insert(Arc::clone(&descriptor.name), self.functions.len());
        self.functions.push(descriptor);
        Ok(())
    }

    /// Append an argument to a previously declared function.
    ///
    /// Arguments must be added in calling-convention order.
    pub fn add_argument(
        &mut self,
        function: &str,
        name: &str,
        value_type: ValueType,
    ) -> Result<(), ManifestError> {
        let idx = *self
            .index
            .get(function)
            .ok_or_else(|| ManifestError::UnknownFunction(function.to_string()))?;
        let descriptor = self
            .functions
            .get_mut(idx)
            .ok_or_else(|| ManifestError::UnknownFunction(function.to_string()))?;

        if descriptor.argument(name).is_some() {
            return Err(ManifestError::DuplicateArgument {
                function: function.to_string(),
                argument: name.to_string(),
            });
        }

        descriptor.arguments.push(ArgumentDescriptor {
            name: Arc::from(name),
            value_type,
        });
        Ok(())
    }

    /// Serialize the current state to the wire document.
    ///
    /// Pure function of the builder's state; callable repeatedly.
    pub fn export(&self) -> Result<String, ManifestError> {
        document::export_functions(&self.functions)
    }

    /// Number of declared functions so far.
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Consume the builder into an immutable manifest.
    pub fn build(self) -> Manifest {
        Manifest::from_functions(self.functions)
    }
}
