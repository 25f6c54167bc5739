//! Gantry API Manifest
//!
//! This crate holds the declarative half of the gantry plugin contract: the
//! closed value-type vocabulary shared by host and plugin, the manifest model
//! describing a plugin's exported functions, and the fallible builder a plugin
//! uses to assemble that manifest before the host ever sees it.
//!
//! The manifest crosses the boundary as a JSON document with a single `API`
//! key; see the `document` module for the exact wire shape.

pub mod builder;
pub mod document;
pub mod errors;
pub mod types;
pub mod writer;

pub use builder::ManifestBuilder;
pub use errors::ManifestError;
pub use types::{ArgumentDescriptor, FunctionDescriptor, Manifest, ValueType};

// Re-export writer helpers for custom paths (testing)
pub use writer::{read_from_path, write_to_path};
