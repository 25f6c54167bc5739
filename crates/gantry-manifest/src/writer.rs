//! Manifest writer utilities for custom paths
//!
//! Helper functions for writing/reading exported API documents to/from disk,
//! for hosts that cache a plugin's declared surface between loads and for
//! testing scenarios.

use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::errors::ManifestError;
use crate::types::Manifest;

/// Write an exported API document to a custom path
pub fn write_to_path(manifest: &Manifest, output_path: &Path) -> Result<(), ManifestError> {
    debug!("Writing API document to custom path: {:?}", output_path);

    let document = manifest.export()?;
    fs::write(output_path, &document)?;

    info!("API document written successfully to: {:?}", output_path);
    info!("Total functions: {}", manifest.function_count());

    Ok(())
}

/// Read an API document from a custom path
pub fn read_from_path(manifest_path: &Path) -> Result<Manifest, ManifestError> {
    debug!("Reading API document from custom path: {:?}", manifest_path);

    let content = fs::read_to_string(manifest_path)?;
    let manifest = Manifest::from_json(&content)?;

    info!("API document loaded successfully");
    info!("Total functions: {}", manifest.function_count());

    Ok(manifest)
}
