use thiserror::Error;

use crate::handle::Handle;
use crate::plugin::PluginState;
use crate::registry::ExportKind;
use gantry_manifest::{ManifestError, ValueType};

/// Errors that can occur while loading a plugin or crossing the call boundary
#[derive(Error, Debug)]
pub enum PluginError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("Argument '{0}' not found in this invocation")]
    ArgumentNotFound(String),

    #[error("Type mismatch for {context}: '{payload}' does not decode as '{expected}'")]
    TypeMismatch {
        context: String,
        expected: ValueType,
        payload: String,
    },

    #[error("Return value for '{0}' was already set in this invocation")]
    DoubleReturn(String),

    #[error("Function '{0}' returned without setting its return value")]
    MissingReturn(String),

    #[error("Startup hook returned nonzero status {0}")]
    StartupFailed(i32),

    #[error("Function '{0}' is not exported by this plugin")]
    FunctionNotFound(String),

    #[error("Function '{function}' is declared as {declared} but registered as {registered}")]
    SignatureMismatch {
        function: String,
        declared: ExportKind,
        registered: ExportKind,
    },

    #[error("Function '{0}' is declared in the manifest but has no registered body")]
    MissingExport(String),

    #[error("Export '{0}' is already registered")]
    DuplicateExport(String),

    #[error("Hook '{0}' is named by the descriptor but was never registered")]
    UnknownHook(String),

    #[error("Stale or foreign handle {0:?}")]
    InvalidHandle(Handle),

    #[error("Operation requires state {expected}, but plugin is {found}")]
    InvalidState {
        expected: PluginState,
        found: PluginState,
    },
}
