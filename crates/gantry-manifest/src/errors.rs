use std::io;
use thiserror::Error;

/// Errors that can occur while building or parsing a plugin API manifest
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed API document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API document has no 'API' array")]
    MissingApi,

    #[error("Function '{0}' is already declared")]
    DuplicateFunction(String),

    #[error("Function '{0}' was never declared")]
    UnknownFunction(String),

    #[error("Argument '{argument}' of function '{function}' is already declared")]
    DuplicateArgument { function: String, argument: String },

    #[error("Function record #{0} has no name")]
    UnnamedFunction(usize),

    #[error("Function '{0}' has no return type")]
    MissingReturnType(String),

    #[error("Function '{function}' has unknown return type '{type_name}'")]
    UnknownReturnType { function: String, type_name: String },

    #[error("Function '{0}' has an unnamed argument")]
    UnnamedArgument(String),

    #[error("Argument '{argument}' of function '{function}' has no type")]
    MissingArgumentType { function: String, argument: String },

    #[error("Argument '{argument}' of function '{function}' has unknown type '{type_name}'")]
    UnknownArgumentType {
        function: String,
        argument: String,
        type_name: String,
    },

    #[error("Unknown value type ordinal {0}")]
    UnknownOrdinal(u8),
}
