//! Export registry and calling-convention rules
//!
//! The host has no reflection: it must know, purely from the manifest, how
//! many and which kind of parameters to marshal before calling into a plugin
//! function. The shape is therefore derived from the declaration, never
//! declared separately, and a registered body must match the derived shape.

use ahash::AHashMap;
use std::fmt;
use std::sync::Arc;

use crate::bundle::Args;
use crate::errors::PluginError;
use crate::slot::ReturnValue;
use gantry_manifest::FunctionDescriptor;

type ExportResult = Result<(), PluginError>;

/// The four invocation shapes a declared function can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// `void` return, no declared arguments.
    Procedure,
    /// `void` return, one or more declared arguments.
    Consumer,
    /// Value return, no declared arguments.
    Producer,
    /// Value return, one or more declared arguments.
    Function,
}

impl ExportKind {
    /// Derive the invocation shape from a manifest declaration.
    pub fn of(descriptor: &FunctionDescriptor) -> Self {
        match (descriptor.return_type.is_void(), descriptor.arity() == 0) {
            (true, true) => ExportKind::Procedure,
            (true, false) => ExportKind::Consumer,
            (false, true) => ExportKind::Producer,
            (false, false) => ExportKind::Function,
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExportKind::Procedure => "procedure (void, no arguments)",
            ExportKind::Consumer => "consumer (void, with arguments)",
            ExportKind::Producer => "producer (value, no arguments)",
            ExportKind::Function => "function (value, with arguments)",
        };
        f.write_str(text)
    }
}

/// A registered function body, one variant per `ExportKind`.
pub enum ExportFn {
    Procedure(Box<dyn Fn() -> ExportResult + Send + Sync>),
    Consumer(Box<dyn Fn(&Args<'_>) -> ExportResult + Send + Sync>),
    Producer(Box<dyn Fn(&ReturnValue) -> ExportResult + Send + Sync>),
    Function(Box<dyn Fn(&ReturnValue, &Args<'_>) -> ExportResult + Send + Sync>),
}

impl ExportFn {
    pub fn procedure<F>(body: F) -> Self
    where
        F: Fn() -> ExportResult + Send + Sync + 'static,
    {
        ExportFn::Procedure(Box::new(body))
    }

    pub fn consumer<F>(body: F) -> Self
    where
        F: Fn(&Args<'_>) -> ExportResult + Send + Sync + 'static,
    {
        ExportFn::Consumer(Box::new(body))
    }

    pub fn producer<F>(body: F) -> Self
    where
        F: Fn(&ReturnValue) -> ExportResult + Send + Sync + 'static,
    {
        ExportFn::Producer(Box::new(body))
    }

    pub fn function<F>(body: F) -> Self
    where
        F: Fn(&ReturnValue, &Args<'_>) -> ExportResult + Send + Sync + 'static,
    {
        ExportFn::Function(Box::new(body))
    }

    /// The shape this body was registered as.
    pub fn kind(&self) -> ExportKind {
        match self {
            ExportFn::Procedure(_) => ExportKind::Procedure,
            ExportFn::Consumer(_) => ExportKind::Consumer,
            ExportFn::Producer(_) => ExportKind::Producer,
            ExportFn::Function(_) => ExportKind::Function,
        }
    }
}

impl fmt::Debug for ExportFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExportFn::{:?}", self.kind())
    }
}

type StartupHook = Box<dyn Fn() -> i32 + Send + Sync>;
type ShutdownHook = Box<dyn Fn() + Send + Sync>;

/// Name-keyed registry of function bodies and lifecycle hooks.
///
/// Populated by the plugin before load; read-only afterwards.
#[derive(Default)]
pub struct ExportRegistry {
    exports: AHashMap<Arc<str>, ExportFn>,
    startup_hooks: AHashMap<Arc<str>, StartupHook>,
    shutdown_hooks: AHashMap<Arc<str>, ShutdownHook>,
}

impl ExportRegistry {
    pub fn new() -> Self {
        ExportRegistry::default()
    }

    /// Register the body of a declared function.
    pub fn export(&mut self, name: &str, body: ExportFn) -> Result<(), PluginError> {
        if self.exports.contains_key(name) {
            return Err(PluginError::DuplicateExport(name.to_string()));
        }
        self.exports.insert(Arc::from(name), body);
        Ok(())
    }

    /// Register a startup hook body under its name.
    pub fn startup_hook<F>(&mut self, name: &str, body: F) -> Result<(), PluginError>
    where
        F: Fn() -> i32 + Send + Sync + 'static,
    {
        if self.startup_hooks.contains_key(name) {
            return Err(PluginError::DuplicateExport(name.to_string()));
        }
        self.startup_hooks.insert(Arc::from(name), Box::new(body));
        Ok(())
    }

    /// Register a shutdown hook body under its name.
    pub fn shutdown_hook<F>(&mut self, name: &str, body: F) -> Result<(), PluginError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.shutdown_hooks.contains_key(name) {
            return Err(PluginError::DuplicateExport(name.to_string()));
        }
        self.shutdown_hooks.insert(Arc::from(name), Box::new(body));
        Ok(())
    }

    pub(crate) fn get(&self, name: &str) -> Option<&ExportFn> {
        self.exports.get(name)
    }

    pub(crate) fn get_startup(&self, name: &str) -> Option<&StartupHook> {
        self.startup_hooks.get(name)
    }

    pub(crate) fn get_shutdown(&self, name: &str) -> Option<&ShutdownHook> {
        self.shutdown_hooks.get(name)
    }

    pub fn export_count(&self) -> usize {
        self.exports.len()
    }
}
