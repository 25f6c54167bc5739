//! Plugin descriptor and lifecycle
//!
//! The host drives every plugin through one strictly sequential state
//! machine: `Unloaded -> Loaded -> Started -> Ready -> Stopping -> Unloaded`.
//! The descriptor is read once at load time and stays read-only for the
//! plugin's entire lifetime; exported functions are invokable only while
//! `Ready`.

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::bundle::{ArgumentBundle, Args};
use crate::errors::PluginError;
use crate::registry::{ExportFn, ExportKind, ExportRegistry};
use crate::slot::{ReturnTable, ReturnValue, SlotKey};
use crate::value::{Encoded, Value};
use gantry_manifest::{FunctionDescriptor, Manifest};

/// Identifies the host-side caller of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallerId(pub u64);

/// Identifies one loaded plugin instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub u64);

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// The contract every plugin must provide to the host.
///
/// `api` returns the serialized manifest document; the hook accessors return
/// a function name or `None` for "no hook".
pub trait PluginEntry: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn author(&self) -> &str;
    fn description(&self) -> &str;
    fn api(&self) -> String;

    fn startup(&self) -> Option<&str> {
        None
    }

    fn shutdown(&self) -> Option<&str> {
        None
    }
}

/// Lifecycle states, host-driven and strictly sequential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Unloaded,
    Loaded,
    Started,
    Ready,
    Stopping,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PluginState::Unloaded => "unloaded",
            PluginState::Loaded => "loaded",
            PluginState::Started => "started",
            PluginState::Ready => "ready",
            PluginState::Stopping => "stopping",
        };
        f.write_str(text)
    }
}

/// Identity and declared surface of one plugin, read once at load time.
#[derive(Debug)]
pub struct PluginDescriptor {
    name: String,
    version: String,
    author: String,
    description: String,
    startup: Option<String>,
    shutdown: Option<String>,
    api_document: String,
    manifest: Manifest,
}

impl PluginDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The serialized manifest document, exactly as the plugin declared it.
    pub fn api(&self) -> &str {
        &self.api_document
    }

    pub fn startup(&self) -> Option<&str> {
        self.startup.as_deref()
    }

    pub fn shutdown(&self) -> Option<&str> {
        self.shutdown.as_deref()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }
}

/// One loaded plugin: descriptor, registered bodies, and call surface.
pub struct LoadedPlugin {
    descriptor: PluginDescriptor,
    registry: ExportRegistry,
    instance: InstanceId,
    state: RwLock<PluginState>,
    returns: Arc<ReturnTable>,
    next_token: AtomicU64,
}

impl LoadedPlugin {
    /// Read a plugin's descriptor and bind its declared surface.
    ///
    /// The manifest is parsed and every declared function is checked against
    /// the registered bodies; a malformed manifest, a missing body, a body of
    /// the wrong shape, or an unregistered hook rejects the whole load.
    pub fn load(entry: &dyn PluginEntry, registry: ExportRegistry) -> Result<Self, PluginError> {
        let api_document = entry.api();
        let manifest = Manifest::from_json(&api_document)?;

        for function in manifest.functions() {
            let declared = ExportKind::of(function);
            let body = registry
                .get(&function.name)
                .ok_or_else(|| PluginError::MissingExport(function.name.to_string()))?;
            if body.kind() != declared {
                return Err(PluginError::SignatureMismatch {
                    function: function.name.to_string(),
                    declared,
                    registered: body.kind(),
                });
            }
        }

        let startup = entry.startup().map(str::to_string);
        if let Some(name) = startup.as_deref() {
            if registry.get_startup(name).is_none() {
                return Err(PluginError::UnknownHook(name.to_string()));
            }
        }
        let shutdown = entry.shutdown().map(str::to_string);
        if let Some(name) = shutdown.as_deref() {
            if registry.get_shutdown(name).is_none() {
                return Err(PluginError::UnknownHook(name.to_string()));
            }
        }

        let instance = InstanceId(NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed));
        debug!(
            plugin = entry.name(),
            version = entry.version(),
            instance = instance.0,
            functions = manifest.function_count(),
            "plugin loaded"
        );

        Ok(LoadedPlugin {
            descriptor: PluginDescriptor {
                name: entry.name().to_string(),
                version: entry.version().to_string(),
                author: entry.author().to_string(),
                description: entry.description().to_string(),
                startup,
                shutdown,
                api_document,
                manifest,
            },
            registry,
            instance,
            state: RwLock::new(PluginState::Loaded),
            returns: Arc::new(ReturnTable::default()),
            next_token: AtomicU64::new(0),
        })
    }

    /// Run the startup hook and accept invocations.
    ///
    /// A nonzero hook status aborts the load: the plugin never becomes
    /// `Ready` and the host is expected to drop it.
    pub fn start(&mut self) -> Result<(), PluginError> {
        self.transition(PluginState::Loaded, PluginState::Started)?;

        if let Some(name) = self.descriptor.startup.as_deref() {
            let status = match self.registry.get_startup(name) {
                Some(hook) => hook(),
                None => {
                    // Unreachable after load validation, but never silently so.
                    *self.state.get_mut() = PluginState::Loaded;
                    return Err(PluginError::UnknownHook(name.to_string()));
                }
            };
            if status != 0 {
                warn!(plugin = %self.descriptor.name, status, "startup hook failed");
                *self.state.get_mut() = PluginState::Loaded;
                return Err(PluginError::StartupFailed(status));
            }
        }

        *self.state.get_mut() = PluginState::Ready;
        debug!(plugin = %self.descriptor.name, "plugin ready");
        Ok(())
    }

    /// Invoke an exported function on behalf of `caller`.
    ///
    /// The bundle and the return slot both live exactly as long as this one
    /// invocation; the bundle is consumed and cannot be reused for another
    /// call.
    pub fn call(
        &self,
        caller: CallerId,
        function: &str,
        bundle: ArgumentBundle,
    ) -> Result<Value, PluginError> {
        let state = *self.state.read();
        if state != PluginState::Ready {
            return Err(PluginError::InvalidState {
                expected: PluginState::Ready,
                found: state,
            });
        }

        let descriptor = self
            .descriptor
            .manifest
            .get_function(function)
            .ok_or_else(|| PluginError::FunctionNotFound(function.to_string()))?;
        let body = self
            .registry
            .get(function)
            .ok_or_else(|| PluginError::FunctionNotFound(function.to_string()))?;

        debug!(
            plugin = %self.descriptor.name,
            function,
            caller = caller.0,
            args = bundle.len(),
            "invoking export"
        );

        match body {
            ExportFn::Procedure(invoke) => {
                invoke()?;
                Ok(Value::Void)
            }
            ExportFn::Consumer(invoke) => {
                let args = Args::new(&bundle);
                invoke(&args)?;
                Ok(Value::Void)
            }
            ExportFn::Producer(invoke) => self.invoke_for_value(caller, descriptor, invoke),
            ExportFn::Function(invoke) => {
                let args = Args::new(&bundle);
                self.invoke_for_value(caller, descriptor, |rv| invoke(rv, &args))
            }
        }
    }

    fn invoke_for_value(
        &self,
        caller: CallerId,
        descriptor: &FunctionDescriptor,
        invoke: impl FnOnce(&ReturnValue) -> Result<(), PluginError>,
    ) -> Result<Value, PluginError> {
        let key = SlotKey {
            caller,
            instance: self.instance,
            function: Arc::clone(&descriptor.name),
            token: self.next_token.fetch_add(1, Ordering::Relaxed),
        };

        self.returns.open(key.clone());
        let emitter = ReturnValue::new(Arc::clone(&self.returns), key.clone());
        let outcome = invoke(&emitter);
        // The slot never outlives the invocation, whatever the outcome.
        let written = self.returns.close(&key);
        outcome?;

        let (tag, encoded) = written
            .ok_or_else(|| PluginError::MissingReturn(descriptor.name.to_string()))?;
        let context = format!("return value of '{}'", descriptor.name);
        if tag != descriptor.return_type {
            let payload = match &encoded {
                Encoded::Text(text) => text.clone(),
                Encoded::Object(handle) => format!("{handle:?}"),
            };
            return Err(PluginError::TypeMismatch {
                context,
                expected: descriptor.return_type,
                payload,
            });
        }

        Value::decode(descriptor.return_type, &encoded, &context)
    }

    /// Run the shutdown hook and leave the invocable states.
    pub fn stop(&mut self) -> Result<(), PluginError> {
        self.transition(PluginState::Ready, PluginState::Stopping)?;

        if let Some(name) = self.descriptor.shutdown.as_deref() {
            if let Some(hook) = self.registry.get_shutdown(name) {
                hook();
            }
        }

        *self.state.get_mut() = PluginState::Unloaded;
        debug!(plugin = %self.descriptor.name, "plugin unloaded");
        Ok(())
    }

    fn transition(&mut self, expected: PluginState, next: PluginState) -> Result<(), PluginError> {
        let state = self.state.get_mut();
        if *state != expected {
            return Err(PluginError::InvalidState {
                expected,
                found: *state,
            });
        }
        *state = next;
        Ok(())
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> PluginState {
        *self.state.read()
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Everything a host-side info dump needs.
    pub fn info(&self) -> PluginInfo {
        PluginInfo::of(&self.descriptor)
    }
}

/// Printable summary of a loaded plugin and its declared functions.
#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub author: String,
    pub description: String,
    pub signatures: Vec<String>,
}

impl PluginInfo {
    fn of(descriptor: &PluginDescriptor) -> Self {
        let signatures = descriptor
            .manifest
            .functions()
            .iter()
            .map(|f| {
                let arguments: Vec<String> = f
                    .arguments
                    .iter()
                    .map(|a| format!("{}: {}", a.name, a.value_type))
                    .collect();
                format!("{}({}) -> {}", f.name, arguments.join(", "), f.return_type)
            })
            .collect();

        PluginInfo {
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            author: descriptor.author.clone(),
            description: descriptor.description.clone(),
            signatures,
        }
    }
}

impl fmt::Display for PluginInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Name: {}", self.name)?;
        writeln!(f, "Version: {}", self.version)?;
        writeln!(f, "Author: {}", self.author)?;
        writeln!(f, "Description: {}", self.description)?;
        writeln!(f, "API:")?;
        for signature in &self.signatures {
            writeln!(f, "  {signature}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::plugin::*;
    use crate::registry::ExportFn;
    use gantry_manifest::{ManifestBuilder, ValueType};

    struct MiniEntry {
        api: String,
        startup: Option<&'static str>,
    }

    impl MiniEntry {
        fn new(api: String) -> Self {
            MiniEntry { api, startup: None }
        }
    }

    impl PluginEntry for MiniEntry {
        fn name(&self) -> &str {
            "mini"
        }

        fn version(&self) -> &str {
            "0.1"
        }

        fn author(&self) -> &str {
            "tests"
        }

        fn description(&self) -> &str {
            "lifecycle fixture"
        }

        fn api(&self) -> String {
            self.api.clone()
        }

        fn startup(&self) -> Option<&str> {
            self.startup
        }
    }

    fn answer_api() -> String {
        let mut builder = ManifestBuilder::new();
        let _ = builder.add_function("answer", ValueType::Int);
        builder.export().unwrap_or_default()
    }

    fn answer_registry() -> ExportRegistry {
        let mut registry = ExportRegistry::new();
        let _ = registry.export(
            "answer",
            ExportFn::producer(|rv| rv.set_return_value(ValueType::Int, &Value::Int(42))),
        );
        registry
    }

    #[test]
    fn test_lifecycle_happy_path() {
        let entry = MiniEntry::new(answer_api());
        let Ok(mut plugin) = LoadedPlugin::load(&entry, answer_registry()) else {
            panic!("load failed");
        };

        assert_eq!(plugin.state(), PluginState::Loaded);
        assert!(plugin.start().is_ok());
        assert_eq!(plugin.state(), PluginState::Ready);

        let result = plugin.call(CallerId(1), "answer", ArgumentBundle::empty());
        assert_eq!(result.ok(), Some(Value::Int(42)));

        assert!(plugin.stop().is_ok());
        assert_eq!(plugin.state(), PluginState::Unloaded);
    }

    #[test]
    fn test_calls_require_ready() {
        let entry = MiniEntry::new(answer_api());
        let Ok(mut plugin) = LoadedPlugin::load(&entry, answer_registry()) else {
            panic!("load failed");
        };

        let early = plugin.call(CallerId(1), "answer", ArgumentBundle::empty());
        assert!(matches!(
            early,
            Err(PluginError::InvalidState { expected, found })
                if expected == PluginState::Ready && found == PluginState::Loaded
        ));

        assert!(plugin.start().is_ok());
        assert!(plugin.stop().is_ok());
        let late = plugin.call(CallerId(1), "answer", ArgumentBundle::empty());
        assert!(late.is_err());
    }

    #[test]
    fn test_transitions_are_strictly_sequential() {
        let entry = MiniEntry::new(answer_api());
        let Ok(mut plugin) = LoadedPlugin::load(&entry, answer_registry()) else {
            panic!("load failed");
        };

        // Cannot stop a plugin that was never started.
        assert!(plugin.stop().is_err());
        assert!(plugin.start().is_ok());
        // Cannot re-enter Started.
        assert!(plugin.start().is_err());
    }

    #[test]
    fn test_nonzero_startup_aborts_the_load() {
        let mut entry = MiniEntry::new(answer_api());
        entry.startup = Some("failing_init");

        let mut registry = answer_registry();
        let _ = registry.startup_hook("failing_init", || -1);

        let Ok(mut plugin) = LoadedPlugin::load(&entry, registry) else {
            panic!("load failed");
        };
        assert!(matches!(plugin.start(), Err(PluginError::StartupFailed(-1))));
        assert_ne!(plugin.state(), PluginState::Ready);
    }

    #[test]
    fn test_named_but_unregistered_hook_rejects_the_load() {
        let mut entry = MiniEntry::new(answer_api());
        entry.startup = Some("missing_init");

        let result = LoadedPlugin::load(&entry, answer_registry());
        assert!(matches!(
            result,
            Err(PluginError::UnknownHook(name)) if name == "missing_init"
        ));
    }

    #[test]
    fn test_declared_function_without_body_rejects_the_load() {
        let entry = MiniEntry::new(answer_api());
        let result = LoadedPlugin::load(&entry, ExportRegistry::new());
        assert!(matches!(
            result,
            Err(PluginError::MissingExport(name)) if name == "answer"
        ));
    }

    #[test]
    fn test_body_of_wrong_shape_rejects_the_load() {
        let entry = MiniEntry::new(answer_api());
        let mut registry = ExportRegistry::new();
        // "answer" is declared as a value-returning producer.
        let _ = registry.export("answer", ExportFn::procedure(|| Ok(())));

        let result = LoadedPlugin::load(&entry, registry);
        assert!(matches!(
            result,
            Err(PluginError::SignatureMismatch { function, .. }) if function == "answer"
        ));
    }

    #[test]
    fn test_malformed_manifest_rejects_the_load() {
        let entry = MiniEntry::new(r#"{"API": [{"name": "f", "return_type": "cstring"}]}"#.to_string());
        let result = LoadedPlugin::load(&entry, ExportRegistry::new());
        assert!(matches!(result, Err(PluginError::Manifest(_))));
    }

    #[test]
    fn test_missing_return_is_reported() {
        let mut builder = ManifestBuilder::new();
        let _ = builder.add_function("silent", ValueType::Int);
        let entry = MiniEntry::new(builder.export().unwrap_or_default());

        let mut registry = ExportRegistry::new();
        let _ = registry.export("silent", ExportFn::producer(|_| Ok(())));

        let Ok(mut plugin) = LoadedPlugin::load(&entry, registry) else {
            panic!("load failed");
        };
        assert!(plugin.start().is_ok());

        let result = plugin.call(CallerId(1), "silent", ArgumentBundle::empty());
        assert!(matches!(
            result,
            Err(PluginError::MissingReturn(name)) if name == "silent"
        ));
    }

    #[test]
    fn test_void_function_that_never_writes_succeeds() {
        let mut builder = ManifestBuilder::new();
        let _ = builder.add_function("quiet", ValueType::Void);
        let entry = MiniEntry::new(builder.export().unwrap_or_default());

        let mut registry = ExportRegistry::new();
        let _ = registry.export("quiet", ExportFn::procedure(|| Ok(())));

        let Ok(mut plugin) = LoadedPlugin::load(&entry, registry) else {
            panic!("load failed");
        };
        assert!(plugin.start().is_ok());
        let result = plugin.call(CallerId(1), "quiet", ArgumentBundle::empty());
        assert_eq!(result.ok(), Some(Value::Void));
    }

    #[test]
    fn test_return_tag_must_match_declaration() {
        let mut builder = ManifestBuilder::new();
        let _ = builder.add_function("mislabeled", ValueType::Int);
        let entry = MiniEntry::new(builder.export().unwrap_or_default());

        let mut registry = ExportRegistry::new();
        let _ = registry.export(
            "mislabeled",
            ExportFn::producer(|rv| rv.set_return_value(ValueType::Long, &Value::Long(42))),
        );

        let Ok(mut plugin) = LoadedPlugin::load(&entry, registry) else {
            panic!("load failed");
        };
        assert!(plugin.start().is_ok());

        let result = plugin.call(CallerId(1), "mislabeled", ArgumentBundle::empty());
        assert!(matches!(
            result,
            Err(PluginError::TypeMismatch { expected, .. }) if expected == ValueType::Int
        ));
    }

    #[test]
    fn test_consumer_receives_host_encoded_arguments() {
        let mut builder = ManifestBuilder::new();
        let _ = builder.add_function("foo_args", ValueType::Void);
        let _ = builder.add_argument("foo_args", "arg1", ValueType::Int);
        let _ = builder.add_argument("foo_args", "arg2", ValueType::UInt);
        let entry = MiniEntry::new(builder.export().unwrap_or_default());

        let mut registry = ExportRegistry::new();
        let _ = registry.export(
            "foo_args",
            ExportFn::consumer(|args| {
                assert_eq!(args.arg_count(), 2);
                assert_eq!(args.int_arg("arg1")?, 7);
                assert_eq!(args.uint_arg("arg2")?, 9);
                Ok(())
            }),
        );

        let Ok(mut plugin) = LoadedPlugin::load(&entry, registry) else {
            panic!("load failed");
        };
        assert!(plugin.start().is_ok());

        // The host hands over canonical textual encodings, not native values.
        let bundle = ArgumentBundle::builder()
            .with_encoded("arg1", ValueType::Int, "7")
            .with_encoded("arg2", ValueType::UInt, "9")
            .build();
        let result = plugin.call(CallerId(1), "foo_args", bundle);
        assert_eq!(result.ok(), Some(Value::Void));
    }

    #[test]
    fn test_second_return_write_fails_the_call() {
        let mut builder = ManifestBuilder::new();
        let _ = builder.add_function("greedy", ValueType::Int);
        let entry = MiniEntry::new(builder.export().unwrap_or_default());

        let mut registry = ExportRegistry::new();
        let _ = registry.export(
            "greedy",
            ExportFn::producer(|rv| {
                rv.set_return_value(ValueType::Int, &Value::Int(1))?;
                rv.set_return_value(ValueType::Int, &Value::Int(2))
            }),
        );

        let Ok(mut plugin) = LoadedPlugin::load(&entry, registry) else {
            panic!("load failed");
        };
        assert!(plugin.start().is_ok());

        let result = plugin.call(CallerId(1), "greedy", ArgumentBundle::empty());
        assert!(matches!(
            result,
            Err(PluginError::DoubleReturn(name)) if name == "greedy"
        ));
    }

    #[test]
    fn test_unknown_function_is_reported() {
        let entry = MiniEntry::new(answer_api());
        let Ok(mut plugin) = LoadedPlugin::load(&entry, answer_registry()) else {
            panic!("load failed");
        };
        assert!(plugin.start().is_ok());

        let result = plugin.call(CallerId(1), "riddle", ArgumentBundle::empty());
        assert!(matches!(
            result,
            Err(PluginError::FunctionNotFound(name)) if name == "riddle"
        ));
    }

    #[test]
    fn test_info_dump_lists_signatures() {
        let mut builder = ManifestBuilder::new();
        let _ = builder.add_function("foo_args", ValueType::Void);
        let _ = builder.add_argument("foo_args", "arg1", ValueType::Int);
        let _ = builder.add_argument("foo_args", "arg2", ValueType::UInt);
        let entry = MiniEntry::new(builder.export().unwrap_or_default());

        let mut registry = ExportRegistry::new();
        let _ = registry.export("foo_args", ExportFn::consumer(|_| Ok(())));

        let Ok(plugin) = LoadedPlugin::load(&entry, registry) else {
            panic!("load failed");
        };
        let info = plugin.info();
        assert_eq!(info.name, "mini");
        assert_eq!(info.signatures, ["foo_args(arg1: int, arg2: uint) -> void"]);

        let rendered = info.to_string();
        assert!(rendered.contains("Name: mini"));
        assert!(rendered.contains("foo_args(arg1: int, arg2: uint) -> void"));
    }
}
