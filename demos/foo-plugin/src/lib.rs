//! Example plugin exercising every marshalable type
//!
//! One exported function per scalar type, a fourteen-argument consumer, and
//! the `foo_class`/`foo_pointer` pair demonstrating how an object crosses the
//! boundary by identity and comes back intact.

use std::sync::Arc;
use tracing::{debug, info};

use gantry_manifest::{ManifestBuilder, ManifestError, ValueType};
use gantry_plugin::{
    handles, ExportFn, ExportRegistry, LoadedPlugin, PluginEntry, PluginError, Value,
};

/// The object published through `foo_class` and read back by `foo_pointer`.
pub struct Counter {
    value: i32,
}

impl Counter {
    pub fn new(value: i32) -> Self {
        Counter { value }
    }

    pub fn value(&self) -> i32 {
        self.value
    }
}

/// Entry point read once by the host at load time.
pub struct FooPlugin {
    api: String,
}

impl FooPlugin {
    pub fn new() -> Result<Self, ManifestError> {
        Ok(FooPlugin {
            api: build_api()?,
        })
    }
}

impl PluginEntry for FooPlugin {
    fn name(&self) -> &str {
        "foo-plugin"
    }

    fn version(&self) -> &str {
        "0.2"
    }

    fn author(&self) -> &str {
        "Gantry Contributors"
    }

    fn description(&self) -> &str {
        "Example plugin exercising every marshalable type"
    }

    fn api(&self) -> String {
        self.api.clone()
    }

    fn startup(&self) -> Option<&str> {
        Some("module_init")
    }

    fn shutdown(&self) -> Option<&str> {
        Some("module_uninit")
    }
}

/// Return values the foo_* producers hand back, one per scalar type.
const FOO_RETURNS: [(&str, ValueType); 14] = [
    ("foo_int", ValueType::Int),
    ("foo_uint", ValueType::UInt),
    ("foo_sint", ValueType::ShortInt),
    ("foo_usint", ValueType::UShortInt),
    ("foo_char", ValueType::Char),
    ("foo_uchar", ValueType::UChar),
    ("foo_float", ValueType::Float),
    ("foo_double", ValueType::Double),
    ("foo_long", ValueType::Long),
    ("foo_ulong", ValueType::ULong),
    ("foo_llong", ValueType::LongLong),
    ("foo_ullong", ValueType::ULongLong),
    ("foo_boolean", ValueType::Boolean),
    ("foo_string", ValueType::String),
];

/// Argument list of `foo_args`, in calling-convention order.
const FOO_ARGS: [(&str, ValueType); 14] = [
    ("arg1", ValueType::Int),
    ("arg2", ValueType::UInt),
    ("arg3", ValueType::ShortInt),
    ("arg4", ValueType::UShortInt),
    ("arg5", ValueType::Char),
    ("arg6", ValueType::UChar),
    ("arg7", ValueType::Float),
    ("arg8", ValueType::Double),
    ("arg9", ValueType::Long),
    ("arg10", ValueType::ULong),
    ("arg11", ValueType::LongLong),
    ("arg12", ValueType::ULongLong),
    ("arg13", ValueType::Boolean),
    ("arg14", ValueType::String),
];

fn build_api() -> Result<String, ManifestError> {
    let mut builder = ManifestBuilder::new();

    for (name, return_type) in FOO_RETURNS {
        builder.add_function(name, return_type)?;
    }

    builder.add_function("foo_args", ValueType::Void)?;
    for (name, value_type) in FOO_ARGS {
        builder.add_argument("foo_args", name, value_type)?;
    }

    builder.add_function("foo_class", ValueType::Pointer)?;
    builder.add_function("foo_pointer", ValueType::Int)?;
    builder.add_argument("foo_pointer", "counter", ValueType::Pointer)?;

    builder.export()
}

fn produce(value: Value) -> ExportFn {
    let tag = value.value_type();
    ExportFn::producer(move |rv| {
        debug!(function = rv.function_name(), "producing return value");
        rv.set_return_value(tag, &value)
    })
}

/// Register every declared body plus the lifecycle hooks.
pub fn build_registry() -> Result<ExportRegistry, PluginError> {
    let mut registry = ExportRegistry::new();

    registry.export("foo_int", produce(Value::Int(42)))?;
    registry.export("foo_uint", produce(Value::UInt(420)))?;
    registry.export("foo_sint", produce(Value::ShortInt(421)))?;
    registry.export("foo_usint", produce(Value::UShortInt(4201)))?;
    registry.export("foo_char", produce(Value::Char('a')))?;
    registry.export("foo_uchar", produce(Value::UChar(230)))?;
    registry.export("foo_float", produce(Value::Float(42.5)))?;
    registry.export("foo_double", produce(Value::Double(4.2)))?;
    registry.export("foo_long", produce(Value::Long(42_000)))?;
    registry.export("foo_ulong", produce(Value::ULong(420_001)))?;
    registry.export("foo_llong", produce(Value::LongLong(420_009)))?;
    registry.export("foo_ullong", produce(Value::ULongLong(4_200_019)))?;
    registry.export("foo_boolean", produce(Value::Boolean(true)))?;
    registry.export(
        "foo_string",
        produce(Value::String("Just a String test!".to_string())),
    )?;

    registry.export(
        "foo_args",
        ExportFn::consumer(|args| {
            let arg1 = args.int_arg("arg1")?;
            let arg2 = args.uint_arg("arg2")?;
            let arg3 = args.sint_arg("arg3")?;
            let arg4 = args.usint_arg("arg4")?;
            let arg5 = args.char_arg("arg5")?;
            let arg6 = args.uchar_arg("arg6")?;
            let arg7 = args.float_arg("arg7")?;
            let arg8 = args.double_arg("arg8")?;
            let arg9 = args.long_arg("arg9")?;
            let arg10 = args.ulong_arg("arg10")?;
            let arg11 = args.llong_arg("arg11")?;
            let arg12 = args.ullong_arg("arg12")?;
            let arg13 = args.boolean_arg("arg13")?;
            let arg14 = args.string_arg("arg14")?;

            debug!(
                count = args.arg_count(),
                "arguments ({arg1}, {arg2}, {arg3}, {arg4}, {arg5}, {arg6}, \
                 {arg7}, {arg8}, {arg9}, {arg10}, {arg11}, {arg12}, {arg13}, {arg14})"
            );
            Ok(())
        }),
    )?;

    // The plugin creates and owns the counter; only its handle crosses over.
    registry.export(
        "foo_class",
        ExportFn::producer(|rv| {
            let handle = handles().publish(Arc::new(Counter::new(42)));
            rv.set_return_value(ValueType::Pointer, &Value::Pointer(handle))
        }),
    )?;

    registry.export(
        "foo_pointer",
        ExportFn::function(|rv, args| {
            let handle = args.pointer_arg("counter")?;
            let counter = handles().resolve::<Counter>(handle)?;
            rv.set_return_value(ValueType::Int, &Value::Int(counter.value()))
        }),
    )?;

    registry.startup_hook("module_init", || {
        info!("foo-plugin starting up");
        0
    })?;
    registry.shutdown_hook("module_uninit", || {
        info!("foo-plugin shutting down");
    })?;

    Ok(registry)
}

/// Build the entry and registry and hand the loaded plugin to the host.
pub fn load() -> Result<LoadedPlugin, PluginError> {
    let entry = FooPlugin::new()?;
    LoadedPlugin::load(&entry, build_registry()?)
}
