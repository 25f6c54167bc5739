//! Per-invocation argument bundles
//!
//! The host marshals one `ArgumentBundle` per call, valid only for that
//! invocation. Plugin code reads it through `Args`, which decodes each entry
//! against the type declared in the manifest; the accessor itself does not
//! re-validate the declaration.

use ahash::AHashMap;
use std::sync::Arc;

use crate::errors::PluginError;
use crate::handle::Handle;
use crate::value::{Encoded, Value};
use gantry_manifest::ValueType;

/// Host-owned container of named, typed input values for one invocation.
#[derive(Debug, Default)]
pub struct ArgumentBundle {
    entries: AHashMap<Arc<str>, (ValueType, Encoded)>,
}

impl ArgumentBundle {
    pub fn builder() -> BundleBuilder {
        BundleBuilder::default()
    }

    /// A bundle carrying no arguments.
    pub fn empty() -> Self {
        ArgumentBundle::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get(&self, name: &str) -> Option<&(ValueType, Encoded)> {
        self.entries.get(name)
    }
}

/// Builds an `ArgumentBundle` on the host side of the boundary.
#[derive(Debug, Default)]
pub struct BundleBuilder {
    entries: AHashMap<Arc<str>, (ValueType, Encoded)>,
}

impl BundleBuilder {
    /// Marshal a typed value under the given argument name.
    pub fn with(mut self, name: &str, value: &Value) -> Self {
        self.entries
            .insert(Arc::from(name), (value.value_type(), value.encode()));
        self
    }

    /// Supply an already-encoded payload, tagged with its declared type.
    ///
    /// This is the form a foreign host hands over: the canonical textual
    /// encoding, never a native representation.
    pub fn with_encoded(
        mut self,
        name: &str,
        value_type: ValueType,
        payload: impl Into<String>,
    ) -> Self {
        self.entries
            .insert(Arc::from(name), (value_type, Encoded::Text(payload.into())));
        self
    }

    pub fn build(self) -> ArgumentBundle {
        ArgumentBundle {
            entries: self.entries,
        }
    }
}

/// Accessor a plugin function uses to extract its received arguments.
pub struct Args<'a> {
    bundle: &'a ArgumentBundle,
}

impl<'a> Args<'a> {
    pub(crate) fn new(bundle: &'a ArgumentBundle) -> Self {
        Args { bundle }
    }

    /// Decode the value bound to `name`.
    pub fn argument(&self, name: &str) -> Result<Value, PluginError> {
        let (declared, encoded) = self
            .bundle
            .get(name)
            .ok_or_else(|| PluginError::ArgumentNotFound(name.to_string()))?;
        Value::decode(*declared, encoded, &format!("argument '{name}'"))
    }

    /// How many arguments this invocation carries.
    pub fn arg_count(&self) -> usize {
        self.bundle.len()
    }

    fn unexpected(name: &str, expected: ValueType, value: &Value) -> PluginError {
        PluginError::TypeMismatch {
            context: format!("argument '{name}'"),
            expected,
            payload: value.to_string(),
        }
    }
}

// Typed getters mirroring the host-side accessor family, one per scalar type
// plus pointer. Each fails with TypeMismatch when the declared type of the
// argument disagrees with the requested one.
macro_rules! typed_getters {
    ($($getter:ident => $variant:ident($ty:ty)),+ $(,)?) => {
        impl Args<'_> {
            $(
                pub fn $getter(&self, name: &str) -> Result<$ty, PluginError> {
                    match self.argument(name)? {
                        Value::$variant(v) => Ok(v),
                        value => Err(Self::unexpected(name, ValueType::$variant, &value)),
                    }
                }
            )+
        }
    };
}

typed_getters! {
    char_arg => Char(char),
    uchar_arg => UChar(u8),
    int_arg => Int(i32),
    uint_arg => UInt(u32),
    sint_arg => ShortInt(i16),
    usint_arg => UShortInt(u16),
    float_arg => Float(f32),
    double_arg => Double(f64),
    long_arg => Long(i64),
    ulong_arg => ULong(u64),
    llong_arg => LongLong(i64),
    ullong_arg => ULongLong(u64),
    boolean_arg => Boolean(bool),
    string_arg => String(String),
    pointer_arg => Pointer(Handle),
}

#[cfg(test)]
mod tests {
    use crate::bundle::*;

    fn sample() -> ArgumentBundle {
        ArgumentBundle::builder()
            .with("arg1", &Value::Int(7))
            .with("arg2", &Value::UInt(9))
            .with("arg3", &Value::String("bar".to_string()))
            .build()
    }

    #[test]
    fn test_argument_lookup_and_count() {
        let bundle = sample();
        let args = Args::new(&bundle);

        assert_eq!(args.arg_count(), 3);
        assert_eq!(args.argument("arg1").ok(), Some(Value::Int(7)));
        assert_eq!(args.int_arg("arg1").ok(), Some(7));
        assert_eq!(args.uint_arg("arg2").ok(), Some(9));
        assert_eq!(args.string_arg("arg3").ok(), Some("bar".to_string()));
    }

    #[test]
    fn test_missing_argument_fails() {
        let bundle = sample();
        let args = Args::new(&bundle);
        assert!(matches!(
            args.argument("arg4"),
            Err(PluginError::ArgumentNotFound(name)) if name == "arg4"
        ));
    }

    #[test]
    fn test_typed_getter_rejects_wrong_declared_type() {
        let bundle = sample();
        let args = Args::new(&bundle);
        assert!(matches!(
            args.double_arg("arg1"),
            Err(PluginError::TypeMismatch { expected, .. })
                if expected == ValueType::Double
        ));
    }

    #[test]
    fn test_host_encoded_payload_decodes_as_declared() {
        // The wire form a foreign host supplies: text tagged with a type.
        let bundle = ArgumentBundle::builder()
            .with_encoded("arg1", ValueType::Int, "7")
            .with_encoded("arg2", ValueType::UInt, "9")
            .build();
        let args = Args::new(&bundle);
        assert_eq!(args.argument("arg1").ok(), Some(Value::Int(7)));
        assert_eq!(args.argument("arg2").ok(), Some(Value::UInt(9)));
    }

    #[test]
    fn test_undecodable_payload_surfaces_at_point_of_use() {
        let bundle = ArgumentBundle::builder()
            .with_encoded("arg1", ValueType::Int, "seven")
            .build();
        let args = Args::new(&bundle);
        assert!(args.argument("arg1").is_err());
    }
}
