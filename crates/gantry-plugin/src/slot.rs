//! Per-invocation return slots
//!
//! Every value-returning call gets exactly one slot, keyed by caller id,
//! plugin instance id, function name and an invocation-scoped token, so
//! concurrent or re-entrant calls can never cross-write results. The slot
//! exists only for the duration of one invocation.

use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

use crate::errors::PluginError;
use crate::plugin::{CallerId, InstanceId};
use crate::value::{Encoded, Value};
use gantry_manifest::ValueType;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SlotKey {
    pub caller: CallerId,
    pub instance: InstanceId,
    pub function: Arc<str>,
    pub token: u64,
}

enum Slot {
    Pending,
    Filled(ValueType, Encoded),
}

/// All open return slots of one loaded plugin.
#[derive(Default)]
pub(crate) struct ReturnTable {
    slots: Mutex<AHashMap<SlotKey, Slot>>,
}

impl ReturnTable {
    /// Open a slot for a starting invocation.
    pub fn open(&self, key: SlotKey) {
        self.slots.lock().insert(key, Slot::Pending);
    }

    /// Write the one permitted return value.
    pub fn write(&self, key: &SlotKey, tag: ValueType, encoded: Encoded) -> Result<(), PluginError> {
        let mut slots = self.slots.lock();
        match slots.get_mut(key) {
            Some(slot @ Slot::Pending) => {
                *slot = Slot::Filled(tag, encoded);
                Ok(())
            }
            Some(Slot::Filled(..)) => Err(PluginError::DoubleReturn(key.function.to_string())),
            // The slot was already closed; the invocation is over.
            None => Err(PluginError::MissingReturn(key.function.to_string())),
        }
    }

    /// Close the slot when the invocation returns, yielding what was written.
    pub fn close(&self, key: &SlotKey) -> Option<(ValueType, Encoded)> {
        match self.slots.lock().remove(key) {
            Some(Slot::Filled(tag, encoded)) => Some((tag, encoded)),
            _ => None,
        }
    }
}

/// Emitter handed to value-returning plugin functions.
///
/// Carries the invocation identifiers so the function can address its own
/// slot and nothing else.
pub struct ReturnValue {
    table: Arc<ReturnTable>,
    key: SlotKey,
}

impl ReturnValue {
    pub(crate) fn new(table: Arc<ReturnTable>, key: SlotKey) -> Self {
        ReturnValue { table, key }
    }

    /// The caller this invocation belongs to.
    pub fn caller(&self) -> CallerId {
        self.key.caller
    }

    /// The plugin instance being invoked.
    pub fn instance(&self) -> InstanceId {
        self.key.instance
    }

    /// Name of the function being invoked.
    pub fn function_name(&self) -> &str {
        &self.key.function
    }

    /// Encode `value` tagged with `value_type` into this invocation's slot.
    ///
    /// Valid exactly once per invocation; a second write fails with
    /// `DoubleReturn` and is reported to the host.
    pub fn set_return_value(&self, value_type: ValueType, value: &Value) -> Result<(), PluginError> {
        if value.value_type() != value_type {
            return Err(PluginError::TypeMismatch {
                context: format!("return value of '{}'", self.key.function),
                expected: value_type,
                payload: value.to_string(),
            });
        }

        trace!(
            function = %self.key.function,
            tag = %value_type,
            "setting return value"
        );
        self.table.write(&self.key, value_type, value.encode())
    }
}
