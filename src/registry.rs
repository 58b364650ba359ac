//! Device/variable registry
//!
//! Maps `(device id, variable id)` pairs from variable-value packets to the
//! named, typed log they feed. Entries come from device descriptor packets and
//! are cleared at every run boundary.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::LogValueType;

/// Log a process variable feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableInfo {
    /// Log name
    pub name: String,
    /// Value type of the log
    pub value_type: LogValueType,
    /// Units of measurement, if the descriptor gave any
    pub units: Option<String>,
}

/// Registry of process variables announced by device descriptors.
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    variables: HashMap<(u32, u32), VariableInfo>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable; an existing registration for the key is replaced.
    pub fn register(&mut self, device_id: u32, variable_id: u32, info: VariableInfo) {
        debug!(device_id, variable_id, name = %info.name, value_type = %info.value_type, "Registered process variable");
        self.variables.insert((device_id, variable_id), info);
    }

    pub fn lookup(&self, device_id: u32, variable_id: u32) -> Option<&VariableInfo> {
        self.variables.get(&(device_id, variable_id))
    }

    pub fn contains(&self, device_id: u32, variable_id: u32) -> bool {
        self.variables.contains_key(&(device_id, variable_id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(u32, u32), &VariableInfo)> {
        self.variables.iter()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn clear(&mut self) {
        self.variables.clear();
    }
}
