//! Stack Outputs
//!
//! Named values a stack exports once the program finishes.

use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One exported value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OutputValue {
    pub value: Value,
    #[serde(default)]
    pub secret: bool,
}

/// Ordered collection of stack outputs.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct StackOutputs {
    values: BTreeMap<String, OutputValue>,
}

impl StackOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plain output. An existing key is replaced.
    pub fn export(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.insert(key.into(), value.into(), false);
    }

    /// Registers an output whose value must be masked in logs.
    pub fn export_secret(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.insert(key.into(), value.into(), true);
    }

    fn insert(&mut self, key: String, value: Value, secret: bool) {
        if self.values.contains_key(&key) {
            warn!("Output '{}' exported more than once, keeping the last value", key);
        }
        self.values.insert(key, OutputValue { value, secret });
    }

    pub fn get(&self, key: &str) -> Option<&OutputValue> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OutputValue)> {
        self.values.iter()
    }

    /// Renders the outputs as a plain `{key: value}` JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.value.clone()))
                .collect(),
        )
    }
}
