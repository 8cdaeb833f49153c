//! Protocol descriptors and task constants
//!
//! Every task declares its constants with default values. A protocol is a set
//! of overrides for those constants; overriding an undeclared constant, or
//! giving a value of the wrong type, is rejected before the task is built.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{TaskError, TaskResult};

/// Overrides for a task's declared constants
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Protocol(BTreeMap<String, Value>);

impl Protocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Protocol from a JSON object; `null` is an empty protocol
    pub fn from_value(task: &'static str, value: Value) -> TaskResult<Self> {
        match value {
            Value::Null => Ok(Protocol::new()),
            Value::Object(map) => Ok(Protocol(map.into_iter().collect())),
            other => Err(TaskError::InvalidConstant {
                task,
                key: "<protocol>".to_string(),
                reason: format!("expected a table, got {other}"),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A task's constants: declared defaults, possibly overridden
#[derive(Clone, Debug)]
pub struct Constants {
    task: &'static str,
    values: BTreeMap<&'static str, Value>,
}

impl Constants {
    pub fn new(task: &'static str) -> Self {
        Constants {
            task,
            values: BTreeMap::new(),
        }
    }

    /// Declare a constant with its default value
    pub fn declare(mut self, name: &'static str, default: impl Into<Value>) -> Self {
        self.values.insert(name, default.into());
        self
    }

    /// Apply `protocol` on top of the declared defaults
    pub fn resolve(mut self, protocol: &Protocol) -> TaskResult<Self> {
        for (key, value) in protocol.iter() {
            let Some((name, default)) = self.values.get_key_value(key.as_str()) else {
                return Err(TaskError::UnknownConstant {
                    task: self.task,
                    key: key.clone(),
                });
            };
            if !same_shape(default, value) {
                return Err(TaskError::InvalidConstant {
                    task: self.task,
                    key: key.clone(),
                    reason: format!("expected {}, got {}", shape(default), shape(value)),
                });
            }
            let name = *name;
            self.values.insert(name, value.clone());
        }
        Ok(self)
    }

    /// Deserialize constant `name`
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> TaskResult<T> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| TaskError::UnknownConstant {
                task: self.task,
                key: name.to_string(),
            })?;
        serde_json::from_value(value.clone()).map_err(|e| TaskError::InvalidConstant {
            task: self.task,
            key: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Constant `name` read as a number of seconds
    pub fn seconds(&self, name: &str) -> TaskResult<Duration> {
        let secs: f64 = self.get(name)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(self.invalid(name, format!("{secs} is not a valid duration")));
        }
        Ok(Duration::from_secs_f64(secs))
    }

    /// Constant `name` read as a number of minutes
    pub fn minutes(&self, name: &str) -> TaskResult<Duration> {
        let secs = self.seconds(name)?;
        Ok(secs * 60)
    }

    /// Raw JSON value of constant `name`
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn invalid(&self, name: &str, reason: impl Into<String>) -> TaskError {
        TaskError::InvalidConstant {
            task: self.task,
            key: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.keys().copied()
    }
}

/// Defaults of `null` accept any override
fn same_shape(default: &Value, value: &Value) -> bool {
    match (default, value) {
        (Value::Null, _) => true,
        (Value::Bool(_), Value::Bool(_)) => true,
        (Value::Number(_), Value::Number(_)) => true,
        (Value::String(_), Value::String(_)) => true,
        (Value::Array(_), Value::Array(_)) => true,
        (Value::Object(_), Value::Object(_) | Value::Null) => true,
        _ => false,
    }
}

fn shape(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a table",
    }
}
