//! Metadata carried by tasks and events

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::ChamberId;

/// Free-form key/value metadata attached to an event
pub type Metadata = BTreeMap<String, Value>;

/// Build event metadata from key/value pairs
pub fn metadata<K, V, I>(pairs: I) -> Metadata
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Identity of the session a task instance belongs to
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskMetadata {
    /// Chamber the task runs in
    pub chamber: ChamberId,
    /// Subject identifier
    pub subject: String,
    /// Arbitrary extra attributes
    #[serde(flatten)]
    pub extra: Metadata,
}

impl TaskMetadata {
    pub fn new(chamber: ChamberId, subject: impl Into<String>) -> Self {
        TaskMetadata {
            chamber,
            subject: subject.into(),
            extra: Metadata::new(),
        }
    }

    /// Attach an extra attribute
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}
