use crate::{ContextId, Timestamp, Val};
use std::collections::BTreeMap;

/// An observation emitted by the instrumented program.
///
/// Events are immutable, ordered facts:
/// once submitted to a monitor they are shared (never copied) as evidence.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Logical timestamp, unique and monotonically assigned at emission.
    pub timestamp: Timestamp,
    /// Program point where the observation occurs (e.g., `enter(f)`).
    pub point: String,
    /// Execution context that produced the observation.
    pub context: ContextId,
    /// Observed values by name.
    pub values: BTreeMap<String, Val>,
}

impl Event {
    /// Creates an event carrying no values.
    pub fn new(timestamp: Timestamp, point: impl Into<String>, context: ContextId) -> Self {
        Self {
            timestamp,
            point: point.into(),
            context,
            values: BTreeMap::new(),
        }
    }

    /// Adds a named value to the event.
    pub fn with_value(mut self, name: impl Into<String>, val: impl Into<Val>) -> Self {
        self.values.insert(name.into(), val.into());
        self
    }

    /// The value observed under the given name, if any.
    pub fn value(&self, name: &str) -> Option<&Val> {
        self.values.get(name)
    }
}
