//! # Group declaration.
//!
//! [`GroupSpec`] is the user-facing declaration of one logical unit group:
//! how many instances to run, which entry point they execute, which other
//! groups they talk to, and the payload handed to every instance.

use serde_json::Value;

use crate::runtime::EntryRef;

/// Declaration of one logical group of units.
///
/// ## Example
/// ```rust
/// use serde_json::json;
/// use threadvisor::{EntryFn, GroupSpec, Thread};
///
/// let entry = EntryFn::arc("worker", |_thread: Thread| async move { Ok(()) });
/// let spec = GroupSpec::new("workers", entry)
///     .instances(4)
///     .peer("db")
///     .peer("workers")
///     .data(json!({ "batch": 64 }));
///
/// assert_eq!(spec.name(), "workers");
/// assert_eq!(spec.instance_count(), 4);
/// ```
#[derive(Clone)]
pub struct GroupSpec {
    pub(crate) name: String,
    pub(crate) instances: u32,
    pub(crate) entry: EntryRef,
    pub(crate) peers: Vec<String>,
    pub(crate) data: Value,
}

impl GroupSpec {
    /// Declares a group with one instance, no peers and `null` data.
    pub fn new(name: impl Into<String>, entry: EntryRef) -> Self {
        Self {
            name: name.into(),
            instances: 1,
            entry,
            peers: Vec::new(),
            data: Value::Null,
        }
    }

    /// Sets the number of instances (must be at least 1).
    pub fn instances(mut self, n: u32) -> Self {
        self.instances = n;
        self
    }

    /// Adds a peer group. Naming the group itself links all its instances pairwise.
    pub fn peer(mut self, name: impl Into<String>) -> Self {
        self.peers.push(name.into());
        self
    }

    /// Adds several peer groups.
    pub fn peers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.peers.extend(names.into_iter().map(Into::into));
        self
    }

    /// Sets the payload handed to every instance of the group.
    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared instance count.
    pub fn instance_count(&self) -> u32 {
        self.instances
    }
}
