//! # Unit identity.
//!
//! An [`Addressee`] names one instance of one logical group: `(name, number)`,
//! with instance numbers starting at 1. It is immutable once assigned and is
//! used as the key for channels, worker records and port bundles.

use std::fmt;
use std::sync::Arc;

/// Name of the pool every unit uses to reach the supervisor.
pub const MAIN_POOL: &str = "main";

/// Identity of one instance of a logical unit group.
///
/// ## Example
/// ```rust
/// use threadvisor::Addressee;
///
/// let a = Addressee::new("workers", 2);
/// assert_eq!(a.name(), "workers");
/// assert_eq!(a.number(), 2);
/// assert_eq!(a.to_string(), "workers#2");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Addressee {
    name: Arc<str>,
    number: u32,
}

impl Addressee {
    /// Creates a new addressee.
    pub fn new(name: impl Into<Arc<str>>, number: u32) -> Self {
        Self {
            name: name.into(),
            number,
        }
    }

    /// The supervisor's own endpoint (`main#1`).
    pub fn main() -> Self {
        Self::new(MAIN_POOL, 1)
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instance number (1-based).
    pub fn number(&self) -> u32 {
        self.number
    }
}

impl fmt::Display for Addressee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.number)
    }
}
