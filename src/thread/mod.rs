//! Unit-side endpoint.
//!
//! - [`Thread`] pools, handlers, readiness and exit of one unit
//! - [`TerminateRequest`] handed to the graceful-termination hook
//! - `Scope` task scope cancelled when the unit ends
//! - `serve` the unit's control loop

mod control;
mod scope;
#[allow(clippy::module_inception)]
mod thread;

pub use control::TerminateRequest;
pub use thread::Thread;

pub(crate) use control::serve;
pub(crate) use scope::Scope;
pub(crate) use thread::ThreadInit;
