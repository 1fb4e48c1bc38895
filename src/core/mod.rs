//! Supervisor core: boot, crash classification, revival and shutdown.
//!
//! Internal modules:
//! - [`supervisor`]: boot sequence, unit monitors, revival loop, terminate;
//! - [`builder`]: topology, subscribers and runtime wiring;
//! - [`config`]: [`SupervisorConfig`] and its defaults;
//! - [`registry`]: one record per unit (state, generation, deaths);
//! - [`deaths`]: sliding-window crash-loop detector;
//! - [`shutdown`]: OS termination signals.

mod builder;
mod config;
mod deaths;
mod registry;
mod shutdown;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use config::SupervisorConfig;
pub use registry::UnitState;
pub use supervisor::{Supervisor, TerminateOutcome};
