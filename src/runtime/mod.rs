//! Execution runtime seam and the default in-process runtime.
//!
//! ## Contents
//! - [`Entry`], [`EntryFn`], [`EntryRef`] code run by a unit
//! - [`ExecutionRuntime`], [`UnitLaunch`], [`UnitHandle`], [`UnitSignal`] how units are created and observed
//! - [`Control`], [`ControlRequest`] out-of-band supervisor → unit requests
//! - [`InProcessRuntime`] units as tokio tasks

mod entry;
mod handle;
mod in_process;

pub use entry::{BoxEntryFuture, Entry, EntryFn, EntryRef};
pub use handle::{
    Control, ControlRequest, ControlResult, ControlTx, ExecutionRuntime, UnitHandle, UnitLaunch, UnitSignal,
};
pub use in_process::InProcessRuntime;
