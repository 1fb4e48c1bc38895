//! # Unit entry points.
//!
//! An [`Entry`] is what a unit runs: it receives the unit's [`Thread`],
//! registers handlers, optionally waits for [`Thread::ready`], and returns.
//! Returning `Ok(())` ends the setup phase only; the unit keeps serving its
//! channels until it exits.
//!
//! The supervisor's liveness probe is answered once the entry returns or
//! calls [`Thread::ready`]. An entry that blocks before either of them
//! fails the start with `StartTimeout`.
//!
//! [`EntryFn`] wraps a closure `Fn(Thread) -> Fut`, producing a fresh future
//! per incarnation, so a revived unit starts from a clean slate.
//!
//! ## Example
//! ```rust
//! use threadvisor::{EntryFn, EntryRef, Thread, UnitError};
//!
//! let entry: EntryRef = EntryFn::arc("echo", |thread: Thread| async move {
//!     thread.on("echo", |d| {
//!         let payload = d.payload.clone();
//!         d.answer(payload);
//!     });
//!     Ok::<_, UnitError>(())
//! });
//! assert_eq!(entry.name(), "echo");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::UnitError;
use crate::thread::Thread;

/// Boxed future returned by [`Entry::run`].
pub type BoxEntryFuture = Pin<Box<dyn Future<Output = Result<(), UnitError>> + Send + 'static>>;

/// Shared handle to an entry point.
pub type EntryRef = Arc<dyn Entry>;

/// Code run by every instance of a group.
pub trait Entry: Send + Sync + 'static {
    /// Stable, human-readable name (used in logs).
    fn name(&self) -> &str;

    /// Creates the future for one incarnation of the unit.
    fn run(&self, thread: Thread) -> BoxEntryFuture;
}

/// Function-backed entry point.
pub struct EntryFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> std::fmt::Debug for EntryFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryFn").field("name", &self.name).finish()
    }
}

impl<F, Fut> EntryFn<F>
where
    F: Fn(Thread) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), UnitError>> + Send + 'static,
{
    /// Wraps `f` as an entry point.
    ///
    /// Prefer [`EntryFn::arc`] when an [`EntryRef`] is needed right away.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self { name: name.into(), f }
    }

    /// Wraps `f` and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F, Fut> Entry for EntryFn<F>
where
    F: Fn(Thread) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), UnitError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, thread: Thread) -> BoxEntryFuture {
        Box::pin((self.f)(thread))
    }
}
