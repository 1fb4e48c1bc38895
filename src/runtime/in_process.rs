//! # In-process execution runtime.
//!
//! [`InProcessRuntime`] runs every unit as a tokio task. One unit is:
//!
//! ```text
//! spawn(launch)
//!   ├─ Scope::new()                    readers, timers and the control loop live here
//!   ├─ Thread::new(launch, scope)      one Channel per roster peer
//!   ├─ signal Online
//!   ├─ scope.spawn(serve(control))
//!   └─ select! {
//!        kill.cancelled()           → code 1
//!        scope.exited()             → requested code (exit / terminate / handler panic)
//!        entry.run(thread)
//!          Ok   → setup done, keep serving until exited
//!          Err  → signal Error, code = err.exit_code()
//!          panic→ signal Error, code 1
//!      }
//!   ├─ thread.destroy(); scope.cancel()
//!   └─ signal Exit(code)
//! ```

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::channel::panic_message;
use crate::error::UnitError;
use crate::runtime::entry::EntryRef;
use crate::runtime::handle::{ControlRequest, ExecutionRuntime, UnitHandle, UnitLaunch, UnitSignal};
use crate::thread::{Scope, Thread, serve};

/// Runs units as tokio tasks, on the current runtime or on a given one.
#[derive(Clone, Debug, Default)]
pub struct InProcessRuntime {
    handle: Option<Handle>,
}

impl InProcessRuntime {
    /// Spawns onto the ambient tokio runtime.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns onto `handle` (e.g. a dedicated multi-thread runtime).
    pub fn on(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
        }
    }
}

impl ExecutionRuntime for InProcessRuntime {
    fn spawn(&self, launch: UnitLaunch) -> UnitHandle {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let kill = CancellationToken::new();

        let unit = run_unit(launch, control_rx, signal_tx, kill.clone());
        match &self.handle {
            Some(handle) => drop(handle.spawn(unit)),
            None => drop(tokio::spawn(unit)),
        }

        UnitHandle {
            control: control_tx,
            signals: signal_rx,
            kill,
        }
    }
}

async fn run_unit(
    launch: UnitLaunch,
    control: mpsc::UnboundedReceiver<ControlRequest>,
    signals: mpsc::UnboundedSender<UnitSignal>,
    kill: CancellationToken,
) {
    let (entry, init) = launch.into_parts();
    let scope = Scope::new();
    let thread = Thread::new(init, scope.clone());
    let unit = thread.addressee().clone();
    tracing::debug!(%unit, entry = entry.name(), deaths = thread.deaths(), "unit starting");

    let _ = signals.send(UnitSignal::Online);
    scope.spawn(serve(thread.clone(), control));

    let code = tokio::select! {
        _ = kill.cancelled() => 1,
        code = scope.exited() => code,
        code = drive(&entry, &thread, &signals) => code,
    };

    thread.destroy();
    scope.cancel();
    drop(thread);
    tracing::debug!(%unit, code, "unit ended");
    let _ = signals.send(UnitSignal::Exit(code));
}

async fn drive(entry: &EntryRef, thread: &Thread, signals: &mpsc::UnboundedSender<UnitSignal>) -> i32 {
    match AssertUnwindSafe(entry.run(thread.clone())).catch_unwind().await {
        Ok(Ok(())) => {
            thread.mark_online();
            thread.scope().exited().await
        }
        Ok(Err(err)) => {
            if !matches!(err, UnitError::Exit { .. }) {
                tracing::warn!(unit = %thread.addressee(), error = %err, label = err.as_label(), "entry failed");
                let _ = signals.send(UnitSignal::Error(err.to_string()));
            }
            err.exit_code()
        }
        Err(panic) => {
            let info = panic_message(&*panic);
            tracing::error!(unit = %thread.addressee(), %info, "entry panicked");
            let _ = signals.send(UnitSignal::Error(format!("panic: {info}")));
            1
        }
    }
}
