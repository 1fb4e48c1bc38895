//! # Execution runtime seam.
//!
//! The supervisor never creates units itself: it hands a [`UnitLaunch`] to an
//! [`ExecutionRuntime`] and talks to the result through a [`UnitHandle`].
//!
//! ```text
//! Supervisor ──spawn(UnitLaunch)──► ExecutionRuntime ──► unit
//!     │                                                   │
//!     ├── control: ControlRequest ───────────────────────►│  probe / init / channel update / terminate
//!     │◄────────────────────────────── signals: UnitSignal┤  online / error / exit(code)
//!     └── kill: CancellationToken ───────────────────────►│  hard stop
//! ```
//!
//! A runtime must deliver exactly one [`UnitSignal::Exit`] per unit, after
//! which the signal queue closes. A queue closing without `Exit` is treated
//! as a crash with code 1.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::channel::{ChannelConfig, Payload};
use crate::error::ChannelError;
use crate::port::{PortBundle, PortEnd};
use crate::runtime::entry::EntryRef;
use crate::thread::ThreadInit;
use crate::topology::Addressee;

/// Result carried back by a control request.
pub type ControlResult = Result<Option<Payload>, ChannelError>;

/// One-shot reply slot of a control request.
pub type ControlTx = oneshot::Sender<ControlResult>;

/// Out-of-band request from the supervisor to a unit.
pub enum Control {
    /// Liveness probe; answered once the entry finished setup.
    Probe,
    /// Go-ahead: run Init handshakes with every reachable peer.
    Init,
    /// Replace the Port of the channel to `peer`.
    ChannelUpdate {
        /// Peer whose channel is re-wired.
        peer: Addressee,
        /// Fresh Port end.
        port: PortEnd,
    },
    /// Graceful shutdown request.
    Terminate,
}

impl Control {
    /// Short name used in logs and `ControlTimeout` errors.
    pub fn name(&self) -> &'static str {
        match self {
            Control::Probe => "probe",
            Control::Init => "init",
            Control::ChannelUpdate { .. } => "channel_update",
            Control::Terminate => "terminate",
        }
    }
}

/// A control request together with its reply slot.
pub struct ControlRequest {
    /// What is requested.
    pub kind: Control,
    /// Where the unit answers.
    pub reply: ControlTx,
}

/// Lifecycle signal from a unit to the supervisor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnitSignal {
    /// The unit was created and is running its entry.
    Online,
    /// The entry failed or panicked; an `Exit` follows.
    Error(String),
    /// The unit ended with this code.
    Exit(i32),
}

/// Everything needed to start one incarnation of a unit.
pub struct UnitLaunch {
    /// Unit identity.
    pub addressee: Addressee,
    /// Code to run.
    pub entry: EntryRef,
    /// Every peer the unit gets a channel to (`main#1` included).
    pub roster: Vec<Addressee>,
    /// Port ends for the peers that are currently reachable.
    pub bundle: PortBundle,
    /// Group payload.
    pub data: Value,
    /// Channel settings.
    pub channel: ChannelConfig,
    /// Deaths accumulated before this incarnation.
    pub deaths: u32,
    /// Exit code used after a graceful terminate.
    pub terminate_code: i32,
}

impl UnitLaunch {
    pub(crate) fn into_parts(self) -> (EntryRef, ThreadInit) {
        let init = ThreadInit {
            addressee: self.addressee,
            data: self.data,
            deaths: self.deaths,
            roster: self.roster,
            bundle: self.bundle,
            channel: self.channel,
            terminate_code: self.terminate_code,
        };
        (self.entry, init)
    }
}

/// Supervisor-side handle to a running unit.
pub struct UnitHandle {
    /// Control queue into the unit.
    pub control: mpsc::UnboundedSender<ControlRequest>,
    /// Lifecycle signals out of the unit.
    pub signals: mpsc::UnboundedReceiver<UnitSignal>,
    /// Cancelling it stops the unit with exit code 1.
    pub kill: CancellationToken,
}

/// Creates units.
pub trait ExecutionRuntime: Send + Sync + 'static {
    /// Starts one unit. Must not block.
    fn spawn(&self, launch: UnitLaunch) -> UnitHandle;
}
