//! # Unit registry: one [`WorkerRecord`] per declared unit.
//!
//! Records are created for every unit before boot and live as long as the
//! supervisor. Each incarnation of a unit gets a new `generation`, so signals
//! from a superseded incarnation are recognized and ignored.
//!
//! ```text
//! Spawning ──probe+init ok──► Ready ──crash──► Dead ──► Reviving ──ok──► Ready
//!    │                          │                          │
//!    └─died before running──►  Failed ◄──attempts exhausted┘
//!                               │
//!         terminate / shutdown ─┴─► Stopped
//! ```

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::runtime::ControlRequest;
use crate::topology::Addressee;

/// Supervisor-side state of one unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnitState {
    /// Spawned, start sequence not finished.
    Spawning,
    /// Running and reachable.
    Ready,
    /// Crashed; revival pending.
    Dead,
    /// Revival in progress.
    Reviving,
    /// Stopped on request.
    Stopped,
    /// Permanently lost (death before running or revival exhausted).
    Failed,
}

/// Bookkeeping for one unit.
#[derive(Debug)]
pub(crate) struct WorkerRecord {
    /// Units holding a channel to this one (`main#1` is re-wired separately).
    pub(crate) peers: Vec<Addressee>,
    pub(crate) control: Option<mpsc::UnboundedSender<ControlRequest>>,
    pub(crate) kill: Option<CancellationToken>,
    pub(crate) generation: u64,
    pub(crate) alive: bool,
    pub(crate) deaths: u32,
    pub(crate) revive_attempt: u32,
    pub(crate) state: UnitState,
}

/// All worker records, behind one lock.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    records: Mutex<HashMap<Addressee, WorkerRecord>>,
}

impl Registry {
    pub(crate) fn insert(&self, unit: Addressee, peers: Vec<Addressee>) {
        self.records.lock().insert(
            unit,
            WorkerRecord {
                peers,
                control: None,
                kill: None,
                generation: 0,
                alive: false,
                deaths: 0,
                revive_attempt: 0,
                state: UnitState::Spawning,
            },
        );
    }

    /// Attaches a fresh incarnation; returns its generation.
    pub(crate) fn attach(
        &self,
        unit: &Addressee,
        control: mpsc::UnboundedSender<ControlRequest>,
        kill: CancellationToken,
    ) -> u64 {
        let mut records = self.records.lock();
        let Some(rec) = records.get_mut(unit) else {
            kill.cancel();
            return 0;
        };
        rec.generation += 1;
        rec.control = Some(control);
        rec.kill = Some(kill);
        rec.alive = true;
        rec.generation
    }

    /// Runs `f` on the record of `unit`.
    pub(crate) fn with<R>(&self, unit: &Addressee, f: impl FnOnce(&mut WorkerRecord) -> R) -> Option<R> {
        self.records.lock().get_mut(unit).map(f)
    }

    pub(crate) fn state(&self, unit: &Addressee) -> Option<UnitState> {
        self.with(unit, |rec| rec.state)
    }

    pub(crate) fn set_state(&self, unit: &Addressee, state: UnitState) {
        self.with(unit, |rec| rec.state = state);
    }

    pub(crate) fn control(&self, unit: &Addressee) -> Option<mpsc::UnboundedSender<ControlRequest>> {
        self.with(unit, |rec| rec.control.clone()).flatten()
    }

    /// Peers of `unit` that are currently `Ready` (the supervisor endpoint excluded).
    pub(crate) fn ready_peers(&self, unit: &Addressee) -> Vec<Addressee> {
        let records = self.records.lock();
        let Some(rec) = records.get(unit) else {
            return Vec::new();
        };
        rec.peers
            .iter()
            .filter(|peer| {
                records
                    .get(*peer)
                    .is_some_and(|p| p.state == UnitState::Ready && p.alive)
            })
            .cloned()
            .collect()
    }

    /// Kills the current incarnation of `unit`, if any.
    pub(crate) fn kill(&self, unit: &Addressee) {
        if let Some(Some(kill)) = self.with(unit, |rec| rec.kill.clone()) {
            kill.cancel();
        }
    }

    /// Units whose current incarnation is alive.
    pub(crate) fn alive(&self) -> Vec<Addressee> {
        let mut units: Vec<Addressee> = self
            .records
            .lock()
            .iter()
            .filter(|(_, rec)| rec.alive)
            .map(|(unit, _)| unit.clone())
            .collect();
        units.sort();
        units
    }
}
