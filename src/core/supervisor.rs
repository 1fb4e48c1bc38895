//! # Supervisor: boots the topology, classifies crashes, revives and re-wires units.
//!
//! The [`Supervisor`] owns the validated [`Topology`], the execution runtime,
//! one worker record per unit, its own endpoint `main#1`,
//! and the event bus.
//!
//! ## Boot
//! ```text
//! start()
//!   ├─ one Port per topology link, one Port per unit to main#1
//!   ├─ runtime.spawn(unit, bundle)               for every unit   → UnitSpawned
//!   ├─ Control::Probe   (≤ start_timeout)        for every unit   → StartTimeout
//!   ├─ Control::Init    (≤ init + control)       for every unit   → Handshake
//!   └─ phase = Running                                            → SystemInit
//! ```
//!
//! ## Exit classification (unit monitor → on_exit)
//! ```text
//! stale generation                        → ignored
//! shutting down, or code == terminate     → Stopped          (UnitStopped)
//! phase Booting                           → Failed, fatal    (DeathBeforeInitialization)
//! otherwise                               → Dead, deaths += 1 (ThreadExit)
//!     death window tripped                → Failed, fatal    (ExceededDeathsCount)
//!     else                                → revival
//! ```
//!
//! ## Revival (serialized across units)
//! ```text
//! attempt n of max_revive_attempts:
//!   ├─ fresh Port per Ready peer → Control::ChannelUpdate to that peer
//!   ├─ fresh Port to main#1      → main.rewire()
//!   ├─ runtime.spawn(unit, bundle, deaths)
//!   ├─ Control::Probe, then Control::Init
//!   ok  → Ready (Revived), if still alive
//!   err → kill, ReviveAttemptFailed, sleep(revive_backoff.next(n))
//! exhausted → Failed, fatal (FailedRevive)
//! shutdown or fatal error at any step → kill, Stopped
//! ```
//!
//! Fatal errors are published on the bus and resolve [`Supervisor::wait_fatal`];
//! [`Supervisor::run`] then terminates every unit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{join_all, try_join_all};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::channel::{Delivery, Payload};
use crate::core::builder::SupervisorBuilder;
use crate::core::config::SupervisorConfig;
use crate::core::deaths::DeathWindow;
use crate::core::registry::{Registry, UnitState};
use crate::core::shutdown;
use crate::error::{ChannelError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::pool::{Interceptor, Pool};
use crate::port::{Port, PortBundle};
use crate::runtime::{Control, ControlRequest, ExecutionRuntime, UnitLaunch, UnitSignal};
use crate::subscribers::SubscriberSet;
use crate::thread::{Scope, Thread, ThreadInit};
use crate::topology::{Addressee, Topology};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Booting,
    Running,
    ShuttingDown,
}

enum ExitClass {
    Ignored,
    Stopped,
    BeforeRunning,
    Crash(u32),
}

/// Result of asking one unit to terminate.
#[derive(Debug)]
pub struct TerminateOutcome {
    /// The unit.
    pub unit: Addressee,
    /// The unit's answer, or why there was none (it was then killed).
    pub result: Result<Option<Payload>, RuntimeError>,
}

/// Owns the topology and drives boot, revival and shutdown.
pub struct Supervisor {
    cfg: SupervisorConfig,
    topology: Arc<Topology>,
    runtime: Arc<dyn ExecutionRuntime>,
    bus: Bus,
    main: Thread,
    registry: Registry,
    deaths: Mutex<DeathWindow>,
    revive_lock: tokio::sync::Mutex<()>,
    phase: watch::Sender<Phase>,
    fatal: watch::Sender<Option<RuntimeError>>,
    exits: watch::Sender<u64>,
    started: AtomicBool,
    me: Weak<Supervisor>,
}

impl Supervisor {
    /// Starts building a supervisor.
    pub fn builder(cfg: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: SupervisorConfig,
        topology: Arc<Topology>,
        runtime: Arc<dyn ExecutionRuntime>,
        bus: Bus,
        subs: Arc<SubscriberSet>,
    ) -> Arc<Self> {
        let main = Thread::new(
            ThreadInit {
                addressee: Addressee::main(),
                data: serde_json::Value::Null,
                deaths: 0,
                roster: topology.addressees(),
                bundle: PortBundle::new(),
                channel: cfg.channel,
                terminate_code: cfg.terminate_code,
            },
            Scope::new(),
        );
        let registry = Registry::default();
        for unit in topology.addressees() {
            let peers = topology.peers_of(&unit);
            registry.insert(unit, peers);
        }
        let deaths = DeathWindow::new(cfg.death_limit(), cfg.death_window);

        let sup = Arc::new_cyclic(|me| Self {
            cfg,
            topology,
            runtime,
            bus,
            main,
            registry,
            deaths: Mutex::new(deaths),
            revive_lock: tokio::sync::Mutex::new(()),
            phase: watch::channel(Phase::Booting).0,
            fatal: watch::channel(None).0,
            exits: watch::channel(0).0,
            started: AtomicBool::new(false),
            me: me.clone(),
        });
        if !subs.is_empty() {
            sup.subscriber_listener(subs);
        }
        sup
    }

    /// Forwards bus events to the subscriber set.
    fn subscriber_listener(&self, subs: Arc<SubscriberSet>) {
        let mut rx = self.bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => subs.emit(&ev),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "subscriber listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Configuration in use.
    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    /// Validated topology.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Receiver of lifecycle events published from now on.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// The supervisor's own endpoint (`main#1`).
    pub fn main(&self) -> &Thread {
        &self.main
    }

    /// Selector over `pool`, seen from `main#1`.
    pub fn to(&self, pool: &str) -> Result<Interceptor, ChannelError> {
        self.main.to(pool)
    }

    /// One pool, seen from `main#1`.
    pub fn pool(&self, name: &str) -> Result<Pool, ChannelError> {
        self.main.pool(name)
    }

    /// Registers a handler for events units send to `main`.
    pub fn on<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(Delivery) + Send + Sync + 'static,
    {
        self.main.on(event, handler);
    }

    /// Supervisor-side state of a unit.
    pub fn unit_state(&self, unit: &Addressee) -> Option<UnitState> {
        self.registry.state(unit)
    }

    /// Death count of a unit.
    pub fn deaths(&self, unit: &Addressee) -> Option<u32> {
        self.registry.with(unit, |rec| rec.deaths)
    }

    /// True between a successful start and shutdown.
    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }

    fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Boots every unit and waits until the whole topology is running.
    ///
    /// On failure, every spawned unit is killed and the error is returned
    /// (it also resolves [`wait_fatal`](Self::wait_fatal)).
    pub async fn start(&self) -> Result<(), RuntimeError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyStarted);
        }
        tracing::info!(units = self.topology.unit_count(), "starting topology");

        let booted = tokio::select! {
            res = self.boot() => res,
            err = self.wait_fatal() => Err(err),
        };
        let Err(err) = booted else {
            return Ok(());
        };

        // A failed control request usually means the unit died; let its exit be classified.
        let err = if err.is_fatal() {
            err
        } else {
            tokio::time::timeout(self.cfg.control_timeout, self.wait_fatal())
                .await
                .unwrap_or(err)
        };
        if !matches!(err, RuntimeError::DeathBeforeInitialization { .. }) {
            let mut ev = Event::new(EventKind::StartFailed).with_reason(err.as_message());
            if let Some(unit) = failed_unit(&err) {
                ev = ev.with_unit(unit.clone());
            }
            self.bus.publish(ev);
        }
        self.fail(err.clone());
        self.phase.send_replace(Phase::ShuttingDown);
        for unit in self.registry.alive() {
            self.registry.kill(&unit);
        }
        Err(err)
    }

    async fn boot(&self) -> Result<(), RuntimeError> {
        let units = self.topology.addressees();
        let mut bundles: HashMap<Addressee, PortBundle> =
            units.iter().map(|u| (u.clone(), PortBundle::new())).collect();

        for (a, b) in self.topology.links() {
            let (end_a, end_b) = Port::pair();
            bundles.entry(a.clone()).or_default().insert(b.clone(), end_a);
            bundles.entry(b).or_default().insert(a, end_b);
        }
        for unit in &units {
            let (ours, theirs) = Port::pair();
            bundles.entry(unit.clone()).or_default().insert(Addressee::main(), ours);
            self.main
                .rewire(unit, theirs)
                .map_err(|source| RuntimeError::Handshake {
                    unit: unit.clone(),
                    source,
                })?;
        }
        for unit in &units {
            let bundle = bundles.remove(unit).unwrap_or_default();
            self.launch(unit, bundle, 0);
        }

        let timeout = self.cfg.start_timeout;
        try_join_all(units.iter().map(|unit| async move {
            self.control(unit, Control::Probe, timeout)
                .await
                .map_err(|err| match err {
                    RuntimeError::ControlTimeout { .. } => RuntimeError::StartTimeout {
                        unit: unit.clone(),
                        timeout,
                    },
                    other => other,
                })
        }))
        .await?;
        tracing::debug!("all units online");

        let deadline = self.cfg.init_deadline();
        try_join_all(units.iter().map(|unit| self.control(unit, Control::Init, deadline))).await?;

        for unit in &units {
            self.registry.with(unit, |rec| {
                if rec.state == UnitState::Spawning {
                    rec.state = UnitState::Ready;
                }
            });
        }
        self.phase.send_replace(Phase::Running);
        self.bus.publish(Event::new(EventKind::SystemInit));
        tracing::info!("topology running");
        Ok(())
    }

    /// Starts, then waits for a fatal error or an OS shutdown signal, then
    /// terminates every unit within [`SupervisorConfig::grace`].
    pub async fn run(&self) -> Result<(), RuntimeError> {
        if let Err(err) = self.start().await {
            self.terminate_all(self.cfg.grace).await;
            return Err(err);
        }
        let outcome = tokio::select! {
            err = self.wait_fatal() => Err(err),
            sig = shutdown::wait_for_shutdown_signal() => match sig {
                Ok(signal) => {
                    tracing::info!(signal, "shutdown signal received");
                    Ok(())
                }
                Err(err) => {
                    tracing::warn!(error = %err, "signal registration failed; waiting for a fatal error");
                    Err(self.wait_fatal().await)
                }
            },
        };
        self.terminate_all(self.cfg.grace).await;
        outcome
    }

    /// Resolves with the first fatal lifecycle error.
    pub async fn wait_fatal(&self) -> RuntimeError {
        let mut rx = self.fatal.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(err) = current {
                return err;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }

    /// The fatal error, if one occurred.
    pub fn fatal_error(&self) -> Option<RuntimeError> {
        self.fatal.borrow().clone()
    }

    fn fail(&self, err: RuntimeError) {
        let first = self.fatal.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(err.clone());
                true
            } else {
                false
            }
        });
        if first {
            tracing::error!(error = %err, label = err.as_label(), "fatal lifecycle error");
        }
    }

    /// Asks every live unit to terminate and waits up to `delay` for answers.
    ///
    /// Units without an answer in time are killed. Afterwards the supervisor
    /// endpoint is destroyed.
    pub async fn terminate_all(&self, delay: Duration) -> Vec<TerminateOutcome> {
        self.phase.send_replace(Phase::ShuttingDown);
        self.bus.publish(Event::new(EventKind::ShutdownRequested));

        let deadline = Instant::now() + delay;
        let outcomes = join_all(self.registry.alive().into_iter().map(|unit| async move {
            let result = self.control(&unit, Control::Terminate, delay).await;
            if let Err(err) = &result {
                if matches!(err, RuntimeError::ControlTimeout { .. }) {
                    self.bus.publish(
                        Event::new(EventKind::TerminateTimedOut)
                            .with_unit(unit.clone())
                            .with_delay(delay),
                    );
                }
                self.registry.kill(&unit);
            }
            TerminateOutcome { unit, result }
        }))
        .await;

        // Answered units exit on their own; anything still alive past the deadline is killed.
        let mut exits = self.exits.subscribe();
        let drained = tokio::time::timeout_at(deadline.max(Instant::now() + self.cfg.control_timeout), async {
            while !self.registry.alive().is_empty() {
                if exits.changed().await.is_err() {
                    break;
                }
            }
        });
        if drained.await.is_err() {
            for unit in self.registry.alive() {
                tracing::warn!(%unit, "unit still alive after terminate; killing");
                self.registry.kill(&unit);
            }
        }

        self.main.destroy();
        self.bus.publish(Event::new(EventKind::AllStopped));
        tracing::info!("all units stopped");
        outcomes
    }

    fn launch(&self, unit: &Addressee, bundle: PortBundle, deaths: u32) {
        let Some(group) = self.topology.group(unit.name()) else {
            return;
        };
        let mut roster = self.topology.peers_of(unit);
        roster.push(Addressee::main());

        let handle = self.runtime.spawn(UnitLaunch {
            addressee: unit.clone(),
            entry: Arc::clone(group.entry()),
            roster,
            bundle,
            data: group.data().clone(),
            channel: self.cfg.channel,
            deaths,
            terminate_code: self.cfg.terminate_code,
        });
        let generation = self.registry.attach(unit, handle.control, handle.kill);
        self.bus.publish(
            Event::new(EventKind::UnitSpawned)
                .with_unit(unit.clone())
                .with_deaths(deaths),
        );
        self.monitor(unit.clone(), generation, handle.signals);
    }

    fn monitor(&self, unit: Addressee, generation: u64, mut signals: mpsc::UnboundedReceiver<UnitSignal>) {
        let me = self.me.clone();
        tokio::spawn(async move {
            let mut code = 1;
            while let Some(signal) = signals.recv().await {
                let Some(sup) = me.upgrade() else {
                    return;
                };
                match signal {
                    UnitSignal::Online => {
                        sup.bus.publish(Event::new(EventKind::UnitOnline).with_unit(unit.clone()));
                    }
                    UnitSignal::Error(reason) => {
                        sup.bus.publish(
                            Event::new(EventKind::UnitError)
                                .with_unit(unit.clone())
                                .with_reason(reason),
                        );
                    }
                    UnitSignal::Exit(exit) => {
                        code = exit;
                        break;
                    }
                }
            }
            if let Some(sup) = me.upgrade() {
                sup.on_exit(&unit, generation, code);
            }
        });
    }

    fn on_exit(&self, unit: &Addressee, generation: u64, code: i32) {
        let phase = self.phase();
        let terminate_code = self.cfg.terminate_code;
        let class = self
            .registry
            .with(unit, |rec| {
                if rec.generation != generation {
                    return ExitClass::Ignored;
                }
                rec.alive = false;
                rec.control = None;
                rec.kill = None;
                if phase == Phase::ShuttingDown || code == terminate_code {
                    if rec.state != UnitState::Failed {
                        rec.state = UnitState::Stopped;
                    }
                    return ExitClass::Stopped;
                }
                match rec.state {
                    UnitState::Reviving | UnitState::Stopped | UnitState::Failed | UnitState::Dead => {
                        ExitClass::Ignored
                    }
                    UnitState::Spawning | UnitState::Ready if phase == Phase::Booting => {
                        rec.state = UnitState::Failed;
                        ExitClass::BeforeRunning
                    }
                    UnitState::Spawning | UnitState::Ready => {
                        rec.state = UnitState::Dead;
                        rec.deaths += 1;
                        ExitClass::Crash(rec.deaths)
                    }
                }
            })
            .unwrap_or(ExitClass::Ignored);
        self.exits.send_modify(|n| *n += 1);

        match class {
            ExitClass::Ignored => {
                tracing::debug!(%unit, generation, code, "exit ignored");
            }
            ExitClass::Stopped => {
                self.bus
                    .publish(Event::new(EventKind::UnitStopped).with_unit(unit.clone()).with_code(code));
            }
            ExitClass::BeforeRunning => {
                self.bus.publish(
                    Event::new(EventKind::DeathBeforeInitialization)
                        .with_unit(unit.clone())
                        .with_code(code),
                );
                self.fail(RuntimeError::DeathBeforeInitialization {
                    unit: unit.clone(),
                    code,
                });
            }
            ExitClass::Crash(deaths) => {
                self.bus.publish(
                    Event::new(EventKind::ThreadExit)
                        .with_unit(unit.clone())
                        .with_code(code)
                        .with_deaths(deaths),
                );
                let tripped = self.deaths.lock().record(Instant::now());
                match tripped {
                    Some(total) => {
                        self.registry.set_state(unit, UnitState::Failed);
                        let err = RuntimeError::ExceededDeathsCount {
                            unit: unit.clone(),
                            deaths,
                            total,
                            window: self.cfg.death_window,
                        };
                        self.bus.publish(
                            Event::new(EventKind::ExceededDeathsCount)
                                .with_unit(unit.clone())
                                .with_deaths(total as u32)
                                .with_reason(err.as_message()),
                        );
                        self.fail(err);
                    }
                    None => self.spawn_revival(unit.clone()),
                }
            }
        }
    }

    fn spawn_revival(&self, unit: Addressee) {
        let me = self.me.clone();
        tokio::spawn(async move {
            if let Some(sup) = me.upgrade() {
                sup.revive(unit).await;
            }
        });
    }

    /// Revival proceeds only while the system is running and healthy.
    fn may_revive(&self) -> bool {
        self.phase() == Phase::Running && self.fatal_error().is_none()
    }

    /// Drops a revival interrupted by shutdown or a fatal error.
    fn abandon_revival(&self, unit: &Addressee) {
        self.registry.kill(unit);
        self.registry.with(unit, |rec| {
            if rec.state == UnitState::Reviving {
                rec.state = UnitState::Stopped;
            }
            rec.revive_attempt = 0;
        });
        tracing::debug!(%unit, "revival abandoned");
    }

    async fn revive(&self, unit: Addressee) {
        let _serial = self.revive_lock.lock().await;
        if !self.may_revive() {
            return;
        }
        if self.registry.state(&unit) != Some(UnitState::Dead) {
            return;
        }
        self.registry.set_state(&unit, UnitState::Reviving);
        let deaths = self.registry.with(&unit, |rec| rec.deaths).unwrap_or(0);
        self.bus.publish(
            Event::new(EventKind::ReviveStarted)
                .with_unit(unit.clone())
                .with_deaths(deaths),
        );

        let max = self.cfg.max_revive_attempts;
        for attempt in 1..=max {
            if !self.may_revive() {
                self.abandon_revival(&unit);
                return;
            }
            self.registry.with(&unit, |rec| rec.revive_attempt = attempt);
            let result = self.revive_once(&unit, deaths).await;
            if !self.may_revive() {
                self.abandon_revival(&unit);
                return;
            }
            match result.and_then(|()| self.promote(&unit)) {
                Ok(()) => {
                    self.bus.publish(
                        Event::new(EventKind::Revived)
                            .with_unit(unit.clone())
                            .with_attempt(attempt)
                            .with_deaths(deaths),
                    );
                    return;
                }
                Err(err) => {
                    self.registry.kill(&unit);
                    let delay = self.cfg.revive_backoff.next(attempt);
                    self.bus.publish(
                        Event::new(EventKind::ReviveAttemptFailed)
                            .with_unit(unit.clone())
                            .with_attempt(attempt)
                            .with_delay(delay)
                            .with_reason(err.as_message()),
                    );
                    if attempt < max {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        if !self.may_revive() {
            self.abandon_revival(&unit);
            return;
        }
        self.registry.set_state(&unit, UnitState::Failed);
        let err = RuntimeError::FailedRevive {
            unit: unit.clone(),
            attempts: max,
        };
        self.bus.publish(
            Event::new(EventKind::FailedRevive)
                .with_unit(unit)
                .with_attempt(max)
                .with_reason(err.as_message()),
        );
        self.fail(err);
    }

    async fn revive_once(&self, unit: &Addressee, deaths: u32) -> Result<(), RuntimeError> {
        let unavailable = || RuntimeError::UnitUnavailable { unit: unit.clone() };
        let mut bundle = PortBundle::new();
        for peer in self.registry.ready_peers(unit) {
            let (ours, theirs) = Port::pair();
            let update = Control::ChannelUpdate {
                peer: unit.clone(),
                port: theirs,
            };
            match self.control(&peer, update, self.cfg.control_timeout).await {
                Ok(_) => {
                    bundle.insert(peer, ours);
                }
                Err(err) => {
                    tracing::warn!(%unit, %peer, error = %err, "channel update failed; peer re-wires on its own revival");
                }
            }
        }
        let (ours, theirs) = Port::pair();
        bundle.insert(Addressee::main(), ours);
        self.main
            .rewire(unit, theirs)
            .map_err(|source| RuntimeError::Handshake {
                unit: unit.clone(),
                source,
            })?;

        if !self.may_revive() {
            return Err(unavailable());
        }
        self.launch(unit, bundle, deaths);
        // A launch racing terminate_all's listing of live units is killed here.
        if !self.may_revive() {
            self.registry.kill(unit);
            return Err(unavailable());
        }
        self.control(unit, Control::Probe, self.cfg.start_timeout).await?;
        self.control(unit, Control::Init, self.cfg.init_deadline()).await?;
        Ok(())
    }

    /// Marks a revived unit Ready unless it already exited.
    fn promote(&self, unit: &Addressee) -> Result<(), RuntimeError> {
        let promoted = self
            .registry
            .with(unit, |rec| {
                if !rec.alive {
                    return false;
                }
                rec.state = UnitState::Ready;
                rec.revive_attempt = 0;
                true
            })
            .unwrap_or(false);
        if promoted {
            Ok(())
        } else {
            Err(RuntimeError::UnitUnavailable { unit: unit.clone() })
        }
    }

    async fn control(
        &self,
        unit: &Addressee,
        kind: Control,
        timeout: Duration,
    ) -> Result<Option<Payload>, RuntimeError> {
        let request = kind.name();
        let unavailable = || RuntimeError::UnitUnavailable { unit: unit.clone() };
        let tx = self.registry.control(unit).ok_or_else(unavailable)?;
        let (reply, rx) = oneshot::channel();
        tx.send(ControlRequest { kind, reply }).map_err(|_| unavailable())?;

        match tokio::time::timeout(timeout, rx).await {
            Err(_) => Err(RuntimeError::ControlTimeout {
                unit: unit.clone(),
                request,
                timeout,
            }),
            Ok(Err(_)) => Err(unavailable()),
            Ok(Ok(Err(source))) => Err(RuntimeError::Handshake {
                unit: unit.clone(),
                source,
            }),
            Ok(Ok(Ok(answer))) => Ok(answer),
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        for unit in self.registry.alive() {
            self.registry.kill(&unit);
        }
        self.main.destroy();
    }
}

fn failed_unit(err: &RuntimeError) -> Option<&Addressee> {
    match err {
        RuntimeError::StartTimeout { unit, .. }
        | RuntimeError::ControlTimeout { unit, .. }
        | RuntimeError::UnitUnavailable { unit }
        | RuntimeError::Handshake { unit, .. } => Some(unit),
        _ => None,
    }
}
