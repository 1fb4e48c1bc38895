//! # threadvisor
//!
//! **Threadvisor** is an in-process actor runtime with supervision and
//! reliable messaging between units.
//!
//! A topology declares named groups of units. Every pair of linked units
//! shares a duplex [`Port`]; on each side a [`Channel`] runs a handshake,
//! confirms and retries sends, and correlates posts with their answers.
//! The [`Supervisor`] boots the topology, revives crashed units with fresh
//! ports and stops the whole system on fatal lifecycle errors.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  GroupSpec   │   │  GroupSpec   │   │  GroupSpec   │
//!     │  "ping" x2   │   │  "pong" x1   │   │   "db" x1    │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                       │
//! │  - Topology (symmetrized links, main#1 linked to everyone)        │
//! │  - Registry (state, generation and deaths per unit)               │
//! │  - DeathWindow (crash-loop detector)                              │
//! │  - Bus + SubscriberSet (lifecycle events)                         │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        │ ExecutionRuntime::spawn(UnitLaunch)  │
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │    Thread    │◄─►│    Thread    │◄─►│    Thread    │
//!     │   ping#1     │   │   pong#1     │   │    db#1      │
//!     │ pools/chans  │   │ pools/chans  │   │ pools/chans  │
//!     └──────────────┘   └──────────────┘   └──────────────┘
//!            ▲ Port (one per link, duplex, FIFO)
//!            └── Channel: Init handshake, send/confirm/retry, post/answer
//! ```
//!
//! ### Lifecycle
//! ```text
//! start()
//!   ├─► spawn every unit with its port bundle
//!   ├─► Probe every unit        (entry returned or called ready())
//!   ├─► Init every unit         (handshake on every channel)
//!   └─► Running ─► publish SystemInit
//!
//! unit exit (code)
//!   ├─ before Running            ─► DeathBeforeInitialization (fatal)
//!   ├─ code == 0 or terminate    ─► Stopped
//!   └─ otherwise                 ─► ThreadExit
//!        ├─ window threshold hit ─► ExceededDeathsCount (fatal)
//!        └─ revive: ChannelUpdate to peers, spawn, Probe, Init
//!             └─ attempts exhausted ─► FailedRevive (fatal)
//! ```
//!
//! ## Features
//! | Area              | Description                                                 | Key types / traits                          |
//! |-------------------|-------------------------------------------------------------|---------------------------------------------|
//! | **Topology**      | Groups, instance counts, symmetric peer links.              | [`GroupSpec`], [`Topology`], [`Addressee`]  |
//! | **Messaging**     | Reliable channels and pool-level routing.                   | [`Channel`], [`Pool`], [`Interceptor`]      |
//! | **Units**         | Entry points and the per-unit context.                      | [`Entry`], [`EntryFn`], [`Thread`]          |
//! | **Supervision**   | Boot, revival, crash-loop detection, terminate.             | [`Supervisor`], [`SupervisorConfig`]        |
//! | **Subscriber API**| Hook into lifecycle events.                                 | [`Subscribe`], [`Event`]                    |
//! | **Errors**        | Typed errors for channels, units and the runtime.           | [`ChannelError`], [`RuntimeError`]          |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust,no_run
//! use std::time::Duration;
//! use serde_json::json;
//! use threadvisor::{EntryFn, GroupSpec, PostOptions, Supervisor, SupervisorConfig, Thread, UnitError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pong = EntryFn::arc("pong", |thread: Thread| async move {
//!         thread.on("ping", |d| {
//!             d.answer(json!("pong"));
//!         });
//!         Ok::<_, UnitError>(())
//!     });
//!     let ping = EntryFn::arc("ping", |thread: Thread| async move {
//!         thread.ready().await;
//!         let answer = thread
//!             .pool("pong")?
//!             .request(1u32, "ping", json!(null), &PostOptions::timeout(Duration::from_millis(200)))?
//!             .await?;
//!         assert_eq!(answer, json!("pong"));
//!         Ok::<_, UnitError>(())
//!     });
//!
//!     let sup = Supervisor::builder(SupervisorConfig::default())
//!         .group(GroupSpec::new("pong", pong))
//!         .group(GroupSpec::new("ping", ping).instances(2).peer("pong"))
//!         .build()?;
//!
//!     // Boots the topology and blocks until SIGINT/SIGTERM or a fatal error.
//!     sup.run().await?;
//!     Ok(())
//! }
//! ```
mod channel;
mod core;
mod error;
mod events;
mod policies;
mod pool;
mod port;
mod runtime;
mod subscribers;
mod thread;
mod topology;

// ---- Public re-exports ----

pub use channel::{
    Channel, ChannelConfig, ChannelStats, ChannelStatus, Delivery, Envelope, EnvelopeId, Handler,
    Payload, PostOptions, Reply, Responder, SendOptions, SendStatus,
};
pub use core::{Supervisor, SupervisorBuilder, SupervisorConfig, TerminateOutcome, UnitState};
pub use error::{ChannelError, ConfigError, RuntimeError, TopologyError, UnitError};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use pool::{Interceptor, Pool, PostBatch, PostReport, SendReport, Target};
pub use port::{Port, PortBundle, PortEnd};
pub use runtime::{
    BoxEntryFuture, Control, ControlRequest, ControlResult, ControlTx, Entry, EntryFn, EntryRef,
    ExecutionRuntime, InProcessRuntime, UnitHandle, UnitLaunch, UnitSignal,
};
pub use subscribers::{Subscribe, SubscriberSet};
pub use thread::{TerminateRequest, Thread};
pub use topology::{Addressee, GroupSpec, Group, MAIN_POOL, Topology};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
