//! # Thread: a unit's view of the system.
//!
//! Every unit (and the supervisor itself, as `main#1`) owns one [`Thread`].
//! It holds one [`Channel`] per peer, grouped into [`Pool`]s by group name,
//! the unit's handler table, and its lifecycle flags.
//!
//! ## Lifecycle flags
//! ```text
//! online  entry finished its setup (or started waiting on `ready()`)
//!         → the liveness probe is answered only after this
//! ready   Init handshakes with all reachable peers succeeded
//! exit    first exit code requested (exit(), terminate, handler panic)
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use serde_json::json;
//! use threadvisor::{EntryFn, PostOptions, Thread, UnitError};
//!
//! let entry = EntryFn::arc("client", |thread: Thread| async move {
//!     thread.on("reset", |d| {
//!         tracing::info!(from = %d.from, "reset requested");
//!     });
//!     thread.ready().await;
//!     let answer = thread
//!         .to("server")?
//!         .request("ping", json!(null), &PostOptions::default())?
//!         .await?;
//!     tracing::info!(%answer, "server answered");
//!     Ok::<_, UnitError>(())
//! });
//! ```

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::channel::{Channel, ChannelConfig, Delivery, Dispatcher, panic_message};
use crate::error::ChannelError;
use crate::pool::{Interceptor, Pool};
use crate::port::{PortBundle, PortEnd};
use crate::runtime::ControlTx;
use crate::thread::control::TerminateRequest;
use crate::thread::scope::Scope;
use crate::topology::Addressee;

type TerminateHook = Arc<dyn Fn(TerminateRequest) + Send + Sync>;

/// Everything a [`Thread`] is built from.
pub(crate) struct ThreadInit {
    pub(crate) addressee: Addressee,
    pub(crate) data: Value,
    pub(crate) deaths: u32,
    pub(crate) roster: Vec<Addressee>,
    pub(crate) bundle: PortBundle,
    pub(crate) channel: ChannelConfig,
    pub(crate) terminate_code: i32,
}

struct ThreadInner {
    addressee: Addressee,
    data: Value,
    deaths: u32,
    pools: Arc<BTreeMap<String, Pool>>,
    dispatcher: Arc<Dispatcher>,
    scope: Scope,
    online: watch::Sender<bool>,
    ready: watch::Sender<bool>,
    terminate: Mutex<Option<TerminateHook>>,
    terminate_code: i32,
}

/// Unit-local endpoint: pools, handlers and lifecycle.
///
/// Cheap to clone; clones share the same unit.
#[derive(Clone)]
pub struct Thread {
    inner: Arc<ThreadInner>,
}

impl Thread {
    pub(crate) fn new(init: ThreadInit, scope: Scope) -> Self {
        let ThreadInit {
            addressee,
            data,
            deaths,
            roster,
            mut bundle,
            channel,
            terminate_code,
        } = init;
        let dispatcher = Arc::new(Dispatcher::new(scope.clone()));

        let mut groups: BTreeMap<String, BTreeMap<u32, Channel>> = BTreeMap::new();
        for peer in roster {
            let ch = Channel::new(
                addressee.clone(),
                peer.clone(),
                channel,
                Arc::clone(&dispatcher),
                scope.clone(),
            );
            if let Some(end) = bundle.remove(&peer) {
                ch.set_port(end);
            }
            groups
                .entry(peer.name().to_string())
                .or_default()
                .insert(peer.number(), ch);
        }
        for peer in bundle.keys() {
            tracing::warn!(unit = %addressee, %peer, "dropping port for a peer outside the roster");
        }

        let pools = groups
            .into_iter()
            .map(|(name, channels)| {
                let pool = Pool::new(Arc::from(name.as_str()), channels);
                (name, pool)
            })
            .collect();

        let (online, _) = watch::channel(false);
        let (ready, _) = watch::channel(false);
        Self {
            inner: Arc::new(ThreadInner {
                addressee,
                data,
                deaths,
                pools: Arc::new(pools),
                dispatcher,
                scope,
                online,
                ready,
                terminate: Mutex::new(None),
                terminate_code,
            }),
        }
    }

    /// This unit's identity.
    pub fn addressee(&self) -> &Addressee {
        &self.inner.addressee
    }

    /// Group name.
    pub fn name(&self) -> &str {
        self.inner.addressee.name()
    }

    /// Instance number.
    pub fn number(&self) -> u32 {
        self.inner.addressee.number()
    }

    /// Payload declared for the unit's group.
    pub fn data(&self) -> &Value {
        &self.inner.data
    }

    /// How many times this unit died before the current incarnation.
    pub fn deaths(&self) -> u32 {
        self.inner.deaths
    }

    /// Selector over `pool`, all instances selected.
    pub fn to(&self, pool: &str) -> Result<Interceptor, ChannelError> {
        Interceptor::new(Arc::clone(&self.inner.pools), pool)
    }

    /// One pool by name.
    pub fn pool(&self, name: &str) -> Result<Pool, ChannelError> {
        self.inner
            .pools
            .get(name)
            .cloned()
            .ok_or_else(|| ChannelError::ThreadPoolNotExists {
                pool: name.to_string(),
            })
    }

    /// All pools, by name.
    pub fn pools(&self) -> impl Iterator<Item = &Pool> {
        self.inner.pools.values()
    }

    /// Channel to one peer.
    pub fn channel(&self, peer: &Addressee) -> Option<Channel> {
        self.inner
            .pools
            .get(peer.name())
            .and_then(|pool| pool.channel(peer.number()))
            .cloned()
    }

    /// Registers the handler for `event`, replacing any previous one.
    ///
    /// Handlers run on the delivering channel's reader; long work should be
    /// spawned. A panicking handler crashes the unit.
    pub fn on<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(Delivery) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on(event.into(), Arc::new(handler));
    }

    /// Registers the graceful-termination hook.
    ///
    /// Without a hook, a terminate request ends the unit immediately.
    pub fn on_terminate<F>(&self, hook: F)
    where
        F: Fn(TerminateRequest) + Send + Sync + 'static,
    {
        *self.inner.terminate.lock() = Some(Arc::new(hook));
    }

    /// Waits until this unit's Init handshakes completed.
    ///
    /// Also marks the unit's setup as done, so handlers must be registered
    /// before calling it.
    pub async fn ready(&self) {
        self.mark_online();
        let mut rx = self.inner.ready.subscribe();
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// True once the Init handshakes completed.
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.borrow()
    }

    /// Ends the unit with `code`. Only the first call counts.
    pub fn exit(&self, code: i32) {
        if self.inner.scope.exit(code) {
            tracing::debug!(unit = %self.inner.addressee, code, "exit requested");
        }
    }

    /// Token cancelled when the unit ends; hand it to spawned work.
    pub fn cancellation(&self) -> CancellationToken {
        self.inner.scope.token().clone()
    }

    pub(crate) fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    pub(crate) fn mark_online(&self) {
        self.inner.online.send_replace(true);
    }

    pub(crate) async fn wait_online(&self) {
        let mut rx = self.inner.online.subscribe();
        let _ = rx.wait_for(|online| *online).await;
    }

    /// Runs Init on every channel with a live Port.
    ///
    /// Channels without a Port (peer down) are skipped; a timeout fails.
    pub(crate) async fn handshake(&self) -> Result<(), ChannelError> {
        let channels: Vec<Channel> = self
            .inner
            .pools
            .values()
            .flat_map(|pool| pool.channels().cloned())
            .collect();
        let results = join_all(channels.iter().map(Channel::init)).await;
        for result in results {
            match result {
                Ok(()) | Err(ChannelError::NotActive { .. }) | Err(ChannelError::Destroyed { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        self.inner.ready.send_replace(true);
        tracing::debug!(unit = %self.inner.addressee, "handshake complete");
        Ok(())
    }

    /// Moves the channel to `peer` onto a fresh Port.
    pub(crate) fn rewire(&self, peer: &Addressee, port: PortEnd) -> Result<(), ChannelError> {
        let channel = self.channel(peer).ok_or_else(|| ChannelError::ThreadNotExists {
            pool: peer.name().to_string(),
            number: peer.number(),
        })?;
        channel.set_port(port);
        Ok(())
    }

    pub(crate) fn terminate(&self, reply: ControlTx) {
        let hook = self.inner.terminate.lock().clone();
        let request = TerminateRequest::new(reply, self.inner.scope.clone(), self.inner.terminate_code);
        match hook {
            Some(hook) => {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| hook(request))) {
                    tracing::error!(unit = %self.inner.addressee, info = %panic_message(&*panic), "terminate hook panicked");
                    self.inner.scope.exit(1);
                }
            }
            None => request.end(None),
        }
    }

    /// Drops handlers and hooks and destroys every channel.
    pub(crate) fn destroy(&self) {
        self.inner.dispatcher.clear();
        self.inner.terminate.lock().take();
        for pool in self.inner.pools.values() {
            for channel in pool.channels() {
                channel.destroy();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelStatus, SendOptions};
    use crate::port::Port;
    use serde_json::json;

    fn unit(addressee: Addressee, roster: Vec<Addressee>, bundle: PortBundle) -> Thread {
        Thread::new(
            ThreadInit {
                addressee,
                data: json!({ "role": "test" }),
                deaths: 2,
                roster,
                bundle,
                channel: ChannelConfig::default(),
                terminate_code: 1984,
            },
            Scope::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_pools_grouped_by_name() {
        let roster = vec![
            Addressee::new("b", 1),
            Addressee::new("b", 2),
            Addressee::main(),
        ];
        let t = unit(Addressee::new("a", 1), roster, PortBundle::new());

        assert_eq!(t.pool("b").unwrap().numbers().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(t.pool("main").unwrap().len(), 1);
        assert!(matches!(t.pool("c"), Err(ChannelError::ThreadPoolNotExists { .. })));
        assert_eq!(t.deaths(), 2);
        assert_eq!(t.data()["role"], "test");
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_skips_portless_peers() {
        let (ea, eb) = Port::pair();
        let a = unit(
            Addressee::new("a", 1),
            vec![Addressee::new("b", 1), Addressee::new("b", 2)],
            PortBundle::from([(Addressee::new("b", 1), ea)]),
        );
        let b = unit(
            Addressee::new("b", 1),
            vec![Addressee::new("a", 1)],
            PortBundle::from([(Addressee::new("a", 1), eb)]),
        );

        a.handshake().await.unwrap();
        assert!(a.is_ready());
        let to_b1 = a.channel(&Addressee::new("b", 1)).unwrap();
        let to_b2 = a.channel(&Addressee::new("b", 2)).unwrap();
        assert_eq!(to_b1.status(), ChannelStatus::Active);
        assert_eq!(to_b2.status(), ChannelStatus::Inactive);
        assert!(b.channel(&Addressee::new("a", 1)).unwrap().is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_panic_requests_exit() {
        let (ea, eb) = Port::pair();
        let a = unit(
            Addressee::new("a", 1),
            vec![Addressee::new("b", 1)],
            PortBundle::from([(Addressee::new("b", 1), ea)]),
        );
        let b = unit(
            Addressee::new("b", 1),
            vec![Addressee::new("a", 1)],
            PortBundle::from([(Addressee::new("a", 1), eb)]),
        );
        b.on("boom", |_d| panic!("handler failure"));
        a.handshake().await.unwrap();

        a.to("b")
            .unwrap()
            .send("boom", json!(null), &SendOptions::default());
        assert_eq!(b.scope().exited().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_closes_peer_channels() {
        let (ea, eb) = Port::pair();
        let a = unit(
            Addressee::new("a", 1),
            vec![Addressee::new("b", 1)],
            PortBundle::from([(Addressee::new("b", 1), ea)]),
        );
        let b = unit(
            Addressee::new("b", 1),
            vec![Addressee::new("a", 1)],
            PortBundle::from([(Addressee::new("a", 1), eb)]),
        );
        a.handshake().await.unwrap();

        b.destroy();
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        assert!(!a.channel(&Addressee::new("b", 1)).unwrap().is_active());
    }
}
