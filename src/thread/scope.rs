//! # Unit lifetime scope.
//!
//! A [`Scope`] ties background work (channel readers, retry/timeout timers,
//! the control loop) to one unit's lifetime and carries the unit's exit
//! request. Cancelling the scope stops every task spawned through it.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub(crate) struct Scope {
    token: CancellationToken,
    exit: Arc<watch::Sender<Option<i32>>>,
}

impl Scope {
    pub(crate) fn new() -> Self {
        let (exit, _rx) = watch::channel(None);
        Self {
            token: CancellationToken::new(),
            exit: Arc::new(exit),
        }
    }

    /// Spawns `fut`, stopping it when the scope is cancelled.
    pub(crate) fn spawn<F>(&self, fut: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = fut => {}
            }
        })
        .abort_handle()
    }

    /// Requests the unit to exit with `code`. Only the first request counts.
    pub(crate) fn exit(&self, code: i32) -> bool {
        self.exit.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(code);
                true
            } else {
                false
            }
        })
    }

    /// Resolves with the first requested exit code.
    pub(crate) async fn exited(&self) -> i32 {
        let mut rx = self.exit.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(code) => (*code).unwrap_or(1),
            Err(_) => 1,
        }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }
}
