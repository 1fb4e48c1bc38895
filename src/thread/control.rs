//! # Control loop: supervisor → unit requests.
//!
//! Every unit runs [`serve`] next to its entry. Requests arrive on the
//! control queue of the unit's [`UnitHandle`](crate::UnitHandle):
//!
//! ```text
//! Probe          answered once the entry finished setup
//! Init           answered once all Init handshakes finished
//! ChannelUpdate  swaps one channel onto a fresh Port
//! Terminate      handed to the terminate hook (or ends the unit)
//! ```

use tokio::sync::mpsc;

use crate::channel::Payload;
use crate::runtime::{Control, ControlRequest, ControlTx};
use crate::thread::scope::Scope;
use crate::thread::thread::Thread;

/// Graceful-termination request handed to the hook set with
/// [`Thread::on_terminate`].
///
/// Call [`end`](TerminateRequest::end) once cleanup is done; the unit then
/// exits with the supervisor's terminate code. A request dropped without
/// `end` is reported as an unavailable unit, and the unit is killed.
pub struct TerminateRequest {
    reply: Option<ControlTx>,
    scope: Scope,
    code: i32,
}

impl TerminateRequest {
    pub(crate) fn new(reply: ControlTx, scope: Scope, code: i32) -> Self {
        Self {
            reply: Some(reply),
            scope,
            code,
        }
    }

    /// Exit code the unit will end with.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Answers the supervisor with `answer` and ends the unit.
    pub fn end(mut self, answer: Option<Payload>) {
        if let Some(reply) = self.reply.take() {
            let _ = reply.send(Ok(answer));
        }
        self.scope.exit(self.code);
    }
}

/// Serves control requests until the queue closes or the unit's scope ends.
pub(crate) async fn serve(thread: Thread, mut control: mpsc::UnboundedReceiver<ControlRequest>) {
    while let Some(ControlRequest { kind, reply }) = control.recv().await {
        tracing::trace!(unit = %thread.addressee(), request = kind.name(), "control request");
        match kind {
            Control::Probe => {
                thread.wait_online().await;
                let _ = reply.send(Ok(None));
            }
            Control::Init => {
                let unit = thread.clone();
                thread.scope().spawn(async move {
                    let result = unit.handshake().await.map(|()| None);
                    let _ = reply.send(result);
                });
            }
            Control::ChannelUpdate { peer, port } => {
                let _ = reply.send(thread.rewire(&peer, port).map(|()| None));
            }
            Control::Terminate => thread.terminate(reply),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelConfig;
    use crate::port::{Port, PortBundle};
    use crate::thread::thread::ThreadInit;
    use crate::topology::Addressee;
    use serde_json::json;
    use tokio::sync::oneshot;

    fn unit(scope: Scope) -> Thread {
        Thread::new(
            ThreadInit {
                addressee: Addressee::new("a", 1),
                data: json!(null),
                deaths: 0,
                roster: vec![Addressee::main()],
                bundle: PortBundle::new(),
                channel: ChannelConfig::default(),
                terminate_code: 77,
            },
            scope,
        )
    }

    async fn ask(tx: &mpsc::UnboundedSender<ControlRequest>, kind: Control) -> oneshot::Receiver<crate::runtime::ControlResult> {
        let (reply, rx) = oneshot::channel();
        tx.send(ControlRequest { kind, reply }).unwrap();
        rx
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_waits_for_online() {
        let scope = Scope::new();
        let thread = unit(scope.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        scope.spawn(serve(thread.clone(), rx));

        let mut probe = ask(&tx, Control::Probe).await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(probe.try_recv().is_err());

        thread.mark_online();
        assert_eq!(probe.await.unwrap(), Ok(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_without_hook_exits() {
        let scope = Scope::new();
        let thread = unit(scope.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        scope.spawn(serve(thread.clone(), rx));

        let answer = ask(&tx, Control::Terminate).await.await.unwrap();
        assert_eq!(answer, Ok(None));
        assert_eq!(scope.exited().await, 77);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_hook_answers() {
        let scope = Scope::new();
        let thread = unit(scope.clone());
        thread.on_terminate(|req| req.end(Some(json!({ "flushed": 3 }))));
        let (tx, rx) = mpsc::unbounded_channel();
        scope.spawn(serve(thread.clone(), rx));

        let answer = ask(&tx, Control::Terminate).await.await.unwrap();
        assert_eq!(answer, Ok(Some(json!({ "flushed": 3 }))));
        assert_eq!(scope.exited().await, 77);
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_update_unknown_peer() {
        let scope = Scope::new();
        let thread = unit(scope.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        scope.spawn(serve(thread.clone(), rx));

        let (end, _other) = Port::pair();
        let answer = ask(
            &tx,
            Control::ChannelUpdate {
                peer: Addressee::new("ghost", 1),
                port: end,
            },
        )
        .await
        .await
        .unwrap();
        assert!(answer.is_err());
    }
}
