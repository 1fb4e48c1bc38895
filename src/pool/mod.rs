//! Recipient selection and fan-out.
//!
//! ## Contents
//! - [`Pool`], [`Target`] one group's instances and a selector inside it
//! - [`Interceptor`] selector composed across pools (`and`/`not`/`only`/`any`)
//! - [`SendReport`], [`PostReport`], [`PostBatch`] aggregated outcomes

mod interceptor;
#[allow(clippy::module_inception)]
mod pool;
mod report;

pub use interceptor::Interceptor;
pub use pool::{Pool, Target};
pub use report::{PostBatch, PostReport, SendReport};

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::channel::{Channel, ChannelConfig, Dispatcher, PostOptions, SendOptions, SendStatus};
    use crate::error::ChannelError;
    use crate::port::Port;
    use crate::thread::Scope;
    use crate::topology::Addressee;

    /// Pools "a" (3 instances) and "b" (2 instances) seen from `main#1`.
    /// Only `a#1` is wired to a live peer channel that answers every post.
    fn fixture() -> Arc<BTreeMap<String, Pool>> {
        let scope = Scope::new();
        let dispatcher = Arc::new(Dispatcher::new(scope.clone()));
        let main = Addressee::main();
        let cfg = ChannelConfig::default();

        let mut pools = BTreeMap::new();
        for (name, count) in [("a", 3u32), ("b", 2u32)] {
            let channels = (1..=count)
                .map(|n| {
                    let peer = Addressee::new(name, n);
                    let ch = Channel::new(main.clone(), peer, cfg, Arc::clone(&dispatcher), scope.clone());
                    (n, ch)
                })
                .collect();
            pools.insert(name.to_string(), Pool::new(Arc::from(name), channels));
        }

        let remote_scope = Scope::new();
        let remote_dispatcher = Arc::new(Dispatcher::new(remote_scope.clone()));
        remote_dispatcher.on(
            "ping".into(),
            Arc::new(|d: crate::channel::Delivery| {
                d.answer(json!("pong"));
            }),
        );
        let remote = Channel::new(Addressee::new("a", 1), main, cfg, remote_dispatcher, remote_scope);
        let (local_end, remote_end) = Port::pair();
        if let Some(ch) = pools.get("a").and_then(|p| p.channel(1)) {
            ch.set_port(local_end);
        }
        remote.set_port(remote_end);
        // Keep the remote side alive for the duration of the test runtime.
        tokio::spawn(async move {
            remote.init().await.ok();
            std::future::pending::<()>().await;
        });
        Arc::new(pools)
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_pool_and_instance() {
        let pools = fixture();
        assert_eq!(
            Interceptor::new(Arc::clone(&pools), "ghost").err(),
            Some(ChannelError::ThreadPoolNotExists { pool: "ghost".into() })
        );
        let err = Interceptor::new(Arc::clone(&pools), "a")
            .unwrap()
            .only([1, 9])
            .err();
        assert_eq!(err, Some(ChannelError::ThreadNotExists { pool: "a".into(), number: 9 }));

        let pool = pools.get("b").unwrap();
        assert!(pool.send(7u32, "x", json!(1), &SendOptions::default()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_chain() {
        let pools = fixture();
        let sel = Interceptor::new(Arc::clone(&pools), "a")
            .unwrap()
            .not([2])
            .and("b")
            .unwrap()
            .only([2])
            .unwrap();
        assert_eq!(
            sel.recipients(),
            vec![Addressee::new("a", 1), Addressee::new("a", 3), Addressee::new("b", 2)]
        );

        let one = Interceptor::new(Arc::clone(&pools), "a").unwrap().and("b").unwrap().any();
        let recipients = one.recipients();
        assert_eq!(recipients.len(), 4);
        assert_eq!(recipients.iter().filter(|a| a.name() == "b").count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_report_per_recipient() {
        let pools = fixture();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let report = Interceptor::new(Arc::clone(&pools), "a")
            .unwrap()
            .send("x", json!(1), &SendOptions::default());
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.status_of(&Addressee::new("a", 1)), Some(SendStatus::Delivered));
        assert_eq!(report.queued(), 2);

        let unconfirmed = pools
            .get("b")
            .unwrap()
            .send(super::Target::All, "x", json!(1), &SendOptions::unconfirmed())
            .unwrap();
        assert_eq!(unconfirmed.dropped(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_aggregates_in_order() {
        let pools = fixture();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let report = pools
            .get("a")
            .unwrap()
            .post(Target::All, "ping", json!(null), &PostOptions::default())
            .unwrap()
            .await;
        assert_eq!(report.ok, 1);
        assert_eq!(report.errors, 2);
        assert_eq!(report.outcomes[0], (Addressee::new("a", 1), Ok(json!("pong"))));
        assert!(matches!(report.outcomes[1].1, Err(ChannelError::NotActive { .. })));
        assert_eq!(report.answers().collect::<Vec<_>>(), vec![&json!("pong")]);

        let answer = pools
            .get("a")
            .unwrap()
            .request(1u32, "ping", json!(null), &PostOptions::default())
            .unwrap()
            .await;
        assert_eq!(answer, Ok(json!("pong")));
    }
}
