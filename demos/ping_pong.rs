//! # Example: ping_pong
//!
//! Two `ping` units query one `pong` unit every 500ms. Lifecycle events are
//! printed by the built-in [`LogWriter`].
//!
//! ## Flow
//! ```text
//! Supervisor::run()
//!   ├─► spawn pong#1, ping#1, ping#2   (UnitSpawned)
//!   ├─► Probe + Init every unit        (SystemInit)
//!   └─► ping#n ── post("ping") ──► pong#1 ── answer ──► ping#n
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example ping_pong --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use threadvisor::{
    EntryFn, GroupSpec, LogWriter, PostOptions, Subscribe, Supervisor, SupervisorConfig, Thread,
    UnitError,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .init();

    let pong = EntryFn::arc("pong", |thread: Thread| async move {
        thread.on("ping", |d| {
            let round = d.payload["round"].as_u64().unwrap_or(0);
            d.answer(json!({ "pong": round, "by": "pong#1" }));
        });
        Ok::<_, UnitError>(())
    });

    let ping = EntryFn::arc("ping", |thread: Thread| async move {
        thread.ready().await;
        let stop = thread.cancellation();
        tokio::spawn(async move {
            let mut round = 0u64;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_millis(500)) => {}
                }
                round += 1;
                let reply = match thread.pool("pong") {
                    Ok(pool) => pool.request(1u32, "ping", json!({ "round": round }), &PostOptions::default()),
                    Err(err) => {
                        tracing::error!(error = %err, "no pong pool");
                        return;
                    }
                };
                match reply {
                    Ok(reply) => match reply.await {
                        Ok(answer) => tracing::info!(unit = %thread.addressee(), %answer, "pong received"),
                        Err(err) => tracing::warn!(unit = %thread.addressee(), error = %err, "ping failed"),
                    },
                    Err(err) => tracing::warn!(error = %err, "no pong instance"),
                }
            }
        });
        Ok::<_, UnitError>(())
    });

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let sup = Supervisor::builder(SupervisorConfig::default())
        .with_subscribers(subs)
        .group(GroupSpec::new("pong", pong))
        .group(GroupSpec::new("ping", ping).instances(2).peer("pong"))
        .build()?;

    println!("press Ctrl+C to stop");
    sup.run().await?;
    Ok(())
}
