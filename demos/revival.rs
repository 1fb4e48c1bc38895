//! # Example: revival
//!
//! A `worker` crashes on every third job. The supervisor revives it with
//! fresh ports, re-wires its peer, and the job sent while it was down is
//! delivered to the new incarnation.
//!
//! ## Flow
//! ```text
//! main#1 ── send("job") ──► worker#1
//!   worker#1 exits with code 1          ─► ThreadExit { deaths: 1 }
//!   ├─► ChannelUpdate to feeder#1, rewire main#1
//!   ├─► spawn worker#1 (deaths = 1)
//!   ├─► Probe + Init                    ─► Revived { attempt: 1 }
//!   └─► queued jobs flushed to the new incarnation
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example revival
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::json;
use threadvisor::{EntryFn, EventKind, GroupSpec, SendOptions, Supervisor, SupervisorConfig, Thread, UnitError};

static JOBS: AtomicU64 = AtomicU64::new(0);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let worker = EntryFn::arc("worker", |thread: Thread| async move {
        println!("[{}] up (deaths = {})", thread.addressee(), thread.deaths());
        let t = thread.clone();
        thread.on("job", move |d| {
            let n = JOBS.fetch_add(1, Ordering::Relaxed) + 1;
            println!("[{}] job {} from {}", t.addressee(), d.payload, d.from);
            if n % 3 == 0 {
                println!("[{}] simulated crash", t.addressee());
                t.exit(1);
            }
        });
        Ok::<_, UnitError>(())
    });
    let feeder = EntryFn::arc("feeder", |thread: Thread| async move {
        thread.ready().await;
        Ok::<_, UnitError>(())
    });

    let sup = Supervisor::builder(SupervisorConfig::default())
        .group(GroupSpec::new("worker", worker))
        .group(GroupSpec::new("feeder", feeder).peer("worker"))
        .build()?;

    let mut events = sup.events();
    tokio::spawn(async move {
        while let Ok(ev) = events.recv().await {
            match ev.kind {
                EventKind::ThreadExit | EventKind::Revived | EventKind::ReviveAttemptFailed => {
                    println!(
                        "[event] {:?} unit={:?} deaths={:?} attempt={:?}",
                        ev.kind,
                        ev.unit.map(|u| u.to_string()),
                        ev.deaths,
                        ev.attempt
                    );
                }
                _ => {}
            }
            if ev.kind == EventKind::AllStopped {
                break;
            }
        }
    });

    sup.start().await?;
    let workers = sup.pool("worker")?;
    for job in 1..=7 {
        let status = workers.send(1u32, "job", json!(job), &SendOptions::default())?;
        println!("[main] job {job}: {:?}", status.outcomes);
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    let outcomes = sup.terminate_all(Duration::from_secs(1)).await;
    println!("[main] stopped {} units", outcomes.len());
    Ok(())
}
