#![allow(dead_code)]

use std::time::Duration;

use threadvisor::{Addressee, BackoffPolicy, Event, EventKind, SupervisorConfig};
use tokio::sync::broadcast::{self, error::RecvError};

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Short deadlines so failures surface quickly.
pub fn fast_cfg() -> SupervisorConfig {
    SupervisorConfig {
        start_timeout: ms(500),
        control_timeout: ms(300),
        grace: ms(300),
        revive_backoff: BackoffPolicy::constant(ms(20)),
        ..SupervisorConfig::default()
    }
}

/// Waits for the next `kind` event about `unit`.
pub async fn wait_event(rx: &mut broadcast::Receiver<Event>, kind: EventKind, unit: &Addressee) -> Event {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match rx.recv().await {
                Ok(ev) if ev.kind == kind && ev.unit.as_ref() == Some(unit) => return ev,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("bus closed while waiting for {kind:?}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {kind:?} event for {unit}"))
}
