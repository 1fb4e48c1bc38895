//! # LogWriter: lifecycle events rendered through `tracing`.
//!
//! Boot and revival progress goes to `info`, crashes and timeouts to `warn`,
//! fatal lifecycle errors to `error`.
//!
//! ```text
//! INFO  unit spawned unit=worker#2 deaths=1
//! WARN  unit crashed unit=worker#2 code=1 deaths=1
//! INFO  unit revived unit=worker#2 attempt=1
//! ERROR exceeded deaths count unit=worker#3 deaths=4 reason=...
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event subscriber that logs through `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn unit(e: &Event) -> String {
    e.unit.as_ref().map(ToString::to_string).unwrap_or_default()
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::UnitSpawned => {
                tracing::info!(unit = %unit(e), deaths = ?e.deaths, "unit spawned")
            }
            EventKind::UnitOnline => tracing::debug!(unit = %unit(e), "unit online"),
            EventKind::UnitError => tracing::warn!(unit = %unit(e), reason, "unit error"),
            EventKind::SystemInit => tracing::info!("system running"),
            EventKind::ThreadExit => {
                tracing::warn!(unit = %unit(e), code = ?e.code, deaths = ?e.deaths, "unit crashed")
            }
            EventKind::ReviveStarted => tracing::info!(unit = %unit(e), "revival started"),
            EventKind::ReviveAttemptFailed => tracing::warn!(
                unit = %unit(e),
                attempt = ?e.attempt,
                delay_ms = ?e.delay_ms,
                reason,
                "revival attempt failed"
            ),
            EventKind::Revived => tracing::info!(unit = %unit(e), attempt = ?e.attempt, "unit revived"),
            EventKind::DeathBeforeInitialization
            | EventKind::FailedRevive
            | EventKind::ExceededDeathsCount
            | EventKind::StartFailed => {
                tracing::error!(unit = %unit(e), kind = ?e.kind, deaths = ?e.deaths, reason, "fatal lifecycle error")
            }
            EventKind::ShutdownRequested => tracing::info!("shutdown requested"),
            EventKind::UnitStopped => tracing::info!(unit = %unit(e), code = ?e.code, "unit stopped"),
            EventKind::TerminateTimedOut => {
                tracing::warn!(unit = %unit(e), grace_ms = ?e.delay_ms, "terminate timed out; unit killed")
            }
            EventKind::AllStopped => tracing::info!("all units stopped"),
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => tracing::warn!(
                subscriber = e.subscriber.as_deref().unwrap_or("unknown"),
                kind = ?e.kind,
                reason,
                "subscriber problem"
            ),
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
