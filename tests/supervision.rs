mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use threadvisor::{
    Addressee, ControlRequest, EntryFn, EventKind, ExecutionRuntime, GroupSpec, RuntimeError,
    BackoffPolicy, Supervisor, SupervisorConfig, Thread, UnitError, UnitHandle, UnitLaunch, UnitSignal,
    UnitState,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use common::{fast_cfg, ms, wait_event};

/// Crashes 50ms after becoming ready while `deaths() < limit`.
fn flaky(limit: u32) -> GroupSpec {
    let entry = EntryFn::arc("flaky", move |thread: Thread| async move {
        thread.ready().await;
        if thread.deaths() < limit {
            let t = thread.clone();
            tokio::spawn(async move {
                tokio::time::sleep(ms(50)).await;
                t.exit(1);
            });
        }
        Ok::<_, UnitError>(())
    });
    GroupSpec::new("flaky", entry)
}

fn steady(name: &'static str) -> GroupSpec {
    GroupSpec::new(name, EntryFn::arc(name, |_t: Thread| async move { Ok::<_, UnitError>(()) }))
}

#[tokio::test]
async fn test_crash_loop_trips_on_fourth_death() {
    let sup = Supervisor::builder(fast_cfg())
        .group(flaky(u32::MAX))
        .group(steady("calm").peer("flaky"))
        .build()
        .unwrap();
    sup.start().await.unwrap();

    let err = tokio::time::timeout(Duration::from_secs(2), sup.wait_fatal())
        .await
        .unwrap();
    match err {
        RuntimeError::ExceededDeathsCount { unit, deaths, total, .. } => {
            assert_eq!(unit, Addressee::new("flaky", 1));
            assert_eq!(deaths, 4);
            assert_eq!(total, 4);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sup.unit_state(&Addressee::new("flaky", 1)), Some(UnitState::Failed));
    sup.terminate_all(ms(300)).await;
}

#[tokio::test]
async fn test_three_deaths_are_revived() {
    let sup = Supervisor::builder(fast_cfg())
        .group(flaky(3))
        .build()
        .unwrap();
    let unit = Addressee::new("flaky", 1);
    let mut events = sup.events();
    sup.start().await.unwrap();

    for n in 1..=3u32 {
        let revived = wait_event(&mut events, EventKind::Revived, &unit).await;
        assert_eq!(revived.deaths, Some(n));
    }
    tokio::time::sleep(ms(300)).await;
    assert!(sup.fatal_error().is_none());
    assert_eq!(sup.unit_state(&unit), Some(UnitState::Ready));
    assert_eq!(sup.deaths(&unit), Some(3));
    sup.terminate_all(ms(300)).await;
}

/// Crashes `delay` after becoming ready, on its first incarnation only.
fn crash_once(name: &'static str, delay: u64) -> GroupSpec {
    let entry = EntryFn::arc(name, move |thread: Thread| async move {
        thread.ready().await;
        if thread.deaths() == 0 {
            let t = thread.clone();
            tokio::spawn(async move {
                tokio::time::sleep(ms(delay)).await;
                t.exit(1);
            });
        }
        Ok::<_, UnitError>(())
    });
    GroupSpec::new(name, entry)
}

#[tokio::test]
async fn test_distinct_units_crashing_once_trip_the_window() {
    let sup = Supervisor::builder(fast_cfg())
        .group(crash_once("crashy", 50).instances(4))
        .build()
        .unwrap();
    sup.start().await.unwrap();

    let err = tokio::time::timeout(Duration::from_secs(2), sup.wait_fatal())
        .await
        .unwrap();
    match err {
        RuntimeError::ExceededDeathsCount { unit, deaths, total, .. } => {
            assert_eq!(unit.name(), "crashy");
            assert_eq!(deaths, 1);
            assert_eq!(total, 4);
        }
        other => panic!("unexpected error: {other}"),
    }
    sup.terminate_all(ms(300)).await;
}

#[tokio::test]
async fn test_death_after_window_expiry_is_revived() {
    let cfg = SupervisorConfig {
        death_window: ms(400),
        ..fast_cfg()
    };
    let sup = Supervisor::builder(cfg)
        .group(crash_once("early", 50).instances(3))
        .group(crash_once("late", 700))
        .build()
        .unwrap();
    let late = Addressee::new("late", 1);
    let mut events = sup.events();
    sup.start().await.unwrap();

    let revived = wait_event(&mut events, EventKind::Revived, &late).await;
    assert_eq!(revived.deaths, Some(1));
    assert!(sup.fatal_error().is_none());
    for n in 1..=3u32 {
        assert_eq!(sup.deaths(&Addressee::new("early", n)), Some(1));
        assert_eq!(sup.unit_state(&Addressee::new("early", n)), Some(UnitState::Ready));
    }
    sup.terminate_all(ms(300)).await;
}

#[tokio::test]
async fn test_revival_gives_up_after_max_attempts() {
    // Later incarnations never come online.
    let entry = EntryFn::arc("h", |thread: Thread| async move {
        if thread.deaths() >= 1 {
            std::future::pending::<()>().await;
        }
        thread.ready().await;
        let t = thread.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ms(50)).await;
            t.exit(1);
        });
        Ok::<_, UnitError>(())
    });
    let cfg = SupervisorConfig {
        start_timeout: ms(100),
        max_revive_attempts: 2,
        ..fast_cfg()
    };
    let sup = Supervisor::builder(cfg)
        .group(GroupSpec::new("h", entry))
        .build()
        .unwrap();
    let unit = Addressee::new("h", 1);
    let mut events = sup.events();
    sup.start().await.unwrap();

    for attempt in 1..=2u32 {
        let failed = wait_event(&mut events, EventKind::ReviveAttemptFailed, &unit).await;
        assert_eq!(failed.attempt, Some(attempt));
        assert_eq!(failed.delay_ms, Some(20));
    }
    let err = tokio::time::timeout(Duration::from_secs(2), sup.wait_fatal())
        .await
        .unwrap();
    assert_eq!(
        err,
        RuntimeError::FailedRevive {
            unit: unit.clone(),
            attempts: 2,
        }
    );
    assert_eq!(sup.unit_state(&unit), Some(UnitState::Failed));
    sup.terminate_all(ms(300)).await;
}

#[tokio::test]
async fn test_shutdown_during_revival_backoff_launches_nothing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let late_online = Arc::new(AtomicBool::new(false));

    let (c, online) = (Arc::clone(&calls), Arc::clone(&late_online));
    let entry = EntryFn::arc("r", move |thread: Thread| {
        let call = c.fetch_add(1, Ordering::SeqCst);
        let online = Arc::clone(&online);
        async move {
            match call {
                0 => {
                    thread.ready().await;
                    let t = thread.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(ms(50)).await;
                        t.exit(1);
                    });
                }
                1 => std::future::pending::<()>().await,
                _ => online.store(true, Ordering::SeqCst),
            }
            Ok::<_, UnitError>(())
        }
    });
    let cfg = SupervisorConfig {
        start_timeout: ms(150),
        revive_backoff: BackoffPolicy::constant(ms(400)),
        ..fast_cfg()
    };
    let sup = Supervisor::builder(cfg)
        .group(GroupSpec::new("r", entry))
        .build()
        .unwrap();
    let unit = Addressee::new("r", 1);
    let mut events = sup.events();
    sup.start().await.unwrap();

    let failed = wait_event(&mut events, EventKind::ReviveAttemptFailed, &unit).await;
    assert_eq!(failed.attempt, Some(1));
    sup.terminate_all(ms(100)).await;

    // Past the backoff: the next attempt must not launch.
    tokio::time::sleep(ms(600)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!late_online.load(Ordering::SeqCst));
    assert_eq!(sup.unit_state(&unit), Some(UnitState::Stopped));
    assert!(sup.fatal_error().is_none());
}

#[tokio::test]
async fn test_death_before_initialization_is_fatal() {
    let bad = EntryFn::arc("bad", |_t: Thread| async move {
        Err::<(), _>(UnitError::fail("boom"))
    });
    let sup = Supervisor::builder(fast_cfg())
        .group(GroupSpec::new("bad", bad))
        .group(steady("good").peer("bad"))
        .build()
        .unwrap();

    let err = sup.start().await.unwrap_err();
    assert_eq!(
        err,
        RuntimeError::DeathBeforeInitialization {
            unit: Addressee::new("bad", 1),
            code: 1,
        }
    );
    assert_eq!(sup.fatal_error(), Some(err));
    assert_eq!(sup.unit_state(&Addressee::new("bad", 1)), Some(UnitState::Failed));
    assert!(!sup.is_running());
    assert_eq!(sup.start().await, Err(RuntimeError::AlreadyStarted));
}

#[tokio::test]
async fn test_entry_that_never_gets_ready_times_out() {
    let stuck = EntryFn::arc("stuck", |_t: Thread| async move {
        std::future::pending::<()>().await;
        Ok::<_, UnitError>(())
    });
    let cfg = SupervisorConfig {
        start_timeout: ms(200),
        ..fast_cfg()
    };
    let sup = Supervisor::builder(cfg)
        .group(GroupSpec::new("stuck", stuck))
        .build()
        .unwrap();

    let err = sup.start().await.unwrap_err();
    assert_eq!(
        err,
        RuntimeError::StartTimeout {
            unit: Addressee::new("stuck", 1),
            timeout: ms(200),
        }
    );
}

/// Runtime whose units never answer control requests.
#[derive(Default)]
struct Silent {
    held: Mutex<Vec<(mpsc::UnboundedReceiver<ControlRequest>, mpsc::UnboundedSender<UnitSignal>)>>,
}

impl ExecutionRuntime for Silent {
    fn spawn(&self, _launch: UnitLaunch) -> UnitHandle {
        let (control, control_rx) = mpsc::unbounded_channel();
        let (signal_tx, signals) = mpsc::unbounded_channel();
        self.held.lock().unwrap().push((control_rx, signal_tx));
        UnitHandle {
            control,
            signals,
            kill: CancellationToken::new(),
        }
    }
}

#[tokio::test]
async fn test_silent_runtime_fails_start() {
    let runtime = Arc::new(Silent::default());
    let cfg = SupervisorConfig {
        start_timeout: ms(150),
        ..fast_cfg()
    };
    let sup = Supervisor::builder(cfg)
        .group(steady("a").instances(2))
        .with_runtime(runtime.clone())
        .build()
        .unwrap();
    let mut events = sup.events();

    let err = sup.start().await.unwrap_err();
    assert!(matches!(err, RuntimeError::StartTimeout { timeout, .. } if timeout == ms(150)));
    assert_eq!(runtime.held.lock().unwrap().len(), 2);

    let failed = tokio::time::timeout(ms(500), async {
        loop {
            if let Ok(ev) = events.recv().await {
                if ev.kind == EventKind::StartFailed {
                    return ev;
                }
            }
        }
    })
    .await
    .unwrap();
    assert!(failed.reason.is_some());
}

#[tokio::test]
async fn test_terminate_all_collects_answers() {
    let polite = EntryFn::arc("polite", |thread: Thread| async move {
        let me = thread.addressee().to_string();
        thread.on_terminate(move |req| req.end(Some(json!({ "bye": me }))));
        Ok::<_, UnitError>(())
    });
    let stubborn = EntryFn::arc("stubborn", |thread: Thread| async move {
        // Holds the request without ever ending it.
        thread.on_terminate(|req| {
            tokio::spawn(async move {
                let _req = req;
                std::future::pending::<()>().await;
            });
        });
        Ok::<_, UnitError>(())
    });
    let sup = Supervisor::builder(fast_cfg())
        .group(GroupSpec::new("polite", polite))
        .group(steady("plain").peer("polite"))
        .group(GroupSpec::new("stubborn", stubborn))
        .build()
        .unwrap();
    let mut events = sup.events();
    sup.start().await.unwrap();

    let outcomes = sup.terminate_all(ms(200)).await;
    assert_eq!(outcomes.len(), 3);
    for outcome in &outcomes {
        match outcome.unit.name() {
            "polite" => assert_eq!(outcome.result, Ok(Some(json!({ "bye": "polite#1" })))),
            "plain" => assert_eq!(outcome.result, Ok(None)),
            "stubborn" => assert!(matches!(
                outcome.result,
                Err(RuntimeError::ControlTimeout { request: "terminate", .. })
            )),
            other => panic!("unexpected unit {other}"),
        }
    }

    for name in ["polite", "plain", "stubborn"] {
        assert_eq!(sup.unit_state(&Addressee::new(name, 1)), Some(UnitState::Stopped));
    }
    assert!(!sup.is_running());
    wait_event(&mut events, EventKind::TerminateTimedOut, &Addressee::new("stubborn", 1)).await;
}
