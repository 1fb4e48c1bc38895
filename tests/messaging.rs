mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Value, json};
use threadvisor::{
    Addressee, ChannelError, EntryFn, EventKind, GroupSpec, PostOptions, SendOptions, Supervisor,
    Thread, UnitError, UnitState,
};
use tokio::sync::mpsc;

use common::{fast_cfg, ms, wait_event};

#[tokio::test]
async fn test_ping_pong_across_groups() {
    let pong = EntryFn::arc("pong", |thread: Thread| async move {
        thread.on("ping", |d| {
            let n = d.payload["n"].as_u64().unwrap_or(0);
            d.answer(json!({ "n": n + 10 }));
        });
        Ok::<_, UnitError>(())
    });

    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let ping = EntryFn::arc("ping", move |thread: Thread| {
        let tx = tx.clone();
        async move {
            thread.ready().await;
            let answer = thread
                .pool("pong")?
                .request(1u32, "ping", json!({ "n": thread.number() }), &PostOptions::timeout(ms(200)))?
                .await?;
            let _ = tx.send(answer);
            Ok::<_, UnitError>(())
        }
    });

    let sup = Supervisor::builder(fast_cfg())
        .group(GroupSpec::new("pong", pong))
        .group(GroupSpec::new("ping", ping).instances(2).peer("pong"))
        .build()
        .unwrap();
    sup.start().await.unwrap();
    assert!(sup.is_running());

    let mut answers = Vec::new();
    for _ in 0..2 {
        let answer = tokio::time::timeout(ms(500), rx.recv()).await.unwrap().unwrap();
        answers.push(answer["n"].as_u64().unwrap());
    }
    answers.sort_unstable();
    assert_eq!(answers, vec![11, 12]);

    let outcomes = sup.terminate_all(ms(300)).await;
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| matches!(o.result, Ok(None))));
}

#[tokio::test]
async fn test_main_reaches_every_unit() {
    let echo = EntryFn::arc("echo", |thread: Thread| async move {
        let me = thread.addressee().to_string();
        thread.on("whoami", move |d| {
            d.answer(json!(me));
        });
        Ok::<_, UnitError>(())
    });
    let sup = Supervisor::builder(fast_cfg())
        .group(GroupSpec::new("echo", echo).instances(3))
        .build()
        .unwrap();
    sup.start().await.unwrap();

    let report = sup
        .pool("echo")
        .unwrap()
        .post(threadvisor::Target::All, "whoami", json!(null), &PostOptions::timeout(ms(200)))
        .unwrap()
        .await;
    assert!(report.is_ok());
    let names: Vec<&str> = report.answers().filter_map(Value::as_str).collect();
    assert_eq!(names, vec!["echo#1", "echo#2", "echo#3"]);

    let only_two = sup
        .to("echo")
        .unwrap()
        .not([1u32, 3])
        .post("whoami", json!(null), &PostOptions::timeout(ms(200)))
        .await;
    assert_eq!(only_two.answers().collect::<Vec<_>>(), vec![&json!("echo#2")]);

    assert!(matches!(
        sup.pool("missing").err(),
        Some(ChannelError::ThreadPoolNotExists { .. })
    ));
    sup.terminate_all(ms(300)).await;
}

async fn ask_b(thread: &Thread, payload: Value) -> Result<Value, ChannelError> {
    thread
        .pool("b")?
        .request(1u32, "echo", payload, &PostOptions::default())?
        .await
}

#[tokio::test]
async fn test_revival_rewires_peers_and_flushes_queued_sends() {
    let received = Arc::new(AtomicUsize::new(0));

    let a = EntryFn::arc("a", |thread: Thread| async move {
        let t = thread.clone();
        thread.on("ask_b", move |d| {
            let t = t.clone();
            tokio::spawn(async move {
                let answer = match ask_b(&t, d.payload.clone()).await {
                    Ok(v) => v,
                    Err(err) => json!(err.as_label()),
                };
                d.answer(answer);
            });
        });
        Ok::<_, UnitError>(())
    });

    let counter = Arc::clone(&received);
    let b = EntryFn::arc("b", move |thread: Thread| {
        let counter = Arc::clone(&counter);
        async move {
            let t = thread.clone();
            thread.on("crash", move |_d| t.exit(1));
            thread.on("x", move |_d| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            thread.on("echo", |d| {
                let payload = d.payload.clone();
                d.answer(payload);
            });
            Ok::<_, UnitError>(())
        }
    });

    let sup = Supervisor::builder(fast_cfg())
        .group(GroupSpec::new("a", a).peer("b"))
        .group(GroupSpec::new("b", b))
        .build()
        .unwrap();
    let b1 = Addressee::new("b", 1);
    let mut events = sup.events();
    sup.start().await.unwrap();

    sup.pool("b")
        .unwrap()
        .send(1u32, "crash", json!(null), &SendOptions::unconfirmed())
        .unwrap();
    let exit = wait_event(&mut events, EventKind::ThreadExit, &b1).await;
    assert_eq!(exit.code, Some(1));
    assert_eq!(exit.deaths, Some(1));

    // Sent while b#1 is down: held back and delivered to the next incarnation.
    sup.pool("b")
        .unwrap()
        .send(1u32, "x", json!(1), &SendOptions::default())
        .unwrap();

    let revived = wait_event(&mut events, EventKind::Revived, &b1).await;
    assert_eq!(revived.attempt, Some(1));
    assert_eq!(sup.unit_state(&b1), Some(UnitState::Ready));
    assert_eq!(sup.deaths(&b1), Some(1));

    tokio::time::timeout(ms(1000), async {
        while received.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(ms(10)).await;
        }
    })
    .await
    .unwrap();
    // Past several retry periods: still exactly one delivery.
    tokio::time::sleep(ms(600)).await;
    assert_eq!(received.load(Ordering::SeqCst), 1);

    let answer = sup
        .pool("a")
        .unwrap()
        .request(1u32, "ask_b", json!("hi"), &PostOptions::timeout(ms(500)))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(answer, json!("hi"));
    assert!(sup.fatal_error().is_none());

    sup.terminate_all(ms(300)).await;
}
