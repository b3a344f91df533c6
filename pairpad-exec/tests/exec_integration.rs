//! End-to-end runs against real processes.
//!
//! `sh` stands in for the Python interpreter so the suite only needs a
//! POSIX shell; the code sent as "python" is a shell script.

use std::time::{Duration, Instant};

use pairpad_core::ConnectionId;
use pairpad_exec::{
    ExecConfig, ExecError, ExecEvent, ExecutionManager, Interpreter, SessionPhase, TerminalSize,
    Toolchain, OUTPUT_LIMIT_NOTICE, TERMINAL_RESET,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

const ROOM: &str = "abc-def-ghi";

fn shell_config() -> ExecConfig {
    ExecConfig {
        toolchain: Toolchain {
            python: Interpreter::new("sh", &[]),
            ..Toolchain::default()
        },
        ..ExecConfig::with_defaults()
    }
}

struct Viewer {
    id: ConnectionId,
    rx: mpsc::UnboundedReceiver<ExecEvent>,
}

impl Viewer {
    async fn join(mgr: &ExecutionManager, room: &str) -> Self {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        mgr.join(id, room, TerminalSize { cols: 80, rows: 24 }, tx)
            .await
            .unwrap();
        Self { id, rx }
    }

    async fn next(&mut self) -> ExecEvent {
        timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("viewer channel closed")
    }

    /// Everything up to and including the next exit event.
    async fn until_exit(&mut self) -> Vec<ExecEvent> {
        let mut events = Vec::new();
        loop {
            let event = self.next().await;
            let done = matches!(event, ExecEvent::Exit { .. });
            events.push(event);
            if done {
                return events;
            }
        }
    }
}

fn data_of(events: &[ExecEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            ExecEvent::Data { data } => Some(data.as_str()),
            _ => None,
        })
        .collect()
}

fn exits(events: &[ExecEvent]) -> Vec<&ExecEvent> {
    events
        .iter()
        .filter(|e| matches!(e, ExecEvent::Exit { .. }))
        .collect()
}

#[tokio::test]
async fn test_run_streams_reset_echo_output_and_exit() {
    let mgr = ExecutionManager::new(shell_config());
    let mut viewer = Viewer::join(&mgr, ROOM).await;

    mgr.run(viewer.id, ROOM, "python", "echo hi").await.unwrap();
    let events = viewer.until_exit().await;

    let data = data_of(&events);
    assert_eq!(data[0], TERMINAL_RESET);
    assert_eq!(data[1], "$ sh main.py\r\n");
    assert!(data[2..].concat().contains("hi\n"));
    assert_eq!(
        events.last(),
        Some(&ExecEvent::Exit {
            exit_code: Some(0),
            signal: None
        })
    );

    assert!(!mgr.has_process(ROOM).await);
    let buffer = mgr.output_buffer(ROOM).await.unwrap();
    assert!(!buffer.contains(TERMINAL_RESET));
    assert!(buffer.starts_with("$ sh main.py\r\nhi\n"));
}

#[tokio::test]
async fn test_python_print_scenario() {
    let has_python = std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !has_python {
        return;
    }

    let mgr = ExecutionManager::new(ExecConfig::with_defaults());
    let mut viewer = Viewer::join(&mgr, ROOM).await;
    mgr.run(viewer.id, ROOM, "python", "print(\"hi\")")
        .await
        .unwrap();

    let events = viewer.until_exit().await;
    let data = data_of(&events);
    assert_eq!(data[0], TERMINAL_RESET);
    assert_eq!(data[1], "$ python3 -u main.py\r\n");
    assert!(data[2..].concat().contains("hi\n"));
    assert!(matches!(
        events.last(),
        Some(ExecEvent::Exit {
            exit_code: Some(0),
            ..
        })
    ));
}

#[tokio::test]
async fn test_late_joiner_receives_buffer() {
    let mgr = ExecutionManager::new(shell_config());
    let mut first = Viewer::join(&mgr, ROOM).await;
    mgr.run(first.id, ROOM, "python", "echo hi").await.unwrap();
    first.until_exit().await;

    let mut late = Viewer::join(&mgr, ROOM).await;
    match late.next().await {
        ExecEvent::Data { data } => assert!(data.starts_with("$ sh main.py\r\nhi\n")),
        other => panic!("expected replay, got {other:?}"),
    }
    assert!(late.rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unsupported_language_leaves_buffer() {
    let mgr = ExecutionManager::new(shell_config());
    let mut viewer = Viewer::join(&mgr, ROOM).await;
    mgr.run(viewer.id, ROOM, "python", "echo kept").await.unwrap();
    viewer.until_exit().await;
    let before = mgr.output_buffer(ROOM).await;

    let err = mgr
        .run(viewer.id, ROOM, "ruby", "puts 1")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Unsupported language");
    assert_eq!(mgr.output_buffer(ROOM).await, before);
    assert!(!mgr.has_process(ROOM).await);
    assert!(viewer.rx.try_recv().is_err());
}

#[tokio::test]
async fn test_timeout_kills_once() {
    let mgr = ExecutionManager::new(ExecConfig {
        run_timeout: Duration::from_millis(300),
        ..shell_config()
    });
    let mut viewer = Viewer::join(&mgr, ROOM).await;
    mgr.run(viewer.id, ROOM, "python", "exec sleep 30")
        .await
        .unwrap();

    let events = viewer.until_exit().await;
    let notices = data_of(&events)
        .into_iter()
        .filter(|d| d.contains("[Execution timed out after 300ms: process killed]"))
        .count();
    assert_eq!(notices, 1);
    assert_eq!(exits(&events).len(), 1);
    assert_eq!(
        events.last(),
        Some(&ExecEvent::Exit {
            exit_code: None,
            signal: Some("SIGKILL".into())
        })
    );

    // No second exit trickles in
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(viewer.rx.try_recv().is_err());
}

#[tokio::test]
async fn test_output_limit_kills_and_silences() {
    let mgr = ExecutionManager::new(ExecConfig {
        max_run_output_chars: 1_000,
        ..shell_config()
    });
    let mut viewer = Viewer::join(&mgr, ROOM).await;
    mgr.run(viewer.id, ROOM, "python", "exec yes").await.unwrap();

    let events = viewer.until_exit().await;
    let data = data_of(&events);
    let notice_at = data
        .iter()
        .position(|d| d.ends_with(OUTPUT_LIMIT_NOTICE))
        .expect("limit notice");
    assert_eq!(notice_at, data.len() - 1, "data after limit notice");
    assert_eq!(
        data.iter().filter(|d| d.contains("[Output limit exceeded")).count(),
        1
    );

    let streamed: usize = data[2..]
        .iter()
        .map(|d| d.trim_end_matches(OUTPUT_LIMIT_NOTICE).chars().count())
        .sum();
    assert_eq!(streamed, 1_000);
    assert!(matches!(
        events.last(),
        Some(ExecEvent::Exit { signal: Some(s), .. }) if s == "SIGKILL"
    ));
}

#[tokio::test]
async fn test_buffer_stays_bounded() {
    let mgr = ExecutionManager::new(ExecConfig {
        max_buffer_chars: 500,
        ..shell_config()
    });
    let mut viewer = Viewer::join(&mgr, ROOM).await;
    mgr.run(
        viewer.id,
        ROOM,
        "python",
        "i=0; while [ $i -lt 200 ]; do echo line$i; i=$((i+1)); done",
    )
    .await
    .unwrap();
    viewer.until_exit().await;

    let buffer = mgr.output_buffer(ROOM).await.unwrap();
    assert_eq!(buffer.chars().count(), 500);
    assert!(buffer.ends_with("line199\n"));
}

#[tokio::test]
async fn test_new_run_supersedes_old() {
    let mgr = ExecutionManager::new(shell_config());
    let mut viewer = Viewer::join(&mgr, ROOM).await;
    mgr.run(
        viewer.id,
        ROOM,
        "python",
        "while true; do echo old; sleep 0.05; done",
    )
    .await
    .unwrap();

    // Wait until the first run is visibly streaming
    loop {
        if let ExecEvent::Data { data } = viewer.next().await {
            if data.contains("old") {
                break;
            }
        }
    }
    assert!(mgr.has_process(ROOM).await);

    mgr.run(viewer.id, ROOM, "python", "echo new").await.unwrap();
    let events = viewer.until_exit().await;
    let data = data_of(&events);
    let reset_at = data
        .iter()
        .rposition(|d| *d == TERMINAL_RESET)
        .expect("second reset");
    assert!(data[reset_at..].iter().all(|d| !d.contains("old")));
    assert!(data[reset_at..].concat().contains("new\n"));
    assert_eq!(exits(&events).len(), 1);
    assert_eq!(
        events.last(),
        Some(&ExecEvent::Exit {
            exit_code: Some(0),
            signal: None
        })
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(viewer.rx.try_recv().is_err());
    assert!(!mgr.has_process(ROOM).await);
}

#[tokio::test]
async fn test_new_run_cancels_pending_transpile() {
    let mgr = ExecutionManager::new(ExecConfig {
        toolchain: Toolchain {
            python: Interpreter::new("sh", &[]),
            transpiler: Interpreter::new("sh", &["-c", "sleep 2; cp \"$0\" main.js"]),
            ..Toolchain::default()
        },
        ..ExecConfig::with_defaults()
    });
    let mut viewer = Viewer::join(&mgr, ROOM).await;

    let first = tokio::spawn({
        let mgr = mgr.clone();
        let id = viewer.id;
        async move { mgr.run(id, ROOM, "typescript", "console.log('old')").await }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(mgr.phase(ROOM).await, Some(SessionPhase::Preparing));

    let started = Instant::now();
    mgr.run(viewer.id, ROOM, "python", "echo new").await.unwrap();
    let events = viewer.until_exit().await;
    assert!(started.elapsed() < Duration::from_millis(1500));

    // The abandoned run returns without spawning anything
    let first = timeout(Duration::from_millis(500), first)
        .await
        .expect("first run still preparing")
        .unwrap();
    assert_eq!(first, Ok(()));

    let data = data_of(&events);
    assert_eq!(data.iter().filter(|d| **d == TERMINAL_RESET).count(), 2);
    assert!(data.iter().all(|d| !d.contains("node")));
    assert!(data.concat().contains("$ sh main.py\r\nnew\n"));
    assert_eq!(exits(&events).len(), 1);
    assert_eq!(
        events.last(),
        Some(&ExecEvent::Exit {
            exit_code: Some(0),
            signal: None
        })
    );

    // The transpiler was killed before it could emit
    let work_dir = mgr.work_dir(ROOM).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2500).saturating_sub(started.elapsed())).await;
    assert!(!work_dir.join("main.js").exists());
    assert!(viewer.rx.try_recv().is_err());
}

#[tokio::test]
async fn test_back_to_back_runs_publish_only_the_last() {
    let mgr = ExecutionManager::new(shell_config());
    let mut viewer = Viewer::join(&mgr, ROOM).await;
    mgr.run(viewer.id, ROOM, "python", "sleep 5").await.unwrap();

    // The second run is still reaping the first when the third arrives
    let second = tokio::spawn({
        let mgr = mgr.clone();
        let id = viewer.id;
        async move { mgr.run(id, ROOM, "python", "echo second").await }
    });
    tokio::task::yield_now().await;
    mgr.run(viewer.id, ROOM, "python", "echo third").await.unwrap();
    assert_eq!(second.await.unwrap(), Ok(()));

    let events = viewer.until_exit().await;
    let data = data_of(&events);
    let reset_at = data
        .iter()
        .rposition(|d| *d == TERMINAL_RESET)
        .expect("reset");
    assert!(data[reset_at..].iter().all(|d| !d.contains("second")));
    assert!(data[reset_at..].concat().contains("third\n"));
    assert_eq!(exits(&events).len(), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(viewer.rx.try_recv().is_err());
    assert!(!mgr.has_process(ROOM).await);
}

#[tokio::test]
async fn test_runs_start_in_submission_order() {
    let mgr = ExecutionManager::new(shell_config());
    let mut viewer = Viewer::join(&mgr, ROOM).await;

    let earlier = mgr.submit(viewer.id, ROOM, "python", "echo earlier").unwrap();
    let later = mgr.submit(viewer.id, ROOM, "python", "echo later").unwrap();
    assert!(earlier.run_id() < later.run_id());

    later.start().await.unwrap();
    earlier.start().await.unwrap();

    let events = viewer.until_exit().await;
    let data = data_of(&events);
    assert_eq!(data.iter().filter(|d| **d == TERMINAL_RESET).count(), 1);
    assert!(data.concat().contains("later\n"));
    assert!(data.iter().all(|d| !d.contains("earlier")));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(viewer.rx.try_recv().is_err());
}

#[tokio::test]
async fn test_submit_rejects_invalid_run_without_state() {
    let mgr = ExecutionManager::new(shell_config());
    let err = mgr
        .submit(ConnectionId::new(), ROOM, "ruby", "puts 1")
        .err()
        .unwrap();
    assert!(matches!(err, ExecError::Validation(_)));
    assert!(!mgr.has_session(ROOM).await);
}

#[tokio::test]
async fn test_rooms_are_isolated() {
    let mgr = ExecutionManager::new(shell_config());
    let mut a = Viewer::join(&mgr, "aaa-aaa-aaa").await;
    let mut b = Viewer::join(&mgr, "bbb-bbb-bbb").await;

    mgr.run(a.id, "aaa-aaa-aaa", "python", "echo alpha")
        .await
        .unwrap();
    mgr.run(b.id, "bbb-bbb-bbb", "python", "echo beta")
        .await
        .unwrap();

    let a_data = data_of(&a.until_exit().await).concat();
    let b_data = data_of(&b.until_exit().await).concat();
    assert!(a_data.contains("alpha") && !a_data.contains("beta"));
    assert!(b_data.contains("beta") && !b_data.contains("alpha"));
    assert_ne!(
        mgr.work_dir("aaa-aaa-aaa").await,
        mgr.work_dir("bbb-bbb-bbb").await
    );
}

#[tokio::test]
async fn test_rejoin_cancels_disposal_and_keeps_work_dir() {
    let mgr = ExecutionManager::new(ExecConfig {
        idle_grace: Duration::from_millis(300),
        ..shell_config()
    });
    let mut viewer = Viewer::join(&mgr, ROOM).await;
    mgr.run(viewer.id, ROOM, "python", "echo hi").await.unwrap();
    viewer.until_exit().await;
    let dir = mgr.work_dir(ROOM).await.expect("work dir");
    assert!(dir.join("main.py").exists());

    mgr.leave(viewer.id, ROOM).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let back = Viewer::join(&mgr, ROOM).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(mgr.has_session(ROOM).await);
    assert_eq!(mgr.work_dir(ROOM).await, Some(dir.clone()));

    mgr.leave(back.id, ROOM).await.unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(!mgr.has_session(ROOM).await);
    assert!(!dir.exists());
}

#[tokio::test]
async fn test_unwatched_run_is_disposed_after_exit() {
    let mgr = ExecutionManager::new(ExecConfig {
        idle_grace: Duration::from_millis(100),
        ..shell_config()
    });
    mgr.run(ConnectionId::new(), ROOM, "python", "echo nobody")
        .await
        .unwrap();
    assert!(mgr.has_session(ROOM).await);

    let gone = timeout(Duration::from_secs(5), async {
        while mgr.has_session(ROOM).await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(gone.is_ok());
}

#[tokio::test]
async fn test_spawn_failure_reported_to_caller() {
    let mgr = ExecutionManager::new(ExecConfig {
        idle_grace: Duration::from_millis(100),
        toolchain: Toolchain {
            python: Interpreter::new("/nonexistent/python3", &[]),
            ..Toolchain::default()
        },
        ..ExecConfig::with_defaults()
    });

    let err = mgr
        .run(ConnectionId::new(), ROOM, "python", "print(1)")
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::Spawn(_)));
    assert!(!mgr.has_process(ROOM).await);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!mgr.has_session(ROOM).await);
}
