use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::*;
use crate::core::message::Role;
use crate::utils::test_utils::{ok_chunks, Reply, ScriptedClient, StreamReply};

fn engine(client: Arc<ScriptedClient>, mode: Mode) -> (Engine, mpsc::Receiver<StreamEvent>) {
    Engine::new(client, mode, PromptContext::default())
}

fn drain(rx: &mut mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn one_shot_parses_the_exec_payload() {
    let raw = r#"{"cmd":"mkdir test","exp":"creates a directory named test","exec":true}"#;
    let client = ScriptedClient::with_replies(vec![Reply::Text(raw)]);
    let (engine, _rx) = engine(client.clone(), Mode::Exec);

    let result = engine
        .run_one_shot("make a folder named test")
        .await
        .expect("one-shot should succeed");

    assert_eq!(
        result,
        ExecResult {
            command: "mkdir test".to_string(),
            explanation: "creates a directory named test".to_string(),
            executable: true,
        }
    );
    assert_eq!(
        engine.history(Mode::Exec),
        vec![
            Message::user("make a folder named test"),
            Message::assistant(raw),
        ]
    );
    assert!(!engine.is_running());
}

#[tokio::test]
async fn one_shot_prose_reply_is_not_executable() {
    let client = ScriptedClient::with_replies(vec![Reply::Text("I cannot help with that")]);
    let (engine, _rx) = engine(client, Mode::Exec);

    let result = engine.run_one_shot("rm everything").await.expect("result");
    assert_eq!(result.command, "");
    assert_eq!(result.explanation, "I cannot help with that");
    assert!(!result.executable);
    assert_eq!(
        engine.history(Mode::Exec)[1],
        Message::assistant("I cannot help with that")
    );
}

#[tokio::test]
async fn request_carries_prompt_pipe_and_history() {
    let client = ScriptedClient::with_replies(vec![Reply::Text("first"), Reply::Text("second")]);
    let (engine, _rx) = engine(client.clone(), Mode::Exec);
    engine.set_pipe_context("a.txt");

    engine.run_one_shot("one").await.expect("first");
    engine.run_one_shot("two").await.expect("second");

    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    let second = &requests[1];
    assert_eq!(second.message, "two");
    assert_eq!(second.system_instruction, engine.system_instruction());
    assert_eq!(
        second.history,
        vec![
            Message::user("I will work on the following input: a.txt"),
            Message::user("one"),
            Message::assistant("first"),
            Message::user("two"),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn third_attempt_success_is_returned() {
    let client = ScriptedClient::with_replies(vec![
        Reply::Fail("boom"),
        Reply::Fail("boom again"),
        Reply::Text(r#"{"cmd":"ls","exp":"lists files","exec":true}"#),
    ]);
    let (engine, _rx) = engine(client.clone(), Mode::Exec);
    let started = Instant::now();

    let result = engine.run_one_shot("list files").await.expect("third try");

    assert_eq!(result.command, "ls");
    assert_eq!(client.requests().len(), 3);
    // 1s after the first failure, 2s after the second.
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn retries_stop_after_three_attempts() {
    let client = ScriptedClient::with_replies(vec![
        Reply::Fail("one"),
        Reply::Fail("two"),
        Reply::Fail("three"),
        Reply::Text("never reached"),
    ]);
    let (engine, _rx) = engine(client.clone(), Mode::Exec);

    let err = engine.run_one_shot("list files").await.expect_err("exhausted");

    match err {
        EngineError::Request { attempts, source } => {
            assert_eq!(attempts, 3);
            assert_eq!(source.to_string(), "three");
        }
        other => panic!("expected request failure, got {other:?}"),
    }
    assert_eq!(client.requests().len(), 3);
    assert!(!engine.is_running());
    // The user turn stays; no assistant turn is recorded.
    assert_eq!(engine.history(Mode::Exec), vec![Message::user("list files")]);
}

#[tokio::test]
async fn empty_reply_is_not_retried() {
    let client = ScriptedClient::with_replies(vec![Reply::Text(""), Reply::Text("unused")]);
    let (engine, _rx) = engine(client.clone(), Mode::Exec);

    let err = engine.run_one_shot("hello").await.expect_err("empty");
    assert!(matches!(err, EngineError::EmptyResponse));
    assert_eq!(client.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn one_shot_gives_up_at_the_deadline() {
    let client = ScriptedClient::with_replies(vec![Reply::Hang]);
    let (engine, _rx) = engine(client, Mode::Exec);

    let err = engine.run_one_shot("slow").await.expect_err("deadline");
    assert!(matches!(err, EngineError::DeadlineExceeded));
    assert!(!engine.is_running());
}

#[tokio::test]
async fn closing_fails_the_request_in_flight() {
    let client = ScriptedClient::with_replies(vec![Reply::Hang]);
    let (engine, _rx) = engine(client, Mode::Exec);
    let engine = Arc::new(engine);

    let driver = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_one_shot("slow").await }
    });
    while !engine.is_running() {
        tokio::task::yield_now().await;
    }
    engine.close();

    let err = driver.await.expect("join").expect_err("closed");
    assert!(matches!(err, EngineError::Closed));
    assert!(matches!(
        engine.run_one_shot("again").await,
        Err(EngineError::Closed)
    ));
}

#[tokio::test]
async fn closing_fails_the_stream_in_flight() {
    let (feeder, chunks) = mpsc::unbounded_channel();
    let client = ScriptedClient::with_stream(StreamReply::Live(chunks));
    let (engine, mut rx) = engine(client, Mode::Chat);
    let engine = Arc::new(engine);

    let driver = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_streaming("tell me a story").await }
    });

    feeder.send(Ok("Once".to_string())).expect("feed");
    assert_eq!(rx.recv().await, Some(StreamEvent::Delta("Once".to_string())));

    engine.close();

    let err = driver.await.expect("join").expect_err("closed");
    assert!(matches!(err, EngineError::Closed));
    assert!(matches!(rx.recv().await, Some(StreamEvent::Error(_))));
    assert!(drain(&mut rx).is_empty());
    assert!(!engine.is_running());
    assert!(matches!(
        engine.run_streaming("again").await,
        Err(EngineError::Closed)
    ));
}

#[tokio::test]
async fn stream_emits_deltas_then_final() {
    let client = ScriptedClient::with_stream(StreamReply::Chunks(ok_chunks(&["Hel", "", "lo"])));
    let (engine, mut rx) = engine(client, Mode::Chat);

    engine.run_streaming("greet me").await.expect("stream");

    assert_eq!(
        drain(&mut rx),
        vec![
            StreamEvent::Delta("Hel".to_string()),
            StreamEvent::Delta("lo".to_string()),
            StreamEvent::Final { executable: false },
        ]
    );
    assert_eq!(
        engine.history(Mode::Chat),
        vec![Message::user("greet me"), Message::assistant("Hello")]
    );
    assert!(engine.history(Mode::Exec).is_empty());
}

#[tokio::test]
async fn exec_mode_stream_single_line_is_executable() {
    let client = ScriptedClient::with_stream(StreamReply::Chunks(ok_chunks(&["ls ", "-la"])));
    let (engine, mut rx) = engine(client, Mode::Exec);

    engine.run_streaming("list").await.expect("stream");

    assert_eq!(
        drain(&mut rx).last(),
        Some(&StreamEvent::Final { executable: true })
    );
}

#[tokio::test]
async fn exec_mode_stream_multiline_or_sentinel_is_not_executable() {
    for chunks in [vec!["cd /tmp", "\nls"], vec!["[noexec] ", "no command"]] {
        let client = ScriptedClient::with_stream(StreamReply::Chunks(ok_chunks(&chunks)));
        let (engine, mut rx) = engine(client, Mode::Exec);

        engine.run_streaming("do it").await.expect("stream");
        assert_eq!(
            drain(&mut rx).last(),
            Some(&StreamEvent::Final { executable: false })
        );
    }
}

#[tokio::test]
async fn empty_stream_still_appends_an_assistant_turn() {
    let client = ScriptedClient::with_stream(StreamReply::Chunks(Vec::new()));
    let (engine, mut rx) = engine(client, Mode::Chat);

    engine.run_streaming("anything?").await.expect("stream");

    assert_eq!(drain(&mut rx), vec![StreamEvent::Final { executable: false }]);
    assert_eq!(engine.history(Mode::Chat)[1], Message::assistant(""));
}

#[tokio::test]
async fn stream_error_emits_error_and_no_final() {
    let mut chunks = ok_chunks(&["partial"]);
    chunks.push(Err(ClientError::Stream("API Error: quota".to_string())));
    chunks.push(Ok("ignored".to_string()));
    let client = ScriptedClient::with_stream(StreamReply::Chunks(chunks));
    let (engine, mut rx) = engine(client, Mode::Chat);

    let err = engine.run_streaming("hi").await.expect_err("stream failure");

    assert!(matches!(err, EngineError::Stream(_)));
    assert_eq!(
        drain(&mut rx),
        vec![
            StreamEvent::Delta("partial".to_string()),
            StreamEvent::Error("API Error: quota".to_string()),
        ]
    );
    assert_eq!(engine.history(Mode::Chat), vec![Message::user("hi")]);
    assert!(!engine.is_running());
}

#[tokio::test]
async fn stream_open_failure_emits_error() {
    let client = ScriptedClient::with_stream(StreamReply::OpenFail("HTTP 401: bad key"));
    let (engine, mut rx) = engine(client, Mode::Chat);

    let err = engine.run_streaming("hi").await.expect_err("open failure");

    assert!(matches!(err, EngineError::Stream(_)));
    assert_eq!(
        drain(&mut rx),
        vec![StreamEvent::Error("HTTP 401: bad key".to_string())]
    );
}

#[tokio::test]
async fn interrupt_stops_deltas_and_suppresses_final() {
    let (feeder, chunks) = mpsc::unbounded_channel();
    let client = ScriptedClient::with_stream(StreamReply::Live(chunks));
    let (engine, mut rx) = engine(client, Mode::Chat);
    let engine = Arc::new(engine);

    let driver = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_streaming("tell me a story").await }
    });

    feeder.send(Ok("Once".to_string())).expect("feed");
    assert_eq!(rx.recv().await, Some(StreamEvent::Delta("Once".to_string())));

    assert!(engine.interrupt().await);
    assert_eq!(rx.recv().await, Some(StreamEvent::Interrupt));

    let _ = feeder.send(Ok(" upon".to_string()));
    driver.await.expect("join").expect("interrupted stream is not an error");

    assert!(drain(&mut rx).is_empty());
    assert_eq!(
        engine.history(Mode::Chat),
        vec![Message::user("tell me a story"), Message::assistant("Once")]
    );
    assert!(!engine.is_running());
}

#[tokio::test]
async fn interrupt_when_idle_does_nothing() {
    let client = ScriptedClient::with_replies(Vec::new());
    let (engine, mut rx) = engine(client, Mode::Chat);

    assert!(!engine.interrupt().await);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn interrupt_is_dropped_when_the_channel_is_full() {
    let (feeder, chunks) = mpsc::unbounded_channel();
    for index in 0..EVENT_CHANNEL_CAPACITY {
        feeder.send(Ok(format!("{index} "))).expect("feed");
    }
    let client = ScriptedClient::with_stream(StreamReply::Live(chunks));
    let (engine, mut rx) = engine(client, Mode::Chat);
    let engine = Arc::new(engine);

    let driver = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_streaming("count").await }
    });
    while engine.events.capacity() > 0 {
        tokio::task::yield_now().await;
    }

    // The channel is full, so the interrupt event is given up on.
    assert!(engine.interrupt().await);
    driver.await.expect("join").expect("interrupted");

    let events = drain(&mut rx);
    assert_eq!(events.len(), EVENT_CHANNEL_CAPACITY);
    assert!(events.iter().all(|event| matches!(event, StreamEvent::Delta(_))));
}

#[tokio::test(start_paused = true)]
async fn stream_that_never_ends_hits_the_deadline() {
    let (_feeder, chunks) = mpsc::unbounded_channel();
    let client = ScriptedClient::with_stream(StreamReply::Live(chunks));
    let (engine, mut rx) = engine(client, Mode::Chat);

    let err = engine.run_streaming("wait").await.expect_err("deadline");

    assert!(matches!(err, EngineError::DeadlineExceeded));
    assert!(drain(&mut rx).is_empty());
    assert_eq!(engine.history(Mode::Chat), vec![Message::user("wait")]);
}

#[tokio::test]
async fn dropped_consumer_fails_the_stream() {
    let client = ScriptedClient::with_stream(StreamReply::Chunks(ok_chunks(&["a"])));
    let (engine, rx) = engine(client, Mode::Chat);
    drop(rx);

    let err = engine.run_streaming("hi").await.expect_err("no consumer");
    assert!(matches!(err, EngineError::ChannelClosed));
}

#[tokio::test]
async fn mode_switch_mid_session_keeps_histories_apart() {
    let client = ScriptedClient::with_replies(vec![Reply::Text(
        r#"{"cmd":"pwd","exp":"prints the directory","exec":true}"#,
    )]);
    let (engine, _rx) = engine(client, Mode::Exec);

    engine.run_one_shot("where am I").await.expect("one-shot");
    let exec_history = engine.history(Mode::Exec);

    engine.set_mode(Mode::Chat);
    assert_eq!(engine.mode(), Mode::Chat);
    engine.clear_active();
    engine.set_mode(Mode::Exec);

    assert_eq!(engine.history(Mode::Exec), exec_history);
    assert!(exec_history.iter().all(|m| matches!(m.role, Role::User | Role::Assistant)));

    engine.reset_all();
    assert!(engine.history(Mode::Exec).is_empty());
}

#[test]
fn only_deltas_are_non_terminal() {
    assert!(!StreamEvent::Delta("x".to_string()).is_terminal());
    assert!(StreamEvent::Final { executable: true }.is_terminal());
    assert!(StreamEvent::Error("e".to_string()).is_terminal());
    assert!(StreamEvent::Interrupt.is_terminal());
}
