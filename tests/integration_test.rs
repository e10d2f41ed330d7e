//! Integration tests for shell-bot
//!
//! The tmux tests require tmux to be installed and skip otherwise.
//! All tests use isolated data files to avoid polluting user data.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_test::assert_ok;

use shell_bot::bot::{
    BotSettings, IncomingMessage, MessageId, PollBatch, RemoteControlBot, RemoteTransport,
    TransportResult,
};
use shell_bot::config::{ChatId, Config, OwnerStore};
use shell_bot::session::{
    LaunchOptions, ProcessOptions, ProcessSession, SessionBackend, SessionOrchestrator,
};
use shell_bot::tmux::{InputEvent, SessionOptions, TmuxExecutor};

/// Helper to check if tmux is available
async fn tmux_available() -> bool {
    tokio::process::Command::new("tmux")
        .arg("-V")
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn unique_session_name() -> String {
    format!("shell-bot-test-{}", uuid::Uuid::new_v4().simple())
}

/// Config whose files all live in `dir`
fn isolated_config(dir: &TempDir) -> Config {
    Config {
        session_name: unique_session_name(),
        settle_delay_ms: 200,
        input_relay_interval_ms: 50,
        output_capture_interval_ms: 100,
        token_file: Some(dir.path().join("token")),
        owner_file: Some(dir.path().join("owner.json")),
        input_file: Some(dir.path().join("input.txt")),
        output_file: Some(dir.path().join("output.txt")),
        download_dir: Some(dir.path().join("downloads")),
        log_file: Some(dir.path().join("shell-bot.log")),
        ..Config::default()
    }
}

fn headless() -> LaunchOptions {
    LaunchOptions {
        headless: true,
        enable_bot: false,
        ..LaunchOptions::default()
    }
}

async fn wait_until<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_config_defaults() {
    let config = Config::default();
    assert_eq!(config.session_name, "shell-bot");
    assert_eq!(config.idle_threshold_secs, 15);
    assert_eq!(config.input_relay_interval_ms, 200);
    assert_eq!(config.output_capture_interval_ms, 500);
    assert!(config.validate().is_ok());
}

#[tokio::test]
async fn test_executor_session_roundtrip() {
    if !tmux_available().await {
        eprintln!("Skipping test: tmux not available");
        return;
    }

    let executor = TmuxExecutor::new();
    let name = unique_session_name();

    assert_ok!(executor.create_session(&name, "cat", &SessionOptions::default()).await);
    assert!(executor.session_exists(&name).await.unwrap());

    for event in InputEvent::line("hello from the test") {
        assert_ok!(executor.send_input(&name, &event).await);
    }

    let mut seen = false;
    for _ in 0..40 {
        let screen = executor.capture_pane(&name).await.unwrap();
        if screen.contains("hello from the test") {
            seen = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(seen, "typed text should appear in the pane");
    assert!(!executor.is_pane_dead(&name).await.unwrap());

    assert_ok!(executor.kill_session(&name).await);
    assert!(!executor.session_exists(&name).await.unwrap());
}

#[tokio::test]
async fn test_session_name_prefix_does_not_match() {
    if !tmux_available().await {
        eprintln!("Skipping test: tmux not available");
        return;
    }

    let executor = TmuxExecutor::new();
    let name = unique_session_name();
    assert_ok!(executor.create_session(&name, "sleep 30", &SessionOptions::default()).await);

    // A prefix of an existing name must not resolve to it
    let prefix = &name[..name.len() - 4];
    assert!(!executor.session_exists(prefix).await.unwrap());

    let _ = executor.kill_session(&name).await;
}

#[tokio::test]
async fn test_early_exit_reports_status() {
    if !tmux_available().await {
        eprintln!("Skipping test: tmux not available");
        return;
    }

    let dir = TempDir::new().unwrap();
    let config = Arc::new(isolated_config(&dir));
    let name = config.session_name.clone();

    let mut orchestrator =
        SessionOrchestrator::new(config, "echo starting; exit 7", headless()).unwrap();
    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome.exit_code, 7);
    assert!(!outcome.restart_requested);
    assert!(!TmuxExecutor::new().session_exists(&name).await.unwrap());
}

#[tokio::test]
async fn test_headless_run_relays_input_and_output() {
    if !tmux_available().await {
        eprintln!("Skipping test: tmux not available");
        return;
    }

    let dir = TempDir::new().unwrap();
    let config = Arc::new(isolated_config(&dir));
    let input_file = dir.path().join("input.txt");
    let output_file = dir.path().join("output.txt");

    let mut orchestrator = SessionOrchestrator::new(
        config,
        "read line; echo got:$line; sleep 1; exit 3",
        headless(),
    )
    .unwrap();
    let run = tokio::spawn(async move { orchestrator.run().await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    tokio::fs::write(&input_file, "ping\n").await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(15), run)
        .await
        .expect("run should finish")
        .unwrap()
        .unwrap();
    assert_eq!(outcome.exit_code, 3);

    let snapshot = tokio::fs::read_to_string(&output_file).await.unwrap();
    assert!(snapshot.contains("got:ping"), "snapshot was {:?}", snapshot);
}

#[tokio::test]
async fn test_stale_session_is_replaced() {
    if !tmux_available().await {
        eprintln!("Skipping test: tmux not available");
        return;
    }

    let dir = TempDir::new().unwrap();
    let config = Arc::new(isolated_config(&dir));
    let executor = TmuxExecutor::new();
    assert_ok!(
        executor
            .create_session(&config.session_name, "sleep 60", &SessionOptions::default())
            .await
    );

    let mut orchestrator = SessionOrchestrator::new(config, "exit 5", headless()).unwrap();
    let outcome = orchestrator.run().await.unwrap();
    assert_eq!(outcome.exit_code, 5);
}

async fn wait_for_session(executor: &TmuxExecutor, name: &str) -> bool {
    for _ in 0..60 {
        if executor.session_exists(name).await.unwrap_or(false) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_orchestrator_creates_session_with_options() {
    if !tmux_available().await {
        eprintln!("Skipping test: tmux not available");
        return;
    }

    let dir = TempDir::new().unwrap();
    let config = Config {
        status_position: "top".to_string(),
        ..isolated_config(&dir)
    };
    let name = config.session_name.clone();
    let executor = TmuxExecutor::new();

    let mut orchestrator =
        SessionOrchestrator::new(Arc::new(config), "sleep 30", headless()).unwrap();
    let cancel = orchestrator.cancel_token();
    let run = tokio::spawn(async move { orchestrator.run().await });

    assert!(wait_for_session(&executor, &name).await, "session was never created");
    let target = format!("={}:", name);
    let position = executor
        .execute(&["show-options", "-v", "-t", &target, "status-position"])
        .await
        .unwrap();
    assert_eq!(position.trim(), "top");
    assert!(!executor.is_pane_dead(&name).await.unwrap());

    cancel.cancel();
    let outcome = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("run should stop on cancel")
        .unwrap()
        .unwrap();
    assert_eq!(outcome.exit_code, 130);
    assert!(!executor.session_exists(&name).await.unwrap());
}

#[tokio::test]
async fn test_failed_start_leaves_no_session() {
    if !tmux_available().await {
        eprintln!("Skipping test: tmux not available");
        return;
    }

    let dir = TempDir::new().unwrap();
    // tmux creates the session, then rejects this option later in the same invocation
    let config = Config {
        status_position: "sideways".to_string(),
        ..isolated_config(&dir)
    };
    let name = config.session_name.clone();

    let mut orchestrator =
        SessionOrchestrator::new(Arc::new(config), "sleep 30", headless()).unwrap();
    let err = orchestrator.run().await.unwrap_err();

    assert!(matches!(
        err,
        shell_bot::Error::Session(shell_bot::error::SessionError::StartFailed(_))
    ));
    assert!(!TmuxExecutor::new().session_exists(&name).await.unwrap());
}

#[tokio::test]
async fn test_history_limit_applies_to_new_pane() {
    if !tmux_available().await {
        eprintln!("Skipping test: tmux not available");
        return;
    }

    let executor = TmuxExecutor::new();
    let name = unique_session_name();
    let options = SessionOptions {
        history_limit: 10_000,
        ..SessionOptions::default()
    };
    assert_ok!(executor.create_session(&name, "seq 1 6000; sleep 30", &options).await);

    let mut history = String::new();
    for _ in 0..60 {
        history = executor.capture_history(&name).await.unwrap();
        if history.lines().any(|l| l.trim() == "6000") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let _ = executor.kill_session(&name).await;

    let first = history.lines().find(|l| !l.trim().is_empty());
    assert_eq!(first.map(str::trim), Some("1"));
}

/// Transport that records sent messages
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(ChatId, String)>>,
}

impl RecordingTransport {
    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl RemoteTransport for RecordingTransport {
    async fn poll(&self, _offset: i64, timeout: Duration) -> TransportResult<PollBatch> {
        tokio::time::sleep(timeout).await;
        Ok(PollBatch::default())
    }

    async fn send_message(&self, chat_id: ChatId, html: &str) -> TransportResult<MessageId> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((chat_id, html.to_string()));
        Ok(sent.len() as MessageId)
    }

    async fn edit_message(&self, chat_id: ChatId, _id: MessageId, html: &str) -> TransportResult<()> {
        self.sent.lock().unwrap().push((chat_id, html.to_string()));
        Ok(())
    }

    async fn delete_message(&self, _chat_id: ChatId, _id: MessageId) -> TransportResult<()> {
        Ok(())
    }

    async fn download_file(&self, _file_id: &str, dest: &Path) -> TransportResult<PathBuf> {
        Ok(dest.to_path_buf())
    }
}

#[tokio::test]
async fn test_bot_drives_standalone_process() {
    let dir = TempDir::new().unwrap();
    let process = Arc::new(
        ProcessSession::spawn("while read l; do echo echo:$l; done", &ProcessOptions::default(), None)
            .unwrap(),
    );
    let transport = Arc::new(RecordingTransport::default());
    let settings = BotSettings {
        idle_threshold: Duration::ZERO,
        relay_interval: Duration::from_millis(50),
        poll_timeout: Duration::from_millis(50),
        download_dir: dir.path().join("downloads"),
    };
    let bot = RemoteControlBot::new(
        transport.clone(),
        process.clone(),
        None,
        OwnerStore::new(dir.path().join("owner.json")),
        settings,
    )
    .unwrap();

    assert_ok!(bot.handle_message(IncomingMessage::text(1, "/start")).await);
    assert_ok!(bot.handle_message(IncomingMessage::text(1, "marco")).await);
    assert!(wait_until(|| process.last_lines(1) == vec!["echo:marco"]).await);

    assert_ok!(bot.relay_once(Instant::now()).await);
    assert!(transport.sent().iter().any(|t| t == "<pre>echo:marco</pre>"));

    // /kill stops the standalone process
    assert_ok!(bot.handle_message(IncomingMessage::text(1, "/kill")).await);
    let code = tokio::time::timeout(Duration::from_secs(5), process.wait())
        .await
        .unwrap();
    assert_eq!(code, 128 + 15);
    assert!(!process.is_alive().await);
}
