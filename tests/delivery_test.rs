//! Delivery dispatcher tests: size routing, transport fallback and the Bot API over HTTP
//!
//! Run with: cargo test --test delivery_test

mod common;

use common::{wait_for_terminal, FakeSource, FakeTransport, OutputName, TestEnvironment};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vidrelay::core::config::DeliveryConfig;
use vidrelay::download::{DownloadOptions, DownloadOrchestrator, Task, TaskStatus};
use vidrelay::telegram::{BotApiTransport, DeliveryDispatcher, DispatchState, MediaKind, Transport};

const MIB: u64 = 1024 * 1024;

fn ok_json() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "result": {"message_id": 1}}))
}

fn completed_task(path: PathBuf) -> Task {
    let mut task = Task::new(
        "5f0c2a1e-task".to_string(),
        "https://www.youtube.com/watch?v=abc".to_string(),
        DownloadOptions::default(),
    );
    task.status = TaskStatus::Completed;
    task.file_path = Some(path);
    task
}

fn sparse_file(dir: &TempDir, name: &str, len: u64) -> PathBuf {
    let path = dir.path().join(name);
    let file = std::fs::File::create(&path).unwrap();
    file.set_len(len).unwrap();
    path
}

#[tokio::test]
async fn test_oversized_for_bot_with_failing_mtproto_is_notification_only() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex("/bot[^/]+/sendMessage"))
        .and(body_string_contains("Sending the file failed"))
        .respond_with(ok_json())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex("/bot[^/]+/send(Video|Document)"))
        .respond_with(ok_json())
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let task = completed_task(sparse_file(&dir, "big.mp4", 60 * MIB));

    let mtproto = FakeTransport::failing("mtproto", 2048 * MIB).shared();
    let bot = BotApiTransport::new(&DeliveryConfig::bot_only("123:ABC", "-1001", &server.uri())).unwrap();
    let dispatcher = DeliveryDispatcher::new(vec![mtproto.clone() as Arc<dyn Transport>, Arc::new(bot)]);

    let outcome = dispatcher.deliver(&task).await.unwrap();

    assert_eq!(
        outcome.trail,
        vec![
            DispatchState::NotAttempted,
            DispatchState::Attempting("mtproto".to_string()),
            DispatchState::Failed("mtproto".to_string()),
            DispatchState::NotificationOnly,
        ]
    );
    assert_eq!(outcome.file_size, 60 * MIB);
    assert_eq!(outcome.kind, MediaKind::Video);
    assert!(outcome.notification_sent);
    assert_eq!(mtproto.calls(), vec!["file:video", "file:document", "text"]);
}

#[tokio::test]
async fn test_text_skips_unreachable_mtproto() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex("/bot[^/]+/sendMessage"))
        .and(body_string_contains("Download started"))
        .respond_with(ok_json())
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = DeliveryConfig::bot_only("123:ABC", "42", &server.uri());
    config.api_id = Some(12345);
    config.api_hash = Some("0123456789abcdef0123456789abcdef".to_string());
    config.session_path = dir.path().join("vidrelay.session");
    config.mtproto_connect_timeout = Duration::from_millis(300);
    let dispatcher = DeliveryDispatcher::from_config(&config).unwrap();
    assert_eq!(dispatcher.transport_names(), vec!["mtproto", "bot_api"]);

    let started = std::time::Instant::now();
    let task = completed_task(dir.path().join("none.mp4"));
    assert!(dispatcher.notify_started(&task).await);
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
}

#[tokio::test]
async fn test_small_file_without_mtproto_goes_to_bot_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex("/bot[^/]+/sendAudio"))
        .respond_with(ok_json())
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("song.mp3");
    std::fs::write(&path, b"ID3\x04\x00audio").unwrap();

    let config = DeliveryConfig::bot_only("123:ABC", "42", &server.uri());
    let dispatcher = DeliveryDispatcher::from_config(&config).unwrap();
    let outcome = dispatcher.deliver(&completed_task(path)).await.unwrap();

    assert_eq!(outcome.delivered_by(), Some("bot_api"));
    assert_eq!(outcome.kind, MediaKind::Audio);
    assert!(!outcome.notification_sent);
}

#[tokio::test]
async fn test_rejected_video_is_resent_as_document() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex("/bot[^/]+/sendVideo"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: wrong file identifier"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex("/bot[^/]+/sendDocument"))
        .respond_with(ok_json())
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.webm");
    std::fs::write(&path, [0x1A, 0x45, 0xDF, 0xA3, 0x00]).unwrap();

    let dispatcher = DeliveryDispatcher::from_config(&DeliveryConfig::bot_only("123:ABC", "42", &server.uri())).unwrap();
    let outcome = dispatcher.deliver(&completed_task(path)).await.unwrap();

    assert_eq!(outcome.delivered_by(), Some("bot_api"));
}

#[tokio::test]
async fn test_orchestrator_delivers_when_requested() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex("/bot[^/]+/sendMessage"))
        .and(body_string_contains("Download started"))
        .respond_with(ok_json())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex("/bot[^/]+/sendVideo"))
        .respond_with(ok_json())
        .expect(1)
        .mount(&server)
        .await;

    let env = TestEnvironment::new();
    let dispatcher = Arc::new(
        DeliveryDispatcher::from_config(&DeliveryConfig::bot_only("123:ABC", "42", &server.uri())).unwrap(),
    );
    let source = Arc::new(FakeSource::new(Duration::from_millis(20), OutputName::Reported("mp4")));
    let orchestrator = DownloadOrchestrator::new(env.config(1), source, Some(dispatcher)).unwrap();

    let id = orchestrator
        .submit_download(
            "https://www.youtube.com/watch?v=abc",
            Some(r#"{"send_to_telegram": true}"#),
        )
        .unwrap();
    let task = wait_for_terminal(&orchestrator, &id).await;
    assert_eq!(task.status, TaskStatus::Completed);

    // delivery happens after the store is finalized; drain the worker
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_orchestrator_skips_delivery_by_default() {
    let env = TestEnvironment::new();
    let transport = FakeTransport::new("bot_api", 50 * MIB).shared();
    let dispatcher = Arc::new(DeliveryDispatcher::new(vec![transport.clone() as Arc<dyn Transport>]));
    let source = Arc::new(FakeSource::new(Duration::ZERO, OutputName::Reported("mp4")));
    let orchestrator = DownloadOrchestrator::new(env.config(1), source, Some(dispatcher)).unwrap();

    let id = orchestrator.submit_download("https://youtu.be/x", None).unwrap();
    orchestrator.shutdown().await;

    assert_eq!(orchestrator.get_status(&id).unwrap().status, TaskStatus::Completed);
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_failed_download_is_announced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex("/bot[^/]+/sendMessage"))
        .and(body_string_contains("Download started"))
        .respond_with(ok_json())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex("/bot[^/]+/sendMessage"))
        .and(body_string_contains("Download failed"))
        .and(body_string_contains("This video is private"))
        .respond_with(ok_json())
        .expect(1)
        .mount(&server)
        .await;

    let env = TestEnvironment::new();
    let dispatcher = Arc::new(
        DeliveryDispatcher::from_config(&DeliveryConfig::bot_only("123:ABC", "42", &server.uri())).unwrap(),
    );
    let source = Arc::new(FakeSource::new(
        Duration::from_millis(20),
        OutputName::Fails("ERROR: [youtube] abc: This video is private"),
    ));
    let orchestrator = DownloadOrchestrator::new(env.config(1), source, Some(dispatcher)).unwrap();

    let id = orchestrator
        .submit_download("https://youtu.be/abc", Some(r#"{"send_to_telegram": true}"#))
        .unwrap();
    let task = wait_for_terminal(&orchestrator, &id).await;
    assert_eq!(task.status, TaskStatus::Failed);

    // the failure notice goes out after the store update; drain the worker
    orchestrator.shutdown().await;
}
