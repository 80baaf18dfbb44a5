//! Client manager tests: restarts, settings watching and teardown

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use common::{generation_script, FakeService, Step};
use utb_client::requests::{self, FileRequest, RequestOutcome};
use utb_client::{ChannelSink, ClientManager, LogChannel, ServerLogChannel};
use utb_core::config::ClientConfig;
use utb_core::error::{ClientError, ConnectionError};
use utb_core::{ClientId, Endpoint, LogLevel, TestsResponse};
use utb_protocol::RpcMethod;

fn config_for(endpoint: Endpoint) -> ClientConfig {
    ClientConfig {
        server: endpoint,
        connect_timeout: Duration::from_secs(2),
        heartbeat_interval: Duration::from_secs(60),
        ..Default::default()
    }
}

fn manager_for(service: &FakeService, id: &str) -> ClientManager {
    ClientManager::with_client_id(&config_for(service.endpoint()), ClientId::from(id), vec![])
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_settings_change_mid_stream() {
    let old_service = FakeService::start().await;
    let new_service = FakeService::start().await;
    old_service.script(
        RpcMethod::GenerateFileTests,
        vec![Step::reply(&TestsResponse::progress("Building project", 20.0)), Step::Hang],
    );
    new_service.script(RpcMethod::GenerateFileTests, generation_script("tests/b_test.cpp", 7));

    let manager = manager_for(&old_service, "alice-03421");
    let config = config_for(old_service.endpoint());
    let request = FileRequest::build(&config.project_params(None), "/a/b.cpp".into());

    let old_client = manager.client();
    let mut run = requests::execute(request.clone(), &old_client, CancellationToken::new()).await;
    assert!(run.next_event().await.is_some());

    assert!(manager.on_settings_changed(new_service.endpoint()));

    let ended = tokio::time::timeout(Duration::from_secs(5), run.next_event()).await.unwrap();
    assert!(ended.is_none());
    match run.outcome() {
        Some(RequestOutcome::Failed { error, .. }) => {
            assert!(matches!(error, ClientError::Connection(ConnectionError::Disposed)));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let current = manager.client();
    assert!(old_client.is_disposed());
    assert_eq!(current.port(), new_service.port());
    assert_eq!(current.client_id().as_str(), "alice-03421");

    let outcome = requests::execute(request, &current, CancellationToken::new())
        .await
        .finish()
        .await;
    assert_eq!(outcome.message(), "7 tests generated for b.cpp");
    assert!(new_service.handshakes().iter().all(|id| id == "alice-03421"));
    assert_eq!(new_service.calls_for(RpcMethod::GenerateFileTests)[0].client_id, "alice-03421");
}

#[tokio::test]
async fn test_redundant_settings_keep_session() {
    let service = FakeService::start().await;
    let manager = manager_for(&service, "bob-00002");
    let before = manager.client();

    assert!(!manager.on_settings_changed(service.endpoint()));
    assert!(Arc::ptr_eq(&before, &manager.client()));
    assert!(!before.is_disposed());
}

#[tokio::test]
async fn test_watch_settings_applies_changes() {
    let first = FakeService::start().await;
    let second = FakeService::start().await;
    let manager = Arc::new(manager_for(&first, "carol-33333"));
    let original = manager.client();

    let (settings, receiver) = watch::channel(first.endpoint());
    let watcher = manager.watch_settings(receiver);

    settings.send_replace(first.endpoint());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(Arc::ptr_eq(&original, &manager.client()));

    settings.send_replace(second.endpoint());
    eventually(|| manager.client().port() == second.port()).await;
    assert!(original.is_disposed());
    assert_eq!(manager.client().client_id(), original.client_id());

    drop(settings);
    tokio::time::timeout(Duration::from_secs(5), watcher)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_watch_settings_stops_on_teardown() {
    let service = FakeService::start().await;
    let manager = Arc::new(manager_for(&service, "dave-44444"));
    let (_settings, receiver) = watch::channel(service.endpoint());
    let watcher = manager.watch_settings(receiver);

    manager.teardown();

    tokio::time::timeout(Duration::from_secs(5), watcher)
        .await
        .unwrap()
        .unwrap();
    assert!(manager.client().is_disposed());
}

#[tokio::test]
async fn test_concurrent_restarts_leave_one_live_session() {
    let a = FakeService::start().await;
    let b = FakeService::start().await;
    let manager = Arc::new(manager_for(&a, "erin-55555"));

    let mut tasks = Vec::new();
    for i in 0..8 {
        let manager = Arc::clone(&manager);
        let endpoint = if i % 2 == 0 { b.endpoint() } else { a.endpoint() };
        tasks.push(tokio::spawn(async move {
            manager.on_settings_changed(endpoint);
            manager.restart_client();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let current = manager.client();
    assert!(!current.is_disposed());
    assert!(current.port() == a.port() || current.port() == b.port());
    assert_eq!(current.client_id().as_str(), "erin-55555");
}

#[tokio::test]
async fn test_teardown_disposes_and_rejects_sends() {
    let service = FakeService::start().await;
    service.script(RpcMethod::GenerateFileTests, generation_script("tests/b_test.cpp", 1));
    let manager = manager_for(&service, "frank-66666");
    let client = manager.client();

    manager.teardown();

    let config = config_for(service.endpoint());
    let request = FileRequest::build(&config.project_params(None), "/a/b.cpp".into());
    let outcome = requests::execute(request, &client, CancellationToken::new())
        .await
        .finish()
        .await;

    match outcome {
        RequestOutcome::Failed { error, .. } => assert!(matches!(error, ClientError::SessionClosed)),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(!manager.restart_client());
}

#[tokio::test]
async fn test_channels_follow_restart() {
    let a = FakeService::start().await;
    let b = FakeService::start().await;
    a.log_lines(RpcMethod::OpenLogChannel, &["from-a"]);
    b.log_lines(RpcMethod::OpenLogChannel, &["from-b"]);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let channel: Arc<dyn LogChannel> = Arc::new(ServerLogChannel::new(LogLevel::Info, ChannelSink(tx)));
    let manager = ClientManager::with_client_id(
        &config_for(a.endpoint()),
        ClientId::from("grace-77777"),
        vec![channel],
    );

    let line = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert_eq!(line.as_deref(), Some("from-a"));

    assert!(manager.on_settings_changed(b.endpoint()));

    let line = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert_eq!(line.as_deref(), Some("from-b"));

    eventually(|| a.disconnects() == 1).await;
    let reopened = b.calls_for(RpcMethod::OpenLogChannel);
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened[0].client_id, "grace-77777");
}
