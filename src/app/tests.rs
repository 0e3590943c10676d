use super::*;
use crate::capture::MockCaptureSource;
use crate::config::FramecastConfig;
use crate::recorder::{RecordingState, STOP_RECORDING};
use crate::transport::MockConnector;
use std::sync::Arc;
use std::time::Duration;

fn create_test_config() -> FramecastConfig {
    let mut config = FramecastConfig::default();
    config.endpoint.url = "ws://10.0.0.5:8080".to_string();
    config
}

async fn create_test_app() -> (FramecastApp, Arc<MockConnector>, Arc<MockCaptureSource>) {
    let connector = Arc::new(MockConnector::new());
    let capture = Arc::new(MockCaptureSource::new());
    let app = FramecastApp::with_components(
        create_test_config(),
        capture.clone(),
        Some(connector.clone()),
    )
    .await
    .unwrap();
    (app, connector, capture)
}

#[tokio::test]
async fn test_app_creation() {
    let (app, _connector, _capture) = create_test_app().await;

    assert_eq!(app.config().endpoint.url, "ws://10.0.0.5:8080");
    assert_eq!(app.controller().recording_state(), RecordingState::Idle);
    assert!(app.get_all_component_states().await.is_empty());
}

#[tokio::test]
async fn test_component_state_management() {
    let (mut app, _connector, _capture) = create_test_app().await;
    app.initialize().await.unwrap();

    assert_eq!(
        app.get_component_state("recorder").await,
        Some(ComponentState::Stopped)
    );

    app.set_component_state("recorder", ComponentState::Running)
        .await;
    assert_eq!(
        app.get_component_state("recorder").await,
        Some(ComponentState::Running)
    );
    assert_eq!(app.get_component_state("display").await, None);
}

#[tokio::test]
async fn test_start_and_requested_shutdown() {
    let (mut app, connector, capture) = create_test_app().await;
    app.initialize().await.unwrap();
    app.start().await.unwrap();

    assert_eq!(app.controller().recording_state(), RecordingState::Recording);
    assert!(capture.is_delivering());
    assert_eq!(
        app.get_component_state("recorder").await,
        Some(ComponentState::Running)
    );

    assert!(app.request_shutdown(ShutdownReason::UserRequest).await);
    assert!(!app.request_shutdown(ShutdownReason::UserRequest).await);

    let exit_code = app.run(None).await.unwrap();

    assert_eq!(exit_code, 0);
    assert_eq!(app.controller().recording_state(), RecordingState::Idle);
    assert_eq!(connector.sent_texts(), vec![STOP_RECORDING.to_string()]);
    assert_eq!(
        app.get_component_state("recorder").await,
        Some(ComponentState::Stopped)
    );
}

#[tokio::test]
async fn test_run_for_duration() {
    let (mut app, _connector, _capture) = create_test_app().await;
    app.initialize().await.unwrap();
    app.start().await.unwrap();

    let exit_code = app.run(Some(Duration::from_millis(50))).await.unwrap();

    assert_eq!(exit_code, 0);
    assert_eq!(app.controller().recording_state(), RecordingState::Idle);
}

#[tokio::test]
async fn test_start_failure_marks_component_failed() {
    let (mut app, _connector, capture) = create_test_app().await;
    capture.set_authorized(false);
    app.initialize().await.unwrap();

    assert!(app.start().await.is_err());
    assert_eq!(
        app.get_component_state("recorder").await,
        Some(ComponentState::Failed)
    );
}

#[tokio::test]
async fn test_run_twice_fails() {
    let (mut app, _connector, _capture) = create_test_app().await;
    app.request_shutdown(ShutdownReason::UserRequest).await;
    app.run(None).await.unwrap();

    assert!(app.run(None).await.is_err());
}
