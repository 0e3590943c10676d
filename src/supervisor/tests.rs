use super::*;
use crate::error::TransportError;
use crate::events::{EventBus, StreamEvent};
use crate::transport::{MockConnector, StreamTransport};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};

const URL: &str = "ws://10.0.0.5:8080";

fn create_supervisor(
    connector: &Arc<MockConnector>,
    base_delay: Duration,
    max_attempts: u32,
) -> (ConnectionSupervisor, broadcast::Receiver<StreamEvent>) {
    let event_bus = Arc::new(EventBus::new(64));
    let events = event_bus.subscribe();
    let supervisor = ConnectionSupervisor::new(
        connector.clone(),
        ReconnectPolicy::new(base_delay, 2, max_attempts),
        Duration::from_secs(30),
        event_bus,
    );
    (supervisor, events)
}

async fn wait_for_state(supervisor: &ConnectionSupervisor, expected: ConnectionState) {
    let mut state = supervisor.subscribe_state();
    state.wait_for(|s| *s == expected).await.unwrap();
}

fn scheduled_delays(events: &mut broadcast::Receiver<StreamEvent>) -> Vec<u64> {
    let mut delays = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let StreamEvent::ReconnectScheduled { delay_ms, .. } = event {
            delays.push(delay_ms);
        }
    }
    delays
}

#[tokio::test(start_paused = true)]
async fn test_connect_installs_transport() {
    let connector = Arc::new(MockConnector::new());
    let (supervisor, _events) = create_supervisor(&connector, Duration::from_secs(1), 5);

    supervisor.start(URL).await.unwrap();

    assert_eq!(supervisor.state(), ConnectionState::Connected);
    assert_eq!(supervisor.active_generation(), Some(1));
    assert_eq!(supervisor.endpoint().unwrap().port(), 8080);
    assert_eq!(
        supervisor.send(Bytes::from_static(b"frame")).await,
        SendOutcome::Sent
    );
    assert_eq!(connector.sent_binaries(), vec![Bytes::from_static(b"frame")]);

    let stats = supervisor.stats();
    assert_eq!(stats.payloads_sent, 1);
    assert_eq!(stats.bytes_sent, 5);
    assert_eq!(stats.successful_connections, 1);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_schedule_then_given_up() {
    let connector = Arc::new(MockConnector::new());
    connector.set_reachable(false);
    let (supervisor, mut events) = create_supervisor(&connector, Duration::from_secs(1), 5);

    let started = Instant::now();
    supervisor.start(URL).await.unwrap();
    assert_eq!(supervisor.state(), ConnectionState::Reconnecting);

    wait_for_state(&supervisor, ConnectionState::GivenUp).await;

    assert_eq!(started.elapsed(), Duration::from_secs(1 + 2 + 4 + 8 + 16));
    assert_eq!(connector.attempts(), 6);
    assert_eq!(
        scheduled_delays(&mut events),
        vec![1000, 2000, 4000, 8000, 16000]
    );
    assert_eq!(supervisor.stats().reconnect_attempts, 5);

    // No further attempts once given up
    sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.attempts(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_given_up_publishes_event() {
    let connector = Arc::new(MockConnector::new());
    connector.set_reachable(false);
    let (supervisor, mut events) = create_supervisor(&connector, Duration::from_millis(10), 2);

    supervisor.start(URL).await.unwrap();
    wait_for_state(&supervisor, ConnectionState::GivenUp).await;

    let mut given_up = None;
    while let Ok(event) = events.try_recv() {
        if let StreamEvent::ConnectionGivenUp { attempts } = event {
            given_up = Some(attempts);
        }
    }
    assert_eq!(given_up, Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_policy_resets_after_successful_reconnect() {
    let connector = Arc::new(MockConnector::new());
    connector.fail_next(2);
    let (supervisor, mut events) = create_supervisor(&connector, Duration::from_secs(1), 5);

    let started = Instant::now();
    supervisor.start(URL).await.unwrap();
    wait_for_state(&supervisor, ConnectionState::Connected).await;
    assert_eq!(started.elapsed(), Duration::from_secs(3));
    assert_eq!(scheduled_delays(&mut events), vec![1000, 2000]);

    connector.current().unwrap().sever();
    wait_for_state(&supervisor, ConnectionState::Reconnecting).await;
    let lost_at = Instant::now();
    wait_for_state(&supervisor, ConnectionState::Connected).await;

    assert_eq!(lost_at.elapsed(), Duration::from_secs(1));
    assert_eq!(scheduled_delays(&mut events), vec![1000]);
    assert_eq!(supervisor.stats().successful_connections, 2);
}

#[tokio::test(start_paused = true)]
async fn test_payloads_dropped_while_reconnecting() {
    let connector = Arc::new(MockConnector::new());
    let (supervisor, _events) = create_supervisor(&connector, Duration::from_secs(1), 5);
    supervisor.start(URL).await.unwrap();

    connector.current().unwrap().sever();
    wait_for_state(&supervisor, ConnectionState::Reconnecting).await;

    for i in 0..3u8 {
        assert_eq!(
            supervisor.send(Bytes::from(vec![i])).await,
            SendOutcome::Dropped(DropReason::NotConnected)
        );
    }
    assert!(connector.sent_binaries().is_empty());

    wait_for_state(&supervisor, ConnectionState::Connected).await;
    assert!(supervisor.send(Bytes::from_static(&[9])).await.is_sent());

    // Nothing buffered during the outage is replayed
    assert_eq!(connector.sent_binaries(), vec![Bytes::from_static(&[9])]);
    assert_eq!(supervisor.stats().payloads_dropped, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_coalesce_into_one_reconnect() {
    let connector = Arc::new(MockConnector::new());
    let (supervisor, _events) = create_supervisor(&connector, Duration::from_millis(50), 5);
    let supervisor = Arc::new(supervisor);
    supervisor.start(URL).await.unwrap();

    let transport = connector.current().unwrap();
    transport.set_fail_sends(true);

    // Eight failing sends, a severed socket and a reachability hint all released at once
    let barrier = Arc::new(tokio::sync::Barrier::new(10));
    let mut handles = Vec::new();
    for i in 0..8u8 {
        let supervisor = Arc::clone(&supervisor);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            supervisor.send(Bytes::from(vec![i])).await;
        }));
    }
    {
        let transport = Arc::clone(&transport);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            transport.sever();
        }));
    }
    {
        let supervisor = Arc::clone(&supervisor);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            supervisor.network_path_changed(true);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    tokio::time::timeout(
        Duration::from_secs(5),
        wait_for_state(&supervisor, ConnectionState::Connected),
    )
    .await
    .unwrap();
    sleep(Duration::from_millis(300)).await;

    assert_eq!(supervisor.stats().reconnect_attempts, 1);
    assert_eq!(connector.attempts(), 2);
    assert_eq!(supervisor.active_generation(), Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_saturated_delay_reported_as_max_millis() {
    let connector = Arc::new(MockConnector::new());
    connector.set_reachable(false);
    let (supervisor, mut events) = create_supervisor(&connector, Duration::MAX, 5);

    supervisor.start(URL).await.unwrap();
    sleep(Duration::from_millis(1)).await;

    assert_eq!(scheduled_delays(&mut events), vec![u64::MAX]);
    supervisor.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_reachability_hint_skips_remaining_delay() {
    let connector = Arc::new(MockConnector::new());
    let (supervisor, _events) = create_supervisor(&connector, Duration::from_secs(10), 5);
    supervisor.start(URL).await.unwrap();

    connector.current().unwrap().sever();
    wait_for_state(&supervisor, ConnectionState::Reconnecting).await;

    let hinted_at = Instant::now();
    supervisor.network_path_changed(true);
    wait_for_state(&supervisor, ConnectionState::Connected).await;

    assert!(hinted_at.elapsed() < Duration::from_secs(10));
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_hint_during_connect_does_not_shorten_next_backoff() {
    let connector = Arc::new(MockConnector::new());
    let (supervisor, _events) = create_supervisor(&connector, Duration::from_secs(10), 5);
    supervisor.start(URL).await.unwrap();
    connector.set_connect_delay(Duration::from_secs(1));

    connector.current().unwrap().sever();
    wait_for_state(&supervisor, ConnectionState::Reconnecting).await;
    sleep(Duration::from_millis(1)).await;

    // First hint ends the delay; the second lands while the connect is still pending
    supervisor.network_path_changed(true);
    sleep(Duration::from_millis(500)).await;
    supervisor.network_path_changed(true);
    wait_for_state(&supervisor, ConnectionState::Connected).await;
    assert_eq!(connector.attempts(), 2);

    let severed_at = Instant::now();
    connector.current().unwrap().sever();
    wait_for_state(&supervisor, ConnectionState::Reconnecting).await;
    wait_for_state(&supervisor, ConnectionState::Connected).await;

    assert!(severed_at.elapsed() >= Duration::from_secs(10));
    assert_eq!(connector.attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_reachability_hint_ignored_when_given_up() {
    let connector = Arc::new(MockConnector::new());
    connector.set_reachable(false);
    let (supervisor, _events) = create_supervisor(&connector, Duration::from_secs(1), 1);

    supervisor.start(URL).await.unwrap();
    wait_for_state(&supervisor, ConnectionState::GivenUp).await;
    let attempts = connector.attempts();

    connector.set_reachable(true);
    supervisor.network_path_changed(true);
    sleep(Duration::from_secs(60)).await;

    assert_eq!(supervisor.state(), ConnectionState::GivenUp);
    assert_eq!(connector.attempts(), attempts);

    // A fresh start recovers
    supervisor.start(URL).await.unwrap();
    assert_eq!(supervisor.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_reachability_hint_ignored_when_disconnected() {
    let connector = Arc::new(MockConnector::new());
    let (supervisor, _events) = create_supervisor(&connector, Duration::from_secs(1), 5);

    supervisor.network_path_changed(true);
    sleep(Duration::from_secs(5)).await;

    assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_endpoint_is_not_retried() {
    let connector = Arc::new(MockConnector::new());
    let (supervisor, _events) = create_supervisor(&connector, Duration::from_secs(1), 5);

    let err = supervisor.start("localhost:8080").await.unwrap_err();
    assert!(matches!(err, TransportError::InvalidEndpoint { .. }));

    sleep(Duration::from_secs(60)).await;
    assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_failure_triggers_reconnect() {
    let connector = Arc::new(MockConnector::new());
    let (supervisor, _events) = create_supervisor(&connector, Duration::from_secs(1), 5);
    supervisor.start(URL).await.unwrap();

    let first = connector.current().unwrap();
    sleep(Duration::from_secs(61)).await;
    assert_eq!(first.ping_count(), 2);
    assert_eq!(supervisor.state(), ConnectionState::Connected);

    first.set_fail_pings(true);
    wait_for_state(&supervisor, ConnectionState::Reconnecting).await;
    wait_for_state(&supervisor, ConnectionState::Connected).await;

    assert_eq!(first.ping_count(), 3);
    assert!(!first.is_connected());
    assert_eq!(supervisor.active_generation(), Some(2));
    assert_eq!(supervisor.stats().pings_sent, 2);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_closes_and_stops_reconnecting() {
    let connector = Arc::new(MockConnector::new());
    let (supervisor, _events) = create_supervisor(&connector, Duration::from_secs(1), 5);
    supervisor.start(URL).await.unwrap();
    let transport = connector.current().unwrap();

    supervisor.disconnect().await;

    assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    assert_eq!(transport.close_count(), 1);
    assert_eq!(
        supervisor.send(Bytes::from_static(b"late")).await,
        SendOutcome::Dropped(DropReason::NotConnected)
    );
    assert_eq!(
        supervisor.send_control("STOP_RECORDING").await,
        SendOutcome::Dropped(DropReason::NotConnected)
    );

    sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts(), 1);
    assert!(connector.sent_texts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    let connector = Arc::new(MockConnector::new());
    connector.set_reachable(false);
    let (supervisor, _events) = create_supervisor(&connector, Duration::from_secs(1), 5);

    supervisor.start(URL).await.unwrap();
    assert_eq!(supervisor.state(), ConnectionState::Reconnecting);

    supervisor.disconnect().await;
    sleep(Duration::from_secs(60)).await;

    assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_send_control_publishes_event() {
    let connector = Arc::new(MockConnector::new());
    let (supervisor, mut events) = create_supervisor(&connector, Duration::from_secs(1), 5);
    supervisor.start(URL).await.unwrap();

    assert!(supervisor.send_control("STOP_RECORDING").await.is_sent());
    assert_eq!(connector.sent_texts(), vec!["STOP_RECORDING".to_string()]);

    let mut sent = false;
    while let Ok(event) = events.try_recv() {
        if event == (StreamEvent::ControlSent {
            token: "STOP_RECORDING".to_string(),
        }) {
            sent = true;
        }
    }
    assert!(sent);
}
