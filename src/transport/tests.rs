use super::*;
use crate::error::TransportError;
use std::time::Duration;

fn endpoint() -> Endpoint {
    Endpoint::parse("ws://127.0.0.1:9").unwrap()
}

#[tokio::test]
async fn test_mock_connector_records_wire_traffic() {
    let connector = MockConnector::new();
    let transport = connector.connect(&endpoint(), 1).await.unwrap();

    assert_eq!(transport.generation(), 1);
    assert!(transport.is_connected());

    transport
        .send_binary(Bytes::from_static(&[0xFF, 0xD8]))
        .await
        .unwrap();
    transport.send_text("STOP_RECORDING").await.unwrap();

    assert_eq!(
        connector.wire(),
        vec![
            WireMessage::Binary {
                generation: 1,
                data: Bytes::from_static(&[0xFF, 0xD8]),
            },
            WireMessage::Text {
                generation: 1,
                text: "STOP_RECORDING".to_string(),
            },
        ]
    );
    assert_eq!(connector.sent_texts(), vec!["STOP_RECORDING".to_string()]);
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn test_mock_connector_scripted_failures() {
    let connector = MockConnector::new();
    connector.fail_next(2);

    assert!(connector.connect(&endpoint(), 1).await.is_err());
    assert!(connector.connect(&endpoint(), 2).await.is_err());
    assert!(connector.connect(&endpoint(), 3).await.is_ok());
    assert_eq!(connector.attempts(), 3);

    connector.set_reachable(false);
    let err = connector.connect(&endpoint(), 4).await.err().unwrap();
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_severed_transport_fails_receive_and_sends() {
    let connector = MockConnector::new();
    connector.connect(&endpoint(), 7).await.unwrap();
    let mock = connector.current().unwrap();

    mock.sever();

    let err = mock.receive_loop().await;
    assert!(matches!(err, TransportError::ReceiveFailed { .. }));
    assert!(!mock.is_connected());
    assert_eq!(
        mock.send_binary(Bytes::from_static(b"x")).await,
        Err(TransportError::Closed)
    );
    assert!(mock.ping().await.is_err());
    assert!(connector.wire().is_empty());
}

#[tokio::test]
async fn test_send_failure_disconnects_transport() {
    let connector = MockConnector::new();
    connector.connect(&endpoint(), 1).await.unwrap();
    let mock = connector.current().unwrap();

    mock.set_fail_sends(true);
    assert!(matches!(
        mock.send_text("hello").await,
        Err(TransportError::SendFailed { .. })
    ));
    assert!(!mock.is_connected());
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let connector = MockConnector::new();
    connector.connect(&endpoint(), 1).await.unwrap();
    let mock = connector.current().unwrap();

    mock.close().await;
    mock.close().await;

    assert!(!mock.is_connected());
    assert_eq!(mock.close_count(), 2);
}

#[tokio::test]
async fn test_websocket_connect_refused() {
    // Bind then drop to get a port with nothing listening
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let connector = WebSocketConnector::new(Duration::from_secs(2), Duration::from_secs(1));
    let endpoint = Endpoint::parse(&format!("ws://127.0.0.1:{}", port)).unwrap();

    let err = connector.connect(&endpoint, 1).await.err().unwrap();
    assert!(matches!(
        err,
        TransportError::ConnectFailed { .. } | TransportError::HandshakeTimeout { .. }
    ));
    assert!(err.is_recoverable());
}

#[cfg(feature = "receiver")]
#[tokio::test]
async fn test_websocket_loopback_with_receiver() {
    use crate::receiver::FrameReceiver;

    let receiver = FrameReceiver::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", receiver.local_addr());

    let connector = WebSocketConnector::new(Duration::from_secs(5), Duration::from_secs(2));
    let transport = connector
        .connect(&Endpoint::parse(&url).unwrap(), 1)
        .await
        .unwrap();

    // The pong only resolves the ping if something is reading
    let reader = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move { transport.receive_loop().await })
    };

    transport
        .send_binary(Bytes::from_static(&[0xFF, 0xD8, 0x01, 0xFF, 0xD9]))
        .await
        .unwrap();
    transport.ping().await.unwrap();
    transport.send_text("STOP_RECORDING").await.unwrap();

    for _ in 0..100 {
        if receiver.stats().stop_requests == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let stats = receiver.stats();
    assert_eq!(stats.sessions, 1);
    assert_eq!(stats.frames, 1);
    assert_eq!(stats.bytes, 5);
    assert_eq!(stats.stop_requests, 1);

    reader.abort();
    transport.close().await;
    assert!(!transport.is_connected());
    receiver.shutdown().await;
}

#[tokio::test]
async fn test_websocket_ping_fails_without_pong() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // Completes the handshake, then never reads so no pong is ever written
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ws = async_tungstenite::tokio::accept_async(stream).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let connector = WebSocketConnector::new(Duration::from_secs(5), Duration::from_millis(200));
    let endpoint = Endpoint::parse(&format!("ws://127.0.0.1:{}", port)).unwrap();
    let transport = connector.connect(&endpoint, 1).await.unwrap();

    let reader = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move { transport.receive_loop().await })
    };

    let err = transport.ping().await.err().unwrap();
    assert!(matches!(err, TransportError::PingFailed { .. }));
    assert!(!transport.is_connected());

    reader.abort();
    server.abort();
}
