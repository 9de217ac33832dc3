//! End-to-end scenarios driving `StompClient` against a scripted transport.

use stomp_events_client::transport::mock::MockTransport;
use stomp_events_client::{ClientResult, StompClient};
use tokio::sync::oneshot;
use tokio::time::{timeout, Duration};

async fn recv(rx: oneshot::Receiver<ClientResult>) -> ClientResult {
    timeout(Duration::from_secs(1), rx)
        .await
        .expect("callback did not fire in time")
        .expect("callback sender dropped")
}

#[tokio::test]
async fn handshake_succeeds_on_connected_frame() {
    let transport = MockTransport::new("stomp.example.com")
        .push_message(&b"CONNECTED\nversion:1.2\n\n\0"[..]);

    let (connected_tx, connected_rx) = oneshot::channel();
    let (disconnected_tx, _disconnected_rx) = oneshot::channel();

    let _client = StompClient::connect(
        transport,
        "alice",
        "secret",
        move |result| {
            let _ = connected_tx.send(result);
        },
        move |result| {
            let _ = disconnected_tx.send(result);
        },
    );

    assert_eq!(recv(connected_rx).await, ClientResult::Ok);
}

#[tokio::test]
async fn authentication_failure_disconnects_without_connecting() {
    // The server drops the link instead of sending CONNECTED.
    let transport = MockTransport::new("stomp.example.com").push_eof();

    let (connected_tx, mut connected_rx) = oneshot::channel();
    let (disconnected_tx, disconnected_rx) = oneshot::channel();

    let _client = StompClient::connect(
        transport,
        "alice",
        "wrong-password",
        move |result| {
            let _ = connected_tx.send(result);
        },
        move |result| {
            let _ = disconnected_tx.send(result);
        },
    );

    assert_eq!(
        recv(disconnected_rx).await,
        ClientResult::WebSocketServerDisconnected
    );
    // on_connected must never fire on this path.
    assert!(connected_rx.try_recv().is_err());
}

#[tokio::test]
async fn subscribe_receives_receipt_for_its_own_id() {
    // The mock answers any SUBSCRIBE it sees with a RECEIPT carrying the
    // same id back, exactly as a real server would.
    let transport = MockTransport::new("stomp.example.com")
        .push_message(&b"CONNECTED\nversion:1.2\n\n\0"[..]);

    let (connected_tx, connected_rx) = oneshot::channel();
    let (disconnected_tx, _disconnected_rx) = oneshot::channel();

    let client = StompClient::connect(
        transport,
        "alice",
        "secret",
        move |result| {
            let _ = connected_tx.send(result);
        },
        move |result| {
            let _ = disconnected_tx.send(result);
        },
    );
    assert_eq!(recv(connected_rx).await, ClientResult::Ok);

    let (subscribed_tx, subscribed_rx) = oneshot::channel();

    let sid = client.subscribe(
        "/topic/events",
        move |result, sid| {
            let _ = subscribed_tx.send((result, sid));
        },
        |_result, _body| {},
    );

    let (subscribed_result, receipted_sid) = timeout(Duration::from_secs(1), subscribed_rx)
        .await
        .expect("on_subscribed did not fire in time")
        .expect("on_subscribed sender dropped");
    assert_eq!(subscribed_result, ClientResult::Ok);
    assert_eq!(receipted_sid, sid);
}

#[tokio::test]
async fn close_after_failed_connect_still_reports_error() {
    let transport = MockTransport::new("stomp.example.com").fail_connect();

    let (connected_tx, connected_rx) = oneshot::channel();
    let (disconnected_tx, _disconnected_rx) = oneshot::channel();

    let client = StompClient::connect(
        transport,
        "alice",
        "secret",
        move |result| {
            let _ = connected_tx.send(result);
        },
        move |result| {
            let _ = disconnected_tx.send(result);
        },
    );
    assert_eq!(
        recv(connected_rx).await,
        ClientResult::ErrorConnectingWebSocket
    );

    let (closed_tx, closed_rx) = oneshot::channel();
    client.close(move |result| {
        let _ = closed_tx.send(result);
    });

    assert_eq!(recv(closed_rx).await, ClientResult::ErrorNotConnected);
}

#[tokio::test]
async fn close_when_not_connected_reports_error() {
    let transport = MockTransport::new("stomp.example.com").push_eof();

    let (connected_tx, _connected_rx) = oneshot::channel::<ClientResult>();
    let (disconnected_tx, _disconnected_rx) = oneshot::channel::<ClientResult>();

    let client = StompClient::connect(
        transport,
        "alice",
        "secret",
        move |result| {
            let _ = connected_tx.send(result);
        },
        move |result| {
            let _ = disconnected_tx.send(result);
        },
    );

    let (closed_tx, closed_rx) = oneshot::channel();
    // Fired immediately after construction, before any handshake can have
    // completed, so the client cannot be in the StompConnected state yet.
    client.close(move |result| {
        let _ = closed_tx.send(result);
    });

    assert_eq!(recv(closed_rx).await, ClientResult::ErrorNotConnected);
}
