// Integration tests for WebsocketClient against an in-process WebSocket server.
//
// The fake server accepts one connection, records every text frame the
// client sends, optionally answers each request with an `ack`, and pushes
// whatever frames the test hands it.
#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use weatherflow_api::{
    ConnectionState, DeviceId, Error, InvalidFrame, MessageKind, Request, WebsocketClient,
    WebsocketConfig, WebsocketMessage, WindDirection,
};

const DEVICE: &str = "211522";
const WAIT: Duration = Duration::from_secs(2);

// ── Fake server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckMode {
    Echo,
    Withhold,
}

enum Command {
    Push(String),
    Close,
    CloseWith(u16, &'static str),
}

struct FakeServer {
    url: String,
    received: mpsc::UnboundedReceiver<Value>,
    commands: mpsc::UnboundedSender<Command>,
}

impl FakeServer {
    async fn start(mode: AckMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (commands, mut command_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (mut write, mut read) = ws.split();

            let hello = json!({"type": "connection_opened"}).to_string();
            if write.send(Message::text(hello)).await.is_err() {
                return;
            }

            loop {
                tokio::select! {
                    command = command_rx.recv() => match command {
                        Some(Command::Push(text)) => {
                            if write.send(Message::text(text)).await.is_err() {
                                break;
                            }
                        }
                        Some(Command::Close) | None => {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                        Some(Command::CloseWith(code, reason)) => {
                            let frame = CloseFrame {
                                code: CloseCode::from(code),
                                reason: reason.into(),
                            };
                            let _ = write.send(Message::Close(Some(frame))).await;
                            break;
                        }
                    },
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            let value: Value = serde_json::from_str(text.as_str()).unwrap();
                            if mode == AckMode::Echo {
                                if let Some(id) = value.get("id").and_then(Value::as_str) {
                                    let ack = json!({"type": "ack", "id": id}).to_string();
                                    let _ = write.send(Message::text(ack)).await;
                                }
                            }
                            let _ = received_tx.send(value);
                        }
                        Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                }
            }
        });

        Self {
            url: format!("ws://{addr}/swd/data"),
            received,
            commands,
        }
    }

    fn push(&self, frame: impl Into<String>) {
        self.commands.send(Command::Push(frame.into())).unwrap();
    }

    fn close(&self) {
        self.commands.send(Command::Close).unwrap();
    }

    fn close_with(&self, code: u16, reason: &'static str) {
        self.commands.send(Command::CloseWith(code, reason)).unwrap();
    }

    /// Next frame the client sent.
    async fn next_frame(&mut self) -> Value {
        tokio::time::timeout(WAIT, self.received.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("server task ended")
    }

    /// Every remaining frame, until the connection ends.
    async fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Some(frame) = tokio::time::timeout(WAIT, self.received.recv())
            .await
            .expect("server did not see the connection end")
        {
            frames.push(frame);
        }
        frames
    }
}

/// Completes the upgrade, then never reads again: the client's socket
/// buffers fill and writes stall.
async fn stalled_server() -> (String, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let peer = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(ws);
    });
    (format!("ws://{addr}/swd/data"), peer)
}

/// A text frame far larger than the loopback socket buffers.
fn oversized_frame() -> String {
    "x".repeat(64 << 20)
}

fn device() -> DeviceId {
    DEVICE.parse().unwrap()
}

fn config(server: &FakeServer) -> WebsocketConfig {
    WebsocketConfig::new("test-token")
        .with_endpoint(server.url.clone())
        .with_device(device())
        .with_close_step_timeout(Duration::from_millis(500))
        .with_join_timeout(Duration::from_secs(1))
}

async fn connected(server: &FakeServer) -> WebsocketClient {
    let client = WebsocketClient::new(config(server)).unwrap();
    client.connect().await.unwrap();
    client
}

// ── Acknowledgements ────────────────────────────────────────────────

#[tokio::test]
async fn listen_start_is_acknowledged() {
    let mut server = FakeServer::start(AckMode::Echo).await;
    let client = connected(&server).await;
    assert!(client.is_connected());
    assert!(client.is_listening());

    let request = Request::listen_start(device());
    let ack = client
        .send_and_await_ack(&request, Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(ack.id, request.id());

    let frame = server.next_frame().await;
    assert_eq!(frame["type"], "listen_start");
    assert_eq!(frame["device_id"], 211_522);
    assert_eq!(frame["id"], request.id());

    client.close().await;
}

#[tokio::test]
async fn withheld_ack_times_out_and_frees_the_slot() {
    let mut server = FakeServer::start(AckMode::Withhold).await;
    let client = connected(&server).await;

    let request = Request::listen_start(device());
    let err = client
        .send_and_await_ack(&request, Some(Duration::from_millis(200)))
        .await
        .unwrap_err();
    match err {
        Error::AckTimeout {
            request_id,
            timeout_ms,
        } => {
            assert_eq!(request_id, request.id());
            assert_eq!(timeout_ms, 200);
        }
        other => panic!("expected AckTimeout, got {other:?}"),
    }
    // The frame itself went out.
    assert_eq!(server.next_frame().await["id"], request.id());
    assert!(client.is_connected());

    // A later correlated send is not blocked by the expired one.
    let err = client
        .send_and_await_ack(&Request::rapid_wind_start(device()), Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    client.close().await;
}

#[tokio::test]
async fn concurrent_correlated_send_is_rejected() {
    let mut server = FakeServer::start(AckMode::Withhold).await;
    let client = connected(&server).await;

    let first = Request::listen_start(device());
    let first_id = first.id().to_owned();
    let waiter = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .send_and_await_ack(&first, Some(Duration::from_secs(1)))
                .await
        })
    };
    server.next_frame().await;

    let err = client
        .send_and_await_ack(&Request::rapid_wind_start(device()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AckInFlight { ref request_id } if *request_id == first_id));

    server.push(json!({"type": "ack", "id": first_id}).to_string());
    let ack = waiter.await.unwrap().unwrap();
    assert_eq!(ack.id, first_id);

    client.close().await;
}

#[tokio::test]
async fn pending_ack_is_abandoned_when_the_server_goes_away() {
    let mut server = FakeServer::start(AckMode::Withhold).await;
    let client = connected(&server).await;

    let waiter = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .send_and_await_ack(&Request::listen_start(device()), Some(Duration::from_secs(5)))
                .await
        })
    };
    server.next_frame().await;
    server.close();

    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::AckAbandoned { .. }));
}

// ── Dispatch ────────────────────────────────────────────────────────

#[tokio::test]
async fn rapid_wind_reaches_its_handler() {
    let server = FakeServer::start(AckMode::Echo).await;
    let client = connected(&server).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on(MessageKind::RapidWind, move |message| {
        let _ = tx.send(message);
    });

    server.push(r#"{"type":"rapid_wind","device_id":211522,"ob":[1709130791,2.3,180]}"#);

    let message = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    let WebsocketMessage::RapidWind(wind) = message else {
        panic!("expected rapid_wind, got {message:?}");
    };
    assert_eq!(wind.device_id, device());
    assert_eq!(wind.ob.epoch, 1_709_130_791);
    assert_eq!(wind.ob.wind_speed_meters_per_second, 2.3);
    assert_eq!(wind.ob.wind_direction_degrees, 180.0);
    assert_eq!(wind.ob.wind_direction_cardinal, WindDirection::S);
    assert_eq!(client.latest_rapid_wind(), Some(wind));

    client.close().await;
}

#[tokio::test]
async fn async_handlers_are_awaited() {
    let server = FakeServer::start(AckMode::Echo).await;
    let client = connected(&server).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on_async(MessageKind::RainStart, move |message| {
        let tx = tx.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = tx.send(message.device_id());
        }
    });

    server.push(r#"{"type":"evt_precip","device_id":211522,"source":"enhanced","evt":[1493322445]}"#);

    let device_id = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(device_id, Some(device()));

    client.close().await;
}

#[tokio::test]
async fn invalid_frames_do_not_stop_the_loop() {
    let server = FakeServer::start(AckMode::Echo).await;
    let client = connected(&server).await;

    let (invalid_tx, mut invalid_rx) = mpsc::unbounded_channel::<InvalidFrame>();
    client.on_invalid(move |frame| {
        let _ = invalid_tx.send(frame);
    });
    let (wind_tx, mut wind_rx) = mpsc::unbounded_channel();
    client.on(MessageKind::RapidWind, move |message| {
        let _ = wind_tx.send(message);
    });

    let bogus = r#"{"type":"bogus","device_id":1}"#;
    server.push(bogus);
    server.push("not json at all");
    server.push(r#"{"type":"rapid_wind","device_id":211522,"ob":[1709130791,2.3,180]}"#);

    let first = tokio::time::timeout(WAIT, invalid_rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.raw, bogus);
    assert!(first.reason.contains("bogus"));

    let second = tokio::time::timeout(WAIT, invalid_rx.recv()).await.unwrap().unwrap();
    assert_eq!(second.raw, "not json at all");

    let wind = tokio::time::timeout(WAIT, wind_rx.recv()).await.unwrap().unwrap();
    assert_eq!(wind.kind(), MessageKind::RapidWind);
    assert!(client.is_listening());

    client.close().await;
}

#[tokio::test]
async fn replaced_handler_is_not_called() {
    let server = FakeServer::start(AckMode::Echo).await;
    let client = connected(&server).await;

    let stale = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&stale);
    client.on(MessageKind::RainStart, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on(MessageKind::RainStart, move |message| {
        let _ = tx.send(message);
    });

    server.push(r#"{"type":"evt_precip","device_id":211522,"evt":[1493322445]}"#);
    tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(stale.load(Ordering::SeqCst), 0);

    client.close().await;
}

#[tokio::test]
async fn observations_fill_the_last_seen_cache() {
    let server = FakeServer::start(AckMode::Echo).await;
    let client = connected(&server).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on(MessageKind::ObservationTempest, move |message| {
        let _ = tx.send(message);
    });

    let frame = json!({
        "type": "obs_st",
        "device_id": 211_522,
        "source": "cache",
        "serial_number": "ST-00000512",
        "hub_sn": "HB-00013030",
        "firmware_revision": 129,
        "summary": {"pressure_trend": "steady", "strike_count_1h": 0, "feels_like": 11.2},
        "obs": [[1_709_130_791, 0.0, 0.45, 1.16, 249, 3, 1012.3, 11.2, 77, 0, 0.0, 0, 0.0, 0, 0, 0, 2.66, 1, 0.0, null, null, 0]],
    });
    server.push(frame.to_string());
    tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();

    let latest = client.latest_observation().unwrap();
    let tempest = latest.as_tempest().unwrap();
    let row = tempest.first().unwrap();
    assert_eq!(row.pressure, Some(1012.3));
    assert_eq!(row.nc_rain_accumulation, None);
    assert_eq!(tempest.summary.pressure_trend.as_deref(), Some("steady"));
    assert!(client.time_since_last_observation().is_some());

    client.close().await;
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn subscribe_all_starts_both_streams() {
    let mut server = FakeServer::start(AckMode::Echo).await;
    let client = connected(&server).await;

    client.subscribe_all().await.unwrap();

    let first = server.next_frame().await;
    let second = server.next_frame().await;
    assert_eq!(first["type"], "listen_start");
    assert_eq!(second["type"], "listen_rapid_start");
    assert_eq!(second["device_id"], 211_522);

    client.close().await;
}

#[tokio::test]
async fn close_is_idempotent_and_stops_once() {
    let mut server = FakeServer::start(AckMode::Withhold).await;
    let client = connected(&server).await;
    let mut state = client.connection_state();

    tokio::join!(client.close(), client.close());
    client.close().await;

    let frames = server.drain().await;
    let types: Vec<&str> = frames.iter().filter_map(|f| f["type"].as_str()).collect();
    assert_eq!(types, vec!["listen_stop", "listen_rapid_stop"]);
    assert!(frames.iter().all(|f| f["device_id"] == 211_522));

    assert!(client.is_closed());
    assert!(!client.is_connected());
    assert!(!client.is_listening());
    assert_eq!(*state.borrow_and_update(), ConnectionState::Closed);

    let err = client.send(&Request::listen_start(device())).await.unwrap_err();
    assert!(matches!(err, Error::NotConnected));
    assert!(matches!(client.connect().await, Err(Error::Closed)));
}

#[tokio::test]
async fn close_can_confirm_unsubscription() {
    let mut server = FakeServer::start(AckMode::Echo).await;
    let client = WebsocketClient::new(config(&server).with_confirm_unsubscribe(true)).unwrap();
    client.connect().await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on(MessageKind::Acknowledgement, move |message| {
        let _ = tx.send(message);
    });

    tokio::time::timeout(WAIT, client.close()).await.unwrap();

    let frames = server.drain().await;
    assert_eq!(frames.len(), 2);
    // Both acks were consumed by the correlator, not the handler.
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn server_close_marks_the_client_disconnected() {
    let server = FakeServer::start(AckMode::Echo).await;
    let client = connected(&server).await;
    let mut state = client.connection_state();

    server.close();
    tokio::time::timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Disconnected))
        .await
        .unwrap()
        .unwrap();

    assert!(!client.is_connected());
    assert!(!client.is_listening());
    let err = client.send(&Request::listen_start(device())).await.unwrap_err();
    assert!(matches!(err, Error::NotConnected));

    client.close().await;
    assert_eq!(*client.connection_state().borrow(), ConnectionState::Closed);
}

#[tokio::test]
async fn connect_twice_is_rejected() {
    let server = FakeServer::start(AckMode::Echo).await;
    let client = connected(&server).await;

    assert!(matches!(client.connect().await, Err(Error::AlreadyConnected)));
    client.close().await;
}

#[tokio::test]
async fn connect_failure_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = WebsocketConfig::new("test-token")
        .with_endpoint(format!("ws://{addr}/swd/data"))
        .with_connect_timeout(Duration::from_secs(1));
    let client = WebsocketClient::new(config).unwrap();

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, Error::WebSocketConnect(_)));
    assert!(!err.to_string().contains("test-token"));
    assert_eq!(*client.connection_state().borrow(), ConnectionState::Disconnected);
}

// ── Bounded teardown ────────────────────────────────────────────────

#[tokio::test]
async fn unconfirmed_unsubscription_does_not_stall_close() {
    let mut server = FakeServer::start(AckMode::Withhold).await;
    let step = Duration::from_millis(200);
    let client = WebsocketClient::new(
        config(&server)
            .with_confirm_unsubscribe(true)
            .with_close_step_timeout(step)
            .with_join_timeout(step),
    )
    .unwrap();
    client.connect().await.unwrap();

    let started = Instant::now();
    tokio::time::timeout(WAIT, client.close()).await.unwrap();
    let elapsed = started.elapsed();

    // Each stop request waits out its own step bound, then teardown moves on.
    assert!(elapsed >= step * 2, "close returned after {elapsed:?}");
    assert!(elapsed < step * 3 + Duration::from_secs(1), "close took {elapsed:?}");
    assert_eq!(*client.connection_state().borrow(), ConnectionState::Closed);
    assert!(!client.is_listening());

    let frames = server.drain().await;
    let types: Vec<&str> = frames.iter().filter_map(|f| f["type"].as_str()).collect();
    assert_eq!(types, vec!["listen_stop", "listen_rapid_stop"]);
}

#[tokio::test]
async fn close_finishes_while_a_write_is_stalled() {
    let (url, peer) = stalled_server().await;
    let step = Duration::from_millis(300);
    let client = WebsocketClient::new(
        WebsocketConfig::new("test-token")
            .with_endpoint(url)
            .with_device(device())
            .with_close_step_timeout(step)
            .with_join_timeout(step)
            .with_send_timeout(Duration::from_secs(60)),
    )
    .unwrap();
    client.connect().await.unwrap();

    let writer = client.clone();
    let stalled = tokio::spawn(async move { writer.send_raw(oversized_frame()).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!stalled.is_finished(), "the peer should not be draining the socket");

    let started = Instant::now();
    tokio::time::timeout(Duration::from_secs(5), client.close())
        .await
        .expect("close() must finish within its step bounds");
    assert!(started.elapsed() < Duration::from_secs(3), "close took {:?}", started.elapsed());
    assert_eq!(*client.connection_state().borrow(), ConnectionState::Closed);
    assert!(!client.is_listening());
    assert!(!client.is_connected());

    stalled.abort();
    peer.abort();
}

#[tokio::test]
async fn stalled_write_times_out() {
    let (url, peer) = stalled_server().await;
    let bound = Duration::from_millis(300);
    let client = WebsocketClient::new(
        WebsocketConfig::new("test-token")
            .with_endpoint(url)
            .with_send_timeout(bound)
            .with_close_step_timeout(bound)
            .with_join_timeout(bound),
    )
    .unwrap();
    client.connect().await.unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), client.send_raw(oversized_frame()))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, Error::SendTimeout { timeout_ms: 300 }), "{err:?}");
    assert!(err.is_timeout());

    tokio::time::timeout(Duration::from_secs(5), client.close()).await.unwrap();
    assert_eq!(*client.connection_state().borrow(), ConnectionState::Closed);
    peer.abort();
}

#[tokio::test]
async fn close_during_handshake_refuses_the_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let peer = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        while let Some(Ok(_)) = ws.next().await {}
    });

    let step = Duration::from_millis(100);
    let client = WebsocketClient::new(
        WebsocketConfig::new("test-token")
            .with_endpoint(format!("ws://{addr}/swd/data"))
            .with_device(device())
            .with_close_step_timeout(step)
            .with_join_timeout(step),
    )
    .unwrap();
    let mut state = client.connection_state();

    let connecting = {
        let client = client.clone();
        tokio::spawn(async move { client.connect().await })
    };
    tokio::time::timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Connecting))
        .await
        .unwrap()
        .unwrap();

    tokio::time::timeout(WAIT, client.close()).await.unwrap();
    assert_eq!(*client.connection_state().borrow(), ConnectionState::Closed);

    let result = tokio::time::timeout(WAIT, connecting).await.unwrap().unwrap();
    assert!(matches!(result, Err(Error::Closed)), "{result:?}");
    assert_eq!(*client.connection_state().borrow(), ConnectionState::Closed);
    assert!(!client.is_connected());
    assert!(!client.is_listening());

    peer.abort();
}

// ── Server close ────────────────────────────────────────────────────

#[tokio::test]
async fn server_close_frame_is_reported_to_senders() {
    let server = FakeServer::start(AckMode::Echo).await;
    let client = connected(&server).await;
    let mut state = client.connection_state();

    server.close_with(1008, "token revoked");
    tokio::time::timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Disconnected))
        .await
        .unwrap()
        .unwrap();

    let err = client.send(&Request::listen_start(device())).await.unwrap_err();
    assert!(err.is_disconnected());
    match err {
        Error::WebSocketClosed { code, reason } => {
            assert_eq!(code, 1008);
            assert_eq!(reason, "token revoked");
        }
        other => panic!("expected WebSocketClosed, got {other:?}"),
    }

    let err = client
        .send_and_await_ack(&Request::rapid_wind_start(device()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::WebSocketClosed { code: 1008, .. }));

    // Once closed locally, the client reports that instead.
    client.close().await;
    let err = client.send(&Request::listen_start(device())).await.unwrap_err();
    assert!(matches!(err, Error::NotConnected));
}
