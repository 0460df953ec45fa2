//! End-to-end tests driving both listeners over loopback sockets
//!
//! Each test boots its own bridge on ephemeral ports, then talks to it with
//! real WebSocket clients: a device client against the device endpoint and
//! dashboard clients against `/ws`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use telebridge::config::{DashboardConfig, DeviceConfig};
use telebridge::dashboard::LIVENESS_BANNER;
use telebridge::error::ErrorCode;
use telebridge::{BroadcastSink, DashboardListener, DeviceListener};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A running bridge on loopback ephemeral ports
struct Bridge {
    device_addr: SocketAddr,
    dashboard_addr: SocketAddr,
    sink: Arc<BroadcastSink>,
    device: DeviceListener,
}

/// Boot a full bridge on loopback ephemeral ports
async fn start_bridge() -> Bridge {
    let sink = Arc::new(BroadcastSink::new());

    let device = DeviceListener::new(
        DeviceConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        sink.clone(),
    );
    let (device_addr, _accept_loop) = device.start().await.unwrap();

    let dashboard_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dashboard_addr = dashboard_listener.local_addr().unwrap();
    let dashboard = DashboardListener::new(
        DashboardConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        sink.clone(),
    );
    tokio::spawn(async move {
        dashboard.serve_on(dashboard_listener).await.unwrap();
    });

    Bridge {
        device_addr,
        dashboard_addr,
        sink,
        device,
    }
}

async fn connect_device(device_addr: SocketAddr) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{}/", device_addr))
        .await
        .unwrap();
    ws
}

async fn connect_dashboard(dashboard_addr: SocketAddr, sink: &BroadcastSink) -> WsClient {
    let before = sink.subscriber_count().await;
    let (ws, _) = connect_async(format!("ws://{}/ws", dashboard_addr))
        .await
        .unwrap();
    // The server-side registration races the client handshake
    wait_for_subscribers(sink, before + 1).await;
    ws
}

async fn wait_for_subscribers(sink: &BroadcastSink, n: usize) {
    timeout(Duration::from_secs(2), async {
        while sink.subscriber_count().await != n {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber count never settled");
}

async fn wait_for_connections(device: &DeviceListener, n: usize) {
    timeout(Duration::from_secs(2), async {
        while device.connection_count() != n {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("device connection count never settled");
}

async fn send_frame(device: &mut WsClient, frame: &str) {
    device
        .send(Message::Text(frame.to_string().into()))
        .await
        .unwrap();
}

/// Read the next `update_dashboard` frame and return its `data` payload
async fn next_update(dashboard: &mut WsClient) -> Value {
    let frame = timeout(Duration::from_secs(2), async {
        loop {
            match dashboard.next().await.expect("dashboard stream ended") {
                Ok(Message::Text(text)) => break text.as_str().to_string(),
                Ok(_) => continue,
                Err(e) => panic!("dashboard stream error: {e}"),
            }
        }
    })
    .await
    .expect("no dashboard frame arrived");

    let parsed: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(parsed["event"], "update_dashboard");
    assert!(parsed["timestamp"].is_string());
    parsed["data"].clone()
}

#[tokio::test]
async fn occupied_port_aborts_startup() {
    // Hold the port so the bridge cannot have it
    let holder = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = holder.local_addr().unwrap().port();
    let sink = Arc::new(BroadcastSink::new());

    let device = DeviceListener::new(
        DeviceConfig {
            host: "127.0.0.1".to_string(),
            port,
        },
        sink.clone(),
    );
    let err = device.start().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::DeviceBindFailed);

    let dashboard = DashboardListener::new(
        DashboardConfig {
            host: "127.0.0.1".to_string(),
            port,
        },
        sink,
    );
    let err = dashboard.serve().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::DashboardBindFailed);
}

#[tokio::test]
async fn liveness_endpoint_returns_fixed_banner() {
    let bridge = start_bridge().await;

    let mut stream = TcpStream::connect(bridge.dashboard_addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains(LIVENESS_BANNER));
}

#[tokio::test]
async fn message_without_device_id_gains_remote_host() {
    let bridge = start_bridge().await;
    let mut dashboard = connect_dashboard(bridge.dashboard_addr, &bridge.sink).await;
    let mut device = connect_device(bridge.device_addr).await;

    send_frame(&mut device, r#"{"temp": 21.5}"#).await;

    let data = next_update(&mut dashboard).await;
    assert_eq!(data, json!({"temp": 21.5, "device_id": "127.0.0.1"}));
}

#[tokio::test]
async fn message_with_device_id_passes_through_verbatim() {
    let bridge = start_bridge().await;
    let mut dashboard = connect_dashboard(bridge.dashboard_addr, &bridge.sink).await;
    let mut device = connect_device(bridge.device_addr).await;

    send_frame(&mut device, r#"{"device_id": "sensor-1", "temp": 19.0}"#).await;

    let data = next_update(&mut dashboard).await;
    assert_eq!(data, json!({"device_id": "sensor-1", "temp": 19.0}));
}

#[tokio::test]
async fn malformed_frame_is_skipped_and_connection_stays_usable() {
    let bridge = start_bridge().await;
    let mut dashboard = connect_dashboard(bridge.dashboard_addr, &bridge.sink).await;
    let mut device = connect_device(bridge.device_addr).await;

    send_frame(&mut device, "not json").await;
    send_frame(&mut device, r#"{"device_id": "sensor-2", "ok": true}"#).await;

    // The malformed frame produced no broadcast; the first thing the
    // dashboard sees is the valid frame that followed it
    let data = next_update(&mut dashboard).await;
    assert_eq!(data, json!({"device_id": "sensor-2", "ok": true}));
}

#[tokio::test]
async fn every_subscriber_receives_every_broadcast() {
    let bridge = start_bridge().await;
    let mut dash1 = connect_dashboard(bridge.dashboard_addr, &bridge.sink).await;
    let mut dash2 = connect_dashboard(bridge.dashboard_addr, &bridge.sink).await;
    let mut device = connect_device(bridge.device_addr).await;

    send_frame(&mut device, r#"{"device_id": "sensor-3", "rpm": 1200}"#).await;

    let expected = json!({"device_id": "sensor-3", "rpm": 1200});
    assert_eq!(next_update(&mut dash1).await, expected);
    assert_eq!(next_update(&mut dash2).await, expected);
}

#[tokio::test]
async fn concurrent_devices_lose_nothing() {
    let bridge = start_bridge().await;
    let mut dashboard = connect_dashboard(bridge.dashboard_addr, &bridge.sink).await;
    let mut device_a = connect_device(bridge.device_addr).await;
    let mut device_b = connect_device(bridge.device_addr).await;
    wait_for_connections(&bridge.device, 2).await;

    send_frame(&mut device_a, r#"{"device_id": "alpha", "n": 1}"#).await;
    send_frame(&mut device_b, r#"{"device_id": "beta", "n": 1}"#).await;

    let first = next_update(&mut dashboard).await;
    let second = next_update(&mut dashboard).await;
    let mut ids = vec![
        first["device_id"].as_str().unwrap().to_string(),
        second["device_id"].as_str().unwrap().to_string(),
    ];
    ids.sort();
    assert_eq!(ids, ["alpha", "beta"]);
}

#[tokio::test]
async fn late_subscriber_gets_no_replay() {
    let bridge = start_bridge().await;
    let mut early = connect_dashboard(bridge.dashboard_addr, &bridge.sink).await;
    let mut device = connect_device(bridge.device_addr).await;

    send_frame(&mut device, r#"{"device_id": "s", "seq": 1}"#).await;
    assert_eq!(next_update(&mut early).await["seq"], 1);

    let mut late = connect_dashboard(bridge.dashboard_addr, &bridge.sink).await;
    send_frame(&mut device, r#"{"device_id": "s", "seq": 2}"#).await;

    // The late subscriber's first frame is the second message
    assert_eq!(next_update(&mut late).await["seq"], 2);
    assert_eq!(next_update(&mut early).await["seq"], 2);
}

#[tokio::test]
async fn departed_subscriber_does_not_break_the_broadcast() {
    let bridge = start_bridge().await;
    let leaver = connect_dashboard(bridge.dashboard_addr, &bridge.sink).await;
    let mut stayer = connect_dashboard(bridge.dashboard_addr, &bridge.sink).await;
    let mut device = connect_device(bridge.device_addr).await;

    // Drop the socket without a close handshake, then broadcast before the
    // server has necessarily noticed
    drop(leaver);
    send_frame(&mut device, r#"{"device_id": "s", "seq": 9}"#).await;

    assert_eq!(next_update(&mut stayer).await["seq"], 9);

    // The dead subscriber is eventually reaped by its disconnect event
    wait_for_subscribers(&bridge.sink, 1).await;
}

#[tokio::test]
async fn device_disconnect_leaves_listener_accepting() {
    let bridge = start_bridge().await;
    let mut dashboard = connect_dashboard(bridge.dashboard_addr, &bridge.sink).await;

    let mut first = connect_device(bridge.device_addr).await;
    wait_for_connections(&bridge.device, 1).await;
    send_frame(&mut first, r#"{"device_id": "a", "seq": 1}"#).await;
    assert_eq!(next_update(&mut dashboard).await["seq"], 1);

    first.close(None).await.unwrap();
    wait_for_connections(&bridge.device, 0).await;

    let mut second = connect_device(bridge.device_addr).await;
    wait_for_connections(&bridge.device, 1).await;
    send_frame(&mut second, r#"{"device_id": "b", "seq": 2}"#).await;
    assert_eq!(next_update(&mut dashboard).await["seq"], 2);
}
