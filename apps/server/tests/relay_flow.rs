//! End-to-end relay scenarios over loopback sockets: a real tunnel client
//! speaking the wire protocol through tokio-tungstenite, real HTTP callers
//! through reqwest.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use relay_common::{Message, TunnelResponse};
use relay_server::config::ServerConfig;
use relay_server::{AppState, router};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_tungstenite::tungstenite::Message as WsMessage;

type Channel = WebSocketStream<MaybeTlsStream<TcpStream>>;

const HOSTNAME: &str = "tunnel.example.com";
const SECRET: &str = "s3cret";

async fn spawn_relay(request_timeout: Duration) -> (SocketAddr, AppState) {
    let config = ServerConfig {
        hostname: HOSTNAME.to_string(),
        secrets: HashSet::from([SECRET.to_string()]),
        port: 0,
        request_timeout,
    };
    let state = AppState::new(config);
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

async fn connect(addr: SocketAddr, secret: &str, subdomain: Option<&str>) -> (Channel, Message) {
    let (mut channel, _) = connect_async(format!("ws://{addr}/relay")).await.unwrap();

    let auth = Message::Auth {
        secret: secret.to_string(),
        subdomain: subdomain.map(str::to_string),
    };
    channel
        .send(WsMessage::Text(auth.encode().unwrap().into()))
        .await
        .unwrap();

    let reply = next_message(&mut channel)
        .await
        .expect("server must answer auth");
    (channel, reply)
}

async fn next_message(channel: &mut Channel) -> Option<Message> {
    while let Some(frame) = channel.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => return Some(Message::decode(&text).unwrap()),
            Ok(WsMessage::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

async fn send_response(channel: &mut Channel, response: TunnelResponse) {
    channel
        .send(WsMessage::Text(
            Message::Response(response).encode().unwrap().into(),
        ))
        .await
        .unwrap();
}

/// HTTP client whose DNS pins `<host>` to the relay's loopback address
fn http_client(host: &str, addr: SocketAddr) -> reqwest::Client {
    reqwest::Client::builder()
        .resolve(host, addr)
        .build()
        .unwrap()
}

fn tunnel_url(subdomain: &str, addr: SocketAddr, path: &str) -> String {
    format!("http://{subdomain}.{HOSTNAME}:{}{path}", addr.port())
}

#[tokio::test]
async fn full_relay_loop() {
    let (addr, _state) = spawn_relay(Duration::from_secs(30)).await;

    let (mut channel, reply) = connect(addr, SECRET, None).await;
    let (subdomain, url) = match reply {
        Message::Ready { subdomain, url } => (subdomain, url),
        other => panic!("expected ready, got {other:?}"),
    };
    assert_eq!(subdomain.split('-').count(), 3);
    assert_eq!(url, format!("https://{subdomain}.{HOSTNAME}"));

    let host = format!("{subdomain}.{HOSTNAME}");
    let client = http_client(&host, addr);
    let request_url = tunnel_url(&subdomain, addr, "/");
    let caller = tokio::spawn(async move { client.get(request_url).send().await.unwrap() });

    let request = match next_message(&mut channel).await {
        Some(Message::Request(request)) => request,
        other => panic!("expected request, got {other:?}"),
    };
    assert_eq!(request.method, "GET");
    assert_eq!(request.path, "/");
    assert!(!request.has_body());

    let mut response = TunnelResponse::new(request.id.clone(), 200).with_body(b"hello");
    response
        .headers
        .insert("content-type".to_string(), vec!["text/plain".to_string()]);
    send_response(&mut channel, response).await;

    let reply = caller.await.unwrap();
    assert_eq!(reply.status(), 200);
    assert_eq!(reply.text().await.unwrap(), "hello");
}

#[tokio::test]
async fn out_of_order_responses_route_to_their_callers() {
    let (addr, _state) = spawn_relay(Duration::from_secs(30)).await;

    let (mut channel, reply) = connect(addr, SECRET, Some("ordered")).await;
    assert!(matches!(reply, Message::Ready { .. }));

    let host = format!("ordered.{HOSTNAME}");
    let first_url = tunnel_url("ordered", addr, "/first");
    let second_url = tunnel_url("ordered", addr, "/second");

    let client = http_client(&host, addr);
    let first_client = client.clone();
    let first = tokio::spawn(async move { first_client.get(first_url).send().await.unwrap() });
    let second = tokio::spawn(async move { client.get(second_url).send().await.unwrap() });

    let mut pending = Vec::new();
    for _ in 0..2 {
        match next_message(&mut channel).await {
            Some(Message::Request(request)) => pending.push(request),
            other => panic!("expected request, got {other:?}"),
        }
    }
    assert_ne!(pending[0].id, pending[1].id);

    // Answer in reverse order of arrival; each body names its path
    for request in pending.iter().rev() {
        let body = format!("answered {}", request.path);
        send_response(
            &mut channel,
            TunnelResponse::new(request.id.clone(), 200).with_body(body.as_bytes()),
        )
        .await;
    }

    let first = first.await.unwrap();
    assert_eq!(first.text().await.unwrap(), "answered /first");
    let second = second.await.unwrap();
    assert_eq!(second.text().await.unwrap(), "answered /second");
}

#[tokio::test]
async fn unanswered_request_times_out_and_late_response_is_dropped() {
    let (addr, state) = spawn_relay(Duration::from_millis(200)).await;

    let (mut channel, reply) = connect(addr, SECRET, Some("sleepy")).await;
    assert!(matches!(reply, Message::Ready { .. }));

    let host = format!("sleepy.{HOSTNAME}");
    let client = http_client(&host, addr);
    let reply = client
        .get(tunnel_url("sleepy", addr, "/slow"))
        .send()
        .await
        .unwrap();

    // The client never answered, so the caller sees the deadline
    assert_eq!(reply.status(), 504);
    assert_eq!(reply.text().await.unwrap(), "Gateway timeout");
    assert_eq!(state.correlator.pending_count(), 0);

    // The request frame did arrive; a late answer must be dropped silently
    let request = match next_message(&mut channel).await {
        Some(Message::Request(request)) => request,
        other => panic!("expected request, got {other:?}"),
    };
    send_response(
        &mut channel,
        TunnelResponse::new(request.id, 200).with_body(b"too late"),
    )
    .await;

    // The channel survives the late response and keeps serving
    let caller = {
        let client = client.clone();
        let url = tunnel_url("sleepy", addr, "/again");
        tokio::spawn(async move { client.get(url).send().await.unwrap() })
    };
    let request = match next_message(&mut channel).await {
        Some(Message::Request(request)) => request,
        other => panic!("expected request, got {other:?}"),
    };
    send_response(
        &mut channel,
        TunnelResponse::new(request.id, 200).with_body(b"still here"),
    )
    .await;
    assert_eq!(caller.await.unwrap().text().await.unwrap(), "still here");
}

#[tokio::test]
async fn duplicate_subdomain_is_rejected_without_touching_existing_tunnel() {
    let (addr, state) = spawn_relay(Duration::from_secs(30)).await;

    let (mut original, reply) = connect(addr, SECRET, Some("myapp")).await;
    assert!(matches!(reply, Message::Ready { .. }));

    let (mut duplicate, reply) = connect(addr, SECRET, Some("myapp")).await;
    match reply {
        Message::Error { message } => {
            assert!(message.contains("Subdomain 'myapp' is already in use"));
        }
        other => panic!("expected error, got {other:?}"),
    }
    // Terminal: the server closes the duplicate channel
    assert!(next_message(&mut duplicate).await.is_none());
    assert_eq!(state.registry.count(), 1);

    // The original tunnel still serves traffic
    let host = format!("myapp.{HOSTNAME}");
    let client = http_client(&host, addr);
    let caller = {
        let url = tunnel_url("myapp", addr, "/");
        tokio::spawn(async move { client.get(url).send().await.unwrap() })
    };
    let request = match next_message(&mut original).await {
        Some(Message::Request(request)) => request,
        other => panic!("expected request, got {other:?}"),
    };
    send_response(
        &mut original,
        TunnelResponse::new(request.id, 200).with_body(b"unaffected"),
    )
    .await;
    assert_eq!(caller.await.unwrap().text().await.unwrap(), "unaffected");
}

#[tokio::test]
async fn invalid_secret_is_rejected() {
    let (addr, state) = spawn_relay(Duration::from_secs(30)).await;

    let (mut channel, reply) = connect(addr, "wrong", None).await;
    match reply {
        Message::Error { message } => assert_eq!(message, "Invalid secret"),
        other => panic!("expected error, got {other:?}"),
    }
    assert!(next_message(&mut channel).await.is_none());
    assert_eq!(state.registry.count(), 0);
}

#[tokio::test]
async fn invalid_subdomain_is_rejected() {
    let (addr, _state) = spawn_relay(Duration::from_secs(30)).await;

    let (_channel, reply) = connect(addr, SECRET, Some("My App!")).await;
    match reply {
        Message::Error { message } => {
            assert!(message.contains("Invalid subdomain format"));
        }
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn health_probe_reports_active_relays() {
    let (addr, _state) = spawn_relay(Duration::from_secs(30)).await;

    let (_channel, reply) = connect(addr, SECRET, Some("counted")).await;
    assert!(matches!(reply, Message::Ready { .. }));

    let client = http_client(HOSTNAME, addr);
    let reply = client
        .get(format!("http://{HOSTNAME}:{}/", addr.port()))
        .send()
        .await
        .unwrap();
    assert_eq!(reply.status(), 200);

    let body: serde_json::Value = reply.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["activeRelays"], 1);
    assert_eq!(body["hostname"], HOSTNAME);
}

#[tokio::test]
async fn unknown_subdomain_is_not_found() {
    let (addr, _state) = spawn_relay(Duration::from_secs(30)).await;

    let host = format!("ghost-ghost-ghost.{HOSTNAME}");
    let client = http_client(&host, addr);
    let reply = client
        .get(tunnel_url("ghost-ghost-ghost", addr, "/"))
        .send()
        .await
        .unwrap();

    assert_eq!(reply.status(), 404);
    assert_eq!(reply.text().await.unwrap(), "Relay not found or disconnected");
}

#[tokio::test]
async fn closed_channel_yields_not_found_after_release() {
    let (addr, state) = spawn_relay(Duration::from_secs(30)).await;

    let (channel, reply) = connect(addr, SECRET, Some("gone")).await;
    assert!(matches!(reply, Message::Ready { .. }));
    drop(channel);

    // Wait for the server side to notice the close and release the key
    for _ in 0..50 {
        if state.registry.count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(state.registry.count(), 0);

    let host = format!("gone.{HOSTNAME}");
    let client = http_client(&host, addr);
    let reply = client
        .get(tunnel_url("gone", addr, "/"))
        .send()
        .await
        .unwrap();
    assert_eq!(reply.status(), 404);
}

#[tokio::test]
async fn post_body_survives_the_round_trip() {
    let (addr, _state) = spawn_relay(Duration::from_secs(30)).await;

    let (mut channel, reply) = connect(addr, SECRET, Some("binary")).await;
    assert!(matches!(reply, Message::Ready { .. }));

    let payload: Vec<u8> = (0..=255).collect();
    let host = format!("binary.{HOSTNAME}");
    let client = http_client(&host, addr);
    let caller = {
        let url = tunnel_url("binary", addr, "/upload?kind=raw");
        let payload = payload.clone();
        tokio::spawn(async move { client.post(url).body(payload).send().await.unwrap() })
    };

    let request = match next_message(&mut channel).await {
        Some(Message::Request(request)) => request,
        other => panic!("expected request, got {other:?}"),
    };
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/upload?kind=raw");
    assert_eq!(request.body_bytes().unwrap(), payload);

    send_response(
        &mut channel,
        TunnelResponse::new(request.id, 200).with_body(&payload),
    )
    .await;

    let reply = caller.await.unwrap();
    assert_eq!(reply.bytes().await.unwrap().to_vec(), payload);
}
