#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use ed25519_dalek::SigningKey;
use futures_util::{SinkExt, StreamExt};
use poweb::{GatewayConfig, PowebClient};
use poweb_common::frame::Frame;
use poweb_common::signer::{Certificate, NonceSigner};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

pub type ServerWs = WebSocketStream<TcpStream>;

/// Headers of one accepted collection-socket connection.
#[derive(Debug)]
pub struct ConnectionInfo {
    pub path: String,
    pub streaming_mode: Option<String>,
}

/// What the scripted gateway observed from the client.
#[derive(Debug, PartialEq, Eq)]
pub enum ServerEvent {
    Handshake(Vec<Vec<u8>>),
    Ack(String),
    Close(Option<(u16, String)>),
}

pub fn test_signer(seed: u8) -> NonceSigner {
    NonceSigner::new(
        Certificate::from_der(vec![seed; 12]),
        SigningKey::from_bytes(&[seed; 32]),
    )
}

pub fn client_for(addr: SocketAddr) -> PowebClient {
    PowebClient::new(GatewayConfig::new("127.0.0.1", addr.port(), false)).unwrap()
}

pub fn client_with_read_timeout(addr: SocketAddr, timeout: Duration) -> PowebClient {
    let config =
        GatewayConfig::new("127.0.0.1", addr.port(), false).with_keepalive_read_timeout(timeout);
    PowebClient::new(config).unwrap()
}

/// Starts a scripted WebSocket gateway on an ephemeral port. The handler
/// runs once per accepted connection, with the connection index as its
/// first argument; request headers are reported through the returned
/// channel.
pub async fn spawn_ws_gateway<F, Fut>(
    mut handler: F,
) -> (SocketAddr, mpsc::UnboundedReceiver<ConnectionInfo>)
where
    F: FnMut(u32, ServerWs) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (info_tx, info_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut connection_index = 0u32;
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let info_tx = info_tx.clone();
            let accepted = tokio_tungstenite::accept_hdr_async(
                stream,
                move |req: &Request, resp: Response| {
                    let _ = info_tx.send(ConnectionInfo {
                        path: req.uri().path().to_string(),
                        streaming_mode: req
                            .headers()
                            .get("X-Relaynet-Streaming-Mode")
                            .and_then(|v| v.to_str().ok())
                            .map(String::from),
                    });
                    Ok(resp)
                },
            )
            .await;
            let Ok(ws) = accepted else {
                continue;
            };
            handler(connection_index, ws).await;
            connection_index += 1;
        }
    });

    (addr, info_rx)
}

pub async fn send_frame(ws: &mut ServerWs, frame: &Frame) {
    ws.send(Message::Binary(frame.serialize()))
        .await
        .expect("failed to send frame to the client");
}

pub async fn close_with(ws: &mut ServerWs, code: CloseCode, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    ws.send(Message::Close(Some(frame)))
        .await
        .expect("failed to send close frame to the client");
}

/// Receives the next client message, skipping transport pings and pongs.
/// Returns `None` on timeout or connection end.
pub async fn recv_msg_timeout(ws: &mut ServerWs, limit: Duration) -> Option<Message> {
    tokio::time::timeout(limit, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(msg)) => return Some(msg),
                _ => return None,
            }
        }
    })
    .await
    .unwrap_or(None)
}

pub async fn recv_msg(ws: &mut ServerWs) -> Message {
    recv_msg_timeout(ws, Duration::from_secs(5))
        .await
        .expect("timed out waiting for a client message")
}

/// Receives and decodes the client's handshake response.
pub async fn recv_response(ws: &mut ServerWs) -> Vec<Vec<u8>> {
    match recv_msg(ws).await {
        Message::Binary(data) => match Frame::parse(&data).expect("undecodable client frame") {
            Frame::Response { signatures } => signatures,
            other => panic!("expected a response frame, got type {}", other.frame_type()),
        },
        other => panic!("expected a binary frame, got {other:?}"),
    }
}

/// Receives the client's close frame as `(code, reason)`.
pub async fn recv_close(ws: &mut ServerWs) -> Option<(u16, String)> {
    match recv_msg(ws).await {
        Message::Close(frame) => frame.map(|f| (u16::from(f.code), f.reason.into_owned())),
        other => panic!("expected a close frame, got {other:?}"),
    }
}

/// Consumes remaining client messages until the connection ends.
pub async fn drain(ws: &mut ServerWs) {
    while recv_msg_timeout(ws, Duration::from_secs(2)).await.is_some() {}
}

/// Starts an HTTP gateway double on an ephemeral port.
pub async fn spawn_http_gateway(router: axum::Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}
