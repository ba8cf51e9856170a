use std::pin::Pin;
use std::sync::Mutex;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, Stream, StreamExt};
use poweb_common::frame::Frame;
use poweb_common::signer::{Certificate, NonceSigner, SignaturePurpose};
use poweb_common::types::{
    PARCEL_COLLECTION_PATH, STREAMING_MODE_CLOSE_UPON_COMPLETION, STREAMING_MODE_HEADER,
    STREAMING_MODE_KEEP_ALIVE,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, sleep, sleep_until, Instant, Interval};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, warn};

use crate::error::PowebError;
use crate::transport::{Transport, WsStream};

/// Interval between outbound WebSocket pings, keeping NAT bindings alive
/// and giving the read deadline regular traffic to observe.
const PING_INTERVAL: Duration = Duration::from_secs(5);
/// Delay before reconnecting after an abrupt disconnection.
const ABRUPT_DISCONNECT_DELAY: Duration = Duration::from_secs(3);
/// Delay before reconnecting after a read timeout or a server-reported
/// internal error.
const TRANSIENT_FAILURE_DELAY: Duration = Duration::from_millis(500);

type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;
type CollectionSender = mpsc::Sender<Result<ParcelCollection, PowebError>>;

/// How the gateway should behave once it has delivered the parcels
/// queued at connection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamingMode {
    /// Hold the connection open indefinitely, pushing parcels as they
    /// arrive. The engine reconnects on transient failures.
    #[default]
    KeepAlive,
    /// Deliver the queued parcels and close. The engine never reconnects.
    CloseUponCompletion,
}

impl StreamingMode {
    /// The value sent in the streaming-mode request header.
    #[must_use]
    pub const fn header_value(self) -> &'static str {
        match self {
            Self::KeepAlive => STREAMING_MODE_KEEP_ALIVE,
            Self::CloseUponCompletion => STREAMING_MODE_CLOSE_UPON_COMPLETION,
        }
    }
}

/// One parcel delivered by the gateway, pending acknowledgement.
///
/// The engine does not read further frames until this handle is resolved:
/// call [`ParcelCollection::ack`] once the parcel is safely stored, or
/// drop the handle to decline. An unacknowledged parcel may be
/// redelivered on a later session.
#[derive(Debug)]
pub struct ParcelCollection {
    parcel_serialized: Vec<u8>,
    trusted_certificates: Vec<Certificate>,
    disposition: Mutex<Option<oneshot::Sender<()>>>,
}

impl ParcelCollection {
    /// The serialised parcel, never interpreted by the client.
    #[must_use]
    pub fn parcel_serialized(&self) -> &[u8] {
        &self.parcel_serialized
    }

    /// The certificates of the signers supplied to
    /// [`collect_parcels`](crate::PowebClient::collect_parcels), in call
    /// order. Parcels delivered on this session are trusted under these.
    #[must_use]
    pub fn trusted_certificates(&self) -> &[Certificate] {
        &self.trusted_certificates
    }

    /// Acknowledges receipt, letting the gateway delete its copy.
    ///
    /// At most one acknowledgement reaches the wire no matter how many
    /// times this is called, and only while the session is open.
    pub fn ack(&self) {
        let sender = self.disposition.lock().ok().and_then(|mut slot| slot.take());
        if let Some(tx) = sender {
            let _ = tx.send(());
        }
    }
}

/// Lazy sequence of parcels collected from the gateway.
///
/// The engine only starts (and only opens the WebSocket) once the stream
/// is first polled. Dropping the stream cancels the session: the engine
/// closes the socket with a NORMAL status and stops emitting.
#[derive(Debug)]
pub struct ParcelCollectionStream {
    state: StreamState,
}

#[derive(Debug)]
enum StreamState {
    Idle(Option<EngineParams>),
    Running(mpsc::Receiver<Result<ParcelCollection, PowebError>>),
    Terminated,
}

#[derive(Debug)]
struct EngineParams {
    transport: Transport,
    signers: Vec<NonceSigner>,
    mode: StreamingMode,
    trusted_certificates: Vec<Certificate>,
    read_timeout: Duration,
}

impl Stream for ParcelCollectionStream {
    type Item = Result<ParcelCollection, PowebError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match &mut self.state {
                StreamState::Idle(params) => {
                    // Capacity 1: the engine can buffer one emission, and
                    // reads no further frames until it is consumed.
                    let (tx, rx) = mpsc::channel(1);
                    if let Some(params) = params.take() {
                        tokio::spawn(run_engine(params, tx));
                    }
                    self.state = StreamState::Running(rx);
                }
                StreamState::Running(rx) => {
                    return match ready!(rx.poll_recv(cx)) {
                        Some(item) => Poll::Ready(Some(item)),
                        None => {
                            self.state = StreamState::Terminated;
                            Poll::Ready(None)
                        }
                    };
                }
                StreamState::Terminated => return Poll::Ready(None),
            }
        }
    }
}

/// Entry point used by [`PowebClient`](crate::PowebClient).
pub(crate) fn collect_parcels(
    transport: Transport,
    signers: Vec<NonceSigner>,
    mode: StreamingMode,
) -> Result<ParcelCollectionStream, PowebError> {
    if signers.is_empty() {
        return Err(PowebError::NonceSigner(
            "At least one nonce signer must be specified",
        ));
    }
    let trusted_certificates = signers.iter().map(|s| s.certificate().clone()).collect();
    let read_timeout = transport.config().keepalive_read_timeout();
    Ok(ParcelCollectionStream {
        state: StreamState::Idle(Some(EngineParams {
            transport,
            signers,
            mode,
            trusted_certificates,
            read_timeout,
        })),
    })
}

async fn run_engine(params: EngineParams, tx: CollectionSender) {
    if let Err(e) = run_sessions(&params, &tx).await {
        // Best-effort: the consumer may already be gone.
        let _ = tx.send(Err(e)).await;
    }
}

/// Outer control loop: runs sessions until one ends for good, feeding
/// only the retryable causes back into a reconnect.
async fn run_sessions(params: &EngineParams, tx: &CollectionSender) -> Result<(), PowebError> {
    loop {
        match run_session(params, tx).await {
            Ok(()) => return Ok(()),
            Err(SessionError::Fatal(e)) => return Err(e),
            Err(SessionError::Transient { delay, cause }) => {
                debug!(
                    cause,
                    delay_ms = delay.as_millis() as u64,
                    "reconnecting to the gateway"
                );
                tokio::select! {
                    () = sleep(delay) => {}
                    () = tx.closed() => return Ok(()),
                }
            }
        }
    }
}

enum SessionError {
    /// Terminates the sequence; surfaced to the consumer.
    Fatal(PowebError),
    /// Retryable in keep-alive mode; sessions only report this when the
    /// mode allows a reconnect.
    Transient {
        delay: Duration,
        cause: &'static str,
    },
}

enum Control {
    Continue,
    Stop,
}

/// One connection's worth of the session state machine: connect,
/// handshake, then stream deliveries until the channel closes.
async fn run_session(params: &EngineParams, tx: &CollectionSender) -> Result<(), SessionError> {
    let ws = params
        .transport
        .ws_connect(
            PARCEL_COLLECTION_PATH,
            &[(STREAMING_MODE_HEADER, params.mode.header_value())],
        )
        .await
        .map_err(SessionError::Fatal)?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let Some(nonce) = await_challenge(&mut ws_tx, &mut ws_rx, tx).await? else {
        return Ok(()); // cancelled during the handshake
    };

    let signatures = params
        .signers
        .iter()
        .map(|signer| signer.sign(&nonce, SignaturePurpose::Handshake))
        .collect();
    ws_tx
        .send(Message::Binary(Frame::response(signatures).serialize()))
        .await
        .map_err(|e| {
            SessionError::Fatal(PowebError::ServerConnection(format!(
                "Failed to send handshake response: {e}"
            )))
        })?;
    debug!(signers = params.signers.len(), "handshake complete");

    streaming_loop(params, tx, &mut ws_tx, &mut ws_rx).await
}

/// Waits for the gateway's challenge. Returns `None` if the consumer
/// cancelled while waiting.
async fn await_challenge(
    ws_tx: &mut WsSink,
    ws_rx: &mut WsSource,
    tx: &CollectionSender,
) -> Result<Option<Vec<u8>>, SessionError> {
    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = tx.closed() => {
                close_session(ws_tx, CloseCode::Normal, "").await;
                return Ok(None);
            }
        };
        match msg {
            Some(Ok(Message::Binary(data))) => match Frame::parse(&data) {
                Ok(Frame::Challenge { nonce }) => return Ok(Some(nonce)),
                Ok(_) | Err(_) => return Err(invalid_challenge(ws_tx).await),
            },
            Some(Ok(Message::Text(_))) => return Err(invalid_challenge(ws_tx).await),
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
            Some(Ok(Message::Close(_))) | None => {
                return Err(SessionError::Fatal(PowebError::ServerConnection(
                    "Server closed the connection during the handshake".to_string(),
                )));
            }
            Some(Err(e)) => return Err(handshake_read_error(&e)),
        }
    }
}

async fn invalid_challenge(ws_tx: &mut WsSink) -> SessionError {
    warn!("received an invalid handshake challenge");
    close_session(ws_tx, CloseCode::Policy, "").await;
    SessionError::Fatal(PowebError::ServerBinding(
        "Server sent an invalid handshake challenge".to_string(),
    ))
}

fn handshake_read_error(e: &WsError) -> SessionError {
    match e {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            SessionError::Fatal(PowebError::ServerConnection(
                "Server closed the connection during the handshake".to_string(),
            ))
        }
        other => SessionError::Fatal(PowebError::ServerConnection(format!(
            "Connection error during the handshake: {other}"
        ))),
    }
}

/// STREAMING state: emit deliveries, forward acknowledgements, watch for
/// cancellation, and classify whatever ends the connection.
async fn streaming_loop(
    params: &EngineParams,
    tx: &CollectionSender,
    ws_tx: &mut WsSink,
    ws_rx: &mut WsSource,
) -> Result<(), SessionError> {
    let mode = params.mode;
    let mut ping = interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);
    let mut read_deadline = Instant::now() + params.read_timeout;

    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = tx.closed() => {
                debug!("consumer cancelled the collection");
                close_session(ws_tx, CloseCode::Normal, "").await;
                return Ok(());
            }
            _ = ping.tick() => {
                send_ping(ws_tx).await;
                continue;
            }
            () = sleep_until(read_deadline), if mode == StreamingMode::KeepAlive => {
                return Err(SessionError::Transient {
                    delay: TRANSIENT_FAILURE_DELAY,
                    cause: "read timed out",
                });
            }
        };
        read_deadline = Instant::now() + params.read_timeout;

        match msg {
            Some(Ok(Message::Binary(data))) => match Frame::parse(&data) {
                Ok(Frame::ParcelDelivery {
                    delivery_id,
                    parcel,
                }) => match emit(params, tx, ws_tx, &mut ping, delivery_id, parcel).await? {
                    Control::Continue => {
                        // The consumer may have held the collection for a
                        // while; silence starts counting from here.
                        read_deadline = Instant::now() + params.read_timeout;
                    }
                    Control::Stop => return Ok(()),
                },
                Ok(_) | Err(_) => return Err(invalid_delivery(ws_tx).await),
            },
            Some(Ok(Message::Text(_))) => return Err(invalid_delivery(ws_tx).await),
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
            Some(Ok(Message::Close(frame))) => return session_closed(frame, mode),
            Some(Err(e)) => {
                debug!(error = %e, "collection connection failed");
                return Err(connection_interrupted(mode));
            }
            None => return Err(connection_interrupted(mode)),
        }
    }
}

/// Emits one collection and waits for the consumer to resolve it. The
/// wait is what guarantees an acknowledgement reaches the wire before a
/// queued server close is processed.
async fn emit(
    params: &EngineParams,
    tx: &CollectionSender,
    ws_tx: &mut WsSink,
    ping: &mut Interval,
    delivery_id: String,
    parcel: Vec<u8>,
) -> Result<Control, SessionError> {
    let (done_tx, mut done_rx) = oneshot::channel();
    let collection = ParcelCollection {
        parcel_serialized: parcel,
        trusted_certificates: params.trusted_certificates.clone(),
        disposition: Mutex::new(Some(done_tx)),
    };
    if tx.send(Ok(collection)).await.is_err() {
        close_session(ws_tx, CloseCode::Normal, "").await;
        return Ok(Control::Stop);
    }

    loop {
        tokio::select! {
            biased;
            outcome = &mut done_rx => {
                if outcome.is_ok() {
                    ws_tx.send(Message::Text(delivery_id)).await.map_err(|e| {
                        SessionError::Fatal(PowebError::ServerConnection(format!(
                            "Failed to acknowledge parcel delivery: {e}"
                        )))
                    })?;
                }
                return Ok(Control::Continue);
            }
            () = tx.closed() => {
                debug!("consumer cancelled the collection");
                close_session(ws_tx, CloseCode::Normal, "").await;
                return Ok(Control::Stop);
            }
            _ = ping.tick() => send_ping(ws_tx).await,
        }
    }
}

async fn invalid_delivery(ws_tx: &mut WsSink) -> SessionError {
    warn!("received an invalid message on the collection socket");
    close_session(ws_tx, CloseCode::Policy, "Invalid parcel delivery").await;
    SessionError::Fatal(PowebError::ServerBinding(
        "Received invalid message from server".to_string(),
    ))
}

/// CLOSED state: classify the server's close frame.
fn session_closed(frame: Option<CloseFrame<'_>>, mode: StreamingMode) -> Result<(), SessionError> {
    let (code, reason) = match frame {
        Some(f) => (f.code, f.reason.into_owned()),
        // No status code: treat as a clean shutdown.
        None => (CloseCode::Normal, String::new()),
    };
    if code == CloseCode::Normal {
        return Ok(());
    }
    if mode == StreamingMode::KeepAlive && code == CloseCode::Error {
        return Err(SessionError::Transient {
            delay: TRANSIENT_FAILURE_DELAY,
            cause: "server reported an internal error",
        });
    }
    Err(SessionError::Fatal(PowebError::ServerConnection(format!(
        "Server closed the connection unexpectedly (code: {}, reason: {})",
        u16::from(code),
        reason
    ))))
}

fn connection_interrupted(mode: StreamingMode) -> SessionError {
    match mode {
        StreamingMode::KeepAlive => SessionError::Transient {
            delay: ABRUPT_DISCONNECT_DELAY,
            cause: "connection interrupted",
        },
        StreamingMode::CloseUponCompletion => SessionError::Fatal(PowebError::ServerConnection(
            "Connection with the server was interrupted".to_string(),
        )),
    }
}

async fn close_session(ws_tx: &mut WsSink, code: CloseCode, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    if let Err(e) = ws_tx.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "failed to send close frame");
    }
}

async fn send_ping(ws_tx: &mut WsSink) {
    if let Err(e) = ws_tx.send(Message::Ping(Vec::new())).await {
        debug!(error = %e, "failed to send ping");
    }
}
