use anyhow::{Context, Result};
use ax_api_types::{ABNORMAL_CLOSURE, NORMAL_CLOSURE};
use ax_gateway_client::{
    EventSender, Generation, ReadyState, SharedReadyState, StreamConnection, StreamConnector,
    StreamEvent, StreamEventKind,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use reqwest::cookie::{CookieStore, Jar};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use crate::Endpoints;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// How long to wait for the peer to answer our close frame.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
/// Reported when the peer closed without a status code.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Opens invoice streams over WebSocket, carrying the page's session cookies.
pub struct WsConnector {
    endpoints: Endpoints,
    jar: Arc<Jar>,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(endpoints: Endpoints, jar: Arc<Jar>, connect_timeout: Duration) -> Self {
        Self {
            endpoints,
            jar,
            connect_timeout,
        }
    }

    fn request(&self) -> Result<Request> {
        let mut request = self
            .endpoints
            .stream
            .as_str()
            .into_client_request()
            .context("invalid invoice stream request")?;
        // HttpOnly cookies are only released for http(s) URLs, so look them
        // up against the page rather than the ws:// endpoint.
        if let Some(cookies) = self.jar.cookies(&self.endpoints.page) {
            request.headers_mut().insert(COOKIE, cookies);
        }
        Ok(request)
    }
}

impl StreamConnector for WsConnector {
    fn open(&self, generation: Generation, events: EventSender) -> Result<Box<dyn StreamConnection>> {
        let request = self.request()?;
        let state = SharedReadyState::default();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        debug!(%generation, url = %self.endpoints.stream, "opening invoice stream");
        tokio::spawn(drive(
            Driver {
                generation,
                state: state.clone(),
                events,
            },
            request,
            self.connect_timeout,
            commands_rx,
        ));

        Ok(Box::new(WsConnection {
            generation,
            state,
            commands: commands_tx,
        }))
    }
}

#[derive(Debug)]
struct CloseCommand {
    code: u16,
    reason: String,
}

struct WsConnection {
    generation: Generation,
    state: SharedReadyState,
    commands: mpsc::UnboundedSender<CloseCommand>,
}

impl StreamConnection for WsConnection {
    fn generation(&self) -> Generation {
        self.generation
    }

    fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    fn close(&self, code: u16, reason: &str) {
        if matches!(self.state.get(), ReadyState::Closing | ReadyState::Closed) {
            return;
        }
        let _ = self.commands.send(CloseCommand {
            code,
            reason: reason.to_owned(),
        });
    }
}

struct Driver {
    generation: Generation,
    state: SharedReadyState,
    events: EventSender,
}

impl Driver {
    fn emit(&self, kind: StreamEventKind) {
        // The session may already be gone; nobody left to tell.
        let _ = self.events.send(StreamEvent::new(self.generation, kind));
    }

    fn finish(&self, code: u16, reason: String) {
        self.state.set(ReadyState::Closed);
        debug!(generation = %self.generation, code, %reason, "invoice stream closed");
        self.emit(StreamEventKind::Closed { code, reason });
    }
}

enum Inbound {
    Frame(Message),
    Failed(WsError),
    Ended,
    HandshakeTimeout,
}

async fn next_inbound(reader: &mut WsReader, deadline: Option<Instant>) -> Inbound {
    let item = match deadline {
        Some(deadline) => match timeout_at(deadline, reader.next()).await {
            Ok(item) => item,
            Err(_) => return Inbound::HandshakeTimeout,
        },
        None => reader.next().await,
    };
    match item {
        Some(Ok(message)) => Inbound::Frame(message),
        Some(Err(err)) => Inbound::Failed(err),
        None => Inbound::Ended,
    }
}

async fn send_close(writer: &mut WsWriter, code: u16, reason: String) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.into(),
    };
    if let Err(err) = writer.send(Message::Close(Some(frame))).await {
        debug!("failed to send close frame: {}", err);
    }
}

async fn drive(
    driver: Driver,
    request: Request,
    connect_timeout: Duration,
    mut commands: mpsc::UnboundedReceiver<CloseCommand>,
) {
    let connected = tokio::select! {
        result = timeout(connect_timeout, connect_async(request)) => result,
        _ = commands.recv() => {
            debug!(generation = %driver.generation, "invoice stream closed while connecting");
            driver.finish(ABNORMAL_CLOSURE, String::new());
            return;
        }
    };

    let stream = match connected {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(err)) => {
            driver.emit(StreamEventKind::Error(err.to_string()));
            driver.finish(ABNORMAL_CLOSURE, String::new());
            return;
        }
        Err(_) => {
            driver.emit(StreamEventKind::Error(format!(
                "connection timeout after {:?}",
                connect_timeout
            )));
            driver.finish(ABNORMAL_CLOSURE, String::new());
            return;
        }
    };

    driver.state.set(ReadyState::Open);
    driver.emit(StreamEventKind::Opened);

    let (mut writer, mut reader) = stream.split();
    let mut peer_close: Option<(u16, String)> = None;
    let mut close_deadline: Option<Instant> = None;

    loop {
        let inbound = tokio::select! {
            command = commands.recv(), if close_deadline.is_none() => {
                // A dropped handle means nobody is listening any more.
                let (code, reason) = command.map_or((NORMAL_CLOSURE, String::new()), |c| (c.code, c.reason));
                driver.state.set(ReadyState::Closing);
                send_close(&mut writer, code, reason).await;
                close_deadline = Some(Instant::now() + CLOSE_HANDSHAKE_TIMEOUT);
                continue;
            }
            inbound = next_inbound(&mut reader, close_deadline) => inbound,
        };

        match inbound {
            Inbound::Frame(Message::Text(text)) => driver.emit(StreamEventKind::Message(text)),
            Inbound::Frame(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => driver.emit(StreamEventKind::Message(text)),
                Err(_) => debug!(generation = %driver.generation, "ignoring non-UTF-8 binary frame"),
            },
            Inbound::Frame(Message::Close(frame)) => {
                driver.state.set(ReadyState::Closing);
                peer_close = Some(frame.map_or((NO_STATUS_RECEIVED, String::new()), |f| {
                    (u16::from(f.code), f.reason.into_owned())
                }));
            }
            Inbound::Frame(_) => {}
            Inbound::Failed(WsError::ConnectionClosed | WsError::AlreadyClosed) | Inbound::Ended => break,
            Inbound::Failed(err) => {
                if peer_close.is_none() {
                    driver.emit(StreamEventKind::Error(err.to_string()));
                }
                break;
            }
            Inbound::HandshakeTimeout => {
                warn!(generation = %driver.generation, "peer never answered close frame");
                break;
            }
        }
    }

    let (code, reason) = peer_close.unwrap_or((ABNORMAL_CLOSURE, String::new()));
    driver.finish(code, reason);
}
