use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};
use url::Url;

use crate::audio::capture::FrameSink;
use crate::audio::pcm::WireBlob;
use crate::config::LiveSettings;
use crate::error::AssistantError;
use crate::protocol::{LiveServerMessage, RealtimeInputMessage, ServerContent, SetupMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Errored,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Errored)
    }
}

#[derive(Debug)]
pub enum LinkEvent {
    /// Setup acknowledged; frames may flow.
    Opened,
    Content(ServerContent),
    /// Transport failure. Always the last event of the session.
    Errored(AssistantError),
    /// Local or remote close. Always the last event of the session.
    Closed,
}

#[derive(Debug)]
pub struct SessionEvent {
    pub session: u64,
    pub kind: LinkEvent,
}

enum LinkCommand {
    Frame(WireBlob),
    Close,
}

/// Handle to one live voice session.
///
/// Frames go through a single FIFO that the link only starts draining once
/// the service acknowledged setup, so early frames wait instead of being
/// dropped and the wire order is the submission order.
#[derive(Clone)]
pub struct LiveSession {
    id: u64,
    commands: mpsc::UnboundedSender<LinkCommand>,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl LiveSession {
    /// Start connecting in the background. Lifecycle events are delivered on
    /// `events`, tagged with `id`.
    pub fn open(
        settings: LiveSettings,
        api_key: String,
        id: u64,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        let (commands, rx_cmd) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let state = Arc::new(state);

        let link = LiveLink {
            id,
            settings,
            api_key,
            rx_cmd,
            events,
            state: state.clone(),
        };
        tokio::spawn(link.run());

        Self { id, commands, state }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Queue one frame. Valid from the moment the handle exists until
    /// `close()`; frames queued while connecting are sent after setup.
    pub fn send(&self, blob: WireBlob) -> Result<(), AssistantError> {
        if self.state().is_terminal() {
            return Err(AssistantError::SessionClosed);
        }
        self.commands
            .send(LinkCommand::Frame(blob))
            .map_err(|_| AssistantError::SessionClosed)
    }

    /// Request shutdown. Frames already queued are flushed first. Repeated
    /// calls are no-ops and nothing here can fail the caller.
    pub fn close(&self) {
        let first = self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = ConnectionState::Closed;
                true
            }
        });
        if !first {
            return;
        }
        log::info!("Closing voice session {}", self.id);
        if self.commands.send(LinkCommand::Close).is_err() {
            log::debug!("Voice session {} link already finished", self.id);
        }
    }
}

impl FrameSink for LiveSession {
    fn submit(&self, blob: WireBlob) -> bool {
        self.send(blob).is_ok()
    }
}

enum Frame {
    Server(LiveServerMessage),
    Close(Option<CloseFrame>),
    Skip,
}

fn parse_server(raw: &[u8]) -> Frame {
    match serde_json::from_slice::<LiveServerMessage>(raw) {
        Ok(msg) => Frame::Server(msg),
        Err(e) => {
            log::warn!("Ignoring unparseable server frame: {}", e);
            Frame::Skip
        }
    }
}

fn decode_frame(msg: Message) -> Frame {
    match msg {
        Message::Text(text) => parse_server(text.as_bytes()),
        Message::Binary(data) => parse_server(&data),
        Message::Close(frame) => Frame::Close(frame),
        _ => Frame::Skip,
    }
}

/// A remote close is a normal end unless the service is rejecting the key.
fn close_outcome(frame: Option<CloseFrame>) -> Result<(), AssistantError> {
    if let Some(frame) = frame {
        let reason: &str = &frame.reason;
        if reason.to_ascii_lowercase().contains("api key") {
            return Err(AssistantError::Credential(reason.to_string()));
        }
        log::info!(
            "Server closed voice session: code={}, reason={}",
            u16::from(frame.code),
            reason
        );
    }
    Ok(())
}

fn transport_error(e: tungstenite::Error) -> AssistantError {
    match e {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            if matches!(status.as_u16(), 401 | 403) {
                AssistantError::Credential(format!("handshake rejected: {}", status))
            } else {
                AssistantError::Transport(format!("handshake failed: {}", status))
            }
        }
        other => AssistantError::Transport(other.to_string()),
    }
}

fn encode_error(e: serde_json::Error) -> AssistantError {
    AssistantError::Transport(format!("failed to encode message: {}", e))
}

struct LiveLink {
    id: u64,
    settings: LiveSettings,
    api_key: String,
    rx_cmd: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::Sender<SessionEvent>,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl LiveLink {
    async fn run(mut self) {
        let kind = match self.connect_and_loop().await {
            Ok(()) => {
                self.state.send_replace(ConnectionState::Closed);
                LinkEvent::Closed
            }
            Err(e) if *self.state.borrow() == ConnectionState::Closed => {
                log::debug!("Voice session {} ended after close: {}", self.id, e);
                LinkEvent::Closed
            }
            Err(e) => {
                log::error!("Voice session {} failed: {}", self.id, e);
                self.state.send_replace(ConnectionState::Errored);
                LinkEvent::Errored(e)
            }
        };
        self.emit(kind).await;
    }

    async fn emit(&self, kind: LinkEvent) {
        let event = SessionEvent {
            session: self.id,
            kind,
        };
        if self.events.send(event).await.is_err() {
            log::debug!("Voice session {} event receiver dropped", self.id);
        }
    }

    async fn connect_and_loop(&mut self) -> Result<(), AssistantError> {
        // close() while still connecting abandons the attempt
        let mut state_rx = self.state.subscribe();
        let ws = tokio::select! {
            ws = self.handshake() => ws?,
            _ = state_rx.wait_for(|s| *s == ConnectionState::Closed) => {
                log::info!("Voice session {} closed before it opened", self.id);
                return Ok(());
            }
        };

        let opened = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Open;
                true
            } else {
                false
            }
        });
        if !opened {
            return Ok(());
        }
        log::info!("Voice session {} open", self.id);
        self.emit(LinkEvent::Opened).await;

        let (mut write, mut read) = ws.split();
        let mut frames_sent = 0u64;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(msg)) => match decode_frame(msg) {
                            Frame::Server(msg) => {
                                if let Some(goaway) = msg.go_away {
                                    log::warn!("Server asked to end voice session soon: {}", goaway);
                                }
                                if let Some(content) = msg.server_content {
                                    self.emit(LinkEvent::Content(content)).await;
                                }
                            }
                            Frame::Close(frame) => return close_outcome(frame),
                            Frame::Skip => {}
                        },
                        Some(Err(e)) => return Err(transport_error(e)),
                        None => return Ok(()),
                    }
                }
                cmd = self.rx_cmd.recv() => {
                    match cmd {
                        Some(LinkCommand::Frame(blob)) => {
                            let text = serde_json::to_string(&RealtimeInputMessage::new(&blob))
                                .map_err(encode_error)?;
                            write.send(Message::Text(text.into())).await.map_err(transport_error)?;
                            frames_sent += 1;
                        }
                        Some(LinkCommand::Close) | None => {
                            log::info!("Voice session {} closing after {} frames", self.id, frames_sent);
                            if let Err(e) = write.send(Message::Close(None)).await {
                                log::debug!("Close frame not delivered: {}", e);
                            }
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Connect, send setup and wait for the acknowledgement.
    async fn handshake(&self) -> Result<WsStream, AssistantError> {
        let url = Url::parse_with_params(&self.settings.url, &[("key", self.api_key.as_str())])
            .map_err(|e| AssistantError::Transport(format!("invalid live url: {}", e)))?;

        log::info!("Connecting voice session {} to {}...", self.id, self.settings.url);
        let (mut ws, _) = connect_async(url.as_str()).await.map_err(transport_error)?;

        let setup = serde_json::to_string(&SetupMessage::new(&self.settings)).map_err(encode_error)?;
        ws.send(Message::Text(setup.into())).await.map_err(transport_error)?;

        loop {
            let msg = match ws.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Err(transport_error(e)),
                None => {
                    return Err(AssistantError::Transport(
                        "connection ended during setup".into(),
                    ));
                }
            };
            match decode_frame(msg) {
                Frame::Server(msg) if msg.setup_complete.is_some() => return Ok(ws),
                Frame::Server(_) | Frame::Skip => {}
                Frame::Close(frame) => {
                    close_outcome(frame)?;
                    return Err(AssistantError::Transport(
                        "server closed the session during setup".into(),
                    ));
                }
            }
        }
    }
}
