use std::sync::Arc;

use tokio::sync::mpsc;

use crate::audio::{AudioBackend, Capture, Microphone, OutputDevice, PlaybackScheduler};
use crate::chat::ChatClient;
use crate::config::Config;
use crate::conversation::{Conversation, Role};
use crate::credentials::Credentials;
use crate::error::{AssistantError, STATUS_SELECT_KEY};
use crate::protocol::ServerContent;
use crate::session::{LinkEvent, LiveSession, SessionEvent};
use crate::ui_bridge::{UiCommand, UiUpdate};

pub const STATUS_STANDBY: &str = "Standby";
pub const STATUS_CONNECTING: &str = "Connecting...";
pub const STATUS_LISTENING: &str = "Listening...";

/// Outcome of a chat request, delivered back to the controller task.
#[derive(Debug)]
pub struct ChatReply {
    pub result: Result<String, AssistantError>,
}

/// Everything owned by one voice attempt. Dropping it releases both devices.
struct VoiceSession {
    id: u64,
    link: LiveSession,
    /// Held until the service acknowledges setup.
    microphone: Option<Box<dyn Microphone>>,
    capture: Option<Capture>,
    playback: PlaybackScheduler<Box<dyn OutputDevice>>,
    heard: String,
    spoken: String,
}

/// Owns all assistant state. Runs on a single task and handles one message
/// at a time, so playback scheduling never interleaves.
pub struct CoreController {
    config: Config,
    credentials: Credentials,
    audio: Arc<dyn AudioBackend>,
    chat: Arc<ChatClient>,
    ui_tx: mpsc::Sender<UiUpdate>,
    session_tx: mpsc::Sender<SessionEvent>,
    chat_tx: mpsc::Sender<ChatReply>,
    conversation: Conversation,
    voice: Option<VoiceSession>,
    next_session: u64,
    chat_pending: bool,
}

impl CoreController {
    pub fn new(
        config: Config,
        credentials: Credentials,
        audio: Arc<dyn AudioBackend>,
        ui_tx: mpsc::Sender<UiUpdate>,
        session_tx: mpsc::Sender<SessionEvent>,
        chat_tx: mpsc::Sender<ChatReply>,
    ) -> Self {
        let chat = Arc::new(ChatClient::new(config.chat.clone()));
        Self {
            config,
            credentials,
            audio,
            chat,
            ui_tx,
            session_tx,
            chat_tx,
            conversation: Conversation::new(),
            voice: None,
            next_session: 0,
            chat_pending: false,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn is_voice_active(&self) -> bool {
        self.voice.is_some()
    }

    async fn send_ui(&self, update: UiUpdate) {
        if let Err(e) = self.ui_tx.send(update).await {
            log::warn!("Failed to send UI update: {}", e);
        }
    }

    async fn status(&self, text: &str, active: bool, connecting: bool) {
        log::info!("Status: {}", text);
        self.send_ui(UiUpdate::status(text, active, connecting)).await;
    }

    async fn log_message(&mut self, role: Role, content: &str) {
        let message = self.conversation.push(role, content).clone();
        self.send_ui(UiUpdate::Message { message }).await;
    }

    /// Add the welcome message once a key is available.
    pub async fn greet(&mut self) {
        if !self.conversation.is_empty() || !self.credentials.has_credential().await {
            return;
        }
        let welcome = self.config.welcome_message();
        self.log_message(Role::Assistant, &welcome).await;
    }

    pub async fn handle_ui_command(&mut self, cmd: UiCommand) {
        match cmd {
            UiCommand::VoiceStart => self.start_voice().await,
            UiCommand::VoiceStop => self.stop_voice().await,
            UiCommand::Chat { text } => self.handle_chat(text).await,
            UiCommand::KeySelected { api_key } => {
                if let Some(key) = api_key {
                    self.credentials.select(key);
                }
                self.greet().await;
            }
        }
    }

    fn open_devices(&self) -> Result<(Box<dyn Microphone>, Box<dyn OutputDevice>), AssistantError> {
        let microphone = self.audio.open_microphone()?;
        let output = self.audio.open_output()?;
        Ok((microphone, output))
    }

    pub async fn start_voice(&mut self) {
        if self.voice.is_some() {
            log::debug!("Voice session already running");
            return;
        }

        let api_key = if self.credentials.has_credential().await {
            self.credentials.api_key()
        } else {
            None
        };
        let Some(api_key) = api_key else {
            self.credentials.request_credential().await;
            self.status(STATUS_SELECT_KEY, false, false).await;
            return;
        };

        let (microphone, output) = match self.open_devices() {
            Ok(devices) => devices,
            Err(e) => {
                log::error!("Cannot start voice session: {}", e);
                self.status(e.user_status(), false, false).await;
                return;
            }
        };

        log::info!(
            "Devices open: microphone {}Hz, speaker {}Hz",
            microphone.sample_rate(),
            output.sample_rate()
        );
        self.status(STATUS_CONNECTING, false, true).await;

        self.next_session += 1;
        let id = self.next_session;
        let link = LiveSession::open(
            self.config.live.clone(),
            api_key,
            id,
            self.session_tx.clone(),
        );
        self.voice = Some(VoiceSession {
            id,
            link,
            microphone: Some(microphone),
            capture: None,
            playback: PlaybackScheduler::new(output),
            heard: String::new(),
            spoken: String::new(),
        });
    }

    /// Release everything the voice session holds. Safe to call in any state.
    fn teardown(&mut self) {
        let Some(mut voice) = self.voice.take() else {
            return;
        };
        let playing = voice.playback.active_len();
        voice.playback.stop_all();
        if let Some(capture) = voice.capture.as_ref() {
            capture.halt();
        }
        log::info!(
            "Voice session {} torn down: link {:?}, {} buffers stopped",
            voice.id,
            voice.link.state(),
            playing
        );
        voice.link.close();

        // Joining the audio threads can wait on a stalled ALSA call.
        let id = voice.id;
        tokio::task::spawn_blocking(move || {
            drop(voice);
            log::debug!("Voice session {} devices released", id);
        });
    }

    pub async fn stop_voice(&mut self) {
        self.teardown();
        self.status(STATUS_STANDBY, false, false).await;
    }

    pub async fn handle_session_event(&mut self, event: SessionEvent) {
        match &self.voice {
            Some(voice) if voice.id == event.session => {}
            _ => {
                log::debug!("Ignoring event from stale voice session {}", event.session);
                return;
            }
        }

        match event.kind {
            LinkEvent::Opened => self.on_opened().await,
            LinkEvent::Content(content) => self.apply_content(content).await,
            LinkEvent::Errored(e) => {
                log::error!("Voice session error: {}", e);
                self.teardown();
                if e.is_credential() {
                    self.credentials.request_credential().await;
                }
                self.status(e.user_status(), false, false).await;
            }
            LinkEvent::Closed => self.stop_voice().await,
        }
    }

    async fn on_opened(&mut self) {
        let block_len = self.config.audio.capture_block_size;
        let Some(voice) = self.voice.as_mut() else {
            return;
        };
        let Some(microphone) = voice.microphone.take() else {
            return;
        };

        match Capture::start(microphone, block_len, voice.link.clone()) {
            Ok(capture) => {
                voice.capture = Some(capture);
                self.status(STATUS_LISTENING, true, false).await;
            }
            Err(e) => {
                log::error!("Failed to start capture: {:#}", e);
                self.teardown();
                let err = AssistantError::Capture(e.to_string());
                self.status(err.user_status(), false, false).await;
            }
        }
    }

    /// Audio, then interruption, then transcripts, then turn end. Audio that
    /// arrives together with a barge-in is silenced with the rest.
    async fn apply_content(&mut self, content: ServerContent) {
        let Some(voice) = self.voice.as_mut() else {
            return;
        };

        for payload in content.audio_payloads() {
            match voice.playback.enqueue(payload) {
                Ok(Some(scheduled)) => log::trace!(
                    "Scheduled {:.3}s of speech at {:.3}s, cursor {:.3}s",
                    scheduled.duration,
                    scheduled.start,
                    voice.playback.next_start()
                ),
                Ok(None) => {}
                Err(e) => log::warn!("Skipping audio payload: {}", e),
            }
        }

        if content.interrupted {
            voice.playback.interrupt();
        }

        let mut updates = Vec::new();
        if let Some(text) = content.input_text() {
            voice.heard.push_str(text);
            updates.push(UiUpdate::Transcript {
                role: Role::User,
                text: voice.heard.clone(),
            });
        }
        if let Some(text) = content.output_text() {
            voice.spoken.push_str(text);
            updates.push(UiUpdate::Transcript {
                role: Role::Assistant,
                text: voice.spoken.clone(),
            });
        }
        let finished = content
            .turn_complete
            .then(|| (std::mem::take(&mut voice.heard), std::mem::take(&mut voice.spoken)));

        for update in updates {
            self.send_ui(update).await;
        }
        if let Some((heard, spoken)) = finished {
            for (role, text) in [(Role::User, heard), (Role::Assistant, spoken)] {
                let text = text.trim();
                if !text.is_empty() {
                    self.log_message(role, text).await;
                }
            }
        }
    }

    /// Drop bookkeeping for buffers that finished playing.
    pub fn reap_playback(&mut self) {
        if let Some(voice) = self.voice.as_mut() {
            voice.playback.reap();
        }
    }

    pub async fn handle_chat(&mut self, text: String) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if self.chat_pending {
            log::warn!("Chat request already in flight, ignoring message");
            return;
        }

        let history = self.conversation.history();
        self.log_message(Role::User, text).await;
        self.chat_pending = true;

        let client = self.chat.clone();
        let api_key = self.credentials.api_key();
        let tx = self.chat_tx.clone();
        let message = text.to_string();
        tokio::spawn(async move {
            let result = client.reply(api_key, &message, history).await;
            if tx.send(ChatReply { result }).await.is_err() {
                log::debug!("Chat reply dropped: controller gone");
            }
        });
    }

    pub async fn handle_chat_reply(&mut self, reply: ChatReply) {
        self.chat_pending = false;
        let text = match reply.result {
            Ok(text) => text,
            Err(e) => {
                log::error!("Chat request failed: {}", e);
                if e.is_credential() {
                    self.credentials.request_credential().await;
                }
                e.user_message().to_string()
            }
        };
        self.log_message(Role::Assistant, &text).await;
    }

    pub async fn shutdown(&mut self) {
        if self.is_voice_active() {
            self.stop_voice().await;
        }
        log::info!(
            "Shutting down after {} messages",
            self.conversation().messages().len()
        );
    }
}
