//! JSON messages exchanged with the Gemini endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audio::pcm::WireBlob;
use crate::config::LiveSettings;
use crate::prompt;

// ======================== Shared content ========================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

/// One turn of text content. `role` is "user" or "model"; system
/// instructions leave it out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part { text: text.into() }],
        }
    }
}

// ======================== Live: client → server ========================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LiveGenerationConfig {
    response_modalities: Vec<String>,
    speech_config: SpeechConfig,
}

/// Empty object used to switch a feature on.
#[derive(Debug, Serialize)]
struct Enabled {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup {
    model: String,
    generation_config: LiveGenerationConfig,
    system_instruction: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<Enabled>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_audio_transcription: Option<Enabled>,
}

/// First message on a live session.
#[derive(Debug, Serialize)]
pub struct SetupMessage {
    setup: Setup,
}

impl SetupMessage {
    pub fn new(settings: &LiveSettings) -> Self {
        Self {
            setup: Setup {
                model: settings.model.clone(),
                generation_config: LiveGenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: settings.voice.clone(),
                            },
                        },
                    },
                },
                system_instruction: Content::text(
                    None,
                    prompt::voice_instruction(&settings.system_instruction),
                ),
                input_audio_transcription: settings.transcribe_input.then_some(Enabled {}),
                output_audio_transcription: settings.transcribe_output.then_some(Enabled {}),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInput<'a> {
    media_chunks: [&'a WireBlob; 1],
}

/// One microphone frame on the live session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage<'a> {
    realtime_input: RealtimeInput<'a>,
}

impl<'a> RealtimeInputMessage<'a> {
    pub fn new(blob: &'a WireBlob) -> Self {
        Self {
            realtime_input: RealtimeInput {
                media_chunks: [blob],
            },
        }
    }
}

// ======================== Live: server → client ========================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPart {
    #[serde(default)]
    pub inline_data: Option<InlineData>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<ServerPart>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

/// Every field is optional and several may arrive in the same event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
    #[serde(default)]
    pub turn_complete: bool,
}

impl ServerContent {
    /// Base64 audio payloads in part order.
    pub fn audio_payloads(&self) -> impl Iterator<Item = &str> {
        self.model_turn
            .iter()
            .flat_map(|turn| turn.parts.iter())
            .filter_map(|part| part.inline_data.as_ref())
            .filter(|data| {
                data.mime_type
                    .as_deref()
                    .is_none_or(|mime| mime.starts_with("audio/pcm"))
            })
            .map(|data| data.data.as_str())
    }

    pub fn input_text(&self) -> Option<&str> {
        self.input_transcription.as_ref()?.text.as_deref()
    }

    pub fn output_text(&self) -> Option<&str> {
        self.output_transcription.as_ref()?.text.as_deref()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveServerMessage {
    #[serde(default)]
    pub setup_complete: Option<Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<Value>,
}
