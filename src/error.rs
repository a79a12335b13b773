use thiserror::Error;

pub const STATUS_MIC_FAILED: &str = "Failed to access microphone";
pub const STATUS_ERROR: &str = "Error occurred";
pub const STATUS_SELECT_KEY: &str = "Please select an API key";

const MSG_SELECT_KEY: &str = "Please select a valid API key to continue.";
const MSG_TROUBLE: &str =
    "I'm having trouble connecting to my brain right now. Please check your connection.";

/// Failures of the capture / transport / playback pipeline and the chat path.
///
/// Every variant is caught at a component boundary and turned into a status
/// line or a chat message; none of them is allowed to leave devices open.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// Microphone denied or unavailable. Fatal to the voice attempt.
    #[error("microphone unavailable: {0}")]
    Capture(String),

    #[error("audio output unavailable: {0}")]
    Output(String),

    #[error("voice transport failed: {0}")]
    Transport(String),

    /// Malformed inbound audio. Skipped per message.
    #[error("malformed audio payload: {0}")]
    Decode(String),

    /// Missing key or the endpoint rejected it.
    #[error("credential rejected: {0}")]
    Credential(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("session is closed")]
    SessionClosed,
}

impl AssistantError {
    pub fn is_credential(&self) -> bool {
        matches!(self, AssistantError::Credential(_))
    }

    /// Status line shown by the voice UI after this failure.
    pub fn user_status(&self) -> &'static str {
        match self {
            AssistantError::Capture(_) | AssistantError::Output(_) => STATUS_MIC_FAILED,
            AssistantError::Credential(_) => STATUS_SELECT_KEY,
            _ => STATUS_ERROR,
        }
    }

    /// Assistant reply shown in the chat log after this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            AssistantError::Credential(_) => MSG_SELECT_KEY,
            _ => MSG_TROUBLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_failures_ask_for_a_new_key() {
        let err = AssistantError::Credential("API key not valid".into());
        assert!(err.is_credential());
        assert_eq!(err.user_message(), MSG_SELECT_KEY);
        assert_eq!(err.user_status(), STATUS_SELECT_KEY);
    }

    #[test]
    fn unknown_failures_degrade_to_trouble_connecting() {
        let err = AssistantError::Transport("reset by peer".into());
        assert!(!err.is_credential());
        assert_eq!(err.user_message(), MSG_TROUBLE);
        assert_eq!(err.user_status(), STATUS_ERROR);
        assert_eq!(
            AssistantError::Capture("denied".into()).user_status(),
            STATUS_MIC_FAILED
        );
    }
}
