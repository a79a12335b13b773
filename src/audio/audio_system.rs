//! ALSA-backed device factory for voice sessions.
//!
//! Each voice session opens its own microphone and speaker and releases both
//! on teardown, so nothing holds the sound card between sessions.

use super::alsa_device::AlsaMicrophone;
use super::device::{AudioBackend, Microphone, OutputDevice};
use super::output::AlsaOutput;
use super::pcm::{INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
use crate::config::AudioSettings;
use crate::error::AssistantError;

/// The wire format fixes both rates and nothing in the pipeline resamples, so
/// a device that negotiated anything else cannot be used.
fn require_rate(direction: &str, negotiated: u32, wire: u32) -> Result<(), String> {
    if negotiated == wire {
        Ok(())
    } else {
        Err(format!(
            "{} device runs at {}Hz, voice audio needs {}Hz",
            direction, negotiated, wire
        ))
    }
}

pub struct AlsaBackend {
    settings: AudioSettings,
}

impl AlsaBackend {
    pub fn new(settings: AudioSettings) -> Self {
        Self { settings }
    }
}

impl AudioBackend for AlsaBackend {
    fn open_microphone(&self) -> Result<Box<dyn Microphone>, AssistantError> {
        let mic = AlsaMicrophone::open(
            &self.settings.capture_device,
            self.settings.capture_sample_rate,
        )
        .map_err(|e| AssistantError::Capture(format!("{:#}", e)))?;
        require_rate("capture", mic.sample_rate(), INPUT_SAMPLE_RATE)
            .map_err(AssistantError::Capture)?;
        Ok(Box::new(mic))
    }

    fn open_output(&self) -> Result<Box<dyn OutputDevice>, AssistantError> {
        let output = AlsaOutput::open(
            &self.settings.playback_device,
            self.settings.playback_sample_rate,
            self.settings.playback_period_size,
        )
        .map_err(|e| AssistantError::Output(format!("{:#}", e)))?;
        require_rate("playback", output.sample_rate(), OUTPUT_SAMPLE_RATE)
            .map_err(AssistantError::Output)?;
        Ok(Box::new(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::STATUS_MIC_FAILED;

    #[test]
    fn wire_rates_are_accepted() {
        assert!(require_rate("capture", 16_000, INPUT_SAMPLE_RATE).is_ok());
        assert!(require_rate("playback", 24_000, OUTPUT_SAMPLE_RATE).is_ok());
    }

    #[test]
    fn negotiated_rate_mismatch_fails_the_device() {
        let err = require_rate("capture", 44_100, INPUT_SAMPLE_RATE)
            .map_err(AssistantError::Capture)
            .unwrap_err();
        assert!(err.to_string().contains("44100Hz"));
        assert_eq!(err.user_status(), STATUS_MIC_FAILED);

        let err = require_rate("playback", 48_000, OUTPUT_SAMPLE_RATE)
            .map_err(AssistantError::Output)
            .unwrap_err();
        assert_eq!(err.user_status(), STATUS_MIC_FAILED);
    }
}
