//! ALSA PCM device wrappers for microphone capture and speaker playback.
//!
//! Both directions run mono `FLOAT_LE`, the sample format the voice pipeline
//! works in end to end.

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};
use anyhow::{Context, Result};

use super::device::Microphone;
use crate::error::AssistantError;

const CHANNELS: u32 = 1;

/// Parameters negotiated with the ALSA hardware.
#[derive(Debug, Clone)]
pub struct AlsaParams {
    /// Actual sample rate after negotiation
    pub sample_rate: u32,
    /// Actual number of channels
    pub channels: u32,
    /// Period size in frames
    pub period_size: usize,
}

/// Open a PCM device for capture (recording).
pub fn open_capture(device: &str, sample_rate: u32) -> Result<(PCM, AlsaParams)> {
    open_pcm(device, Direction::Capture, sample_rate, None, "Capture")
}

/// Open a PCM device for playback.
pub fn open_playback(
    device: &str,
    sample_rate: u32,
    period_size: Option<usize>,
) -> Result<(PCM, AlsaParams)> {
    open_pcm(device, Direction::Playback, sample_rate, period_size, "Playback")
}

fn open_pcm(
    device: &str,
    direction: Direction,
    sample_rate: u32,
    period_size: Option<usize>,
    dir_name: &str,
) -> Result<(PCM, AlsaParams)> {
    let pcm = PCM::new(device, direction, false)
        .with_context(|| format!("Failed to open PCM device '{}' for {}", device, dir_name))?;

    {
        let hwp = HwParams::any(&pcm).with_context(|| "Failed to initialize HwParams")?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(Format::FloatLE)?;
        hwp.set_channels(CHANNELS)?;
        hwp.set_rate_near(sample_rate, ValueOr::Nearest)?;
        if let Some(ps) = period_size {
            hwp.set_period_size_near(ps as alsa::pcm::Frames, ValueOr::Nearest)?;
        }
        pcm.hw_params(&hwp)?;
    }

    // Read back actual negotiated parameters
    let (actual_rate, actual_channels, period_size) = {
        let hwp = pcm.hw_params_current()?;
        let rate = hwp.get_rate()?;
        let ch = hwp.get_channels()?;
        let ps = hwp.get_period_size()? as usize;
        (rate, ch, ps)
    };

    if actual_rate != sample_rate {
        log::warn!(
            "ALSA {}: requested {}Hz but device negotiated {}Hz",
            dir_name,
            sample_rate,
            actual_rate
        );
    }

    let params = AlsaParams {
        sample_rate: actual_rate,
        channels: actual_channels,
        period_size,
    };

    log::info!(
        "ALSA {}: device={}, rate={}, channels={}, period_size={}",
        dir_name,
        device,
        actual_rate,
        actual_channels,
        period_size,
    );

    Ok((pcm, params))
}

/// Live microphone backed by an ALSA capture PCM.
pub struct AlsaMicrophone {
    pcm: PCM,
    params: AlsaParams,
}

impl AlsaMicrophone {
    pub fn open(device: &str, sample_rate: u32) -> Result<Self> {
        let (pcm, params) = open_capture(device, sample_rate)?;
        Ok(Self { pcm, params })
    }
}

impl Microphone for AlsaMicrophone {
    fn sample_rate(&self) -> u32 {
        self.params.sample_rate
    }

    fn read(&mut self, buf: &mut [f32]) -> Result<usize, AssistantError> {
        let io = self
            .pcm
            .io_f32()
            .map_err(|e| AssistantError::Capture(e.to_string()))?;
        let frames = io
            .readi(buf)
            .map_err(|e| AssistantError::Capture(e.to_string()))?;
        Ok(frames * self.params.channels as usize)
    }

    fn recover(&mut self) -> Result<(), AssistantError> {
        self.pcm
            .prepare()
            .map_err(|e| AssistantError::Capture(e.to_string()))
    }
}
