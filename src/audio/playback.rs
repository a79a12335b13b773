//! Gapless, interruptible scheduling of the assistant's synthesized speech.

use std::collections::HashSet;

use super::device::{OutputDevice, VoiceId};
use super::pcm::{AudioBuffer, OUTPUT_SAMPLE_RATE};
use crate::error::AssistantError;

/// Where a decoded payload landed on the output timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scheduled {
    pub voice: VoiceId,
    pub start: f64,
    pub duration: f64,
}

/// Owns the `next_start` cursor and the set of buffers still playing.
///
/// Only `enqueue`, `interrupt`, `reap` and `stop_all` touch the cursor, and
/// the owner calls them one message at a time.
pub struct PlaybackScheduler<D: OutputDevice> {
    device: D,
    next_start: f64,
    active: HashSet<VoiceId>,
}

impl<D: OutputDevice> PlaybackScheduler<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            next_start: 0.0,
            active: HashSet::new(),
        }
    }

    /// Decode one inline audio payload and queue it right after the
    /// previous one. Returns `None` for an empty payload.
    pub fn enqueue(&mut self, payload: &str) -> Result<Option<Scheduled>, AssistantError> {
        self.reap();

        let buffer = AudioBuffer::from_base64(payload, OUTPUT_SAMPLE_RATE)?;
        if buffer.is_empty() {
            return Ok(None);
        }

        // Never schedule in the past if playback has stalled.
        self.next_start = self.next_start.max(self.device.current_time());
        let start = self.next_start;
        let duration = buffer.duration();

        let voice = self.device.start_at(buffer, start)?;
        self.active.insert(voice);
        self.next_start += duration;

        Ok(Some(Scheduled {
            voice,
            start,
            duration,
        }))
    }

    /// Barge-in: silence everything now and restart the cursor against the
    /// live clock on the next payload.
    pub fn interrupt(&mut self) {
        let stopped = self.active.len();
        for voice in self.active.drain() {
            self.device.stop(voice);
        }
        self.next_start = 0.0;
        if stopped > 0 {
            log::info!("Playback interrupted, stopped {} buffers", stopped);
        }
    }

    /// Forget buffers that finished on their own.
    pub fn reap(&mut self) {
        for voice in self.device.drain_ended() {
            self.active.remove(&voice);
        }
    }

    /// Teardown: same effect as an interruption.
    pub fn stop_all(&mut self) {
        self.interrupt();
    }

    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    #[cfg(test)]
    pub fn is_active(&self, voice: VoiceId) -> bool {
        self.active.contains(&voice)
    }
}
