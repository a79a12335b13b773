//! Device seams between the voice pipeline and the sound hardware.

use crate::error::AssistantError;

use super::pcm::AudioBuffer;

/// A live mono microphone stream.
pub trait Microphone: Send {
    fn sample_rate(&self) -> u32;

    /// Block until some samples are available and copy them into `buf`.
    /// Returns the number of samples written.
    fn read(&mut self, buf: &mut [f32]) -> Result<usize, AssistantError>;

    /// Try to bring the stream back after a read error (overrun etc.).
    fn recover(&mut self) -> Result<(), AssistantError>;
}

/// Handle of one buffer scheduled on an output timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

/// An output device with sample-accurate start-time scheduling.
pub trait OutputDevice: Send {
    fn sample_rate(&self) -> u32;

    /// Current position of the output clock in seconds.
    fn current_time(&self) -> f64;

    /// Schedule `buffer` to begin at `when` seconds on the output clock.
    fn start_at(&mut self, buffer: AudioBuffer, when: f64) -> Result<VoiceId, AssistantError>;

    /// Stop a scheduled buffer immediately. Unknown ids are ignored.
    fn stop(&mut self, voice: VoiceId);

    /// Buffers that finished playing on their own since the last call.
    fn drain_ended(&mut self) -> Vec<VoiceId>;
}

impl<D: OutputDevice + ?Sized> OutputDevice for Box<D> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn current_time(&self) -> f64 {
        (**self).current_time()
    }

    fn start_at(&mut self, buffer: AudioBuffer, when: f64) -> Result<VoiceId, AssistantError> {
        (**self).start_at(buffer, when)
    }

    fn stop(&mut self, voice: VoiceId) {
        (**self).stop(voice)
    }

    fn drain_ended(&mut self) -> Vec<VoiceId> {
        (**self).drain_ended()
    }
}

/// Opens the devices for one voice session.
pub trait AudioBackend: Send + Sync {
    fn open_microphone(&self) -> Result<Box<dyn Microphone>, AssistantError>;
    fn open_output(&self) -> Result<Box<dyn OutputDevice>, AssistantError>;
}
