//! audio - microphone capture, speech playback and the PCM wire encoding
//!
//! Uses ALSA for device I/O on dedicated threads. The voice pipeline works in
//! mono f32 end to end: 16 kHz towards the service, 24 kHz back.

mod alsa_device;
mod audio_system;
pub mod capture;
pub mod device;
pub mod output;
pub mod pcm;
pub mod playback;

pub use audio_system::AlsaBackend;
pub use capture::Capture;
pub use device::{AudioBackend, Microphone, OutputDevice};
pub use playback::PlaybackScheduler;
