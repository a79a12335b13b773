use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use alsa::pcm::PCM;
use anyhow::Result;

use super::alsa_device::{self, AlsaParams};
use super::device::{OutputDevice, VoiceId};
use super::pcm::AudioBuffer;
use crate::error::AssistantError;

struct Voice {
    id: VoiceId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Frame-accurate output timeline. Buffers are placed at absolute frame
/// positions and mixed as the clock advances through `render`.
pub struct Timeline {
    sample_rate: u32,
    frames_rendered: u64,
    next_id: u64,
    voices: Vec<Voice>,
    ended: Vec<VoiceId>,
}

impl Timeline {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frames_rendered: 0,
            next_id: 0,
            voices: Vec::new(),
            ended: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Clock position in seconds.
    pub fn now(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    /// Place a buffer at `when` seconds. A start time already in the past
    /// plays from the current frame.
    pub fn schedule(&mut self, buffer: AudioBuffer, when: f64) -> VoiceId {
        if buffer.sample_rate != self.sample_rate {
            log::warn!(
                "Scheduling {}Hz buffer on {}Hz timeline without resampling",
                buffer.sample_rate,
                self.sample_rate
            );
        }
        let requested = (when.max(0.0) * self.sample_rate as f64).round() as u64;
        let start_frame = requested.max(self.frames_rendered);

        let id = VoiceId(self.next_id);
        self.next_id += 1;
        self.voices.push(Voice {
            id,
            start_frame,
            samples: buffer.samples,
        });
        id
    }

    /// Remove a buffer without reporting it as ended.
    pub fn stop(&mut self, id: VoiceId) -> bool {
        let before = self.voices.len();
        self.voices.retain(|v| v.id != id);
        self.voices.len() != before
    }

    /// Mix the next `out.len()` frames and advance the clock.
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let begin = self.frames_rendered;
        let end = begin + out.len() as u64;

        for voice in &self.voices {
            if voice.start_frame >= end || voice.end_frame() <= begin {
                continue;
            }
            let from = voice.start_frame.max(begin);
            let to = voice.end_frame().min(end);
            for frame in from..to {
                out[(frame - begin) as usize] += voice.samples[(frame - voice.start_frame) as usize];
            }
        }
        for s in out.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }

        self.frames_rendered = end;
        let ended = &mut self.ended;
        self.voices.retain(|v| {
            let done = v.end_frame() <= end;
            if done {
                ended.push(v.id);
            }
            !done
        });
    }

    pub fn drain_ended(&mut self) -> Vec<VoiceId> {
        std::mem::take(&mut self.ended)
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.voices.len()
    }
}

fn lock(timeline: &Mutex<Timeline>) -> MutexGuard<'_, Timeline> {
    timeline.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Speaker output: a [`Timeline`] rendered period by period into ALSA from a
/// dedicated thread. The clock is the number of frames handed to the device.
pub struct AlsaOutput {
    timeline: Arc<Mutex<Timeline>>,
    running: Arc<AtomicBool>,
    play_handle: Option<JoinHandle<()>>,
}

impl AlsaOutput {
    pub fn open(device: &str, sample_rate: u32, period_size: usize) -> Result<Self> {
        let period_size_opt = if period_size > 0 { Some(period_size) } else { None };
        let (pcm, params) = alsa_device::open_playback(device, sample_rate, period_size_opt)?;

        let timeline = Arc::new(Mutex::new(Timeline::new(params.sample_rate)));
        let running = Arc::new(AtomicBool::new(true));

        let play_handle = {
            let timeline = timeline.clone();
            let running = running.clone();
            thread::Builder::new()
                .name("audio-play".into())
                .spawn(move || {
                    if let Err(e) = play_thread(pcm, params, &timeline, &running) {
                        log::error!("Playback thread error: {}", e);
                    }
                })?
        };

        Ok(Self {
            timeline,
            running,
            play_handle: Some(play_handle),
        })
    }

    /// Signal the render thread to stop and wait for it.
    pub fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(h) = self.play_handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for AlsaOutput {
    fn drop(&mut self) {
        self.close();
    }
}

impl OutputDevice for AlsaOutput {
    fn sample_rate(&self) -> u32 {
        lock(&self.timeline).sample_rate()
    }

    fn current_time(&self) -> f64 {
        lock(&self.timeline).now()
    }

    fn start_at(&mut self, buffer: AudioBuffer, when: f64) -> Result<VoiceId, AssistantError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(AssistantError::Output("playback stopped".into()));
        }
        Ok(lock(&self.timeline).schedule(buffer, when))
    }

    fn stop(&mut self, voice: VoiceId) {
        lock(&self.timeline).stop(voice);
    }

    fn drain_ended(&mut self) -> Vec<VoiceId> {
        lock(&self.timeline).drain_ended()
    }
}

fn play_thread(
    pcm: PCM,
    params: AlsaParams,
    timeline: &Mutex<Timeline>,
    running: &AtomicBool,
) -> Result<()> {
    let io = pcm.io_f32()?;
    let period = params.period_size.max(1);
    let mut period_buf = vec![0f32; period];

    log::info!(
        "Playback started: rate={}, ch={}, period={}",
        params.sample_rate,
        params.channels,
        period,
    );

    while running.load(Ordering::Relaxed) {
        lock(timeline).render(&mut period_buf);

        // Write with retry to survive short writes and XRUN recovery.
        let mut frames_written = 0;
        let mut retry_count = 0u32;
        while frames_written < period {
            match io.writei(&period_buf[frames_written..]) {
                Ok(n) => {
                    frames_written += n;
                    retry_count = 0;
                }
                Err(e) => {
                    log::warn!("ALSA XRUN or error: {}, recovering...", e);
                    retry_count += 1;

                    if let Err(e2) = pcm.prepare() {
                        log::error!("Failed to recover PCM playback: {}", e2);
                        return Err(e2.into());
                    }

                    if retry_count >= 3 {
                        log::error!(
                            "Max recovery retries ({}) reached. Dropping {} unwritten frames.",
                            retry_count,
                            period - frames_written
                        );
                        break;
                    }
                }
            }
        }
    }

    log::info!("Playback stopped");
    Ok(())
}
