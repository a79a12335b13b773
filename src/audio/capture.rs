use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Result;

use super::device::Microphone;
use super::pcm::WireBlob;

/// Consumer of encoded microphone frames. `submit` must not block; returning
/// `false` means the consumer is gone and capture should end.
pub trait FrameSink: Send + 'static {
    fn submit(&self, blob: WireBlob) -> bool;
}

/// Fixed-size sample blocks pulled from a microphone.
///
/// Lazy and endless while the running flag is set; once it yields `None`
/// (flag cleared or the device could not be recovered) it stays finished.
pub struct CaptureBlocks<M: Microphone + ?Sized> {
    mic: Box<M>,
    block_len: usize,
    running: Arc<AtomicBool>,
    done: bool,
}

impl<M: Microphone + ?Sized> CaptureBlocks<M> {
    pub fn new(mic: Box<M>, block_len: usize, running: Arc<AtomicBool>) -> Self {
        Self {
            mic,
            block_len: block_len.max(1),
            running,
            done: false,
        }
    }
}

impl<M: Microphone + ?Sized> Iterator for CaptureBlocks<M> {
    type Item = Vec<f32>;

    fn next(&mut self) -> Option<Vec<f32>> {
        if self.done {
            return None;
        }
        let mut block = vec![0f32; self.block_len];
        let mut filled = 0;
        while filled < self.block_len {
            if !self.running.load(Ordering::Relaxed) {
                self.done = true;
                return None;
            }
            match self.mic.read(&mut block[filled..]) {
                Ok(n) => filled += n,
                Err(e) => {
                    log::warn!("Microphone read error: {}, recovering...", e);
                    if let Err(e2) = self.mic.recover() {
                        log::error!("Failed to recover microphone: {}", e2);
                        self.done = true;
                        return None;
                    }
                }
            }
        }
        Some(block)
    }
}

/// Microphone streaming on a dedicated OS thread:
/// microphone → 4096-sample blocks → PCM16/base64 → `FrameSink`.
pub struct Capture {
    running: Arc<AtomicBool>,
    record_handle: Option<JoinHandle<()>>,
}

impl Capture {
    pub fn start<S: FrameSink>(mic: Box<dyn Microphone>, block_len: usize, sink: S) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));

        log::info!(
            "Capture starting: rate={}Hz, block={} samples",
            mic.sample_rate(),
            block_len
        );

        let record_handle = {
            let running = running.clone();
            thread::Builder::new()
                .name("audio-capture".into())
                .spawn(move || {
                    let mut sent = 0u64;
                    for block in CaptureBlocks::new(mic, block_len, running) {
                        if !sink.submit(WireBlob::pcm16(&block)) {
                            log::warn!("Frame sink closed, stopping capture");
                            break;
                        }
                        sent += 1;
                    }
                    log::info!("Capture stopped after {} frames", sent);
                })?
        };

        Ok(Self {
            running,
            record_handle: Some(record_handle),
        })
    }

    /// Ask the capture thread to finish without waiting for it. At most the
    /// block being read is still submitted.
    pub fn halt(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Disconnect the microphone; no frame is produced after this returns.
    pub fn stop(&mut self) {
        self.halt();
        if let Some(h) = self.record_handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::pcm::{INPUT_SAMPLE_RATE, decode_base64, decode_pcm16};
    use crate::error::AssistantError;
    use std::collections::VecDeque;
    use tokio::sync::mpsc;

    impl FrameSink for mpsc::UnboundedSender<WireBlob> {
        fn submit(&self, blob: WireBlob) -> bool {
            self.send(blob).is_ok()
        }
    }

    /// Microphone that replays scripted reads, then fails for good.
    pub(crate) struct ScriptedMic {
        pub reads: VecDeque<Result<Vec<f32>, AssistantError>>,
        pub recoverable: bool,
    }

    impl ScriptedMic {
        pub fn new(chunks: Vec<Vec<f32>>) -> Self {
            Self {
                reads: chunks.into_iter().map(Ok).collect(),
                recoverable: true,
            }
        }
    }

    impl Microphone for ScriptedMic {
        fn sample_rate(&self) -> u32 {
            INPUT_SAMPLE_RATE
        }

        fn read(&mut self, buf: &mut [f32]) -> Result<usize, AssistantError> {
            match self.reads.pop_front() {
                Some(Ok(mut chunk)) => {
                    if chunk.len() > buf.len() {
                        let rest = chunk.split_off(buf.len());
                        self.reads.push_front(Ok(rest));
                    }
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Some(Err(e)) => Err(e),
                None => {
                    self.recoverable = false;
                    Err(AssistantError::Capture("device gone".into()))
                }
            }
        }

        fn recover(&mut self) -> Result<(), AssistantError> {
            if self.recoverable {
                Ok(())
            } else {
                Err(AssistantError::Capture("unrecoverable".into()))
            }
        }
    }

    #[test]
    fn blocks_have_fixed_size_across_uneven_reads() {
        let mic = ScriptedMic::new(vec![vec![0.1; 3], vec![0.2; 4], vec![0.3; 2]]);
        let running = Arc::new(AtomicBool::new(true));
        let blocks: Vec<Vec<f32>> = CaptureBlocks::new(Box::new(mic), 4, running).collect();

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], vec![0.1, 0.1, 0.1, 0.2]);
        assert_eq!(blocks[1], vec![0.2, 0.2, 0.2, 0.3]);
    }

    #[test]
    fn transient_read_errors_are_recovered() {
        let mut mic = ScriptedMic::new(vec![vec![0.5; 2]]);
        mic.reads.push_front(Err(AssistantError::Capture("overrun".into())));
        let running = Arc::new(AtomicBool::new(true));
        let mut blocks = CaptureBlocks::new(Box::new(mic), 2, running);

        assert_eq!(blocks.next(), Some(vec![0.5, 0.5]));
        assert_eq!(blocks.next(), None);
        assert_eq!(blocks.next(), None);
    }

    #[test]
    fn cleared_flag_ends_the_sequence() {
        let mic = ScriptedMic::new(vec![vec![0.0; 8]]);
        let running = Arc::new(AtomicBool::new(false));
        let mut blocks = CaptureBlocks::new(Box::new(mic), 4, running);
        assert_eq!(blocks.next(), None);
    }

    #[test]
    fn capture_thread_submits_encoded_frames_in_order() {
        let mic = ScriptedMic::new(vec![vec![0.5; 4], vec![-0.5; 4]]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut capture = Capture::start(Box::new(mic), 4, tx).unwrap();
        let first = rx.blocking_recv().unwrap();
        let second = rx.blocking_recv().unwrap();
        capture.stop();

        let decode = |b: &WireBlob| decode_pcm16(&decode_base64(b.data()).unwrap()).unwrap();
        assert_eq!(decode(&first), vec![0.5; 4]);
        assert_eq!(decode(&second), vec![-0.5; 4]);
        assert_eq!(first.mime_type(), "audio/pcm;rate=16000");
        // the scripted device fails after two blocks, so the sink is dropped
        assert!(rx.blocking_recv().is_none());
    }
}
