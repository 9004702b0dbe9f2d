// Audio output gateway
// One process-wide device whose sample rate is fixed on first use. Every
// mutation the pull path can observe goes through `OutputDevice::lock`.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::{Mutex, MutexGuard};
use ringbuf::{traits::{Consumer, Observer, Producer, Split}, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

use super::shim::{Ctrl, Volume};
use super::SampleStream;
use crate::error::AudioError;

/// Frames the feeder pulls from the mixer per iteration
const FEED_FRAMES: usize = 512;

/// The fully wrapped stream of one voice: volume outermost, pause inside it
pub type ShimChain = Volume<Ctrl<Box<dyn SampleStream>>>;

type DrainedCallback = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(u64);

/// A stream attached to the device, with the callback fired when it drains
pub struct Voice {
    chain: ShimChain,
    on_drained: Option<DrainedCallback>,
}

impl Voice {
    pub fn new(chain: ShimChain, on_drained: impl FnOnce() + Send + 'static) -> Self {
        Self {
            chain,
            on_drained: Some(Box::new(on_drained)),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.chain.inner().paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.chain.inner_mut().paused = paused;
    }

    /// The outer volume shim
    pub fn volume_mut(&mut self) -> &mut ShimChain {
        &mut self.chain
    }

    /// Close the decode resources without firing the drained callback
    pub fn close(mut self) {
        self.on_drained = None;
        self.chain.close();
    }

    fn finish(mut self) {
        self.chain.close();
        if let Some(on_drained) = self.on_drained.take() {
            on_drained();
        }
    }
}

/// Voices currently attached to the device
#[derive(Default)]
pub struct Mixer {
    voices: Vec<(VoiceId, Voice)>,
    next_id: u64,
    scratch: Vec<f32>,
}

impl Mixer {
    pub fn play(&mut self, voice: Voice) -> VoiceId {
        let id = VoiceId(self.next_id);
        self.next_id += 1;
        self.voices.push((id, voice));
        id
    }

    pub fn voice_mut(&mut self, id: VoiceId) -> Option<&mut Voice> {
        self.voices
            .iter_mut()
            .find(|(voice_id, _)| *voice_id == id)
            .map(|(_, voice)| voice)
    }

    /// Detach a voice. The caller owns closing it.
    pub fn remove(&mut self, id: VoiceId) -> Option<Voice> {
        let pos = self.voices.iter().position(|(voice_id, _)| *voice_id == id)?;
        Some(self.voices.remove(pos).1)
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Pull path: mix every voice into `out` (interleaved stereo).
    /// Voices that drain are detached, closed and their callback fired.
    pub fn fill(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        if self.scratch.len() < out.len() {
            self.scratch.resize(out.len(), 0.0);
        }
        let len = out.len();

        let mut i = 0;
        while i < self.voices.len() {
            let n = self.voices[i].1.chain.read(&mut self.scratch[..len]);
            for (o, s) in out.iter_mut().zip(&self.scratch[..n]) {
                *o += *s;
            }
            if n < len {
                let (id, voice) = self.voices.remove(i);
                debug!("Voice {:?} drained", id);
                voice.finish();
            } else {
                i += 1;
            }
        }
    }
}

/// Hardware (or fake) side of the device: drives the pull path once started
pub trait OutputBackend: Send {
    /// Start pulling from `mixer` at `sample_rate`. Called at most once.
    fn start(&mut self, sample_rate: u32, mixer: Arc<Mutex<Mixer>>) -> Result<(), AudioError>;
}

/// Shared audio sink
pub struct OutputDevice {
    mixer: Arc<Mutex<Mixer>>,
    backend: Mutex<Box<dyn OutputBackend>>,
    sample_rate: OnceLock<u32>,
}

static SHARED: OnceLock<Arc<OutputDevice>> = OnceLock::new();

impl OutputDevice {
    pub fn new(backend: Box<dyn OutputBackend>) -> Self {
        Self {
            mixer: Arc::new(Mutex::new(Mixer::default())),
            backend: Mutex::new(backend),
            sample_rate: OnceLock::new(),
        }
    }

    /// The process-wide hardware device. `buffer_ms` only applies on the first call.
    pub fn shared(buffer_ms: u32) -> Arc<OutputDevice> {
        SHARED
            .get_or_init(|| Arc::new(OutputDevice::new(Box::new(CpalBackend::new(buffer_ms)))))
            .clone()
    }

    /// Rate the device was initialized at, if it has been
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate.get().copied()
    }

    /// Initialize at `sample_rate` unless already initialized.
    /// Returns the rate the device actually runs at.
    pub fn init(&self, sample_rate: u32) -> Result<u32, AudioError> {
        let mut backend = self.backend.lock();
        if let Some(&rate) = self.sample_rate.get() {
            return Ok(rate);
        }
        backend.start(sample_rate, Arc::clone(&self.mixer))?;
        info!("Output device initialized at {}Hz", sample_rate);
        Ok(*self.sample_rate.get_or_init(|| sample_rate))
    }

    /// Lock shared by every writer and the pull path
    pub fn lock(&self) -> MutexGuard<'_, Mixer> {
        self.mixer.lock()
    }
}

/// In-memory backend for tests: nothing pulls automatically, callers drive
/// the pull path through `OutputDevice::lock().fill(..)`.
#[derive(Debug, Default)]
pub struct MemoryBackend;

impl OutputBackend for MemoryBackend {
    fn start(&mut self, sample_rate: u32, _mixer: Arc<Mutex<Mixer>>) -> Result<(), AudioError> {
        debug!("Memory output started at {}Hz", sample_rate);
        Ok(())
    }
}

/// cpal output: a feeder thread drains the mixer into a ring buffer which the
/// device callback consumes
pub struct CpalBackend {
    buffer_ms: u32,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CpalBackend {
    pub fn new(buffer_ms: u32) -> Self {
        Self {
            buffer_ms,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Open the default device at `sample_rate` and build the output stream.
    /// Returns the stream, the producer feeding it and the device channel count.
    fn open(sample_rate: u32, buffer_ms: u32) -> Result<(Stream, ringbuf::HeapProd<f32>, usize), AudioError> {
        let host = cpal::default_host();

        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let default_config = device
            .default_output_config()
            .map_err(|e| AudioError::StreamError(format!("Failed to get default output config: {}", e)))?;

        let channels = default_config.channels();
        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let capacity = (sample_rate as usize * buffer_ms as usize / 1000).max(FEED_FRAMES) * channels as usize;
        let rb = HeapRb::<f32>::new(capacity);
        let (producer, consumer) = rb.split();

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, consumer)?,
            cpal::SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, consumer)?,
            cpal::SampleFormat::U16 => Self::build_stream::<u16>(&device, &config, consumer)?,
            format => return Err(AudioError::UnsupportedFormat(format!("{:?}", format))),
        };

        stream
            .play()
            .map_err(|e| AudioError::StreamError(format!("Failed to start stream: {}", e)))?;

        Ok((stream, producer, channels as usize))
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        mut consumer: ringbuf::HeapCons<f32>,
    ) -> Result<Stream, AudioError> {
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    for sample in data.iter_mut() {
                        let value = consumer.try_pop().unwrap_or(0.0);
                        *sample = T::from_sample(value);
                    }
                },
                move |err| {
                    error!("Audio output error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamError(format!("Failed to build output stream: {}", e)))
    }

    /// Pull stereo frames from the mixer and push them in the device's channel layout
    fn feed(
        mixer: Arc<Mutex<Mixer>>,
        mut producer: ringbuf::HeapProd<f32>,
        channels: usize,
        running: Arc<AtomicBool>,
    ) {
        let mut stereo = vec![0.0f32; FEED_FRAMES * 2];
        let mut frames = Vec::with_capacity(FEED_FRAMES * channels);

        while running.load(Ordering::SeqCst) {
            if producer.vacant_len() < FEED_FRAMES * channels {
                // Buffer full, wait a bit
                thread::sleep(Duration::from_millis(1));
                continue;
            }

            mixer.lock().fill(&mut stereo);

            frames.clear();
            for frame in stereo.chunks_exact(2) {
                match channels {
                    1 => frames.push((frame[0] + frame[1]) * 0.5),
                    _ => {
                        for ch in 0..channels {
                            frames.push(frame[ch.min(1)]);
                        }
                    }
                }
            }
            producer.push_slice(&frames);
        }
    }
}

impl OutputBackend for CpalBackend {
    fn start(&mut self, sample_rate: u32, mixer: Arc<Mutex<Mixer>>) -> Result<(), AudioError> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let running = Arc::clone(&self.running);
        let buffer_ms = self.buffer_ms;
        running.store(true, Ordering::SeqCst);

        // The cpal stream is not Send on every platform, so it lives on the feeder thread
        let handle = thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || match Self::open(sample_rate, buffer_ms) {
                Ok((stream, producer, channels)) => {
                    let _ = ready_tx.send(Ok(()));
                    Self::feed(mixer, producer, channels, running);
                    drop(stream);
                }
                Err(e) => {
                    running.store(false, Ordering::SeqCst);
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| AudioError::StreamError(format!("Failed to spawn output thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.thread = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(AudioError::OutputThreadGone),
        }
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counting(Arc<AtomicUsize>);

    impl OutputBackend for Counting {
        fn start(&mut self, _sample_rate: u32, _mixer: Arc<Mutex<Mixer>>) -> Result<(), AudioError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Ramp {
        remaining: usize,
        closed: Arc<AtomicBool>,
    }

    impl SampleStream for Ramp {
        fn read(&mut self, out: &mut [f32]) -> usize {
            let n = self.remaining.min(out.len());
            out[..n].fill(0.25);
            self.remaining -= n;
            n
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn voice(samples: usize, paused: bool) -> (Voice, Arc<AtomicBool>, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        let drained = Arc::new(AtomicBool::new(false));
        let source: Box<dyn SampleStream> = Box::new(Ramp {
            remaining: samples,
            closed: Arc::clone(&closed),
        });
        let chain = Volume::new(Ctrl::new(source, paused), 2.0, 0.0, false);
        let flag = Arc::clone(&drained);
        let voice = Voice::new(chain, move || flag.store(true, Ordering::SeqCst));
        (voice, closed, drained)
    }

    #[test]
    fn test_init_is_once_only() {
        let starts = Arc::new(AtomicUsize::new(0));
        let device = OutputDevice::new(Box::new(Counting(Arc::clone(&starts))));
        assert_eq!(device.sample_rate(), None);
        assert_eq!(device.init(44100).unwrap(), 44100);
        assert_eq!(device.init(22050).unwrap(), 44100);
        assert_eq!(device.sample_rate(), Some(44100));
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drained_voice_is_removed_and_signalled() {
        let mut mixer = Mixer::default();
        let (voice, closed, drained) = voice(6, false);
        mixer.play(voice);

        let mut out = [0.0; 4];
        mixer.fill(&mut out);
        assert_eq!(out, [0.25; 4]);
        assert!(!drained.load(Ordering::SeqCst));

        mixer.fill(&mut out);
        assert_eq!(out, [0.25, 0.25, 0.0, 0.0]);
        assert!(drained.load(Ordering::SeqCst));
        assert!(closed.load(Ordering::SeqCst));
        assert!(mixer.is_empty());
    }

    #[test]
    fn test_paused_voice_never_drains() {
        let mut mixer = Mixer::default();
        let (voice, _closed, drained) = voice(2, true);
        let id = mixer.play(voice);

        let mut out = [1.0; 8];
        for _ in 0..4 {
            mixer.fill(&mut out);
        }
        assert_eq!(out, [0.0; 8]);
        assert!(!drained.load(Ordering::SeqCst));
        assert!(mixer.voice_mut(id).unwrap().is_paused());
    }

    #[test]
    fn test_removed_voice_closes_without_signal() {
        let mut mixer = Mixer::default();
        let (voice, closed, drained) = voice(100, false);
        let id = mixer.play(voice);

        mixer.remove(id).unwrap().close();
        assert!(closed.load(Ordering::SeqCst));
        assert!(!drained.load(Ordering::SeqCst));
        assert!(mixer.remove(id).is_none());
    }
}
