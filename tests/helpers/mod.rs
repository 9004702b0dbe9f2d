//! Shared fixtures for playback tests
//!
//! Generates small WAV files with hound and drives the in-memory output
//! device's pull path by hand.

#![allow(dead_code)]

use hound::{WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use termsloth::audio::MemoryBackend;
use termsloth::{OutputDevice, Player, PlayerSettings, Track};

/// Write a stereo 16-bit WAV holding a constant level
pub fn write_dc_wav(path: &Path, sample_rate: u32, frames: u32, level: i16) {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for _ in 0..frames * 2 {
        writer.write_sample(level).unwrap();
    }
    writer.finalize().unwrap();
}

/// Write one DC WAV per name into `dir`, returning tracks in the same order
pub fn write_tracks(dir: &Path, names: &[&str], sample_rate: u32, frames: u32) -> Vec<Track> {
    names
        .iter()
        .map(|name| {
            let path: PathBuf = dir.join(name);
            write_dc_wav(&path, sample_rate, frames, 8192);
            Track::new(path)
        })
        .collect()
}

pub fn memory_device() -> Arc<OutputDevice> {
    Arc::new(OutputDevice::new(Box::new(MemoryBackend)))
}

/// Player on a fresh in-memory device, with a counter of track-changed notifications
pub fn player() -> (Player, Arc<OutputDevice>, Arc<AtomicUsize>) {
    let device = memory_device();
    let player = Player::with_device(Arc::clone(&device), PlayerSettings::default()).unwrap();
    let changes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&changes);
    player.set_on_track_changed(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (player, device, changes)
}

/// Pull one block of interleaved stereo samples from the device
pub fn pull(device: &OutputDevice, samples: usize) -> Vec<f32> {
    let mut out = vec![0.0; samples];
    device.lock().fill(&mut out);
    out
}

/// Pull in blocks until the attached voice drains.
/// Returns the number of frames pulled, accurate to one block.
pub fn pull_until_drained(device: &OutputDevice, block_frames: usize, max_frames: usize) -> usize {
    let mut out = vec![0.0; block_frames * 2];
    let mut frames = 0;
    while frames < max_frames {
        let mut mixer = device.lock();
        mixer.fill(&mut out);
        frames += block_frames;
        if mixer.is_empty() {
            return frames;
        }
    }
    panic!("stream did not drain within {} frames", max_frames);
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
