// Streaming sample rate conversion using rubato
// Sits between a decoded stream and the device when the file rate differs from the device rate

use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::{debug, warn};

use super::SampleStream;
use crate::error::DecodeError;

/// Streams are always interleaved stereo by the time they reach the resampler
const CHANNELS: usize = 2;

/// Resampling adapter over a stereo sample stream.
pub struct Resampler<S> {
    source: S,
    resampler: FastFixedIn<f32>,
    ratio: f64,
    chunk_frames: usize,
    /// Interleaved scratch for reads from `source`
    read_buf: Vec<f32>,
    /// Resampled interleaved samples not yet handed out
    output: Vec<f32>,
    cursor: usize,
    frames_in: u64,
    frames_out: u64,
    /// Leading frames still to drop to compensate for the filter delay
    delay_left: usize,
    source_done: bool,
    finished: bool,
}

impl<S: SampleStream> Resampler<S> {
    /// Wrap `source` (at `from_rate`) so that it yields samples at `to_rate`.
    pub fn new(source: S, from_rate: u32, to_rate: u32, chunk_frames: usize) -> Result<Self, DecodeError> {
        let ratio = to_rate as f64 / from_rate as f64;
        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // no runtime ratio changes
            PolynomialDegree::Septic,
            chunk_frames,
            CHANNELS,
        )
        .map_err(|e| DecodeError::Resample(e.to_string()))?;

        let delay_left = resampler.output_delay();
        debug!(
            "Resampling from {}Hz to {}Hz (chunk {} frames, delay {} frames)",
            from_rate, to_rate, chunk_frames, delay_left
        );

        Ok(Self {
            source,
            resampler,
            ratio,
            chunk_frames,
            read_buf: vec![0.0; chunk_frames * CHANNELS],
            output: Vec::new(),
            cursor: 0,
            frames_in: 0,
            frames_out: 0,
            delay_left,
            source_done: false,
            finished: false,
        })
    }

    /// Total output frames owed for everything read from the source so far
    fn expected_frames(&self) -> u64 {
        (self.frames_in as f64 * self.ratio).ceil() as u64
    }

    /// Produce the next block of resampled output, returns false once finished
    fn refill(&mut self) -> bool {
        while !self.finished {
            let processed = if self.source_done {
                self.resampler.process_partial::<Vec<f32>>(None, None)
            } else {
                let wanted = self.chunk_frames * CHANNELS;
                let got = self.source.read(&mut self.read_buf[..wanted]);
                let frames = got / CHANNELS;
                self.frames_in += frames as u64;
                let planar = deinterleave(&self.read_buf[..frames * CHANNELS]);
                if frames == self.chunk_frames {
                    self.resampler.process(&planar, None)
                } else {
                    self.source_done = true;
                    if frames == 0 {
                        continue;
                    }
                    self.resampler.process_partial(Some(planar.as_slice()), None)
                }
            };

            let planar = match processed {
                Ok(planar) => planar,
                Err(e) => {
                    warn!("Resampling failed, ending stream: {}", e);
                    self.finished = true;
                    return false;
                }
            };

            let mut produced = interleave(&planar);
            let skip = (self.delay_left * CHANNELS).min(produced.len());
            self.delay_left -= skip / CHANNELS;
            produced.drain(..skip);

            if self.source_done {
                let owed = self.expected_frames().saturating_sub(self.frames_out) as usize;
                produced.truncate(owed * CHANNELS);
                if produced.len() / CHANNELS >= owed {
                    self.finished = true;
                }
            }

            if produced.is_empty() {
                continue;
            }
            self.frames_out += (produced.len() / CHANNELS) as u64;
            self.output = produced;
            self.cursor = 0;
            return true;
        }
        false
    }
}

impl<S: SampleStream> SampleStream for Resampler<S> {
    fn read(&mut self, out: &mut [f32]) -> usize {
        let mut written = 0;
        while written < out.len() {
            if self.cursor >= self.output.len() && !self.refill() {
                break;
            }
            let available = &self.output[self.cursor..];
            let n = available.len().min(out.len() - written);
            out[written..written + n].copy_from_slice(&available[..n]);
            self.cursor += n;
            written += n;
        }
        written
    }

    fn close(&mut self) {
        self.source.close();
        self.output.clear();
        self.cursor = 0;
        self.finished = true;
    }
}

/// Convert interleaved stereo samples to planar format.
///
/// Input:  [L, R, L, R, ...]
/// Output: [[L, L, ...], [R, R, ...]]
fn deinterleave(samples: &[f32]) -> Vec<Vec<f32>> {
    let frames = samples.len() / CHANNELS;
    let mut planar = vec![Vec::with_capacity(frames); CHANNELS];
    for frame in samples.chunks_exact(CHANNELS) {
        for (ch, &sample) in frame.iter().enumerate() {
            planar[ch].push(sample);
        }
    }
    planar
}

/// Convert planar samples to interleaved format.
fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    if planar.is_empty() {
        return Vec::new();
    }
    let frames = planar.iter().map(Vec::len).min().unwrap_or(0);
    let mut interleaved = Vec::with_capacity(frames * planar.len());
    for frame in 0..frames {
        for channel in planar {
            interleaved.push(channel[frame]);
        }
    }
    interleaved
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Finite stereo sine at a given rate
    struct Sine {
        rate: u32,
        frame: usize,
        frames: usize,
    }

    impl SampleStream for Sine {
        fn read(&mut self, out: &mut [f32]) -> usize {
            let mut written = 0;
            while written + 1 < out.len() && self.frame < self.frames {
                let t = self.frame as f32 / self.rate as f32;
                let sample = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5;
                out[written] = sample;
                out[written + 1] = sample;
                written += 2;
                self.frame += 1;
            }
            written
        }
    }

    fn drain<S: SampleStream>(stream: &mut S) -> Vec<f32> {
        let mut all = Vec::new();
        let mut buf = [0.0; 512];
        loop {
            let n = stream.read(&mut buf);
            all.extend_from_slice(&buf[..n]);
            if n < buf.len() {
                return all;
            }
        }
    }

    #[test]
    fn test_deinterleave() {
        let planar = deinterleave(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(planar, vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]]);
    }

    #[test]
    fn test_interleave() {
        let planar = vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]];
        assert_eq!(interleave(&planar), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_interleave_empty() {
        assert_eq!(interleave(&[]), Vec::<f32>::new());
    }

    #[test]
    fn test_upsample_doubles_frame_count() {
        let source = Sine { rate: 22050, frame: 0, frames: 5000 };
        let mut resampler = Resampler::new(source, 22050, 44100, 1024).unwrap();
        let output = drain(&mut resampler);
        assert_eq!(output.len() / CHANNELS, 10000);
        assert!(output.iter().any(|s| s.abs() > 0.1), "resampled signal should not be silent");
    }

    #[test]
    fn test_downsample_frame_count() {
        let source = Sine { rate: 48000, frame: 0, frames: 4800 };
        let mut resampler = Resampler::new(source, 48000, 44100, 1024).unwrap();
        let output = drain(&mut resampler);
        assert_eq!(output.len() / CHANNELS, 4410);
    }

    #[test]
    fn test_empty_source_finishes_immediately() {
        let source = Sine { rate: 22050, frame: 0, frames: 0 };
        let mut resampler = Resampler::new(source, 22050, 44100, 256).unwrap();
        assert!(drain(&mut resampler).is_empty());
    }

    #[test]
    fn test_close_ends_stream() {
        let source = Sine { rate: 22050, frame: 0, frames: 5000 };
        let mut resampler = Resampler::new(source, 22050, 44100, 256).unwrap();
        resampler.close();
        let mut buf = [0.0; 16];
        assert_eq!(resampler.read(&mut buf), 0);
    }
}
