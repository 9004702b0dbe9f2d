// Audio playback module
// Uses Symphonia for decoding, rubato for rate conversion and cpal for output

pub mod decoder;
pub mod output;
pub mod player;
pub mod resampler;
pub mod shim;
pub mod volume;
pub mod watcher;

pub use output::{CpalBackend, MemoryBackend, OutputBackend, OutputDevice};
pub use player::Player;
pub use volume::VolumeController;

/// Sample rate and channel count of a decoded file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// A finite source of interleaved stereo f32 samples.
///
/// Everything the output device pulls from implements this: decoded files,
/// the resampler adapter, and the pause/volume shims wrapped around them.
pub trait SampleStream: Send {
    /// Fill `out` with samples and return how many were written.
    /// Returning fewer than `out.len()` means the stream is drained.
    fn read(&mut self, out: &mut [f32]) -> usize;

    /// Release decode resources. Reads after close return 0.
    fn close(&mut self) {}
}

impl<S: SampleStream + ?Sized> SampleStream for Box<S> {
    fn read(&mut self, out: &mut [f32]) -> usize {
        (**self).read(out)
    }

    fn close(&mut self) {
        (**self).close()
    }
}
