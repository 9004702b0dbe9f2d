// Volume controller
// Linear multiplier in [0, 2] mapped onto the log2 domain of the volume shim

use super::shim::Volume;
use super::SampleStream;

pub const MIN_VOLUME: f64 = 0.0;
pub const MAX_VOLUME: f64 = 2.0;

const STEP_UP: f64 = 1.1;
const STEP_DOWN: f64 = 0.9;

/// Base of the shim's logarithmic volume
pub const VOLUME_BASE: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeController {
    current: f64,
}

impl Default for VolumeController {
    fn default() -> Self {
        Self { current: 1.0 }
    }
}

impl VolumeController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current linear multiplier
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Multiplier as a percentage, for display
    pub fn percent(&self) -> f64 {
        self.current * 100.0
    }

    pub fn increase(&mut self) -> f64 {
        self.current = MAX_VOLUME.min(self.current * STEP_UP);
        self.percent()
    }

    pub fn decrease(&mut self) -> f64 {
        self.current = MIN_VOLUME.max(self.current * STEP_DOWN);
        self.percent()
    }

    pub fn is_muted(&self) -> bool {
        self.current == 0.0
    }

    /// Log-domain volume for the shim. Zero has no logarithm and is
    /// expressed through the mute flag instead.
    pub fn log_volume(&self) -> f64 {
        if self.current > 0.0 {
            self.current.log2()
        } else {
            0.0
        }
    }

    /// Write the current level into a live volume shim
    pub fn apply<S: SampleStream>(&self, shim: &mut Volume<S>) {
        shim.base = VOLUME_BASE;
        shim.silent = self.is_muted();
        shim.volume = self.log_volume();
    }

    /// Wrap a stream in a volume shim at the current level
    pub fn wrap<S: SampleStream>(&self, inner: S) -> Volume<S> {
        Volume::new(inner, VOLUME_BASE, self.log_volume(), self.is_muted())
    }
}
