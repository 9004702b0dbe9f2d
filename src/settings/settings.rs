// Runtime settings
// Supplied on the command line or through the environment, never persisted

/// Output settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSettings {
    pub buffer_ms: u32, // Ring buffer length between mixer and device
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self { buffer_ms: 100 }
    }
}

/// Resampler settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResampleSettings {
    pub chunk_frames: usize, // Frames fed to the resampler per pass
}

impl Default for ResampleSettings {
    fn default() -> Self {
        Self { chunk_frames: 1024 }
    }
}

/// Main player settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSettings {
    pub output: OutputSettings,
    pub resample: ResampleSettings,
    pub watcher_threads: usize,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            output: OutputSettings::default(),
            resample: ResampleSettings::default(),
            watcher_threads: 1,
        }
    }
}

impl PlayerSettings {
    /// Clamp values into workable ranges
    pub fn sanitized(mut self) -> Self {
        self.output.buffer_ms = self.output.buffer_ms.clamp(10, 2000);
        self.resample.chunk_frames = self.resample.chunk_frames.clamp(64, 16384);
        self.watcher_threads = self.watcher_threads.max(1);
        self
    }
}
