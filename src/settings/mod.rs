// Settings module
// Runtime tunables for the output device, resampler and watcher runtime

pub mod settings;

pub use settings::{OutputSettings, PlayerSettings, ResampleSettings};
