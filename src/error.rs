// Error types
// Typed errors for scanning, decoding and the output device

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read directory {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("No supported audio files in {0}")]
    EmptyPlaylist(PathBuf),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Index {index} out of range for playlist of {len} tracks")]
    OutOfRange { index: usize, len: usize },

    #[error("Runtime error: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Errors raised while opening or decoding a track
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unsupported file extension: {0}")]
    Unsupported(PathBuf),

    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to probe {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("No audio track found in {0}")]
    NoTrack(PathBuf),

    #[error("Failed to create decoder for {path}: {reason}")]
    Codec { path: PathBuf, reason: String },

    #[error("Resampler failed: {0}")]
    Resample(String),

    #[error("Every track in the playlist failed to decode")]
    PlaylistUndecodable,
}

/// Output device errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No output device available")]
    NoDevice,

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Output thread exited before the stream started")]
    OutputThreadGone,
}

/// Result type alias for the engine
pub type Result<T> = std::result::Result<T, Error>;
