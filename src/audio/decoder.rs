// Decoder registry using Symphonia
// Maps file extensions to decode functions producing finite stereo PCM streams

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::{AudioBufferRef, AudioPlanes, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use tracing::{debug, warn};

use super::{SampleStream, StreamFormat};
use crate::error::DecodeError;

/// A decode function: takes an opened file and produces a stream plus its format
pub type DecodeFn = fn(&Path, File) -> Result<DecodedStream, DecodeError>;

/// Extension (lowercase, without the dot) to decoder
const DECODERS: &[(&str, DecodeFn)] = &[
    ("mp3", decode_mp3),
    ("ogg", decode_ogg),
    ("wav", decode_wav),
];

/// Extensions the registry can decode
pub fn supported_extensions() -> impl Iterator<Item = &'static str> {
    DECODERS.iter().map(|(ext, _)| *ext)
}

/// Look up the decode function for a path by its extension
pub fn decoder_for(path: &Path) -> Option<DecodeFn> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    DECODERS
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, decode)| *decode)
}

/// Whether a file would be accepted by `decode`
pub fn is_supported(path: &Path) -> bool {
    decoder_for(path).is_some()
}

/// Open and decode a file, choosing the decoder by extension
pub fn decode(path: &Path) -> Result<DecodedStream, DecodeError> {
    let decode = decoder_for(path).ok_or_else(|| DecodeError::Unsupported(path.to_path_buf()))?;
    let file = File::open(path).map_err(|source| DecodeError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    decode(path, file)
}

fn decode_mp3(path: &Path, file: File) -> Result<DecodedStream, DecodeError> {
    AudioDecoder::open(path, file, "mp3").map(DecodedStream::new)
}

fn decode_ogg(path: &Path, file: File) -> Result<DecodedStream, DecodeError> {
    AudioDecoder::open(path, file, "ogg").map(DecodedStream::new)
}

fn decode_wav(path: &Path, file: File) -> Result<DecodedStream, DecodeError> {
    AudioDecoder::open(path, file, "wav").map(DecodedStream::new)
}

/// Symphonia format reader + codec state for one file
struct AudioDecoder {
    path: PathBuf,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
}

impl AudioDecoder {
    /// Probe an opened file and prepare for decoding
    fn open(path: &Path, file: File, extension: &str) -> Result<Self, DecodeError> {
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        hint.with_extension(extension);

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::Probe {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let format = probed.format;

        // Find the first audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::NoTrack(path.to_path_buf()))?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Codec {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
        })
    }

    /// Decode next packet, returns interleaved f32 samples at the file's channel count.
    /// Returns None when end of stream is reached
    fn decode_next(&mut self) -> Result<Option<Vec<f32>>, SymphoniaError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(e),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => return Ok(Some(Self::audio_buf_to_f32(&decoded))),
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error in {} (skipping packet): {}", self.path.display(), e);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Convert any AudioBufferRef to interleaved f32 samples
    fn audio_buf_to_f32(buf: &AudioBufferRef) -> Vec<f32> {
        match buf {
            AudioBufferRef::F32(b) => Self::interleave_convert(b.planes(), b.frames(), |s: f32| s),
            AudioBufferRef::F64(b) => {
                Self::interleave_convert(b.planes(), b.frames(), |s: f64| s as f32)
            }
            AudioBufferRef::S8(b) => {
                let scale = 1.0 / 128.0;
                Self::interleave_convert(b.planes(), b.frames(), |s: i8| s as f32 * scale)
            }
            AudioBufferRef::S16(b) => {
                let scale = 1.0 / 32768.0;
                Self::interleave_convert(b.planes(), b.frames(), |s: i16| s as f32 * scale)
            }
            AudioBufferRef::S24(b) => {
                let scale = 1.0 / 8388608.0;
                Self::interleave_convert(b.planes(), b.frames(), |s| s.inner() as f32 * scale)
            }
            AudioBufferRef::S32(b) => {
                let scale = 1.0 / 2147483648.0;
                Self::interleave_convert(b.planes(), b.frames(), |s: i32| s as f32 * scale)
            }
            AudioBufferRef::U8(b) => {
                Self::interleave_convert(b.planes(), b.frames(), |s: u8| (s as f32 - 128.0) / 128.0)
            }
            AudioBufferRef::U16(b) => Self::interleave_convert(b.planes(), b.frames(), |s: u16| {
                (s as f32 - 32768.0) / 32768.0
            }),
            AudioBufferRef::U24(b) => Self::interleave_convert(b.planes(), b.frames(), |s| {
                (s.inner() as f32 - 8388608.0) / 8388608.0
            }),
            AudioBufferRef::U32(b) => Self::interleave_convert(b.planes(), b.frames(), |s: u32| {
                (s as f64 - 2147483648.0) as f32 / 2147483648.0
            }),
        }
    }

    fn interleave_convert<T: Sample + Copy, F: Fn(T) -> f32>(
        planes: AudioPlanes<T>,
        frames: usize,
        convert: F,
    ) -> Vec<f32> {
        let num_channels = planes.planes().len();
        if num_channels == 0 || frames == 0 {
            return vec![];
        }

        let mut interleaved = Vec::with_capacity(frames * num_channels);

        for frame in 0..frames {
            for ch in 0..num_channels {
                interleaved.push(convert(planes.planes()[ch][frame]));
            }
        }

        interleaved
    }
}

/// A live decode handle producing interleaved stereo samples for one track.
///
/// Holds the file handle and codec state until `close` is called.
pub struct DecodedStream {
    decoder: Option<AudioDecoder>,
    format: StreamFormat,
    /// Stereo samples decoded but not yet handed out
    pending: Vec<f32>,
    cursor: usize,
}

impl DecodedStream {
    fn new(decoder: AudioDecoder) -> Self {
        let format = StreamFormat {
            sample_rate: decoder.sample_rate,
            channels: decoder.channels as u16,
        };
        debug!(
            "Opened {} ({} Hz, {} ch)",
            decoder.path.display(),
            format.sample_rate,
            format.channels
        );
        Self {
            decoder: Some(decoder),
            format,
            pending: Vec::new(),
            cursor: 0,
        }
    }

    /// Native format of the file
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Decode the next packet into `pending`, returns false at end of stream
    fn refill(&mut self) -> bool {
        let Some(decoder) = self.decoder.as_mut() else {
            return false;
        };
        loop {
            match decoder.decode_next() {
                Ok(Some(samples)) => {
                    if samples.is_empty() {
                        continue;
                    }
                    self.pending = to_stereo(&samples, decoder.channels);
                    self.cursor = 0;
                    return true;
                }
                Ok(None) => return false,
                Err(e) => {
                    warn!("Stopping {} early: {}", decoder.path.display(), e);
                    return false;
                }
            }
        }
    }
}

impl SampleStream for DecodedStream {
    fn read(&mut self, out: &mut [f32]) -> usize {
        let mut written = 0;
        while written < out.len() {
            if self.cursor >= self.pending.len() && !self.refill() {
                break;
            }
            let available = &self.pending[self.cursor..];
            let n = available.len().min(out.len() - written);
            out[written..written + n].copy_from_slice(&available[..n]);
            self.cursor += n;
            written += n;
        }
        written
    }

    fn close(&mut self) {
        if let Some(decoder) = self.decoder.take() {
            debug!("Closed {}", decoder.path.display());
        }
        self.pending.clear();
        self.cursor = 0;
    }
}

/// Map interleaved samples with `channels` channels to interleaved stereo.
///
/// Mono is duplicated to both sides; channels past the first two are dropped.
fn to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        2 => samples.to_vec(),
        0 => Vec::new(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        n => samples
            .chunks_exact(n)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        assert!(is_supported(Path::new("/music/a.mp3")));
        assert!(is_supported(Path::new("/music/b.ogg")));
        assert!(is_supported(Path::new("/music/c.wav")));
        assert!(is_supported(Path::new("/music/LOUD.MP3")));
        assert!(!is_supported(Path::new("/music/d.flac")));
        assert!(!is_supported(Path::new("/music/README")));
    }

    #[test]
    fn test_supported_extensions() {
        let exts: Vec<_> = supported_extensions().collect();
        assert_eq!(exts, vec!["mp3", "ogg", "wav"]);
    }

    #[test]
    fn test_decode_unsupported_is_an_error() {
        match decode(Path::new("/music/track.flac")) {
            Err(DecodeError::Unsupported(path)) => assert_eq!(path, Path::new("/music/track.flac")),
            other => panic!("expected Unsupported, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_decode_missing_file() {
        assert!(matches!(
            decode(Path::new("/definitely/not/here.wav")),
            Err(DecodeError::Open { .. })
        ));
    }

    #[test]
    fn test_to_stereo_mono() {
        assert_eq!(to_stereo(&[0.1, 0.2], 1), vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn test_to_stereo_surround() {
        let six = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
        assert_eq!(to_stereo(&six, 6), vec![1.0, 2.0, 7.0, 8.0]);
    }
}
