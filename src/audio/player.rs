// Audio player
// Owns the playlist and the one attached stream, and drives track changes

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info, warn};

use super::decoder::{self, DecodedStream};
use super::output::{OutputDevice, Voice, VoiceId};
use super::resampler::Resampler;
use super::shim::Ctrl;
use super::volume::VolumeController;
use super::watcher::{CancelHandle, Outcome, Pending, Watcher};
use super::SampleStream;
use crate::error::{DecodeError, Error, Result};
use crate::library::scanner;
use crate::playlist::{Direction, Playlist, Track};
use crate::settings::PlayerSettings;

type TrackChanged = Arc<dyn Fn() + Send + Sync>;

pub struct Player {
    shared: Arc<Shared>,
    runtime: Option<Runtime>,
}

struct Shared {
    session: Mutex<Session>,
    device: Arc<OutputDevice>,
    runtime: Handle,
    settings: PlayerSettings,
    on_track_changed: Mutex<Option<TrackChanged>>,
}

#[derive(Default)]
struct Session {
    playlist: Playlist,
    volume: VolumeController,
    /// Whether newly attached streams start playing
    playing: bool,
    attached: Option<Attached>,
    directory: Option<PathBuf>,
}

/// The stream currently on the device and the handle to its watcher
struct Attached {
    voice: VoiceId,
    cancel: CancelHandle,
}

impl Player {
    /// Create a player on the process-wide output device
    pub fn new(settings: PlayerSettings) -> Result<Self> {
        let settings = settings.sanitized();
        let device = OutputDevice::shared(settings.output.buffer_ms);
        Self::with_device(device, settings)
    }

    /// Create a player on a specific output device
    pub fn with_device(device: Arc<OutputDevice>, settings: PlayerSettings) -> Result<Self> {
        let settings = settings.sanitized();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(settings.watcher_threads)
            .thread_name("track-watcher")
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;

        let shared = Arc::new(Shared {
            session: Mutex::new(Session::default()),
            device,
            runtime: runtime.handle().clone(),
            settings,
            on_track_changed: Mutex::new(None),
        });

        Ok(Self {
            shared,
            runtime: Some(runtime),
        })
    }

    /// Register the callback fired after every track change
    pub fn set_on_track_changed<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.shared.on_track_changed.lock() = Some(Arc::new(callback));
    }

    /// Toggle pause on the attached stream. False if nothing is attached.
    pub fn play_pause(&self) -> bool {
        let mut session = self.shared.session.lock();
        let Some(attached) = session.attached.as_ref() else {
            return false;
        };

        let paused = {
            let mut mixer = self.shared.device.lock();
            let Some(voice) = mixer.voice_mut(attached.voice) else {
                // Drained, the watcher is about to replace it
                return false;
            };
            let paused = !voice.is_paused();
            voice.set_paused(paused);
            paused
        };

        session.playing = !paused;
        debug!("Playback {}", if paused { "paused" } else { "resumed" });
        true
    }

    /// Skip to the next track. Ok(false) on an empty playlist.
    pub fn next(&self) -> Result<bool> {
        self.skip(Direction::Forward)
    }

    /// Skip to the previous track. Ok(false) on an empty playlist.
    pub fn previous(&self) -> Result<bool> {
        self.skip(Direction::Backward)
    }

    /// Jump to the track at `index`. Ok(false) on an empty playlist.
    pub fn select(&self, index: usize) -> Result<bool> {
        {
            let mut session = self.shared.session.lock();
            let len = session.playlist.len();
            if len == 0 {
                return Ok(false);
            }
            if index >= len {
                return Err(Error::OutOfRange { index, len });
            }
            self.shared.attach_first_playable(&mut session, std::iter::once(index))?;
        }
        self.shared.notify();
        Ok(true)
    }

    fn skip(&self, direction: Direction) -> Result<bool> {
        {
            let mut session = self.shared.session.lock();
            if session.playlist.is_empty() {
                return Ok(false);
            }
            self.shared.skip_locked(&mut session, direction)?;
        }
        self.shared.notify();
        Ok(true)
    }

    /// Replace the playlist.
    ///
    /// The first assignment only stores the tracks. Replacing an existing
    /// playlist resets to index 0 and loads that track. Empty lists are ignored.
    pub fn load_playlist(&self, tracks: Vec<Track>) -> Result<()> {
        if tracks.is_empty() {
            warn!("Ignoring empty playlist");
            return Ok(());
        }

        let switched = {
            let mut session = self.shared.session.lock();
            self.shared.replace_playlist(&mut session, tracks)?
        };

        if switched {
            self.shared.notify();
        }
        Ok(())
    }

    /// Scan `directory` and make its tracks the playlist.
    /// Rescanning the directory already loaded does nothing.
    pub fn load_directory<P: AsRef<Path>>(&self, directory: P) -> Result<usize> {
        let directory = directory.as_ref();
        let (count, switched) = {
            let mut session = self.shared.session.lock();
            if session.directory.as_deref() == Some(directory) {
                return Ok(session.playlist.len());
            }

            let tracks = scanner::list_tracks(directory)?;
            let count = tracks.len();
            let switched = self.shared.replace_playlist(&mut session, tracks)?;
            session.directory = Some(directory.to_path_buf());
            info!("Loaded {} tracks from {}", count, directory.display());
            (count, switched)
        };

        if switched {
            self.shared.notify();
        }
        Ok(count)
    }

    /// Raise the volume one step, returns the new level in percent
    pub fn increase_volume(&self) -> f64 {
        let mut session = self.shared.session.lock();
        let percent = session.volume.increase();
        self.shared.apply_volume(&session);
        percent
    }

    /// Lower the volume one step, returns the new level in percent
    pub fn decrease_volume(&self) -> f64 {
        let mut session = self.shared.session.lock();
        let percent = session.volume.decrease();
        self.shared.apply_volume(&session);
        percent
    }

    pub fn volume_percent(&self) -> f64 {
        self.shared.session.lock().volume.percent()
    }

    /// Current track and its index
    pub fn current_track(&self) -> Option<(Track, usize)> {
        let session = self.shared.session.lock();
        let index = session.playlist.index();
        session.playlist.current().cloned().map(|track| (track, index))
    }

    pub fn tracks(&self) -> Vec<Track> {
        self.shared.session.lock().playlist.tracks().to_vec()
    }

    pub fn is_playing(&self) -> bool {
        self.shared.session.lock().playing
    }

    /// Whether a stream is attached to the device
    pub fn is_attached(&self) -> bool {
        self.shared.session.lock().attached.is_some()
    }

    /// Flush the active stream
    pub fn shutdown(&self) {
        let mut session = self.shared.session.lock();
        self.shared.teardown(&mut session);
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl Shared {
    fn notify(&self) {
        let callback = self.on_track_changed.lock().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Install `tracks` as the playlist. Returns whether a track was loaded.
    /// If none of the new tracks decodes, the previous playlist is put back.
    fn replace_playlist(self: &Arc<Self>, session: &mut Session, tracks: Vec<Track>) -> Result<bool> {
        let previous = std::mem::replace(&mut session.playlist, Playlist::new(tracks));
        if previous.is_empty() {
            return Ok(false);
        }

        let len = session.playlist.len();
        if let Err(e) = self.attach_first_playable(session, 0..len) {
            session.playlist = previous;
            return Err(e);
        }
        Ok(true)
    }

    /// Step the playlist in `direction` until a track decodes and attach it.
    /// Restores the index if no track in the playlist decodes.
    fn skip_locked(self: &Arc<Self>, session: &mut Session, direction: Direction) -> Result<()> {
        let candidates: Vec<usize> = session.playlist.walk(direction).collect();
        self.attach_first_playable(session, candidates)
    }

    /// Try each index in turn; the first that decodes becomes current and is attached
    fn attach_first_playable(
        self: &Arc<Self>,
        session: &mut Session,
        candidates: impl IntoIterator<Item = usize>,
    ) -> Result<()> {
        let start = session.playlist.index();
        for index in candidates {
            let Some(track) = session.playlist.tracks().get(index).cloned() else {
                continue;
            };
            match decoder::decode(track.path()) {
                Ok(stream) => {
                    session.playlist.select(index);
                    let attached = self.attach(session, &track, stream);
                    if attached.is_err() {
                        session.playlist.select(start);
                    }
                    return attached;
                }
                Err(e) => warn!("Skipping {}: {}", track.name(), e),
            }
        }
        session.playlist.select(start);
        Err(DecodeError::PlaylistUndecodable.into())
    }

    /// Wrap a freshly opened stream, replace the attached one with it and
    /// start its watcher
    fn attach(self: &Arc<Self>, session: &mut Session, track: &Track, stream: DecodedStream) -> Result<()> {
        let format = stream.format();

        // First load fixes the device rate for the process
        let device_rate = self.device.init(format.sample_rate)?;

        let source: Box<dyn SampleStream> = if format.sample_rate != device_rate {
            Box::new(Resampler::new(
                stream,
                format.sample_rate,
                device_rate,
                self.settings.resample.chunk_frames,
            )?)
        } else {
            Box::new(stream)
        };
        let chain = session.volume.wrap(Ctrl::new(source, !session.playing));

        self.teardown(session);

        let (watcher, finish, cancel) = Watcher::new();
        let voice = self.device.lock().play(Voice::new(chain, move || finish.fire()));
        session.attached = Some(Attached { voice, cancel });
        self.spawn_watcher(watcher);

        info!(
            "Now playing {} ({}/{}, {}Hz)",
            track.name(),
            session.playlist.index() + 1,
            session.playlist.len(),
            format.sample_rate
        );
        Ok(())
    }

    /// Cancel the watcher, then close the stream, then drop the shim handles.
    /// A cancelled watcher never advances, so this ordering keeps a skip and a
    /// natural finish from both moving the playlist.
    fn teardown(&self, session: &mut Session) {
        let Some(attached) = session.attached.take() else {
            return;
        };
        let Attached { voice, cancel } = attached;

        cancel.cancel();
        {
            let mut mixer = self.device.lock();
            if let Some(voice) = mixer.remove(voice) {
                voice.close();
            }
        }
        debug!("Detached voice {:?}", voice);
    }

    fn apply_volume(&self, session: &Session) {
        let Some(attached) = session.attached.as_ref() else {
            return;
        };
        let mut mixer = self.device.lock();
        if let Some(voice) = mixer.voice_mut(attached.voice) {
            session.volume.apply(voice.volume_mut());
        }
    }

    fn spawn_watcher(self: &Arc<Self>, watcher: Watcher) {
        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            match watcher.wait().await {
                Outcome::Cancelled => debug!("Watcher cancelled"),
                Outcome::Finished(pending) => {
                    let result =
                        tokio::task::spawn_blocking(move || shared.advance_after_finish(pending)).await;
                    if let Err(e) = result {
                        warn!("Auto-advance task failed: {}", e);
                    }
                }
            }
        });
    }

    /// Natural end of a track: advance once, unless a skip got there first
    fn advance_after_finish(self: &Arc<Self>, mut pending: Pending) {
        let advanced = {
            let mut session = self.session.lock();
            if pending.is_cancelled() {
                debug!("Finished stream was already replaced");
                return;
            }
            match self.skip_locked(&mut session, Direction::Forward) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Stopping playback, could not advance: {}", e);
                    self.teardown(&mut session);
                    false
                }
            }
        };

        if advanced {
            self.notify();
        }
    }
}
