// termsloth - playback engine for a terminal music player
// Module declarations
pub mod audio;
pub mod commands;
pub mod error;
pub mod library;
pub mod playlist;
pub mod settings;

pub use audio::{OutputDevice, Player};
pub use error::{Error, Result};
pub use playlist::{Playlist, Track};
pub use settings::PlayerSettings;
