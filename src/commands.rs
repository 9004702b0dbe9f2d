// Command handlers
// Maps terminal input lines to player operations and renders status lines
use std::path::PathBuf;

use crate::audio::Player;
use crate::error::Result;

pub const PLAY_ICON: &str = "⏵";
pub const PAUSE_ICON: &str = "⏸";
pub const NEXT_ICON: &str = "⏭";
pub const PREV_ICON: &str = "⏮";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    PlayPause,
    Next,
    Previous,
    VolumeUp,
    VolumeDown,
    /// Zero-based playlist index
    Select(usize),
    Open(PathBuf),
    List,
    Quit,
}

impl Command {
    /// Parse one input line. Selection indices are typed one-based.
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };

        match (head, rest.is_empty()) {
            ("p", true) => Some(Command::PlayPause),
            ("n", true) => Some(Command::Next),
            ("b", true) => Some(Command::Previous),
            ("+" | "=", true) => Some(Command::VolumeUp),
            ("-", true) => Some(Command::VolumeDown),
            ("l", true) => Some(Command::List),
            ("q", true) => Some(Command::Quit),
            ("s", false) => match rest.parse::<usize>() {
                Ok(n) if n > 0 => Some(Command::Select(n - 1)),
                _ => None,
            },
            ("o", false) => Some(Command::Open(PathBuf::from(rest))),
            _ => None,
        }
    }
}

/// Run a command against the player, returning the status line to show
pub fn dispatch(player: &Player, command: &Command) -> Result<String> {
    let status = match command {
        Command::PlayPause => {
            if !player.play_pause() {
                return Ok("Nothing loaded".to_string());
            }
            // Icon names the action the next toggle performs
            if player.is_playing() {
                format!("{} {}", PAUSE_ICON, now_playing(player))
            } else {
                format!("{} {}", PLAY_ICON, now_playing(player))
            }
        }
        Command::Next => {
            if !player.next()? {
                return Ok("Playlist is empty".to_string());
            }
            format!("{} {}", NEXT_ICON, now_playing(player))
        }
        Command::Previous => {
            if !player.previous()? {
                return Ok("Playlist is empty".to_string());
            }
            format!("{} {}", PREV_ICON, now_playing(player))
        }
        Command::VolumeUp => format_volume(player.increase_volume()),
        Command::VolumeDown => format_volume(player.decrease_volume()),
        Command::Select(index) => {
            if !player.select(*index)? {
                return Ok("Playlist is empty".to_string());
            }
            now_playing(player)
        }
        Command::Open(dir) => {
            let count = player.load_directory(dir)?;
            if !player.is_attached() {
                player.select(0)?;
            }
            format!("{} tracks from {}", count, dir.display())
        }
        Command::List => render_playlist(player),
        Command::Quit => String::new(),
    };
    Ok(status)
}

pub fn format_volume(percent: f64) -> String {
    format!("Volume: {:.1}%", percent)
}

fn now_playing(player: &Player) -> String {
    match player.current_track() {
        Some((track, _)) => track.name(),
        None => String::new(),
    }
}

/// One line per track, current track marked
pub fn render_playlist(player: &Player) -> String {
    let current = player.current_track().map(|(_, index)| index);
    player
        .tracks()
        .iter()
        .enumerate()
        .map(|(i, track)| {
            let marker = if Some(i) == current { ">" } else { " " };
            format!("{} {:>3}. {}", marker, i + 1, track.name())
        })
        .collect::<Vec<_>>()
        .join("\n")
}
