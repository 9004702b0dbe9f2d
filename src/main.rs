// termsloth - terminal front end for the playback engine
// Reads one command per line from stdin; see `HELP` for the keys

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use termsloth::commands::{self, Command};
use termsloth::settings::{OutputSettings, PlayerSettings, ResampleSettings};
use termsloth::Player;

const HELP: &str = "[o <dir>] open folder  [p] play/pause  [n] next  [b] previous  \
[s <n>] select  [+/-] volume  [l] list  [q] quit";

/// Command-line arguments for termsloth
#[derive(Parser, Debug)]
#[command(name = "termsloth")]
#[command(about = "Terminal music player")]
#[command(version)]
struct Args {
    /// Folder to load on startup
    directory: Option<PathBuf>,

    /// Start playing as soon as a folder is loaded
    #[arg(long)]
    autoplay: bool,

    /// Output buffer length in milliseconds
    #[arg(long, default_value = "100", env = "TERMSLOTH_BUFFER_MS")]
    buffer_ms: u32,

    /// Frames per resampler pass
    #[arg(long, default_value = "1024", env = "TERMSLOTH_RESAMPLE_CHUNK")]
    resample_chunk: usize,
}

fn main() -> Result<()> {
    // Logs go to stderr so they do not interleave with status lines
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "termsloth=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();

    let settings = PlayerSettings {
        output: OutputSettings {
            buffer_ms: args.buffer_ms,
        },
        resample: ResampleSettings {
            chunk_frames: args.resample_chunk,
        },
        ..PlayerSettings::default()
    };

    let player = Arc::new(Player::new(settings).context("Failed to initialize player")?);

    let weak = Arc::downgrade(&player);
    player.set_on_track_changed(move || {
        if let Some(player) = weak.upgrade() {
            if let Some((track, index)) = player.current_track() {
                info!("Track changed to {} ({})", track.name(), index + 1);
            }
        }
    });

    if let Some(dir) = args.directory {
        let status = commands::dispatch(&player, &Command::Open(dir))
            .context("Failed to load startup folder")?;
        println!("{}", status);
        if args.autoplay {
            player.play_pause();
        }
    }

    println!("{}", HELP);
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        let Some(command) = Command::parse(&line) else {
            println!("{}", HELP);
            continue;
        };
        if command == Command::Quit {
            break;
        }
        match commands::dispatch(&player, &command) {
            Ok(status) => println!("{}", status),
            Err(e) => warn!("{}", e),
        }
        io::stdout().flush().ok();
    }

    player.shutdown();
    Ok(())
}
