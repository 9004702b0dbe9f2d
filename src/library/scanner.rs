use std::path::Path;
use walkdir::WalkDir;

use crate::audio::decoder;
use crate::error::{Error, Result};
use crate::playlist::Track;

/// List the playable files directly inside `directory`.
///
/// Not recursive. Keeps directory enumeration order and skips files the
/// decoder registry does not support.
pub fn list_tracks<P: AsRef<Path>>(directory: P) -> Result<Vec<Track>> {
    let directory = directory.as_ref();
    let mut tracks = Vec::new();

    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
    {
        let entry = entry.map_err(|source| Error::Scan {
            path: directory.to_path_buf(),
            source,
        })?;

        // Skip directories
        if entry.file_type().is_dir() {
            continue;
        }

        if decoder::is_supported(entry.path()) {
            tracks.push(Track::new(entry.path()));
        }
    }

    if tracks.is_empty() {
        return Err(Error::EmptyPlaylist(directory.to_path_buf()));
    }
    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_filters_unsupported_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.mp3"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        fs::write(dir.path().join("b.wav"), b"").unwrap();
        fs::create_dir(dir.path().join("nested.ogg")).unwrap();
        fs::write(dir.path().join("nested.ogg").join("c.ogg"), b"").unwrap();

        let mut names: Vec<_> = list_tracks(dir.path())
            .unwrap()
            .iter()
            .map(|t| t.name())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.mp3", "b.wav"]);
    }

    #[test]
    fn test_order_matches_enumeration() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["z.ogg", "a.wav", "m.mp3"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let expected: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        let listed: Vec<_> = list_tracks(dir.path())
            .unwrap()
            .into_iter()
            .map(|t| t.path().to_path_buf())
            .collect();
        assert_eq!(listed, expected);
    }

    #[test]
    fn test_empty_playlist() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cover.jpg"), b"").unwrap();
        assert!(matches!(list_tracks(dir.path()), Err(Error::EmptyPlaylist(_))));
    }

    #[test]
    fn test_missing_directory_is_scan_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        assert!(matches!(list_tracks(&missing), Err(Error::Scan { .. })));
    }
}
