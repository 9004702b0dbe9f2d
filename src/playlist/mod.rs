// Playlist management
// Ordered, cyclic list of tracks with a current index

use std::path::{Path, PathBuf};

/// One playable file, identified by its path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Track {
    path: PathBuf,
}

impl Track {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name for display
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Default)]
pub struct Playlist {
    tracks: Vec<Track>,
    index: usize,
}

impl Playlist {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks, index: 0 }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<&Track> {
        self.tracks.get(self.index)
    }

    /// Indices reached by stepping from the current track in `direction`,
    /// wrapping at both ends. Visits every track once, ending on the current one.
    pub fn walk(&self, direction: Direction) -> impl Iterator<Item = usize> {
        let len = self.tracks.len();
        let mut index = self.index;
        (0..len).map(move |_| {
            index = step(index, len, direction);
            index
        })
    }

    /// Jump to `index`; None if it is out of range
    pub fn select(&mut self, index: usize) -> Option<usize> {
        if index >= self.tracks.len() {
            return None;
        }
        self.index = index;
        Some(index)
    }
}

fn step(index: usize, len: usize, direction: Direction) -> usize {
    match direction {
        Direction::Forward => (index + 1) % len,
        Direction::Backward => (index + len - 1) % len,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playlist(names: &[&str]) -> Playlist {
        Playlist::new(names.iter().map(|n| Track::new(format!("/music/{}", n))).collect())
    }

    /// Step once in `direction` the way a skip does
    fn step_once(list: &mut Playlist, direction: Direction) -> Option<usize> {
        let index = list.walk(direction).next()?;
        list.select(index)
    }

    #[test]
    fn test_next_cycles() {
        let mut list = playlist(&["a.ogg", "b.mp3"]);
        assert_eq!(step_once(&mut list, Direction::Forward), Some(1));
        assert_eq!(list.current().unwrap().name(), "b.mp3");
        assert_eq!(step_once(&mut list, Direction::Forward), Some(0));
        assert_eq!(list.current().unwrap().name(), "a.ogg");
    }

    #[test]
    fn test_previous_wraps_to_end() {
        let mut list = playlist(&["a.ogg", "b.mp3", "c.wav"]);
        assert_eq!(step_once(&mut list, Direction::Backward), Some(2));
        assert_eq!(list.current().unwrap().name(), "c.wav");
    }

    #[test]
    fn test_next_previous_are_inverse() {
        for len in 1..6 {
            let names: Vec<String> = (0..len).map(|i| format!("{}.wav", i)).collect();
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            for start in 0..len {
                let mut list = playlist(&names);
                list.select(start).unwrap();
                step_once(&mut list, Direction::Forward);
                step_once(&mut list, Direction::Backward);
                assert_eq!(list.index(), start);
                step_once(&mut list, Direction::Backward);
                step_once(&mut list, Direction::Forward);
                assert_eq!(list.index(), start);
            }
        }
    }

    #[test]
    fn test_walk_visits_every_track_once() {
        let mut list = playlist(&["a.ogg", "b.mp3", "c.wav", "d.wav"]);
        list.select(1).unwrap();
        assert_eq!(list.walk(Direction::Forward).collect::<Vec<_>>(), vec![2, 3, 0, 1]);
        assert_eq!(list.walk(Direction::Backward).collect::<Vec<_>>(), vec![0, 3, 2, 1]);
        assert_eq!(list.index(), 1);
    }

    #[test]
    fn test_empty_playlist_walk_is_empty() {
        let list = Playlist::default();
        assert_eq!(list.walk(Direction::Forward).count(), 0);
        assert_eq!(list.walk(Direction::Backward).count(), 0);
        assert!(list.current().is_none());
    }

    #[test]
    fn test_select_out_of_range() {
        let mut list = playlist(&["a.ogg", "b.mp3"]);
        list.select(1).unwrap();
        assert_eq!(list.select(2), None);
        assert_eq!(list.index(), 1);
    }

    #[test]
    fn test_track_name() {
        assert_eq!(Track::new("/music/song.mp3").name(), "song.mp3");
    }
}
