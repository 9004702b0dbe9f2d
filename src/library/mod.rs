// Library module
// Directory scanning for playable files

pub mod scanner;

pub use scanner::list_tracks;
