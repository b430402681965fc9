//! Track library
//!
//! Lists playable files and picks the next track at random.

use rand::seq::SliceRandom;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::LibraryConfig;
use crate::error::LibraryError;

/// A playable file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track {
    /// File name shown to listeners
    pub name: String,
    pub path: PathBuf,
}

impl Track {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { name, path }
    }
}

/// Source of the next track
pub trait TrackSelector: Send + Sync {
    /// Every eligible track
    fn tracks(&self) -> Result<Vec<Track>, LibraryError>;

    /// Pick a track independently of any previous pick
    fn select_random_track(&self) -> Result<Track, LibraryError>;
}

/// Tracks found in a folder on disk
#[derive(Debug, Clone)]
pub struct DirectoryLibrary {
    folder: PathBuf,
    extensions: Vec<String>,
}

impl DirectoryLibrary {
    pub fn new(config: &LibraryConfig) -> Self {
        Self {
            folder: config.folder.clone(),
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn is_eligible(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }
}

impl TrackSelector for DirectoryLibrary {
    fn tracks(&self) -> Result<Vec<Track>, LibraryError> {
        let entries = std::fs::read_dir(&self.folder).map_err(|e| LibraryError::Unreadable {
            path: self.folder.clone(),
            reason: e.to_string(),
        })?;

        let mut tracks: Vec<Track> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && self.is_eligible(path))
            .map(Track::new)
            .collect();
        tracks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tracks)
    }

    fn select_random_track(&self) -> Result<Track, LibraryError> {
        let tracks = self.tracks()?;
        tracks
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| LibraryError::NoTracksFound(self.folder.clone()))
    }
}

/// A fixed set of tracks
#[derive(Debug, Clone, Default)]
pub struct StaticLibrary {
    tracks: Vec<Track>,
}

impl StaticLibrary {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }
}

impl TrackSelector for StaticLibrary {
    fn tracks(&self) -> Result<Vec<Track>, LibraryError> {
        Ok(self.tracks.clone())
    }

    fn select_random_track(&self) -> Result<Track, LibraryError> {
        self.tracks
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| LibraryError::NoTracksFound(PathBuf::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("radio-library-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_lists_only_eligible_files() {
        let dir = scratch_dir();
        for name in ["b.mp3", "a.MP3", "cover.jpg", "notes.txt"] {
            std::fs::write(dir.join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.join("nested.mp3")).unwrap();

        let library = DirectoryLibrary::new(&LibraryConfig {
            folder: dir.clone(),
            extensions: vec![".mp3".to_string()],
        });
        let names: Vec<_> = library.tracks().unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["a.MP3", "b.mp3"]);

        let picked = library.select_random_track().unwrap();
        assert!(picked.path.starts_with(&dir));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_empty_folder_has_no_tracks() {
        let dir = scratch_dir();
        let library = DirectoryLibrary::new(&LibraryConfig {
            folder: dir.clone(),
            ..Default::default()
        });
        assert!(matches!(
            library.select_random_track(),
            Err(LibraryError::NoTracksFound(_))
        ));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_folder_is_unreadable() {
        let library = DirectoryLibrary::new(&LibraryConfig {
            folder: PathBuf::from("/nonexistent/radio-relay-library"),
            ..Default::default()
        });
        assert!(matches!(library.tracks(), Err(LibraryError::Unreadable { .. })));
    }

    #[test]
    fn test_static_library() {
        let library = StaticLibrary::new(vec![Track::new("/music/one.mp3")]);
        assert_eq!(library.select_random_track().unwrap().name, "one.mp3");
        assert!(StaticLibrary::default().select_random_track().is_err());
    }
}
