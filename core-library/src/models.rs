//! Domain models for the collection store.
//!
//! [`Song`] is the track record persisted in the `songs` table; rows map onto
//! it 1:1 through `sqlx::FromRow`. A song that has not been persisted yet
//! carries [`Song::UNSAVED_ID`].

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row of music metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(default)]
pub struct Song {
    /// Surrogate id, stable once assigned.
    pub id: i64,
    /// External id, stable across rescans of the same logical track. May be empty.
    pub song_id: String,
    /// Owning directory, if the song came from a watched folder.
    pub directory_id: Option<i64>,
    pub url: String,

    pub title: String,
    pub album: String,
    pub artist: String,
    pub album_artist: String,
    pub composer: String,
    pub performer: String,
    pub grouping: String,
    pub genre: String,
    pub comment: String,

    pub track: i32,
    pub disc: i32,
    pub year: i32,
    pub original_year: i32,

    /// Lowercase container name, e.g. `flac`.
    pub filetype: String,
    pub samplerate: i32,
    pub bitdepth: i32,
    pub bitrate: i32,
    pub length_nanosec: i64,

    /// Compilation flag read from the tags.
    pub compilation: bool,
    /// Set by the compilation classifier.
    pub compilation_detected: bool,
    /// User override forcing the song into a compilation.
    pub compilation_on: bool,
    /// User override forcing the song out of a compilation.
    pub compilation_off: bool,
    pub compilation_effective: bool,
    pub unavailable: bool,

    pub playcount: i32,
    pub skipcount: i32,
    pub rating: f64,
    pub lastplayed: i64,
    pub lastseen: i64,
    pub ctime: i64,
    pub mtime: i64,
}

impl Default for Song {
    fn default() -> Self {
        Self {
            id: Song::UNSAVED_ID,
            song_id: String::new(),
            directory_id: None,
            url: String::new(),
            title: String::new(),
            album: String::new(),
            artist: String::new(),
            album_artist: String::new(),
            composer: String::new(),
            performer: String::new(),
            grouping: String::new(),
            genre: String::new(),
            comment: String::new(),
            track: -1,
            disc: -1,
            year: -1,
            original_year: -1,
            filetype: String::new(),
            samplerate: -1,
            bitdepth: -1,
            bitrate: -1,
            length_nanosec: -1,
            compilation: false,
            compilation_detected: false,
            compilation_on: false,
            compilation_off: false,
            compilation_effective: false,
            unavailable: false,
            playcount: 0,
            skipcount: 0,
            rating: -1.0,
            lastplayed: -1,
            lastseen: -1,
            ctime: -1,
            mtime: -1,
        }
    }
}

impl Song {
    /// Id carried by a song that has never been persisted.
    pub const UNSAVED_ID: i64 = -1;

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id != Self::UNSAVED_ID
    }

    pub fn is_valid(&self) -> bool {
        !self.url.is_empty()
    }

    /// Album artist if present, otherwise the track artist.
    pub fn effective_albumartist(&self) -> &str {
        if self.album_artist.is_empty() {
            &self.artist
        } else {
            &self.album_artist
        }
    }

    /// Original release year if known, otherwise the release year.
    pub fn effective_original_year(&self) -> i32 {
        if self.original_year > 0 {
            self.original_year
        } else {
            self.year
        }
    }

    /// `(compilation OR compilation_detected OR compilation_on) AND NOT compilation_off`
    pub fn is_compilation(&self) -> bool {
        (self.compilation || self.compilation_detected || self.compilation_on)
            && !self.compilation_off
    }

    /// Recompute `compilation_effective` from the four source flags.
    pub fn refresh_compilation_effective(&mut self) {
        self.compilation_effective = self.is_compilation();
    }

    /// Location with the file name removed, keeping the trailing separator.
    ///
    /// Two songs share a directory exactly when this value is equal.
    pub fn directory_url(&self) -> &str {
        match self.url.rfind('/') {
            Some(pos) => &self.url[..=pos],
            None => "",
        }
    }

    /// Compare every user-visible field. Statistics, timestamps, availability
    /// and the classifier/override flags are ignored.
    pub fn is_metadata_equal(&self, other: &Song) -> bool {
        self.url == other.url
            && self.title == other.title
            && self.album == other.album
            && self.artist == other.artist
            && self.album_artist == other.album_artist
            && self.composer == other.composer
            && self.performer == other.performer
            && self.grouping == other.grouping
            && self.genre == other.genre
            && self.comment == other.comment
            && self.track == other.track
            && self.disc == other.disc
            && self.year == other.year
            && self.original_year == other.original_year
            && self.filetype == other.filetype
            && self.samplerate == other.samplerate
            && self.bitdepth == other.bitdepth
            && self.bitrate == other.bitrate
            && self.length_nanosec == other.length_nanosec
            && self.compilation == other.compilation
    }

    /// Snapshot of `self` (the persisted record) carrying the metadata of
    /// `incoming`.
    ///
    /// Keeps the persisted id, statistics, creation time, availability and
    /// compilation flags owned by the classifier and the user, then
    /// recomputes `compilation_effective`.
    pub fn with_metadata_from(&self, incoming: &Song) -> Song {
        let mut merged = Song {
            id: self.id,
            compilation_detected: self.compilation_detected,
            compilation_on: self.compilation_on,
            compilation_off: self.compilation_off,
            unavailable: self.unavailable,
            playcount: self.playcount,
            skipcount: self.skipcount,
            rating: self.rating,
            lastplayed: self.lastplayed,
            lastseen: self.lastseen,
            ctime: self.ctime,
            ..incoming.clone()
        };
        if merged.song_id.is_empty() {
            merged.song_id = self.song_id.clone();
        }
        if merged.directory_id.is_none() {
            merged.directory_id = self.directory_id;
        }
        merged.refresh_compilation_effective();
        merged
    }

    /// Short upper-case label for the file type, e.g. `FLAC`.
    pub fn text_for_filetype(&self) -> String {
        match self.filetype.as_str() {
            "" => "Unknown".to_string(),
            "wavpack" => "WavPack".to_string(),
            "mpeg" => "MP3".to_string(),
            "mp4" => "MP4 AAC".to_string(),
            "oggvorbis" => "Ogg Vorbis".to_string(),
            "oggopus" => "Ogg Opus".to_string(),
            other => other.to_uppercase(),
        }
    }
}

/// A watched folder owning zero or more songs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Directory {
    pub id: i64,
    pub path: String,
}

/// Symmetric change set produced by one backend operation.
///
/// Consumers apply `removed` before `added`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SongDelta {
    pub added: Vec<Song>,
    pub removed: Vec<Song>,
}

impl SongDelta {
    pub fn new(added: Vec<Song>, removed: Vec<Song>) -> Self {
        Self { added, removed }
    }

    pub fn added(songs: Vec<Song>) -> Self {
        Self {
            added: songs,
            removed: Vec::new(),
        }
    }

    pub fn removed(songs: Vec<Song>) -> Self {
        Self {
            added: Vec::new(),
            removed: songs,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn extend(&mut self, other: SongDelta) {
        self.added.extend(other.added);
        self.removed.extend(other.removed);
    }
}

/// Aggregate counters over available songs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionCounts {
    pub songs: i64,
    pub artists: i64,
    pub albums: i64,
}

/// One album as listed by the backend's album queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumSummary {
    /// Empty for compilations.
    pub album_artist: String,
    pub album: String,
    pub filetype: String,
    pub compilation: bool,
    pub urls: Vec<String>,
}
