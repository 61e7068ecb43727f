//! # Grouping configuration
//!
//! A [`Grouping`] picks up to three [`GroupBy`] dimensions, outermost first.
//! Levels after the first [`GroupBy::None`] are ignored.
//!
//! Dimensions serialize as their numeric id so stored groupings survive
//! variant renames.
//!
//! ## Usage
//!
//! ```rust
//! use core_index::{GroupBy, Grouping, SavedGroupings};
//!
//! let mut saved = SavedGroupings::default();
//! saved.insert("Genre", Grouping::new(GroupBy::Genre, GroupBy::AlbumArtist, GroupBy::Album));
//! let json = saved.to_json().unwrap();
//! assert_eq!(SavedGroupings::from_json(&json).unwrap(), saved);
//! ```

use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of grouping levels the index supports.
pub const GROUPING_LEVELS: usize = 3;

/// One grouping dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum GroupBy {
    None,
    AlbumArtist,
    Artist,
    Album,
    AlbumDisc,
    YearAlbum,
    YearAlbumDisc,
    OriginalYearAlbum,
    OriginalYearAlbumDisc,
    Disc,
    Year,
    OriginalYear,
    Genre,
    Composer,
    Performer,
    Grouping,
    FileType,
    Format,
    Samplerate,
    Bitdepth,
    Bitrate,
}

impl GroupBy {
    pub const ALL: [GroupBy; 21] = [
        GroupBy::None,
        GroupBy::AlbumArtist,
        GroupBy::Artist,
        GroupBy::Album,
        GroupBy::AlbumDisc,
        GroupBy::YearAlbum,
        GroupBy::YearAlbumDisc,
        GroupBy::OriginalYearAlbum,
        GroupBy::OriginalYearAlbumDisc,
        GroupBy::Disc,
        GroupBy::Year,
        GroupBy::OriginalYear,
        GroupBy::Genre,
        GroupBy::Composer,
        GroupBy::Performer,
        GroupBy::Grouping,
        GroupBy::FileType,
        GroupBy::Format,
        GroupBy::Samplerate,
        GroupBy::Bitdepth,
        GroupBy::Bitrate,
    ];

    /// Stable numeric id.
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<GroupBy> {
        Self::ALL.get(usize::from(id)).copied()
    }

    /// Dimensions that fold compilations into a "Various artists" node.
    pub fn is_artist(self) -> bool {
        matches!(self, GroupBy::AlbumArtist | GroupBy::Artist)
    }

    pub fn is_album(self) -> bool {
        matches!(
            self,
            GroupBy::Album
                | GroupBy::AlbumDisc
                | GroupBy::YearAlbum
                | GroupBy::YearAlbumDisc
                | GroupBy::OriginalYearAlbum
                | GroupBy::OriginalYearAlbumDisc
        )
    }

    /// Dimensions whose dividers are derived from a number rather than
    /// from the first letter of the sort text.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            GroupBy::Year
                | GroupBy::OriginalYear
                | GroupBy::YearAlbum
                | GroupBy::YearAlbumDisc
                | GroupBy::OriginalYearAlbum
                | GroupBy::OriginalYearAlbumDisc
                | GroupBy::Samplerate
                | GroupBy::Bitdepth
                | GroupBy::Bitrate
        )
    }
}

impl From<GroupBy> for u8 {
    fn from(group_by: GroupBy) -> Self {
        group_by.id()
    }
}

impl TryFrom<u8> for GroupBy {
    type Error = IndexError;

    fn try_from(id: u8) -> Result<Self> {
        GroupBy::from_id(id).ok_or(IndexError::UnknownGroupBy(id))
    }
}

/// Ordered grouping dimensions, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grouping(pub [GroupBy; GROUPING_LEVELS]);

impl Default for Grouping {
    fn default() -> Self {
        Self([GroupBy::AlbumArtist, GroupBy::AlbumDisc, GroupBy::None])
    }
}

impl Grouping {
    pub fn new(first: GroupBy, second: GroupBy, third: GroupBy) -> Self {
        Self([first, second, third])
    }

    /// A grouping with no levels: songs sit directly under the root.
    pub fn flat() -> Self {
        Self([GroupBy::None; GROUPING_LEVELS])
    }

    /// Dimension at `level`, or `None` past the last level.
    pub fn get(&self, level: usize) -> GroupBy {
        self.0.get(level).copied().unwrap_or(GroupBy::None)
    }

    /// Active levels, stopping at the first [`GroupBy::None`].
    pub fn levels(&self) -> impl Iterator<Item = GroupBy> + '_ {
        self.0.iter().copied().take_while(|g| *g != GroupBy::None)
    }

    pub fn depth(&self) -> usize {
        self.levels().count()
    }
}

/// Named groupings kept by the host, stored as JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedGroupings(BTreeMap<String, Grouping>);

impl SavedGroupings {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Store `grouping` under `name`, replacing any previous entry.
    pub fn insert(&mut self, name: impl Into<String>, grouping: Grouping) -> Option<Grouping> {
        self.0.insert(name.into(), grouping)
    }

    pub fn get(&self, name: &str) -> Option<Grouping> {
        self.0.get(name).copied()
    }

    pub fn remove(&mut self, name: &str) -> Option<Grouping> {
        self.0.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
