//! Change notifications emitted by the collection backend.
//!
//! Observers receive these through a [`core_runtime::events::EventBus`]. The
//! grouping index subscribes through the ordered channel so that it sees
//! every delta exactly once, in emission order.

use crate::models::{CollectionCounts, Directory, Song, SongDelta};
use core_runtime::events::EventSeverity;
use serde::{Deserialize, Serialize};

/// Events describing a committed change to the collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum CollectionEvent {
    /// Songs were added and/or removed. Apply `removed` before `added`.
    SongsChanged {
        /// The change set.
        delta: SongDelta,
    },
    /// Songs changed in a way that does not move them in any grouping
    /// (statistics, rating, modification time).
    SongsSlightlyChanged {
        /// Fresh snapshots of the changed songs.
        songs: Vec<Song>,
    },
    /// A watched folder was registered.
    DirectoryDiscovered {
        /// The new directory.
        directory: Directory,
    },
    /// A watched folder was removed.
    DirectoryDeleted {
        /// The removed directory.
        directory: Directory,
    },
    /// Aggregate counters were recomputed.
    CountsUpdated {
        /// Current totals.
        counts: CollectionCounts,
    },
    /// Every song was deleted.
    DatabaseReset,
}

impl CollectionEvent {
    /// Wrap a delta, or `None` if it carries nothing.
    pub fn songs_changed(delta: SongDelta) -> Option<Self> {
        if delta.is_empty() {
            None
        } else {
            Some(CollectionEvent::SongsChanged { delta })
        }
    }

    pub fn description(&self) -> &str {
        match self {
            CollectionEvent::SongsChanged { .. } => "Songs added or removed",
            CollectionEvent::SongsSlightlyChanged { .. } => "Song statistics updated",
            CollectionEvent::DirectoryDiscovered { .. } => "Directory added to collection",
            CollectionEvent::DirectoryDeleted { .. } => "Directory removed from collection",
            CollectionEvent::CountsUpdated { .. } => "Collection totals updated",
            CollectionEvent::DatabaseReset => "Collection cleared",
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CollectionEvent::SongsSlightlyChanged { .. }
            | CollectionEvent::CountsUpdated { .. } => {
                EventSeverity::Debug
            }
            CollectionEvent::DatabaseReset | CollectionEvent::DirectoryDeleted { .. } => {
                EventSeverity::Warning
            }
            _ => EventSeverity::Info,
        }
    }
}
