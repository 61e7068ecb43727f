//! # Reconciler
//!
//! Diffs a batch of incoming songs against the persisted collection and
//! applies the result.
//!
//! ## Matching
//!
//! A candidate matches a persisted record by external `song_id` first, then by
//! surrogate id. Anything else is new.
//!
//! - Matched, metadata equal and available: nothing to do
//! - Matched otherwise: the row is updated, the old snapshot goes to
//!   `removed` and the new one (same id) to `added`
//! - Unmatched: a row is inserted and the snapshot with its new id goes to
//!   `added`
//!
//! In [`ReconcileMode::Full`] the batch is the whole collection, so available
//! records no candidate matched are deleted and reported in `removed`.
//!
//! Candidates whose directory no longer exists are skipped. This covers a
//! directory being removed while its contents were being rescanned.
//!
//! The caller owns the transaction: any error leaves it uncommitted and the
//! caller must not emit anything.

use crate::Result;
use core_library::query::CollectionQuery;
use core_library::repositories::{directory, song};
use core_library::{Song, SongDelta};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Scope of a reconciliation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReconcileMode {
    /// Add or update the given songs; leave everything else alone.
    #[default]
    Partial,
    /// The batch is the complete collection.
    Full,
}

/// Row writes issued by one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteStats {
    pub inserts: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl WriteStats {
    pub fn total(&self) -> usize {
        self.inserts + self.updates + self.deletes
    }
}

/// Result of a committed reconciliation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    pub delta: SongDelta,
    pub writes: WriteStats,
}

impl ReconcileOutcome {
    pub fn is_changed(&self) -> bool {
        self.writes.total() > 0
    }
}

/// Caches directory existence for the duration of one batch.
struct DirectoryCheck {
    known: HashMap<i64, bool>,
}

impl DirectoryCheck {
    fn new() -> Self {
        Self {
            known: HashMap::new(),
        }
    }

    async fn exists(
        &mut self,
        conn: &mut SqliteConnection,
        directory_id: Option<i64>,
    ) -> Result<bool> {
        let Some(id) = directory_id else {
            return Ok(true);
        };
        if let Some(exists) = self.known.get(&id) {
            return Ok(*exists);
        }
        let exists = directory::exists(conn, id).await?;
        self.known.insert(id, exists);
        Ok(exists)
    }
}

async fn find_match(conn: &mut SqliteConnection, candidate: &Song) -> Result<Option<Song>> {
    if !candidate.song_id.is_empty() {
        if let Some(existing) = song::find_by_song_id(conn, &candidate.song_id).await? {
            return Ok(Some(existing));
        }
    }
    if candidate.is_persisted() {
        return Ok(song::find_by_id(conn, candidate.id).await?);
    }
    Ok(None)
}

/// Apply `incoming` to the store through `conn`.
pub async fn reconcile(
    conn: &mut SqliteConnection,
    incoming: &[Song],
    mode: ReconcileMode,
) -> Result<ReconcileOutcome> {
    let mut outcome = ReconcileOutcome::default();
    let mut directories = DirectoryCheck::new();
    let mut seen: HashSet<i64> = HashSet::new();

    for candidate in incoming {
        if !directories.exists(conn, candidate.directory_id).await? {
            warn!(
                directory_id = candidate.directory_id,
                url = %candidate.url,
                "Directory no longer exists, skipping song"
            );
            continue;
        }

        match find_match(conn, candidate).await? {
            Some(existing) => {
                seen.insert(existing.id);
                if existing.is_metadata_equal(candidate) && !existing.unavailable {
                    continue;
                }

                let mut updated = existing.with_metadata_from(candidate);
                updated.unavailable = false;
                song::update_metadata(conn, &updated).await?;
                outcome.writes.updates += 1;

                if !existing.unavailable {
                    outcome.delta.removed.push(existing);
                }
                outcome.delta.added.push(updated);
            }
            None => {
                let mut created = Song {
                    id: Song::UNSAVED_ID,
                    ..candidate.clone()
                };
                created.refresh_compilation_effective();
                created.id = song::insert(conn, &created).await?;
                seen.insert(created.id);
                outcome.writes.inserts += 1;
                outcome.delta.added.push(created);
            }
        }
    }

    if mode == ReconcileMode::Full {
        let persisted = CollectionQuery::new().fetch_songs(conn).await?;
        for stale in persisted.into_iter().filter(|s| !seen.contains(&s.id)) {
            song::delete(conn, stale.id).await?;
            outcome.writes.deletes += 1;
            outcome.delta.removed.push(stale);
        }
    }

    debug!(
        inserts = outcome.writes.inserts,
        updates = outcome.writes.updates,
        deletes = outcome.writes.deletes,
        ?mode,
        "Reconciled batch"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::CollectionDatabase;

    fn candidate(song_id: &str, album: &str) -> Song {
        Song {
            song_id: song_id.to_string(),
            artist: "A".to_string(),
            album: album.to_string(),
            title: format!("{song_id} title"),
            ..Song::new(format!("file:///m/{song_id}.flac"))
        }
    }

    #[tokio::test]
    async fn test_new_songs_are_inserted() {
        let db = CollectionDatabase::open_in_memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        let batch = [candidate("a", "X"), candidate("b", "X")];
        let outcome = reconcile(&mut conn, &batch, ReconcileMode::Partial).await.unwrap();

        assert_eq!(outcome.writes.inserts, 2);
        assert_eq!(outcome.delta.added.len(), 2);
        assert!(outcome.delta.removed.is_empty());
        assert!(outcome.delta.added.iter().all(Song::is_persisted));
    }

    #[tokio::test]
    async fn test_match_by_surrogate_id() {
        let db = CollectionDatabase::open_in_memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        let mut plain = candidate("", "X");
        plain.url = "file:///m/plain.flac".to_string();
        let first = reconcile(&mut conn, &[plain], ReconcileMode::Partial).await.unwrap();
        let stored = first.delta.added[0].clone();

        let renamed = Song {
            title: "Renamed".to_string(),
            ..stored.clone()
        };
        let second = reconcile(&mut conn, &[renamed], ReconcileMode::Partial).await.unwrap();
        assert_eq!(second.writes, WriteStats { inserts: 0, updates: 1, deletes: 0 });
        assert_eq!(second.delta.added[0].id, stored.id);
        assert_eq!(second.delta.removed[0].title, stored.title);
    }

    #[tokio::test]
    async fn test_missing_directory_skips_song() {
        let db = CollectionDatabase::open_in_memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        let mut orphan = candidate("a", "X");
        orphan.directory_id = Some(42);
        let outcome = reconcile(&mut conn, &[orphan, candidate("b", "X")], ReconcileMode::Partial)
            .await
            .unwrap();

        assert_eq!(outcome.writes.inserts, 1);
        assert_eq!(outcome.delta.added[0].song_id, "b");
    }

    #[tokio::test]
    async fn test_full_mode_deletes_unmatched() {
        let db = CollectionDatabase::open_in_memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        reconcile(&mut conn, &[candidate("a", "X"), candidate("b", "X")], ReconcileMode::Full)
            .await
            .unwrap();
        let outcome = reconcile(&mut conn, &[candidate("a", "X")], ReconcileMode::Full)
            .await
            .unwrap();

        assert_eq!(outcome.writes, WriteStats { inserts: 0, updates: 0, deletes: 1 });
        assert_eq!(outcome.delta.removed.len(), 1);
        assert_eq!(outcome.delta.removed[0].song_id, "b");
        assert!(outcome.delta.added.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_match_is_revived() {
        let db = CollectionDatabase::open_in_memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        let first = reconcile(&mut conn, &[candidate("a", "X")], ReconcileMode::Partial)
            .await
            .unwrap();
        song::set_unavailable(&mut conn, first.delta.added[0].id, true)
            .await
            .unwrap();

        let outcome = reconcile(&mut conn, &[candidate("a", "X")], ReconcileMode::Partial)
            .await
            .unwrap();
        assert_eq!(outcome.writes.updates, 1);
        assert!(outcome.delta.removed.is_empty());
        assert!(!outcome.delta.added[0].unavailable);
    }
}
