//! # Compilation Classifier
//!
//! Decides, per (directory, album) group of available songs, whether the
//! album is a compilation.
//!
//! A group is a compilation when its members carry more than one distinct
//! effective artist. Artists are compared as exact strings, so `"abba"` and
//! `"ABBA"` count as two artists. Songs with an empty album never form a
//! group.
//!
//! [`plan`] is the pure decision step; [`classify`] reads candidates, applies
//! the plan through a caller-owned connection and returns the delta.

use crate::Result;
use core_library::repositories::{song, CompilationCandidate};
use core_library::SongDelta;
use sqlx::SqliteConnection;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// A pending change to `compilation_detected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reclassification {
    pub id: i64,
    pub compilation_detected: bool,
}

/// Compute the rows whose `compilation_detected` flag is wrong.
///
/// Groups already in the correct state yield nothing, so running the plan
/// against its own result is empty.
pub fn plan(candidates: &[CompilationCandidate]) -> Vec<Reclassification> {
    let mut groups: BTreeMap<(&str, &str), Vec<&CompilationCandidate>> = BTreeMap::new();
    for candidate in candidates.iter().filter(|c| !c.album.is_empty()) {
        groups
            .entry((candidate.directory_url(), candidate.album.as_str()))
            .or_default()
            .push(candidate);
    }

    let mut changes = Vec::new();
    for members in groups.values() {
        let artists: HashSet<&str> = members
            .iter()
            .map(|m| m.effective_albumartist.as_str())
            .collect();
        let is_compilation = artists.len() > 1;

        changes.extend(
            members
                .iter()
                .filter(|m| m.compilation_detected != is_compilation)
                .map(|m| Reclassification {
                    id: m.id,
                    compilation_detected: is_compilation,
                }),
        );
    }
    changes
}

/// Re-evaluate every group and store the verdicts.
pub async fn classify(conn: &mut SqliteConnection) -> Result<SongDelta> {
    let candidates = song::compilation_candidates(conn).await?;
    let changes = plan(&candidates);
    if changes.is_empty() {
        return Ok(SongDelta::default());
    }

    let ids: Vec<i64> = changes.iter().map(|c| c.id).collect();
    let before = song::find_by_ids(conn, &ids).await?;
    for change in &changes {
        song::update_compilation_detected(conn, change.id, change.compilation_detected).await?;
    }
    let after = song::find_by_ids(conn, &ids).await?;

    debug!(
        songs_changed = changes.len(),
        candidates = candidates.len(),
        "Classified compilations"
    );
    Ok(SongDelta::new(after, before))
}
