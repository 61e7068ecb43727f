//! # Collection Backend
//!
//! The single entry point for every operation on one collection's store.
//!
//! ## Overview
//!
//! Each operation:
//! 1. Takes the store lock through [`CollectionDatabase::acquire`]
//! 2. Runs its writes inside one transaction
//! 3. Commits, then emits a [`CollectionEvent`] while still holding the lock
//!
//! Emitting under the lock keeps notifications in commit order, which the
//! grouping index relies on. A failed statement drops the transaction
//! uncommitted and nothing is emitted.
//!
//! Aggregate counts are refreshed on a spawned task after operations that
//! change which songs are visible; consumers see them eventually.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_runtime::config::CoreConfig;
//! use core_sync::CollectionBackend;
//!
//! let backend = CollectionBackend::open(&CoreConfig::builder().build()?).await?;
//! let mut deltas = backend.subscribe_ordered();
//!
//! let dir = backend.add_directory("/music").await?;
//! let outcome = backend.add_or_update_songs(&scanned_songs).await?;
//! backend.classify_compilations().await?;
//! ```

use crate::compilation;
use crate::reconciler::{self, ReconcileMode, ReconcileOutcome};
use crate::{Result, SyncError};
use core_library::db::DatabaseConfig;
use core_library::query::{CollectionQuery, QueryOptions, EFFECTIVE_ALBUMARTIST};
use core_library::repositories::{directory, song, SqliteSongRepository};
use core_library::{
    AlbumSummary, CollectionCounts, CollectionDatabase, CollectionEvent, Directory, LibraryError,
    Song, SongDelta,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, OrderedReceiver, Receiver};
use sqlx::Connection;
use std::collections::HashMap;
use tracing::{debug, error, info, instrument, warn};

const SECONDS_PER_DAY: i64 = 86_400;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Songs the index can see. Unavailable songs are never part of a delta.
fn visible(songs: Vec<Song>) -> Vec<Song> {
    songs.into_iter().filter(|s| !s.unavailable).collect()
}

/// Turn a directory path into the prefix its song locations start with.
fn location_prefix(path: &str) -> String {
    if path.contains("://") {
        path.to_string()
    } else if path.starts_with('/') {
        format!("file://{}", path)
    } else {
        format!("file:///{}", path)
    }
}

/// Owns the store handle and the notification bus for one collection.
#[derive(Debug, Clone)]
pub struct CollectionBackend {
    db: CollectionDatabase,
    events: EventBus<CollectionEvent>,
    expire_unavailable_songs_days: u32,
}

impl CollectionBackend {
    pub fn new(db: CollectionDatabase, events: EventBus<CollectionEvent>) -> Self {
        Self {
            db,
            events,
            expire_unavailable_songs_days: 0,
        }
    }

    /// Open the store described by `config` and create the event bus.
    pub async fn open(config: &CoreConfig) -> Result<Self> {
        config.validate().map_err(|e| SyncError::InvalidInput {
            field: "config".to_string(),
            message: e.to_string(),
        })?;

        let db = CollectionDatabase::open(DatabaseConfig::from_core_config(config)).await?;
        info!(in_memory = config.is_in_memory(), "Collection backend ready");
        Ok(Self {
            db,
            events: EventBus::new(config.event_buffer_size),
            expire_unavailable_songs_days: config.expire_unavailable_songs_days,
        })
    }

    pub fn with_expiry_days(mut self, days: u32) -> Self {
        self.expire_unavailable_songs_days = days;
        self
    }

    pub fn database(&self) -> &CollectionDatabase {
        &self.db
    }

    pub fn events(&self) -> &EventBus<CollectionEvent> {
        &self.events
    }

    /// Lossy observer subscription.
    pub fn subscribe(&self) -> Receiver<CollectionEvent> {
        self.events.subscribe()
    }

    /// Lossless, in-order subscription for index maintenance.
    pub fn subscribe_ordered(&self) -> OrderedReceiver<CollectionEvent> {
        self.events.subscribe_ordered()
    }

    /// Read repository sharing this backend's store lock.
    pub fn song_repository(&self) -> SqliteSongRepository {
        SqliteSongRepository::new(self.db.clone())
    }

    fn emit(&self, event: CollectionEvent) {
        debug!(
            event = event.description(),
            severity = ?event.severity(),
            "Emitting collection event"
        );
        self.events.emit(event);
    }

    fn emit_delta(&self, delta: SongDelta) {
        if let Some(event) = CollectionEvent::songs_changed(delta) {
            self.emit(event);
        }
    }

    fn emit_slightly_changed(&self, songs: Vec<Song>) {
        if !songs.is_empty() {
            self.emit(CollectionEvent::SongsSlightlyChanged { songs });
        }
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Add new songs and update changed ones.
    #[instrument(skip(self, songs), fields(songs = songs.len()))]
    pub async fn add_or_update_songs(&self, songs: &[Song]) -> Result<ReconcileOutcome> {
        self.reconcile(songs, ReconcileMode::Partial).await
    }

    /// Replace the whole collection with `songs`, matching by song id.
    #[instrument(skip(self, songs), fields(songs = songs.len()))]
    pub async fn update_songs_by_song_id(&self, songs: &[Song]) -> Result<ReconcileOutcome> {
        self.reconcile(songs, ReconcileMode::Full).await
    }

    async fn reconcile(&self, songs: &[Song], mode: ReconcileMode) -> Result<ReconcileOutcome> {
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;

        let outcome = reconciler::reconcile(&mut tx, songs, mode)
            .await
            .inspect_err(|e| error!(error = %e, "Reconciliation failed, rolling back"))?;
        tx.commit().await?;

        if outcome.is_changed() {
            info!(
                added = outcome.delta.added.len(),
                removed = outcome.delta.removed.len(),
                "Collection updated"
            );
            self.emit_delta(outcome.delta.clone());
            self.spawn_update_total_counts();
        }
        Ok(outcome)
    }

    // ========================================================================
    // Total counts
    // ========================================================================

    /// Recompute aggregate counters and emit them.
    pub async fn update_total_counts(&self) -> Result<CollectionCounts> {
        let mut conn = self.db.acquire().await?;
        let counts = song::counts(&mut conn).await?;
        self.emit(CollectionEvent::CountsUpdated { counts });
        Ok(counts)
    }

    fn spawn_update_total_counts(&self) {
        let backend = self.clone();
        tokio::spawn(async move {
            if let Err(e) = backend.update_total_counts().await {
                warn!(error = %e, "Failed to update total counts");
            }
        });
    }

    // ========================================================================
    // Directories
    // ========================================================================

    #[instrument(skip(self))]
    pub async fn add_directory(&self, path: &str) -> Result<Directory> {
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;
        let dir = directory::insert(&mut tx, path).await?;
        tx.commit().await?;

        info!(directory_id = dir.id, "Directory added");
        self.emit(CollectionEvent::DirectoryDiscovered {
            directory: dir.clone(),
        });
        Ok(dir)
    }

    /// Delete a directory and every song it owns.
    #[instrument(skip(self), fields(directory_id = dir.id))]
    pub async fn remove_directory(&self, dir: &Directory) -> Result<()> {
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;

        let songs = song::find_in_directory(&mut tx, dir.id).await?;
        for s in &songs {
            song::delete(&mut tx, s.id).await?;
        }
        if !directory::delete(&mut tx, dir.id).await? {
            return Err(LibraryError::not_found("directory", dir.id).into());
        }
        tx.commit().await?;

        info!(songs = songs.len(), "Directory removed");
        self.emit_delta(SongDelta::removed(visible(songs)));
        self.emit(CollectionEvent::DirectoryDeleted {
            directory: dir.clone(),
        });
        self.spawn_update_total_counts();
        Ok(())
    }

    pub async fn directories(&self) -> Result<Vec<Directory>> {
        let mut conn = self.db.acquire().await?;
        Ok(directory::find_all(&mut conn).await?)
    }

    /// Move a directory, rewriting the location prefix of its songs.
    #[instrument(skip(self))]
    pub async fn change_directory_path(
        &self,
        directory_id: i64,
        old_path: &str,
        new_path: &str,
    ) -> Result<()> {
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;

        if !directory::update_path(&mut tx, directory_id, new_path).await? {
            return Err(LibraryError::not_found("directory", directory_id).into());
        }
        let moved = song::rewrite_directory_urls(
            &mut tx,
            directory_id,
            &location_prefix(old_path),
            &location_prefix(new_path),
        )
        .await?;
        let songs = visible(song::find_in_directory(&mut tx, directory_id).await?);
        tx.commit().await?;

        info!(songs = moved, "Directory path changed");
        self.emit_slightly_changed(songs);
        Ok(())
    }

    pub async fn find_songs_in_directory(&self, directory_id: i64) -> Result<Vec<Song>> {
        let mut conn = self.db.acquire().await?;
        Ok(song::find_in_directory(&mut conn, directory_id).await?)
    }

    // ========================================================================
    // Song lifecycle
    // ========================================================================

    /// Delete songs by id. Returns how many rows existed.
    #[instrument(skip(self, songs), fields(songs = songs.len()))]
    pub async fn delete_songs(&self, songs: &[Song]) -> Result<usize> {
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;

        let ids: Vec<i64> = songs.iter().map(|s| s.id).collect();
        let existing = song::find_by_ids(&mut tx, &ids).await?;
        for s in &existing {
            song::delete(&mut tx, s.id).await?;
        }
        tx.commit().await?;

        let deleted = existing.len();
        self.emit_delta(SongDelta::removed(visible(existing)));
        if deleted > 0 {
            self.spawn_update_total_counts();
        }
        Ok(deleted)
    }

    /// Flip the availability of songs. Hidden songs leave the index, revived
    /// ones enter it.
    #[instrument(skip(self, songs), fields(songs = songs.len()))]
    pub async fn mark_songs_unavailable(&self, songs: &[Song], unavailable: bool) -> Result<usize> {
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;

        let ids: Vec<i64> = songs.iter().map(|s| s.id).collect();
        let mut changed = Vec::new();
        for mut s in song::find_by_ids(&mut tx, &ids).await? {
            if s.unavailable == unavailable {
                continue;
            }
            song::set_unavailable(&mut tx, s.id, unavailable).await?;
            if !unavailable {
                s.unavailable = false;
            }
            changed.push(s);
        }
        tx.commit().await?;

        let count = changed.len();
        if unavailable {
            self.emit_delta(SongDelta::removed(changed));
        } else {
            self.emit_delta(SongDelta::added(changed));
        }
        if count > 0 {
            self.spawn_update_total_counts();
        }
        Ok(count)
    }

    /// A file moved: store its new location.
    #[instrument(skip(self, target), fields(id = target.id))]
    pub async fn song_path_changed(
        &self,
        target: &Song,
        new_url: &str,
        new_directory_id: Option<i64>,
    ) -> Result<Song> {
        if new_url.is_empty() {
            return Err(SyncError::InvalidInput {
                field: "url".to_string(),
                message: "new location cannot be empty".to_string(),
            });
        }

        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;

        let old = song::find_by_id(&mut tx, target.id)
            .await?
            .ok_or_else(|| LibraryError::not_found("song", target.id))?;
        song::update_location(&mut tx, old.id, new_url, new_directory_id).await?;
        let moved = Song {
            url: new_url.to_string(),
            directory_id: new_directory_id,
            ..old.clone()
        };
        tx.commit().await?;

        if !old.unavailable {
            self.emit_delta(SongDelta::new(vec![moved.clone()], vec![old]));
        }
        Ok(moved)
    }

    /// Store new modification times without touching metadata.
    pub async fn update_mtimes_only(&self, songs: &[Song]) -> Result<usize> {
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut ids = Vec::new();
        for s in songs {
            if song::update_mtime(&mut tx, s.id, s.mtime).await? {
                ids.push(s.id);
            }
        }
        let updated = visible(song::find_by_ids(&mut tx, &ids).await?);
        tx.commit().await?;

        self.emit_slightly_changed(updated);
        Ok(ids.len())
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Count one more play and stamp the last-played time.
    pub async fn increment_play_count(&self, id: i64) -> Result<Option<Song>> {
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;
        song::increment_playcount(&mut tx, id, now()).await?;
        let updated = song::find_by_id(&mut tx, id).await?;
        tx.commit().await?;

        self.emit_slightly_changed(visible(updated.iter().cloned().collect()));
        Ok(updated)
    }

    pub async fn increment_skip_count(&self, id: i64) -> Result<Option<Song>> {
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;
        song::increment_skipcount(&mut tx, id).await?;
        let updated = song::find_by_id(&mut tx, id).await?;
        tx.commit().await?;

        self.emit_slightly_changed(visible(updated.iter().cloned().collect()));
        Ok(updated)
    }

    /// Zero the play and skip counts and forget the last-played time.
    pub async fn reset_statistics(&self, id: i64) -> Result<Option<Song>> {
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;
        song::reset_statistics(&mut tx, id).await?;
        let updated = song::find_by_id(&mut tx, id).await?;
        tx.commit().await?;

        self.emit_slightly_changed(visible(updated.iter().cloned().collect()));
        Ok(updated)
    }

    /// Set the rating of several songs. Ratings range over `0.0..=1.0`, with
    /// `-1.0` meaning unrated.
    pub async fn update_songs_rating(&self, ids: &[i64], rating: f64) -> Result<Vec<Song>> {
        if !((0.0..=1.0).contains(&rating) || rating == -1.0) {
            return Err(SyncError::InvalidInput {
                field: "rating".to_string(),
                message: format!("{} is outside 0.0..=1.0", rating),
            });
        }

        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;
        song::set_rating(&mut tx, ids, rating).await?;
        let updated = visible(song::find_by_ids(&mut tx, ids).await?);
        tx.commit().await?;

        self.emit_slightly_changed(updated.clone());
        Ok(updated)
    }

    /// Record a play reported by an external source. The stored time only
    /// moves forward.
    pub async fn update_last_played(
        &self,
        artist: &str,
        album: &str,
        title: &str,
        lastplayed: i64,
    ) -> Result<Vec<Song>> {
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut updated = Vec::new();
        for mut s in song::find_by_tags(&mut tx, artist, album, title).await? {
            if lastplayed <= s.lastplayed {
                continue;
            }
            song::set_lastplayed(&mut tx, s.id, lastplayed).await?;
            s.lastplayed = lastplayed;
            updated.push(s);
        }
        tx.commit().await?;

        debug!(songs = updated.len(), "Updated last played");
        self.emit_slightly_changed(updated.clone());
        Ok(updated)
    }

    /// Overwrite the play count of every song matching (artist, title).
    pub async fn update_play_count(
        &self,
        artist: &str,
        title: &str,
        playcount: i32,
    ) -> Result<Vec<Song>> {
        if playcount < 0 {
            return Err(SyncError::InvalidInput {
                field: "playcount".to_string(),
                message: "play count cannot be negative".to_string(),
            });
        }

        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut updated = Vec::new();
        for mut s in song::find_by_tags(&mut tx, artist, "", title).await? {
            song::set_playcount(&mut tx, s.id, playcount).await?;
            s.playcount = playcount;
            updated.push(s);
        }
        tx.commit().await?;

        self.emit_slightly_changed(updated.clone());
        Ok(updated)
    }

    // ========================================================================
    // Expiry
    // ========================================================================

    /// Stamp the available songs of a directory as seen now, then expire
    /// its long-unavailable songs using the configured window.
    #[instrument(skip(self))]
    pub async fn update_last_seen(&self, directory_id: i64) -> Result<usize> {
        {
            let mut conn = self.db.acquire().await?;
            let stamped = song::touch_last_seen(&mut conn, directory_id, now()).await?;
            debug!(songs = stamped, "Updated last seen");
        }

        if self.expire_unavailable_songs_days == 0 {
            return Ok(0);
        }
        self.expire_songs(directory_id, self.expire_unavailable_songs_days)
            .await
    }

    /// Delete unavailable songs of a directory not seen for `expire_days`.
    #[instrument(skip(self))]
    pub async fn expire_songs(&self, directory_id: i64, expire_days: u32) -> Result<usize> {
        let cutoff = now() - i64::from(expire_days) * SECONDS_PER_DAY;

        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;
        let expired = song::find_expired(&mut tx, directory_id, cutoff).await?;
        for s in &expired {
            song::delete(&mut tx, s.id).await?;
        }
        tx.commit().await?;

        if !expired.is_empty() {
            info!(songs = expired.len(), "Expired unavailable songs");
            self.spawn_update_total_counts();
        }
        Ok(expired.len())
    }

    /// Delete every song.
    #[instrument(skip(self))]
    pub async fn delete_all(&self) -> Result<u64> {
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;
        let deleted = song::delete_all(&mut tx).await?;
        tx.commit().await?;

        info!(songs = deleted, "Collection cleared");
        self.emit(CollectionEvent::DatabaseReset);
        self.spawn_update_total_counts();
        Ok(deleted)
    }

    // ========================================================================
    // Compilations
    // ========================================================================

    /// Re-evaluate compilation membership of every (directory, album) group.
    #[instrument(skip(self))]
    pub async fn classify_compilations(&self) -> Result<SongDelta> {
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;

        let delta = compilation::classify(&mut tx)
            .await
            .inspect_err(|e| {
                error!(error = %e, "Compilation classification failed, rolling back")
            })?;
        tx.commit().await?;

        self.emit_delta(delta.clone());
        Ok(delta)
    }

    /// Force the songs of `album` in or out of compilations. An empty
    /// `artists` list applies to every artist on the album.
    #[instrument(skip(self))]
    pub async fn force_compilation(
        &self,
        album: &str,
        artists: &[String],
        on: bool,
    ) -> Result<SongDelta> {
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut query = CollectionQuery::new().add_where("songs.album", album, "=");
        if !artists.is_empty() {
            query = query.add_where_in("songs.artist", artists.iter().map(String::as_str));
        }
        let before = query.fetch_songs(&mut tx).await?;

        if artists.is_empty() {
            song::update_compilation_override(&mut tx, album, None, on).await?;
        } else {
            for artist in artists {
                song::update_compilation_override(&mut tx, album, Some(artist), on).await?;
            }
        }

        let ids: Vec<i64> = before.iter().map(|s| s.id).collect();
        let after = song::find_by_ids(&mut tx, &ids).await?;
        tx.commit().await?;

        let delta = SongDelta::new(after, before);
        self.emit_delta(delta.clone());
        Ok(delta)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn get_all_songs(&self, options: &QueryOptions) -> Result<Vec<Song>> {
        let mut conn = self.db.acquire().await?;
        let query = CollectionQuery::from_options(options).order_by("songs.id");
        Ok(query.fetch_songs(&mut conn).await?)
    }

    pub async fn get_song_by_id(&self, id: i64) -> Result<Option<Song>> {
        let mut conn = self.db.acquire().await?;
        Ok(song::find_by_id(&mut conn, id).await?)
    }

    pub async fn get_songs_by_id(&self, ids: &[i64]) -> Result<Vec<Song>> {
        let mut conn = self.db.acquire().await?;
        Ok(song::find_by_ids(&mut conn, ids).await?)
    }

    pub async fn get_song_by_song_id(&self, song_id: &str) -> Result<Option<Song>> {
        let mut conn = self.db.acquire().await?;
        Ok(song::find_by_song_id(&mut conn, song_id).await?)
    }

    /// Distinct non-empty track artists, sorted.
    pub async fn get_all_artists(&self, options: &QueryOptions) -> Result<Vec<String>> {
        let mut conn = self.db.acquire().await?;
        let query = CollectionQuery::from_options(options)
            .column_spec("DISTINCT songs.artist")
            .add_where("songs.artist", "", "!=")
            .order_by("songs.artist");
        Ok(query.fetch_strings(&mut conn).await?)
    }

    /// Albums keyed by (album artist, album, file type). Compilations carry
    /// an empty album artist.
    pub async fn get_albums(&self, options: &QueryOptions) -> Result<Vec<AlbumSummary>> {
        let mut conn = self.db.acquire().await?;
        let query = CollectionQuery::from_options(options)
            .order_by(format!("{}, songs.album, songs.url", EFFECTIVE_ALBUMARTIST));
        let songs = query.fetch_songs(&mut conn).await?;
        drop(conn);

        let mut albums: Vec<AlbumSummary> = Vec::new();
        let mut positions: HashMap<(String, String, String), usize> = HashMap::new();
        for s in songs {
            let album_artist = if s.compilation_effective {
                String::new()
            } else {
                s.effective_albumartist().to_string()
            };
            let key = (album_artist.clone(), s.album.clone(), s.filetype.clone());
            match positions.get(&key) {
                Some(&pos) => albums[pos].urls.push(s.url),
                None => {
                    positions.insert(key, albums.len());
                    albums.push(AlbumSummary {
                        album_artist,
                        album: s.album,
                        filetype: s.filetype,
                        compilation: s.compilation_effective,
                        urls: vec![s.url],
                    });
                }
            }
        }
        Ok(albums)
    }

    /// Songs of one album credited to `artist`.
    pub async fn get_album_songs(
        &self,
        artist: &str,
        album: &str,
        options: &QueryOptions,
    ) -> Result<Vec<Song>> {
        let mut conn = self.db.acquire().await?;
        let query = CollectionQuery::from_options(options)
            .add_compilation_requirement(false)
            .add_where_artist(artist)
            .add_where("songs.album", album, "=")
            .order_by("songs.disc, songs.track, songs.url");
        Ok(query.fetch_songs(&mut conn).await?)
    }

    /// Songs of one compilation album.
    pub async fn get_compilation_songs(
        &self,
        album: &str,
        options: &QueryOptions,
    ) -> Result<Vec<Song>> {
        let mut conn = self.db.acquire().await?;
        let query = CollectionQuery::from_options(options)
            .add_compilation_requirement(true)
            .add_where("songs.album", album, "=")
            .order_by("songs.disc, songs.track, songs.url");
        Ok(query.fetch_songs(&mut conn).await?)
    }
}
