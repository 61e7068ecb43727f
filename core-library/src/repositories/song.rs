//! Song repository.
//!
//! Two layers:
//!
//! - Connection-level functions taking `&mut SqliteConnection`. The caller
//!   owns the connection (and usually a transaction on it), so several calls
//!   can be grouped into one atomic unit. Each mutating function issues
//!   one statement, or one per [`MAX_IN_VALUES`] ids for id lists.
//! - [`SongRepository`], the pool-level read interface used by the grouping
//!   index to populate itself. [`SqliteSongRepository`] implements it on top
//!   of [`CollectionDatabase`].
//!
//! Every failing statement is reported as [`LibraryError::Statement`] with
//! its SQL and bound values.

use crate::db::CollectionDatabase;
use crate::error::{LibraryError, Result};
use crate::models::{CollectionCounts, Song};
use crate::query::{
    bind_values, bind_values_as, bind_values_scalar, CollectionQuery, QueryValue,
    EFFECTIVE_ALBUMARTIST, MAX_IN_VALUES, SONG_COLUMNS,
};
use async_trait::async_trait;
use sqlx::{FromRow, SqliteConnection};
use tracing::debug;

const INSERT_SQL: &str = "INSERT INTO songs (song_id, directory_id, url, title, album, artist, \
     album_artist, composer, performer, grouping, genre, comment, track, disc, year, \
     original_year, filetype, samplerate, bitdepth, bitrate, length_nanosec, compilation, \
     compilation_detected, compilation_on, compilation_off, compilation_effective, unavailable, \
     playcount, skipcount, rating, lastplayed, lastseen, ctime, mtime) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, \
     ?, ?, ?, ?, ?, ?, ?, ?, ?)";

const UPDATE_SQL: &str = "UPDATE songs SET song_id = ?, directory_id = ?, url = ?, title = ?, \
     album = ?, artist = ?, album_artist = ?, composer = ?, performer = ?, grouping = ?, \
     genre = ?, comment = ?, track = ?, disc = ?, year = ?, original_year = ?, filetype = ?, \
     samplerate = ?, bitdepth = ?, bitrate = ?, length_nanosec = ?, compilation = ?, \
     compilation_detected = ?, compilation_on = ?, compilation_off = ?, \
     compilation_effective = ?, unavailable = ?, playcount = ?, skipcount = ?, rating = ?, \
     lastplayed = ?, lastseen = ?, ctime = ?, mtime = ? WHERE id = ?";

/// One available song as seen by the compilation classifier.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CompilationCandidate {
    pub id: i64,
    pub effective_albumartist: String,
    pub album: String,
    pub url: String,
    pub compilation_detected: bool,
}

impl CompilationCandidate {
    /// Location with the file name removed.
    pub fn directory_url(&self) -> &str {
        match self.url.rfind('/') {
            Some(pos) => &self.url[..=pos],
            None => "",
        }
    }
}

/// Bound values for [`INSERT_SQL`] / [`UPDATE_SQL`], in column order.
fn row_values(song: &Song) -> Vec<QueryValue> {
    vec![
        song.song_id.clone().into(),
        song.directory_id.into(),
        song.url.clone().into(),
        song.title.clone().into(),
        song.album.clone().into(),
        song.artist.clone().into(),
        song.album_artist.clone().into(),
        song.composer.clone().into(),
        song.performer.clone().into(),
        song.grouping.clone().into(),
        song.genre.clone().into(),
        song.comment.clone().into(),
        song.track.into(),
        song.disc.into(),
        song.year.into(),
        song.original_year.into(),
        song.filetype.clone().into(),
        song.samplerate.into(),
        song.bitdepth.into(),
        song.bitrate.into(),
        song.length_nanosec.into(),
        song.compilation.into(),
        song.compilation_detected.into(),
        song.compilation_on.into(),
        song.compilation_off.into(),
        // Derived here so a stored row can never disagree with its flags.
        song.is_compilation().into(),
        song.unavailable.into(),
        song.playcount.into(),
        song.skipcount.into(),
        song.rating.into(),
        song.lastplayed.into(),
        song.lastseen.into(),
        song.ctime.into(),
        song.mtime.into(),
    ]
}

async fn execute(conn: &mut SqliteConnection, sql: &str, binds: &[QueryValue]) -> Result<u64> {
    bind_values(sqlx::query(sql), binds)
        .execute(&mut *conn)
        .await
        .map(|done| done.rows_affected())
        .map_err(|e| LibraryError::statement(sql, binds, e))
}

async fn fetch_songs(
    conn: &mut SqliteConnection,
    sql: &str,
    binds: &[QueryValue],
) -> Result<Vec<Song>> {
    bind_values_as(sqlx::query_as::<_, Song>(sql), binds)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| LibraryError::statement(sql, binds, e))
}

// ============================================================================
// Reads
// ============================================================================

pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Song>> {
    let sql = format!("SELECT {} FROM songs WHERE songs.id = ?", SONG_COLUMNS);
    let binds = [QueryValue::Integer(id)];
    bind_values_as(sqlx::query_as::<_, Song>(&sql), &binds)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| LibraryError::statement(sql.as_str(), &binds, e))
}

/// Songs with the given ids, unavailable ones included, in id order.
pub async fn find_by_ids(conn: &mut SqliteConnection, ids: &[i64]) -> Result<Vec<Song>> {
    let mut songs = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(MAX_IN_VALUES) {
        let query = CollectionQuery::new()
            .include_unavailable(true)
            .add_where_in("songs.id", chunk.iter().copied())
            .order_by("songs.id");
        songs.extend(query.fetch_songs(conn).await?);
    }
    songs.sort_by_key(|s| s.id);
    Ok(songs)
}

/// The song carrying `song_id`, unavailable ones included.
pub async fn find_by_song_id(conn: &mut SqliteConnection, song_id: &str) -> Result<Option<Song>> {
    if song_id.is_empty() {
        return Ok(None);
    }
    let sql = format!(
        "SELECT {} FROM songs WHERE songs.song_id = ? ORDER BY songs.id LIMIT 1",
        SONG_COLUMNS
    );
    let binds = [QueryValue::from(song_id)];
    bind_values_as(sqlx::query_as::<_, Song>(&sql), &binds)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| LibraryError::statement(sql.as_str(), &binds, e))
}

pub async fn find_by_url(conn: &mut SqliteConnection, url: &str) -> Result<Vec<Song>> {
    let sql = format!("SELECT {} FROM songs WHERE songs.url = ?", SONG_COLUMNS);
    fetch_songs(conn, &sql, &[url.into()]).await
}

/// Every song owned by a directory, unavailable ones included.
pub async fn find_in_directory(
    conn: &mut SqliteConnection,
    directory_id: i64,
) -> Result<Vec<Song>> {
    let sql = format!(
        "SELECT {} FROM songs WHERE songs.directory_id = ? ORDER BY songs.id",
        SONG_COLUMNS
    );
    fetch_songs(conn, &sql, &[directory_id.into()]).await
}

/// Songs matching (artist, album, title); empty album matches any album.
pub async fn find_by_tags(
    conn: &mut SqliteConnection,
    artist: &str,
    album: &str,
    title: &str,
) -> Result<Vec<Song>> {
    let mut query = CollectionQuery::new()
        .add_where("songs.artist", artist, "=")
        .add_where("songs.title", title, "=");
    if !album.is_empty() {
        query = query.add_where("songs.album", album, "=");
    }
    query.fetch_songs(conn).await
}

/// Run a planned query.
pub async fn select(conn: &mut SqliteConnection, query: &CollectionQuery) -> Result<Vec<Song>> {
    query.fetch_songs(conn).await
}

/// Unavailable songs of a directory last seen before `cutoff`.
pub async fn find_expired(
    conn: &mut SqliteConnection,
    directory_id: i64,
    cutoff: i64,
) -> Result<Vec<Song>> {
    let sql = format!(
        "SELECT {} FROM songs WHERE songs.directory_id = ? AND songs.unavailable = 1 \
         AND songs.lastseen > 0 AND songs.lastseen < ?",
        SONG_COLUMNS
    );
    fetch_songs(conn, &sql, &[directory_id.into(), cutoff.into()]).await
}

/// Classifier input: every available song with its effective artist.
pub async fn compilation_candidates(
    conn: &mut SqliteConnection,
) -> Result<Vec<CompilationCandidate>> {
    let sql = format!(
        "SELECT songs.id, {} AS effective_albumartist, songs.album, songs.url, \
         songs.compilation_detected FROM songs WHERE songs.unavailable = 0 \
         ORDER BY songs.album, songs.id",
        EFFECTIVE_ALBUMARTIST
    );
    sqlx::query_as::<_, CompilationCandidate>(&sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| LibraryError::statement(sql.as_str(), &[], e))
}

/// Aggregate counters over available songs.
pub async fn counts(conn: &mut SqliteConnection) -> Result<CollectionCounts> {
    let songs = count(conn, "SELECT COUNT(*) FROM songs WHERE unavailable = 0").await?;
    let artists = count(
        conn,
        "SELECT COUNT(DISTINCT artist) FROM songs WHERE unavailable = 0",
    )
    .await?;
    let albums_sql = format!(
        "SELECT COUNT(*) FROM (SELECT DISTINCT {} AS albumartist, songs.album FROM songs \
         WHERE songs.unavailable = 0)",
        EFFECTIVE_ALBUMARTIST
    );
    let albums = count(conn, &albums_sql).await?;

    Ok(CollectionCounts {
        songs,
        artists,
        albums,
    })
}

async fn count(conn: &mut SqliteConnection, sql: &str) -> Result<i64> {
    bind_values_scalar(sqlx::query_scalar::<_, i64>(sql), &[])
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| LibraryError::statement(sql, &[], e))
}

// ============================================================================
// Writes
// ============================================================================

/// Insert a new row and return its id.
pub async fn insert(conn: &mut SqliteConnection, song: &Song) -> Result<i64> {
    if !song.is_valid() {
        return Err(LibraryError::InvalidInput {
            field: "url".to_string(),
            message: "song location cannot be empty".to_string(),
        });
    }

    let binds = row_values(song);
    let id = bind_values(sqlx::query(INSERT_SQL), &binds)
        .execute(&mut *conn)
        .await
        .map(|done| done.last_insert_rowid())
        .map_err(|e| LibraryError::statement(INSERT_SQL, &binds, e))?;

    debug!(id, url = %song.url, "Inserted song");
    Ok(id)
}

/// Overwrite every column of row `song.id` with the snapshot.
///
/// Returns `false` when the row does not exist.
pub async fn update_metadata(conn: &mut SqliteConnection, song: &Song) -> Result<bool> {
    let mut binds = row_values(song);
    binds.push(song.id.into());
    Ok(execute(conn, UPDATE_SQL, &binds).await? > 0)
}

pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    Ok(execute(conn, "DELETE FROM songs WHERE id = ?", &[id.into()]).await? > 0)
}

pub async fn delete_all(conn: &mut SqliteConnection) -> Result<u64> {
    execute(conn, "DELETE FROM songs", &[]).await
}

/// Store the classifier verdict and recompute the effective flag.
pub async fn update_compilation_detected(
    conn: &mut SqliteConnection,
    id: i64,
    detected: bool,
) -> Result<bool> {
    let sql = "UPDATE songs SET compilation_detected = ?, \
               compilation_effective = \
               ((compilation OR ? OR compilation_on) AND NOT compilation_off) \
               WHERE id = ?";
    let binds = [detected.into(), detected.into(), id.into()];
    Ok(execute(conn, sql, &binds).await? > 0)
}

/// Force songs of `album` (optionally only by `artist`) in or out of
/// compilations.
pub async fn update_compilation_override(
    conn: &mut SqliteConnection,
    album: &str,
    artist: Option<&str>,
    on: bool,
) -> Result<u64> {
    let mut sql = "UPDATE songs SET compilation_on = ?, compilation_off = ?, \
                   compilation_effective = ((compilation OR compilation_detected OR ?) AND NOT ?) \
                   WHERE album = ? AND unavailable = 0"
        .to_string();
    let mut binds: Vec<QueryValue> =
        vec![on.into(), (!on).into(), on.into(), (!on).into(), album.into()];
    if let Some(artist) = artist {
        sql.push_str(" AND artist = ?");
        binds.push(artist.into());
    }
    execute(conn, &sql, &binds).await
}

pub async fn set_unavailable(
    conn: &mut SqliteConnection,
    id: i64,
    unavailable: bool,
) -> Result<bool> {
    let binds = [unavailable.into(), id.into()];
    Ok(execute(conn, "UPDATE songs SET unavailable = ? WHERE id = ?", &binds).await? > 0)
}

pub async fn update_location(
    conn: &mut SqliteConnection,
    id: i64,
    url: &str,
    directory_id: Option<i64>,
) -> Result<bool> {
    let binds = [url.into(), directory_id.into(), id.into()];
    Ok(execute(conn, "UPDATE songs SET url = ?, directory_id = ? WHERE id = ?", &binds).await? > 0)
}

pub async fn update_mtime(conn: &mut SqliteConnection, id: i64, mtime: i64) -> Result<bool> {
    let binds = [mtime.into(), id.into()];
    Ok(execute(conn, "UPDATE songs SET mtime = ? WHERE id = ?", &binds).await? > 0)
}

/// Replace the `old_prefix` of every url in a directory with `new_prefix`.
pub async fn rewrite_directory_urls(
    conn: &mut SqliteConnection,
    directory_id: i64,
    old_prefix: &str,
    new_prefix: &str,
) -> Result<u64> {
    let old_len = old_prefix.chars().count() as i64;
    let binds = [
        new_prefix.into(),
        (old_len + 1).into(),
        directory_id.into(),
        old_len.into(),
        old_prefix.into(),
    ];
    execute(
        conn,
        "UPDATE songs SET url = ? || substr(url, ?) \
         WHERE directory_id = ? AND substr(url, 1, ?) = ?",
        &binds,
    )
    .await
}

// ============================================================================
// Statistics
// ============================================================================

pub async fn increment_playcount(conn: &mut SqliteConnection, id: i64, now: i64) -> Result<bool> {
    let binds = [now.into(), id.into()];
    Ok(execute(
        conn,
        "UPDATE songs SET playcount = playcount + 1, lastplayed = ? WHERE id = ?",
        &binds,
    )
    .await?
        > 0)
}

pub async fn increment_skipcount(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    Ok(execute(
        conn,
        "UPDATE songs SET skipcount = skipcount + 1 WHERE id = ?",
        &[id.into()],
    )
    .await?
        > 0)
}

pub async fn reset_statistics(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    Ok(execute(
        conn,
        "UPDATE songs SET playcount = 0, skipcount = 0, lastplayed = -1 WHERE id = ?",
        &[id.into()],
    )
    .await?
        > 0)
}

pub async fn set_rating(conn: &mut SqliteConnection, ids: &[i64], rating: f64) -> Result<u64> {
    let mut updated = 0;
    for chunk in ids.chunks(MAX_IN_VALUES) {
        let placeholders = vec!["?"; chunk.len()].join(",");
        let sql = format!("UPDATE songs SET rating = ? WHERE id IN ({placeholders})");
        let mut binds: Vec<QueryValue> = vec![rating.into()];
        binds.extend(chunk.iter().map(|id| QueryValue::Integer(*id)));
        updated += execute(conn, &sql, &binds).await?;
    }
    Ok(updated)
}

pub async fn set_lastplayed(conn: &mut SqliteConnection, id: i64, lastplayed: i64) -> Result<bool> {
    let binds = [lastplayed.into(), id.into()];
    Ok(execute(conn, "UPDATE songs SET lastplayed = ? WHERE id = ?", &binds).await? > 0)
}

pub async fn set_playcount(conn: &mut SqliteConnection, id: i64, playcount: i32) -> Result<bool> {
    let binds = [playcount.into(), id.into()];
    Ok(execute(conn, "UPDATE songs SET playcount = ? WHERE id = ?", &binds).await? > 0)
}

/// Stamp every available song of a directory as seen at `now`.
pub async fn touch_last_seen(
    conn: &mut SqliteConnection,
    directory_id: i64,
    now: i64,
) -> Result<u64> {
    let binds = [now.into(), directory_id.into()];
    execute(
        conn,
        "UPDATE songs SET lastseen = ? WHERE directory_id = ? AND unavailable = 0",
        &binds,
    )
    .await
}

// ============================================================================
// Pool-level repository
// ============================================================================

/// Read access used to populate views of the collection.
#[async_trait]
pub trait SongRepository: Send + Sync {
    /// Find a song by its surrogate id
    async fn find_by_id(&self, id: i64) -> Result<Option<Song>>;

    /// Find a song by its external id
    async fn find_by_song_id(&self, song_id: &str) -> Result<Option<Song>>;

    /// Run a planned query
    async fn query(&self, query: &CollectionQuery) -> Result<Vec<Song>>;

    /// Aggregate counters over available songs
    async fn counts(&self) -> Result<CollectionCounts>;
}

/// SQLite implementation of [`SongRepository`]
#[derive(Debug, Clone)]
pub struct SqliteSongRepository {
    db: CollectionDatabase,
}

impl SqliteSongRepository {
    pub fn new(db: CollectionDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SongRepository for SqliteSongRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Song>> {
        let mut conn = self.db.acquire().await?;
        find_by_id(&mut conn, id).await
    }

    async fn find_by_song_id(&self, song_id: &str) -> Result<Option<Song>> {
        let mut conn = self.db.acquire().await?;
        find_by_song_id(&mut conn, song_id).await
    }

    async fn query(&self, query: &CollectionQuery) -> Result<Vec<Song>> {
        let mut conn = self.db.acquire().await?;
        select(&mut conn, query).await
    }

    async fn counts(&self) -> Result<CollectionCounts> {
        let mut conn = self.db.acquire().await?;
        counts(&mut conn).await
    }
}
