//! Query planning for the collection store.
//!
//! [`QueryOptions`] is the declarative filter chosen by the user (recency
//! window, free text, untagged/duplicates mode). [`CollectionQuery`] turns it
//! into a `SELECT` over the `songs` table plus its bound values, and accepts
//! further predicates from the backend (artist, album, compilation
//! requirement, ...).
//!
//! ```
//! use core_library::query::{CollectionQuery, QueryMode, QueryOptions};
//!
//! let options = QueryOptions::default().with_query_mode(QueryMode::Untagged);
//! let query = CollectionQuery::from_options(&options).add_where("album", "X", "=");
//!
//! let sql = query.to_sql();
//! assert!(sql.contains("(songs.artist = '' OR songs.album = '' OR songs.title = '')"));
//! assert!(sql.ends_with("AND album = ? AND songs.unavailable = 0"));
//! ```

use crate::error::{LibraryError, Result};
use crate::models::Song;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteArguments;
use sqlx::{Sqlite, SqliteConnection};
use std::fmt;

/// Column list mapping onto [`Song`].
pub const SONG_COLUMNS: &str = "songs.id, songs.song_id, songs.directory_id, songs.url, \
     songs.title, songs.album, songs.artist, songs.album_artist, songs.composer, \
     songs.performer, songs.grouping, songs.genre, songs.comment, songs.track, songs.disc, \
     songs.year, songs.original_year, songs.filetype, songs.samplerate, songs.bitdepth, \
     songs.bitrate, songs.length_nanosec, songs.compilation, songs.compilation_detected, \
     songs.compilation_on, songs.compilation_off, songs.compilation_effective, \
     songs.unavailable, songs.playcount, songs.skipcount, songs.rating, songs.lastplayed, \
     songs.lastseen, songs.ctime, songs.mtime";

/// Largest value list bound into one `IN (...)` clause. SQLite caps the
/// number of bound variables per statement, so unbounded id lists are split
/// into chunks of this size.
pub const MAX_IN_VALUES: usize = 900;

/// SQL expression for the album artist, falling back to the track artist.
pub const EFFECTIVE_ALBUMARTIST: &str =
    "(CASE WHEN songs.album_artist = '' THEN songs.artist ELSE songs.album_artist END)";

// ============================================================================
// Bound values
// ============================================================================

/// A value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryValue::Null => f.write_str("NULL"),
            QueryValue::Integer(i) => write!(f, "{}", i),
            QueryValue::Real(r) => write!(f, "{}", r),
            QueryValue::Text(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Integer(value)
    }
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        QueryValue::Integer(value.into())
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Integer(value.into())
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        QueryValue::Real(value)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Text(value)
    }
}

impl From<Option<i64>> for QueryValue {
    fn from(value: Option<i64>) -> Self {
        value.map_or(QueryValue::Null, QueryValue::Integer)
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;
type SqliteQueryAs<'q, O> = sqlx::query::QueryAs<'q, Sqlite, O, SqliteArguments<'q>>;
type SqliteQueryScalar<'q, O> = sqlx::query::QueryScalar<'q, Sqlite, O, SqliteArguments<'q>>;

/// Bind `params` onto a statement in order.
pub fn bind_values<'q>(query: SqliteQuery<'q>, params: &'q [QueryValue]) -> SqliteQuery<'q> {
    params.iter().fold(query, |query, param| match param {
        QueryValue::Null => query.bind(None::<i64>),
        QueryValue::Integer(i) => query.bind(*i),
        QueryValue::Real(r) => query.bind(*r),
        QueryValue::Text(s) => query.bind(s.as_str()),
    })
}

/// [`bind_values`] for `query_as` statements.
pub fn bind_values_as<'q, O>(
    query: SqliteQueryAs<'q, O>,
    params: &'q [QueryValue],
) -> SqliteQueryAs<'q, O> {
    params.iter().fold(query, |query, param| match param {
        QueryValue::Null => query.bind(None::<i64>),
        QueryValue::Integer(i) => query.bind(*i),
        QueryValue::Real(r) => query.bind(*r),
        QueryValue::Text(s) => query.bind(s.as_str()),
    })
}

/// [`bind_values`] for `query_scalar` statements.
pub fn bind_values_scalar<'q, O>(
    query: SqliteQueryScalar<'q, O>,
    params: &'q [QueryValue],
) -> SqliteQueryScalar<'q, O> {
    params.iter().fold(query, |query, param| match param {
        QueryValue::Null => query.bind(None::<i64>),
        QueryValue::Integer(i) => query.bind(*i),
        QueryValue::Real(r) => query.bind(*r),
        QueryValue::Text(s) => query.bind(s.as_str()),
    })
}

// ============================================================================
// Query options
// ============================================================================

/// Restricts which songs a query returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryMode {
    #[default]
    All,
    /// Songs sharing (artist, album, title) with another song.
    Duplicates,
    /// Songs missing an artist, album or title.
    Untagged,
}

/// Declarative filter over the collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    max_age: Option<i64>,
    filter: Option<String>,
    query_mode: QueryMode,
}

impl QueryOptions {
    /// Only songs created within the last `seconds`.
    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn with_filter(mut self, text: impl Into<String>) -> Self {
        self.set_filter(Some(text.into()));
        self
    }

    pub fn with_query_mode(mut self, mode: QueryMode) -> Self {
        self.set_query_mode(mode);
        self
    }

    pub fn max_age(&self) -> Option<i64> {
        self.max_age
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn query_mode(&self) -> QueryMode {
        self.query_mode
    }

    pub fn set_max_age(&mut self, seconds: Option<i64>) {
        self.max_age = seconds;
    }

    /// An empty string clears the filter.
    pub fn set_filter(&mut self, text: Option<String>) {
        self.filter = text.filter(|t| !t.is_empty());
    }

    /// Untagged and duplicates modes replace the free-text filter.
    pub fn set_query_mode(&mut self, mode: QueryMode) {
        self.query_mode = mode;
        if mode != QueryMode::All {
            self.filter = None;
        }
    }

    /// In-memory counterpart of the SQL predicate, evaluated now.
    pub fn matches(&self, song: &Song) -> bool {
        self.matches_at(song, chrono::Utc::now().timestamp())
    }

    /// Evaluate against a fixed clock.
    ///
    /// Duplicates mode cannot be decided from a single song and always
    /// matches here.
    pub fn matches_at(&self, song: &Song, now: i64) -> bool {
        if let Some(max_age) = self.max_age {
            if song.ctime <= now - max_age {
                return false;
            }
        }

        if self.query_mode == QueryMode::Untagged
            && !(song.artist.is_empty() || song.album.is_empty() || song.title.is_empty())
        {
            return false;
        }

        // SQLite's LIKE only folds ASCII case
        match &self.filter {
            Some(filter) => {
                let needle = filter.to_ascii_lowercase();
                song.artist.to_ascii_lowercase().contains(&needle)
                    || song.album.to_ascii_lowercase().contains(&needle)
                    || song.title.to_ascii_lowercase().contains(&needle)
            }
            None => true,
        }
    }
}

/// Make `%`, `_` and `\` match literally in a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// ============================================================================
// Collection query
// ============================================================================

/// `SELECT` builder over the `songs` table.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionQuery {
    column_spec: String,
    order_by: Option<String>,
    where_clauses: Vec<String>,
    binds: Vec<QueryValue>,
    include_unavailable: bool,
    duplicates_only: bool,
    limit: Option<u32>,
}

impl Default for CollectionQuery {
    fn default() -> Self {
        Self {
            column_spec: SONG_COLUMNS.to_string(),
            order_by: None,
            where_clauses: Vec::new(),
            binds: Vec::new(),
            include_unavailable: false,
            duplicates_only: false,
            limit: None,
        }
    }
}

impl CollectionQuery {
    /// All available songs.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_options(options: &QueryOptions) -> Self {
        Self::from_options_at(options, chrono::Utc::now().timestamp())
    }

    /// Plan `options` against a fixed clock.
    pub fn from_options_at(options: &QueryOptions, now: i64) -> Self {
        let mut query = Self::default();

        if let Some(max_age) = options.max_age {
            query.where_clauses.push("songs.ctime > ?".to_string());
            query.binds.push(QueryValue::Integer(now - max_age));
        }

        match options.query_mode {
            QueryMode::All => {}
            QueryMode::Duplicates => query.duplicates_only = true,
            QueryMode::Untagged => query.where_clauses.push(
                "(songs.artist = '' OR songs.album = '' OR songs.title = '')".to_string(),
            ),
        }

        if let Some(filter) = &options.filter {
            let pattern = format!("%{}%", escape_like(filter));
            query.where_clauses.push(
                "(songs.artist LIKE ? ESCAPE '\\' OR songs.album LIKE ? ESCAPE '\\' \
                 OR songs.title LIKE ? ESCAPE '\\')"
                    .to_string(),
            );
            query.binds.extend(std::iter::repeat(QueryValue::Text(pattern)).take(3));
        }

        query
    }

    pub fn column_spec(mut self, spec: impl Into<String>) -> Self {
        self.column_spec = spec.into();
        self
    }

    /// `column op ?`
    pub fn add_where(mut self, column: &str, value: impl Into<QueryValue>, op: &str) -> Self {
        self.where_clauses.push(format!("{} {} ?", column, op));
        self.binds.push(value.into());
        self
    }

    /// `column IN (?, ...)`; an empty list matches nothing. Lists that may
    /// exceed [`MAX_IN_VALUES`] must be split by the caller.
    pub fn add_where_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<QueryValue>,
    {
        let mut placeholders = Vec::new();
        for value in values {
            placeholders.push("?");
            self.binds.push(value.into());
        }
        if placeholders.is_empty() {
            self.where_clauses.push("0".to_string());
        } else {
            self.where_clauses
                .push(format!("{} IN ({})", column, placeholders.join(",")));
        }
        self
    }

    /// Songs credited to `artist` either as album artist or as track artist
    /// of an album without album artist.
    pub fn add_where_artist(mut self, artist: &str) -> Self {
        self.where_clauses.push(
            "((songs.artist = ? AND songs.album_artist = '') OR songs.album_artist = ?)"
                .to_string(),
        );
        self.binds.push(artist.into());
        self.binds.push(artist.into());
        self
    }

    pub fn add_compilation_requirement(mut self, compilation: bool) -> Self {
        self.where_clauses.push(format!(
            "+songs.compilation_effective = {}",
            i32::from(compilation)
        ));
        self
    }

    pub fn include_unavailable(mut self, include: bool) -> Self {
        self.include_unavailable = include;
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn binds(&self) -> &[QueryValue] {
        &self.binds
    }

    pub fn is_duplicates_only(&self) -> bool {
        self.duplicates_only
    }

    pub fn to_sql(&self) -> String {
        let mut sql = format!("SELECT {} FROM songs", self.column_spec);

        if self.duplicates_only {
            sql.push_str(
                " INNER JOIN duplicated_songs dsongs ON (songs.artist = dsongs.dup_artist \
                 AND songs.album = dsongs.dup_album AND songs.title = dsongs.dup_title)",
            );
        }

        let mut where_clauses = self.where_clauses.clone();
        if !self.include_unavailable {
            where_clauses.push("songs.unavailable = 0".to_string());
        }
        if !where_clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clauses.join(" AND "));
        }

        if let Some(order_by) = &self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order_by);
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        sql
    }

    /// Run the query and map every row onto a [`Song`].
    ///
    /// Requires the default column spec.
    pub async fn fetch_songs(&self, conn: &mut SqliteConnection) -> Result<Vec<Song>> {
        let sql = self.to_sql();
        bind_values_as(sqlx::query_as::<_, Song>(&sql), &self.binds)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| LibraryError::statement(sql.as_str(), &self.binds, e))
    }

    /// Run a query whose column spec selects a single text column.
    pub async fn fetch_strings(&self, conn: &mut SqliteConnection) -> Result<Vec<String>> {
        let sql = self.to_sql();
        bind_values_scalar(sqlx::query_scalar::<_, String>(&sql), &self.binds)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| LibraryError::statement(sql.as_str(), &self.binds, e))
    }
}
