//! # Repository Layer
//!
//! Data access for the collection store.
//!
//! ## Architecture
//!
//! - Connection-level functions take `&mut SqliteConnection`, so the backend
//!   can run several of them inside one transaction
//! - Pool-level traits cover the read paths used by views of the collection
//! - All operations return `Result<T>`; failed statements carry their SQL and
//!   bound values
//!
//! ## Available Repositories
//!
//! - `song` - Songs with metadata, statistics and compilation flags
//! - `directory` - Watched folders owning songs

pub mod directory;
pub mod song;

pub use song::{CompilationCandidate, SongRepository, SqliteSongRepository};
