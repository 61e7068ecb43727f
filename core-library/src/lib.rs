//! # Collection Store
//!
//! Owns the persistent song collection and the query planner over it.
//!
//! ## Overview
//!
//! This crate manages:
//! - SQLite schema and migrations for songs and watched directories
//! - The store lock serializing every statement against one collection
//! - Repository functions grouped into transactions by the backend
//! - Query planning from user filters to `SELECT` statements
//! - The change notifications the backend emits after each commit

pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod query;
pub mod repositories;

pub use db::{CollectionDatabase, DatabaseConfig, LockedConnection};
pub use error::{LibraryError, Result};
pub use events::CollectionEvent;
pub use models::{AlbumSummary, CollectionCounts, Directory, Song, SongDelta};
pub use query::{CollectionQuery, QueryMode, QueryOptions, QueryValue};
