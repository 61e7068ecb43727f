//! # Core Configuration Module
//!
//! Provides configuration management for the collection core.
//!
//! ## Overview
//!
//! A builder constructs a [`CoreConfig`] holding the store location, the
//! notification buffer size, the unavailable-song expiry window and the
//! grouping index display settings. `build()` validates eagerly so that a bad
//! value is reported before any database is opened.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/collection.db")
//!     .expire_unavailable_songs_days(60)
//!     .show_dividers(true)
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.expire_unavailable_songs_days, 60);
//! ```
//!
//! Omitting `database_path` selects an in-memory store, which is what tests
//! use.
//!
//! ## Persisted settings
//!
//! [`IndexSettings`] is serde-serializable so hosts can keep it in their own
//! settings storage as JSON.

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const MAX_EXPIRE_DAYS: u32 = 36_500;

/// Display options for the grouping index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Section top-level containers under alphabetic/numeric dividers.
    pub show_dividers: bool,
    /// Fold compilation tracks into a "Various artists" container when
    /// grouping by an artist-like dimension.
    pub show_various_artists: bool,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            show_dividers: true,
            show_various_artists: true,
        }
    }
}

impl IndexSettings {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// SQLite file backing the collection; `None` keeps it in memory.
    pub database_path: Option<PathBuf>,
    pub max_connections: u32,
    /// Capacity of the broadcast side of the event bus.
    pub event_buffer_size: usize,
    /// Unavailable songs older than this many days are deleted when a
    /// directory is rescanned. Zero disables expiry.
    pub expire_unavailable_songs_days: u32,
    pub index: IndexSettings,
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.is_none()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = &self.database_path {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }

        if self.max_connections == 0 {
            return Err(Error::Config(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.expire_unavailable_songs_days > MAX_EXPIRE_DAYS {
            return Err(Error::Config(format!(
                "expire_unavailable_songs_days exceeds maximum of {} days",
                MAX_EXPIRE_DAYS
            )));
        }

        Ok(())
    }
}

/// Builder for [`CoreConfig`].
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    max_connections: Option<u32>,
    event_buffer_size: Option<usize>,
    expire_unavailable_songs_days: Option<u32>,
    index: IndexSettings,
}

impl CoreConfigBuilder {
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn expire_unavailable_songs_days(mut self, days: u32) -> Self {
        self.expire_unavailable_songs_days = Some(days);
        self
    }

    pub fn show_dividers(mut self, show: bool) -> Self {
        self.index.show_dividers = show;
        self
    }

    pub fn show_various_artists(mut self, show: bool) -> Self {
        self.index.show_various_artists = show;
        self
    }

    pub fn index_settings(mut self, settings: IndexSettings) -> Self {
        self.index = settings;
        self
    }

    /// Builds the configuration, failing fast on invalid values.
    pub fn build(self) -> Result<CoreConfig> {
        let config = CoreConfig {
            database_path: self.database_path,
            max_connections: self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            expire_unavailable_songs_days: self.expire_unavailable_songs_days.unwrap_or(0),
            index: self.index,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = CoreConfig::builder().build().unwrap();

        assert!(config.is_in_memory());
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert_eq!(config.expire_unavailable_songs_days, 0);
        assert_eq!(config.index, IndexSettings::default());
    }

    #[test]
    fn test_builder_with_all_fields() {
        let config = CoreConfig::builder()
            .database_path("/tmp/collection.db")
            .max_connections(2)
            .event_buffer_size(512)
            .expire_unavailable_songs_days(30)
            .show_dividers(false)
            .show_various_artists(false)
            .build()
            .unwrap();

        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/tmp/collection.db"))
        );
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.event_buffer_size, 512);
        assert_eq!(config.expire_unavailable_songs_days, 30);
        assert!(!config.index.show_dividers);
        assert!(!config.index.show_various_artists);
    }

    #[test]
    fn test_empty_database_path_rejected() {
        let result = CoreConfig::builder().database_path("").build();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Database path cannot be empty"));
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let result = CoreConfig::builder().event_buffer_size(0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_connections_rejected() {
        let result = CoreConfig::builder().max_connections(0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_expire_window_upper_bound() {
        let result = CoreConfig::builder()
            .expire_unavailable_songs_days(MAX_EXPIRE_DAYS + 1)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_index_settings_json() {
        let settings = IndexSettings {
            show_dividers: false,
            show_various_artists: true,
        };
        let json = settings.to_json().unwrap();
        assert_eq!(IndexSettings::from_json(&json).unwrap(), settings);

        // Missing fields fall back to defaults.
        let partial = IndexSettings::from_json(r#"{"show_dividers":false}"#).unwrap();
        assert!(!partial.show_dividers);
        assert!(partial.show_various_artists);
    }
}
