use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Population query failed: {0}")]
    Storage(#[from] LibraryError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Population task failed: {0}")]
    Task(String),

    #[error("Unknown grouping id: {0}")]
    UnknownGroupBy(u8),
}

pub type Result<T> = std::result::Result<T, IndexError>;
