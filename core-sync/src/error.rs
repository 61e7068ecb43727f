use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Storage error: {0}")]
    Storage(#[from] LibraryError),

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        SyncError::Storage(LibraryError::Database(e))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
