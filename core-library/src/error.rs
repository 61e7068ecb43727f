use crate::query::QueryValue;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A single statement failed. Carries the statement text and the rendered
    /// bound values so the failure can be reproduced.
    #[error("Statement failed: {source} (sql: {sql}; binds: {binds:?})")]
    Statement {
        sql: String,
        binds: Vec<String>,
        #[source]
        source: sqlx::Error,
    },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl LibraryError {
    pub fn statement(sql: impl Into<String>, binds: &[QueryValue], source: sqlx::Error) -> Self {
        LibraryError::Statement {
            sql: sql.into(),
            binds: binds.iter().map(ToString::to_string).collect(),
            source,
        }
    }

    pub fn not_found(entity_type: &str, id: impl ToString) -> Self {
        LibraryError::NotFound {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
