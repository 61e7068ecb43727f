//! Directory repository

use crate::error::{LibraryError, Result};
use crate::models::Directory;
use crate::query::QueryValue;
use sqlx::SqliteConnection;
use tracing::debug;

/// Register a watched folder.
///
/// # Errors
/// Returns error if:
/// - `path` is empty
/// - A directory with the same path already exists
pub async fn insert(conn: &mut SqliteConnection, path: &str) -> Result<Directory> {
    if path.is_empty() {
        return Err(LibraryError::InvalidInput {
            field: "path".to_string(),
            message: "directory path cannot be empty".to_string(),
        });
    }

    let sql = "INSERT INTO directories (path) VALUES (?)";
    let id = sqlx::query(sql)
        .bind(path)
        .execute(&mut *conn)
        .await
        .map(|done| done.last_insert_rowid())
        .map_err(|e| LibraryError::statement(sql, &[path.into()], e))?;

    debug!(directory_id = id, path, "Registered directory");
    Ok(Directory {
        id,
        path: path.to_string(),
    })
}

pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Directory>> {
    let sql = "SELECT id, path FROM directories WHERE id = ?";
    sqlx::query_as::<_, Directory>(sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| LibraryError::statement(sql, &[QueryValue::Integer(id)], e))
}

pub async fn exists(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    Ok(find_by_id(conn, id).await?.is_some())
}

/// All directories ordered by id.
pub async fn find_all(conn: &mut SqliteConnection) -> Result<Vec<Directory>> {
    let sql = "SELECT id, path FROM directories ORDER BY id";
    sqlx::query_as::<_, Directory>(sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| LibraryError::statement(sql, &[], e))
}

/// Delete a directory. Its songs go with it through the foreign key cascade.
///
/// # Returns
/// - `Ok(true)` if the directory was deleted
/// - `Ok(false)` if it was not found
pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    let sql = "DELETE FROM directories WHERE id = ?";
    let done = sqlx::query(sql)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| LibraryError::statement(sql, &[QueryValue::Integer(id)], e))?;
    Ok(done.rows_affected() > 0)
}

pub async fn update_path(conn: &mut SqliteConnection, id: i64, path: &str) -> Result<bool> {
    let sql = "UPDATE directories SET path = ? WHERE id = ?";
    let done = sqlx::query(sql)
        .bind(path)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| LibraryError::statement(sql, &[path.into(), id.into()], e))?;
    Ok(done.rows_affected() > 0)
}
