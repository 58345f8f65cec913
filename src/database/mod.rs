pub mod schema;

use crate::error::AppError;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Connection shared by the record store and both request queues.
/// Guards must never be held across an `.await`.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Opens (or creates) the database file and initializes the schema
pub fn open_database(db_path: &Path) -> Result<SharedConnection, AppError> {
    // Make sure the directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(db_path)?;
    schema::init_schema(&conn)?;
    log::info!("Database opened at {}", db_path.display());

    Ok(Arc::new(Mutex::new(conn)))
}

/// In-memory database, used by tests and dry runs
pub fn open_in_memory() -> Result<SharedConnection, AppError> {
    let conn = Connection::open_in_memory()?;
    schema::init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

pub fn lock(db: &SharedConnection) -> Result<MutexGuard<'_, Connection>, AppError> {
    db.lock()
        .map_err(|e| AppError::Other(format!("Database lock poisoned: {}", e)))
}
