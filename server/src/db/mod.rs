pub mod migrations;
pub mod models;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Type alias for the shared database connection.
/// rusqlite is synchronous; we wrap in Arc<Mutex> for thread safety
/// with tokio::task::spawn_blocking for DB operations.
pub type DbPool = Arc<Mutex<Connection>>;

/// Initialize the SQLite database: create data directory if needed,
/// open (or create) the database file, enable WAL mode, and run migrations.
pub fn init_db(data_dir: &str) -> Result<DbPool, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(data_dir)?;

    let db_path = Path::new(data_dir).join("parley.db");
    let mut conn = Connection::open(&db_path)?;

    // WAL for concurrent readers alongside the single writer
    conn.pragma_update(None, "journal_mode", "WAL")?;
    prepare(&mut conn)?;

    tracing::info!("Database initialized at {}", db_path.display());

    Ok(Arc::new(Mutex::new(conn)))
}

/// Open a private in-memory database with the full schema applied.
pub fn init_memory_db() -> Result<DbPool, Box<dyn std::error::Error>> {
    let mut conn = Connection::open_in_memory()?;
    prepare(&mut conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn prepare(conn: &mut Connection) -> Result<(), Box<dyn std::error::Error>> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    migrations::migrations().to_latest(conn)?;
    Ok(())
}
