//! Database module for owner preferences, long-term memory, and session state
//!
//! All four logical stores live in one SQLite key/value table. Reads never
//! fail upward: missing or corrupt records become defaults.

mod kv;
pub mod memory;
pub mod prefs;
mod schema;
pub mod session;

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::{Error, Result};

pub use kv::{KvStore, RECORD_VERSION};
pub use memory::{MemoryItem, MemoryRepo};
pub use prefs::{OwnerPreferences, PrefsRepo};
pub use schema::SCHEMA_VERSION;
pub use session::{GroundingReference, Message, Sender, SessionRepo};

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Initialize the database
///
/// # Errors
///
/// Returns error if database cannot be opened or initialized
pub fn init<P: AsRef<Path>>(path: P) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(path);
    let pool = Pool::builder()
        .max_size(4)
        .build(manager)
        .map_err(|e| Error::Database(e.to_string()))?;

    // Run migrations on first connection
    let conn = pool.get().map_err(|e| Error::Database(e.to_string()))?;
    schema::init(&conn)?;

    tracing::info!(version = SCHEMA_VERSION, "database initialized");
    Ok(pool)
}

/// Initialize an in-memory database (for testing)
///
/// # Errors
///
/// Returns error if database cannot be initialized
pub fn init_memory() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .map_err(|e| Error::Database(e.to_string()))?;

    let conn = pool.get().map_err(|e| Error::Database(e.to_string()))?;
    schema::init(&conn)?;

    Ok(pool)
}

/// The three persistent stores, sharing one pool
#[derive(Clone)]
pub struct Stores {
    /// Owner preferences
    pub prefs: PrefsRepo,
    /// Long-term memory
    pub memory: MemoryRepo,
    /// Ephemeral session transcript and mode
    pub session: SessionRepo,
}

impl Stores {
    /// Build all stores over a pool
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        let kv = KvStore::new(pool);
        Self {
            prefs: PrefsRepo::new(kv.clone()),
            memory: MemoryRepo::new(kv.clone()),
            session: SessionRepo::new(kv),
        }
    }

    /// Open stores backed by an in-memory database
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be initialized
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(init_memory()?))
    }
}
