// ============================================================================
// SessionStore: Local user session cache (redb)
// ============================================================================
// Holds the logged-in user's profile between runs. The flow reads the user id
// from it when creating assignments; logout clears it.
// Default path: ~/.wowfy/session.redb (override via WOWFY_DB_PATH env var)
// ============================================================================

use redb::{Database, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::{UserSession, WowfyError, WowfyResult};

const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

const CURRENT: &str = "session:current";

fn storage<E: Display>(what: &'static str) -> impl FnOnce(E) -> WowfyError {
    move |e| WowfyError::Storage(format!("{}: {}", what, e))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub path: String,
    pub entries: u64,
    pub user_id: Option<String>,
    pub cached_at: Option<i64>,
}

pub struct SessionStore {
    db: Database,
    path: PathBuf,
}

impl SessionStore {
    /// Open (or create) the store at the given path.
    /// If `path` is None, uses WOWFY_DB_PATH or ~/.wowfy/session.redb
    pub fn open(path: Option<&str>) -> WowfyResult<Self> {
        let db_path = if let Some(p) = path {
            PathBuf::from(p)
        } else if let Ok(env_path) = std::env::var("WOWFY_DB_PATH") {
            PathBuf::from(env_path)
        } else {
            let home = dirs::home_dir()
                .ok_or_else(|| WowfyError::Storage("Cannot determine home directory".into()))?;
            let wowfy_dir = home.join(".wowfy");
            std::fs::create_dir_all(&wowfy_dir)
                .map_err(storage("Failed to create .wowfy directory"))?;
            wowfy_dir.join("session.redb")
        };

        info!("Opening session store at: {}", db_path.display());

        let db = Database::create(&db_path).map_err(storage("Failed to open database"))?;

        let write_txn = db.begin_write().map_err(storage("Failed to begin write"))?;
        {
            let _ = write_txn
                .open_table(SESSIONS)
                .map_err(storage("Failed to create sessions table"))?;
        }
        write_txn.commit().map_err(storage("Failed to commit init"))?;

        Ok(Self { db, path: db_path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cache the session, stamping `cached_at`
    pub fn save(&self, session: &UserSession) -> WowfyResult<UserSession> {
        let mut session = session.clone();
        session.cached_at = Some(chrono::Utc::now().timestamp());

        let value = serde_json::to_vec(&session).map_err(storage("Failed to serialize session"))?;

        let write_txn = self.db.begin_write().map_err(storage("Failed to begin write"))?;
        {
            let mut table = write_txn
                .open_table(SESSIONS)
                .map_err(storage("Failed to open sessions table"))?;
            table
                .insert(CURRENT, value.as_slice())
                .map_err(storage("Failed to insert session"))?;
        }
        write_txn.commit().map_err(storage("Failed to commit"))?;

        debug!("Cached session for user {}", session.id);
        Ok(session)
    }

    pub fn load(&self) -> WowfyResult<Option<UserSession>> {
        let read_txn = self.db.begin_read().map_err(storage("Failed to begin read"))?;
        let table = read_txn
            .open_table(SESSIONS)
            .map_err(storage("Failed to open sessions table"))?;

        match table.get(CURRENT).map_err(storage("Failed to get session"))? {
            Some(value) => {
                let session: UserSession = serde_json::from_slice(value.value())
                    .map_err(storage("Failed to deserialize session"))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Logout. Returns whether a session was cached.
    pub fn clear(&self) -> WowfyResult<bool> {
        let write_txn = self.db.begin_write().map_err(storage("Failed to begin write"))?;
        let removed;
        {
            let mut table = write_txn
                .open_table(SESSIONS)
                .map_err(storage("Failed to open sessions table"))?;
            removed = table
                .remove(CURRENT)
                .map_err(storage("Failed to remove session"))?
                .is_some();
        }
        write_txn.commit().map_err(storage("Failed to commit delete"))?;

        if removed {
            info!("Session cleared");
        }
        Ok(removed)
    }

    pub fn stats(&self) -> WowfyResult<SessionStats> {
        let entries = {
            let read_txn = self.db.begin_read().map_err(storage("Failed to begin read"))?;
            let table = read_txn
                .open_table(SESSIONS)
                .map_err(storage("Failed to open sessions table"))?;
            table.len().map_err(storage("Failed to count sessions"))?
        };
        let session = self.load()?;

        Ok(SessionStats {
            path: self.path.display().to_string(),
            entries,
            user_id: session.as_ref().map(|s| s.id.clone()),
            cached_at: session.and_then(|s| s.cached_at),
        })
    }
}
