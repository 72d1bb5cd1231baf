//! Checkpoint Store
//!
//! SQLite persistence of per-agent cognition snapshots. Each system's state
//! is stored as its own JSON document so a checkpoint can be inspected or
//! repaired with plain `sqlite3`.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::cycle::CognitionSnapshot;
use crate::error::{CognitionError, Result};

/// Agent checkpoints with SQLite persistence
pub struct CheckpointStore {
    conn: Mutex<Connection>,
}

impl CheckpointStore {
    /// Open a store at a database path, creating parent directories
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        debug!("Checkpoint store opened at {}", path.display());
        Ok(store)
    }

    /// Open a throwaway in-memory store
    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| CognitionError::Lock(e.to_string()))
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                agent_id TEXT PRIMARY KEY,
                learning TEXT NOT NULL,
                goals TEXT NOT NULL,
                planning TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Save (or replace) an agent's checkpoint
    pub fn save(&self, agent_id: &str, snapshot: &CognitionSnapshot) -> Result<()> {
        let learning = serde_json::to_string(&snapshot.learning)?;
        let goals = serde_json::to_string(&snapshot.goals)?;
        let planning = serde_json::to_string(&snapshot.planning)?;

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO checkpoints (agent_id, learning, goals, planning, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![agent_id, learning, goals, planning, chrono::Utc::now().timestamp()],
        )?;
        debug!("Checkpointed agent {}", agent_id);
        Ok(())
    }

    /// Load an agent's checkpoint, `None` if it has never been saved
    pub fn load(&self, agent_id: &str) -> Result<Option<CognitionSnapshot>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT learning, goals, planning FROM checkpoints WHERE agent_id = ?1",
                params![agent_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
            )
            .optional()?;

        let Some((learning, goals, planning)) = row else {
            return Ok(None);
        };

        Ok(Some(CognitionSnapshot {
            learning: serde_json::from_str(&learning)?,
            goals: serde_json::from_str(&goals)?,
            planning: serde_json::from_str(&planning)?,
        }))
    }

    /// Delete an agent's checkpoint; true if one existed
    pub fn delete(&self, agent_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM checkpoints WHERE agent_id = ?1", params![agent_id])?;
        if deleted > 0 {
            info!("Deleted checkpoint for agent {}", agent_id);
        }
        Ok(deleted > 0)
    }

    /// Agents with a checkpoint, most recently saved first
    pub fn list_agents(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT agent_id FROM checkpoints ORDER BY updated_at DESC, agent_id")?;
        let agents = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(agents)
    }
}
