pub mod types;

use async_trait::async_trait;
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::core::error::PersistenceError;
use crate::core::lifecycle::LifecycleComponent;
use types::{BattleRun, ChatSession};

/// Append-only store for chat and battle transcripts.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    async fn append_chat(&self, session: &ChatSession) -> Result<(), PersistenceError>;
    async fn append_battle(&self, run: &BattleRun) -> Result<(), PersistenceError>;
    async fn recent_chats(&self, limit: usize) -> Result<Vec<ChatSession>, PersistenceError>;
    async fn recent_battles(&self, limit: usize) -> Result<Vec<BattleRun>, PersistenceError>;
    async fn is_connected(&self) -> bool;
}

pub type SharedSink = Arc<dyn TranscriptSink>;

/// Writes a chat transcript, logging instead of propagating failures.
pub async fn persist_chat(sink: &dyn TranscriptSink, session: &ChatSession) {
    match sink.append_chat(session).await {
        Ok(()) => info!(
            "Stored chat transcript {} ({} messages)",
            session.session_id,
            session.messages.len()
        ),
        Err(e) => warn!(
            "Failed to store chat transcript {}: {}",
            session.session_id, e
        ),
    }
}

/// Writes a battle record, logging instead of propagating failures.
pub async fn persist_battle(sink: &dyn TranscriptSink, run: &BattleRun) {
    match sink.append_battle(run).await {
        Ok(()) => info!(
            "Stored battle {} ({} responses)",
            run.session_id,
            run.responses.len()
        ),
        Err(e) => warn!("Failed to store battle {}: {}", run.session_id, e),
    }
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS chat_sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record_id TEXT NOT NULL UNIQUE,
        session_id TEXT NOT NULL,
        document TEXT NOT NULL,
        created_at DATETIME NOT NULL
    );
    CREATE TABLE IF NOT EXISTS battle_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record_id TEXT NOT NULL UNIQUE,
        session_id TEXT NOT NULL,
        document TEXT NOT NULL,
        created_at DATETIME NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_chat_sessions_session ON chat_sessions(session_id);
    CREATE INDEX IF NOT EXISTS idx_battle_runs_session ON battle_runs(session_id);
";

/// SQLite-backed transcript store. Opened once at startup and shared by
/// every request through the application state.
#[derive(Clone)]
pub struct TranscriptStore {
    db: Arc<Mutex<Option<Connection>>>,
}

impl TranscriptStore {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            warn!("Could not create data dir {}: {}", parent.display(), e);
        }
        let db = Connection::open(path)?;
        Self::init(db)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self, PersistenceError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// A store with no connection. Every write fails with `Closed` and
    /// health reports the database as disconnected.
    pub fn detached() -> Self {
        Self {
            db: Arc::new(Mutex::new(None)),
        }
    }

    fn init(db: Connection) -> Result<Self, PersistenceError> {
        db.execute_batch(SCHEMA)?;
        Ok(Self {
            db: Arc::new(Mutex::new(Some(db))),
        })
    }

    pub async fn close(&self) {
        if let Some(conn) = self.db.lock().await.take()
            && let Err((_, e)) = conn.close()
        {
            warn!("Transcript store did not close cleanly: {}", e);
        }
    }

    async fn insert(
        &self,
        table: &str,
        record_id: &str,
        session_id: &str,
        document: String,
        created_at: String,
    ) -> Result<(), PersistenceError> {
        let guard = self.db.lock().await;
        let db = guard.as_ref().ok_or(PersistenceError::Closed)?;
        let sql = format!(
            "INSERT OR IGNORE INTO {table} (record_id, session_id, document, created_at)
             VALUES (?1, ?2, ?3, ?4)"
        );
        db.execute(&sql, params![record_id, session_id, document, created_at])?;
        Ok(())
    }

    async fn latest_documents(
        &self,
        table: &str,
        limit: usize,
    ) -> Result<Vec<String>, PersistenceError> {
        let guard = self.db.lock().await;
        let db = guard.as_ref().ok_or(PersistenceError::Closed)?;
        let mut stmt = db.prepare(&format!(
            "SELECT document FROM {table} ORDER BY id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

#[async_trait]
impl TranscriptSink for TranscriptStore {
    async fn append_chat(&self, session: &ChatSession) -> Result<(), PersistenceError> {
        let document = serde_json::to_string(session)?;
        self.insert(
            "chat_sessions",
            &session.record_id.to_string(),
            &session.session_id,
            document,
            session.created_at.to_rfc3339(),
        )
        .await
    }

    async fn append_battle(&self, run: &BattleRun) -> Result<(), PersistenceError> {
        let document = serde_json::to_string(run)?;
        self.insert(
            "battle_runs",
            &run.record_id.to_string(),
            &run.session_id,
            document,
            run.created_at.to_rfc3339(),
        )
        .await
    }

    async fn recent_chats(&self, limit: usize) -> Result<Vec<ChatSession>, PersistenceError> {
        let docs = self.latest_documents("chat_sessions", limit).await?;
        docs.iter()
            .map(|d| serde_json::from_str(d).map_err(PersistenceError::from))
            .collect()
    }

    async fn recent_battles(&self, limit: usize) -> Result<Vec<BattleRun>, PersistenceError> {
        let docs = self.latest_documents("battle_runs", limit).await?;
        docs.iter()
            .map(|d| serde_json::from_str(d).map_err(PersistenceError::from))
            .collect()
    }

    async fn is_connected(&self) -> bool {
        let guard = self.db.lock().await;
        match guard.as_ref() {
            Some(db) => db
                .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl LifecycleComponent for TranscriptStore {
    async fn on_init(&mut self) -> anyhow::Result<()> {
        info!("Transcript store ready");
        Ok(())
    }

    async fn on_shutdown(&mut self) -> anyhow::Result<()> {
        self.close().await;
        info!("Transcript store closed");
        Ok(())
    }
}
