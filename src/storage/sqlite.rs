use crate::models::{TurnRecord, TurnStatus};
use rusqlite::{Connection, Result as SqliteResult};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// SQLite storage for the per-session turn log.
/// Uses tokio::Mutex for async-friendly locking
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open (or create) the turn log at `db_path`.
    /// Accepts plain paths and `sqlite:` / `sqlite://` URLs.
    pub async fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let path_str = db_path.as_ref().to_string_lossy();
        let clean_path: &str = match path_str.strip_prefix("sqlite:") {
            Some(rest) => rest.trim_start_matches("//"),
            None => path_str.as_ref(),
        };

        let conn = Connection::open(clean_path)?;
        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// In-memory log, used when no file should be written
    pub async fn in_memory() -> SqliteResult<Self> {
        let storage = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        };
        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> SqliteResult<()> {
        let conn = self.conn.lock().await;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                turn_index INTEGER NOT NULL,
                question TEXT NOT NULL,
                route TEXT,
                plan TEXT,
                generated_sql TEXT,
                answer TEXT,
                row_count INTEGER NOT NULL DEFAULT 0,
                execution_time_ms INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                error_message TEXT,
                executed_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_turns_session_id ON turns(session_id, turn_index)",
            [],
        )?;

        Ok(())
    }

    /// Record one turn, successful or not
    pub async fn add_turn(&self, record: &TurnRecord) -> SqliteResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO turns
            (id, session_id, turn_index, question, route, plan, generated_sql, answer,
             row_count, execution_time_ms, status, error_message, executed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            rusqlite::params![
                record.id,
                record.session_id,
                record.turn_index as i64,
                record.question,
                record.route,
                record.plan,
                record.generated_sql,
                record.answer,
                record.row_count as i64,
                record.execution_time_ms as i64,
                status_str(&record.status),
                record.error_message,
                record.executed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Turns of a session, newest first
    pub async fn list_turns(&self, session_id: &str, limit: usize) -> SqliteResult<Vec<TurnRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, session_id, turn_index, question, route, plan, generated_sql, answer,
                   row_count, execution_time_ms, status, error_message, executed_at
            FROM turns
            WHERE session_id = ?1
            ORDER BY turn_index DESC
            LIMIT ?2
            "#,
        )?;

        let turns = stmt.query_map(rusqlite::params![session_id, limit as i64], |row| {
            let status = match row.get::<_, String>(10)?.as_str() {
                "success" => TurnStatus::Success,
                _ => TurnStatus::Failed,
            };
            let executed_at: String = row.get(12)?;
            let executed_at = chrono::DateTime::parse_from_rfc3339(&executed_at)
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(12, rusqlite::types::Type::Text, Box::new(e))
                })?
                .with_timezone(&chrono::Utc);

            Ok(TurnRecord {
                id: row.get(0)?,
                session_id: row.get(1)?,
                turn_index: row.get::<_, i64>(2)? as u64,
                question: row.get(3)?,
                route: row.get(4)?,
                plan: row.get(5)?,
                generated_sql: row.get(6)?,
                answer: row.get(7)?,
                row_count: row.get::<_, i64>(8)? as usize,
                execution_time_ms: row.get::<_, i64>(9)? as u64,
                status,
                error_message: row.get(11)?,
                executed_at,
            })
        })?;

        turns.collect()
    }

    /// Drop every turn of a session; returns how many were removed
    pub async fn delete_turns(&self, session_id: &str) -> SqliteResult<usize> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM turns WHERE session_id = ?1", rusqlite::params![session_id])
    }
}

fn status_str(status: &TurnStatus) -> &'static str {
    match status {
        TurnStatus::Success => "success",
        TurnStatus::Failed => "failed",
    }
}
