use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use zenflow_core::error::{Result, ZenflowError};
use zenflow_core::graph::{Edge, Flow, FlowStatus, Node};
use zenflow_core::traits::{ExecutionLog, FlowStore};
use zenflow_core::types::ExecutionRecord;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS flows (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        nodes_json TEXT NOT NULL,
        edges_json TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'inactive',
        created_at TEXT NOT NULL,
        last_run TEXT
    );

    CREATE TABLE IF NOT EXISTS executions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id TEXT NOT NULL UNIQUE,
        flow_id TEXT NOT NULL,
        started_at TEXT NOT NULL,
        success INTEGER NOT NULL,
        record_json TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_executions_flow
        ON executions(flow_id, id);";

fn db_err(e: impl std::fmt::Display) -> ZenflowError {
    ZenflowError::Database(e.to_string())
}

/// SQLite-backed flow store and execution log.
///
/// Flow graphs and execution records are stored as JSON text columns. One
/// connection serves both traits; wrap in an `Arc` and hand it out as
/// `Arc<dyn FlowStore>` and `Arc<dyn ExecutionLog>`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ZenflowError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "SQLite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn flow_from_row(row: FlowRow) -> Result<Flow> {
        let nodes: Vec<Node> = serde_json::from_str(&row.nodes_json)?;
        let edges: Vec<Edge> = serde_json::from_str(&row.edges_json)?;
        let mut flow = Flow::new(row.id, row.name, row.description, nodes, edges)?;
        flow.status = row.status.parse()?;
        flow.created_at = parse_ts(&row.created_at)?;
        flow.last_run = row.last_run.as_deref().map(parse_ts).transpose()?;
        Ok(flow)
    }
}

struct FlowRow {
    id: String,
    name: String,
    description: String,
    nodes_json: String,
    edges_json: String,
    status: String,
    created_at: String,
    last_run: Option<String>,
}

const FLOW_COLUMNS: &str =
    "id, name, description, nodes_json, edges_json, status, created_at, last_run";

fn read_flow_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FlowRow> {
    Ok(FlowRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        nodes_json: row.get(3)?,
        edges_json: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
        last_run: row.get(7)?,
    })
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ZenflowError::Database(format!("invalid timestamp '{}': {}", s, e)))
}

impl FlowStore for SqliteStore {
    fn insert(&self, flow: Flow) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let nodes_json = serde_json::to_string(flow.nodes())?;
            let edges_json = serde_json::to_string(flow.edges())?;
            let conn = self.conn.lock().map_err(db_err)?;
            conn.execute(
                "INSERT INTO flows (id, name, description, nodes_json, edges_json, status, created_at, last_run)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    flow.id,
                    flow.name,
                    flow.description,
                    nodes_json,
                    edges_json,
                    flow.status.as_str(),
                    flow.created_at.to_rfc3339(),
                    flow.last_run.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn get(&self, id: &str) -> BoxFuture<'_, Result<Option<Flow>>> {
        let id = id.to_string();
        Box::pin(async move {
            let row = {
                let conn = self.conn.lock().map_err(db_err)?;
                conn.query_row(
                    &format!("SELECT {} FROM flows WHERE id = ?1", FLOW_COLUMNS),
                    params![id],
                    read_flow_row,
                )
                .optional()
                .map_err(db_err)?
            };
            row.map(Self::flow_from_row).transpose()
        })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<Flow>>> {
        Box::pin(async move {
            let rows = {
                let conn = self.conn.lock().map_err(db_err)?;
                let mut stmt = conn
                    .prepare(&format!("SELECT {} FROM flows ORDER BY rowid", FLOW_COLUMNS))
                    .map_err(db_err)?;
                let rows = stmt
                    .query_map([], read_flow_row)
                    .map_err(db_err)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(db_err)?;
                rows
            };
            rows.into_iter().map(Self::flow_from_row).collect()
        })
    }

    fn update(&self, flow: &Flow) -> BoxFuture<'_, Result<bool>> {
        let flow = flow.clone();
        Box::pin(async move {
            let nodes_json = serde_json::to_string(flow.nodes())?;
            let edges_json = serde_json::to_string(flow.edges())?;
            let conn = self.conn.lock().map_err(db_err)?;
            let changed = conn
                .execute(
                    "UPDATE flows SET name = ?2, description = ?3, nodes_json = ?4, edges_json = ?5
                     WHERE id = ?1",
                    params![flow.id, flow.name, flow.description, nodes_json, edges_json],
                )
                .map_err(db_err)?;
            Ok(changed > 0)
        })
    }

    fn set_status(
        &self,
        id: &str,
        status: FlowStatus,
        last_run: Option<DateTime<Utc>>,
    ) -> BoxFuture<'_, Result<()>> {
        let id = id.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            conn.execute(
                "UPDATE flows SET status = ?2, last_run = ?3 WHERE id = ?1",
                params![id, status.as_str(), last_run.map(|t| t.to_rfc3339())],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, Result<bool>> {
        let id = id.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let changed = conn
                .execute("DELETE FROM flows WHERE id = ?1", params![id])
                .map_err(db_err)?;
            Ok(changed > 0)
        })
    }
}

impl ExecutionLog for SqliteStore {
    fn append(&self, record: ExecutionRecord) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let record_json = serde_json::to_string(&record)?;
            let conn = self.conn.lock().map_err(db_err)?;
            conn.execute(
                "INSERT INTO executions (run_id, flow_id, started_at, success, record_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.run_id.0,
                    record.flow_id,
                    record.started_at.to_rfc3339(),
                    record.success,
                    record_json,
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn list(&self, flow_id: Option<&str>) -> BoxFuture<'_, Result<Vec<ExecutionRecord>>> {
        let flow_id = flow_id.map(str::to_string);
        Box::pin(async move {
            let rows: Vec<String> = {
                let conn = self.conn.lock().map_err(db_err)?;
                let mut stmt = conn
                    .prepare(
                        "SELECT record_json FROM executions
                         WHERE ?1 IS NULL OR flow_id = ?1
                         ORDER BY id",
                    )
                    .map_err(db_err)?;
                let rows = stmt
                    .query_map(params![flow_id], |row| row.get(0))
                    .map_err(db_err)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(db_err)?;
                rows
            };
            rows.iter()
                .map(|json| serde_json::from_str(json).map_err(ZenflowError::from))
                .collect()
        })
    }
}
