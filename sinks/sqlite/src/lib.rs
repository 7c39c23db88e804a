use std::future::Future;
use std::pin::Pin;

use rusqlite::{Connection, OptionalExtension};
use tokio::sync::Mutex;

use freshet_api::{SinkAdapter, SinkError};

/// SQLite sink adapter.
///
/// One connection behind an async mutex; statements are short in-process
/// file operations, issued inline by the worker that owns the record, so
/// they stall nothing else.
///
/// Bootstrap is DESTRUCTIVE: it drops and recreates the table, matching
/// the reference connector's startup behavior. Call it once at startup,
/// never between writes.
pub struct SqliteSink {
    conn: Mutex<Connection>,
    table: String,
}

impl SqliteSink {
    /// Open (or create) the database at `path`. `":memory:"` gives a
    /// private in-memory database, handy in tests.
    pub fn open(path: &str) -> Result<Self, SinkError> {
        let conn = Connection::open(path).map_err(sql_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
            table: "aggregates".to_string(),
        })
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }
}

fn sql_err(e: rusqlite::Error) -> SinkError {
    SinkError::io(e.to_string())
}

impl SinkAdapter for SqliteSink {
    fn bootstrap(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        Box::pin(async move {
            let conn = self.conn.lock().await;
            conn.execute_batch(&format!(
                "DROP TABLE IF EXISTS {table}; \
                 CREATE TABLE {table} ( \
                 key TEXT NOT NULL PRIMARY KEY, \
                 value INTEGER NOT NULL \
                 ) STRICT",
                table = self.table
            ))
            .map_err(sql_err)?;
            Ok(())
        })
    }

    fn write(
        &self,
        key: &str,
        value: i64,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().await;
            conn.execute(
                &format!(
                    "INSERT INTO {} (key, value) VALUES (?1, ?2) \
                     ON CONFLICT (key) DO UPDATE SET value = excluded.value",
                    self.table
                ),
                rusqlite::params![key, value],
            )
            .map_err(sql_err)?;
            Ok(())
        })
    }

    fn read(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<i64>, SinkError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().await;
            conn.query_row(
                &format!("SELECT value FROM {} WHERE key = ?1", self.table),
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_err)
        })
    }
}
