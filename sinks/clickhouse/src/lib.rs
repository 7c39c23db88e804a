use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use freshet_api::{SinkAdapter, SinkError};

/// Escape a string value for safe use inside a ClickHouse single-quoted
/// literal. Prevents SQL injection by escaping `\` and `'`.
fn escape_ch_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// ClickHouse sink adapter (HTTP interface).
///
/// Uses ReplacingMergeTree for upsert semantics: an INSERT with the same
/// key replaces the old row, reads use FINAL to collapse versions.
/// Bootstrap issues `CREATE TABLE IF NOT EXISTS` — non-destructive, safe
/// on every startup.
///
/// The HTTP client carries a per-request timeout; an expired call surfaces
/// as a timeout-kind `SinkError` and is not retried here.
pub struct ClickHouseSink {
    http: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
    database: String,
    table: String,
}

impl ClickHouseSink {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: &str,
        port: u16,
        user: &str,
        password: &str,
        database: &str,
        table: &str,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::config(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: format!("http://{host}:{port}"),
            user: user.to_string(),
            password: password.to_string(),
            database: database.to_string(),
            table: table.to_string(),
        })
    }

    async fn exec(&self, sql: &str) -> Result<String, SinkError> {
        let resp = self
            .http
            .post(&self.base_url)
            .query(&[
                ("user", self.user.as_str()),
                ("password", self.password.as_str()),
                ("database", self.database.as_str()),
            ])
            .body(sql.to_owned())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SinkError::timeout(format!("CH request: {e}"))
                } else {
                    SinkError::io(format!("CH request: {e}"))
                }
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| SinkError::io(format!("CH read: {e}")))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(SinkError::io(body))
        }
    }
}

impl SinkAdapter for ClickHouseSink {
    fn bootstrap(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        Box::pin(async move {
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} ( \
                 key String, \
                 value Int64 \
                 ) ENGINE = ReplacingMergeTree ORDER BY key",
                self.table
            );
            self.exec(&sql).await?;
            Ok(())
        })
    }

    fn write(
        &self,
        key: &str,
        value: i64,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        let key = escape_ch_string(key);
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO {} (key, value) VALUES ('{}', {})",
                self.table, key, value
            );
            self.exec(&sql).await?;
            Ok(())
        })
    }

    fn read(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<i64>, SinkError>> + Send + '_>> {
        let key = escape_ch_string(key);
        Box::pin(async move {
            let sql = format!(
                "SELECT value FROM {} FINAL WHERE key = '{}' LIMIT 1",
                self.table, key
            );
            let body = self.exec(&sql).await?;
            let line = body.lines().next().unwrap_or("").trim();
            if line.is_empty() {
                return Ok(None);
            }
            line.parse::<i64>()
                .map(Some)
                .map_err(|e| SinkError::io(format!("parse CH value: {e}")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_quotes_and_backslashes() {
        assert_eq!(escape_ch_string("plain"), "plain");
        assert_eq!(escape_ch_string("it's"), "it\\'s");
        assert_eq!(escape_ch_string("a\\b"), "a\\\\b");
    }
}
