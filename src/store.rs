//! SQLite-backed registry of tool servers and their activity logs.
//!
//! Every mutating operation runs in a single transaction: the row change, the
//! log line describing it, and the log retention trim commit together, so a
//! reader never sees a check result without its log entry or more than
//! [`MAX_LOGS_PER_SERVER`] entries for one server.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::error::{Error, Result};
use crate::migrate;
use crate::models::{CheckStatus, LastCheck, LogEntry, LogLevel, ServerRecord, TransportType};

/// Log lines kept per server; older lines are deleted on insert.
pub const MAX_LOGS_PER_SERVER: i64 = 200;

/// Persistence for [`ServerRecord`]s and their bounded [`LogEntry`] history.
#[derive(Clone)]
pub struct RegistryStore {
    pool: SqlitePool,
}

impl RegistryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects to the configured database and ensures the schema exists.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// All registered servers, newest first.
    pub async fn list(&self) -> Result<Vec<ServerRecord>> {
        let rows = sqlx::query("SELECT * FROM servers ORDER BY created_at DESC, rowid DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_server).collect()
    }

    pub async fn get(&self, id: &str) -> Result<ServerRecord> {
        let row = sqlx::query("SELECT * FROM servers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(Error::server_not_found)?;
        row_to_server(&row)
    }

    /// Registers a server and writes its "registered" log line.
    ///
    /// `transport` must be one of `stdio`, `http`, `sse`.
    pub async fn create(&self, name: &str, endpoint: &str, transport: &str) -> Result<ServerRecord> {
        let transport: TransportType = transport.parse()?;
        transport.check_endpoint(endpoint)?;
        let record = ServerRecord {
            id: new_id(),
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            transport,
            created_at: now_iso(),
            last_check_at: None,
            last_check_status: None,
            last_check_latency_ms: None,
            last_check_detail: None,
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO servers (id, name, endpoint, type, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.endpoint)
        .bind(record.transport.as_str())
        .bind(&record.created_at)
        .execute(&mut *tx)
        .await?;

        append_log(
            &mut *tx,
            &record.id,
            LogLevel::Info,
            &format!("Server {} registered.", record.name),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(server_id = %record.id, name = %record.name, transport = %record.transport, "server registered");
        Ok(record)
    }

    /// Removes a server; its logs go with it through the foreign key cascade.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM servers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::server_not_found());
        }
        tracing::info!(server_id = %id, "server deleted");
        Ok(())
    }

    /// Log history for `id`, newest first. Unknown ids yield an empty list.
    pub async fn logs(&self, id: &str) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query(
            "SELECT id, server_id, timestamp, level, message FROM logs \
             WHERE server_id = ? ORDER BY timestamp DESC, rowid DESC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_log).collect()
    }

    /// Stores the outcome of a connectivity check and logs it.
    pub async fn record_check_result(
        &self,
        id: &str,
        status: CheckStatus,
        latency_ms: u64,
        detail: &str,
    ) -> Result<LastCheck> {
        let snapshot = LastCheck {
            at: now_iso(),
            status,
            latency_ms,
            detail: detail.to_string(),
        };

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE servers
            SET last_check_at = ?, last_check_status = ?, last_check_latency_ms = ?, last_check_detail = ?
            WHERE id = ?
            "#,
        )
        .bind(&snapshot.at)
        .bind(status.as_str())
        .bind(i64::try_from(latency_ms).unwrap_or(i64::MAX))
        .bind(detail)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(Error::server_not_found());
        }

        append_log(
            &mut *tx,
            id,
            status.log_level(),
            &format!(
                "Connectivity check: {} ({}ms) - {}",
                status, latency_ms, detail
            ),
        )
        .await?;
        tx.commit().await?;

        Ok(snapshot)
    }
}

/// Inserts one log line and trims the server's history to the newest
/// [`MAX_LOGS_PER_SERVER`] entries. Runs on the caller's transaction.
async fn append_log(
    conn: &mut SqliteConnection,
    server_id: &str,
    level: LogLevel,
    message: &str,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO logs (id, server_id, timestamp, level, message) VALUES (?, ?, ?, ?, ?)")
        .bind(new_id())
        .bind(server_id)
        .bind(now_iso())
        .bind(level.as_str())
        .bind(message)
        .execute(&mut *conn)
        .await?;

    // Equal timestamps (second granularity) fall back to insertion order.
    sqlx::query(
        r#"
        DELETE FROM logs
        WHERE id IN (
            SELECT id FROM logs
            WHERE server_id = ?
            ORDER BY timestamp DESC, rowid DESC
            LIMIT -1 OFFSET ?
        )
        "#,
    )
    .bind(server_id)
    .bind(MAX_LOGS_PER_SERVER)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// 8 random bytes, hex-encoded.
fn new_id() -> String {
    hex::encode(rand::random::<[u8; 8]>())
}

fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn row_to_server(row: &SqliteRow) -> Result<ServerRecord> {
    let transport: String = row.try_get("type")?;
    let status: Option<String> = row.try_get("last_check_status")?;
    let latency: Option<i64> = row.try_get("last_check_latency_ms")?;

    Ok(ServerRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        endpoint: row.try_get("endpoint")?,
        transport: transport.parse()?,
        created_at: row.try_get("created_at")?,
        last_check_at: row.try_get("last_check_at")?,
        last_check_status: status.map(|s| s.parse()).transpose()?,
        last_check_latency_ms: latency.and_then(|v| u64::try_from(v).ok()),
        last_check_detail: row.try_get("last_check_detail")?,
    })
}

fn row_to_log(row: &SqliteRow) -> Result<LogEntry> {
    let level: String = row.try_get("level")?;
    Ok(LogEntry {
        id: row.try_get("id")?,
        server_id: row.try_get("server_id")?,
        timestamp: row.try_get("timestamp")?,
        level: level.parse()?,
        message: row.try_get("message")?,
    })
}
