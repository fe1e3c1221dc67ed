use anyhow::{Context, Result};
use serde_json::value::RawValue;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// A stored telemetry document: the exact JSON object text that was posted.
pub type Document = Box<RawValue>;

#[derive(Clone)]
pub struct Db {
    pool: Pool<Sqlite>,
}

impl Db {
    /// db_url examples:
    /// - "sqlite:/home/pi/telemetry/telemetry.db?mode=rwc"
    /// - "sqlite::memory:" (tests)
    ///
    /// The first connection must be established within `timeout`.
    pub async fn connect(db_url: &str, timeout: Duration) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("invalid sqlite connection string: {db_url}"))?
            .journal_mode(SqliteJournalMode::Wal);

        // Each in-memory connection is a separate database, so keep exactly
        // one alive for the life of the pool.
        let max_connections = if db_url.contains(":memory:") { 1 } else { 5 };

        let connect = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options);

        let pool = tokio::time::timeout(timeout, connect)
            .await
            .with_context(|| format!("timed out after {timeout:?} connecting to {db_url}"))?
            .with_context(|| format!("failed to connect to sqlite db: {db_url}"))?;

        Ok(Self { pool })
    }

    /// Connect and bring the schema up to date.
    pub async fn open(db_url: &str, timeout: Duration) -> Result<Self> {
        let db = Self::connect(db_url, timeout).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Runs SQLx migrations from ./migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        Ok(())
    }

    // ----------------------------
    // Documents
    // ----------------------------

    /// Persist `doc` verbatim and return its store-assigned id.
    pub async fn save(&self, doc: &RawValue) -> Result<i64> {
        let received_at = OffsetDateTime::now_utc().unix_timestamp();

        let result = sqlx::query("INSERT INTO documents (body, received_at) VALUES (?, ?)")
            .bind(doc.get())
            .bind(received_at)
            .execute(&self.pool)
            .await
            .context("save failed")?;

        Ok(result.last_insert_rowid())
    }

    /// Every stored document, without its id.
    pub async fn list(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT id, body FROM documents ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("list failed")?;

        rows.iter()
            .map(|row| {
                let id: i64 = row.try_get("id")?;
                let body: String = row.try_get("body")?;
                RawValue::from_string(body)
                    .with_context(|| format!("document {id} is not valid JSON"))
            })
            .collect()
    }

    /// Shut the pool down; later queries fail.
    #[cfg(test)]
    pub(crate) async fn close(&self) {
        self.pool.close().await;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
