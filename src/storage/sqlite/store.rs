//! `SQLite`-backed durable store.

use super::connection::{acquire_lock, configure_connection};
use super::metrics::{record_operation_metrics, status_label};
use super::rows::{IdentityRow, RecordRow};
use crate::models::{
    ContentRecord, Fingerprint, Identity, IdentityKey, NewContentRecord, RecordQuery, RecordStatus,
};
use crate::storage::traits::{ContentStore, IdentityStore};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::instrument;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS identities (
        key TEXT PRIMARY KEY,
        display_name TEXT NOT NULL,
        supervisor TEXT,
        active INTEGER NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        fingerprint TEXT NOT NULL,
        owner TEXT NOT NULL,
        locator TEXT NOT NULL,
        status INTEGER NOT NULL DEFAULT 4,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_records_fingerprint ON records(fingerprint);
    CREATE INDEX IF NOT EXISTS idx_records_created_at ON records(created_at);
    CREATE INDEX IF NOT EXISTS idx_records_owner ON records(owner);
    CREATE INDEX IF NOT EXISTS idx_identities_supervisor ON identities(supervisor);
";

/// Durable store for identities and content records.
///
/// # Concurrency Model
///
/// `rusqlite::Connection` is not `Sync`, so the connection sits behind a
/// `Mutex` shared through an `Arc`. Every call runs on the blocking pool via
/// `spawn_blocking`, which keeps request tasks off the executor threads while
/// `SQLite` works. The conditional insert runs in an `IMMEDIATE` transaction,
/// so uniqueness holds even with several processes on one database file.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `db_path` and prepares the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::operation("create_db_dir", e))?;
        }
        let conn = Connection::open(&db_path).map_err(|e| Error::operation("open_sqlite", e))?;
        Self::initialize(conn, Some(db_path))
    }

    /// Creates an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::operation("open_sqlite_in_memory", e))?;
        Self::initialize(conn, None)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub const fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    fn initialize(conn: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        configure_connection(&conn)?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::operation("create_schema", e))?;
        tracing::debug!(path = ?db_path, "sqlite store initialized");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn run<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let start = Instant::now();
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = acquire_lock(&conn);
            f(&mut guard)
        })
        .await
        .map_err(|e| Error::operation(operation, e))
        .and_then(|inner| inner);
        record_operation_metrics(operation, start, status_label(&result));
        result
    }
}

fn sql_error(operation: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| Error::operation(operation, e)
}

fn query_records(
    conn: &Connection,
    sql: &str,
    key: &str,
    query: &RecordQuery,
) -> Result<Vec<RecordRow>> {
    let mut stmt = conn.prepare(sql).map_err(sql_error("query_records"))?;
    let rows = stmt
        .query_map(
            params![
                key,
                query.min_status.code(),
                query.max_status.code(),
                query.from.timestamp_millis(),
                query.to.timestamp_millis()
            ],
            RecordRow::from_row,
        )
        .map_err(sql_error("query_records"))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(sql_error("query_records"))
}

#[async_trait]
impl ContentStore for SqliteStore {
    #[instrument(skip(self, record), fields(fingerprint = %record.fingerprint, owner = %record.owner))]
    async fn insert_if_fingerprint_absent(&self, record: &NewContentRecord) -> Result<bool> {
        let record = record.clone();
        self.run("insert_record", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(sql_error("insert_record"))?;
            let created_at = record.created_at.timestamp_millis();
            let inserted = tx
                .execute(
                    "INSERT INTO records (fingerprint, owner, locator, status, created_at)
                     SELECT ?1, ?2, ?3, ?4, ?5
                     WHERE NOT EXISTS (SELECT 1 FROM records WHERE fingerprint = ?1)",
                    params![
                        record.fingerprint.as_str(),
                        record.owner.as_str(),
                        record.locator,
                        record.status.code(),
                        created_at
                    ],
                )
                .map_err(sql_error("insert_record"))?;

            let existed = inserted == 0;
            if existed {
                tx.execute(
                    "INSERT INTO records (fingerprint, owner, locator, status, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        record.fingerprint.as_str(),
                        record.owner.as_str(),
                        record.locator,
                        RecordStatus::AutoDenied.code(),
                        created_at
                    ],
                )
                .map_err(sql_error("insert_record"))?;
            }
            tx.commit().map_err(sql_error("insert_record"))?;
            Ok(existed)
        })
        .await
    }

    async fn fingerprints_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Fingerprint>> {
        let raw = self
            .run("fingerprints_in_window", move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT DISTINCT fingerprint FROM records
                         WHERE created_at >= ?1 AND created_at <= ?2",
                    )
                    .map_err(sql_error("fingerprints_in_window"))?;
                let rows = stmt
                    .query_map(params![from.timestamp_millis(), to.timestamp_millis()], |row| {
                        row.get::<_, String>(0)
                    })
                    .map_err(sql_error("fingerprints_in_window"))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(sql_error("fingerprints_in_window"))
            })
            .await?;

        raw.into_iter()
            .map(|fp| Fingerprint::parse(fp).map_err(|e| Error::operation("decode_row", e)))
            .collect()
    }

    async fn records_by_owner(
        &self,
        owner: &IdentityKey,
        query: &RecordQuery,
    ) -> Result<Vec<ContentRecord>> {
        let owner = owner.as_str().to_string();
        let query = *query;
        let sql = format!(
            "SELECT {} FROM records
             WHERE owner = ?1 AND status >= ?2 AND status <= ?3
               AND created_at >= ?4 AND created_at <= ?5
             ORDER BY created_at, id",
            RecordRow::COLUMNS
        );
        let rows = self
            .run("records_by_owner", move |conn| {
                query_records(conn, &sql, &owner, &query)
            })
            .await?;
        rows.into_iter().map(RecordRow::into_record).collect()
    }

    async fn records_by_supervisor(
        &self,
        supervisor: &IdentityKey,
        query: &RecordQuery,
    ) -> Result<Vec<ContentRecord>> {
        let supervisor = supervisor.as_str().to_string();
        let query = *query;
        let sql = "SELECT r.id, r.fingerprint, r.owner, r.locator, r.status, r.created_at
             FROM records r
             JOIN identities i ON r.owner = i.key
             WHERE i.supervisor = ?1 AND r.status >= ?2 AND r.status <= ?3
               AND r.created_at >= ?4 AND r.created_at <= ?5
             ORDER BY r.created_at, r.id";
        let rows = self
            .run("records_by_supervisor", move |conn| {
                query_records(conn, sql, &supervisor, &query)
            })
            .await?;
        rows.into_iter().map(RecordRow::into_record).collect()
    }
}

#[async_trait]
impl IdentityStore for SqliteStore {
    async fn all_active_identities(&self) -> Result<Vec<Identity>> {
        let sql = format!(
            "SELECT {} FROM identities WHERE active = 1 ORDER BY created_at, key",
            IdentityRow::COLUMNS
        );
        let rows = self
            .run("all_active_identities", move |conn| {
                let mut stmt = conn.prepare(&sql).map_err(sql_error("all_active_identities"))?;
                let rows = stmt
                    .query_map([], IdentityRow::from_row)
                    .map_err(sql_error("all_active_identities"))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(sql_error("all_active_identities"))
            })
            .await?;
        rows.into_iter().map(IdentityRow::into_identity).collect()
    }

    async fn identity(&self, key: &IdentityKey) -> Result<Option<Identity>> {
        let sql = format!("SELECT {} FROM identities WHERE key = ?1", IdentityRow::COLUMNS);
        let key = key.to_string();
        let row = self
            .run("identity", move |conn| {
                conn.query_row(&sql, params![key], IdentityRow::from_row)
                    .optional()
                    .map_err(sql_error("identity"))
            })
            .await?;
        row.map(IdentityRow::into_identity).transpose()
    }

    #[instrument(skip(self, identity), fields(key = %identity.key))]
    async fn create_identity(&self, identity: &Identity) -> Result<()> {
        let identity = identity.clone();
        self.run("create_identity", move |conn| {
            let changed = conn
                .execute(
                    "INSERT OR IGNORE INTO identities (key, display_name, supervisor, active, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        identity.key.as_str(),
                        identity.display_name,
                        identity.supervisor.as_ref().map(IdentityKey::as_str),
                        identity.active,
                        identity.created_at.timestamp_millis()
                    ],
                )
                .map_err(sql_error("create_identity"))?;
            if changed == 0 {
                return Err(Error::AlreadyExists(identity.key.to_string()));
            }
            Ok(())
        })
        .await
    }
}
