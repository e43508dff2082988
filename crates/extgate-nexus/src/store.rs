//! Nexus — the single access path to the shared SQLite store.
//!
//! - All mutating statements go through one **writer connection** guarded by
//!   a mutex, so concurrent plugins never race each other inside SQLite.
//! - Reads use separate **query-only connections** (WAL lets them proceed
//!   while a write is in flight).
//! - `SQLITE_BUSY` / `SQLITE_LOCKED` are retried with bounded exponential
//!   backoff, then surfaced as a store error.
//!
//! Only parameterized statements are part of the contract. Splicing caller
//! data into `statement` is the injection surface of the whole gateway and
//! is a bug in the caller; nothing here tries to detect it.

use crate::value::{from_sql, to_sql, Row};
use extgate_core::{GatewayError, NexusConfig, Result};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-connection busy_timeout; the retry loop handles anything longer.
const BUSY_TIMEOUT_MS: u64 = 250;
/// Idle read connections kept for reuse.
const MAX_IDLE_READERS: usize = 8;

/// Retry policy for busy/locked store conditions.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&NexusConfig::default())
    }
}

impl From<&NexusConfig> for RetryPolicy {
    fn from(cfg: &NexusConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Clone, Debug)]
enum Target {
    File(PathBuf),
    /// Shared-cache in-memory database, addressed by URI.
    Memory(String),
}

struct NexusInner {
    target: Target,
    writer: Mutex<Connection>,
    readers: Mutex<Vec<Connection>>,
    retry: RetryPolicy,
}

/// Cloneable handle to the shared store.
#[derive(Clone)]
pub struct Nexus {
    inner: Arc<NexusInner>,
}

impl std::fmt::Debug for Nexus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nexus").field("target", &self.inner.target).finish()
    }
}

impl Nexus {
    /// Open (or create) a file-backed store in WAL mode.
    pub fn open(path: impl AsRef<Path>, retry: RetryPolicy) -> Result<Self> {
        let target = Target::File(path.as_ref().to_path_buf());
        let writer = connect(&target)?;
        writer
            .query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
            .map_err(store_err)?;
        info!("Nexus opened at {}", path.as_ref().display());
        Ok(Self::with_writer(target, writer, retry))
    }

    /// Open a private in-memory store for tests. Readers share the writer's
    /// cache, so WAL does not apply and contention surfaces as `SQLITE_LOCKED`.
    pub fn open_in_memory(retry: RetryPolicy) -> Result<Self> {
        let uri = format!("file:extgate-{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
        let target = Target::Memory(uri);
        let writer = connect(&target)?;
        debug!("Nexus opened in memory");
        Ok(Self::with_writer(target, writer, retry))
    }

    /// Open according to config: the WAL file at `path` (`extgate.db` by
    /// default), or memory when `path` is unset.
    pub fn from_config(cfg: &NexusConfig) -> Result<Self> {
        let retry = RetryPolicy::from(cfg);
        match &cfg.path {
            Some(path) => Self::open(path, retry),
            None => Self::open_in_memory(retry),
        }
    }

    fn with_writer(target: Target, writer: Connection, retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(NexusInner {
                target,
                writer: Mutex::new(writer),
                readers: Mutex::new(Vec::new()),
                retry,
            }),
        }
    }

    /// Run a mutating statement. Returns the number of rows changed.
    ///
    /// Blocks the calling thread; use [`Nexus::execute`] from async code.
    pub fn execute_blocking(&self, statement: &str, params: &[Value]) -> Result<usize> {
        let writer = self
            .inner
            .writer
            .lock()
            .map_err(|_| GatewayError::store("writer lock poisoned"))?;
        let sql_params: Vec<_> = params.iter().map(to_sql).collect();
        self.retry_on_busy(|| writer.execute(statement, params_from_iter(sql_params.iter())))
    }

    /// Run a read-only statement. Each row is a JSON object keyed by column.
    ///
    /// Blocks the calling thread; use [`Nexus::query`] from async code.
    pub fn query_blocking(&self, statement: &str, params: &[Value]) -> Result<Vec<Row>> {
        let conn = self.checkout_reader()?;
        let sql_params: Vec<_> = params.iter().map(to_sql).collect();
        let result = self.retry_on_busy(|| read_rows(&conn, statement, &sql_params));
        self.checkin_reader(conn);
        result
    }

    /// Async form of [`Nexus::execute_blocking`], run on the blocking pool.
    pub async fn execute(&self, statement: impl Into<String>, params: Vec<Value>) -> Result<usize> {
        let this = self.clone();
        let statement = statement.into();
        tokio::task::spawn_blocking(move || this.execute_blocking(&statement, &params))
            .await
            .map_err(|e| GatewayError::store(format!("execute task failed: {}", e)))?
    }

    /// Async form of [`Nexus::query_blocking`], run on the blocking pool.
    pub async fn query(&self, statement: impl Into<String>, params: Vec<Value>) -> Result<Vec<Row>> {
        let this = self.clone();
        let statement = statement.into();
        tokio::task::spawn_blocking(move || this.query_blocking(&statement, &params))
            .await
            .map_err(|e| GatewayError::store(format!("query task failed: {}", e)))?
    }

    fn checkout_reader(&self) -> Result<Connection> {
        let idle = self
            .inner
            .readers
            .lock()
            .map_err(|_| GatewayError::store("reader pool lock poisoned"))?
            .pop();
        match idle {
            Some(conn) => Ok(conn),
            None => {
                let conn = connect(&self.inner.target)?;
                conn.pragma_update(None, "query_only", true).map_err(store_err)?;
                Ok(conn)
            }
        }
    }

    fn checkin_reader(&self, conn: Connection) {
        if let Ok(mut idle) = self.inner.readers.lock() {
            if idle.len() < MAX_IDLE_READERS {
                idle.push(conn);
            }
        }
    }

    /// Retry a closure on `SQLITE_BUSY` / `SQLITE_LOCKED` with exponential backoff.
    fn retry_on_busy<F, R>(&self, mut f: F) -> Result<R>
    where
        F: FnMut() -> rusqlite::Result<R>,
    {
        let policy = self.inner.retry;
        let mut attempt = 0u32;
        loop {
            match f() {
                Ok(v) => return Ok(v),
                Err(e) if is_busy_error(&e) && attempt < policy.max_retries => {
                    attempt += 1;
                    let delay = policy.delay(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "Store busy, retrying");
                    thread::sleep(delay);
                }
                Err(e) if is_busy_error(&e) => {
                    warn!(attempts = attempt, "Store still busy after retries");
                    return Err(GatewayError::store(format!(
                        "store busy after {} retries",
                        attempt
                    )));
                }
                Err(e) => return Err(store_err(e)),
            }
        }
    }
}

fn connect(target: &Target) -> Result<Connection> {
    let conn = match target {
        Target::File(path) => Connection::open(path),
        Target::Memory(uri) => Connection::open_with_flags(
            uri,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        ),
    }
    .map_err(store_err)?;
    conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
        .map_err(store_err)?;
    Ok(conn)
}

fn read_rows(
    conn: &Connection,
    statement: &str,
    params: &[rusqlite::types::Value],
) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare(statement)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut obj = Row::new();
        for (i, name) in columns.iter().enumerate() {
            obj.insert(name.clone(), from_sql(row.get_ref(i)?));
        }
        out.push(obj);
    }
    Ok(out)
}

/// Check if an error is a SQLite busy/locked error that is retryable.
fn is_busy_error(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, _) => matches!(
            code.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}

fn store_err(err: rusqlite::Error) -> GatewayError {
    GatewayError::store(err.to_string())
}
