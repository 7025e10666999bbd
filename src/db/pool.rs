// db/pool.rs
// Async connection pool using deadpool-sqlite
//
// # Access patterns
//
// ## Mutations: pool.write()
// Runs the closure inside `BEGIN IMMEDIATE`. The write lock is taken before
// the first read, so check-then-write sequences (name guard, then insert)
// cannot interleave with another writer. Returning `Err` rolls everything back.
// ```ignore
// let id = pool.write(move |tx| put_tag_sync(tx, guild, &name, &content, owner)).await?;
// ```
//
// ## Queries: pool.read()
// Runs the closure inside a deferred transaction so that multi-statement
// reads observe a single committed snapshot. Never blocks writers in WAL mode.
//
// ## Lower-level: pool.interact()
// Plain connection access with `anyhow::Result`, for migrations and tooling.
//
// In-memory pools (tests) use one connection on a shared-cache URI, so every
// operation is serialized through it.

use crate::error::TagError;
use anyhow::{Context, Result};
use deadpool_sqlite::{Config, Hook, Pool, Runtime};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Pool sizing and lock-wait settings
#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    pub max_size: usize,
    pub busy_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: 8,
            busy_timeout: Duration::from_millis(5000),
        }
    }
}

/// Database pool wrapper with per-connection setup.
pub struct DatabasePool {
    pool: Pool,
    path: Option<PathBuf>,
    /// URI for in-memory databases
    memory_uri: Option<String>,
}

/// Whether to use a file path or shared in-memory URI.
enum DbStorage {
    File(PathBuf),
    InMemory { label: &'static str },
}

impl DatabasePool {
    /// Open a pooled database at the given path.
    pub async fn open(path: &Path, options: PoolOptions) -> Result<Self> {
        Self::open_internal(DbStorage::File(path.to_path_buf()), options).await
    }

    /// Open a pooled in-memory database.
    ///
    /// Uses a shared cache URI so the database outlives any single connection
    /// recycle, and a single connection so writers never see table locks.
    pub async fn open_in_memory() -> Result<Self> {
        let options = PoolOptions {
            max_size: 1,
            ..PoolOptions::default()
        };
        Self::open_internal(DbStorage::InMemory { label: "tagstore" }, options).await
    }

    async fn open_internal(storage: DbStorage, options: PoolOptions) -> Result<Self> {
        let busy_ms = options.busy_timeout.as_millis() as u64;
        let (conn_str, path, memory_uri, hook) = match storage {
            DbStorage::File(p) => {
                ensure_parent_directory(&p)?;
                let s = p.to_string_lossy().into_owned();
                let hook = make_file_post_create_hook(p.clone(), busy_ms);
                (s, Some(p), None, hook)
            }
            DbStorage::InMemory { label } => {
                let uri = format!(
                    "file:{}_{}?mode=memory&cache=shared",
                    label,
                    uuid::Uuid::new_v4().simple()
                );
                let hook = make_memory_post_create_hook(busy_ms);
                (uri.clone(), None, Some(uri), hook)
            }
        };

        let cfg = Config::new(&conn_str);
        let pool = cfg
            .builder(Runtime::Tokio1)
            .context("Failed to create pool builder")?
            .max_size(options.max_size.max(1))
            .post_create(hook)
            .build()
            .context("Failed to build connection pool")?;

        let db_pool = Self {
            pool,
            path,
            memory_uri,
        };
        db_pool.run_migrations().await?;
        Ok(db_pool)
    }

    /// Get the memory URI (None for file-backed pools)
    pub fn memory_uri(&self) -> Option<&str> {
        self.memory_uri.as_deref()
    }

    /// Get the database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a closure with a connection from the pool.
    ///
    /// The closure runs on a blocking thread, so it won't block the async runtime.
    pub async fn interact<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get connection from pool")?;

        conn.interact(move |conn| f(conn))
            .await
            .map_err(|e| anyhow::anyhow!("interact failed: {e}"))?
    }

    /// Run a closure on a pooled connection, mapping errors to [`TagError`].
    pub async fn run<F, R>(&self, f: F) -> Result<R, TagError>
    where
        F: FnOnce(&Connection) -> Result<R, TagError> + Send + 'static,
        R: Send + 'static,
    {
        self.pool
            .get()
            .await?
            .interact(move |conn| f(conn))
            .await?
    }

    /// Run a closure inside an immediate (write-locking) transaction.
    ///
    /// Commits when the closure returns `Ok`; any `Err` rolls back every
    /// statement the closure executed.
    pub async fn write<F, R>(&self, f: F) -> Result<R, TagError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<R, TagError> + Send + 'static,
        R: Send + 'static,
    {
        self.run(move |conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
            let out = f(&tx)?;
            tx.commit()?;
            Ok(out)
        })
        .await
    }

    /// Run a closure inside a deferred (snapshot) transaction.
    pub async fn read<F, R>(&self, f: F) -> Result<R, TagError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<R, TagError> + Send + 'static,
        R: Send + 'static,
    {
        self.run(move |conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Deferred)?;
            let out = f(&tx)?;
            // Read-only: finishing the transaction just releases the snapshot.
            tx.finish()?;
            Ok(out)
        })
        .await
    }

    async fn run_migrations(&self) -> Result<()> {
        self.interact(|conn| {
            super::schema::run_all_migrations(conn)?;
            if let Err(e) = conn.execute_batch("PRAGMA optimize") {
                tracing::debug!("PRAGMA optimize skipped: {}", e);
            }
            Ok(())
        })
        .await
    }

    /// Get pool status for monitoring.
    pub fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            size: status.size,
            available: status.available,
            waiting: status.waiting,
        }
    }
}

/// Pool status for monitoring.
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub size: usize,
    pub available: usize,
    pub waiting: usize,
}

/// Ensure parent directory exists with secure permissions (0o700 on Unix).
fn ensure_parent_directory(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
        #[cfg(unix)]
        {
            let mut perms = std::fs::metadata(parent)?.permissions();
            perms.set_mode(0o700);
            std::fs::set_permissions(parent, perms)?;
        }
    }
    Ok(())
}

/// Create a post_create hook for file-based databases.
fn make_file_post_create_hook(path: PathBuf, busy_ms: u64) -> Hook {
    Hook::async_fn(move |conn, _metrics| {
        let path_for_perms = path.clone();
        Box::pin(async move {
            conn.interact(move |conn| {
                setup_connection(conn, busy_ms)?;

                #[cfg(unix)]
                if let Ok(metadata) = std::fs::metadata(&path_for_perms) {
                    let mut perms = metadata.permissions();
                    perms.set_mode(0o600);
                    if let Err(e) = std::fs::set_permissions(&path_for_perms, perms) {
                        tracing::warn!("Failed to set database file permissions to 0600: {}", e);
                    }
                }
                #[cfg(not(unix))]
                let _ = &path_for_perms;

                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into())
            })?
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("connection setup failed: {e}").into())
            })
        })
    })
}

/// Create a post_create hook for in-memory databases.
///
/// WAL mode is not applicable to in-memory DBs.
fn make_memory_post_create_hook(busy_ms: u64) -> Hook {
    Hook::async_fn(move |conn, _metrics| {
        Box::pin(async move {
            conn.interact(move |conn| {
                conn.execute_batch("PRAGMA foreign_keys=ON;")?;
                conn.busy_timeout(Duration::from_millis(busy_ms))?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into())
            })?
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("connection setup failed: {e}").into())
            })
        })
    })
}

/// Configure a connection after it's created.
fn setup_connection(conn: &Connection, busy_ms: u64) -> rusqlite::Result<()> {
    // The busy timeout bounds how long a writer waits for another writer;
    // set it first so the journal mode switch can wait too.
    conn.busy_timeout(Duration::from_millis(busy_ms))?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; \
         PRAGMA foreign_keys=ON; \
         PRAGMA synchronous=NORMAL; \
         PRAGMA journal_size_limit=32768;",
    )?;
    Ok(())
}
