use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Request {
    Run(Job),
    Close,
}

struct Worker {
    requests: mpsc::Sender<Request>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(handle) = handle else {
            return;
        };

        if self.requests.send(Request::Close).is_err() {
            warn!("database thread already gone at shutdown");
        }
        if handle.join().is_err() {
            error!("database thread panicked");
        }
    }
}

/// Handle to the SQLite connection owned by a dedicated worker thread.
///
/// Every call to [`Database::execute`] runs to completion on that thread
/// before the next one starts, so a closure that opens a transaction sees
/// and writes a consistent snapshot.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Arc<PathBuf>,
}

impl Database {
    /// Open (creating if needed) the database at `path` and migrate it
    /// before returning.
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (requests_tx, requests_rx) = mpsc::channel();
        let (opened_tx, opened_rx) = mpsc::channel();
        let thread_path = path.clone();

        let thread = thread::Builder::new()
            .name("parkgate-db".into())
            .spawn(move || {
                let conn = match open_connection(&thread_path) {
                    Ok(conn) => {
                        let _ = opened_tx.send(Ok(()));
                        conn
                    }
                    Err(err) => {
                        let _ = opened_tx.send(Err(err));
                        return;
                    }
                };
                serve_requests(conn, requests_rx);
            })
            .context("failed to spawn database thread")?;

        let worker = Worker {
            requests: requests_tx,
            thread: Mutex::new(Some(thread)),
        };
        opened_rx
            .recv()
            .context("database thread exited during startup")??;

        info!("database ready at {}", path.display());
        Ok(Self {
            worker: Arc::new(worker),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `task` against the connection on the database thread.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            // The caller may have been cancelled; nothing left to tell.
            let _ = reply_tx.send(task(conn));
        });

        self.worker
            .requests
            .send(Request::Run(job))
            .map_err(|_| anyhow!("database thread is not running"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread dropped the request"))?
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database {}", path.display()))?;
    configure(&conn)?;
    run_migrations(&mut conn).context("failed to migrate database")?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    // WAL is unavailable on some filesystems; rollback journaling still works.
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("WAL journal mode unavailable: {err}");
    }
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set SQLite busy timeout")?;
    Ok(())
}

fn serve_requests(mut conn: Connection, requests: mpsc::Receiver<Request>) {
    for request in requests {
        match request {
            Request::Run(job) => job(&mut conn),
            Request::Close => break,
        }
    }
    info!("database thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn opens_and_migrates_nested_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("parkgate.sqlite3");
        let db = Database::new(path.clone()).unwrap();

        assert_eq!(db.path(), path.as_path());
        let version: i32 = db
            .execute(|conn| {
                Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(version, crate::db::migrations::schema_version());
    }

    #[tokio::test]
    async fn task_errors_reach_the_caller() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("db.sqlite3")).unwrap();

        let result: Result<()> = db.execute(|_| Err(anyhow!("boom"))).await;
        assert_eq!(result.unwrap_err().to_string(), "boom");
    }

    #[tokio::test]
    async fn clones_share_one_connection() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("db.sqlite3")).unwrap();
        let other = db.clone();

        db.execute(|conn| {
            conn.execute_batch("CREATE TEMP TABLE marker (id INTEGER)")?;
            Ok(())
        })
        .await
        .unwrap();

        // Temp tables are private to a connection.
        let seen: i64 = other
            .execute(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_temp_master WHERE name = 'marker'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(seen, 1);
    }

    #[test]
    fn unopenable_path_fails_at_startup() {
        let dir = TempDir::new().unwrap();
        // A directory is not a database file.
        assert!(Database::new(dir.path().to_path_buf()).is_err());
    }
}
