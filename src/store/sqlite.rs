//! SQLite store.
//!
//! The database carries a `schema_version` table; bump
//! `CURRENT_SCHEMA_VERSION` and extend `run_migrations` when the schema
//! changes. Synchronous rusqlite calls run on the blocking pool.

use super::{
    CherryPickRecord, CherryPickStore, ClaimResult, EnqueueResult, MergeJob, MergeJobStore,
    PullRequestRecord, PullRequestStore, SlackUser, UserDirectory,
};
use crate::error::{Error, Result};
use crate::types::RepoId;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

const CURRENT_SCHEMA_VERSION: i64 = 1;

const CHERRY_PICK_COLUMNS: &str = "pr_id, from_pr, owner, repo, title, head, base, body, \
                                   created_by_bot, try_time, success, in_flight";

/// SQLite-backed implementation of every store trait
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    ///
    /// Runs pending migrations and releases cherry-pick claims left behind
    /// by a process that stopped mid-attempt.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.to_string_lossy();
        if path_str != ":memory:" {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::store(
                        "create database directory",
                        format!("{}: {e}", parent.display()),
                    )
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|e| Error::store("open database", e))?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")
            .map_err(|e| Error::store("configure pragmas", e))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );",
        )
        .map_err(|e| Error::store("create schema_version table", e))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::store("get schema version", e))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        let released = conn
            .execute(
                "UPDATE cherry_picks SET in_flight = 0 WHERE in_flight = 1",
                [],
            )
            .map_err(|e| Error::store("release stale claims", e))?;
        if released > 0 {
            warn!(released, "released cherry-pick claims left by a previous run");
        }

        info!(path = %path.display(), "opened state database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection, from_version: i64) -> Result<()> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(Error::store(
                "schema version",
                format!(
                    "database schema version {from_version} is newer than supported version \
                     {CURRENT_SCHEMA_VERSION}"
                ),
            ));
        }
        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS pull_requests (
                    owner TEXT NOT NULL,
                    repo TEXT NOT NULL,
                    pr_id INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    labels TEXT NOT NULL DEFAULT '[]',
                    merged INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    PRIMARY KEY (owner, repo, pr_id)
                );

                CREATE TABLE IF NOT EXISTS cherry_picks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    pr_id INTEGER NOT NULL DEFAULT 0,
                    from_pr INTEGER NOT NULL,
                    owner TEXT NOT NULL,
                    repo TEXT NOT NULL,
                    title TEXT NOT NULL DEFAULT '',
                    head TEXT NOT NULL DEFAULT '',
                    base TEXT NOT NULL,
                    body TEXT NOT NULL DEFAULT '',
                    created_by_bot INTEGER NOT NULL DEFAULT 1,
                    try_time INTEGER NOT NULL DEFAULT 0,
                    success INTEGER NOT NULL DEFAULT 0,
                    in_flight INTEGER NOT NULL DEFAULT 0,
                    UNIQUE (owner, repo, from_pr, base)
                );

                CREATE TABLE IF NOT EXISTS merge_jobs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    pr_id INTEGER NOT NULL,
                    owner TEXT NOT NULL,
                    repo TEXT NOT NULL,
                    started INTEGER NOT NULL DEFAULT 0,
                    status INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    UNIQUE (owner, repo, pr_id)
                );

                CREATE INDEX IF NOT EXISTS idx_merge_jobs_unfinished
                    ON merge_jobs(owner, repo, created_at) WHERE status = 0;

                CREATE TABLE IF NOT EXISTS slack_users (
                    github TEXT PRIMARY KEY,
                    email TEXT NOT NULL DEFAULT '',
                    slack TEXT NOT NULL DEFAULT ''
                );",
            )
            .map_err(|e| Error::store("migration v1", e))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| Error::store("update schema version", e))?;
        Ok(())
    }

    /// Register a chat user (the directory is normally maintained externally)
    pub async fn insert_user(&self, user: SlackUser) -> Result<()> {
        self.with_conn("insert user", move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO slack_users (github, email, slack) VALUES (?1, ?2, ?3)",
                params![user.github, user.email, user.slack],
            )
            .map(|_| ())
        })
        .await
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| Error::store(operation, "connection lock poisoned"))?;
            f(&mut guard).map_err(|e| Error::store(operation, e))
        })
        .await
        .map_err(|e| Error::store(operation, e))?
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn cherry_pick_from_row(row: &Row<'_>) -> rusqlite::Result<CherryPickRecord> {
    Ok(CherryPickRecord {
        pr_id: row.get(0)?,
        from_pr: row.get(1)?,
        owner: row.get(2)?,
        repo: row.get(3)?,
        title: row.get(4)?,
        head: row.get(5)?,
        base: row.get(6)?,
        body: row.get(7)?,
        created_by_bot: row.get(8)?,
        try_time: row.get(9)?,
        success: row.get(10)?,
        in_flight: row.get(11)?,
    })
}

fn merge_job_from_row(row: &Row<'_>) -> rusqlite::Result<MergeJob> {
    let created_at: String = row.get(5)?;
    Ok(MergeJob {
        pr_id: row.get(0)?,
        owner: row.get(1)?,
        repo: row.get(2)?,
        started: row.get(3)?,
        status: row.get(4)?,
        created_at: parse_timestamp(5, &created_at)?,
    })
}

fn select_cherry_pick(
    conn: &Connection,
    owner: &str,
    repo: &str,
    from_pr: i64,
    base: &str,
) -> rusqlite::Result<Option<CherryPickRecord>> {
    conn.query_row(
        &format!(
            "SELECT {CHERRY_PICK_COLUMNS} FROM cherry_picks
             WHERE owner = ?1 AND repo = ?2 AND from_pr = ?3 AND base = ?4"
        ),
        params![owner, repo, from_pr, base],
        cherry_pick_from_row,
    )
    .optional()
}

fn update_labels(
    conn: &Connection,
    owner: &str,
    repo: &str,
    pr_id: i64,
    edit: impl FnOnce(&mut Vec<String>),
) -> rusqlite::Result<()> {
    let Some(raw): Option<String> = conn
        .query_row(
            "SELECT labels FROM pull_requests WHERE owner = ?1 AND repo = ?2 AND pr_id = ?3",
            params![owner, repo, pr_id],
            |row| row.get(0),
        )
        .optional()?
    else {
        return Ok(());
    };

    let mut labels: Vec<String> = serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
    edit(&mut labels);
    let encoded = serde_json::to_string(&labels)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

    conn.execute(
        "UPDATE pull_requests SET labels = ?4 WHERE owner = ?1 AND repo = ?2 AND pr_id = ?3",
        params![owner, repo, pr_id, encoded],
    )?;
    Ok(())
}

#[async_trait]
impl PullRequestStore for SqliteStore {
    async fn get_pull_request(
        &self,
        repo: &RepoId,
        pr_id: i64,
    ) -> Result<Option<PullRequestRecord>> {
        let (owner, name) = (repo.owner.clone(), repo.repo.clone());
        self.with_conn("get pull request", move |conn| {
            conn.query_row(
                "SELECT pr_id, owner, repo, title, labels, merged, created_at FROM pull_requests
                 WHERE owner = ?1 AND repo = ?2 AND pr_id = ?3",
                params![owner, name, pr_id],
                |row| {
                    let labels: String = row.get(4)?;
                    let created_at: String = row.get(6)?;
                    Ok(PullRequestRecord {
                        pr_id: row.get(0)?,
                        owner: row.get(1)?,
                        repo: row.get(2)?,
                        title: row.get(3)?,
                        labels: serde_json::from_str(&labels).map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
                        })?,
                        merged: row.get(5)?,
                        created_at: parse_timestamp(6, &created_at)?,
                    })
                },
            )
            .optional()
        })
        .await
    }

    async fn insert_pull_request(&self, record: &PullRequestRecord) -> Result<bool> {
        let record = record.clone();
        let labels = serde_json::to_string(&record.labels)
            .map_err(|e| Error::store("insert pull request", e))?;
        self.with_conn("insert pull request", move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO pull_requests
                    (owner, repo, pr_id, title, labels, merged, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.owner,
                    record.repo,
                    record.pr_id,
                    record.title,
                    labels,
                    record.merged,
                    timestamp(record.created_at)
                ],
            )
            .map(|changed| changed > 0)
        })
        .await
    }

    async fn add_label(&self, repo: &RepoId, pr_id: i64, label: &str) -> Result<()> {
        let (owner, name, label) = (repo.owner.clone(), repo.repo.clone(), label.to_string());
        self.with_conn("add label", move |conn| {
            let tx = conn.transaction()?;
            update_labels(&tx, &owner, &name, pr_id, |labels| {
                if !labels.contains(&label) {
                    labels.push(label);
                }
            })?;
            tx.commit()
        })
        .await
    }

    async fn remove_label(&self, repo: &RepoId, pr_id: i64, label: &str) -> Result<()> {
        let (owner, name, label) = (repo.owner.clone(), repo.repo.clone(), label.to_string());
        self.with_conn("remove label", move |conn| {
            let tx = conn.transaction()?;
            update_labels(&tx, &owner, &name, pr_id, |labels| {
                labels.retain(|l| *l != label);
            })?;
            tx.commit()
        })
        .await
    }
}

#[async_trait]
impl CherryPickStore for SqliteStore {
    async fn get_cherry_pick(
        &self,
        repo: &RepoId,
        from_pr: i64,
        base: &str,
    ) -> Result<Option<CherryPickRecord>> {
        let (owner, name, base) = (repo.owner.clone(), repo.repo.clone(), base.to_string());
        self.with_conn("get cherry pick", move |conn| {
            select_cherry_pick(conn, &owner, &name, from_pr, &base)
        })
        .await
    }

    async fn claim_cherry_pick(
        &self,
        repo: &RepoId,
        from_pr: i64,
        base: &str,
    ) -> Result<ClaimResult> {
        let (owner, name, base) = (repo.owner.clone(), repo.repo.clone(), base.to_string());
        self.with_conn("claim cherry pick", move |conn| {
            let tx = conn.transaction()?;

            // INSERT OR IGNORE leans on the UNIQUE constraint; changes() tells
            // us whether this call created the row
            tx.execute(
                "INSERT OR IGNORE INTO cherry_picks (owner, repo, from_pr, base, in_flight)
                 VALUES (?1, ?2, ?3, ?4, 1)",
                params![owner, name, from_pr, base],
            )?;
            let inserted = tx.changes() > 0;

            let Some(mut record) = select_cherry_pick(&tx, &owner, &name, from_pr, &base)? else {
                return Err(rusqlite::Error::QueryReturnedNoRows);
            };

            let result = if inserted {
                ClaimResult::Claimed(record)
            } else if record.success {
                ClaimResult::AlreadyDone(record)
            } else if record.in_flight {
                ClaimResult::InFlight
            } else {
                tx.execute(
                    "UPDATE cherry_picks SET in_flight = 1
                     WHERE owner = ?1 AND repo = ?2 AND from_pr = ?3 AND base = ?4",
                    params![owner, name, from_pr, base],
                )?;
                record.in_flight = true;
                ClaimResult::Claimed(record)
            };
            tx.commit()?;
            Ok(result)
        })
        .await
    }

    async fn save_cherry_pick(&self, record: &CherryPickRecord) -> Result<()> {
        let r = record.clone();
        self.with_conn("save cherry pick", move |conn| {
            conn.execute(
                "INSERT INTO cherry_picks
                    (pr_id, from_pr, owner, repo, title, head, base, body,
                     created_by_bot, try_time, success, in_flight)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT (owner, repo, from_pr, base) DO UPDATE SET
                    pr_id = excluded.pr_id,
                    title = excluded.title,
                    head = excluded.head,
                    body = excluded.body,
                    created_by_bot = excluded.created_by_bot,
                    try_time = excluded.try_time,
                    success = excluded.success,
                    in_flight = excluded.in_flight",
                params![
                    r.pr_id,
                    r.from_pr,
                    r.owner,
                    r.repo,
                    r.title,
                    r.head,
                    r.base,
                    r.body,
                    r.created_by_bot,
                    r.try_time,
                    r.success,
                    r.in_flight
                ],
            )
            .map(|_| ())
        })
        .await
    }

    async fn insert_cherry_pick(&self, record: &CherryPickRecord) -> Result<bool> {
        let r = record.clone();
        self.with_conn("insert cherry pick", move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO cherry_picks
                    (pr_id, from_pr, owner, repo, title, head, base, body,
                     created_by_bot, try_time, success, in_flight)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    r.pr_id,
                    r.from_pr,
                    r.owner,
                    r.repo,
                    r.title,
                    r.head,
                    r.base,
                    r.body,
                    r.created_by_bot,
                    r.try_time,
                    r.success,
                    r.in_flight
                ],
            )
            .map(|changed| changed > 0)
        })
        .await
    }
}

#[async_trait]
impl MergeJobStore for SqliteStore {
    async fn enqueue_merge_job(
        &self,
        repo: &RepoId,
        pr_id: i64,
        now: DateTime<Utc>,
    ) -> Result<EnqueueResult> {
        let (owner, name) = (repo.owner.clone(), repo.repo.clone());
        let now = timestamp(now);
        self.with_conn("enqueue merge job", move |conn| {
            let tx = conn.transaction()?;
            let existing: Option<bool> = tx
                .query_row(
                    "SELECT status FROM merge_jobs WHERE owner = ?1 AND repo = ?2 AND pr_id = ?3",
                    params![owner, name, pr_id],
                    |row| row.get(0),
                )
                .optional()?;

            let result = match existing {
                Some(false) => EnqueueResult::AlreadyQueued,
                Some(true) => {
                    tx.execute(
                        "UPDATE merge_jobs SET started = 0, status = 0, created_at = ?4
                         WHERE owner = ?1 AND repo = ?2 AND pr_id = ?3",
                        params![owner, name, pr_id, now],
                    )?;
                    EnqueueResult::Queued
                }
                None => {
                    tx.execute(
                        "INSERT INTO merge_jobs (pr_id, owner, repo, started, status, created_at)
                         VALUES (?1, ?2, ?3, 0, 0, ?4)",
                        params![pr_id, owner, name, now],
                    )?;
                    EnqueueResult::Queued
                }
            };
            tx.commit()?;
            Ok(result)
        })
        .await
    }

    async fn list_unfinished_merge_jobs(&self, repo: &RepoId) -> Result<Vec<MergeJob>> {
        let (owner, name) = (repo.owner.clone(), repo.repo.clone());
        self.with_conn("list merge jobs", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT pr_id, owner, repo, started, status, created_at FROM merge_jobs
                 WHERE owner = ?1 AND repo = ?2 AND status = 0
                 ORDER BY created_at ASC, id ASC",
            )?;
            let jobs = stmt
                .query_map(params![owner, name], merge_job_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(jobs)
        })
        .await
    }

    async fn save_merge_job(&self, job: &MergeJob) -> Result<()> {
        let job = job.clone();
        self.with_conn("save merge job", move |conn| {
            conn.execute(
                "INSERT INTO merge_jobs (pr_id, owner, repo, started, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (owner, repo, pr_id) DO UPDATE SET
                    started = excluded.started,
                    status = excluded.status,
                    created_at = excluded.created_at",
                params![
                    job.pr_id,
                    job.owner,
                    job.repo,
                    job.started,
                    job.status,
                    timestamp(job.created_at)
                ],
            )
            .map(|_| ())
        })
        .await
    }
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn find_by_github(&self, login: &str) -> Result<Option<SlackUser>> {
        let login = login.to_string();
        self.with_conn("find user", move |conn| {
            conn.query_row(
                "SELECT github, email, slack FROM slack_users WHERE github = ?1",
                params![login],
                |row| {
                    Ok(SlackUser {
                        github: row.get(0)?,
                        email: row.get(1)?,
                        slack: row.get(2)?,
                    })
                },
            )
            .optional()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepoId {
        RepoId::new("pingcap", "tidb")
    }

    #[tokio::test]
    async fn test_claim_under_unique_constraint() {
        let store = SqliteStore::open(":memory:").unwrap();
        let first = store.claim_cherry_pick(&repo(), 120, "release-4.0").await.unwrap();
        let ClaimResult::Claimed(record) = first else {
            panic!("expected claim, got {first:?}");
        };
        assert!(record.in_flight);
        assert!(record.created_by_bot);

        let second = store.claim_cherry_pick(&repo(), 120, "release-4.0").await.unwrap();
        assert_eq!(second, ClaimResult::InFlight);
    }

    #[tokio::test]
    async fn test_merge_jobs_ordered_by_arrival() {
        let store = SqliteStore::open(":memory:").unwrap();
        let t0 = Utc::now();
        store
            .enqueue_merge_job(&repo(), 2, t0 + chrono::Duration::seconds(1))
            .await
            .unwrap();
        store.enqueue_merge_job(&repo(), 1, t0).await.unwrap();
        store
            .enqueue_merge_job(&RepoId::new("pingcap", "tikv"), 3, t0)
            .await
            .unwrap();

        let jobs = store.list_unfinished_merge_jobs(&repo()).await.unwrap();
        let ids: Vec<i64> = jobs.iter().map(|j| j.pr_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_user_lookup() {
        let store = SqliteStore::open(":memory:").unwrap();
        store
            .insert_user(SlackUser {
                github: "alice".into(),
                email: "alice@example.com".into(),
                slack: "U123".into(),
            })
            .await
            .unwrap();
        let user = store.find_by_github("alice").await.unwrap().unwrap();
        assert_eq!(user.slack, "U123");
        assert!(store.find_by_github("bob").await.unwrap().is_none());
    }
}
