//! Local journal of trigger runs, backed by SQLite.
//!
//! Every scheduled or manual run is recorded with the phase it reached and
//! its outcome, so `skycast history` can show what the trigger did even
//! when logs are gone.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use skycast_core::error::RusqliteErrorExt;
use skycast_core::DatabaseError;

/// What fired a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Scheduled,
    Manual,
}

/// Stage a run had reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    /// Loading configuration and bringing up the store and LLM client
    Provision,
    /// Running the prediction task
    Execute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Running,
    Succeeded,
    Failed,
    /// A scheduled firing dropped because a run was still in flight
    Skipped,
}

macro_rules! str_enum {
    ($ty:ty { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            fn parse(s: &str) -> Option<Self> {
                match s {
                    $($s => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(TriggerKind { Scheduled => "scheduled", Manual => "manual" });
str_enum!(RunPhase { Provision => "provision", Execute => "execute" });
str_enum!(RunOutcome {
    Running => "running",
    Succeeded => "succeeded",
    Failed => "failed",
    Skipped => "skipped",
});

/// One journal row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub trigger: TriggerKind,
    pub phase: RunPhase,
    pub outcome: RunOutcome,
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Run journal backed by SQLite.
pub struct RunJournal {
    conn: Connection,
}

impl RunJournal {
    /// Open (or create) the journal at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
        let journal = Self { conn };
        journal.init_schema()?;
        Ok(journal)
    }

    /// In-memory journal, for tests and dry runs.
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
        let journal = Self { conn };
        journal.init_schema()?;
        Ok(journal)
    }

    fn init_schema(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS runs (
                    id TEXT PRIMARY KEY,
                    trigger TEXT NOT NULL,
                    phase TEXT NOT NULL,
                    outcome TEXT NOT NULL,
                    message TEXT,
                    started_at TEXT NOT NULL,
                    finished_at TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_runs_started ON runs(started_at DESC);
                "#,
            )
            .map_err(|e| e.into_database_error())
    }

    /// Record the start of a run, in the provisioning phase.
    pub fn start(&self, trigger: TriggerKind, now: DateTime<Utc>) -> Result<RunRecord, DatabaseError> {
        let record = RunRecord {
            id: uuid::Uuid::new_v4().to_string(),
            trigger,
            phase: RunPhase::Provision,
            outcome: RunOutcome::Running,
            message: None,
            started_at: now,
            finished_at: None,
        };

        self.conn
            .execute(
                "INSERT INTO runs (id, trigger, phase, outcome, started_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    record.trigger.as_str(),
                    record.phase.as_str(),
                    record.outcome.as_str(),
                    record.started_at.to_rfc3339(),
                ],
            )
            .map_err(|e| e.into_database_error())?;

        Ok(record)
    }

    pub fn set_phase(&self, id: &str, phase: RunPhase) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "UPDATE runs SET phase = ?1 WHERE id = ?2",
                params![phase.as_str(), id],
            )
            .map_err(|e| e.into_database_error())?;
        Ok(())
    }

    pub fn finish(
        &self,
        id: &str,
        outcome: RunOutcome,
        message: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let updated = self
            .conn
            .execute(
                "UPDATE runs SET outcome = ?1, message = ?2, finished_at = ?3 WHERE id = ?4",
                params![outcome.as_str(), message, now.to_rfc3339(), id],
            )
            .map_err(|e| e.into_database_error())?;

        if updated == 0 {
            return Err(DatabaseError::QueryFailed(format!("Run not found: {}", id)));
        }
        Ok(())
    }

    /// Record a firing that was dropped without running.
    pub fn record_skipped(
        &self,
        trigger: TriggerKind,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<RunRecord, DatabaseError> {
        let record = self.start(trigger, now)?;
        self.finish(&record.id, RunOutcome::Skipped, Some(reason), now)?;
        self.get(&record.id)?
            .ok_or_else(|| DatabaseError::QueryFailed(format!("Run not found: {}", record.id)))
    }

    pub fn get(&self, id: &str) -> Result<Option<RunRecord>, DatabaseError> {
        self.conn
            .query_row(
                "SELECT id, trigger, phase, outcome, message, started_at, finished_at FROM runs WHERE id = ?1",
                params![id],
                row_to_raw,
            )
            .optional()
            .map_err(|e| e.into_database_error())?
            .map(RawRun::into_record)
            .transpose()
    }

    /// Most recent runs, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<RunRecord>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, trigger, phase, outcome, message, started_at, finished_at
                 FROM runs ORDER BY started_at DESC, rowid DESC LIMIT ?1",
            )
            .map_err(|e| e.into_database_error())?;

        let rows = stmt
            .query_map(params![limit as i64], row_to_raw)
            .map_err(|e| e.into_database_error())?;

        rows.map(|row| row.map_err(|e| e.into_database_error())?.into_record())
            .collect()
    }

    /// Newest run that ended with `outcome`.
    pub fn last_with_outcome(&self, outcome: RunOutcome) -> Result<Option<RunRecord>, DatabaseError> {
        self.conn
            .query_row(
                "SELECT id, trigger, phase, outcome, message, started_at, finished_at
                 FROM runs WHERE outcome = ?1 ORDER BY started_at DESC, rowid DESC LIMIT 1",
                params![outcome.as_str()],
                row_to_raw,
            )
            .optional()
            .map_err(|e| e.into_database_error())?
            .map(RawRun::into_record)
            .transpose()
    }
}

struct RawRun {
    id: String,
    trigger: String,
    phase: String,
    outcome: String,
    message: Option<String>,
    started_at: String,
    finished_at: Option<String>,
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRun> {
    Ok(RawRun {
        id: row.get(0)?,
        trigger: row.get(1)?,
        phase: row.get(2)?,
        outcome: row.get(3)?,
        message: row.get(4)?,
        started_at: row.get(5)?,
        finished_at: row.get(6)?,
    })
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Corruption(format!("Bad timestamp {:?}: {}", s, e)))
}

impl RawRun {
    fn into_record(self) -> Result<RunRecord, DatabaseError> {
        let bad = |field: &str, value: &str| {
            DatabaseError::Corruption(format!("Unknown {} {:?} in run {}", field, value, self.id))
        };

        Ok(RunRecord {
            trigger: TriggerKind::parse(&self.trigger).ok_or_else(|| bad("trigger", &self.trigger))?,
            phase: RunPhase::parse(&self.phase).ok_or_else(|| bad("phase", &self.phase))?,
            outcome: RunOutcome::parse(&self.outcome).ok_or_else(|| bad("outcome", &self.outcome))?,
            started_at: parse_time(&self.started_at)?,
            finished_at: self.finished_at.as_deref().map(parse_time).transpose()?,
            message: self.message,
            id: self.id,
        })
    }
}

/// Thread-safe async handle to the journal.
///
/// SQLite calls run on the blocking pool.
#[derive(Clone)]
pub struct JournalClient(Arc<Mutex<RunJournal>>);

impl JournalClient {
    pub fn new(journal: RunJournal) -> Self {
        Self(Arc::new(Mutex::new(journal)))
    }

    async fn with<T, F>(&self, f: F) -> Result<T, DatabaseError>
    where
        T: Send + 'static,
        F: FnOnce(&RunJournal) -> Result<T, DatabaseError> + Send + 'static,
    {
        let journal = self.0.clone();
        tokio::task::spawn_blocking(move || f(&journal.lock()))
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("Journal task failed: {}", e)))?
    }

    pub async fn start(&self, trigger: TriggerKind) -> Result<RunRecord, DatabaseError> {
        self.with(move |j| j.start(trigger, Utc::now())).await
    }

    pub async fn set_phase(&self, id: &str, phase: RunPhase) -> Result<(), DatabaseError> {
        let id = id.to_string();
        self.with(move |j| j.set_phase(&id, phase)).await
    }

    pub async fn finish(
        &self,
        id: &str,
        outcome: RunOutcome,
        message: Option<String>,
    ) -> Result<(), DatabaseError> {
        let id = id.to_string();
        self.with(move |j| j.finish(&id, outcome, message.as_deref(), Utc::now()))
            .await
    }

    pub async fn record_skipped(
        &self,
        trigger: TriggerKind,
        reason: &str,
    ) -> Result<RunRecord, DatabaseError> {
        let reason = reason.to_string();
        self.with(move |j| j.record_skipped(trigger, &reason, Utc::now()))
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<RunRecord>, DatabaseError> {
        let id = id.to_string();
        self.with(move |j| j.get(&id)).await
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<RunRecord>, DatabaseError> {
        self.with(move |j| j.recent(limit)).await
    }

    pub async fn last_with_outcome(
        &self,
        outcome: RunOutcome,
    ) -> Result<Option<RunRecord>, DatabaseError> {
        self.with(move |j| j.last_with_outcome(outcome)).await
    }
}
