//! DuckDB-backed case store.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use duckdb::{Connection, params};
use plazo_core::{CaseEvent, CaseEventType, CaseRecord, CaseStatus};
use tracing::{debug, info};

use crate::{CaseStore, StatusTransition, StoreError, TransitionOutcome, next_event_time};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cases (
    id VARCHAR PRIMARY KEY,
    status VARCHAR NOT NULL,
    submission_date VARCHAR,
    deadline_date VARCHAR
);
CREATE TABLE IF NOT EXISTS case_events (
    case_id VARCHAR NOT NULL,
    event_type VARCHAR NOT NULL,
    details VARCHAR,
    created_at VARCHAR NOT NULL
);
";

type CaseRow = (String, String, Option<String>, Option<String>);
type EventRow = (String, String, Option<String>, String);

/// DuckDB store for cases and their audit trail.
///
/// Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
/// so that string order is time order. Supports both in-memory and
/// file-backed databases. Queries run on tokio's blocking pool, so a caller's
/// timeout still fires while the connection is busy.
pub struct DuckCaseStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckCaseStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let store = Self::init(Connection::open(path)?)?;
        info!(path = %path.display(), cases = store.case_count()?, "opened case store");
        Ok(store)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Shared handle on the underlying connection, for ad-hoc queries.
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// Register a newly filed case.
    pub async fn insert_case(&self, case: &CaseRecord) -> Result<(), StoreError> {
        let case = case.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            if case_exists(&tx, &case.id)? {
                return Err(StoreError::CaseExists(case.id));
            }
            tx.execute(
                "INSERT INTO cases (id, status, submission_date, deadline_date) VALUES (?, ?, ?, ?)",
                params![
                    case.id,
                    case.status.as_str(),
                    case.submission_date.map(format_timestamp),
                    case.deadline_date.map(|d| d.to_string()),
                ],
            )?;
            tx.commit()?;
            debug!(case_id = %case.id, "inserted case");
            Ok(())
        })
        .await
    }

    /// Number of rows in the `cases` table.
    pub fn case_count(&self) -> Result<usize, StoreError> {
        let count: i64 = lock(&self.conn)
            .query_row("SELECT count(*)::BIGINT FROM cases", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&mut *lock(&conn)))
            .await
            .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
    }
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

fn case_exists(conn: &Connection, case_id: &str) -> Result<bool, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT count(*)::BIGINT FROM cases WHERE id = ?",
        [case_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[async_trait]
impl CaseStore for DuckCaseStore {
    async fn get_case(&self, case_id: &str) -> Result<CaseRecord, StoreError> {
        let case_id = case_id.to_string();
        self.with_conn(move |conn| {
            let row = conn.query_row(
                "SELECT id, status, submission_date, deadline_date FROM cases WHERE id = ?",
                [case_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            );
            match row {
                Ok(row) => parse_case(row),
                Err(duckdb::Error::QueryReturnedNoRows) => Err(StoreError::CaseNotFound(case_id)),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn commit_transition(
        &self,
        transition: &StatusTransition,
    ) -> Result<TransitionOutcome, StoreError> {
        let transition = transition.clone();
        self.with_conn(move |conn| {
            let case_id = transition.case_id.as_str();
            let tx = conn.transaction()?;

            let status: String = match tx.query_row(
                "SELECT status FROM cases WHERE id = ?",
                [case_id],
                |row| row.get(0),
            ) {
                Ok(status) => status,
                Err(duckdb::Error::QueryReturnedNoRows) => {
                    return Err(StoreError::CaseNotFound(case_id.to_string()));
                }
                Err(e) => return Err(e.into()),
            };
            let current = parse_status(case_id, &status)?;
            if !transition.from.contains(&current) {
                // Dropping the transaction rolls it back.
                return Ok(TransitionOutcome::Skipped { current });
            }

            let last: Option<String> = tx.query_row(
                "SELECT max(created_at) FROM case_events WHERE case_id = ?",
                [case_id],
                |row| row.get(0),
            )?;
            let last = last
                .map(|s| parse_timestamp(case_id, &s))
                .transpose()?;
            let created_at = next_event_time(transition.at, last);

            tx.execute(
                "UPDATE cases SET status = ? WHERE id = ? AND status = ?",
                params![transition.to.as_str(), case_id, current.as_str()],
            )?;
            tx.execute(
                "INSERT INTO case_events (case_id, event_type, details, created_at) VALUES (?, ?, ?, ?)",
                params![
                    case_id,
                    transition.event_type.as_str(),
                    transition.details,
                    format_timestamp(created_at),
                ],
            )?;
            tx.commit()?;

            Ok(TransitionOutcome::Applied(CaseEvent {
                case_id: case_id.to_string(),
                event_type: transition.event_type,
                details: transition.details.clone(),
                created_at,
            }))
        })
        .await
    }

    async fn open_cases(&self) -> Result<Vec<CaseRecord>, StoreError> {
        let rows = self
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, status, submission_date, deadline_date FROM cases
                     WHERE status IN ('SUBMITTED', 'AWAITING_RESPONSE')
                     ORDER BY id",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    })?
                    .collect::<Result<Vec<CaseRow>, _>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(parse_case).collect()
    }

    async fn events(&self, case_id: &str) -> Result<Vec<CaseEvent>, StoreError> {
        let case_id = case_id.to_string();
        let rows = self
            .with_conn(move |conn| {
                if !case_exists(conn, &case_id)? {
                    return Err(StoreError::CaseNotFound(case_id));
                }
                let mut stmt = conn.prepare(
                    "SELECT case_id, event_type, details, created_at FROM case_events
                     WHERE case_id = ?
                     ORDER BY created_at",
                )?;
                let rows = stmt
                    .query_map([case_id.as_str()], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    })?
                    .collect::<Result<Vec<EventRow>, _>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter()
            .map(|(case_id, event_type, details, created_at)| {
                let event_type =
                    event_type
                        .parse::<CaseEventType>()
                        .map_err(|e| StoreError::Corrupt {
                            case_id: case_id.clone(),
                            reason: e.to_string(),
                        })?;
                let created_at = parse_timestamp(&case_id, &created_at)?;
                Ok(CaseEvent {
                    case_id,
                    event_type,
                    details,
                    created_at,
                })
            })
            .collect()
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(case_id: &str, s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            case_id: case_id.to_string(),
            reason: format!("bad timestamp `{s}`: {e}"),
        })
}

fn parse_status(case_id: &str, s: &str) -> Result<CaseStatus, StoreError> {
    s.parse().map_err(|e: plazo_core::ParseCaseError| StoreError::Corrupt {
        case_id: case_id.to_string(),
        reason: e.to_string(),
    })
}

fn parse_case((id, status, submission, deadline): CaseRow) -> Result<CaseRecord, StoreError> {
    let status = parse_status(&id, &status)?;
    let submission_date = submission
        .map(|s| parse_timestamp(&id, &s))
        .transpose()?;
    let deadline_date = deadline
        .map(|s| {
            s.parse::<NaiveDate>().map_err(|e| StoreError::Corrupt {
                case_id: id.clone(),
                reason: format!("bad deadline `{s}`: {e}"),
            })
        })
        .transpose()?;
    Ok(CaseRecord {
        id,
        status,
        submission_date,
        deadline_date,
    })
}
