//! Bookkeeping for workflow runs in the `requests` table.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::PipelineResult;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    InProgress,
    Success,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn code(self) -> i64 {
        match self {
            Self::InProgress => 0,
            Self::Success => 1,
            Self::Failed => -1,
            Self::Canceled => -2,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Success,
            -1 => Self::Failed,
            -2 => Self::Canceled,
            _ => Self::InProgress,
        }
    }

    /// `"complete"` is an alias of `"success"`; unknown names are in progress.
    pub fn from_name(name: &str) -> Self {
        match name {
            "success" | "complete" => Self::Success,
            "failed" => Self::Failed,
            "canceled" => Self::Canceled,
            _ => Self::InProgress,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRun {
    pub id: i64,
    pub job_type: String,
    pub date: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub status: JobStatus,
}

pub struct JobTracker<'a> {
    conn: &'a Connection,
}

impl<'a> JobTracker<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn create_job(&self, job_type: &str, run_date: &str, status: JobStatus) -> PipelineResult<i64> {
        self.conn.execute(
            "INSERT INTO requests (job_type, date, start_date, end_date, status)
             VALUES (?1, ?2, ?3, NULL, ?4)",
            params![job_type, run_date, now(), status.code()],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, job_type, run_date, "Job run created");
        Ok(id)
    }

    pub fn get_job(&self, job_type: &str, date: &str, status: JobStatus) -> PipelineResult<Option<JobRun>> {
        let job = self
            .conn
            .query_row(
                "SELECT id, job_type, date, start_date, end_date, status FROM requests
                 WHERE job_type = ?1 AND date = ?2 AND status = ?3
                 ORDER BY id LIMIT 1",
                params![job_type, date, status.code()],
                row_to_run,
            )
            .optional()?;
        Ok(job)
    }

    /// Without an explicit `end_date`, a successful run is stamped now and
    /// any other status clears it.
    pub fn update_job(
        &self,
        id: i64,
        status: Option<JobStatus>,
        end_date: Option<&str>,
    ) -> PipelineResult<bool> {
        let end_date = match end_date {
            Some(d) => Some(d.to_string()),
            None if status == Some(JobStatus::Success) => Some(now()),
            None => None,
        };
        let n = match status {
            Some(status) => self.conn.execute(
                "UPDATE requests SET status = ?1, end_date = ?2 WHERE id = ?3",
                params![status.code(), end_date, id],
            )?,
            None => self.conn.execute(
                "UPDATE requests SET end_date = ?1 WHERE id = ?2",
                params![end_date, id],
            )?,
        };
        if n == 0 {
            warn!(id, "Job run not found");
        }
        Ok(n > 0)
    }

    pub fn delete_job(&self, id: i64) -> PipelineResult<bool> {
        let n = self.conn.execute("DELETE FROM requests WHERE id = ?1", [id])?;
        Ok(n > 0)
    }

    pub fn list_jobs(&self) -> PipelineResult<Vec<JobRun>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, job_type, date, start_date, end_date, status FROM requests ORDER BY id",
        )?;
        let runs = stmt
            .query_map([], row_to_run)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }
}

fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<JobRun> {
    Ok(JobRun {
        id: row.get(0)?,
        job_type: row.get(1)?,
        date: row.get(2)?,
        start_date: row.get(3)?,
        end_date: row.get(4)?,
        status: JobStatus::from_code(row.get(5)?),
    })
}

fn now() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::memory;

    #[test]
    fn status_names() {
        assert_eq!(JobStatus::from_name("complete"), JobStatus::Success);
        assert_eq!(JobStatus::from_name("success").code(), 1);
        assert_eq!(JobStatus::from_name("failed").code(), -1);
        assert_eq!(JobStatus::from_name("canceled").code(), -2);
        assert_eq!(JobStatus::from_name("whatever"), JobStatus::InProgress);
    }

    #[test]
    fn create_then_find() {
        let conn = memory();
        let tracker = JobTracker::new(&conn);
        let id = tracker.create_job("jobcz", "2024-10-01", JobStatus::InProgress).unwrap();

        assert!(tracker.get_job("jobcz", "2024-10-01", JobStatus::Success).unwrap().is_none());
        let run = tracker
            .get_job("jobcz", "2024-10-01", JobStatus::InProgress)
            .unwrap()
            .unwrap();
        assert_eq!(run.id, id);
        assert!(run.end_date.is_none());
    }

    #[test]
    fn success_stamps_end_date() {
        let conn = memory();
        let tracker = JobTracker::new(&conn);
        let id = tracker.create_job("jobcz", "2024-10-01", JobStatus::InProgress).unwrap();

        assert!(tracker.update_job(id, Some(JobStatus::Success), None).unwrap());
        let run = tracker
            .get_job("jobcz", "2024-10-01", JobStatus::Success)
            .unwrap()
            .unwrap();
        assert!(run.end_date.is_some());

        tracker.update_job(id, Some(JobStatus::Failed), None).unwrap();
        let runs = tracker.list_jobs().unwrap();
        assert_eq!(runs[0].status, JobStatus::Failed);
        assert!(runs[0].end_date.is_none());
    }

    #[test]
    fn explicit_end_date_kept() {
        let conn = memory();
        let tracker = JobTracker::new(&conn);
        let id = tracker.create_job("jobcz", "2024-10-01", JobStatus::InProgress).unwrap();
        tracker.update_job(id, None, Some("2024-10-02 00:00:00.000000")).unwrap();
        let runs = tracker.list_jobs().unwrap();
        assert_eq!(runs[0].end_date.as_deref(), Some("2024-10-02 00:00:00.000000"));
        assert_eq!(runs[0].status, JobStatus::InProgress);
    }

    #[test]
    fn missing_run_reports_false() {
        let conn = memory();
        let tracker = JobTracker::new(&conn);
        assert!(!tracker.update_job(99, Some(JobStatus::Success), None).unwrap());
        assert!(!tracker.delete_job(99).unwrap());
    }

    #[test]
    fn delete_removes_run() {
        let conn = memory();
        let tracker = JobTracker::new(&conn);
        let id = tracker.create_job("jobcz", "2024-10-01", JobStatus::Success).unwrap();
        assert!(tracker.delete_job(id).unwrap());
        assert!(tracker.list_jobs().unwrap().is_empty());
    }
}
