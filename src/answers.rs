use std::path::Path;

use chrono::{DateTime, Local};
use rusqlite::{params, Connection};
use thiserror::Error;
use tracing::info;

use crate::app_dirs::AppDirs;
use crate::exercise::{ExerciseKind, SessionKind};
use crate::util::{mean, percentage, std_dev};

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("answer log unavailable: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("failed to create answer log directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of one exercise item
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerRecord {
    pub word: String,
    pub kind: ExerciseKind,
    pub session: SessionKind,
    /// `-1` when the item timed out
    pub selected_index: i32,
    pub correct: bool,
    pub response_time_ms: Option<u64>,
    pub answered_at: DateTime<Local>,
}

/// Receives answers as a session runs and persists them when it ends
pub trait AnswerSink {
    fn record(&mut self, record: AnswerRecord);
    /// Flush everything recorded so far. Returns how many records went out.
    fn submit(&mut self) -> Result<usize, AnswerError>;
}

impl<S: AnswerSink + ?Sized> AnswerSink for Box<S> {
    fn record(&mut self, record: AnswerRecord) {
        (**self).record(record)
    }

    fn submit(&mut self) -> Result<usize, AnswerError> {
        (**self).submit()
    }
}

/// Keeps answers in memory; `submit` only counts them
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<AnswerRecord>,
    pub submitted: usize,
}

impl AnswerSink for MemorySink {
    fn record(&mut self, record: AnswerRecord) {
        self.records.push(record);
    }

    fn submit(&mut self) -> Result<usize, AnswerError> {
        let fresh = self.records.len() - self.submitted;
        self.submitted = self.records.len();
        Ok(fresh)
    }
}

/// SQLite-backed answer history
#[derive(Debug)]
pub struct AnswerLog {
    conn: Connection,
    pending: Vec<AnswerRecord>,
}

impl AnswerLog {
    /// Open the log at the default state location
    pub fn open_default() -> Result<Self, AnswerError> {
        let path = AppDirs::db_path().unwrap_or_else(|| "wordflow_answers.db".into());
        Self::open(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AnswerError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, AnswerError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, AnswerError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS answers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                word TEXT NOT NULL,
                kind TEXT NOT NULL,
                session TEXT NOT NULL,
                selected_index INTEGER NOT NULL,
                correct BOOLEAN NOT NULL,
                response_time_ms INTEGER,
                answered_at TEXT NOT NULL
            )
            "#,
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_answers_word ON answers(word)",
            [],
        )?;
        Ok(Self {
            conn,
            pending: Vec::new(),
        })
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Correct-answer percentage and attempt count per word, worst first
    pub fn accuracy_by_word(&self) -> Result<Vec<(String, f64, i64)>, AnswerError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                word,
                (SUM(CASE WHEN correct = 1 THEN 1 ELSE 0 END) * 100.0 / COUNT(*)) AS accuracy,
                COUNT(*) AS attempts
            FROM answers
            GROUP BY word
            ORDER BY accuracy ASC, word ASC
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok::<(String, f64, i64), rusqlite::Error>((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;

        let mut summary = Vec::new();
        for row in rows {
            summary.push(row?);
        }
        Ok(summary)
    }

    pub fn total_answers(&self) -> Result<i64, AnswerError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM answers", [], |row| row.get(0))?)
    }

    pub fn clear(&self) -> Result<(), AnswerError> {
        self.conn.execute("DELETE FROM answers", [])?;
        Ok(())
    }
}

impl AnswerSink for AnswerLog {
    fn record(&mut self, record: AnswerRecord) {
        self.pending.push(record);
    }

    fn submit(&mut self) -> Result<usize, AnswerError> {
        let tx = self.conn.transaction()?;
        for record in &self.pending {
            tx.execute(
                r#"
                INSERT INTO answers
                (word, kind, session, selected_index, correct, response_time_ms, answered_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    record.word,
                    record.kind.to_string(),
                    record.session.to_string(),
                    record.selected_index,
                    record.correct,
                    record.response_time_ms.map(|ms| ms as i64),
                    record.answered_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;

        let written = self.pending.len();
        self.pending.clear();
        info!(written, "answers submitted");
        Ok(written)
    }
}

/// Totals shown at the end of a session
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionSummary {
    pub total: usize,
    pub correct: usize,
    pub timed_out: usize,
    pub accuracy: f64,
    pub mean_response_ms: Option<f64>,
    pub response_spread_ms: Option<f64>,
}

impl SessionSummary {
    pub fn from_records(records: &[AnswerRecord]) -> Self {
        let total = records.len();
        if total == 0 {
            return Self::default();
        }
        let correct = records.iter().filter(|r| r.correct).count();
        let timed_out = records.iter().filter(|r| r.selected_index < 0).count();
        let times: Vec<f64> = records
            .iter()
            .filter_map(|r| r.response_time_ms)
            .map(|ms| ms as f64)
            .collect();

        Self {
            total,
            correct,
            timed_out,
            accuracy: percentage(correct, total),
            mean_response_ms: mean(&times),
            response_spread_ms: std_dev(&times),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(word: &str, selected_index: i32, correct: bool, ms: Option<u64>) -> AnswerRecord {
        AnswerRecord {
            word: word.to_string(),
            kind: ExerciseKind::Reading,
            session: SessionKind::Practice,
            selected_index,
            correct,
            response_time_ms: ms,
            answered_at: Local::now(),
        }
    }

    #[test]
    fn memory_sink_counts_fresh_records() {
        let mut sink = MemorySink::default();
        sink.record(record("a", 0, true, Some(100)));
        sink.record(record("b", 1, false, Some(200)));
        assert_eq!(sink.submit().unwrap(), 2);
        sink.record(record("c", -1, false, None));
        assert_eq!(sink.submit().unwrap(), 1);
        assert_eq!(sink.records.len(), 3);
    }

    #[test]
    fn answer_log_persists_on_submit() {
        let mut log = AnswerLog::in_memory().unwrap();
        log.record(record("der Hund", 1, true, Some(900)));
        log.record(record("der Hund", 2, false, Some(1200)));
        log.record(record("die Katze", 0, true, Some(700)));
        assert_eq!(log.total_answers().unwrap(), 0);
        assert_eq!(log.pending(), 3);

        assert_eq!(log.submit().unwrap(), 3);
        assert_eq!(log.pending(), 0);
        assert_eq!(log.total_answers().unwrap(), 3);

        let summary = log.accuracy_by_word().unwrap();
        assert_eq!(summary[0], ("der Hund".to_string(), 50.0, 2));
        assert_eq!(summary[1], ("die Katze".to_string(), 100.0, 1));
    }

    #[test]
    fn answer_log_on_disk_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("answers.db");
        {
            let mut log = AnswerLog::open(&path).unwrap();
            log.record(record("das Haus", -1, false, None));
            log.submit().unwrap();
        }
        let log = AnswerLog::open(&path).unwrap();
        assert_eq!(log.total_answers().unwrap(), 1);
        log.clear().unwrap();
        assert_eq!(log.total_answers().unwrap(), 0);
    }

    #[test]
    fn summary_from_records() {
        let records = vec![
            record("a", 0, true, Some(1000)),
            record("b", 2, false, Some(2000)),
            record("c", -1, false, Some(3000)),
            record("d", 1, true, None),
        ];
        let summary = SessionSummary::from_records(&records);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.correct, 2);
        assert_eq!(summary.timed_out, 1);
        assert_eq!(summary.accuracy, 50.0);
        assert_eq!(summary.mean_response_ms, Some(2000.0));
        assert!((summary.response_spread_ms.unwrap() - 816.496580927726).abs() < 1e-6);
    }

    #[test]
    fn empty_summary() {
        assert_eq!(SessionSummary::from_records(&[]), SessionSummary::default());
    }
}
