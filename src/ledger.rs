use chrono::{DateTime, Duration, Local};
use rusqlite::{params, Connection, OptionalExtension};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::app_dirs::AppDirs;
use crate::error::ServiceError;
use crate::library::Library;
use crate::services::{
    AttemptStatus, AttemptStatusProvider, Exercise, ExerciseProvider, Question, ScoreReport,
    ScoringEndpoint, ServiceResult, Submission,
};
use crate::text::WordSequence;

/// Days that must pass before a ranked exercise counts again.
pub const RANKING_COOLDOWN_DAYS: i64 = 30;

/// Accuracy below which no ranking points are awarded.
pub const MIN_RANKING_ACCURACY: f64 = 60.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub exercise_id: String,
    pub finished_at: DateTime<Local>,
    pub wpm: u32,
    pub accuracy: f64,
    pub ranking_points: u32,
    pub counted: bool,
}

#[derive(Debug)]
pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    /// Opens (or creates) the ledger at the default state location.
    pub fn open_default() -> rusqlite::Result<Self> {
        let path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("skimr_attempts.db"));
        Self::open(&path)
    }

    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("Failed to create directory: {}", e)),
                )
            })?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> rusqlite::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                exercise_id TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                wpm INTEGER NOT NULL,
                accuracy REAL NOT NULL,
                ranking_points INTEGER NOT NULL,
                counted BOOLEAN NOT NULL
            )
            "#,
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_attempts_exercise ON attempts(exercise_id)",
            [],
        )?;
        Ok(Self { conn })
    }

    /// Stores an attempt. A counted attempt replaces the previously counted
    /// one for the same exercise.
    pub fn record(&mut self, attempt: &Attempt) -> rusqlite::Result<()> {
        let tx = self.conn.transaction()?;
        if attempt.counted {
            tx.execute(
                "UPDATE attempts SET counted = 0 WHERE exercise_id = ?1 AND counted = 1",
                params![attempt.exercise_id],
            )?;
        }
        tx.execute(
            r#"
            INSERT INTO attempts
            (exercise_id, finished_at, wpm, accuracy, ranking_points, counted)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                attempt.exercise_id,
                attempt.finished_at.to_rfc3339(),
                attempt.wpm,
                attempt.accuracy,
                attempt.ranking_points,
                attempt.counted,
            ],
        )?;
        tx.commit()
    }

    pub fn last_counted(&self, exercise_id: &str) -> rusqlite::Result<Option<Attempt>> {
        self.conn
            .query_row(
                r#"
                SELECT exercise_id, finished_at, wpm, accuracy, ranking_points, counted
                FROM attempts
                WHERE exercise_id = ?1 AND counted = 1
                ORDER BY finished_at DESC
                LIMIT 1
                "#,
                [exercise_id],
                row_to_attempt,
            )
            .optional()
    }

    /// Every attempt for an exercise, newest first.
    pub fn attempts(&self, exercise_id: &str) -> rusqlite::Result<Vec<Attempt>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT exercise_id, finished_at, wpm, accuracy, ranking_points, counted
            FROM attempts
            WHERE exercise_id = ?1
            ORDER BY finished_at DESC, id DESC
            "#,
        )?;
        let rows = stmt.query_map([exercise_id], row_to_attempt)?;
        rows.collect()
    }
}

fn row_to_attempt(row: &rusqlite::Row<'_>) -> rusqlite::Result<Attempt> {
    let finished_at: String = row.get(1)?;
    let finished_at = DateTime::parse_from_rfc3339(&finished_at)
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(1, "finished_at".to_string(), rusqlite::types::Type::Text)
        })?
        .with_timezone(&Local);
    Ok(Attempt {
        exercise_id: row.get(0)?,
        finished_at,
        wpm: row.get(2)?,
        accuracy: row.get(3)?,
        ranking_points: row.get(4)?,
        counted: row.get(5)?,
    })
}

fn length_multiplier(words: usize) -> f64 {
    match words {
        0..=300 => 0.8,
        301..=500 => 1.0,
        501..=800 => 1.2,
        _ => 1.5,
    }
}

pub fn words_per_minute(words: usize, elapsed_ms: f64) -> u32 {
    if elapsed_ms <= 0.0 {
        return 0;
    }
    (words as f64 / (elapsed_ms / 60_000.0)).round() as u32
}

pub fn ranking_points(wpm: u32, accuracy: f64, words: usize, counted: bool) -> u32 {
    if !counted || accuracy < MIN_RANKING_ACCURACY {
        return 0;
    }
    (wpm as f64 * accuracy / 100.0 * length_multiplier(words)).floor() as u32
}

/// Exercise library plus attempt ledger, serving both collaborator roles the
/// session needs when running offline.
pub struct LocalBackend {
    library: Library,
    ledger: RefCell<Ledger>,
}

impl LocalBackend {
    pub fn new(library: Library, ledger: Ledger) -> Self {
        Self {
            library,
            ledger: RefCell::new(ledger),
        }
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn attempts(&self, exercise_id: &str) -> ServiceResult<Vec<Attempt>> {
        Ok(self.ledger.borrow().attempts(exercise_id)?)
    }

    pub fn attempt_status_at(
        &self,
        exercise_id: &str,
        now: DateTime<Local>,
    ) -> ServiceResult<AttemptStatus> {
        let entry = self.library.entry(exercise_id)?;
        if !entry.ranked {
            return Ok(AttemptStatus {
                can_rank: false,
                message: "Training exercise: results are not ranked.".to_string(),
            });
        }
        let last = self.ledger.borrow().last_counted(exercise_id)?;
        Ok(match last {
            None => AttemptStatus {
                can_rank: true,
                message: "This attempt will count toward your ranking.".to_string(),
            },
            Some(prev) => {
                let next = prev.finished_at + Duration::days(RANKING_COOLDOWN_DAYS);
                if now >= next {
                    AttemptStatus {
                        can_rank: true,
                        message: "This attempt will count toward your ranking.".to_string(),
                    }
                } else {
                    let days = (next - now).num_days() + 1;
                    AttemptStatus {
                        can_rank: false,
                        message: format!(
                            "Already ranked on {}. Next ranked attempt in {} day{} ({}).",
                            prev.finished_at.format("%Y-%m-%d"),
                            days,
                            if days == 1 { "" } else { "s" },
                            next.format("%Y-%m-%d"),
                        ),
                    }
                }
            }
        })
    }

    pub fn grade_at(&self, submission: &Submission, now: DateTime<Local>) -> ServiceResult<ScoreReport> {
        let entry = self.library.entry(&submission.exercise_id)?;
        if !submission.elapsed_reading_time_ms.is_finite() || submission.elapsed_reading_time_ms <= 0.0 {
            return Err(ServiceError::Rejected {
                message: Some("reading time must be positive".to_string()),
            });
        }

        let words = WordSequence::from_text(&entry.text).len();
        let wpm = words_per_minute(words, submission.elapsed_reading_time_ms);
        let accuracy = if submission.cancelled {
            0.0
        } else if entry.questions.is_empty() {
            100.0
        } else {
            let correct = entry
                .questions
                .iter()
                .filter(|q| {
                    submission
                        .answers
                        .get(&q.id)
                        .is_some_and(|answer| q.is_correct(answer))
                })
                .count();
            correct as f64 / entry.questions.len() as f64 * 100.0
        };
        // A cancelled attempt never starts the ranking cooldown.
        let counted = !submission.cancelled && self.attempt_status_at(&entry.id, now)?.can_rank;
        let points = ranking_points(wpm, accuracy, words, counted);

        self.ledger.borrow_mut().record(&Attempt {
            exercise_id: entry.id.clone(),
            finished_at: now,
            wpm,
            accuracy,
            ranking_points: points,
            counted,
        })?;
        info!(exercise_id = %entry.id, wpm, accuracy, points, counted, "attempt graded");

        let message = if submission.cancelled {
            "Attempt cancelled: no credit awarded.".to_string()
        } else if counted {
            format!("Ranked attempt recorded: {points} points.")
        } else if entry.ranked {
            "Result saved as practice; it does not count toward your ranking.".to_string()
        } else {
            "Training result saved.".to_string()
        };
        Ok(ScoreReport {
            wpm,
            accuracy,
            ranking_points: points,
            message,
            counted_for_ranking: counted,
        })
    }
}

impl ExerciseProvider for LocalBackend {
    fn exercise(&self, id: &str) -> ServiceResult<Exercise> {
        self.library.exercise(id)
    }

    fn questions(&self, id: &str) -> ServiceResult<Vec<Question>> {
        self.library.questions(id)
    }
}

impl AttemptStatusProvider for LocalBackend {
    fn attempt_status(&self, exercise_id: &str) -> ServiceResult<AttemptStatus> {
        self.attempt_status_at(exercise_id, Local::now())
    }
}

impl ScoringEndpoint for LocalBackend {
    fn submit(&self, submission: &Submission) -> ServiceResult<ScoreReport> {
        self.grade_at(submission, Local::now())
    }
}
