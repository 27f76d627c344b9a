use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

use crate::anticheat::EnvironmentProbe;
use crate::config::ReaderSettings;
use crate::error::ServiceError;
use crate::quiz::AnswerMap;
use crate::timer::Clock;

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: String,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub ranked: bool,
    #[serde(default)]
    pub question_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptStatus {
    pub can_rank: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "question_type", rename_all = "lowercase")]
pub enum QuestionKind {
    Choice { options: Vec<String> },
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub exercise_id: String,
    pub elapsed_reading_time_ms: f64,
    pub answers: AnswerMap,
    /// Integrity violation: grade as zero credit whatever the answers say.
    #[serde(default)]
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub wpm: u32,
    pub accuracy: f64,
    pub ranking_points: u32,
    pub message: String,
    pub counted_for_ranking: bool,
}

/// How a session ended, handed to the router.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionExit {
    Completed(ScoreReport),
    /// Loading or submission failed; `message` is shown to the reader.
    Failed { message: String },
    CheatCancelled { reason: String },
    /// The reader left before finishing.
    Abandoned,
}

pub trait SettingsProvider {
    fn settings(&self) -> ServiceResult<ReaderSettings>;
}

pub trait ExerciseProvider {
    fn exercise(&self, id: &str) -> ServiceResult<Exercise>;
    fn questions(&self, id: &str) -> ServiceResult<Vec<Question>>;
}

pub trait AttemptStatusProvider {
    fn attempt_status(&self, exercise_id: &str) -> ServiceResult<AttemptStatus>;
}

/// Authoritative grader. Never retried by the engine.
pub trait ScoringEndpoint {
    fn submit(&self, submission: &Submission) -> ServiceResult<ScoreReport>;
}

pub trait Navigator {
    fn session_over(&mut self, exit: SessionExit);
}

/// Audible cue played when a new word is scheduled.
pub trait Metronome {
    fn click(&mut self);
}

/// Navigator that remembers every exit it is handed. Clones share history.
#[derive(Debug, Default, Clone)]
pub struct ExitRecorder {
    exits: Rc<RefCell<Vec<SessionExit>>>,
}

impl ExitRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<SessionExit> {
        self.exits.borrow().last().cloned()
    }

    pub fn all(&self) -> Vec<SessionExit> {
        self.exits.borrow().clone()
    }
}

impl Navigator for ExitRecorder {
    fn session_over(&mut self, exit: SessionExit) {
        self.exits.borrow_mut().push(exit);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SilentMetronome;

impl Metronome for SilentMetronome {
    fn click(&mut self) {}
}

impl<T: SettingsProvider + ?Sized> SettingsProvider for Rc<T> {
    fn settings(&self) -> ServiceResult<ReaderSettings> {
        (**self).settings()
    }
}

impl<T: ExerciseProvider + ?Sized> ExerciseProvider for Rc<T> {
    fn exercise(&self, id: &str) -> ServiceResult<Exercise> {
        (**self).exercise(id)
    }

    fn questions(&self, id: &str) -> ServiceResult<Vec<Question>> {
        (**self).questions(id)
    }
}

impl<T: AttemptStatusProvider + ?Sized> AttemptStatusProvider for Rc<T> {
    fn attempt_status(&self, exercise_id: &str) -> ServiceResult<AttemptStatus> {
        (**self).attempt_status(exercise_id)
    }
}

impl<T: ScoringEndpoint + ?Sized> ScoringEndpoint for Rc<T> {
    fn submit(&self, submission: &Submission) -> ServiceResult<ScoreReport> {
        (**self).submit(submission)
    }
}

/// Everything a [`crate::session::SessionController`] needs from the outside.
pub struct Services {
    pub settings: Box<dyn SettingsProvider>,
    pub exercises: Box<dyn ExerciseProvider>,
    pub attempts: Box<dyn AttemptStatusProvider>,
    pub scoring: Box<dyn ScoringEndpoint>,
    pub navigator: Box<dyn Navigator>,
    pub metronome: Box<dyn Metronome>,
    pub probe: Box<dyn EnvironmentProbe>,
    pub clock: Box<dyn Clock>,
}
