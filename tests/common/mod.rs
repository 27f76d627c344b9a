// Shared fakes for driving a SessionController without a terminal.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use skimr::anticheat::{EnvironmentProbe, ViewportDims};
use skimr::config::ReaderSettings;
use skimr::error::ServiceError;
use skimr::services::{
    AttemptStatus, AttemptStatusProvider, Exercise, ExerciseProvider, ExitRecorder, Metronome,
    Question, QuestionKind, ScoreReport, ScoringEndpoint, ServiceResult, Services,
    SettingsProvider, Submission,
};
use skimr::session::SessionController;
use skimr::timer::ManualClock;

/// Knobs and recorders shared between a test and the fakes it hands out.
#[derive(Clone)]
pub struct World {
    pub clock: ManualClock,
    pub exits: ExitRecorder,
    pub submissions: Rc<RefCell<Vec<Submission>>>,
    pub clicks: Rc<Cell<usize>>,
    pub focus: Rc<Cell<bool>>,
    pub viewport: Rc<Cell<ViewportDims>>,
    pub debugger_pause_ms: Rc<Cell<u64>>,
    /// `None` makes the provider fail.
    pub settings: Option<ReaderSettings>,
    pub exercise: Option<Exercise>,
    pub questions: Option<Vec<Question>>,
    pub status: Option<AttemptStatus>,
    pub scoring_error: Rc<RefCell<Option<String>>>,
}

impl World {
    pub fn training(text: &str) -> Self {
        Self {
            clock: ManualClock::new(0),
            exits: ExitRecorder::new(),
            submissions: Rc::default(),
            clicks: Rc::default(),
            focus: Rc::new(Cell::new(true)),
            viewport: Rc::new(Cell::new(ViewportDims::uniform(1200, 800))),
            debugger_pause_ms: Rc::default(),
            settings: Some(ReaderSettings::default()),
            exercise: Some(Exercise {
                id: "ex-1".into(),
                title: "Test exercise".into(),
                text: text.into(),
                ranked: false,
                question_count: 0,
            }),
            questions: Some(vec![]),
            status: None,
            scoring_error: Rc::default(),
        }
    }

    pub fn ranked(text: &str, question_count: usize) -> Self {
        let mut world = Self::training(text);
        if let Some(ex) = world.exercise.as_mut() {
            ex.ranked = true;
            ex.question_count = question_count;
        }
        world.questions = Some(
            (1..=question_count)
                .map(|i| Question {
                    id: format!("q{i}"),
                    text: format!("Question {i}?"),
                    kind: QuestionKind::Open,
                })
                .collect(),
        );
        world.status = Some(AttemptStatus {
            can_rank: true,
            message: "counts".into(),
        });
        world
    }

    pub fn services(&self) -> Services {
        Services {
            settings: Box::new(FakeSettings(self.settings.clone())),
            exercises: Box::new(FakeExercises {
                exercise: self.exercise.clone(),
                questions: self.questions.clone(),
            }),
            attempts: Box::new(FakeAttempts(self.status.clone())),
            scoring: Box::new(FakeScoring {
                submissions: self.submissions.clone(),
                error: self.scoring_error.clone(),
            }),
            navigator: Box::new(self.exits.clone()),
            metronome: Box::new(CountingMetronome(self.clicks.clone())),
            probe: Box::new(FakeProbe {
                focus: self.focus.clone(),
                viewport: self.viewport.clone(),
                pause_ms: self.debugger_pause_ms.clone(),
            }),
            clock: Box::new(self.clock.clone()),
        }
    }

    pub fn load(&self) -> SessionController {
        SessionController::load(self.services(), "ex-1").expect("session should load")
    }

    /// Loads and starts a session at the current clock time.
    pub fn start(&self) -> SessionController {
        let mut session = self.load();
        session.start().expect("session should start");
        session
    }

    /// Moves the clock to `ms` and runs everything due.
    pub fn run_to(&self, session: &mut SessionController, ms: u64) {
        self.clock.set(ms);
        session.advance();
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.borrow().clone()
    }

    pub fn fail_scoring(&self, message: &str) {
        *self.scoring_error.borrow_mut() = Some(message.to_string());
    }
}

struct FakeSettings(Option<ReaderSettings>);

impl SettingsProvider for FakeSettings {
    fn settings(&self) -> ServiceResult<ReaderSettings> {
        self.0
            .clone()
            .ok_or_else(|| ServiceError::Unavailable("settings offline".into()))
    }
}

struct FakeExercises {
    exercise: Option<Exercise>,
    questions: Option<Vec<Question>>,
}

impl ExerciseProvider for FakeExercises {
    fn exercise(&self, id: &str) -> ServiceResult<Exercise> {
        self.exercise
            .clone()
            .ok_or_else(|| ServiceError::NotFound { id: id.to_string() })
    }

    fn questions(&self, _id: &str) -> ServiceResult<Vec<Question>> {
        self.questions
            .clone()
            .ok_or_else(|| ServiceError::Unavailable("questions offline".into()))
    }
}

struct FakeAttempts(Option<AttemptStatus>);

impl AttemptStatusProvider for FakeAttempts {
    fn attempt_status(&self, _exercise_id: &str) -> ServiceResult<AttemptStatus> {
        self.0
            .clone()
            .ok_or_else(|| ServiceError::Unavailable("status offline".into()))
    }
}

struct FakeScoring {
    submissions: Rc<RefCell<Vec<Submission>>>,
    error: Rc<RefCell<Option<String>>>,
}

impl ScoringEndpoint for FakeScoring {
    fn submit(&self, submission: &Submission) -> ServiceResult<ScoreReport> {
        self.submissions.borrow_mut().push(submission.clone());
        if let Some(message) = self.error.borrow().clone() {
            return Err(ServiceError::Rejected {
                message: Some(message),
            });
        }
        Ok(ScoreReport {
            wpm: 300,
            accuracy: 80.0,
            ranking_points: 240,
            message: "saved".into(),
            counted_for_ranking: true,
        })
    }
}

struct CountingMetronome(Rc<Cell<usize>>);

impl Metronome for CountingMetronome {
    fn click(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

struct FakeProbe {
    focus: Rc<Cell<bool>>,
    viewport: Rc<Cell<ViewportDims>>,
    pause_ms: Rc<Cell<u64>>,
}

impl EnvironmentProbe for FakeProbe {
    fn viewport(&self) -> ViewportDims {
        self.viewport.get()
    }

    fn has_focus(&self) -> bool {
        self.focus.get()
    }

    fn debugger_pause_ms(&mut self) -> u64 {
        self.pause_ms.get()
    }
}
