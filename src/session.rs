use crossterm::event::KeyEvent;
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::anticheat::{AntiCheatMonitor, Disposition, MonitorConfig, MonitorState, Violation};
use crate::config::{ReaderSettings, ReadingMode};
use crate::delay::{display_wpm, reported_reading_time_ms};
use crate::error::{Result, SessionError};
use crate::pacing::{PacingClock, PacingEvent, PacingState};
use crate::quiz::{AnswerCell, AnswerMap, CountdownEvent, QuizCountdown, QuizTimerState, SubmitGate};
use crate::services::{
    AttemptStatus, Exercise, Question, ScoreReport, ServiceResult, Services, SessionExit, Submission,
};
use crate::text::WordSequence;
use crate::timer::{TimerKind, TimerQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Scored,
    Failed,
    CheatCancelled,
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Loaded, clock not started yet.
    Ready,
    Reading,
    Quiz,
    Finished(Outcome),
}

pub struct SessionController {
    services: Services,
    settings: ReaderSettings,
    exercise: Exercise,
    attempt_status: Option<AttemptStatus>,
    words: WordSequence,
    timers: TimerQueue,
    pacing: PacingClock,
    monitor: AntiCheatMonitor,
    violation_tx: Sender<Violation>,
    violations: Receiver<Violation>,
    questions: Vec<Question>,
    answers: AnswerCell,
    countdown: Option<QuizCountdown>,
    gate: SubmitGate,
    cheating: bool,
    phase: Phase,
    reported_time_ms: f64,
    report: Option<ScoreReport>,
    exit: Option<SessionExit>,
}

impl SessionController {
    /// Loads settings, then the exercise and its attempt status.
    ///
    /// Settings failures fall back to defaults. Exercise failures (and texts
    /// without a single word) are fatal: the router is told and nothing
    /// starts.
    pub fn load(mut services: Services, exercise_id: &str) -> Result<Self> {
        let settings = match services.settings.settings() {
            Ok(s) => s.sanitized(),
            Err(e) => {
                warn!(error = %e, "reader settings unavailable, using defaults");
                ReaderSettings::default()
            }
        };

        let exercise = match services.exercises.exercise(exercise_id) {
            Ok(ex) => ex,
            Err(source) => {
                warn!(exercise_id, error = %source, "exercise load failed");
                services.navigator.session_over(SessionExit::Failed {
                    message: format!("could not load exercise: {source}"),
                });
                return Err(SessionError::ExerciseLoad {
                    id: exercise_id.to_string(),
                    source,
                });
            }
        };

        let words = WordSequence::from_text(&exercise.text);
        if words.is_empty() {
            services.navigator.session_over(SessionExit::Failed {
                message: "this exercise has no text to read".to_string(),
            });
            return Err(SessionError::EmptyText {
                id: exercise.id.clone(),
            });
        }

        let attempt_status = if exercise.ranked {
            match services.attempts.attempt_status(&exercise.id) {
                Ok(status) => Some(status),
                Err(e) => {
                    warn!(error = %e, "attempt status unavailable, treating as training run");
                    Some(AttemptStatus {
                        can_rank: false,
                        message: "ranking status unavailable; this run is training only".into(),
                    })
                }
            }
        } else {
            None
        };

        let timers = TimerQueue::new(services.clock.now_ms());
        let pacing = PacingClock::new(settings.speed_ms, settings.chunk_size, settings.mode);
        let (violation_tx, violations) = mpsc::channel();
        let ranked_attempt = attempt_status.as_ref().is_some_and(|s| s.can_rank);
        let monitor = AntiCheatMonitor::new(MonitorConfig::reading(ranked_attempt), violation_tx.clone());

        info!(
            exercise_id = %exercise.id,
            words = words.len(),
            ranked = exercise.ranked,
            ranked_attempt,
            speed_ms = settings.speed_ms,
            mode = %settings.mode,
            "session loaded"
        );

        Ok(Self {
            services,
            settings,
            exercise,
            attempt_status,
            words,
            timers,
            pacing,
            monitor,
            violation_tx,
            violations,
            questions: Vec::new(),
            answers: AnswerCell::new(),
            countdown: None,
            gate: SubmitGate::default(),
            cheating: false,
            phase: Phase::Ready,
            reported_time_ms: 0.0,
            report: None,
            exit: None,
        })
    }

    // ---- accessors ----

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    pub fn exercise(&self) -> &Exercise {
        &self.exercise
    }

    pub fn attempt_status(&self) -> Option<&AttemptStatus> {
        self.attempt_status.as_ref()
    }

    pub fn words(&self) -> &WordSequence {
        &self.words
    }

    pub fn pacing(&self) -> PacingState {
        self.pacing.state()
    }

    pub fn cursor(&self) -> usize {
        self.pacing.cursor()
    }

    pub fn current_word(&self) -> Option<&str> {
        self.words.get(self.pacing.cursor())
    }

    pub fn mode(&self) -> ReadingMode {
        self.settings.mode
    }

    pub fn monitor_state(&self) -> MonitorState {
        self.monitor.state()
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn answers(&self) -> &AnswerCell {
        &self.answers
    }

    pub fn quiz_timer(&self) -> Option<QuizTimerState> {
        self.countdown.as_ref().map(QuizCountdown::state)
    }

    pub fn report(&self) -> Option<&ScoreReport> {
        self.report.as_ref()
    }

    pub fn exit(&self) -> Option<&SessionExit> {
        self.exit.as_ref()
    }

    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    /// Reading time that was (or will be) reported to the grader.
    pub fn reported_time_ms(&self) -> f64 {
        self.reported_time_ms
    }

    /// Ranked exercise whose attempt still counts: ends in a monitored quiz.
    pub fn is_ranked_attempt(&self) -> bool {
        self.exercise.ranked && self.attempt_status.as_ref().is_some_and(|s| s.can_rank)
    }

    pub fn can_pause(&self) -> bool {
        self.phase == Phase::Reading && !self.is_ranked_attempt() && !self.pacing.has_ended()
    }

    pub fn progress_percent(&self) -> f64 {
        if self.words.is_empty() {
            return 0.0;
        }
        self.pacing.cursor() as f64 / self.words.len() as f64 * 100.0
    }

    pub fn words_remaining(&self) -> usize {
        self.words.len().saturating_sub(self.pacing.cursor())
    }

    pub fn estimated_seconds_left(&self) -> u64 {
        (self.words_remaining() as u64 * self.settings.speed_ms).div_ceil(1000)
    }

    pub fn configured_wpm(&self) -> u64 {
        display_wpm(self.settings.speed_ms)
    }

    /// Words per minute actually achieved so far, by wall clock.
    pub fn live_wpm(&self) -> u64 {
        let elapsed = self
            .services
            .clock
            .now_ms()
            .saturating_sub(self.pacing.started_at_ms());
        if elapsed == 0 || self.phase != Phase::Reading {
            return 0;
        }
        (self.pacing.cursor() as f64 / (elapsed as f64 / 60_000.0)).round() as u64
    }

    // ---- driving ----

    fn sync(&mut self) {
        let now = self.services.clock.now_ms();
        self.timers.sync(now);
    }

    fn click(&mut self) {
        if !self.settings.muted && self.settings.mode != ReadingMode::Chunking {
            self.services.metronome.click();
        }
    }

    /// Arms the reading-phase monitor and starts pacing.
    pub fn start(&mut self) -> Result<()> {
        if self.phase != Phase::Ready {
            return Err(SessionError::InvalidPhase {
                action: "start",
                phase: self.phase,
            });
        }
        self.sync();
        self.phase = Phase::Reading;
        self.monitor.arm(&mut self.timers);
        self.pacing.start(&self.words, &mut self.timers);
        self.click();
        Ok(())
    }

    /// Runs every timer due by the clock's current time, in deadline order.
    pub fn advance(&mut self) {
        let now = self.services.clock.now_ms();
        while let Some(fired) = self.timers.pop_due(now) {
            match fired.kind {
                TimerKind::PacingTick => {
                    if self.cheating {
                        continue;
                    }
                    match self.pacing.on_tick(fired.id, &self.words, &mut self.timers) {
                        Some(PacingEvent::Advanced { .. }) => self.click(),
                        Some(PacingEvent::Completed) => self.finish_reading(),
                        None => {}
                    }
                }
                TimerKind::QuizSecond => {
                    if self.cheating {
                        continue;
                    }
                    let event = self
                        .countdown
                        .as_mut()
                        .and_then(|c| c.on_tick(fired.id, &mut self.timers));
                    if let Some(CountdownEvent::Expired { answers }) = event {
                        info!("quiz time is up, submitting held answers");
                        self.submit_quiz(answers);
                    }
                }
                TimerKind::DevtoolsPoll | TimerKind::DebuggerProbe | TimerKind::BlurGrace => {
                    self.monitor
                        .on_timer(fired, self.services.probe.as_mut(), &mut self.timers);
                }
            }
            self.drain_violations();
        }
        self.timers.sync(now);
    }

    fn drain_violations(&mut self) {
        while let Ok(violation) = self.violations.try_recv() {
            self.handle_cheating(violation);
        }
    }

    // ---- host input, routed through the monitor ----

    pub fn on_key(&mut self, key: &KeyEvent) -> Disposition {
        self.sync();
        let verdict = self.monitor.on_key(key, &mut self.timers);
        self.drain_violations();
        verdict
    }

    pub fn on_copy(&mut self) -> Disposition {
        self.sync();
        let verdict = self.monitor.on_copy(&mut self.timers);
        self.drain_violations();
        verdict
    }

    pub fn on_context_menu(&mut self) -> Disposition {
        self.sync();
        let verdict = self.monitor.on_context_menu(&mut self.timers);
        self.drain_violations();
        verdict
    }

    pub fn on_visibility_change(&mut self, hidden: bool) {
        self.sync();
        self.monitor.on_visibility_change(hidden, &mut self.timers);
        self.drain_violations();
    }

    pub fn on_blur(&mut self) {
        self.sync();
        self.monitor.on_blur(&mut self.timers);
    }

    // ---- reader controls ----

    pub fn pause(&mut self) -> Result<()> {
        if self.phase != Phase::Reading {
            return Err(SessionError::InvalidPhase {
                action: "pause",
                phase: self.phase,
            });
        }
        if self.is_ranked_attempt() {
            return Err(SessionError::PauseLocked);
        }
        self.sync();
        self.pacing.pause(&mut self.timers);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.phase != Phase::Reading {
            return Err(SessionError::InvalidPhase {
                action: "resume",
                phase: self.phase,
            });
        }
        self.sync();
        if self.pacing.is_paused() {
            self.pacing.resume(&self.words, &mut self.timers);
            self.click();
        }
        Ok(())
    }

    pub fn toggle_pause(&mut self) -> Result<()> {
        if self.pacing.is_paused() {
            self.resume()
        } else {
            self.pause()
        }
    }

    /// Back to the first word with fresh timers and a fresh monitor.
    pub fn restart(&mut self) -> Result<()> {
        if self.phase != Phase::Reading {
            return Err(SessionError::InvalidPhase {
                action: "restart",
                phase: self.phase,
            });
        }
        self.sync();
        self.monitor.stop(&mut self.timers);
        while self.violations.try_recv().is_ok() {}
        self.monitor = AntiCheatMonitor::new(self.monitor.config(), self.violation_tx.clone());
        self.monitor.arm(&mut self.timers);
        self.pacing.restart(&self.words, &mut self.timers);
        self.click();
        info!("session restarted");
        Ok(())
    }

    /// Leaves the session. Safe to call in any phase.
    pub fn exit_session(&mut self) {
        self.stop_all();
        if !matches!(self.phase, Phase::Finished(_)) {
            info!("session abandoned by reader");
            self.finish(Outcome::Abandoned, SessionExit::Abandoned);
        }
    }

    // ---- quiz ----

    pub fn answer(&mut self, question_id: &str, value: impl Into<String>) -> Result<()> {
        if self.phase != Phase::Quiz || self.gate.is_closed() {
            return Err(SessionError::InvalidPhase {
                action: "answer",
                phase: self.phase,
            });
        }
        self.answers.set(question_id, value);
        Ok(())
    }

    /// Manual "check answers". Shares the submit-once latch with expiry.
    pub fn check_answers(&mut self) -> Result<()> {
        if self.phase != Phase::Quiz {
            return Err(SessionError::InvalidPhase {
                action: "check answers",
                phase: self.phase,
            });
        }
        self.sync();
        let answers = self.answers.snapshot();
        self.submit_quiz(answers);
        Ok(())
    }

    // ---- transitions ----

    fn stop_all(&mut self) {
        self.monitor.stop(&mut self.timers);
        self.pacing.halt(&mut self.timers);
        if let Some(countdown) = self.countdown.as_mut() {
            countdown.stop(&mut self.timers);
        }
    }

    fn finish(&mut self, outcome: Outcome, exit: SessionExit) {
        self.phase = Phase::Finished(outcome);
        self.exit = Some(exit.clone());
        self.services.navigator.session_over(exit);
    }

    fn submit(&self, answers: AnswerMap, cancelled: bool) -> ServiceResult<ScoreReport> {
        let submission = Submission {
            exercise_id: self.exercise.id.clone(),
            elapsed_reading_time_ms: self.reported_time_ms,
            answers,
            cancelled,
        };
        self.services.scoring.submit(&submission)
    }

    fn finish_reading(&mut self) {
        if self.cheating || self.phase != Phase::Reading {
            return;
        }
        self.monitor.stop(&mut self.timers);
        self.reported_time_ms = reported_reading_time_ms(self.words.len(), self.settings.speed_ms);
        info!(
            reported_time_ms = self.reported_time_ms,
            words = self.words.len(),
            "reading finished"
        );

        if self.is_ranked_attempt() {
            self.enter_quiz();
        } else {
            self.submit_training();
        }
    }

    fn enter_quiz(&mut self) {
        match self.services.exercises.questions(&self.exercise.id) {
            Ok(questions) => {
                info!(questions = questions.len(), "entering quiz");
                self.questions = questions;
                self.phase = Phase::Quiz;
                self.monitor = AntiCheatMonitor::new(MonitorConfig::quiz(), self.violation_tx.clone());
                self.monitor.arm(&mut self.timers);
                let mut countdown = QuizCountdown::new(self.questions.len(), self.answers.clone());
                countdown.start(&mut self.timers);
                self.countdown = Some(countdown);
            }
            Err(e) => {
                warn!(error = %e, "quiz questions unavailable");
                self.stop_all();
                self.finish(
                    Outcome::Failed,
                    SessionExit::Failed {
                        message: "could not load the quiz questions, please try again".into(),
                    },
                );
            }
        }
    }

    fn submit_training(&mut self) {
        self.stop_all();
        match self.submit(AnswerMap::new(), false) {
            Ok(report) => {
                info!(wpm = report.wpm, "training result saved");
                self.report = Some(report.clone());
                self.finish(Outcome::Scored, SessionExit::Completed(report));
            }
            Err(e) => {
                warn!(error = %e, "training result not saved");
                self.finish(
                    Outcome::Failed,
                    SessionExit::Failed {
                        message: format!(
                            "training finished, but progress was not saved: {}",
                            e.user_message()
                        ),
                    },
                );
            }
        }
    }

    fn submit_quiz(&mut self, answers: AnswerMap) {
        if self.cheating || self.phase != Phase::Quiz || !self.gate.try_close() {
            debug!("quiz submission ignored, already submitted or cancelled");
            return;
        }
        self.stop_all();
        match self.submit(answers, false) {
            Ok(report) => {
                info!(
                    wpm = report.wpm,
                    accuracy = report.accuracy,
                    points = report.ranking_points,
                    "quiz result saved"
                );
                self.report = Some(report.clone());
                self.finish(Outcome::Scored, SessionExit::Completed(report));
            }
            Err(e) => {
                warn!(error = %e, "quiz submission failed");
                self.finish(
                    Outcome::Failed,
                    SessionExit::Failed {
                        message: e.user_message(),
                    },
                );
            }
        }
    }

    /// The single cancellation path. Finalizes the attempt with zero credit
    /// and surfaces the reason; a failing grader is logged, not retried.
    fn handle_cheating(&mut self, violation: Violation) {
        if self.cheating || matches!(self.phase, Phase::Finished(_)) || self.gate.is_closed() {
            return;
        }
        self.cheating = true;
        self.stop_all();

        if self.reported_time_ms == 0.0 {
            self.reported_time_ms = reported_reading_time_ms(self.words.len(), self.settings.speed_ms);
        }
        if let Err(e) = self.submit(AnswerMap::new(), true) {
            warn!(error = %e, "zero-credit submission after violation failed");
        }

        self.finish(
            Outcome::CheatCancelled,
            SessionExit::CheatCancelled {
                reason: violation.reason().to_string(),
            },
        );
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop_all();
    }
}
