use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, info};

use crate::timer::{self, TimerId, TimerKind, TimerQueue};

/// Seconds of quiz time granted per question.
pub const SECONDS_PER_QUESTION: u32 = 20;
const SECOND_MS: u64 = 1000;

/// Question id -> current answer.
pub type AnswerMap = BTreeMap<String, String>;

/// Shared handle on the reader's answers.
///
/// Deferred callbacks (countdown expiry) read through the cell when they
/// fire, so they always see the latest edit rather than a snapshot taken
/// when they were registered.
#[derive(Debug, Clone, Default)]
pub struct AnswerCell {
    inner: Rc<RefCell<AnswerMap>>,
}

impl AnswerCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, question_id: impl Into<String>, answer: impl Into<String>) {
        self.inner
            .borrow_mut()
            .insert(question_id.into(), answer.into());
    }

    pub fn get(&self, question_id: &str) -> Option<String> {
        self.inner.borrow().get(question_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    /// Copy of the answers as they are right now.
    pub fn snapshot(&self) -> AnswerMap {
        self.inner.borrow().clone()
    }
}

/// One-shot latch shared by every path that can submit a quiz.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SubmitGate {
    closed: bool,
}

impl SubmitGate {
    /// Returns true for the first caller only.
    pub fn try_close(&mut self) -> bool {
        !std::mem::replace(&mut self.closed, true)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizTimerState {
    pub remaining_seconds: u32,
    pub total_seconds: u32,
    pub expired: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountdownEvent {
    Tick { remaining_seconds: u32 },
    /// Time is up; carries the answers held at the moment of expiry.
    Expired { answers: AnswerMap },
}

/// Once-per-second countdown bounding the quiz.
#[derive(Debug)]
pub struct QuizCountdown {
    state: QuizTimerState,
    answers: AnswerCell,
    pending: Option<TimerId>,
    stopped: bool,
}

impl QuizCountdown {
    pub fn new(question_count: usize, answers: AnswerCell) -> Self {
        let total_seconds = SECONDS_PER_QUESTION.saturating_mul(question_count as u32);
        Self {
            state: QuizTimerState {
                remaining_seconds: total_seconds,
                total_seconds,
                expired: false,
            },
            answers,
            pending: None,
            stopped: false,
        }
    }

    pub fn state(&self) -> QuizTimerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.pending.is_some()
    }

    pub fn start(&mut self, timers: &mut TimerQueue) {
        if self.stopped || self.state.expired {
            return;
        }
        timer::reschedule(timers, &mut self.pending, TimerKind::QuizSecond, SECOND_MS);
        info!(total_seconds = self.state.total_seconds, "quiz countdown started");
    }

    pub fn on_tick(&mut self, id: TimerId, timers: &mut TimerQueue) -> Option<CountdownEvent> {
        if self.pending != Some(id) {
            return None;
        }
        self.pending = None;
        if self.stopped || self.state.expired {
            return None;
        }

        if self.state.remaining_seconds <= 1 {
            self.state.remaining_seconds = 0;
            self.state.expired = true;
            let answers = self.answers.snapshot();
            info!(answered = answers.len(), "quiz countdown expired");
            return Some(CountdownEvent::Expired { answers });
        }

        self.state.remaining_seconds -= 1;
        timer::reschedule(timers, &mut self.pending, TimerKind::QuizSecond, SECOND_MS);
        Some(CountdownEvent::Tick {
            remaining_seconds: self.state.remaining_seconds,
        })
    }

    /// Stops ticking for good. Idempotent.
    pub fn stop(&mut self, timers: &mut TimerQueue) {
        timer::clear(timers, &mut self.pending);
        if !self.stopped {
            self.stopped = true;
            debug!(remaining = self.state.remaining_seconds, "quiz countdown stopped");
        }
    }
}

/// `m:ss` rendering of a second count.
pub fn format_clock(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
