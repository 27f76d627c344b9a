use tracing::{debug, info};

use crate::config::ReadingMode;
use crate::delay::{chunk_delay_ms, word_delay_ms};
use crate::text::WordSequence;
use crate::timer::{self, TimerId, TimerKind, TimerQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingState {
    pub cursor: usize,
    pub base_pace_ms: u64,
    pub chunk_size: usize,
    pub paused: bool,
    pub ended: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingEvent {
    Advanced { cursor: usize, next_delay_ms: u64 },
    /// The cursor reached the end. Fires once per start/restart.
    Completed,
}

/// Self-rescheduling word cursor.
///
/// Owns at most one pending [`TimerKind::PacingTick`]. Every schedule goes
/// through [`timer::reschedule`], which cancels the previous tick first.
#[derive(Debug)]
pub struct PacingClock {
    state: PacingState,
    mode: ReadingMode,
    pending: Option<TimerId>,
    started: bool,
    halted: bool,
    started_at_ms: u64,
}

impl PacingClock {
    pub fn new(base_pace_ms: u64, chunk_size: usize, mode: ReadingMode) -> Self {
        Self {
            state: PacingState {
                cursor: 0,
                base_pace_ms: base_pace_ms.max(1),
                chunk_size: chunk_size.max(1),
                paused: false,
                ended: false,
            },
            mode,
            pending: None,
            started: false,
            halted: false,
            started_at_ms: 0,
        }
    }

    pub fn state(&self) -> PacingState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.state.cursor
    }

    pub fn mode(&self) -> ReadingMode {
        self.mode
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    pub fn has_ended(&self) -> bool {
        self.state.ended
    }

    pub fn has_pending_tick(&self) -> bool {
        self.pending.is_some()
    }

    /// Reading-time baseline, reset by [`PacingClock::restart`].
    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    fn step(&self) -> usize {
        match self.mode {
            ReadingMode::Chunking => self.state.chunk_size,
            ReadingMode::Rsvp | ReadingMode::Highlight => 1,
        }
    }

    /// Delay before leaving the word (or chunk) at the cursor.
    pub fn delay_at_cursor(&self, words: &WordSequence) -> u64 {
        match self.mode {
            ReadingMode::Chunking => chunk_delay_ms(self.state.base_pace_ms, self.state.chunk_size),
            ReadingMode::Rsvp | ReadingMode::Highlight => {
                word_delay_ms(words.get(self.state.cursor).unwrap_or(""), self.state.base_pace_ms)
            }
        }
    }

    fn schedule_next(&mut self, words: &WordSequence, timers: &mut TimerQueue) -> u64 {
        let delay = self.delay_at_cursor(words);
        timer::reschedule(timers, &mut self.pending, TimerKind::PacingTick, delay);
        delay
    }

    /// Begins scheduling. An empty sequence never schedules and never
    /// completes; returns false in that case.
    pub fn start(&mut self, words: &WordSequence, timers: &mut TimerQueue) -> bool {
        self.started = true;
        self.started_at_ms = timers.now_ms();
        if words.is_empty() {
            debug!("pacing clock not started: empty word sequence");
            return false;
        }
        let delay = self.schedule_next(words, timers);
        info!(
            words = words.len(),
            base_pace_ms = self.state.base_pace_ms,
            mode = %self.mode,
            first_delay_ms = delay,
            "pacing clock started"
        );
        true
    }

    /// Handles a fired pacing tick. Ticks that are not the clock's current
    /// pending timer are ignored.
    pub fn on_tick(
        &mut self,
        id: TimerId,
        words: &WordSequence,
        timers: &mut TimerQueue,
    ) -> Option<PacingEvent> {
        if self.pending != Some(id) {
            return None;
        }
        self.pending = None;
        if self.halted || self.state.paused || self.state.ended {
            return None;
        }

        self.state.cursor = (self.state.cursor + self.step()).min(words.len());

        if self.state.cursor >= words.len() {
            self.state.ended = true;
            info!(cursor = self.state.cursor, "pacing clock completed");
            return Some(PacingEvent::Completed);
        }

        let next_delay_ms = self.schedule_next(words, timers);
        Some(PacingEvent::Advanced {
            cursor: self.state.cursor,
            next_delay_ms,
        })
    }

    /// Cancels the pending tick, keeping the cursor. No-op once ended.
    pub fn pause(&mut self, timers: &mut TimerQueue) {
        if self.state.ended || self.state.paused || self.halted {
            return;
        }
        timer::clear(timers, &mut self.pending);
        self.state.paused = true;
        debug!(cursor = self.state.cursor, "pacing clock paused");
    }

    /// Reschedules from the current cursor as if freshly starting there.
    pub fn resume(&mut self, words: &WordSequence, timers: &mut TimerQueue) {
        if !self.state.paused || self.state.ended || self.halted {
            return;
        }
        self.state.paused = false;
        if self.started && !words.is_empty() {
            self.schedule_next(words, timers);
        }
        debug!(cursor = self.state.cursor, "pacing clock resumed");
    }

    /// Back to the first word with a fresh reading-time baseline.
    pub fn restart(&mut self, words: &WordSequence, timers: &mut TimerQueue) {
        timer::clear(timers, &mut self.pending);
        self.state.cursor = 0;
        self.state.ended = false;
        self.state.paused = false;
        self.halted = false;
        info!("pacing clock restarted");
        self.start(words, timers);
    }

    /// Stops scheduling for good (until a restart).
    pub fn halt(&mut self, timers: &mut TimerQueue) {
        timer::clear(timers, &mut self.pending);
        self.halted = true;
    }
}
