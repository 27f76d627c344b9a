use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Instant;

/// Source of monotonic milliseconds.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Wall-clock time since construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock for headless runs and tests. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

/// Which timer line a scheduled callback belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    PacingTick,
    QuizSecond,
    DevtoolsPoll,
    DebuggerProbe,
    BlurGrace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredTimer {
    pub id: TimerId,
    pub kind: TimerKind,
    pub due_ms: u64,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    now_ms: u64,
    next_id: u64,
    // Keyed by (deadline, id) so equal deadlines fire in scheduling order.
    pending: BTreeMap<(u64, TimerId), TimerKind>,
}

impl TimerQueue {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms,
            ..Self::default()
        }
    }

    /// Time new timers are scheduled relative to.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Moves the queue's notion of now forward. Never moves backwards.
    pub fn sync(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }

    pub fn schedule(&mut self, kind: TimerKind, delay_ms: u64) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.pending.insert((self.now_ms.saturating_add(delay_ms), id), kind);
        id
    }

    /// Returns true if the timer was still pending.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let key = self.pending.keys().find(|(_, tid)| *tid == id).copied();
        match key {
            Some(key) => self.pending.remove(&key).is_some(),
            None => false,
        }
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.pending.keys().any(|(_, tid)| *tid == id)
    }

    /// Pops the earliest timer due at or before `until_ms`, moving the queue's
    /// clock to its deadline so reschedules from its handler do not drift.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<FiredTimer> {
        let (&(due_ms, id), _) = self.pending.first_key_value()?;
        if due_ms > until_ms {
            return None;
        }
        let kind = self.pending.remove(&(due_ms, id))?;
        self.sync(due_ms);
        Some(FiredTimer { id, kind, due_ms })
    }

    /// Deadline of the earliest pending timer.
    pub fn next_due(&self) -> Option<u64> {
        self.pending.keys().next().map(|(due, _)| *due)
    }

    pub fn live_count(&self) -> usize {
        self.pending.len()
    }

    pub fn live_count_of(&self, kind: TimerKind) -> usize {
        self.pending.values().filter(|k| **k == kind).count()
    }
}

/// Cancels `slot`'s timer, if any, and schedules a replacement in it.
pub fn reschedule(
    timers: &mut TimerQueue,
    slot: &mut Option<TimerId>,
    kind: TimerKind,
    delay_ms: u64,
) {
    clear(timers, slot);
    *slot = Some(timers.schedule(kind, delay_ms));
}

/// Cancels `slot`'s timer, if any.
pub fn clear(timers: &mut TimerQueue, slot: &mut Option<TimerId>) {
    if let Some(id) = slot.take() {
        timers.cancel(id);
    }
}
