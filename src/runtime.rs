use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent, MouseButton, MouseEventKind};

/// Unified event type consumed by the app runner
#[derive(Clone, Debug)]
pub enum ReaderEvent {
    Key(KeyEvent),
    FocusGained,
    FocusLost,
    /// Right mouse button pressed; the terminal's context menu gesture.
    ContextMenu,
    Resize,
    Tick,
}

/// Source of terminal events (keyboard, focus, mouse, resize)
pub trait ReaderEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<ReaderEvent, RecvTimeoutError>;
}

fn translate(ev: CtEvent) -> Option<ReaderEvent> {
    match ev {
        CtEvent::Key(key) => Some(ReaderEvent::Key(key)),
        CtEvent::FocusGained => Some(ReaderEvent::FocusGained),
        CtEvent::FocusLost => Some(ReaderEvent::FocusLost),
        CtEvent::Mouse(m) if m.kind == MouseEventKind::Down(MouseButton::Right) => {
            Some(ReaderEvent::ContextMenu)
        }
        CtEvent::Resize(_, _) => Some(ReaderEvent::Resize),
        _ => None,
    }
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    rx: Receiver<ReaderEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            match event::read() {
                Ok(ev) => {
                    if let Some(ev) = translate(ev) {
                        if tx.send(ev).is_err() {
                            break;
                        }
                    }
                }
                Err(_) => break,
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ReaderEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<ReaderEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    rx: Receiver<ReaderEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<ReaderEvent>) -> Self {
        Self { rx }
    }
}

impl ReaderEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<ReaderEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the application one event/tick at a time.
///
/// Ticks only wake the loop; the session's own timer queue decides what is
/// due, so a late tick never skips or doubles a word.
pub struct Runner<E: ReaderEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: ReaderEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Waits at most one tick interval, or less when `next_due` is sooner.
    pub fn step_until(&self, next_due: Option<Duration>) -> ReaderEvent {
        let wait = match next_due {
            Some(d) => d.min(self.ticker.interval()),
            None => self.ticker.interval(),
        };
        match self.event_source.recv_timeout(wait) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => ReaderEvent::Tick,
        }
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> ReaderEvent {
        self.step_until(None)
    }
}
