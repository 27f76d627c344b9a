use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::fmt;
use std::sync::mpsc::Sender;
use tracing::{debug, info, warn};

use crate::timer::{self, FiredTimer, TimerId, TimerKind, TimerQueue};

/// Outer window vs inner viewport, in pixels (or cells for a terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewportDims {
    pub outer_width: u32,
    pub outer_height: u32,
    pub inner_width: u32,
    pub inner_height: u32,
}

impl ViewportDims {
    pub fn uniform(width: u32, height: u32) -> Self {
        Self {
            outer_width: width,
            outer_height: height,
            inner_width: width,
            inner_height: height,
        }
    }

    fn exceeds(&self, threshold: u32) -> bool {
        self.outer_width.saturating_sub(self.inner_width) > threshold
            || self.outer_height.saturating_sub(self.inner_height) > threshold
    }
}

/// Environment-specific signals behind the polling detectors. Stub it out
/// where the environment has no such notion.
pub trait EnvironmentProbe {
    fn viewport(&self) -> ViewportDims;
    fn has_focus(&self) -> bool;
    /// Runs the breakpoint-sensitive statement and returns how long it took.
    fn debugger_pause_ms(&mut self) -> u64;
}

/// A probe that never reports an anomaly.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProbe;

impl EnvironmentProbe for NullProbe {
    fn viewport(&self) -> ViewportDims {
        ViewportDims::default()
    }

    fn has_focus(&self) -> bool {
        true
    }

    fn debugger_pause_ms(&mut self) -> u64 {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    DevtoolsShortcut,
    PrintScreen,
    MacScreenshot,
    SnippingTool,
    ClipboardCopy,
    ContextMenu,
    LeftTab,
    FocusLost,
    DevtoolsOpen,
    DebuggerPaused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub quiz_mode: bool,
}

impl Violation {
    pub fn reason(&self) -> &'static str {
        match (self.kind, self.quiz_mode) {
            (ViolationKind::DevtoolsShortcut, true) => "attempted to access page code during the quiz",
            (ViolationKind::DevtoolsShortcut, false) => "attempted to open developer tools",
            (ViolationKind::PrintScreen, _) => "screenshot attempt detected (PrintScreen)",
            (ViolationKind::MacScreenshot, _) => "screenshot attempt detected (macOS shortcut)",
            (ViolationKind::SnippingTool, _) => "screenshot attempt detected (Snipping Tool)",
            (ViolationKind::ClipboardCopy, _) => "attempted to copy the text",
            (ViolationKind::ContextMenu, _) => "attempted to open the context menu",
            (ViolationKind::LeftTab, true) => "left the tab during the quiz",
            (ViolationKind::LeftTab, false) => "left the tab during the session",
            (ViolationKind::FocusLost, _) => "the window lost focus",
            (ViolationKind::DevtoolsOpen, _) => "developer tools are open",
            (ViolationKind::DebuggerPaused, _) => "an active debugger was detected",
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Receives the one and only violation of a monitor.
pub trait CancelSink {
    fn cancel(&mut self, violation: Violation);
}

impl CancelSink for Sender<Violation> {
    fn cancel(&mut self, violation: Violation) {
        // A dropped receiver means the session is already gone.
        let _ = self.send(violation);
    }
}

impl<F: FnMut(Violation)> CancelSink for F {
    fn cancel(&mut self, violation: Violation) {
        self(violation)
    }
}

/// Whether the host should let an intercepted input through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Allow,
    Prevent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Constructed with `enabled = false`; never does anything.
    Inert,
    /// Enabled but not yet armed.
    Ready,
    Armed,
    Tripped(Violation),
    /// Stopped without a violation.
    Disarmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Copy is tolerated while reviewing quiz questions.
    pub quiz_mode: bool,
    pub enabled: bool,
    pub devtools_threshold: u32,
    pub devtools_poll_ms: u64,
    pub debugger_probe_ms: u64,
    pub debugger_threshold_ms: u64,
    pub blur_grace_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            quiz_mode: false,
            enabled: true,
            devtools_threshold: 160,
            devtools_poll_ms: 1000,
            debugger_probe_ms: 3000,
            debugger_threshold_ms: 100,
            blur_grace_ms: 500,
        }
    }
}

impl MonitorConfig {
    pub fn reading(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn quiz() -> Self {
        Self {
            quiz_mode: true,
            ..Self::default()
        }
    }
}

pub struct AntiCheatMonitor {
    config: MonitorConfig,
    state: MonitorState,
    devtools_open: bool,
    devtools_poll: Option<TimerId>,
    debugger_probe: Option<TimerId>,
    blur_grace: Option<TimerId>,
    sink: Box<dyn CancelSink>,
}

impl fmt::Debug for AntiCheatMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AntiCheatMonitor")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("devtools_open", &self.devtools_open)
            .finish_non_exhaustive()
    }
}

impl AntiCheatMonitor {
    pub fn new(config: MonitorConfig, sink: impl CancelSink + 'static) -> Self {
        Self {
            config,
            state: if config.enabled {
                MonitorState::Ready
            } else {
                MonitorState::Inert
            },
            devtools_open: false,
            devtools_poll: None,
            debugger_probe: None,
            blur_grace: None,
            sink: Box::new(sink),
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn config(&self) -> MonitorConfig {
        self.config
    }

    pub fn is_listening(&self) -> bool {
        self.state == MonitorState::Armed
    }

    pub fn devtools_latched(&self) -> bool {
        self.devtools_open
    }

    /// Starts the polling probes. Only the first call from `Ready` counts.
    pub fn arm(&mut self, timers: &mut TimerQueue) {
        if self.state != MonitorState::Ready {
            return;
        }
        self.state = MonitorState::Armed;
        timer::reschedule(
            timers,
            &mut self.devtools_poll,
            TimerKind::DevtoolsPoll,
            self.config.devtools_poll_ms,
        );
        timer::reschedule(
            timers,
            &mut self.debugger_probe,
            TimerKind::DebuggerProbe,
            self.config.debugger_probe_ms,
        );
        info!(quiz_mode = self.config.quiz_mode, "anti-cheat monitor armed");
    }

    /// Removes every listener. Safe to call any number of times, in any state.
    pub fn stop(&mut self, timers: &mut TimerQueue) {
        self.clear_timers(timers);
        if matches!(self.state, MonitorState::Ready | MonitorState::Armed) {
            self.state = MonitorState::Disarmed;
            debug!("anti-cheat monitor stopped");
        }
    }

    fn clear_timers(&mut self, timers: &mut TimerQueue) {
        timer::clear(timers, &mut self.devtools_poll);
        timer::clear(timers, &mut self.debugger_probe);
        timer::clear(timers, &mut self.blur_grace);
    }

    /// Reports a violation. Returns true only for the one that trips the
    /// monitor.
    pub fn trip(&mut self, kind: ViolationKind, timers: &mut TimerQueue) -> bool {
        if self.state != MonitorState::Armed {
            return false;
        }
        let violation = Violation {
            kind,
            quiz_mode: self.config.quiz_mode,
        };
        self.state = MonitorState::Tripped(violation);
        self.clear_timers(timers);
        warn!(?kind, reason = violation.reason(), "anti-cheat monitor tripped");
        self.sink.cancel(violation);
        true
    }

    pub fn on_key(&mut self, key: &KeyEvent, timers: &mut TimerQueue) -> Disposition {
        if !self.is_listening() || key.kind == KeyEventKind::Release {
            return Disposition::Allow;
        }
        match classify_key(key) {
            Some(ViolationKind::ClipboardCopy) if self.config.quiz_mode => Disposition::Allow,
            Some(kind) => {
                self.trip(kind, timers);
                Disposition::Prevent
            }
            None => Disposition::Allow,
        }
    }

    pub fn on_copy(&mut self, timers: &mut TimerQueue) -> Disposition {
        if !self.is_listening() || self.config.quiz_mode {
            return Disposition::Allow;
        }
        self.trip(ViolationKind::ClipboardCopy, timers);
        Disposition::Prevent
    }

    pub fn on_context_menu(&mut self, timers: &mut TimerQueue) -> Disposition {
        if !self.is_listening() {
            return Disposition::Allow;
        }
        self.trip(ViolationKind::ContextMenu, timers);
        Disposition::Prevent
    }

    pub fn on_visibility_change(&mut self, hidden: bool, timers: &mut TimerQueue) {
        if hidden && self.is_listening() {
            self.trip(ViolationKind::LeftTab, timers);
        }
    }

    /// Starts the grace window; focus is checked once when it closes. A blur
    /// inside an open window does not extend it.
    pub fn on_blur(&mut self, timers: &mut TimerQueue) {
        if !self.is_listening() || self.blur_grace.is_some_and(|id| timers.is_pending(id)) {
            return;
        }
        timer::reschedule(
            timers,
            &mut self.blur_grace,
            TimerKind::BlurGrace,
            self.config.blur_grace_ms,
        );
    }

    /// Handles one of the monitor's own timers. Other timers are ignored.
    pub fn on_timer(
        &mut self,
        fired: FiredTimer,
        probe: &mut dyn EnvironmentProbe,
        timers: &mut TimerQueue,
    ) {
        match fired.kind {
            TimerKind::DevtoolsPoll if self.devtools_poll == Some(fired.id) => {
                self.devtools_poll = None;
                self.poll_devtools(probe, timers);
            }
            TimerKind::DebuggerProbe if self.debugger_probe == Some(fired.id) => {
                self.debugger_probe = None;
                self.probe_debugger(probe, timers);
            }
            TimerKind::BlurGrace if self.blur_grace == Some(fired.id) => {
                self.blur_grace = None;
                if self.is_listening() && !probe.has_focus() {
                    self.trip(ViolationKind::FocusLost, timers);
                }
            }
            _ => {}
        }
    }

    fn poll_devtools(&mut self, probe: &mut dyn EnvironmentProbe, timers: &mut TimerQueue) {
        if !self.is_listening() {
            return;
        }
        let open = probe.viewport().exceeds(self.config.devtools_threshold);
        if open && !self.devtools_open {
            self.devtools_open = true;
            if self.trip(ViolationKind::DevtoolsOpen, timers) {
                return;
            }
        } else if !open {
            self.devtools_open = false;
        }
        timer::reschedule(
            timers,
            &mut self.devtools_poll,
            TimerKind::DevtoolsPoll,
            self.config.devtools_poll_ms,
        );
    }

    fn probe_debugger(&mut self, probe: &mut dyn EnvironmentProbe, timers: &mut TimerQueue) {
        if !self.is_listening() {
            return;
        }
        let paused_ms = probe.debugger_pause_ms();
        if paused_ms > self.config.debugger_threshold_ms
            && self.trip(ViolationKind::DebuggerPaused, timers)
        {
            return;
        }
        timer::reschedule(
            timers,
            &mut self.debugger_probe,
            TimerKind::DebuggerProbe,
            self.config.debugger_probe_ms,
        );
    }
}

fn char_is(code: KeyCode, targets: &[char]) -> bool {
    match code {
        KeyCode::Char(c) => targets.contains(&c.to_ascii_lowercase()),
        _ => false,
    }
}

/// Maps a key chord onto the violation it signals, if any.
pub fn classify_key(key: &KeyEvent) -> Option<ViolationKind> {
    let m = key.modifiers;
    let ctrl = m.contains(KeyModifiers::CONTROL);
    let shift = m.contains(KeyModifiers::SHIFT);
    let alt = m.contains(KeyModifiers::ALT);
    let meta = m.intersects(KeyModifiers::SUPER | KeyModifiers::META);

    // F12, Ctrl+Shift+I/J/C, Cmd+Alt+I/J/C, Ctrl+U
    if key.code == KeyCode::F(12)
        || (ctrl && shift && char_is(key.code, &['i', 'j', 'c']))
        || (meta && alt && char_is(key.code, &['i', 'j', 'c']))
        || (ctrl && char_is(key.code, &['u']))
    {
        return Some(ViolationKind::DevtoolsShortcut);
    }

    if key.code == KeyCode::PrintScreen {
        return Some(ViolationKind::PrintScreen);
    }

    // Cmd+Shift+3/4/5; shifted digits arrive as symbols on some terminals
    if meta && shift && char_is(key.code, &['3', '4', '5', '#', '$', '%']) {
        return Some(ViolationKind::MacScreenshot);
    }

    if meta && shift && char_is(key.code, &['s']) {
        return Some(ViolationKind::SnippingTool);
    }

    if (ctrl || meta) && char_is(key.code, &['c']) {
        return Some(ViolationKind::ClipboardCopy);
    }

    None
}
