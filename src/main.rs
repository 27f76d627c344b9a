mod ui;

use std::{
    cell::Cell,
    error::Error,
    fs::OpenOptions,
    io::{self, stdin, Write},
    path::PathBuf,
    rc::Rc,
    sync::Mutex,
    time::{Duration, Instant},
};

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{
        DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture, KeyCode,
        KeyEvent, KeyEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use skimr::{
    anticheat::{Disposition, EnvironmentProbe, ViewportDims},
    app_dirs::AppDirs,
    config::{ConfigStore, FileConfigStore, LayeredSettings, ReadingMode, SettingsOverrides},
    ledger::{Ledger, LocalBackend},
    library::Library,
    runtime::{CrosstermEventSource, FixedTicker, ReaderEvent, Runner},
    services::{ExitRecorder, Metronome, QuestionKind, Services},
    session::{Phase, SessionController},
    timer::{Clock, MonotonicClock},
};

const TICK_RATE_MS: u64 = 10;

/// terminal speed-reading trainer with paced rsvp, timed quizzes and integrity checks
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A terminal speed-reading trainer. Words are paced by length and punctuation; ranked exercises end in a timed quiz and are cancelled on copy, devtools shortcuts or leaving the terminal."
)]
pub struct Cli {
    /// exercise id from the bundled library, or a path to an exercise json file
    #[clap(short = 'e', long, default_value = "warmup")]
    exercise: String,

    /// base display time per word in milliseconds
    #[clap(short = 's', long)]
    speed_ms: Option<u64>,

    /// presentation mode
    #[clap(short = 'm', long, value_enum)]
    mode: Option<ReadingMode>,

    /// words per chunk in chunking mode
    #[clap(short = 'c', long)]
    chunk_size: Option<usize>,

    /// silence the per-word click
    #[clap(long)]
    muted: bool,

    /// list bundled exercises and exit
    #[clap(long)]
    list: bool,

    /// persist the given reading options as the new defaults
    #[clap(long)]
    save: bool,
}

impl Cli {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            speed_ms: self.speed_ms,
            mode: self.mode,
            chunk_size: self.chunk_size,
            muted: self.muted,
        }
    }
}

/// Terminal stand-in for the browser signals the monitor polls. A terminal
/// has no separate inner viewport, so the size heuristic never fires here.
struct TerminalProbe {
    focused: Rc<Cell<bool>>,
    size: Rc<Cell<(u16, u16)>>,
}

impl EnvironmentProbe for TerminalProbe {
    fn viewport(&self) -> ViewportDims {
        let (w, h) = self.size.get();
        ViewportDims::uniform(w as u32, h as u32)
    }

    fn has_focus(&self) -> bool {
        self.focused.get()
    }

    fn debugger_pause_ms(&mut self) -> u64 {
        let started = Instant::now();
        std::hint::black_box(started);
        started.elapsed().as_millis() as u64
    }
}

/// Rings the terminal bell.
struct BellMetronome;

impl Metronome for BellMetronome {
    fn click(&mut self) {
        let mut out = io::stdout();
        if let Err(e) = out.write_all(b"\x07").and_then(|_| out.flush()) {
            debug!(error = %e, "bell failed");
        }
    }
}

pub struct App {
    pub session: SessionController,
    /// Question under the cursor during the quiz.
    pub selected: usize,
    pub notice: Option<String>,
}

impl App {
    pub fn new(session: SessionController) -> Self {
        Self {
            session,
            selected: 0,
            notice: None,
        }
    }

    fn selected_question(&self) -> Option<(String, QuestionKind)> {
        self.session
            .questions()
            .get(self.selected)
            .map(|q| (q.id.clone(), q.kind.clone()))
    }

    fn move_selection(&mut self, down: bool) {
        let count = self.session.questions().len();
        if count == 0 {
            return;
        }
        self.selected = if down {
            (self.selected + 1).min(count - 1)
        } else {
            self.selected.saturating_sub(1)
        };
    }

    /// Returns false when the app should quit.
    fn on_key(&mut self, key: KeyEvent) -> bool {
        if key.kind == KeyEventKind::Release {
            return true;
        }
        if self.session.on_key(&key) == Disposition::Prevent {
            return true;
        }
        if key.code == KeyCode::Esc {
            self.session.exit_session();
            return false;
        }

        match self.session.phase() {
            Phase::Ready => {
                if matches!(key.code, KeyCode::Char(' ') | KeyCode::Enter) {
                    let result = self.session.start();
                    self.report(result);
                }
            }
            Phase::Reading => match key.code {
                KeyCode::Char(' ') => {
                    let result = self.session.toggle_pause();
                    self.report(result);
                }
                KeyCode::Char('r') | KeyCode::Left => {
                    let result = self.session.restart();
                    self.report(result);
                }
                _ => {}
            },
            Phase::Quiz => self.on_quiz_key(key),
            Phase::Finished(_) => {
                if matches!(key.code, KeyCode::Char('q') | KeyCode::Enter) {
                    return false;
                }
            }
        }
        true
    }

    fn on_quiz_key(&mut self, key: KeyEvent) {
        let Some((id, kind)) = self.selected_question() else {
            if key.code == KeyCode::Enter {
                let result = self.session.check_answers();
                self.report(result);
            }
            return;
        };
        match (key.code, kind) {
            (KeyCode::Up, _) | (KeyCode::BackTab, _) => self.move_selection(false),
            (KeyCode::Down, _) | (KeyCode::Tab, _) => self.move_selection(true),
            (KeyCode::Enter, _) => {
                let result = self.session.check_answers();
                self.report(result);
            }
            (KeyCode::Char(c), QuestionKind::Choice { options }) => {
                if let Some(option) = c
                    .to_digit(10)
                    .and_then(|d| (d as usize).checked_sub(1))
                    .and_then(|i| options.get(i))
                {
                    let result = self.session.answer(&id, option.clone());
                    self.report(result);
                }
            }
            (KeyCode::Char(c), QuestionKind::Open) => {
                let mut text = self.session.answers().get(&id).unwrap_or_default();
                text.push(c);
                let result = self.session.answer(&id, text);
                self.report(result);
            }
            (KeyCode::Backspace, QuestionKind::Open) => {
                let mut text = self.session.answers().get(&id).unwrap_or_default();
                text.pop();
                let result = self.session.answer(&id, text);
                self.report(result);
            }
            _ => {}
        }
    }

    fn report(&mut self, result: skimr::error::Result<()>) {
        self.notice = match result {
            Ok(()) => None,
            Err(e) => {
                debug!(error = %e, "action refused");
                Some(e.to_string())
            }
        };
    }
}

fn init_logging() {
    let Some(path) = AppDirs::log_path() else {
        return;
    };
    if let Some(parent) = path.parent() {
        if std::fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };
    let filter = EnvFilter::try_from_env("SKIMR_LOG").unwrap_or_else(|_| EnvFilter::new("skimr=info"));
    // A subscriber may already be installed; keep the first one.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
}

fn build_library(cli: &Cli) -> Result<(Library, String), Box<dyn Error>> {
    let mut library = Library::bundled()?;
    let candidate = PathBuf::from(&cli.exercise);
    let id = if candidate.extension().is_some_and(|e| e == "json") && candidate.exists() {
        library.load_file(&candidate)?
    } else {
        cli.exercise.clone()
    };
    Ok((library, id))
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging();

    let store = FileConfigStore::new();
    if cli.save {
        let settings = cli.overrides().apply(store.load()).sanitized();
        store.save(&settings)?;
        info!(path = %store.path().display(), "reading settings saved");
    }

    let (library, exercise_id) = build_library(&cli)?;
    if cli.list {
        for entry in library.entries() {
            println!(
                "{:<12} {:<8} {}",
                entry.id,
                if entry.ranked { "ranked" } else { "training" },
                entry.title
            );
        }
        return Ok(());
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let ledger = Ledger::open_default()?;
    let backend = Rc::new(LocalBackend::new(library, ledger));
    let focused = Rc::new(Cell::new(true));
    let size = Rc::new(Cell::new((0u16, 0u16)));
    let exits = ExitRecorder::new();
    let clock = MonotonicClock::new();

    let services = Services {
        settings: Box::new(LayeredSettings::new(store, cli.overrides())),
        exercises: Box::new(backend.clone()),
        attempts: Box::new(backend.clone()),
        scoring: Box::new(backend),
        navigator: Box::new(exits.clone()),
        metronome: Box::new(BellMetronome),
        probe: Box::new(TerminalProbe {
            focused: focused.clone(),
            size: size.clone(),
        }),
        clock: Box::new(clock),
    };

    let session = match SessionController::load(services, &exercise_id) {
        Ok(session) => session,
        Err(e) => {
            let mut cmd = Cli::command();
            cmd.error(ErrorKind::InvalidValue, e.to_string()).exit();
        }
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    if let Ok(area) = terminal.size() {
        size.set((area.width, area.height));
    }

    let mut app = App::new(session);
    let result = start_tui(&mut terminal, &mut app, clock, &focused, &size);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableMouseCapture,
        DisableFocusChange,
        LeaveAlternateScreen,
    )?;
    terminal.show_cursor()?;

    if let Some(exit) = exits.last() {
        info!(?exit, "session over");
    }
    result
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    clock: MonotonicClock,
    focused: &Rc<Cell<bool>>,
    size: &Rc<Cell<(u16, u16)>>,
) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    terminal.draw(|f| ui(app, f))?;
    loop {
        let next_due = app
            .session
            .timers()
            .next_due()
            .map(|due| Duration::from_millis(due.saturating_sub(clock.now_ms())));

        match runner.step_until(next_due) {
            ReaderEvent::Tick => {}
            ReaderEvent::Key(key) => {
                if !app.on_key(key) {
                    break;
                }
            }
            ReaderEvent::FocusLost => {
                focused.set(false);
                app.session.on_blur();
            }
            ReaderEvent::FocusGained => focused.set(true),
            ReaderEvent::ContextMenu => {
                app.session.on_context_menu();
            }
            ReaderEvent::Resize => {
                if let Ok(area) = terminal.size() {
                    size.set((area.width, area.height));
                }
            }
        }

        app.session.advance();
        terminal.draw(|f| ui(app, f))?;
    }

    Ok(())
}

fn ui(app: &mut App, f: &mut Frame) {
    f.render_widget(&*app, f.area());
}
