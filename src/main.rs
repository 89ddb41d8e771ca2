use std::{
    error::Error,
    fs::{self, OpenOptions},
    io::{self, stdin},
    sync::Mutex,
    time::Duration,
};

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wordflow::{
    answers::{AnswerLog, AnswerSink, MemorySink},
    app_dirs::AppDirs,
    clock::SystemClock,
    config::{Config, ConfigStore, FileConfigStore},
    deck::WordDeck,
    exercise::SessionKind,
    runtime::{CrosstermEventSource, FixedTicker, FlowEvent, Runner},
    session::Session,
    speech::{ClipPlayer, FallbackPlayer, SimulatedTts},
    ui::{DrillView, SummaryView},
};

/// Nominal length of a recorded pronunciation clip
const CLIP_LENGTH: Duration = Duration::from_millis(1_200);

type Player = FallbackPlayer<ClipPlayer<SystemClock>, SimulatedTts<SystemClock>>;
type Drill = Session<SystemClock, Box<dyn AnswerSink>, Player>;

/// timed vocabulary drills in the terminal
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Timed vocabulary drills in the terminal. Each word is shown (or played), then you pick its translation against the clock; learn, practice and review sessions mix reading, listening and speaking items."
)]
pub struct Cli {
    /// kind of session to run (defaults to the configured mode)
    #[clap(short = 'm', long, value_enum)]
    mode: Option<SessionKind>,

    /// built-in deck name, or a path to a word,translation CSV file
    #[clap(short = 'd', long)]
    deck: Option<String>,

    /// number of items in the session
    #[clap(short = 'n', long)]
    items: Option<usize>,

    /// keep this session's answers out of the answer log
    #[clap(long)]
    no_log: bool,
}

impl Cli {
    /// Flags win over the config file
    fn apply(&self, config: &mut Config) {
        if let Some(mode) = self.mode {
            config.default_mode = mode;
        }
        if let Some(deck) = &self.deck {
            config.deck = deck.clone();
        }
        if let Some(items) = self.items {
            config.items_per_session = items;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Choose(usize),
    Record,
    ToggleTutorial,
    Quit,
    Ignore,
}

fn key_action(key: KeyEvent) -> KeyAction {
    match key.code {
        KeyCode::Esc => KeyAction::Quit,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Quit,
        KeyCode::Char(' ') => KeyAction::Record,
        KeyCode::Char('?') => KeyAction::ToggleTutorial,
        KeyCode::Char(c @ '1'..='9') => KeyAction::Choose(c as usize - '1' as usize),
        _ => KeyAction::Ignore,
    }
}

fn init_logging() {
    let Some(path) = AppDirs::log_path() else {
        return;
    };
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };
    let filter =
        EnvFilter::try_from_env("WORDFLOW_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout belongs to the TUI
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
}

fn answer_sink(no_log: bool) -> Box<dyn AnswerSink> {
    if no_log {
        return Box::new(MemorySink::default());
    }
    match AnswerLog::open_default() {
        Ok(log) => Box::new(log),
        Err(err) => {
            warn!(%err, "answer log unavailable, keeping answers in memory");
            Box::new(MemorySink::default())
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    init_logging();

    let mut config = FileConfigStore::new().load();
    cli.apply(&mut config);

    let deck = match WordDeck::resolve(&config.deck) {
        Ok(deck) => deck.with_limit(config.items_per_session),
        Err(err) => {
            let mut cmd = Cli::command();
            cmd.error(
                ErrorKind::InvalidValue,
                format!(
                    "{err} (built-in decks: {})",
                    WordDeck::builtin_names().join(", ")
                ),
            )
            .exit();
        }
    };
    info!(deck = %deck.name, mode = %config.default_mode, "loading session");

    let clock = SystemClock;
    let player = FallbackPlayer::new(ClipPlayer::new(clock, CLIP_LENGTH), SimulatedTts::new(clock));
    let mut session: Drill = Session::load(
        &deck,
        config.default_mode,
        &config,
        clock,
        answer_sink(cli.no_log),
        player,
    )?;

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let outcome = run_drill(&mut terminal, &mut session);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    outcome
}

#[derive(Debug, PartialEq, Eq)]
enum ExitType {
    Finished,
    Quit,
}

fn run_drill<B: Backend>(terminal: &mut Terminal<B>, session: &mut Drill) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(CrosstermEventSource::new(), FixedTicker::default());
    let mut tutorial = false;
    session.begin();

    let exit_type = loop {
        let view = DrillView::capture(session, tutorial);
        terminal.draw(|f| f.render_widget(&view, f.area()))?;

        if session.is_finished() {
            break ExitType::Finished;
        }
        // ticks go straight to the session; keys and resizes come back here
        match runner.pump(session) {
            Some(FlowEvent::Key(key)) => {
                if handle_key(session, key_action(key), &mut tutorial) == Some(ExitType::Quit) {
                    break ExitType::Quit;
                }
            }
            Some(FlowEvent::Resize) | Some(FlowEvent::Tick) | None => {}
        }
    };

    let saved = match session.finish() {
        Ok(_) => true,
        Err(err) => {
            warn!(%err, "could not save answers");
            false
        }
    };
    if exit_type == ExitType::Quit {
        return Ok(());
    }

    let summary = session.summary();
    let view = SummaryView {
        summary: &summary,
        records: session.records(),
        saved,
    };
    terminal.draw(|f| f.render_widget(&view, f.area()))?;
    loop {
        match runner.step() {
            FlowEvent::Key(_) => break,
            FlowEvent::Resize => {
                terminal.draw(|f| f.render_widget(&view, f.area()))?;
            }
            FlowEvent::Tick => {}
        }
    }
    Ok(())
}

/// Apply one key press; `Some` means the drill should stop
fn handle_key(session: &mut Drill, action: KeyAction, tutorial: &mut bool) -> Option<ExitType> {
    match action {
        KeyAction::Quit => return Some(ExitType::Quit),
        KeyAction::ToggleTutorial => {
            if *tutorial {
                session.resume();
            } else {
                session.pause();
            }
            *tutorial = !*tutorial;
        }
        // the overlay swallows answers
        KeyAction::Choose(_) | KeyAction::Record if *tutorial => {}
        KeyAction::Choose(index) => {
            session.choose(index);
        }
        KeyAction::Record => {
            session.start_recording();
        }
        KeyAction::Ignore => {}
    }
    None
}
