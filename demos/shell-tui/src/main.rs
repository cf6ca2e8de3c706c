//! Terminal client for a remote shell server.
//!
//! Run with: cargo run -p shell-tui -- --url http://127.0.0.1:8000/
//!
//! Ctrl+C closes the shell, Ctrl+D leaves it running so the next start
//! reattaches to it.

use std::{
    fs::File,
    io,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Context;
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use remote_shell_core::{
    ErrorSignal, HostSurface, InputGate, OutputEvent, SessionFault, SessionState, ShellId,
};
use remote_shell_session::{FileShellIdStore, SessionManager, ShellIdStore};
use remote_shell_transport::{ClientConfig, HttpTransport};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "shell-tui", version, about = "Terminal client for a remote shell server")]
struct Args {
    /// Shell server base URL (overrides REMOTE_SHELL_URL)
    #[arg(long)]
    url: Option<String>,

    /// Name under which the shell id is remembered
    #[arg(long, default_value = "main")]
    surface: String,

    /// Ignore any remembered shell and start a new one
    #[arg(long)]
    fresh: bool,

    /// Shell id store file (defaults to the platform data directory)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Log file; the terminal is owned by the UI
    #[arg(long, default_value = "shell-tui.log")]
    log_file: PathBuf,
}

/// Host callbacks, forwarded to the UI loop.
enum UiEvent {
    Output(String),
    Reset,
    InputEnabled(bool),
    ClearInput,
    Alert(SessionFault),
}

struct ChannelHost {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl InputGate for ChannelHost {
    fn set_enabled(&self, enabled: bool) {
        let _ = self.tx.send(UiEvent::InputEnabled(enabled));
    }

    fn clear(&self) {
        let _ = self.tx.send(UiEvent::ClearInput);
    }
}

impl ErrorSignal for ChannelHost {
    fn report(&self, fault: &SessionFault) {
        tracing::error!(category = ?fault.category(), "{fault}");
        let _ = self.tx.send(UiEvent::Alert(fault.clone()));
    }
}

/// How long Ctrl+C waits for the server to be told to kill the shell.
const KILL_WAIT: Duration = Duration::from_secs(2);

/// How the UI loop ended.
enum Exit {
    Close,
    Detach,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let mut config = ClientConfig::from_env()?;
    if let Some(url) = &args.url {
        config.base_url.clone_from(url);
        config.validate()?;
    }
    let transport = HttpTransport::new(&config)?;

    let store = match &args.store {
        Some(path) => FileShellIdStore::new(path),
        None => FileShellIdStore::in_data_dir()?,
    };
    let prior = if args.fresh {
        None
    } else {
        store.load(&args.surface).await?
    };
    tracing::info!(url = %config.base_url, surface = %args.surface, prior = ?prior, "Starting");

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, transport, prior).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    match result? {
        (Exit::Detach, Some(shell_id)) => {
            store.save(&args.surface, &shell_id).await?;
            println!("Detached from shell {shell_id}; run again to reattach.");
        }
        _ => store.clear(&args.surface).await?,
    }
    Ok(())
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let file = File::create(&args.log_file)
        .with_context(|| format!("cannot open log file {}", args.log_file.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

struct App {
    output: String,
    input: String,
    input_enabled: bool,
    state: SessionState,
    shell_id: Option<ShellId>,
    alert: Option<String>,
}

impl App {
    const fn new() -> Self {
        Self {
            output: String::new(),
            input: String::new(),
            input_enabled: false,
            state: SessionState::Uninitialized,
            shell_id: None,
            alert: None,
        }
    }

    fn apply(&mut self, event: UiEvent) {
        match event {
            UiEvent::Output(text) => self.output.push_str(&text),
            UiEvent::Reset => self.output.clear(),
            UiEvent::InputEnabled(enabled) => self.input_enabled = enabled,
            UiEvent::ClearInput => self.input.clear(),
            UiEvent::Alert(fault) => self.alert = Some(fault.to_string()),
        }
    }

    /// Output as display rows at most `width` characters wide, with
    /// control characters stripped and tabs shown as spaces.
    fn rows(&self, width: u16) -> Vec<Line<'static>> {
        let width = usize::from(width.max(1));
        let mut rows = Vec::new();
        for line in self.output.split('\n') {
            let clean: Vec<char> = line
                .chars()
                .map(|c| if c == '\t' { ' ' } else { c })
                .filter(|c| !c.is_control())
                .collect();
            if clean.is_empty() {
                rows.push(Line::default());
                continue;
            }
            rows.extend(
                clean
                    .chunks(width)
                    .map(|row| Line::from(row.iter().collect::<String>())),
            );
        }
        rows
    }

    fn status(&self) -> String {
        let id = self
            .shell_id
            .as_ref()
            .map_or_else(|| "-".to_owned(), ToString::to_string);
        format!("{} (shell: {id})", self.state)
    }
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    transport: HttpTransport,
    prior: Option<ShellId>,
) -> anyhow::Result<(Exit, Option<ShellId>)> {
    let mut app = App::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let host = Arc::new(ChannelHost { tx: tx.clone() });
    let session = SessionManager::new(transport, HostSurface::attach(host.clone(), host));
    let mut states = session.subscribe_state();

    // Forward output, including anything restored before the UI subscribed.
    let mut output = session.output().history_plus_stream();
    tokio::spawn(async move {
        while let Some(event) = output.next().await {
            let event = match event {
                OutputEvent::Chunk(text) => UiEvent::Output(text),
                OutputEvent::Reset => UiEvent::Reset,
            };
            if tx.send(event).is_err() {
                break;
            }
        }
    });

    session.start(prior)?;

    loop {
        while let Ok(event) = rx.try_recv() {
            app.apply(event);
        }
        if states.has_changed().unwrap_or(false) {
            app.state = *states.borrow_and_update();
            app.shell_id = session.shell_id();
        }

        terminal.draw(|f| ui(f, &app))?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        match key {
            KeyEvent {
                code: KeyCode::Char('c'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => {
                if !session.shutdown(KILL_WAIT).await {
                    tracing::warn!("Shell kill not confirmed before exit");
                }
                return Ok((Exit::Close, None));
            }
            KeyEvent {
                code: KeyCode::Char('d'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => {
                let shell_id = session.detach();
                return Ok((Exit::Detach, shell_id));
            }
            KeyEvent {
                code: KeyCode::Char(c),
                modifiers: KeyModifiers::NONE | KeyModifiers::SHIFT,
                ..
            } if app.input_enabled => app.input.push(c),
            KeyEvent {
                code: KeyCode::Backspace,
                ..
            } if app.input_enabled => {
                app.input.pop();
            }
            KeyEvent {
                code: KeyCode::Enter,
                ..
            } if app.input_enabled => {
                if let Err(err) = session.submit(app.input.clone()) {
                    app.alert = Some(err.to_string());
                }
            }
            KeyEvent {
                code: KeyCode::Esc, ..
            } => app.alert = None,
            _ => {}
        }
    }
}

/// First row to show so the last `visible` rows are on screen.
fn tail_offset(total: usize, visible: u16) -> u16 {
    u16::try_from(total)
        .unwrap_or(u16::MAX)
        .saturating_sub(visible)
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Output
            Constraint::Length(3), // Input
            Constraint::Length(1), // Status
        ])
        .split(f.area());

    // Rows are pre-wrapped to the inner width so the tail offset is exact.
    let rows = app.rows(chunks[0].width.saturating_sub(2));
    let scroll = tail_offset(rows.len(), chunks[0].height.saturating_sub(2));
    let output = Paragraph::new(rows)
        .block(Block::default().borders(Borders::ALL).title("Shell"))
        .scroll((scroll, 0));
    f.render_widget(output, chunks[0]);

    let (title, style) = if app.input_enabled {
        ("Command", Style::default().fg(Color::Yellow))
    } else {
        ("Command (locked)", Style::default().fg(Color::DarkGray))
    };
    let input = Paragraph::new(app.input.as_str())
        .style(style)
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(input, chunks[1]);

    if app.input_enabled {
        let column = u16::try_from(app.input.chars().count()).unwrap_or(u16::MAX);
        f.set_cursor_position((
            chunks[1].x.saturating_add(column).saturating_add(1),
            chunks[1].y + 1,
        ));
    }

    let status_style = match app.state {
        SessionState::Active => Style::default().fg(Color::Green),
        SessionState::Failed | SessionState::Killed => Style::default().fg(Color::Red),
        _ => Style::default().fg(Color::Yellow),
    };
    let mut spans = vec![Span::raw(" "), Span::styled(app.status(), status_style)];
    if let Some(alert) = &app.alert {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(alert.as_str(), Style::default().fg(Color::Red)));
    }
    spans.extend([
        Span::raw(" | "),
        Span::styled("Ctrl+C", Style::default().fg(Color::Yellow)),
        Span::raw(" close | "),
        Span::styled("Ctrl+D", Style::default().fg(Color::Yellow)),
        Span::raw(" detach "),
    ]);
    f.render_widget(Paragraph::new(Line::from(spans)), chunks[2]);
}
