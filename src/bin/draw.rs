//! Region drawing TUI - interactive polygon editor for a running region-counter
//!
//! Polls the HTTP API and displays:
//! - the current region on a canvas mapped to frame coordinates
//! - live/entry/exit counters
//! - recent entry/exit events
//!
//! Left click adds a point, right click or `r` resets, `q` quits.

use clap::Parser;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
        MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Line as CanvasLine, Points},
        Block, Borders, List, ListItem, Paragraph,
    },
    Frame, Terminal,
};
use serde::Deserialize;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};

/// Maximum events to keep in the list
const MAX_EVENTS: usize = 20;

/// Region drawing client
#[derive(Parser, Debug)]
#[command(name = "region-draw", version, about)]
struct Args {
    /// Base URL of the region-counter HTTP API
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    api: String,

    /// Frame width in pixels (canvas x range)
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Frame height in pixels (canvas y range)
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// API poll interval in milliseconds
    #[arg(long, default_value_t = 500)]
    poll_ms: u64,
}

/// GET /api/config/area
#[derive(Debug, Clone, Deserialize, Default)]
struct Area {
    status: String,
    points: Vec<[i32; 2]>,
    revision: u64,
    #[serde(default)]
    outcome: Option<String>,
}

/// GET /api/stats/counters
#[derive(Debug, Clone, Copy, Deserialize, Default)]
struct Counters {
    entries: u64,
    exits: u64,
    live_count: u64,
}

/// One entry of GET /api/stats/
#[derive(Debug, Clone, Deserialize)]
struct EventRow {
    track_id: i64,
    event: String,
    timestamp: String,
}

/// Region edits sent to the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    AddPoint { x: i64, y: i64 },
    Reset,
}

/// Dashboard state shared between the API poller and the UI
#[derive(Debug, Default)]
struct DashboardState {
    area: Area,
    counters: Counters,
    events: VecDeque<EventRow>,
    /// History offset already fetched
    history_offset: usize,
    connected: bool,
    last_error: Option<String>,
    last_update: Option<Instant>,
    status_line: String,
}

impl DashboardState {
    fn add_events(&mut self, rows: Vec<EventRow>) {
        self.history_offset += rows.len();
        for row in rows {
            self.events.push_front(row);
        }
        self.events.truncate(MAX_EVENTS);
    }

    fn set_error(&mut self, error: impl ToString) {
        self.connected = false;
        self.last_error = Some(error.to_string());
    }
}

type SharedState = Arc<Mutex<DashboardState>>;

/// Thin client for the region-counter API
#[derive(Clone)]
struct ApiClient {
    http: reqwest::Client,
    base: String,
}

impl ApiClient {
    fn new(base: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(2)).build()?;
        Ok(Self { http, base: base.trim_end_matches('/').to_string() })
    }

    async fn area(&self) -> Result<Area, reqwest::Error> {
        self.http
            .get(format!("{}/api/config/area", self.base))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    async fn counters(&self) -> Result<Counters, reqwest::Error> {
        self.http
            .get(format!("{}/api/stats/counters", self.base))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    async fn history_since(&self, offset: usize) -> Result<Vec<EventRow>, reqwest::Error> {
        self.http
            .get(format!("{}/api/stats/?since={}", self.base, offset))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    async fn send(&self, command: Command) -> Result<Area, reqwest::Error> {
        let request = match command {
            Command::AddPoint { x, y } => self
                .http
                .post(format!("{}/api/config/area/point", self.base))
                .json(&serde_json::json!({ "x": x, "y": y })),
            Command::Reset => self.http.delete(format!("{}/api/config/area", self.base)),
        };
        request.send().await?.error_for_status()?.json().await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let client = ApiClient::new(&args.api)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let state: SharedState = Arc::new(Mutex::new(DashboardState::default()));
    let (command_tx, command_rx) = mpsc::channel(16);

    let poll_handle = tokio::spawn(run_poller(
        client.clone(),
        Duration::from_millis(args.poll_ms.max(50)),
        state.clone(),
    ));
    let command_handle = tokio::spawn(run_commands(client, command_rx, state.clone()));

    let result = run_ui(&mut terminal, state, command_tx, args.width, args.height).await;

    poll_handle.abort();
    command_handle.abort();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

async fn run_poller(client: ApiClient, interval: Duration, state: SharedState) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        let offset = state.lock().await.history_offset;
        let result = async {
            let area = client.area().await?;
            let counters = client.counters().await?;
            let rows = client.history_since(offset).await?;
            Ok::<_, reqwest::Error>((area, counters, rows))
        }
        .await;

        let mut s = state.lock().await;
        match result {
            Ok((area, counters, rows)) => {
                s.area = area;
                s.counters = counters;
                s.add_events(rows);
                s.connected = true;
                s.last_error = None;
                s.last_update = Some(Instant::now());
            }
            Err(e) => s.set_error(e),
        }
    }
}

async fn run_commands(client: ApiClient, mut command_rx: mpsc::Receiver<Command>, state: SharedState) {
    while let Some(command) = command_rx.recv().await {
        let result = client.send(command).await;
        let mut s = state.lock().await;
        match result {
            Ok(area) => {
                s.status_line = match command {
                    Command::AddPoint { x, y } => format!(
                        "({}, {}) {}",
                        x,
                        y,
                        area.outcome.as_deref().unwrap_or("sent")
                    ),
                    Command::Reset => "region reset".to_string(),
                };
                s.area = area;
            }
            Err(e) => s.set_error(e),
        }
    }
}

async fn run_ui(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: SharedState,
    command_tx: mpsc::Sender<Command>,
    width: u32,
    height: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let tick_rate = Duration::from_millis(100);
    let mut canvas_area = Rect::default();

    loop {
        let s = state.lock().await;
        terminal.draw(|f| canvas_area = draw_ui(f, &s, width, height))?;
        drop(s);

        if !event::poll(tick_rate)? {
            continue;
        }

        let command = match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('r') => Some(Command::Reset),
                _ => None,
            },
            Event::Mouse(mouse) => match mouse.kind {
                MouseEventKind::Down(MouseButton::Left) => {
                    cell_to_frame(canvas_area, mouse.column, mouse.row, width, height)
                        .map(|(x, y)| Command::AddPoint { x, y })
                }
                MouseEventKind::Down(MouseButton::Right) => Some(Command::Reset),
                _ => None,
            },
            _ => None,
        };

        if let Some(command) = command {
            let mut s = state.lock().await;
            queue_command(&command_tx, command, &mut s);
        }
    }
}

/// Hand a command to the sender task without blocking the UI
///
/// A full queue means earlier edits are still in flight; the command is
/// dropped and the status line says so.
fn queue_command(command_tx: &mpsc::Sender<Command>, command: Command, state: &mut DashboardState) {
    match command_tx.try_send(command) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(command)) => {
            state.status_line = match command {
                Command::AddPoint { x, y } => format!("busy, click at ({}, {}) ignored", x, y),
                Command::Reset => "busy, reset ignored".to_string(),
            };
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            state.status_line = "command sender stopped".to_string();
        }
    }
}

/// Map a terminal cell inside the canvas to frame pixel coordinates
///
/// Frame coordinates grow downward like image rows, matching the terminal.
fn cell_to_frame(area: Rect, column: u16, row: u16, width: u32, height: u32) -> Option<(i64, i64)> {
    if area.width == 0 || area.height == 0 {
        return None;
    }
    if column < area.x || column >= area.x + area.width || row < area.y || row >= area.y + area.height
    {
        return None;
    }
    // Centre of the cell, scaled to the frame
    let cx = (f64::from(column - area.x) + 0.5) / f64::from(area.width);
    let cy = (f64::from(row - area.y) + 0.5) / f64::from(area.height);
    Some(((cx * f64::from(width)) as i64, (cy * f64::from(height)) as i64))
}

/// Canvas y grows upward; flip frame y
fn to_canvas(point: [i32; 2], height: u32) -> (f64, f64) {
    (f64::from(point[0]), f64::from(height) - f64::from(point[1]))
}

/// Draw the whole UI and return the canvas drawing area for mouse mapping
fn draw_ui(f: &mut Frame, state: &DashboardState, width: u32, height: u32) -> Rect {
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Canvas + side panels
            Constraint::Length(1), // Help
        ])
        .split(f.area());

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(main_chunks[1]);

    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(0)])
        .split(body[1]);

    draw_header(f, main_chunks[0], state);
    let canvas_area = draw_canvas(f, body[0], state, width, height);
    draw_counters(f, side[0], state);
    draw_events(f, side[1], state);
    draw_help(f, main_chunks[2]);

    canvas_area
}

fn draw_header(f: &mut Frame, area: Rect, state: &DashboardState) {
    let (conn_text, conn_color) = if state.connected {
        ("CONNECTED", Color::Green)
    } else {
        ("DISCONNECTED", Color::Red)
    };
    let status_color = if state.area.status == "active" { Color::Green } else { Color::Yellow };

    let mut spans = vec![
        Span::styled(" REGION DRAW ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" | "),
        Span::styled(conn_text, Style::default().fg(conn_color)),
        Span::raw(" | region "),
        Span::styled(
            if state.area.status.is_empty() { "?" } else { state.area.status.as_str() },
            Style::default().fg(status_color),
        ),
        Span::raw(format!(" {}/4 rev {}", state.area.points.len(), state.area.revision)),
    ];
    if !state.status_line.is_empty() {
        spans.push(Span::raw(" | "));
        spans.push(Span::raw(state.status_line.clone()));
    }
    if let Some(ref error) = state.last_error {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(error.clone(), Style::default().fg(Color::Red)));
    }

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn draw_canvas(f: &mut Frame, area: Rect, state: &DashboardState, width: u32, height: u32) -> Rect {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Frame {}x{} ", width, height));
    let inner = block.inner(area);

    let points: Vec<(f64, f64)> = state.area.points.iter().map(|p| to_canvas(*p, height)).collect();
    let closed = state.area.status == "active";
    let edge_color = if closed { Color::Green } else { Color::Yellow };

    let canvas = Canvas::default()
        .block(block)
        .marker(Marker::Braille)
        .x_bounds([0.0, f64::from(width)])
        .y_bounds([0.0, f64::from(height)])
        .paint(move |ctx| {
            for pair in points.windows(2) {
                ctx.draw(&CanvasLine::new(pair[0].0, pair[0].1, pair[1].0, pair[1].1, edge_color));
            }
            if closed {
                if let (Some(first), Some(last)) = (points.first(), points.last()) {
                    ctx.draw(&CanvasLine::new(last.0, last.1, first.0, first.1, edge_color));
                }
            }
            ctx.draw(&Points { coords: &points, color: Color::White });
        });

    f.render_widget(canvas, area);
    inner
}

fn draw_counters(f: &mut Frame, area: Rect, state: &DashboardState) {
    let lines = vec![
        Line::from(vec![
            Span::raw("Live:    "),
            Span::styled(
                state.counters.live_count.to_string(),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(format!("Entries: {}", state.counters.entries)),
        Line::from(format!("Exits:   {}", state.counters.exits)),
    ];
    let panel =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Counters "));
    f.render_widget(panel, area);
}

fn draw_events(f: &mut Frame, area: Rect, state: &DashboardState) {
    let items: Vec<ListItem> = state
        .events
        .iter()
        .map(|row| {
            let color = if row.event == "entered" { Color::Green } else { Color::Magenta };
            // RFC 3339; show the time part only
            let time = row.timestamp.get(11..19).unwrap_or(&row.timestamp);
            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", time), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("{:<7}", row.event), Style::default().fg(color)),
                Span::raw(format!(" T{}", row.track_id)),
            ]))
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(" Events "));
    f.render_widget(list, area);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let help = Paragraph::new(Line::from(vec![
        Span::styled(" left click", Style::default().fg(Color::Cyan)),
        Span::raw(" add point  "),
        Span::styled("right click / r", Style::default().fg(Color::Cyan)),
        Span::raw(" reset  "),
        Span::styled("q", Style::default().fg(Color::Cyan)),
        Span::raw(" quit"),
    ]));
    f.render_widget(help, area);
}
