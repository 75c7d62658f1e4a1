//! TUI for a validation run with live progress display

use crate::proxy::{ProxyRecord, ProxyStatus, RecordSet, ResultAggregator, RunCanceller, Snapshot};
use crate::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::warn;

/// Maximum number of recent proxies to keep for display
const MAX_RECENT_PROXIES: usize = 100;

/// Redraw cadence, also the key poll interval
const REDRAW_INTERVAL: Duration = Duration::from_millis(50);

/// Live view over a running validation
pub struct ProxyCheckerApp {
    records: RecordSet,
    aggregator: ResultAggregator,
    canceller: RunCanceller,
    /// Latest counters
    snapshot: Snapshot,
    /// Most recently finished working proxies, newest first
    recent_good: Vec<ProxyRecord>,
    /// Most recently finished failed proxies, newest first
    recent_bad: Vec<ProxyRecord>,
    /// Selected list (0 = good, 1 = bad)
    selected_list: usize,
    /// Selected item in current list
    list_state: ListState,
    /// Whether the user wants to quit
    should_quit: bool,
}

impl ProxyCheckerApp {
    pub fn new(records: RecordSet, aggregator: ResultAggregator, canceller: RunCanceller) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));
        let snapshot = aggregator.snapshot();

        Self {
            records,
            aggregator,
            canceller,
            snapshot,
            recent_good: Vec::new(),
            recent_bad: Vec::new(),
            selected_list: 0,
            list_state,
            should_quit: false,
        }
    }

    /// Run the TUI application until the user quits
    pub async fn run(&mut self) -> Result<()> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal).await;

        // Restore terminal
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result
    }

    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        let stop = Arc::new(AtomicBool::new(false));
        let mut keys = spawn_key_reader(Arc::clone(&stop));
        let mut redraw = tokio::time::interval(REDRAW_INTERVAL);

        let result = loop {
            self.refresh();
            if let Err(e) = terminal.draw(|f| self.ui(f)) {
                break Err(e.into());
            }

            tokio::select! {
                key = keys.recv() => match key {
                    Some(code) => {
                        self.handle_input(code);
                        if self.should_quit {
                            break Ok(());
                        }
                    }
                    // Reader gave up on the terminal
                    None => break Ok(()),
                },
                _ = redraw.tick() => {}
            }
        };

        stop.store(true, Ordering::Relaxed);
        result
    }

    /// Pull fresh counters and recent results
    fn refresh(&mut self) {
        self.snapshot = self.aggregator.snapshot();

        let mut finished: Vec<ProxyRecord> = self
            .records
            .snapshot()
            .into_iter()
            .filter(|record| record.status.is_terminal())
            .collect();
        finished.sort_by(|a, b| b.last_checked_at.cmp(&a.last_checked_at));

        let (good, bad): (Vec<_>, Vec<_>) = finished
            .into_iter()
            .partition(|record| record.status == ProxyStatus::Working);
        self.recent_good = good.into_iter().take(MAX_RECENT_PROXIES).collect();
        self.recent_bad = bad.into_iter().take(MAX_RECENT_PROXIES).collect();
    }

    fn status_message(&self) -> String {
        let s = &self.snapshot;
        if s.running {
            format!(
                "Checking... {}% ({}/{}) | Working: {} | Failed: {} | In flight: {} | 's' stop, 'q' quit",
                s.progress_percent, s.checked, s.total, s.working, s.failed, s.checking
            )
        } else if s.is_complete() {
            format!(
                "Complete! Checked: {} | Working: {} | Failed: {} | Press 'q' to quit",
                s.total, s.working, s.failed
            )
        } else {
            format!(
                "Stopped at {}/{} | Working: {} | Failed: {} | Press 'q' to quit",
                s.checked, s.total, s.working, s.failed
            )
        }
    }

    fn handle_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.canceller.cancel();
                self.should_quit = true;
            }
            KeyCode::Char('s') => {
                self.canceller.cancel();
            }
            KeyCode::Tab => {
                // Switch between good and bad lists
                self.selected_list = (self.selected_list + 1) % 2;
                self.list_state.select(Some(0));
            }
            KeyCode::Down => {
                let len = self.selected_len();
                let i = match self.list_state.selected() {
                    Some(i) if i + 1 < len => i + 1,
                    _ => 0,
                };
                self.list_state.select(Some(i));
            }
            KeyCode::Up => {
                let len = self.selected_len();
                let i = match self.list_state.selected() {
                    Some(0) | None => len.saturating_sub(1),
                    Some(i) => i - 1,
                };
                self.list_state.select(Some(i));
            }
            _ => {}
        }
    }

    fn selected_len(&self) -> usize {
        if self.selected_list == 0 {
            self.recent_good.len()
        } else {
            self.recent_bad.len()
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Title
                Constraint::Length(3), // Progress bar
                Constraint::Min(0),    // Proxy lists
                Constraint::Length(3), // Status bar
            ])
            .split(f.size());

        let title = Paragraph::new("Proxy Validator")
            .style(Style::default().fg(Color::Cyan))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(title, chunks[0]);

        let progress_label = format!(
            "{}/{} ({}%)",
            self.snapshot.checked, self.snapshot.total, self.snapshot.progress_percent
        );
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Progress"))
            .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
            .percent(u16::from(self.snapshot.progress_percent))
            .label(progress_label);
        f.render_widget(gauge, chunks[1]);

        let proxy_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[2]);

        Self::render_proxy_list(
            f,
            proxy_chunks[0],
            "Working",
            &self.recent_good,
            self.snapshot.working,
            Color::Green,
            if self.selected_list == 0 { Some(&mut self.list_state) } else { None },
        );

        Self::render_proxy_list(
            f,
            proxy_chunks[1],
            "Failed",
            &self.recent_bad,
            self.snapshot.failed,
            Color::Red,
            if self.selected_list == 1 { Some(&mut self.list_state) } else { None },
        );

        let status = Paragraph::new(self.status_message())
            .style(if self.snapshot.running {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::Green)
            })
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[3]);
    }

    fn render_proxy_list(
        f: &mut Frame,
        area: Rect,
        title: &str,
        records: &[ProxyRecord],
        total_count: usize,
        color: Color,
        list_state: Option<&mut ListState>,
    ) {
        let items: Vec<ListItem> = records
            .iter()
            .map(|record| {
                let mut content = format!("{} [{}]", record.address, record.proxy_type);
                if let Some(ms) = record.latency_ms {
                    content.push_str(&format!(" {}ms", ms));
                }
                if let Some(geo) = &record.geo {
                    content.push_str(&format!(" {}", geo.short_display()));
                }
                ListItem::new(content).style(Style::default().fg(color))
            })
            .collect();

        let border_style = if list_state.is_some() {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("{} ({})", title, total_count))
                    .border_style(border_style),
            )
            .highlight_style(Style::default().bg(Color::DarkGray))
            .highlight_symbol(">> ");

        match list_state {
            Some(state) => f.render_stateful_widget(list, area, state),
            None => f.render_widget(list, area),
        }
    }
}

/// Forward key presses from a blocking thread until `stop` is set
///
/// `event::poll` blocks, so it stays off the runtime workers that drive probes.
fn spawn_key_reader(stop: Arc<AtomicBool>) -> mpsc::UnboundedReceiver<KeyCode> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::task::spawn_blocking(move || forward_keys(&stop, &tx, read_event));
    rx
}

fn read_event(wait: Duration) -> io::Result<Option<Event>> {
    if event::poll(wait)? {
        event::read().map(Some)
    } else {
        Ok(None)
    }
}

/// Send every key press from `next_event` until stopped, the receiver is
/// gone, or the terminal fails
fn forward_keys(
    stop: &AtomicBool,
    tx: &mpsc::UnboundedSender<KeyCode>,
    mut next_event: impl FnMut(Duration) -> io::Result<Option<Event>>,
) {
    while !stop.load(Ordering::Relaxed) {
        match next_event(REDRAW_INTERVAL) {
            Ok(Some(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                if tx.send(key.code).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "terminal input failed");
                break;
            }
        }
    }
}
