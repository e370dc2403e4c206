//! warpsim live visualizer — attach to any running simulation at any time.
//!
//! Run in a separate terminal:
//!   cargo run --bin viz
//!
//! Polls /tmp/warpsim_live.json every 200ms and renders a live TUI
//! dashboard:
//!
//!   ┌ header: status / cycle ────────────────────────────────────────┐
//!   │ warp heatmap (one cell per warp) │ Stats: hit rate, IPC, …     │
//!   │ q/esc: quit  …footer…                                          │
//!
//! Press q or Esc to quit. The simulation keeps running unaffected.

use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
    Frame, Terminal,
};
use std::{io, time::Duration};
use warpsim::metrics::{read_metrics, LiveMetrics};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run(&mut terminal);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let metrics = read_metrics();
        terminal.draw(|f| render(f, metrics.as_ref()))?;

        // Non-blocking: poll for 200ms, then redraw regardless
        if event::poll(Duration::from_millis(200))? {
            if let Event::Key(key) = event::read()? {
                if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                    break;
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Top-level layout
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, metrics: Option<&LiveMetrics>) {
    let area = f.area();

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(0),    // heatmap + stats
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, rows[0], metrics);

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(rows[1]);

    render_heatmap(f, cols[0], metrics);
    render_stats(f, cols[1], metrics);

    render_footer(f, rows[2]);
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

fn render_header(f: &mut Frame, area: Rect, metrics: Option<&LiveMetrics>) {
    let block = Block::default()
        .title(Span::styled(
            " ⚡ warpsim live monitor ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let (status, cycle) = metrics
        .map(|m| (m.status.as_str(), m.cycle))
        .unwrap_or(("idle", 0));

    let status_color = match status {
        "running" => Color::Green,
        "complete" => Color::Cyan,
        _ => Color::DarkGray,
    };

    let spans = vec![
        Span::styled("  status: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            status.to_uppercase(),
            Style::default().fg(status_color).add_modifier(Modifier::BOLD),
        ),
        Span::styled("   cycle: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            cycle.to_string(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
    ];

    f.render_widget(Paragraph::new(Line::from(spans)), inner);
}

// ---------------------------------------------------------------------------
// Warp heatmap
// ---------------------------------------------------------------------------

fn render_heatmap(f: &mut Frame, area: Rect, metrics: Option<&LiveMetrics>) {
    let block = Block::default().title(" Warp Activity ").borders(Borders::ALL);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let warp_active: Vec<bool> = metrics
        .map(|m| m.warp_active.clone())
        .unwrap_or_else(|| vec![false; 4]);
    let warp_pcs: Vec<u32> = metrics
        .map(|m| m.warp_pcs.clone())
        .unwrap_or_else(|| vec![0; warp_active.len()]);

    // Fit as many warps per row as the panel width allows
    // (each warp = 2 chars + 1 space)
    let warps_per_row = ((inner.width as usize).saturating_sub(1) / 3).max(1);

    // Legend line at top
    let legend = Line::from(vec![
        Span::styled("██", Style::default().fg(Color::Green)),
        Span::raw(" active   "),
        Span::styled("░░", Style::default().fg(Color::DarkGray)),
        Span::raw(" retired"),
    ]);

    let mut lines: Vec<Line> = vec![legend, Line::raw("")];

    for row in warp_active.chunks(warps_per_row) {
        let spans: Vec<Span> = row
            .iter()
            .flat_map(|&active| {
                let (symbol, color) = if active {
                    ("██", Color::Green)
                } else {
                    ("░░", Color::DarkGray)
                };
                vec![Span::styled(symbol, Style::default().fg(color)), Span::raw(" ")]
            })
            .collect();
        lines.push(Line::from(spans));
    }

    let active_count = warp_active.iter().filter(|&&a| a).count();
    lines.push(Line::raw(""));
    lines.push(Line::from(vec![Span::styled(
        format!("  {}/{} warps active", active_count, warp_active.len()),
        Style::default().fg(Color::DarkGray),
    )]));

    // Per-warp program counters, a handful per line
    lines.push(Line::raw(""));
    for (chunk_idx, chunk) in warp_pcs.chunks(4).enumerate() {
        let mut spans: Vec<Span> = Vec::new();
        for (i, pc) in chunk.iter().enumerate() {
            let warp_id = chunk_idx * 4 + i;
            spans.push(Span::styled(
                format!("  w{}: ", warp_id),
                Style::default().fg(Color::DarkGray),
            ));
            spans.push(Span::raw(format!("0x{:06x}", pc)));
        }
        lines.push(Line::from(spans));
    }

    f.render_widget(Paragraph::new(lines), inner);
}

// ---------------------------------------------------------------------------
// Stats panel
// ---------------------------------------------------------------------------

fn render_stats(f: &mut Frame, area: Rect, metrics: Option<&LiveMetrics>) {
    let block = Block::default().title(" Stats ").borders(Borders::ALL);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // hit-rate gauge
            Constraint::Length(1), // spacer
            Constraint::Length(2), // ceiling progress gauge
            Constraint::Length(1), // spacer
            Constraint::Min(0),    // text stats
        ])
        .split(inner);

    match metrics {
        None => {
            let msg = Paragraph::new(vec![
                Line::raw(""),
                Line::from(Span::styled(
                    "  No simulation running.",
                    Style::default().fg(Color::DarkGray),
                )),
                Line::from(Span::styled(
                    "  Start warpsim --live to see data.",
                    Style::default().fg(Color::DarkGray),
                )),
            ]);
            f.render_widget(msg, inner);
        }
        Some(m) => {
            // Cache hit-rate gauge; rate is 0.0 until the first sample
            let accesses = m.cache_hits + m.cache_misses;
            let live_rate = if accesses > 0 {
                m.cache_hits as f64 / accesses as f64
            } else {
                m.cache_hit_rate
            };
            let hit_pct = (live_rate * 100.0).clamp(0.0, 100.0) as u16;
            let hit_color = match hit_pct {
                0..=33 => Color::Red,
                34..=66 => Color::Yellow,
                _ => Color::Green,
            };
            let hit_gauge = Gauge::default()
                .block(Block::default().title("Cache hit rate"))
                .gauge_style(Style::default().fg(hit_color))
                .percent(hit_pct)
                .label(format!("{:.1}%", live_rate * 100.0));
            f.render_widget(hit_gauge, rows[0]);

            // Progress toward the cycle ceiling
            let ceiling = 1_000_000u64;
            let cyc_pct = ((m.cycle as f64 / ceiling as f64) * 100.0).clamp(0.0, 100.0) as u16;
            let cyc_gauge = Gauge::default()
                .block(Block::default().title("Cycles"))
                .gauge_style(Style::default().fg(Color::Blue))
                .percent(cyc_pct)
                .label(format!("{} / {}", m.cycle, ceiling));
            f.render_widget(cyc_gauge, rows[2]);

            // Text stats
            let ipc = if m.cycle > 0 {
                m.instructions_executed as f64 / m.cycle as f64
            } else {
                m.ipc
            };
            let text = vec![
                Line::from(vec![
                    Span::styled("Instructions: ", Style::default().fg(Color::DarkGray)),
                    Span::raw(m.instructions_executed.to_string()),
                ]),
                Line::from(vec![
                    Span::styled("IPC:          ", Style::default().fg(Color::DarkGray)),
                    Span::styled(format!("{:.2}", ipc), Style::default().fg(Color::Yellow)),
                ]),
                Line::from(vec![
                    Span::styled("Mem requests: ", Style::default().fg(Color::DarkGray)),
                    Span::raw(m.memory_requests.to_string()),
                ]),
                Line::from(vec![
                    Span::styled("Cache hits:   ", Style::default().fg(Color::DarkGray)),
                    Span::raw(m.cache_hits.to_string()),
                ]),
                Line::from(vec![
                    Span::styled("Cache misses: ", Style::default().fg(Color::DarkGray)),
                    Span::raw(m.cache_misses.to_string()),
                ]),
                Line::raw(""),
                Line::from(vec![
                    Span::styled("Events queued: ", Style::default().fg(Color::DarkGray)),
                    Span::raw(m.events_pending.to_string()),
                ]),
            ];
            f.render_widget(Paragraph::new(text), rows[4]);
        }
    }
}

// ---------------------------------------------------------------------------
// Footer
// ---------------------------------------------------------------------------

fn render_footer(f: &mut Frame, area: Rect) {
    let text = Paragraph::new(Span::styled(
        "  q / esc: quit    auto-refreshes every 200ms    reads /tmp/warpsim_live.json",
        Style::default().fg(Color::DarkGray),
    ));
    f.render_widget(text, area);
}
