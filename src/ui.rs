use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};

use crate::app::App;
use crate::error::Severity;
use crate::layout::{LayoutDimensions, Panel, tab_slots};
use crate::logs::{LogEntry, LogLevel};
use crate::navigation::{NavigationMode, help_entries};
use crate::runtime::Runtime;

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const SELECTED: Color = Color::Rgb(24, 36, 58);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);

/// Draws the runtime state. Reads only; nothing here mutates the runtime.
pub fn render(frame: &mut Frame, runtime: &Runtime) {
    let Some(layout) = runtime.layout() else {
        return;
    };
    let app = runtime.app();

    frame.render_widget(Block::default().style(Style::default().bg(BG)), frame.area());
    render_header(frame, layout.header, runtime);
    render_tabs(frame, layout.tabs, app);
    render_table(frame, layout, app);
    if let Some(area) = layout.detail {
        render_detail(frame, area, app, layout.focus == Panel::Detail);
    }
    if let Some(area) = layout.log {
        render_logs(frame, area, runtime, layout.focus == Panel::Log);
    }
    render_status(frame, layout.status, runtime);

    if app.show_help() {
        render_help_modal(frame, runtime);
    }
    if let Some(prompt) = app.pending_confirmation_prompt() {
        render_confirmation(frame, prompt);
    }
    if app.error_modal().is_some() {
        render_error_modal(frame, app);
    }
}

fn render_header(frame: &mut Frame, area: Rect, runtime: &Runtime) {
    if area.height == 0 {
        return;
    }
    let app = runtime.app();
    let cluster = app.cluster();

    let mut spans = Vec::new();
    push_segment(&mut spans, " kubedeck ", PL_A);
    push_segment(&mut spans, &format!(" {} ", cluster.flavor.label()), PL_B);
    spans.push(Span::styled(
        format!(
            "  ctx:{}  cluster:{}  user:{}  ns:{}",
            cluster.context,
            compact_text(&cluster.cluster, 40),
            cluster.user,
            app.namespace_scope()
        ),
        Style::default().fg(Color::White),
    ));
    if let Some(pending) = runtime.pending_key() {
        spans.push(Span::styled(
            format!("  {pending}…"),
            Style::default().fg(WARN),
        ));
    }

    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        Rect::new(area.x, area.y, area.width, 1),
    );
}

fn render_tabs(frame: &mut Frame, area: Rect, app: &App) {
    if area.height == 0 {
        return;
    }
    let titles = app.tab_titles();
    let active = app.active_tab_index();
    for slot in tab_slots(&titles, active, area) {
        let style = if slot.index == active {
            Style::default()
                .fg(BG)
                .bg(ACCENT)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(MUTED).bg(PANEL)
        };
        let label = format!(" {} ", titles[slot.index]);
        frame.render_widget(
            Paragraph::new(compact_text(&label, slot.width as usize)).style(style),
            Rect::new(slot.x, area.y, slot.width, 1),
        );
    }
}

fn panel_block(title: String, focused: bool) -> Block<'static> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(if focused {
            Style::default().fg(ACCENT)
        } else {
            Style::default().fg(MUTED)
        })
        .style(Style::default().bg(PANEL))
}

// Inner rows: blank, header, separator, then resources. Mouse hit-testing
// relies on this shape.
fn render_table(frame: &mut Frame, layout: &LayoutDimensions, app: &App) {
    let area = layout.main;
    if area.width < 2 || area.height < 2 {
        return;
    }
    let focused = layout.focus == Panel::Main;
    let visible = app.visible_rows();
    let title = if app.filter().is_empty() {
        format!("{} ({})", app.active_tab().title(), visible.len())
    } else {
        format!(
            "{} ({}) /{}",
            app.active_tab().title(),
            visible.len(),
            app.filter()
        )
    };
    let block = panel_block(title, focused);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let table = app.active_table();
    if let Some(error) = table.and_then(|table| table.error.as_deref())
        && visible.is_empty()
    {
        frame.render_widget(
            Paragraph::new(Text::from(error.to_string()))
                .wrap(Wrap { trim: false })
                .style(Style::default().fg(ERROR)),
            inner,
        );
        return;
    }
    if inner.height < 4 {
        return;
    }

    let headers = table.map(|table| table.headers.clone()).unwrap_or_default();
    let constraints = column_constraints(headers.len());
    let header_area = Rect::new(inner.x, inner.y + 1, inner.width, 1);
    let header = Table::new(
        [Row::new(headers.iter().map(|header| {
            Cell::from(header.clone()).style(Style::default().add_modifier(Modifier::BOLD))
        }))
        .style(Style::default().fg(ACCENT))],
        constraints.clone(),
    )
    .column_spacing(1);
    frame.render_widget(header, header_area);
    frame.render_widget(
        Paragraph::new("─".repeat(inner.width as usize)).style(Style::default().fg(MUTED)),
        Rect::new(inner.x, inner.y + 2, inner.width, 1),
    );

    let rows_area = Rect::new(inner.x, inner.y + 3, inner.width, inner.height - 3);
    let offset = app.table_offset();
    let rows = visible
        .iter()
        .skip(offset)
        .take(rows_area.height as usize)
        .map(|row| {
            Row::new(
                row.columns.iter().map(|column| {
                    Cell::from(column.clone()).style(Style::default().fg(Color::White))
                }),
            )
        })
        .collect::<Vec<_>>();
    let body = Table::new(rows, constraints)
        .column_spacing(1)
        .row_highlight_style(Style::default().bg(SELECTED).add_modifier(Modifier::BOLD));

    let mut state = TableState::default();
    state.select(
        app.selected_index()
            .and_then(|selected| selected.checked_sub(offset)),
    );
    frame.render_stateful_widget(body, rows_area, &mut state);
}

fn render_detail(frame: &mut Frame, area: Rect, app: &App, focused: bool) {
    let (title, text) = match app.selected_row() {
        Some(row) => (
            format!("{} {}", app.active_tab().kind(), row.qualified_name()),
            highlight_yaml_text(&row.detail),
        ),
        None => ("Detail".to_string(), Text::from("Nothing selected")),
    };
    let paragraph = Paragraph::new(text)
        .block(panel_block(title, focused))
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: false })
        .scroll((app.detail_scroll(), 0));
    frame.render_widget(paragraph, area);
}

fn render_logs(frame: &mut Frame, area: Rect, runtime: &Runtime, focused: bool) {
    let app = runtime.app();
    let entries = runtime.log_view();
    let mut title = match app.log_target() {
        Some(key) => format!("Logs {key}"),
        None => "Logs (resolving…)".to_string(),
    };
    title.push_str(if app.log_follow() { " [follow]" } else { " [paused]" });
    if !app.log_filter().is_empty() {
        title.push_str(&format!(" grep:{}", app.log_filter()));
    }

    let lines = entries[app.log_window(entries.len())]
        .iter()
        .map(log_line)
        .collect::<Vec<_>>();
    let paragraph = Paragraph::new(lines)
        .block(panel_block(title, focused))
        .style(Style::default().fg(Color::White));
    frame.render_widget(paragraph, area);
}

fn log_line(entry: &LogEntry) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            entry.timestamp.format("%H:%M:%S ").to_string(),
            Style::default().fg(MUTED),
        ),
        Span::styled(
            format!("{:<5} ", entry.level.label()),
            Style::default().fg(level_color(entry.level)),
        ),
        Span::styled(format!("{} ", entry.source), Style::default().fg(PL_B)),
        Span::raw(entry.message.clone()),
    ])
}

fn level_color(level: LogLevel) -> Color {
    match level {
        LogLevel::Debug => MUTED,
        LogLevel::Info => ACCENT,
        LogLevel::Warn => WARN,
        LogLevel::Error => ERROR,
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Info => Color::White,
        Severity::Warning => WARN,
        Severity::Error | Severity::Critical => ERROR,
    }
}

fn render_status(frame: &mut Frame, area: Rect, runtime: &Runtime) {
    if area.height == 0 {
        return;
    }
    let app = runtime.app();
    let mode = runtime.mode();

    let mut spans = Vec::new();
    push_segment(&mut spans, &format!(" {} ", mode.label()), PL_A);
    push_segment(&mut spans, &format!(" {} ", runtime.focus().title()), PL_B);
    spans.push(Span::raw(" "));
    match mode {
        NavigationMode::Search => spans.push(prompt_span("/", app.input())),
        NavigationMode::Command => spans.push(prompt_span(":", app.input())),
        NavigationMode::Insert => spans.push(prompt_span("grep> ", app.input())),
        NavigationMode::Normal => spans.push(Span::styled(
            app.status().text.clone(),
            Style::default().fg(severity_color(app.status().severity)),
        )),
    }

    let mut lines = vec![Line::from(spans)];
    if area.height > 1 {
        lines.push(Line::from(Span::styled(
            "?:help  tab:focus  /:search  ::command  l:logs  d:detail  ctrl+d:delete  q:quit",
            Style::default().fg(MUTED),
        )));
    }
    frame.render_widget(
        Paragraph::new(lines).style(Style::default().bg(BG)),
        area,
    );
}

fn prompt_span(prefix: &str, input: &str) -> Span<'static> {
    Span::styled(
        format!("{prefix}{input}█"),
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
    )
}

fn render_help_modal(frame: &mut Frame, runtime: &Runtime) {
    let area = centered_rect(70, 72, frame.area());
    frame.render_widget(Clear, area);

    let app = runtime.app();
    let mut lines = vec![
        Line::from(format!(
            "kubedeck help  mode:{}  scope:{}  tab:{}",
            runtime.mode().label(),
            app.namespace_scope(),
            app.active_tab().title()
        )),
        Line::from(""),
    ];
    for (keys, description) in help_entries() {
        lines.push(Line::from(vec![
            Span::styled(format!("{keys:<18}"), Style::default().fg(ACCENT)),
            Span::raw(description),
        ]));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        ":pods :svc :deploy …  :ns <name>  :ns all  :ctx <name>  :logs  :refresh  :q",
        Style::default().fg(MUTED),
    )));

    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(panel_block("Help".to_string(), true))
        .style(Style::default().fg(Color::White));
    frame.render_widget(modal, area);
}

fn render_confirmation(frame: &mut Frame, prompt: &str) {
    let area = centered_rect(50, 20, frame.area());
    frame.render_widget(Clear, area);
    let modal = Paragraph::new(vec![
        Line::from(format!("{prompt}?")),
        Line::from(""),
        Line::from(Span::styled("y: confirm   n/esc: cancel", Style::default().fg(MUTED))),
    ])
    .wrap(Wrap { trim: false })
    .block(
        Block::default()
            .title("Confirm")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(WARN))
            .style(Style::default().bg(PANEL)),
    )
    .style(Style::default().fg(Color::White));
    frame.render_widget(modal, area);
}

fn render_error_modal(frame: &mut Frame, app: &App) {
    let Some(error) = app.error_modal() else {
        return;
    };
    let area = centered_rect(60, 30, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(Span::styled(
            format!("{} ({:?})", error.category.label(), error.severity),
            Style::default().fg(ERROR).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(error.message.clone()),
        Line::from(""),
    ];
    let hint = match error.recovery_action() {
        Some(action) => format!("r: {}   esc/enter: dismiss", action.label()),
        None => "esc/enter: dismiss".to_string(),
    };
    lines.push(Line::from(Span::styled(hint, Style::default().fg(MUTED))));

    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title("Error")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ERROR))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White));
    frame.render_widget(modal, area);
}

fn highlight_yaml_text(input: &str) -> Text<'static> {
    let lines = input
        .lines()
        .map(highlight_yaml_line)
        .collect::<Vec<Line<'static>>>();
    Text::from(lines)
}

fn highlight_yaml_line(line: &str) -> Line<'static> {
    let indent_len = line
        .as_bytes()
        .iter()
        .take_while(|byte| **byte == b' ' || **byte == b'\t')
        .count();
    let indent = &line[..indent_len];
    let trimmed = &line[indent_len..];

    let mut spans = vec![Span::raw(indent.to_string())];
    if trimmed.is_empty() {
        return Line::from(spans);
    }

    if let Some(rest) = trimmed.strip_prefix("- ") {
        spans.push(Span::styled("- ", Style::default().fg(ACCENT)));
        spans.extend(highlight_yaml_content(rest));
        return Line::from(spans);
    }

    spans.extend(highlight_yaml_content(trimmed));
    Line::from(spans)
}

fn highlight_yaml_content(content: &str) -> Vec<Span<'static>> {
    let Some((key, value)) = split_yaml_key_value(content) else {
        return vec![Span::styled(
            content.to_string(),
            Style::default().fg(Color::White),
        )];
    };

    let mut spans = vec![
        Span::styled(
            key.to_string(),
            Style::default().fg(Color::Rgb(103, 232, 249)),
        ),
        Span::styled(":", Style::default().fg(MUTED)),
    ];
    if !value.trim().is_empty() {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(
            value.trim_start().to_string(),
            Style::default().fg(yaml_value_color(value.trim())),
        ));
    }
    spans
}

fn split_yaml_key_value(content: &str) -> Option<(&str, &str)> {
    let (key, value) = content.split_once(':')?;
    let key = key.trim_end();
    if key.is_empty() || key.contains(' ') {
        return None;
    }
    Some((key, value))
}

fn yaml_value_color(value: &str) -> Color {
    if value.starts_with('"') || value.starts_with('\'') {
        Color::Rgb(125, 211, 252)
    } else if matches!(value, "true" | "false" | "null" | "~") {
        WARN
    } else if value.parse::<f64>().is_ok() {
        Color::Rgb(251, 146, 60)
    } else {
        Color::Rgb(147, 197, 253)
    }
}

fn push_segment(spans: &mut Vec<Span<'static>>, text: &str, bg: Color) {
    spans.push(Span::styled(
        text.to_string(),
        Style::default()
            .fg(Color::White)
            .bg(bg)
            .add_modifier(Modifier::BOLD),
    ));
}

fn compact_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut out = value
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn column_constraints(columns: usize) -> Vec<Constraint> {
    if columns == 0 {
        return vec![Constraint::Percentage(100)];
    }

    let width = (100 / columns as u16).max(1);
    (0..columns)
        .map(|_| Constraint::Percentage(width))
        .collect()
}
