use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;

use skimr::config::ReadingMode;
use skimr::quiz::format_clock;
use skimr::services::{QuestionKind, SessionExit};
use skimr::session::{Phase, SessionController};
use skimr::text::split_at_orp;

use crate::App;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

/// Highlight viewport settings are in pixels; a terminal cell is roughly
/// this many pixels wide and tall.
const PX_PER_COLUMN: u16 = 10;
const PX_PER_ROW: u16 = 20;

/// Countdown turns red below this many seconds.
const QUIZ_WARNING_SECS: u32 = 30;

const OPTION_KEYS: [char; 4] = ['1', '2', '3', '4'];

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let session = &self.session;
        match session.phase() {
            Phase::Ready => render_ready(session, area, buf),
            Phase::Reading => render_reading(self, area, buf),
            Phase::Quiz => render_quiz(self, area, buf),
            Phase::Finished(_) => render_finished(session, area, buf),
        }
    }
}

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn dim() -> Style {
    Style::default().add_modifier(Modifier::DIM)
}

fn italic() -> Style {
    Style::default().add_modifier(Modifier::ITALIC)
}

fn render_ready(session: &SessionController, area: Rect, buf: &mut Buffer) {
    let exercise = session.exercise();
    let mut lines = vec![
        Line::from(Span::styled(exercise.title.clone(), bold())),
        Line::from(""),
        Line::from(Span::styled(
            format!(
                "{} words · {} wpm · {}",
                session.words().len(),
                session.configured_wpm(),
                session.mode()
            ),
            dim(),
        )),
    ];
    if let Some(status) = session.attempt_status() {
        let colour = if status.can_rank { Color::Green } else { Color::Yellow };
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            status.message.clone(),
            Style::default().fg(colour),
        )));
    }
    if session.is_ranked_attempt() {
        lines.push(Line::from(Span::styled(
            "Ranked: leaving the terminal, copying or devtools shortcuts cancel the attempt.",
            Style::default().fg(Color::Red),
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "(space) start / (esc)ape",
        italic(),
    )));

    let height = lines.len() as u16;
    let top = area.height.saturating_sub(height) / 2;
    let inner = Rect::new(area.x, area.y + top, area.width, height.min(area.height));
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .render(inner, buf);
}

fn render_reading(app: &App, area: Rect, buf: &mut Buffer) {
    let session = &app.session;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints(
            [
                Constraint::Min(1),
                Constraint::Length(1), // progress gauge
                Constraint::Length(1), // stats
                Constraint::Length(1), // legend
            ]
            .as_ref(),
        )
        .split(area);

    match session.mode() {
        ReadingMode::Rsvp => render_rsvp(session, chunks[0], buf),
        ReadingMode::Highlight => render_highlight(session, chunks[0], buf),
        ReadingMode::Chunking => render_chunk(session, chunks[0], buf),
    }

    Gauge::default()
        .gauge_style(Style::default().fg(Color::Magenta))
        .ratio((session.progress_percent() / 100.0).clamp(0.0, 1.0))
        .label(format!("{:.0}%", session.progress_percent()))
        .render(chunks[1], buf);

    let mut stats = format!(
        "{} wpm target   {} words left   ~{}s",
        session.configured_wpm(),
        session.words_remaining(),
        session.estimated_seconds_left()
    );
    if session.pacing().paused {
        stats.push_str("   PAUSED");
    }
    Paragraph::new(Span::styled(stats, bold()))
        .alignment(Alignment::Center)
        .render(chunks[2], buf);

    let legend = if session.can_pause() {
        "(space) pause / (r)estart / (esc)ape"
    } else {
        "(r)estart / (esc)ape"
    };
    Paragraph::new(Span::styled(legend, italic())).render(chunks[3], buf);

    if let Some(notice) = app.notice.as_ref().filter(|_| area.height > 4) {
        let y = chunks[3].y.saturating_sub(3).max(area.y);
        Paragraph::new(Span::styled(notice.clone(), Style::default().fg(Color::Yellow)))
            .alignment(Alignment::Center)
            .render(Rect::new(area.x, y, area.width, 1), buf);
    }
}

fn render_rsvp(session: &SessionController, area: Rect, buf: &mut Buffer) {
    if area.is_empty() {
        return;
    }
    let word = session.current_word().unwrap_or("");
    let (before, pivot, after) = split_at_orp(word);

    // Keep the pivot letter in a fixed column so the eye never moves.
    let centre = area.width / 2;
    let x = area.x + centre.saturating_sub(before.width() as u16);
    let y = area.y + area.height / 2;
    let line = Line::from(vec![
        Span::styled(before.to_string(), bold()),
        Span::styled(pivot.to_string(), bold().fg(Color::Red)),
        Span::styled(after.to_string(), bold()),
    ]);
    let width = area.width.saturating_sub(x - area.x);
    Paragraph::new(line).render(Rect::new(x, y, width, 1), buf);

    if area.height >= 3 {
        let marker = Rect::new(area.x + centre, y.saturating_sub(1), 1, 1);
        Paragraph::new(Span::styled("▼", dim())).render(marker, buf);
    }
}

/// Greedy word wrap. Returns the index range of the words on each line.
pub fn layout_lines(words: &[String], width: usize) -> Vec<std::ops::Range<usize>> {
    let width = width.max(1);
    let mut lines = vec![];
    let mut start = 0;
    let mut used = 0;
    for (idx, word) in words.iter().enumerate() {
        let w = word.width().max(1);
        let needed = if used == 0 { w } else { used + 1 + w };
        if used > 0 && needed > width {
            lines.push(start..idx);
            start = idx;
            used = w;
        } else {
            used = needed;
        }
    }
    if start < words.len() {
        lines.push(start..words.len());
    }
    lines
}

fn render_highlight(session: &SessionController, area: Rect, buf: &mut Buffer) {
    let settings = session.settings();
    let cols = (settings.highlight_width / PX_PER_COLUMN).clamp(10, area.width.max(10));
    let rows = (settings.highlight_height / PX_PER_ROW).clamp(1, area.height.max(1));
    let cols = cols.min(area.width);
    let rows = rows.min(area.height);

    let block = Block::default().borders(Borders::ALL).border_style(dim());
    let outer = Rect::new(
        area.x + area.width.saturating_sub(cols) / 2,
        area.y + area.height.saturating_sub(rows) / 2,
        cols,
        rows,
    );
    let inner = block.inner(outer);
    block.render(outer, buf);
    if inner.width == 0 || inner.height == 0 {
        return;
    }

    let words = session.words().words();
    let cursor = session.cursor();
    let lines = layout_lines(words, inner.width as usize);
    let cursor_line = lines
        .iter()
        .position(|r| r.contains(&cursor))
        .unwrap_or(lines.len().saturating_sub(1));
    let first = cursor_line.saturating_sub(inner.height as usize / 2);

    let rendered: Vec<Line> = lines
        .iter()
        .skip(first)
        .take(inner.height as usize)
        .map(|range| {
            let mut spans = vec![];
            for idx in range.clone() {
                if idx > range.start {
                    spans.push(Span::raw(" "));
                }
                let style = match idx.cmp(&cursor) {
                    std::cmp::Ordering::Less => dim(),
                    std::cmp::Ordering::Equal => bold().fg(Color::Black).bg(Color::Yellow),
                    std::cmp::Ordering::Greater => Style::default(),
                };
                spans.push(Span::styled(words[idx].clone(), style));
            }
            Line::from(spans)
        })
        .collect();
    Paragraph::new(rendered).render(inner, buf);
}

fn render_chunk(session: &SessionController, area: Rect, buf: &mut Buffer) {
    if area.is_empty() {
        return;
    }
    let chunk = session
        .words()
        .chunk_at(session.cursor(), session.settings().chunk_size)
        .join(" ");
    let y = area.y + area.height / 2;
    Paragraph::new(Span::styled(chunk, bold()))
        .alignment(Alignment::Center)
        .render(Rect::new(area.x, y, area.width, 1), buf);
}

fn render_quiz(app: &App, area: Rect, buf: &mut Buffer) {
    let session = &app.session;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(1)
        .constraints(
            [
                Constraint::Length(1), // countdown
                Constraint::Length(1),
                Constraint::Min(1), // questions
                Constraint::Length(1), // legend
            ]
            .as_ref(),
        )
        .split(area);

    if let Some(timer) = session.quiz_timer() {
        let style = if timer.remaining_seconds < QUIZ_WARNING_SECS {
            bold().fg(Color::Red)
        } else {
            bold()
        };
        let answered = session.answers().len();
        Paragraph::new(Line::from(vec![
            Span::styled(format_clock(timer.remaining_seconds), style),
            Span::styled(
                format!("   {answered}/{} answered", session.questions().len()),
                dim(),
            ),
        ]))
        .alignment(Alignment::Center)
        .render(chunks[0], buf);
    }

    let mut lines = vec![];
    let mut selected_line = 0;
    for (idx, question) in session.questions().iter().enumerate() {
        let selected = idx == app.selected;
        if selected {
            selected_line = lines.len();
        }
        let marker = if selected { "▶ " } else { "  " };
        let answer = session.answers().get(&question.id);
        lines.push(Line::from(Span::styled(
            format!("{marker}{}. {}", idx + 1, question.text),
            if selected { bold() } else { Style::default() },
        )));
        match &question.kind {
            QuestionKind::Choice { options } => {
                for (opt_idx, option) in options.iter().enumerate() {
                    let key = OPTION_KEYS.get(opt_idx).copied().unwrap_or(' ');
                    let chosen = answer.as_deref() == Some(option.as_str());
                    let style = if chosen {
                        bold().fg(Color::Green)
                    } else {
                        dim()
                    };
                    lines.push(Line::from(Span::styled(
                        format!("     ({key}) {option}"),
                        style,
                    )));
                }
            }
            QuestionKind::Open => {
                let text = answer.unwrap_or_default();
                let cursor = if selected { "_" } else { "" };
                lines.push(Line::from(Span::styled(
                    format!("     > {text}{cursor}"),
                    Style::default().fg(Color::Cyan),
                )));
            }
        }
        lines.push(Line::from(""));
    }

    let visible = chunks[2].height as usize;
    let scroll = selected_line.saturating_sub(visible / 3) as u16;
    Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0))
        .render(chunks[2], buf);

    Paragraph::new(Span::styled(
        "(↑/↓) question / (1-4) choose / type to answer / (enter) check answers",
        italic(),
    ))
    .render(chunks[3], buf);
}

fn render_finished(session: &SessionController, area: Rect, buf: &mut Buffer) {
    let mut lines = vec![];
    match session.exit() {
        Some(SessionExit::Completed(report)) => {
            lines.push(Line::from(Span::styled(
                format!(
                    "{} wpm   {:.0}% acc   {} pts",
                    report.wpm, report.accuracy, report.ranking_points
                ),
                bold(),
            )));
            lines.push(Line::from(Span::styled(
                report.message.clone(),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC),
            )));
        }
        Some(SessionExit::Failed { message }) => {
            lines.push(Line::from(Span::styled(
                message.clone(),
                bold().fg(Color::Yellow),
            )));
        }
        Some(SessionExit::CheatCancelled { reason }) => {
            lines.push(Line::from(Span::styled(
                "Session cancelled",
                bold().fg(Color::Red),
            )));
            lines.push(Line::from(Span::styled(
                format!("Reason: {reason}"),
                Style::default().fg(Color::Red),
            )));
            lines.push(Line::from(Span::styled(
                "The attempt was recorded with zero credit.",
                dim(),
            )));
        }
        Some(SessionExit::Abandoned) | None => {
            lines.push(Line::from(Span::styled("Session left", dim())));
        }
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled("(esc)ape", italic())));

    let height = lines.len() as u16;
    let top = area.height.saturating_sub(height) / 2;
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .render(
            Rect::new(area.x, area.y + top, area.width, height.min(area.height)),
            buf,
        );
}
