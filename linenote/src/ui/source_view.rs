//! Source panel renderer for linenote.
//!
//! Draws the registry in display order: each source line, then the comment
//! units mounted under it. Row targets for the whole document are computed
//! first (cheap), the scroll offset is adjusted to keep the cursor line in
//! view, and only the visible window is materialised into styled `Line`s, so
//! rendering cost follows the viewport rather than the file length.

use linenote_core::overlay::CommentUnit;
use linenote_core::registry::{LayoutRow, LineUnit};
use linenote_core::surface::ReviewSurface;
use linenote_core::types::LineNumber;
use ratatui::{
    Frame,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem},
};

use crate::app::{follow_scroll, AppState, RowTarget};
use crate::markup;
use crate::theme::Theme;
use crate::ui::layout::{inner_rect, panel_block};

/// What a single screen row draws.
enum RowKind<'a> {
    Source(&'a LineUnit),
    Header(&'a CommentUnit, usize),
    Body(&'a CommentUnit, usize, &'a str),
}

struct Row<'a> {
    target: RowTarget,
    kind: RowKind<'a>,
}

/// Renders the source panel and caches its geometry and visible row targets
/// in `state` for mouse hit-testing.
///
/// # Arguments
///
/// * `frame` — current render frame
/// * `area` — the `Rect` for the panel (includes borders)
/// * `state` — app state; `scroll`, `rows`, `source_area` and `viewport_height` are written
/// * `theme` — active color theme
pub fn render_source(frame: &mut Frame, area: Rect, state: &mut AppState, theme: &Theme) {
    let title = format!(" {} ", state.file_name);
    let block = panel_block(&title, !state.mode.is_modal(), theme);
    let inner = inner_rect(area);
    frame.render_widget(block, area);

    state.source_area = inner;
    state.viewport_height = inner.height;

    let rows = layout_rows(&state.surface);
    let cursor_row = rows
        .iter()
        .position(|r| r.target == RowTarget::Line(state.cursor))
        .unwrap_or(0);
    let block_rows = rows[cursor_row..]
        .iter()
        .take_while(|r| r.target.line() == state.cursor)
        .count();
    state.scroll = follow_scroll(state.scroll, inner.height, cursor_row, block_rows);

    let total = rows.len();
    let start = state.scroll.min(total.saturating_sub(1));
    let end = (start + usize::from(inner.height)).min(total);
    let gutter_width = digits(state.line_count());

    let items: Vec<ListItem> = rows[start..end]
        .iter()
        .map(|row| ListItem::new(draw_row(row, state, theme, gutter_width)))
        .collect();
    state.rows = rows[start..end].iter().map(|r| r.target.clone()).collect();

    frame.render_widget(List::new(items), inner);
}

fn layout_rows(surface: &ReviewSurface) -> Vec<Row<'_>> {
    let mut rows = Vec::new();
    for layout_row in surface.registry().layout() {
        match layout_row {
            LayoutRow::Line(unit) => rows.push(Row {
                target: RowTarget::Line(unit.number),
                kind: RowKind::Source(unit),
            }),
            LayoutRow::Container(handle, container) => {
                for (pos, unit) in container.units.iter().enumerate() {
                    let target = RowTarget::Comment { id: unit.comment_id.clone(), line: handle.line() };
                    rows.push(Row { target: target.clone(), kind: RowKind::Header(unit, pos) });
                    for text in unit.body_text.lines() {
                        rows.push(Row { target: target.clone(), kind: RowKind::Body(unit, pos, text) });
                    }
                }
            }
        }
    }
    rows
}

fn draw_row(row: &Row<'_>, state: &AppState, theme: &Theme, gutter_width: usize) -> Line<'static> {
    match row.kind {
        RowKind::Source(unit) => source_line(unit, state, theme, gutter_width),
        RowKind::Header(unit, pos) => {
            let border = border_style(unit, pos, state, theme);
            let mut spans = vec![
                Span::raw(" ".repeat(gutter_width + 1)),
                Span::styled("┌ ", border),
                Span::styled(format!("[{}] ", unit.avatar.initials), border),
                Span::styled(
                    unit.author.clone(),
                    Style::default().fg(theme.comment_author).add_modifier(Modifier::BOLD),
                ),
                Span::styled(format!(" · {}", unit.role.label()), Style::default().fg(theme.comment_meta)),
            ];
            if let Some(label) = &unit.timestamp_label {
                spans.push(Span::styled(format!(" · {label}"), Style::default().fg(theme.comment_meta)));
            }
            if state.is_pending(&unit.comment_id) {
                spans.push(Span::styled(" (saving…)", Style::default().fg(theme.comment_pending)));
            } else if unit.editable && is_selected(unit, pos, state) {
                spans.push(Span::styled(" d delete · m move", Style::default().fg(theme.comment_meta)));
            }
            Line::from(spans)
        }
        RowKind::Body(unit, pos, text) => Line::from(vec![
            Span::raw(" ".repeat(gutter_width + 1)),
            Span::styled("│ ", border_style(unit, pos, state, theme)),
            Span::styled(text.to_owned(), Style::default().fg(theme.comment_text)),
        ]),
    }
}

fn source_line(unit: &LineUnit, state: &AppState, theme: &Theme, gutter_width: usize) -> Line<'static> {
    let visual = state.surface.store().visual(unit.number).unwrap_or_default();

    let mut gutter_style = Style::default().fg(theme.gutter);
    if visual.marked_permanently {
        gutter_style = gutter_style.fg(theme.gutter_marked).add_modifier(Modifier::BOLD);
    }
    let marker = if visual.marked_permanently { "●" } else { " " };

    let mut line = markup::to_line(&unit.content);
    line.spans.insert(0, Span::styled(format!("{:>gutter_width$}{marker}", unit.number), gutter_style));

    let bg = if visual.drag_target_active {
        Some(theme.drop_target_bg)
    } else if unit.number == state.cursor {
        Some(theme.cursor_line_bg)
    } else if visual.hovered {
        Some(theme.hover_bg)
    } else {
        None
    };
    match bg {
        Some(bg) => line.style(Style::default().bg(bg)),
        None => line,
    }
}

fn is_selected(unit: &CommentUnit, pos: usize, state: &AppState) -> bool {
    unit.line == state.cursor && pos == state.selected
}

fn border_style(unit: &CommentUnit, pos: usize, state: &AppState, theme: &Theme) -> Style {
    if is_selected(unit, pos, state) {
        Style::default().fg(theme.comment_selected)
    } else if unit.is_auto {
        Style::default().fg(theme.comment_auto_border)
    } else {
        Style::default().fg(theme.comment_border)
    }
}

fn digits(count: LineNumber) -> usize {
    count.max(1).to_string().len()
}
