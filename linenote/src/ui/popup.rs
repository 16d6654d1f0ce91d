//! Compose box and common-comment picker.

use ratatui::{
    Frame,
    layout::{Constraint, Rect},
    style::{Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Clear, Paragraph, Wrap},
};

use crate::app::AppState;
use crate::theme::Theme;
use crate::ui::layout::modal_block;

/// Bottom-anchored popup area of `height` rows spanning 80% of the width.
fn bottom_area(frame: &Frame, height: u16) -> Rect {
    let area = frame.area();
    let height = height.min(area.height.saturating_sub(2));
    let width = area.width * 4 / 5;
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.bottom().saturating_sub(height + 1),
        width,
        height,
    }
}

/// Draws the compose buffer with a trailing block cursor.
pub fn render_compose(frame: &mut Frame, state: &AppState, theme: &Theme) {
    let area = bottom_area(frame, 8);
    frame.render_widget(Clear, area);

    let title = format!(" Comment on line {} · Enter submit, Esc discard ", state.cursor);
    let mut lines: Vec<Line> = state.compose.split('\n').map(|l| Line::from(l.to_owned())).collect();
    if let Some(last) = lines.last_mut() {
        last.spans.push(Span::styled("█", Style::default().fg(theme.border_modal)));
    }

    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .block(modal_block(&title, theme))
            .wrap(Wrap { trim: false }),
        area,
    );
}

/// Lists the common comments with their pick keys.
pub fn render_common_picker(frame: &mut Frame, state: &AppState, theme: &Theme) {
    let area = frame
        .area()
        .centered(Constraint::Percentage(70), Constraint::Length(9));
    frame.render_widget(Clear, area);

    let lines: Vec<Line> = if state.common_loading {
        vec![Line::from("Loading…")]
    } else if state.common.is_empty() {
        vec![Line::from("No common comments yet.")]
    } else {
        state
            .common
            .iter()
            .enumerate()
            .map(|(i, c)| {
                Line::from(vec![
                    Span::styled(
                        format!(" {} ", i + 1),
                        Style::default().fg(theme.comment_author).add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(c.text.lines().next().unwrap_or_default().to_owned()),
                ])
            })
            .collect()
    };

    frame.render_widget(
        Paragraph::new(Text::from(lines)).block(modal_block(" Common comments · Esc to close ", theme)),
        area,
    );
}
