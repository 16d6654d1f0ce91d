//! Screen layout for linenote.
//!
//! Pure layout arithmetic plus the two pieces of chrome every frame draws: the
//! panel border and the status bar. The source panel fills the terminal above
//! a 1-row status bar.

use ratatui::{
    Frame,
    layout::{Constraint, Layout, Margin, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Paragraph},
};

use crate::app::{AppState, Mode};
use crate::theme::Theme;

/// Returns `[source_panel, status_bar]` for the current frame.
pub fn compute_layout(frame: &Frame) -> [Rect; 2] {
    frame
        .area()
        .layout(&Layout::vertical([Constraint::Fill(1), Constraint::Length(1)]))
}

/// Returns the inner `Rect` of a panel after removing the 1-cell border on each side.
pub fn inner_rect(area: Rect) -> Rect {
    area.inner(Margin { vertical: 1, horizontal: 1 })
}

/// Builds a bordered `Block` for a panel.
///
/// Applies `BorderType::Thick` when the panel has keyboard focus and
/// `BorderType::Plain` while a popup sits on top of it.
///
/// # Arguments
///
/// * `title` — panel title shown in the top border
/// * `is_focused` — `true` when this panel has keyboard focus
/// * `theme` — active color theme
pub fn panel_block<'a>(title: &'a str, is_focused: bool, theme: &'a Theme) -> Block<'a> {
    let border_type = if is_focused { BorderType::Thick } else { BorderType::Plain };
    Block::bordered()
        .title(title)
        .border_type(border_type)
        .border_style(Style::default().fg(theme.border))
}

/// Builds the bordered block used by every popup.
pub fn modal_block<'a>(title: &'a str, theme: &'a Theme) -> Block<'a> {
    Block::bordered()
        .title(title)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.border_modal))
}

/// Renders the 1-row status bar at the bottom of the terminal.
///
/// Shows the mode indicator, the cursor position and comment count, and the
/// latest status message (errors in the error color). Never renders blank.
pub fn render_status_bar(frame: &mut Frame, area: Rect, state: &AppState, theme: &Theme) {
    let (mode_text, mode_fg) = match state.mode {
        Mode::Compose => (" COMMENT ", theme.status_mode_insert),
        Mode::Moving => (" MOVE ", theme.status_mode_insert),
        Mode::CommonPicker => (" COMMON ", theme.status_mode_insert),
        Mode::Normal | Mode::HelpOverlay => (" NORMAL ", theme.status_mode_normal),
    };

    let mut spans = vec![
        Span::styled(mode_text, Style::default().fg(mode_fg).add_modifier(Modifier::BOLD)),
        Span::raw(format!(
            " {}:{}  {} comments ",
            state.file_name,
            state.cursor,
            state.surface.store().len()
        )),
    ];
    if state.loading {
        spans.push(Span::raw(" loading… "));
    } else if state.pending_creates > 0 {
        spans.push(Span::raw(format!(" saving {}… ", state.pending_creates)));
    }
    if let Some(status) = &state.status {
        let style = if status.is_error {
            Style::default().fg(theme.status_error).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        spans.push(Span::styled(format!(" {}", status.text), style));
    }

    frame.render_widget(
        Paragraph::new(Line::from(spans))
            .style(Style::default().bg(theme.status_bar_bg).fg(theme.status_bar_fg)),
        area,
    );
}
