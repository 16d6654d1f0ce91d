//! Help overlay renderer for linenote.
//!
//! Draws a centred modal box over the source panel, calling
//! `frame.render_widget(Clear, area)` first so the modal effect needs no second
//! draw call.

use ratatui::{
    Frame,
    layout::Constraint,
    text::{Line, Text},
    widgets::{Clear, Paragraph, Wrap},
};

use crate::theme::Theme;
use crate::ui::layout::modal_block;

/// Renders the help overlay, scrolled vertically by `help_scroll` rows.
///
/// Skipped on terminals narrower than 60 columns to avoid a zero-height `Rect`.
pub fn render_help_overlay(frame: &mut Frame, theme: &Theme, help_scroll: u16) {
    if frame.area().width < 60 {
        return;
    }

    let overlay_area = frame
        .area()
        .centered(Constraint::Percentage(80), Constraint::Percentage(80));
    frame.render_widget(Clear, overlay_area);

    frame.render_widget(
        Paragraph::new(build_help_text())
            .block(modal_block(" Help · j/k scroll, ? or Esc to dismiss ", theme))
            .wrap(Wrap { trim: false })
            .scroll((help_scroll, 0)),
        overlay_area,
    );
}

fn build_help_text() -> Text<'static> {
    Text::from(vec![
        Line::from("Navigation"),
        Line::from("  j / k         Cursor down / up one line"),
        Line::from("  g / G         Jump to first / last line"),
        Line::from("  Ctrl-d / u    Half page down / up"),
        Line::from("  Ctrl-f / b    Full page down / up"),
        Line::from("  Tab           Select next comment on the line"),
        Line::from(""),
        Line::from("Comments"),
        Line::from("  c             Comment on the cursor line"),
        Line::from("  Enter         Submit (Alt-Enter for a newline, Esc discards)"),
        Line::from("  d             Delete the selected comment"),
        Line::from("  m             Move the selected comment; j/k then Enter, Esc cancels"),
        Line::from("  p             Pick a common comment (staff), 1-5 to attach"),
        Line::from(""),
        Line::from("Mouse"),
        Line::from("  Drag          Drag a comment onto another line to move it"),
        Line::from("  Click         Move the cursor / select a comment"),
        Line::from("  Wheel         Move the cursor"),
        Line::from(""),
        Line::from("General"),
        Line::from("  ?             Open / close this help overlay"),
        Line::from("  q / Esc       Quit"),
    ])
}
