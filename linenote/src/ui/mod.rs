//! UI rendering module for linenote.
//!
//! Re-exports `render()` as the single entry point called by the event loop's
//! `terminal.draw()` closure. Layout arithmetic and chrome live in
//! `layout.rs`; the source panel with its comment overlays lives in
//! `source_view.rs`.

mod layout;
pub mod help;
pub mod keybindings;
pub mod popup;
pub mod source_view;

use ratatui::Frame;

use crate::app::{AppState, Mode};
use crate::theme::Theme;
use layout::{compute_layout, render_status_bar};

/// Renders one complete frame: source panel, status bar and any popup.
///
/// Called exactly once per `AppEvent::Render` inside `terminal.draw()`. The
/// source panel caches its geometry in `state` so the next mouse event can be
/// mapped onto a line or comment.
pub fn render(frame: &mut Frame, state: &mut AppState, theme: &Theme) {
    let [source, status_bar] = compute_layout(frame);

    source_view::render_source(frame, source, state, theme);
    render_status_bar(frame, status_bar, state, theme);

    match state.mode {
        Mode::HelpOverlay => help::render_help_overlay(frame, theme, state.help_scroll),
        Mode::Compose => popup::render_compose(frame, state, theme),
        Mode::CommonPicker => popup::render_common_picker(frame, state, theme),
        Mode::Normal | Mode::Moving => {}
    }
}
