//! Keybinding dispatcher for linenote.
//!
//! Translates raw crossterm key and mouse events into `AppState` mutations and
//! returns a `KeyAction` telling the event loop whether to continue, quit, or
//! start a comment-store call. The dispatcher branches first on `state.mode`
//! so every mode has an isolated handler.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use linenote_core::drag::DragEvent;
use linenote_core::types::LineNumber;
use ratatui::layout::Position;

use crate::app::{AppState, Mode, RemoteOp, RowTarget};

/// Control-flow signal returned from the dispatchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    /// Continue the event loop normally.
    Continue,
    Quit,
    /// Start this call in the background, then continue.
    Remote(RemoteOp),
}

impl From<Option<RemoteOp>> for KeyAction {
    fn from(op: Option<RemoteOp>) -> Self {
        op.map_or(KeyAction::Continue, KeyAction::Remote)
    }
}

/// Dispatches a key event to the handler matching the current mode.
///
/// # Arguments
///
/// * `key`   — the raw crossterm key event (code + modifiers)
/// * `state` — mutable reference to all UI state
pub fn handle_key(key: KeyEvent, state: &mut AppState) -> KeyAction {
    match state.mode {
        Mode::HelpOverlay => handle_help(key, state),
        Mode::Compose => handle_compose(key, state),
        Mode::Moving => handle_moving(key, state),
        Mode::CommonPicker => handle_common(key, state),
        Mode::Normal => handle_normal(key, state),
    }
}

// ---------------------------------------------------------------------------
// Normal mode
// ---------------------------------------------------------------------------

fn handle_normal(key: KeyEvent, state: &mut AppState) -> KeyAction {
    if let Some(action) = handle_cursor_key(key, state) {
        return action;
    }

    match key.code {
        KeyCode::Tab => {
            state.next_comment();
            KeyAction::Continue
        }
        KeyCode::Char('c') | KeyCode::Char('i') => {
            state.start_compose();
            KeyAction::Continue
        }
        KeyCode::Char('d') | KeyCode::Delete => state.delete_selected().into(),
        KeyCode::Char('m') => {
            state.start_move();
            KeyAction::Continue
        }
        KeyCode::Char('p') => state.open_common().into(),
        KeyCode::Char('?') => {
            state.help_scroll = 0;
            state.mode = Mode::HelpOverlay;
            KeyAction::Continue
        }
        KeyCode::Char('q') | KeyCode::Esc => KeyAction::Quit,
        _ => KeyAction::Continue,
    }
}

/// Handles cursor movement keys: j / k / g / G and Ctrl combos.
///
/// Shared by Normal and Moving mode; in Moving mode the cursor line is the
/// drop target, so moving it re-highlights the target.
///
/// Returns `Some(KeyAction)` when the key was consumed, `None` when the key
/// should fall through to the rest of the mode handler.
fn handle_cursor_key(key: KeyEvent, state: &mut AppState) -> Option<KeyAction> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let page = i64::from(state.viewport_height.max(1));

    match key.code {
        KeyCode::Char('j') | KeyCode::Down => state.move_cursor(1),
        KeyCode::Char('k') | KeyCode::Up => state.move_cursor(-1),
        KeyCode::Char('g') | KeyCode::Home => state.cursor_top(),
        KeyCode::Char('G') | KeyCode::End => state.cursor_bottom(),
        KeyCode::Char('d') if ctrl => state.half_page(true),
        KeyCode::Char('u') if ctrl => state.half_page(false),
        KeyCode::Char('f') if ctrl => state.move_cursor(page),
        KeyCode::PageDown => state.move_cursor(page),
        KeyCode::Char('b') if ctrl => state.move_cursor(-page),
        KeyCode::PageUp => state.move_cursor(-page),
        _ => return None,
    }
    Some(KeyAction::Continue)
}

// ---------------------------------------------------------------------------
// Compose mode
// ---------------------------------------------------------------------------

/// Edits the compose buffer. `Enter` submits, `Alt-Enter` inserts a newline,
/// `Esc` discards the draft.
fn handle_compose(key: KeyEvent, state: &mut AppState) -> KeyAction {
    match key.code {
        KeyCode::Esc => {
            state.cancel_compose();
            KeyAction::Continue
        }
        KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => {
            state.compose.push('\n');
            KeyAction::Continue
        }
        KeyCode::Enter => state.submit_compose().into(),
        KeyCode::Backspace => {
            state.compose.pop();
            KeyAction::Continue
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            state.compose.push(c);
            KeyAction::Continue
        }
        _ => KeyAction::Continue,
    }
}

// ---------------------------------------------------------------------------
// Moving mode
// ---------------------------------------------------------------------------

fn handle_moving(key: KeyEvent, state: &mut AppState) -> KeyAction {
    if let Some(action) = handle_cursor_key(key, state) {
        return action;
    }
    match key.code {
        KeyCode::Enter | KeyCode::Char('m') => state.drop_move().into(),
        KeyCode::Esc | KeyCode::Char('q') => {
            state.cancel_move();
            KeyAction::Continue
        }
        _ => KeyAction::Continue,
    }
}

// ---------------------------------------------------------------------------
// CommonPicker mode
// ---------------------------------------------------------------------------

/// `1`..`9` attach the matching common comment; `Esc` closes the picker.
fn handle_common(key: KeyEvent, state: &mut AppState) -> KeyAction {
    match key.code {
        KeyCode::Char(c @ '1'..='9') => {
            let index = (c as usize) - ('1' as usize);
            state.pick_common(index).into()
        }
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('p') => {
            state.mode = Mode::Normal;
            KeyAction::Continue
        }
        _ => KeyAction::Continue,
    }
}

// ---------------------------------------------------------------------------
// HelpOverlay mode
// ---------------------------------------------------------------------------

/// Any of `?`, `Esc`, or `q` dismisses the overlay; j/k/g/G scroll it.
fn handle_help(key: KeyEvent, state: &mut AppState) -> KeyAction {
    match key.code {
        KeyCode::Char('j') => {
            state.help_scroll = state.help_scroll.saturating_add(1);
        }
        KeyCode::Char('k') => {
            state.help_scroll = state.help_scroll.saturating_sub(1);
        }
        KeyCode::Char('g') => {
            state.help_scroll = 0;
        }
        KeyCode::Char('G') => {
            state.help_scroll = u16::MAX;
        }
        KeyCode::Char('?') | KeyCode::Esc | KeyCode::Char('q') => {
            state.mode = Mode::Normal;
        }
        _ => {}
    }
    KeyAction::Continue
}

// ---------------------------------------------------------------------------
// Mouse events
// ---------------------------------------------------------------------------

/// Handles a mouse event.
///
/// Pressing the left button on a comment picks it up; dragging over source
/// rows highlights the line it would land on and releasing drops it there.
/// Releasing outside the source panel cancels the drag. Plain motion sets the
/// hovered line and the wheel scrolls.
///
/// # Arguments
///
/// * `mouse` — the crossterm mouse event
/// * `state` — mutable reference to all UI state
pub fn handle_mouse(mouse: MouseEvent, state: &mut AppState) -> KeyAction {
    let target = row_at(state, mouse.column, mouse.row);
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) if state.mode == Mode::Normal => {
            mouse_down(target, state);
            KeyAction::Continue
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            mouse_drag(target.map(|t| t.line()), state);
            KeyAction::Continue
        }
        MouseEventKind::Up(MouseButton::Left) => mouse_up(target.map(|t| t.line()), state),
        MouseEventKind::Moved => {
            // Lines outside the registry cannot be hovered; ignore them.
            let _ = state.surface.set_hovered(target.map(|t| t.line()));
            KeyAction::Continue
        }
        MouseEventKind::ScrollUp => {
            scroll(state, -3);
            KeyAction::Continue
        }
        MouseEventKind::ScrollDown => {
            scroll(state, 3);
            KeyAction::Continue
        }
        _ => KeyAction::Continue,
    }
}

/// Maps a screen position onto the row rendered there in the last frame.
fn row_at(state: &AppState, col: u16, row: u16) -> Option<RowTarget> {
    let area = state.source_area;
    if !area.contains(Position { x: col, y: row }) {
        return None;
    }
    state.rows.get(usize::from(row - area.y)).cloned()
}

fn mouse_down(target: Option<RowTarget>, state: &mut AppState) {
    match target {
        Some(RowTarget::Line(line)) => state.set_cursor(line),
        Some(RowTarget::Comment { id, line }) => {
            state.set_cursor(line);
            if let Some(pos) = state.surface.store().comments_on(line).iter().position(|c| c.id == id) {
                state.selected = pos;
            }
            if state.surface.store().editable(&id).unwrap_or(false) && !state.is_pending(&id) {
                state.drag(DragEvent::Start { comment_id: id, origin: line });
            }
        }
        None => {}
    }
}

fn mouse_drag(line: Option<LineNumber>, state: &mut AppState) {
    if !state.surface.drag().is_dragging() {
        return;
    }
    let current = state.surface.store().drag_target();
    if current == line {
        return;
    }
    if let Some(prev) = current {
        state.drag(DragEvent::Leave(prev));
    }
    if let Some(line) = line {
        state.drag(DragEvent::Enter(line));
    }
}

fn mouse_up(line: Option<LineNumber>, state: &mut AppState) -> KeyAction {
    if !state.surface.drag().is_dragging() || state.mode == Mode::Moving {
        return KeyAction::Continue;
    }
    match line {
        Some(line) => {
            let outcome = state.drag(DragEvent::Drop(line));
            state.on_drag_outcome(outcome).into()
        }
        None => {
            state.drag(DragEvent::Cancel);
            KeyAction::Continue
        }
    }
}

fn scroll(state: &mut AppState, delta: i64) {
    if state.mode == Mode::HelpOverlay {
        state.help_scroll = if delta < 0 {
            state.help_scroll.saturating_sub(delta.unsigned_abs() as u16)
        } else {
            state.help_scroll.saturating_add(delta as u16)
        };
    } else {
        state.move_cursor(delta);
    }
}
