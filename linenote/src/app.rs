//! Central application state for linenote.
//!
//! Owns the [`ReviewSurface`] plus everything the terminal needs around it:
//! the cursor, scroll offset, mode, compose buffer and status message. No
//! rendering happens here. Input handlers in `ui::keybindings` mutate this
//! state and hand back [`RemoteOp`]s; the main loop runs those on tokio
//! tasks and feeds their results to [`AppState::apply_sync`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use linenote_core::drag::{DragEvent, DragOutcome};
use linenote_core::error::SyncError;
use linenote_core::surface::{OpTicket, ReviewSurface};
use linenote_core::types::{Comment, CommentDraft, CommentId, CommonComment, LineNumber};
use ratatui::layout::Rect;
use tracing::{debug, warn};

use crate::event::SyncDone;

/// How long a status message stays visible.
const STATUS_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Normal,
    /// Typing a new comment for the cursor line.
    Compose,
    /// Moving the selected comment with the keyboard; the cursor is the drop target.
    Moving,
    /// Picking one of the common comments.
    CommonPicker,
    HelpOverlay,
}

impl Mode {
    /// Modes that draw a popup over the source panel.
    pub fn is_modal(self) -> bool {
        matches!(self, Mode::Compose | Mode::CommonPicker | Mode::HelpOverlay)
    }
}

/// A remote call the main loop should start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOp {
    Fetch,
    Create(CommentDraft),
    Delete(CommentId),
    Reassign { comment: Comment, to: LineNumber },
    LoadCommon,
    AttachCommon { line: LineNumber, common: CommonComment },
}

/// What one rendered row of the source panel shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowTarget {
    Line(LineNumber),
    Comment { id: CommentId, line: LineNumber },
}

impl RowTarget {
    pub fn line(&self) -> LineNumber {
        match self {
            RowTarget::Line(line) | RowTarget::Comment { line, .. } => *line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
    pub at: Instant,
}

pub struct AppState {
    pub surface: ReviewSurface,
    /// Shown in the panel title.
    pub file_name: String,
    pub mode: Mode,
    /// Line under the keyboard cursor, 1-based.
    pub cursor: LineNumber,
    /// Index of the selected comment among the cursor line's comments.
    pub selected: usize,
    /// First visible row of the source panel.
    pub scroll: usize,
    /// Inner height of the source panel, cached after each render.
    pub viewport_height: u16,
    /// Inner area of the source panel, cached after each render.
    pub source_area: Rect,
    /// What each visible row of the source panel shows, cached after each render.
    pub rows: Vec<RowTarget>,
    pub help_scroll: u16,
    pub compose: String,
    pub status: Option<StatusMessage>,
    /// True until the first fetch answers.
    pub loading: bool,
    /// Create calls still in flight.
    pub pending_creates: usize,
    pub common: Vec<CommonComment>,
    pub common_loading: bool,
    tickets: HashMap<CommentId, OpTicket>,
}

impl AppState {
    pub fn new(surface: ReviewSurface, file_name: String) -> Self {
        Self {
            surface,
            file_name,
            mode: Mode::default(),
            cursor: 1,
            selected: 0,
            scroll: 0,
            viewport_height: 0,
            source_area: Rect::default(),
            rows: Vec::new(),
            help_scroll: 0,
            compose: String::new(),
            status: None,
            loading: true,
            pending_creates: 0,
            common: Vec::new(),
            common_loading: false,
            tickets: HashMap::new(),
        }
    }

    pub fn line_count(&self) -> LineNumber {
        self.surface.registry().count() as LineNumber
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.status = Some(StatusMessage { text: text.into(), is_error: false, at: Instant::now() });
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.status = Some(StatusMessage { text: text.into(), is_error: true, at: Instant::now() });
    }

    /// Drops the status message once it has been shown long enough.
    pub fn tick(&mut self) {
        if self.status.as_ref().is_some_and(|s| s.at.elapsed() >= STATUS_TTL) {
            self.status = None;
        }
    }

    pub fn is_pending(&self, id: &CommentId) -> bool {
        self.tickets.contains_key(id)
    }

    // -----------------------------------------------------------------------
    // Cursor
    // -----------------------------------------------------------------------

    pub fn move_cursor(&mut self, delta: i64) {
        let last = i64::from(self.line_count().max(1));
        let next = (i64::from(self.cursor) + delta).clamp(1, last);
        self.set_cursor(next as LineNumber);
    }

    pub fn set_cursor(&mut self, line: LineNumber) {
        let line = line.clamp(1, self.line_count().max(1));
        if line != self.cursor {
            self.cursor = line;
            self.selected = 0;
        }
        if self.mode == Mode::Moving {
            self.drag(DragEvent::Enter(line));
        }
    }

    pub fn cursor_top(&mut self) {
        self.set_cursor(1);
    }

    pub fn cursor_bottom(&mut self) {
        self.set_cursor(self.line_count());
    }

    pub fn half_page(&mut self, down: bool) {
        let half = i64::from((self.viewport_height / 2).max(1));
        self.move_cursor(if down { half } else { -half });
    }

    /// Cycles the selection through the comments on the cursor line.
    pub fn next_comment(&mut self) {
        let count = self.surface.store().comments_on(self.cursor).len();
        if count > 0 {
            self.selected = (self.selected + 1) % count;
        }
    }

    pub fn selected_comment(&self) -> Option<CommentId> {
        self.surface
            .store()
            .comments_on(self.cursor)
            .get(self.selected)
            .map(|c| c.id.clone())
    }

    // -----------------------------------------------------------------------
    // Compose
    // -----------------------------------------------------------------------

    pub fn start_compose(&mut self) {
        match self.surface.draft(self.cursor, "x") {
            Err(SyncError::CommentingClosed) => self.error("Commenting is closed for this file"),
            _ => {
                self.compose.clear();
                self.mode = Mode::Compose;
            }
        }
    }

    pub fn cancel_compose(&mut self) {
        self.compose.clear();
        self.mode = Mode::Normal;
    }

    /// Validates the compose buffer and returns the create call to run.
    pub fn submit_compose(&mut self) -> Option<RemoteOp> {
        match self.surface.draft(self.cursor, &self.compose) {
            Ok(draft) => {
                self.compose.clear();
                self.mode = Mode::Normal;
                self.pending_creates += 1;
                Some(RemoteOp::Create(draft))
            }
            Err(err) => {
                self.error(err.to_string());
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Delete and move
    // -----------------------------------------------------------------------

    pub fn delete_selected(&mut self) -> Option<RemoteOp> {
        let Some(id) = self.selected_comment() else {
            self.error("No comment on this line");
            return None;
        };
        match self.surface.begin_delete(&id) {
            Ok(ticket) => {
                self.tickets.insert(id.clone(), ticket);
                Some(RemoteOp::Delete(id))
            }
            Err(err) => {
                self.error(err.to_string());
                None
            }
        }
    }

    /// Starts a keyboard move of the selected comment.
    pub fn start_move(&mut self) {
        let Some(id) = self.selected_comment() else {
            self.error("No comment on this line");
            return;
        };
        if self.is_pending(&id) {
            self.error(SyncError::Busy(id).to_string());
            return;
        }
        let origin = self.cursor;
        if self.drag(DragEvent::Start { comment_id: id, origin }) == DragOutcome::Started {
            self.mode = Mode::Moving;
            self.info("Move with j/k, Enter to drop, Esc to cancel");
        } else {
            self.error("This comment cannot be moved");
        }
    }

    pub fn drop_move(&mut self) -> Option<RemoteOp> {
        self.mode = Mode::Normal;
        let outcome = self.drag(DragEvent::Drop(self.cursor));
        self.on_drag_outcome(outcome)
    }

    pub fn cancel_move(&mut self) {
        self.mode = Mode::Normal;
        self.drag(DragEvent::Cancel);
    }

    pub fn drag(&mut self, event: DragEvent) -> DragOutcome {
        let outcome = self.surface.handle_drag(event);
        debug!(?outcome, "drag");
        outcome
    }

    /// Turns a drop that asks for a reassignment into the remote call.
    pub fn on_drag_outcome(&mut self, outcome: DragOutcome) -> Option<RemoteOp> {
        let DragOutcome::Reassign { comment_id, to, .. } = outcome else {
            return None;
        };
        let comment = match self.surface.store().get(&comment_id) {
            Ok(comment) => comment.clone(),
            Err(err) => {
                self.error(err.to_string());
                return None;
            }
        };
        match self.surface.begin_reassign(&comment_id, to) {
            Ok(ticket) => {
                self.tickets.insert(comment_id, ticket);
                Some(RemoteOp::Reassign { comment, to })
            }
            Err(err) => {
                self.error(err.to_string());
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Common comments
    // -----------------------------------------------------------------------

    pub fn open_common(&mut self) -> Option<RemoteOp> {
        if !self.surface.viewer().role.is_privileged() {
            self.error("Common comments are available to staff only");
            return None;
        }
        self.mode = Mode::CommonPicker;
        if self.common.is_empty() && !self.common_loading {
            self.common_loading = true;
            return Some(RemoteOp::LoadCommon);
        }
        None
    }

    /// Attaches the `index`-th common comment to the cursor line.
    pub fn pick_common(&mut self, index: usize) -> Option<RemoteOp> {
        let common = self.common.get(index)?.clone();
        self.mode = Mode::Normal;
        match self.surface.draft(self.cursor, &common.text) {
            Ok(_) => {
                self.pending_creates += 1;
                Some(RemoteOp::AttachCommon { line: self.cursor, common })
            }
            Err(err) => {
                self.error(err.to_string());
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Remote results
    // -----------------------------------------------------------------------

    /// Applies the result of a finished remote call.
    pub fn apply_sync(&mut self, done: SyncDone) {
        match done {
            SyncDone::Fetched(fetched) => {
                self.loading = false;
                let failed = fetched.error.as_ref().map(ToString::to_string);
                let mounted = self.surface.load(fetched);
                match failed {
                    Some(err) => self.error(format!("Could not load comments: {err}")),
                    None => self.info(format!("{mounted} comments")),
                }
            }
            SyncDone::Created(result) => {
                self.pending_creates = self.pending_creates.saturating_sub(1);
                match result {
                    Ok(mutation) => self.apply_mutation(mutation, "Comment added"),
                    Err(err) => self.error(format!("Could not add comment: {err}")),
                }
            }
            SyncDone::Deleted { id, result } => {
                self.finish(&id);
                match result {
                    Ok(mutation) => {
                        self.apply_mutation(mutation, "Comment deleted");
                        self.selected = 0;
                    }
                    Err(err) => self.error(format!("Could not delete comment: {err}")),
                }
            }
            SyncDone::Reassigned { id, result } => {
                self.finish(&id);
                match result {
                    Ok(mutation) => self.apply_mutation(mutation, "Comment moved"),
                    Err(err) => self.error(format!("Could not move comment: {err}")),
                }
            }
            SyncDone::CommonLoaded(result) => {
                self.common_loading = false;
                match result {
                    Ok(common) => self.common = common,
                    Err(err) => {
                        self.error(format!("Could not load common comments: {err}"));
                        if self.mode == Mode::CommonPicker {
                            self.mode = Mode::Normal;
                        }
                    }
                }
            }
        }
    }

    fn finish(&mut self, id: &CommentId) {
        match self.tickets.remove(id) {
            Some(ticket) => self.surface.finish(ticket),
            None => warn!(%id, "remote result without an in-flight ticket"),
        }
    }

    fn apply_mutation(&mut self, mutation: linenote_core::Mutation, done: &str) {
        match self.surface.apply(mutation) {
            Ok(()) => self.info(done),
            Err(err) => {
                warn!(error = %err, "could not apply confirmed change");
                self.error(err.to_string());
            }
        }
    }
}

/// Returns the scroll offset that keeps the cursor line inside a viewport of
/// `height` rows, given the row index where the cursor line starts and how
/// many rows it plus its comments take.
pub fn follow_scroll(scroll: usize, height: u16, cursor_row: usize, block_rows: usize) -> usize {
    let height = usize::from(height.max(1));
    let block = block_rows.clamp(1, height);
    if cursor_row < scroll {
        cursor_row
    } else if cursor_row + block > scroll + height {
        cursor_row + block - height
    } else {
        scroll
    }
}
