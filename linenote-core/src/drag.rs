//! Drag-to-reassign state machine.
//!
//! Pointer events are normalised into [`DragEvent`]s and consumed
//! synchronously. The controller only updates highlight flags in the
//! [`AnnotationStore`]; a drop onto a different line yields
//! [`DragOutcome::Reassign`] and the caller issues the remote call. Nothing
//! is moved until the store acknowledges it.

use tracing::debug;

use crate::annotations::AnnotationStore;
use crate::types::{CommentId, LineNumber};

/// The drag in progress. At most one exists at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDrag {
    pub comment_id: CommentId,
    pub origin: LineNumber,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragEvent {
    /// Drag began on a comment's handle.
    Start { comment_id: CommentId, origin: LineNumber },
    /// Pointer entered a line's drop target.
    Enter(LineNumber),
    /// Pointer left a line's drop target.
    Leave(LineNumber),
    Drop(LineNumber),
    /// Released outside any drop target, or aborted.
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragOutcome {
    Started,
    /// A drag is already running, the comment is unknown, or the viewer may
    /// not move it.
    Rejected,
    Highlighted(LineNumber),
    Cleared,
    /// Dropped back on the origin line.
    NoOp,
    Reassign {
        comment_id: CommentId,
        from: LineNumber,
        to: LineNumber,
    },
    Cancelled,
    /// Event does not apply in the current state (e.g. `Enter` while idle).
    Ignored,
}

#[derive(Debug, Clone, Default)]
pub struct DragAssignmentController {
    pending: Option<PendingDrag>,
}

impl DragAssignmentController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&PendingDrag> {
        self.pending.as_ref()
    }

    pub fn is_dragging(&self) -> bool {
        self.pending.is_some()
    }

    pub fn handle(&mut self, event: DragEvent, store: &mut AnnotationStore) -> DragOutcome {
        match (self.pending.as_ref(), event) {
            (Some(_), DragEvent::Start { comment_id, .. }) => {
                debug!(%comment_id, "drag rejected: another drag in progress");
                DragOutcome::Rejected
            }
            (None, DragEvent::Start { comment_id, origin }) => {
                let allowed = store.line_of(&comment_id).ok() == Some(origin)
                    && store.editable(&comment_id).unwrap_or(false);
                if !allowed {
                    return DragOutcome::Rejected;
                }
                debug!(%comment_id, origin, "drag started");
                self.pending = Some(PendingDrag { comment_id, origin });
                DragOutcome::Started
            }
            (None, _) => DragOutcome::Ignored,
            (Some(_), DragEvent::Enter(line)) => match store.set_drag_target(Some(line)) {
                Ok(()) => DragOutcome::Highlighted(line),
                Err(_) => DragOutcome::Ignored,
            },
            (Some(_), DragEvent::Leave(line)) => {
                if store.drag_target() == Some(line) {
                    let _ = store.set_drag_target(None);
                    DragOutcome::Cleared
                } else {
                    DragOutcome::Ignored
                }
            }
            (Some(_), DragEvent::Drop(to)) => {
                let _ = store.set_drag_target(None);
                let Some(PendingDrag { comment_id, origin }) = self.pending.take() else {
                    return DragOutcome::Ignored;
                };
                if to == origin || store.visual(to).is_err() {
                    debug!(%comment_id, to, "drop without effect");
                    return DragOutcome::NoOp;
                }
                DragOutcome::Reassign { comment_id, from: origin, to }
            }
            (Some(_), DragEvent::Cancel) => {
                let _ = store.set_drag_target(None);
                self.pending = None;
                DragOutcome::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::{comment, viewer};
    use crate::types::Role;

    fn store() -> AnnotationStore {
        let mut s = AnnotationStore::new(6, viewer(Role::Staff));
        s.add(comment(7, 2, false)).unwrap();
        s.add(comment(8, 3, false)).unwrap();
        s
    }

    fn start(id: i64, origin: LineNumber) -> DragEvent {
        DragEvent::Start { comment_id: CommentId::from(id), origin }
    }

    #[test]
    fn drop_on_origin_is_a_no_op() {
        let mut s = store();
        let mut drag = DragAssignmentController::new();
        assert_eq!(drag.handle(start(7, 2), &mut s), DragOutcome::Started);
        assert_eq!(drag.handle(DragEvent::Drop(2), &mut s), DragOutcome::NoOp);
        assert!(!drag.is_dragging());
        assert_eq!(s.line_of(&CommentId::from(7)).unwrap(), 2);
    }

    #[test]
    fn hover_highlight_follows_pointer_and_clears_on_drop() {
        let mut s = store();
        let mut drag = DragAssignmentController::new();
        drag.handle(start(7, 2), &mut s);
        assert!(!s.visual(2).unwrap().drag_target_active);
        assert_eq!(drag.handle(DragEvent::Enter(4), &mut s), DragOutcome::Highlighted(4));
        assert_eq!(drag.handle(DragEvent::Enter(5), &mut s), DragOutcome::Highlighted(5));
        assert!(!s.visual(4).unwrap().drag_target_active);
        assert_eq!(drag.handle(DragEvent::Leave(4), &mut s), DragOutcome::Ignored);
        assert_eq!(drag.handle(DragEvent::Leave(5), &mut s), DragOutcome::Cleared);
        drag.handle(DragEvent::Enter(5), &mut s);
        let outcome = drag.handle(DragEvent::Drop(5), &mut s);
        assert_eq!(
            outcome,
            DragOutcome::Reassign { comment_id: CommentId::from(7), from: 2, to: 5 }
        );
        assert_eq!(s.drag_target(), None);
        assert_eq!(s.line_of(&CommentId::from(7)).unwrap(), 2, "nothing moves before the ack");
    }

    #[test]
    fn second_start_is_rejected() {
        let mut s = store();
        let mut drag = DragAssignmentController::new();
        drag.handle(start(7, 2), &mut s);
        assert_eq!(drag.handle(start(8, 3), &mut s), DragOutcome::Rejected);
        assert_eq!(drag.pending().unwrap().comment_id, CommentId::from(7));
    }

    #[test]
    fn cancel_returns_to_idle_without_changes() {
        let mut s = store();
        let mut drag = DragAssignmentController::new();
        drag.handle(start(7, 2), &mut s);
        drag.handle(DragEvent::Enter(4), &mut s);
        assert_eq!(drag.handle(DragEvent::Cancel, &mut s), DragOutcome::Cancelled);
        assert!(!drag.is_dragging());
        assert_eq!(s.drag_target(), None);
        assert_eq!(drag.handle(DragEvent::Drop(4), &mut s), DragOutcome::Ignored);
    }

    #[test]
    fn viewer_without_rights_cannot_start() {
        let mut s = AnnotationStore::new(3, viewer(Role::Student));
        s.add(comment(7, 2, false)).unwrap();
        let mut drag = DragAssignmentController::new();
        assert_eq!(drag.handle(start(7, 2), &mut s), DragOutcome::Rejected);
        assert_eq!(drag.handle(start(99, 1), &mut s), DragOutcome::Rejected);
    }
}
