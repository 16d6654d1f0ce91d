//! The review surface: one loaded file with its comments.
//!
//! [`ReviewSurface`] owns the registry, the store, the overlay renderer and
//! the drag controller, and is the only place that mutates them together.
//! Remote calls happen outside it: the caller takes an [`OpTicket`], runs the
//! call on [`RemoteSyncClient`], hands the ticket back, and applies the
//! returned [`Mutation`]. [`ReviewSession`] wires those steps for callers
//! that can simply await.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::annotations::AnnotationStore;
use crate::drag::{DragAssignmentController, DragEvent, DragOutcome};
use crate::error::{LookupError, RemoteError, StructuralError, SyncError};
use crate::overlay::OverlayRenderer;
use crate::registry::LineRegistry;
use crate::sync::{Fetched, Mutation, RemoteSyncClient};
use crate::types::{Comment, CommentDraft, CommentId, CommonComment, LineNumber, ViewerContext};

/// Signals raised while building a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// Every line is numbered and addressable; fetching may start.
    LinesNumbered { count: usize },
}

/// Proof that a comment is marked in flight. Hand it back to
/// [`ReviewSurface::finish`] once the remote call resolves, whatever the
/// outcome.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an unfinished ticket keeps the comment busy"]
pub struct OpTicket {
    id: CommentId,
}

impl OpTicket {
    pub fn id(&self) -> &CommentId {
        &self.id
    }
}

#[derive(Debug)]
pub struct ReviewSurface {
    registry: LineRegistry,
    store: AnnotationStore,
    overlay: OverlayRenderer,
    drag: DragAssignmentController,
    in_flight: HashSet<CommentId>,
}

impl ReviewSurface {
    /// Reflows `markup` and prepares an empty surface for `viewer`.
    pub fn new(markup: &str, viewer: ViewerContext) -> Result<(Self, SurfaceEvent), StructuralError> {
        let registry = LineRegistry::from_markup(markup)?;
        let count = registry.count();
        let store = AnnotationStore::new(count, viewer.clone());
        info!(file = %viewer.file_id, lines = count, "lines numbered");
        let surface = Self {
            registry,
            store,
            overlay: OverlayRenderer::new(viewer),
            drag: DragAssignmentController::new(),
            in_flight: HashSet::new(),
        };
        Ok((surface, SurfaceEvent::LinesNumbered { count }))
    }

    pub fn registry(&self) -> &LineRegistry {
        &self.registry
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn viewer(&self) -> &ViewerContext {
        self.store.viewer()
    }

    pub fn drag(&self) -> &DragAssignmentController {
        &self.drag
    }

    /// Adds and mounts every fetched comment. Comments that cannot be placed
    /// (unknown line, duplicate id) are logged and skipped. Returns how many
    /// were mounted.
    pub fn load(&mut self, fetched: Fetched) -> usize {
        let mut mounted = 0;
        for comment in fetched.comments {
            let id = comment.id.clone();
            match self.insert(comment) {
                Ok(()) => mounted += 1,
                Err(err) => warn!(%id, error = %err, "skipping fetched comment"),
            }
        }
        debug!(mounted, "comments loaded");
        mounted
    }

    fn insert(&mut self, comment: Comment) -> Result<(), LookupError> {
        if self.store.contains(&comment.id) {
            return Err(LookupError::DuplicateComment(comment.id));
        }
        if !self.registry.contains(comment.line_number) {
            return Err(LookupError::LineNotFound(comment.line_number));
        }
        let id = comment.id.clone();
        self.store.add(comment)?;
        self.overlay.mount(&mut self.registry, &self.store, &id)?;
        Ok(())
    }

    pub fn is_in_flight(&self, id: &CommentId) -> bool {
        self.in_flight.contains(id)
    }

    /// Marks `id` in flight.
    ///
    /// # Errors
    ///
    /// `CommentNotFound` for an unknown id, `Busy` while another operation on
    /// it has not finished.
    pub fn begin(&mut self, id: &CommentId) -> Result<OpTicket, SyncError> {
        self.store.line_of(id)?;
        if !self.in_flight.insert(id.clone()) {
            return Err(SyncError::Busy(id.clone()));
        }
        Ok(OpTicket { id: id.clone() })
    }

    pub fn begin_delete(&mut self, id: &CommentId) -> Result<OpTicket, SyncError> {
        if !self.store.editable(id)? {
            return Err(SyncError::Forbidden(id.clone()));
        }
        self.begin(id)
    }

    pub fn begin_reassign(&mut self, id: &CommentId, to: LineNumber) -> Result<OpTicket, SyncError> {
        if !self.store.editable(id)? {
            return Err(SyncError::Forbidden(id.clone()));
        }
        if !self.registry.contains(to) {
            return Err(LookupError::LineNotFound(to).into());
        }
        self.begin(id)
    }

    pub fn finish(&mut self, ticket: OpTicket) {
        self.in_flight.remove(&ticket.id);
    }

    /// Builds a draft for a new comment on `line`.
    pub fn draft(&self, line: LineNumber, text: &str) -> Result<CommentDraft, SyncError> {
        let viewer = self.viewer();
        if !viewer.role.is_privileged() && !viewer.comments_permitted {
            return Err(SyncError::CommentingClosed);
        }
        if !self.registry.contains(line) {
            return Err(LookupError::LineNotFound(line).into());
        }
        if text.trim().is_empty() {
            return Err(SyncError::EmptyComment);
        }
        Ok(CommentDraft::new(viewer, line, text))
    }

    /// Applies a confirmed mutation to the store and the overlay together.
    ///
    /// Everything is validated before the first change, so an error leaves
    /// both exactly as they were.
    pub fn apply(&mut self, mutation: Mutation) -> Result<(), LookupError> {
        match mutation {
            Mutation::Add(comment) => self.insert(comment),
            Mutation::Remove(id) => {
                let line = self.store.line_of(&id)?;
                self.store.remove(&id)?;
                if let Err(err) = self.overlay.unmount(&mut self.registry, &id, line) {
                    warn!(%id, line, error = %err, "removed comment had no mounted unit");
                }
                Ok(())
            }
            Mutation::Reassign { id, to, new_id, text, text_id } => {
                self.store.line_of(&id)?;
                if !self.registry.contains(to) {
                    return Err(LookupError::LineNotFound(to));
                }
                if new_id != id && self.store.contains(&new_id) {
                    return Err(LookupError::DuplicateComment(new_id));
                }
                let origin = self.store.reassign(&id, to)?;
                self.store.rekey(&id, new_id.clone())?;
                self.store.retext(&new_id, text, text_id)?;
                if let Err(err) = self.overlay.unmount(&mut self.registry, &id, origin) {
                    warn!(%id, line = origin, error = %err, "reassigned comment had no mounted unit");
                }
                self.overlay.mount(&mut self.registry, &self.store, &new_id)?;
                Ok(())
            }
        }
    }

    /// Feeds a pointer event to the drag controller.
    pub fn handle_drag(&mut self, event: DragEvent) -> DragOutcome {
        self.drag.handle(event, &mut self.store)
    }

    pub fn set_hovered(&mut self, line: Option<LineNumber>) -> Result<(), LookupError> {
        self.store.set_hovered(line)
    }
}

/// A surface paired with its sync client, for callers that await each call
/// in turn.
pub struct ReviewSession {
    surface: ReviewSurface,
    client: RemoteSyncClient,
}

impl ReviewSession {
    pub fn new(surface: ReviewSurface, client: RemoteSyncClient) -> Self {
        Self { surface, client }
    }

    pub fn surface(&self) -> &ReviewSurface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut ReviewSurface {
        &mut self.surface
    }

    pub fn client(&self) -> &RemoteSyncClient {
        &self.client
    }

    /// Fetches and mounts the file's comments. A failed fetch shows none.
    pub async fn load(&mut self) -> usize {
        let fetched = self.client.fetch_all().await;
        self.surface.load(fetched)
    }

    pub async fn create(&mut self, line: LineNumber, text: &str) -> Result<CommentId, SyncError> {
        let draft = self.surface.draft(line, text)?;
        let Mutation::Add(comment) = self.client.create(draft).await? else {
            return Err(RemoteError::Decode("create acknowledged without a comment".into()).into());
        };
        let id = comment.id.clone();
        self.surface.apply(Mutation::Add(comment))?;
        Ok(id)
    }

    pub async fn attach_common(&mut self, line: LineNumber, common: &CommonComment) -> Result<(), SyncError> {
        self.surface.draft(line, &common.text)?;
        let mutation = self.client.attach_common(self.surface.viewer(), line, common).await?;
        self.surface.apply(mutation)?;
        Ok(())
    }

    pub async fn delete(&mut self, id: &CommentId) -> Result<(), SyncError> {
        let ticket = self.surface.begin_delete(id)?;
        let result = self.client.delete(id).await;
        self.surface.finish(ticket);
        self.surface.apply(result?)?;
        Ok(())
    }

    /// Moves a comment to line `to` and returns the id it now has.
    pub async fn reassign(&mut self, id: &CommentId, to: LineNumber) -> Result<CommentId, SyncError> {
        let ticket = self.surface.begin_reassign(id, to)?;
        let comment = self.surface.store().get(id).cloned();
        let result = match comment {
            Ok(comment) => self.client.reassign(&comment, to).await,
            Err(err) => Err(err.into()),
        };
        self.surface.finish(ticket);
        let mutation = result?;
        let new_id = match &mutation {
            Mutation::Reassign { new_id, .. } => new_id.clone(),
            _ => id.clone(),
        };
        self.surface.apply(mutation)?;
        Ok(new_id)
    }

    /// Handles a pointer event, issuing the reassignment a drop asks for.
    pub async fn drag(&mut self, event: DragEvent) -> Result<DragOutcome, SyncError> {
        let outcome = self.surface.handle_drag(event);
        if let DragOutcome::Reassign { comment_id, to, .. } = &outcome {
            self.reassign(comment_id, *to).await?;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sync::fake::FakeTransport;
    use crate::types::fixtures::{comment, viewer};
    use crate::types::{FileId, Role};

    const SOURCE: &str = "<b>foo\nbar</b>\nbaz\nqux\nquux";

    fn session(comments: Vec<Comment>, role: Role) -> (ReviewSession, Arc<FakeTransport>) {
        let fake = Arc::new(FakeTransport::with_comments(comments));
        let (surface, _) = ReviewSurface::new(SOURCE, viewer(role)).unwrap();
        let client = RemoteSyncClient::new(fake.clone(), FileId("42".into()));
        (ReviewSession::new(surface, client), fake)
    }

    fn assert_consistent(surface: &ReviewSurface) {
        for unit in surface.registry().lines() {
            let stored = surface.store().comments_on(unit.number);
            let mounted = surface
                .registry()
                .container_for(unit.number)
                .map(|c| c.units.iter().map(|u| u.comment_id.clone()).collect::<Vec<_>>())
                .unwrap_or_default();
            let ids: Vec<CommentId> = stored.iter().map(|c| c.id.clone()).collect();
            assert_eq!(ids, mounted, "line {}", unit.number);
            assert_eq!(unit.comment_present, !mounted.is_empty());
            let marked = stored.iter().any(|c| !c.is_auto);
            assert_eq!(surface.store().visual(unit.number).unwrap().marked_permanently, marked);
        }
    }

    #[test]
    fn new_surface_reports_line_count() {
        let (surface, event) = ReviewSurface::new(SOURCE, viewer(Role::Staff)).unwrap();
        assert_eq!(event, SurfaceEvent::LinesNumbered { count: 5 });
        assert!(surface.store().is_empty());
        assert_eq!(surface.registry().container_count(), 0);
    }

    #[test]
    fn malformed_source_is_fatal() {
        let err = ReviewSurface::new("<i>open", viewer(Role::Staff)).unwrap_err();
        assert!(matches!(err, StructuralError::Unclosed { .. }));
    }

    #[tokio::test]
    async fn fetched_comment_marks_only_its_line() {
        let raw = r#"[{"id": 1, "line_number": 4, "text": "fix this", "is_auto": false}]"#;
        let comments: Vec<Comment> = serde_json::from_str(raw).unwrap();
        let (mut session, _) = session(comments, Role::Staff);
        assert_eq!(session.load().await, 1);

        let surface = session.surface();
        assert_eq!(surface.store().marked_lines(), [4]);
        let container = surface.registry().container_for(4).unwrap();
        assert_eq!(container.units.len(), 1);
        assert_eq!(container.units[0].body_text, "fix this");
        assert_eq!(surface.registry().container_count(), 1);
        assert_consistent(surface);
    }

    #[tokio::test]
    async fn bad_fetched_rows_are_skipped() {
        let (mut session, _) = session(
            vec![comment(1, 2, false), comment(1, 3, false), comment(2, 60, false)],
            Role::Staff,
        );
        assert_eq!(session.load().await, 1);
        assert_eq!(session.surface().store().len(), 1);
        assert_consistent(session.surface());
    }

    #[tokio::test]
    async fn failed_fetch_shows_no_comments() {
        let (mut session, fake) = session(vec![comment(1, 2, false)], Role::Staff);
        fake.fail(502);
        assert_eq!(session.load().await, 0);
        assert!(session.surface().store().is_empty());
    }

    #[tokio::test]
    async fn drag_to_origin_makes_no_call() {
        let (mut session, fake) = session(vec![comment(7, 2, false)], Role::Staff);
        session.load().await;
        let calls = fake.calls();

        let start = DragEvent::Start { comment_id: CommentId::from(7), origin: 2 };
        assert_eq!(session.drag(start).await.unwrap(), DragOutcome::Started);
        assert_eq!(session.drag(DragEvent::Drop(2)).await.unwrap(), DragOutcome::NoOp);

        assert_eq!(fake.calls(), calls);
        assert_eq!(session.surface().store().line_of(&CommentId::from(7)).unwrap(), 2);
        assert_eq!(session.surface().registry().container_for(2).unwrap().units.len(), 1);
        assert_consistent(session.surface());
    }

    #[tokio::test]
    async fn drag_to_other_line_moves_after_ack() {
        let (mut session, _) = session(vec![comment(7, 2, false)], Role::Staff);
        session.load().await;
        session
            .drag(DragEvent::Start { comment_id: CommentId::from(7), origin: 2 })
            .await
            .unwrap();
        session.drag(DragEvent::Enter(5)).await.unwrap();
        let outcome = session.drag(DragEvent::Drop(5)).await.unwrap();
        assert!(matches!(outcome, DragOutcome::Reassign { to: 5, .. }));

        let surface = session.surface();
        assert!(!surface.store().contains(&CommentId::from(7)));
        let moved = &surface.store().comments_on(5)[0];
        assert_eq!(moved.text, "comment 7");
        assert!(surface.registry().container_for(2).is_none());
        assert_eq!(surface.store().marked_lines(), [5]);
        assert_eq!(surface.store().drag_target(), None);
        assert!(!surface.is_in_flight(&CommentId::from(7)));
        assert_consistent(surface);
    }

    #[tokio::test]
    async fn moved_comment_shows_the_text_the_store_kept() {
        let mut c = comment(7, 2, false);
        c.text = "edited locally".into();
        c.text_id = Some(CommentId::from(3));
        let (mut session, fake) = session(vec![c], Role::Staff);
        session.load().await;

        let new_id = session.reassign(&CommentId::from(7), 4).await.unwrap();
        assert_eq!(fake.deleted(), [CommentId::from(7)]);
        let moved = session.surface().store().get(&new_id).unwrap();
        assert_eq!(moved.line_number, 4);
        assert_eq!(moved.text, "use a loop");
        assert_eq!(moved.text_id, Some(CommentId::from(3)));
        let unit = &session.surface().registry().container_for(4).unwrap().units[0];
        assert_eq!(unit.comment_id, new_id);
        assert_eq!(unit.body_text, "use a loop");
        assert_consistent(session.surface());
    }

    #[tokio::test]
    async fn reassign_keeps_comment_when_origin_delete_fails() {
        let (mut session, fake) = session(vec![comment(7, 2, false)], Role::Staff);
        session.load().await;
        fake.fail_deletes(500);

        let err = session.reassign(&CommentId::from(7), 4).await.unwrap_err();
        assert!(matches!(err, SyncError::Remote(RemoteError::Status { status: 500, .. })));
        let surface = session.surface();
        assert_eq!(surface.store().line_of(&CommentId::from(7)).unwrap(), 2);
        assert!(surface.store().comments_on(4).is_empty());
        assert!(!surface.is_in_flight(&CommentId::from(7)));
        assert_consistent(surface);
    }

    #[tokio::test]
    async fn failed_delete_keeps_comment_mounted() {
        let (mut session, fake) = session(vec![comment(9, 3, false)], Role::Staff);
        session.load().await;
        fake.fail(500);

        let err = session.delete(&CommentId::from(9)).await.unwrap_err();
        assert!(matches!(err, SyncError::Remote(RemoteError::Status { status: 500, .. })));

        let surface = session.surface();
        assert!(surface.store().contains(&CommentId::from(9)));
        assert_eq!(surface.registry().container_for(3).unwrap().units.len(), 1);
        assert!(surface.store().visual(3).unwrap().marked_permanently);
        assert!(!surface.is_in_flight(&CommentId::from(9)));
    }

    #[tokio::test]
    async fn delete_unmounts_and_unmarks() {
        let (mut session, _) = session(vec![comment(9, 3, false), comment(10, 3, true)], Role::Staff);
        session.load().await;
        session.delete(&CommentId::from(9)).await.unwrap();

        let surface = session.surface();
        assert!(!surface.store().visual(3).unwrap().marked_permanently);
        assert_eq!(surface.registry().container_for(3).unwrap().units.len(), 1);
        assert_consistent(surface);
    }

    #[tokio::test]
    async fn create_mounts_acknowledged_comment() {
        let (mut session, _) = session(vec![], Role::Staff);
        let id = session.create(1, "  tighten this  ").await.unwrap();
        let surface = session.surface();
        assert_eq!(surface.store().get(&id).unwrap().text, "tighten this");
        assert_eq!(surface.store().marked_lines(), [1]);
        assert_consistent(surface);
    }

    #[tokio::test]
    async fn create_validation_happens_before_any_call() {
        let (mut session, fake) = session(vec![], Role::Staff);
        assert!(matches!(session.create(2, " ").await, Err(SyncError::EmptyComment)));
        assert!(matches!(
            session.create(0, "x").await,
            Err(SyncError::Lookup(LookupError::LineNotFound(0)))
        ));
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn attaching_common_comment_mounts_it() {
        let (mut session, _) = session(vec![], Role::Staff);
        let common = session.client().common_comments(None).await.unwrap();
        session.attach_common(3, &common[0]).await.unwrap();
        assert_eq!(session.surface().store().comments_on(3)[0].text, "Use a loop");
        assert_consistent(session.surface());
    }

    #[test]
    fn second_operation_on_same_comment_is_busy() {
        let (mut surface, _) = ReviewSurface::new(SOURCE, viewer(Role::Staff)).unwrap();
        surface.load(Fetched { comments: vec![comment(4, 1, false)], error: None });
        let id = CommentId::from(4);
        let ticket = surface.begin_delete(&id).unwrap();
        assert!(matches!(surface.begin_reassign(&id, 2), Err(SyncError::Busy(_))));
        surface.finish(ticket);
        let again = surface.begin(&id).unwrap();
        assert_eq!(again.id(), &id);
        surface.finish(again);
    }

    #[test]
    fn non_editable_comment_cannot_be_deleted() {
        let (mut surface, _) = ReviewSurface::new(SOURCE, viewer(Role::Student)).unwrap();
        surface.load(Fetched { comments: vec![comment(4, 1, false)], error: None });
        assert!(matches!(surface.begin_delete(&CommentId::from(4)), Err(SyncError::Forbidden(_))));
        assert!(!surface.is_in_flight(&CommentId::from(4)));
    }

    #[test]
    fn students_cannot_draft_when_commenting_is_closed() {
        let mut v = viewer(Role::Student);
        v.comments_permitted = false;
        let (surface, _) = ReviewSurface::new(SOURCE, v).unwrap();
        assert!(matches!(surface.draft(1, "hi"), Err(SyncError::CommentingClosed)));
    }

    #[test]
    fn reassign_to_missing_line_changes_nothing() {
        let (mut surface, _) = ReviewSurface::new(SOURCE, viewer(Role::Staff)).unwrap();
        surface.load(Fetched { comments: vec![comment(4, 1, false)], error: None });
        let err = surface
            .apply(Mutation::Reassign {
                id: CommentId::from(4),
                to: 40,
                new_id: CommentId::from(4),
                text: "comment 4".into(),
                text_id: None,
            })
            .unwrap_err();
        assert_eq!(err, LookupError::LineNotFound(40));
        assert_eq!(surface.registry().container_for(1).unwrap().units.len(), 1);
        assert_consistent(&surface);
    }

    #[test]
    fn reassign_adopts_new_id_and_acknowledged_text() {
        let (mut surface, _) = ReviewSurface::new(SOURCE, viewer(Role::Staff)).unwrap();
        surface.load(Fetched { comments: vec![comment(4, 1, false)], error: None });
        surface
            .apply(Mutation::Reassign {
                id: CommentId::from(4),
                to: 3,
                new_id: CommentId::from(40),
                text: "as stored".into(),
                text_id: Some(CommentId::from(8)),
            })
            .unwrap();
        assert!(!surface.store().contains(&CommentId::from(4)));
        let moved = surface.store().get(&CommentId::from(40)).unwrap();
        assert_eq!(moved.line_number, 3);
        assert_eq!(moved.text, "as stored");
        assert_eq!(moved.text_id, Some(CommentId::from(8)));
        assert_consistent(&surface);
    }
}
