//! Runs comment-store calls off the UI loop.
//!
//! Each [`RemoteOp`] becomes one tokio task. The task awaits the store and
//! posts the outcome back as [`AppEvent::Sync`], so the surface is only ever
//! mutated by the main loop.

use linenote_core::types::ViewerContext;
use linenote_core::RemoteSyncClient;
use tokio::sync::mpsc;
use tracing::debug;

use crate::app::RemoteOp;
use crate::event::{AppEvent, SyncDone};

#[derive(Clone)]
pub struct Remote {
    client: RemoteSyncClient,
    viewer: ViewerContext,
    exercise: Option<i64>,
    tx: mpsc::UnboundedSender<AppEvent>,
}

impl Remote {
    pub fn new(
        client: RemoteSyncClient,
        viewer: ViewerContext,
        exercise: Option<i64>,
        tx: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self { client, viewer, exercise, tx }
    }

    /// Starts `op` in the background.
    pub fn spawn(&self, op: RemoteOp) {
        debug!(?op, "remote call");
        let this = self.clone();
        tokio::spawn(async move {
            let done = this.run(op).await;
            // The receiver is gone only while shutting down.
            let _ = this.tx.send(AppEvent::Sync(done));
        });
    }

    async fn run(&self, op: RemoteOp) -> SyncDone {
        match op {
            RemoteOp::Fetch => SyncDone::Fetched(self.client.fetch_all().await),
            RemoteOp::Create(draft) => SyncDone::Created(self.client.create(draft).await),
            RemoteOp::Delete(id) => {
                let result = self.client.delete(&id).await;
                SyncDone::Deleted { id, result }
            }
            RemoteOp::Reassign { comment, to } => {
                let result = self.client.reassign(&comment, to).await;
                SyncDone::Reassigned { id: comment.id, result }
            }
            RemoteOp::LoadCommon => {
                SyncDone::CommonLoaded(self.client.common_comments(self.exercise).await)
            }
            RemoteOp::AttachCommon { line, common } => {
                SyncDone::Created(self.client.attach_common(&self.viewer, line, &common).await)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use linenote_core::db::{Author, SqliteTransport};
    use linenote_core::types::{CommentDraft, FileId, Role};
    use linenote_core::Mutation;

    use super::*;

    fn viewer() -> ViewerContext {
        ViewerContext {
            file_id: FileId("7".into()),
            user_id: 1,
            user_name: "Ada".into(),
            role: Role::Staff,
            solver_id: 2,
            comments_permitted: true,
        }
    }

    async fn remote(dir: &tempfile::TempDir) -> (Remote, mpsc::UnboundedReceiver<AppEvent>) {
        let path = dir.path().join("comments.db");
        let author = Author { id: 1, name: "Ada".into(), role: Role::Staff };
        let transport = SqliteTransport::open(path.to_str().unwrap(), author).await.unwrap();
        let client = RemoteSyncClient::new(Arc::new(transport), FileId("7".into()));
        let (tx, rx) = mpsc::unbounded_channel();
        (Remote::new(client, viewer(), None, tx), rx)
    }

    #[tokio::test]
    async fn create_then_fetch_posts_results() {
        let dir = tempfile::tempdir().unwrap();
        let (remote, mut rx) = remote(&dir).await;

        remote.spawn(RemoteOp::Create(CommentDraft::new(&viewer(), 3, "off by one")));
        let Some(AppEvent::Sync(SyncDone::Created(Ok(Mutation::Add(comment))))) = rx.recv().await else {
            panic!("expected a created comment");
        };
        assert_eq!(comment.line_number, 3);
        assert_eq!(comment.text, "off by one");

        remote.spawn(RemoteOp::Fetch);
        let Some(AppEvent::Sync(SyncDone::Fetched(fetched))) = rx.recv().await else {
            panic!("expected a fetch result");
        };
        assert!(fetched.error.is_none());
        assert_eq!(fetched.comments.len(), 1);
    }

    #[tokio::test]
    async fn delete_of_unknown_comment_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let (remote, mut rx) = remote(&dir).await;

        remote.spawn(RemoteOp::Delete("missing".into()));
        let Some(AppEvent::Sync(SyncDone::Deleted { id, result })) = rx.recv().await else {
            panic!("expected a delete result");
        };
        assert_eq!(id.as_str(), "missing");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn reassign_reports_the_moved_comment_under_its_old_id() {
        let dir = tempfile::tempdir().unwrap();
        let (remote, mut rx) = remote(&dir).await;

        remote.spawn(RemoteOp::Create(CommentDraft::new(&viewer(), 1, "extract a helper")));
        let Some(AppEvent::Sync(SyncDone::Created(Ok(Mutation::Add(comment))))) = rx.recv().await else {
            panic!("expected a created comment");
        };

        remote.spawn(RemoteOp::Reassign { comment: comment.clone(), to: 4 });
        let Some(AppEvent::Sync(SyncDone::Reassigned { id, result })) = rx.recv().await else {
            panic!("expected a reassign result");
        };
        assert_eq!(id, comment.id);
        let Ok(Mutation::Reassign { new_id, text, to, .. }) = result else {
            panic!("expected the move to succeed");
        };
        assert_ne!(new_id, comment.id);
        assert_eq!(text, "extract a helper");
        assert_eq!(to, 4);
    }
}
