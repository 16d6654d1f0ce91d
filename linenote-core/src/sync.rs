//! Remote synchronization of comments.
//!
//! [`RemoteSyncClient`] talks to a [`CommentTransport`] and turns every
//! successful answer into a [`Mutation`]. It never touches local state
//! itself: the caller applies the mutation through
//! [`crate::surface::ReviewSurface::apply`] once the call has resolved, so a
//! failed call leaves nothing behind and the caller stays free to process
//! other events while the request is in flight.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::error::{RemoteError, SyncError};
use crate::types::{
    Comment, CommentDraft, CommentId, CommonComment, CreateAck, CreateBody, FileId, LineNumber,
    ViewerContext,
};

/// Remote comment store operations.
#[async_trait]
pub trait CommentTransport: Send + Sync {
    async fn fetch(&self, file: &FileId) -> Result<Vec<Comment>, RemoteError>;

    async fn create(
        &self,
        file: &FileId,
        line: LineNumber,
        body: CreateBody,
    ) -> Result<CreateAck, RemoteError>;

    async fn delete(&self, file: &FileId, id: &CommentId) -> Result<(), RemoteError>;

    /// Most used comment texts, optionally limited to one exercise.
    async fn common_comments(&self, exercise: Option<i64>) -> Result<Vec<CommonComment>, RemoteError>;
}

/// A confirmed change to apply to the local model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Add(Comment),
    Remove(CommentId),
    /// The comment now lives under `new_id` with the text the store
    /// acknowledged.
    Reassign {
        id: CommentId,
        to: LineNumber,
        new_id: CommentId,
        text: String,
        text_id: Option<CommentId>,
    },
}

/// Result of the initial load. A failed fetch still yields a (empty) list.
#[derive(Debug, Default)]
pub struct Fetched {
    pub comments: Vec<Comment>,
    pub error: Option<RemoteError>,
}

#[derive(Clone)]
pub struct RemoteSyncClient {
    transport: Arc<dyn CommentTransport>,
    file_id: FileId,
}

impl RemoteSyncClient {
    pub fn new(transport: Arc<dyn CommentTransport>, file_id: FileId) -> Self {
        Self { transport, file_id }
    }

    pub fn file_id(&self) -> &FileId {
        &self.file_id
    }

    /// Fetches every comment for the file.
    ///
    /// Never fails: transport and decode errors are logged and reported in
    /// [`Fetched::error`] alongside an empty list.
    pub async fn fetch_all(&self) -> Fetched {
        match self.transport.fetch(&self.file_id).await {
            Ok(comments) => {
                if comments.is_empty() {
                    debug!(file = %self.file_id, "no comments stored for file");
                }
                let comments = comments
                    .into_iter()
                    .map(|mut c| {
                        if c.file_id.0.is_empty() {
                            c.file_id = self.file_id.clone();
                        }
                        c
                    })
                    .collect();
                Fetched { comments, error: None }
            }
            Err(err) => {
                warn!(file = %self.file_id, error = %err, "comment fetch failed, showing none");
                Fetched { comments: Vec::new(), error: Some(err) }
            }
        }
    }

    /// Creates a new comment from `draft`.
    ///
    /// Empty text and out-of-range lines below 1 are rejected before any
    /// request is sent.
    pub async fn create(&self, draft: CommentDraft) -> Result<Mutation, SyncError> {
        if draft.text.trim().is_empty() {
            return Err(SyncError::EmptyComment);
        }
        if draft.line_number < 1 {
            return Err(crate::error::LookupError::LineNotFound(draft.line_number).into());
        }
        let ack = self
            .transport
            .create(&self.file_id, draft.line_number, CreateBody::Text(draft.text.clone()))
            .await
            .inspect_err(|err| error!(line = draft.line_number, error = %err, "comment create failed"))?;
        debug!(id = %ack.id, line = draft.line_number, "comment created");
        Ok(Mutation::Add(draft.into_comment(ack)))
    }

    pub async fn delete(&self, id: &CommentId) -> Result<Mutation, SyncError> {
        self.transport
            .delete(&self.file_id, id)
            .await
            .inspect_err(|err| error!(%id, error = %err, "comment delete failed"))?;
        debug!(%id, "comment deleted");
        Ok(Mutation::Remove(id.clone()))
    }

    /// Moves `comment` to line `to`.
    ///
    /// The store has no move: a new comment reusing the stored text is
    /// created on `to`, then the original is deleted. The mutation is only
    /// returned once both calls succeeded. If the delete fails the new
    /// comment is deleted again and the error is returned, so the caller's
    /// state stays as it was.
    pub async fn reassign(&self, comment: &Comment, to: LineNumber) -> Result<Mutation, SyncError> {
        let id = &comment.id;
        let body = match &comment.text_id {
            Some(text_id) => CreateBody::StoredText(text_id.clone()),
            None => CreateBody::Text(comment.text.clone()),
        };
        let ack = self
            .transport
            .create(&self.file_id, to, body)
            .await
            .inspect_err(|err| error!(%id, to, error = %err, "comment reassign failed"))?;

        if let Err(err) = self.transport.delete(&self.file_id, id).await {
            error!(%id, new_id = %ack.id, error = %err, "removing moved comment from its origin failed");
            if let Err(undo) = self.transport.delete(&self.file_id, &ack.id).await {
                warn!(new_id = %ack.id, error = %undo, "could not withdraw copy of moved comment");
            }
            return Err(err.into());
        }

        debug!(%id, new_id = %ack.id, to, "comment reassigned");
        let text_id = ack.text_id.or_else(|| comment.text_id.clone());
        Ok(Mutation::Reassign { id: id.clone(), to, new_id: ack.id, text: ack.text, text_id })
    }

    /// Attaches a copy of a common comment text to `line`.
    pub async fn attach_common(
        &self,
        viewer: &ViewerContext,
        line: LineNumber,
        common: &CommonComment,
    ) -> Result<Mutation, SyncError> {
        let draft = CommentDraft::new(viewer, line, common.text.clone());
        let ack = self
            .transport
            .create(&self.file_id, line, CreateBody::StoredText(common.id.clone()))
            .await
            .inspect_err(|err| error!(common = %common.id, line, error = %err, "attaching common comment failed"))?;
        Ok(Mutation::Add(draft.into_comment(ack)))
    }

    pub async fn common_comments(&self, exercise: Option<i64>) -> Result<Vec<CommonComment>, SyncError> {
        let common = self
            .transport
            .common_comments(exercise)
            .await
            .inspect_err(|err| warn!(error = %err, "common comments unavailable"))?;
        Ok(common)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory transport for tests.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct FakeTransport {
        pub comments: Mutex<Vec<Comment>>,
        pub calls: AtomicUsize,
        pub fail_with_status: Mutex<Option<u16>>,
        /// Fails deletes only, leaving creates and fetches working.
        pub fail_deletes: Mutex<Option<u16>>,
        pub deleted: Mutex<Vec<CommentId>>,
        next_id: AtomicUsize,
    }

    /// Stored texts the fake knows, keyed by text id.
    pub const TEXTS: &[(i64, &str)] = &[(1, "Use a loop"), (3, "use a loop"), (107, "comment 7")];

    impl FakeTransport {
        pub fn with_comments(comments: Vec<Comment>) -> Self {
            let fake = Self::default();
            fake.next_id.store(1000, Ordering::SeqCst);
            *fake.comments.lock().unwrap() = comments;
            fake
        }

        pub fn fail(&self, status: u16) {
            *self.fail_with_status.lock().unwrap() = Some(status);
        }

        pub fn fail_deletes(&self, status: u16) {
            *self.fail_deletes.lock().unwrap() = Some(status);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn deleted(&self) -> Vec<CommentId> {
            self.deleted.lock().unwrap().clone()
        }

        fn check(&self) -> Result<(), RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match *self.fail_with_status.lock().unwrap() {
                Some(status) => Err(RemoteError::Status { status, message: "fake failure".into() }),
                None => Ok(()),
            }
        }

        fn next_id(&self) -> CommentId {
            CommentId::from(self.next_id.fetch_add(1, Ordering::SeqCst) as i64)
        }
    }

    #[async_trait]
    impl CommentTransport for FakeTransport {
        async fn fetch(&self, _file: &FileId) -> Result<Vec<Comment>, RemoteError> {
            self.check()?;
            Ok(self.comments.lock().unwrap().clone())
        }

        async fn create(
            &self,
            _file: &FileId,
            line: LineNumber,
            body: CreateBody,
        ) -> Result<CreateAck, RemoteError> {
            self.check()?;
            let (text, text_id) = match body {
                CreateBody::Text(text) => (text.trim().to_owned(), None),
                CreateBody::StoredText(text_id) => {
                    let text = TEXTS
                        .iter()
                        .find(|(id, _)| CommentId::from(*id) == text_id)
                        .map(|(_, text)| text.to_string())
                        .ok_or_else(|| RemoteError::Rejected(format!("unknown comment text {text_id}")))?;
                    (text, Some(text_id))
                }
            };
            let id = self.next_id();
            let mut comment = crate::types::fixtures::comment(0, line, false);
            comment.id = id.clone();
            comment.text = text.clone();
            comment.text_id = text_id.clone();
            self.comments.lock().unwrap().push(comment);
            Ok(CreateAck { id, text, text_id })
        }

        async fn delete(&self, _file: &FileId, id: &CommentId) -> Result<(), RemoteError> {
            self.check()?;
            if let Some(status) = *self.fail_deletes.lock().unwrap() {
                return Err(RemoteError::Status { status, message: "fake failure".into() });
            }
            self.deleted.lock().unwrap().push(id.clone());
            self.comments.lock().unwrap().retain(|c| &c.id != id);
            Ok(())
        }

        async fn common_comments(&self, _exercise: Option<i64>) -> Result<Vec<CommonComment>, RemoteError> {
            self.check()?;
            Ok(vec![CommonComment { id: CommentId::from(1), text: "Use a loop".into() }])
        }
    }
}
