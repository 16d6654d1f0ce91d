use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// 1-based source line number.
pub type LineNumber = u32;

/// Numeric user identity as issued by the hosting application.
pub type UserId = i64;

/// Opaque comment identifier assigned by the comment store.
///
/// The web store hands out integers and the local SQLite store hands out
/// UUID v4 text; both are carried as a string so the rest of the engine never
/// cares which store it talks to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CommentId(String);

impl CommentId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for CommentId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for CommentId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl<'de> Deserialize<'de> for CommentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Text(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(n) => CommentId::from(n),
            Raw::Text(s) => CommentId(s),
        })
    }
}

/// Identity of the file (submission) under review.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub String);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role of a user in the course.
///
/// `Staff` and `Administrator` are privileged: they may edit or delete any
/// comment regardless of authorship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Staff,
    Administrator,
}

impl Role {
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::Staff | Role::Administrator)
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Student => "Student",
            Role::Staff => "Staff",
            Role::Administrator => "Administrator",
        }
    }

    /// Parses a role name case-insensitively (`"staff"`, `"Staff"`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "student" => Some(Role::Student),
            "staff" => Some(Role::Staff),
            "administrator" | "admin" => Some(Role::Administrator),
            _ => None,
        }
    }
}

/// Who is looking at the page, and what they are allowed to do.
///
/// Built once at load from configuration and passed into the store and the
/// renderer, so privilege checks are pure functions of `(comment, viewer)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerContext {
    pub file_id: FileId,
    pub user_id: UserId,
    pub user_name: String,
    pub role: Role,
    /// Owner of the submission being reviewed.
    pub solver_id: UserId,
    /// Whether non-privileged authors may currently edit their own comments.
    pub comments_permitted: bool,
}

impl ViewerContext {
    pub fn is_solver(&self) -> bool {
        self.user_id == self.solver_id
    }
}

/// A comment attached to a single line of a file.
///
/// `text` is untrusted author input; it only reaches a rendered unit through
/// [`crate::overlay::render_comment`], which sanitizes it first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    #[serde(default = "unknown_file")]
    pub file_id: FileId,
    pub line_number: LineNumber,
    #[serde(default)]
    pub author_id: Option<UserId>,
    #[serde(default)]
    pub author_name: String,
    #[serde(default, deserialize_with = "role_or_default")]
    pub author_role: Role,
    pub text: String,
    /// Stored text this comment shows. Placing a comment on another line
    /// reuses it.
    #[serde(default, rename = "comment_id")]
    pub text_id: Option<CommentId>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_auto: bool,
}

fn unknown_file() -> FileId {
    FileId(String::new())
}

fn role_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Role, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(Role::from_name).unwrap_or_default())
}

impl Comment {
    /// True when `viewer` wrote this comment.
    ///
    /// Compares ids when the store reported one. The web store's fetch only
    /// carries `author_name`; a name match counts only for the submission's
    /// owner, since names are not unique.
    pub fn is_authored_by(&self, viewer: &ViewerContext) -> bool {
        match self.author_id {
            Some(id) => id == viewer.user_id,
            None => {
                viewer.is_solver()
                    && !self.author_name.is_empty()
                    && self.author_name == viewer.user_name
            }
        }
    }
}

/// Whether `viewer` may edit or delete `comment`.
pub fn can_edit(comment: &Comment, viewer: &ViewerContext) -> bool {
    viewer.role.is_privileged() || (comment.is_authored_by(viewer) && viewer.comments_permitted)
}

/// A comment the user submitted that the store has not acknowledged yet.
///
/// Drafts carry no id. The only way to turn one into a [`Comment`] is
/// [`CommentDraft::into_comment`], which requires the store's acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentDraft {
    pub file_id: FileId,
    pub line_number: LineNumber,
    pub text: String,
    pub author_id: UserId,
    pub author_name: String,
    pub author_role: Role,
    pub created_at: DateTime<Utc>,
}

impl CommentDraft {
    pub fn new(viewer: &ViewerContext, line_number: LineNumber, text: impl Into<String>) -> Self {
        Self {
            file_id: viewer.file_id.clone(),
            line_number,
            text: text.into(),
            author_id: viewer.user_id,
            author_name: viewer.user_name.clone(),
            author_role: viewer.role,
            created_at: Utc::now(),
        }
    }

    /// Merges the store-assigned id and normalized text into the draft.
    pub fn into_comment(self, ack: CreateAck) -> Comment {
        Comment {
            id: ack.id,
            file_id: self.file_id,
            line_number: self.line_number,
            author_id: Some(self.author_id),
            author_name: self.author_name,
            author_role: self.author_role,
            text: ack.text,
            text_id: ack.text_id,
            timestamp: Some(self.created_at),
            is_auto: false,
        }
    }
}

/// Store acknowledgment of a create: the assigned id and the text as stored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateAck {
    pub id: CommentId,
    pub text: String,
    /// Id of the stored text, when the store reports it.
    #[serde(default)]
    pub text_id: Option<CommentId>,
}

/// What a create request attaches to the line.
///
/// Every create makes a new comment row. Moving a comment is a create with
/// its stored text followed by a delete of the original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateBody {
    /// A brand new comment with this text.
    Text(String),
    /// A new comment reusing a stored comment text, such as a
    /// [`CommonComment`] or the text of a comment being moved.
    StoredText(CommentId),
}

/// One of the most frequently used comment texts, offered as a quick pick.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommonComment {
    pub id: CommentId,
    pub text: String,
}

/// Per-line transient presentation flags. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineVisualState {
    pub hovered: bool,
    /// True while at least one human-authored comment targets the line.
    pub marked_permanently: bool,
    pub drag_target_active: bool,
}
