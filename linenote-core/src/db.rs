//! Local comment store backed by SQLite.
//!
//! [`SqliteTransport`] implements [`CommentTransport`] against a database
//! file, so a file can be reviewed without the web application. Comment
//! texts are deduplicated: placing the same text twice reuses one
//! `comment_texts` row, which is also what makes common comments countable.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::error::RemoteError;
use crate::sync::CommentTransport;
use crate::types::{
    Comment, CommentId, CommonComment, CreateAck, CreateBody, FileId, LineNumber, Role, UserId,
};

/// How many common comments a query returns.
pub const COMMON_COMMENT_LIMIT: usize = 5;

/// Opens (or creates) the SQLite database at `path`, configures WAL mode,
/// and applies schema migrations via the `schema_version` table.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the file cannot be opened, WAL configuration
/// fails, or schema DDL fails.
pub async fn open_db(path: &str) -> Result<Connection, tokio_rusqlite::Error> {
    let conn = Connection::open(path).await?;
    configure(&conn).await?;
    Ok(conn)
}

async fn configure(conn: &Connection) -> Result<(), tokio_rusqlite::Error> {
    conn.call(|db| {
        db.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;
        db.busy_timeout(Duration::from_secs(5))?;
        db.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        crate::schema::migrate(db)?;
        Ok::<_, rusqlite::Error>(())
    })
    .await
}

/// Identity written into every comment this transport creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: UserId,
    pub name: String,
    pub role: Role,
}

pub struct SqliteTransport {
    conn: Connection,
    author: Author,
    exercise_id: Option<i64>,
}

impl SqliteTransport {
    pub async fn open(path: &str, author: Author) -> Result<Self, tokio_rusqlite::Error> {
        let conn = open_db(path).await?;
        Ok(Self { conn, author, exercise_id: None })
    }

    /// Comments created from now on are counted towards `exercise_id` when
    /// looking up common comments per exercise.
    pub fn with_exercise(mut self, exercise_id: i64) -> Self {
        self.exercise_id = Some(exercise_id);
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Inserts a comment created by an automatic check rather than a person.
    pub async fn insert_auto(
        &self,
        file: &FileId,
        line: LineNumber,
        text: &str,
    ) -> Result<CommentId, RemoteError> {
        let row = NewRow::new(file, line, &self.author, self.exercise_id, true);
        let text = text.trim().to_owned();
        let id = self
            .conn
            .call(move |db| {
                let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
                let text_id = text_id_for(&tx, &text)?;
                let id = row.insert(&tx, text_id)?;
                tx.commit()?;
                Ok::<_, rusqlite::Error>(id)
            })
            .await?;
        Ok(CommentId::new(id))
    }
}

/// Everything but the text of a comment row about to be inserted.
struct NewRow {
    file_id: String,
    exercise_id: Option<i64>,
    line: LineNumber,
    author: Author,
    is_auto: bool,
}

impl NewRow {
    fn new(file: &FileId, line: LineNumber, author: &Author, exercise_id: Option<i64>, is_auto: bool) -> Self {
        Self {
            file_id: file.0.clone(),
            exercise_id,
            line,
            author: author.clone(),
            is_auto,
        }
    }

    fn insert(&self, db: &rusqlite::Connection, text_id: i64) -> rusqlite::Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        db.execute(
            "INSERT INTO comments
                 (id, file_id, exercise_id, line_number, author_id, author_name, author_role,
                  text_id, is_auto, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                &id,
                &self.file_id,
                self.exercise_id,
                self.line,
                self.author.id,
                &self.author.name,
                role_name(self.author.role),
                text_id,
                self.is_auto,
                Utc::now().timestamp(),
            ],
        )?;
        Ok(id)
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::Student => "student",
        Role::Staff => "staff",
        Role::Administrator => "administrator",
    }
}

/// Returns the id of the `comment_texts` row holding `text`, creating it if needed.
fn text_id_for(db: &rusqlite::Connection, text: &str) -> rusqlite::Result<i64> {
    db.execute(
        "INSERT INTO comment_texts (text) VALUES (?1) ON CONFLICT(text) DO NOTHING",
        rusqlite::params![text],
    )?;
    db.query_row(
        "SELECT id FROM comment_texts WHERE text = ?1",
        rusqlite::params![text],
        |r| r.get(0),
    )
}

fn comment_text(db: &rusqlite::Connection, text_id: i64) -> rusqlite::Result<Option<String>> {
    db.query_row(
        "SELECT text FROM comment_texts WHERE id = ?1",
        rusqlite::params![text_id],
        |r| r.get(0),
    )
    .optional()
}

#[async_trait]
impl CommentTransport for SqliteTransport {
    async fn fetch(&self, file: &FileId) -> Result<Vec<Comment>, RemoteError> {
        let file_id = file.clone();
        let rows = self
            .conn
            .call(move |db| {
                let mut stmt = db.prepare(
                    "SELECT c.id, c.line_number, c.author_id, c.author_name, c.author_role,
                            t.text, c.created_at, c.is_auto, c.text_id
                     FROM comments c JOIN comment_texts t ON t.id = c.text_id
                     WHERE c.file_id = ?1
                     ORDER BY c.created_at, c.rowid",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![&file_id.0], |r| {
                        let role: String = r.get(4)?;
                        let created_at: i64 = r.get(6)?;
                        Ok(Comment {
                            id: CommentId::new(r.get::<_, String>(0)?),
                            file_id: file_id.clone(),
                            line_number: r.get(1)?,
                            author_id: r.get(2)?,
                            author_name: r.get(3)?,
                            author_role: Role::from_name(&role).unwrap_or_default(),
                            text: r.get(5)?,
                            text_id: Some(CommentId::from(r.get::<_, i64>(8)?)),
                            timestamp: DateTime::from_timestamp(created_at, 0),
                            is_auto: r.get(7)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok::<_, rusqlite::Error>(rows)
            })
            .await?;
        Ok(rows)
    }

    async fn create(
        &self,
        file: &FileId,
        line: LineNumber,
        body: CreateBody,
    ) -> Result<CreateAck, RemoteError> {
        if line < 1 {
            return Err(RemoteError::Rejected(format!("invalid line number {line}")));
        }
        let row = NewRow::new(file, line, &self.author, self.exercise_id, false);
        match body {
            CreateBody::Text(text) => {
                let text = text.trim().to_owned();
                if text.is_empty() {
                    return Err(RemoteError::Rejected("empty comments are not allowed".into()));
                }
                let ack = self
                    .conn
                    .call(move |db| {
                        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
                        let text_id = text_id_for(&tx, &text)?;
                        let id = row.insert(&tx, text_id)?;
                        tx.commit()?;
                        Ok::<_, rusqlite::Error>(CreateAck {
                            id: CommentId::new(id),
                            text,
                            text_id: Some(CommentId::from(text_id)),
                        })
                    })
                    .await?;
                Ok(ack)
            }
            CreateBody::StoredText(text_id) => {
                let text_id: i64 = text_id
                    .as_str()
                    .parse()
                    .map_err(|_| RemoteError::Rejected(format!("unknown comment text {text_id}")))?;
                let ack = self
                    .conn
                    .call(move |db| {
                        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
                        let Some(text) = comment_text(&tx, text_id)? else {
                            return Ok(None);
                        };
                        let id = row.insert(&tx, text_id)?;
                        tx.commit()?;
                        Ok::<_, rusqlite::Error>(Some(CreateAck {
                            id: CommentId::new(id),
                            text,
                            text_id: Some(CommentId::from(text_id)),
                        }))
                    })
                    .await?;
                ack.ok_or_else(|| RemoteError::Rejected(format!("unknown comment text {text_id}")))
            }
        }
    }

    async fn delete(&self, file: &FileId, id: &CommentId) -> Result<(), RemoteError> {
        let file_id = file.0.clone();
        let comment_id = id.as_str().to_owned();
        let changed = self
            .conn
            .call(move |db| {
                let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
                let changed = tx.execute(
                    "DELETE FROM comments WHERE id = ?1 AND file_id = ?2",
                    rusqlite::params![&comment_id, &file_id],
                )?;
                tx.commit()?;
                Ok::<_, rusqlite::Error>(changed)
            })
            .await?;
        if changed == 0 {
            return Err(RemoteError::Rejected(format!("no comment {id} on file {file}")));
        }
        Ok(())
    }

    async fn common_comments(&self, exercise: Option<i64>) -> Result<Vec<CommonComment>, RemoteError> {
        let rows = self
            .conn
            .call(move |db| {
                let mut stmt = db.prepare(
                    "SELECT t.id, t.text
                     FROM comment_texts t JOIN comments c ON c.text_id = t.id
                     WHERE ?1 IS NULL OR c.exercise_id = ?1
                     GROUP BY t.id
                     ORDER BY COUNT(c.id) DESC, t.id
                     LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![exercise, COMMON_COMMENT_LIMIT as i64], |r| {
                        Ok(CommonComment {
                            id: CommentId::from(r.get::<_, i64>(0)?),
                            text: r.get(1)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok::<_, rusqlite::Error>(rows)
            })
            .await?;
        Ok(rows)
    }
}
