//! End-to-end review of a highlighted file against the SQLite comment store.

use std::sync::Arc;

use linenote_core::db::{self, Author, SqliteTransport};
use linenote_core::drag::{DragEvent, DragOutcome};
use linenote_core::highlight::{highlight_to_markup, DEFAULT_THEME};
use linenote_core::sync::CommentTransport;
use linenote_core::types::{CommentId, FileId, Role, ViewerContext};
use linenote_core::{RemoteSyncClient, ReviewSession, ReviewSurface, SurfaceEvent};

const SOURCE: &str = "def total(xs):\n    \"\"\"Sum\n    of xs\"\"\"\n    s = 0\n    for x in xs:\n        s += x\n    return s\n";

fn temp_db_path() -> (tempfile::TempDir, String) {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("comments.db").to_string_lossy().to_string();
    (dir, path)
}

fn staff() -> ViewerContext {
    ViewerContext {
        file_id: FileId("solution-7".into()),
        user_id: 1,
        user_name: "Grace Hopper".into(),
        role: Role::Staff,
        solver_id: 2,
        comments_permitted: true,
    }
}

fn author(viewer: &ViewerContext) -> Author {
    Author { id: viewer.user_id, name: viewer.user_name.clone(), role: viewer.role }
}

async fn session_at(path: &str) -> (ReviewSession, Arc<SqliteTransport>) {
    let viewer = staff();
    let transport = Arc::new(SqliteTransport::open(path, author(&viewer)).await.unwrap());
    let markup = highlight_to_markup(SOURCE, "py", DEFAULT_THEME);
    let (surface, event) = ReviewSurface::new(&markup, viewer.clone()).unwrap();
    assert_eq!(event, SurfaceEvent::LinesNumbered { count: 8 });
    let client = RemoteSyncClient::new(transport.clone(), viewer.file_id);
    (ReviewSession::new(surface, client), transport)
}

#[tokio::test]
async fn schema_is_migrated_once() {
    let (_dir, path) = temp_db_path();
    let conn = db::open_db(&path).await.unwrap();
    let version: i64 = conn
        .call(|db| {
            Ok::<_, rusqlite::Error>(db.query_row(
                "SELECT MAX(version) FROM schema_version",
                [],
                |r| r.get(0),
            )?)
        })
        .await
        .unwrap();
    assert_eq!(version, 1);

    let journal: String = conn
        .call(|db| {
            Ok::<_, rusqlite::Error>(db.query_row("PRAGMA journal_mode", [], |r| r.get(0))?)
        })
        .await
        .unwrap();
    assert_eq!(journal, "wal");

    drop(conn);
    db::open_db(&path).await.unwrap();
}

#[tokio::test]
async fn comments_survive_reopening() {
    let (_dir, path) = temp_db_path();
    let (mut session, _) = session_at(&path).await;
    let first = session.create(2, "Docstring should say what is summed").await.unwrap();
    let second = session.create(6, "Use `sum(xs)`").await.unwrap();
    let second = session.reassign(&second, 7).await.unwrap();
    assert_eq!(session.surface().store().marked_lines(), [2, 7]);

    let (mut reopened, _) = session_at(&path).await;
    assert_eq!(reopened.load().await, 2);
    let store = reopened.surface().store();
    assert_eq!(store.line_of(&first).unwrap(), 2);
    assert_eq!(store.line_of(&second).unwrap(), 7);
    assert_eq!(store.get(&second).unwrap().author_name, "Grace Hopper");
    assert!(store.get(&second).unwrap().timestamp.is_some());
    assert_eq!(reopened.surface().registry().container_for(7).unwrap().units.len(), 1);
}

#[tokio::test]
async fn drag_reassign_and_delete_round_trip() {
    let (_dir, path) = temp_db_path();
    let (mut session, transport) = session_at(&path).await;
    let id = session.create(4, "Name this better").await.unwrap();

    let start = DragEvent::Start { comment_id: id.clone(), origin: 4 };
    assert_eq!(session.drag(start).await.unwrap(), DragOutcome::Started);
    session.drag(DragEvent::Enter(5)).await.unwrap();
    let outcome = session.drag(DragEvent::Drop(5)).await.unwrap();
    assert_eq!(outcome, DragOutcome::Reassign { comment_id: id.clone(), from: 4, to: 5 });

    let stored = transport.fetch(&FileId("solution-7".into())).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].line_number, 5);
    assert_eq!(stored[0].text, "Name this better");
    let moved = session.surface().store().comments_on(5)[0].id.clone();
    assert_eq!(stored[0].id, moved);
    assert!(!session.surface().store().contains(&id));

    session.delete(&moved).await.unwrap();
    assert!(session.surface().store().is_empty());
    assert!(transport.fetch(&FileId("solution-7".into())).await.unwrap().is_empty());
    assert!(session.delete(&moved).await.is_err());
}

#[tokio::test]
async fn moved_comment_stays_last_on_its_new_line_after_reload() {
    let (_dir, path) = temp_db_path();
    let (mut session, _) = session_at(&path).await;
    let moved = session.create(2, "Check for an empty list").await.unwrap();
    session.create(5, "Loop variable shadows builtin").await.unwrap();
    session.create(5, "Prefer augmented assignment").await.unwrap();
    let moved = session.reassign(&moved, 5).await.unwrap();

    let order = |session: &ReviewSession| -> Vec<String> {
        session.surface().store().comments_on(5).iter().map(|c| c.text.clone()).collect()
    };
    let expected = ["Loop variable shadows builtin", "Prefer augmented assignment", "Check for an empty list"];
    assert_eq!(order(&session), expected);
    assert_eq!(session.surface().store().comments_on(5)[2].id, moved);

    let (mut reopened, _) = session_at(&path).await;
    assert_eq!(reopened.load().await, 3);
    assert_eq!(order(&reopened), expected);
    assert!(reopened.surface().store().comments_on(2).is_empty());
}

#[tokio::test]
async fn common_comments_rank_reused_texts() {
    let (_dir, path) = temp_db_path();
    let (mut session, transport) = session_at(&path).await;
    for line in [1, 3, 5] {
        session.create(line, "Missing type hints").await.unwrap();
    }
    session.create(2, "Nice").await.unwrap();
    transport
        .insert_auto(&FileId("solution-7".into()), 6, "E225 missing whitespace")
        .await
        .unwrap();

    let common = session.client().common_comments(None).await.unwrap();
    assert_eq!(common[0].text, "Missing type hints");
    assert_eq!(common.len(), 3);

    session.attach_common(7, &common[0]).await.unwrap();
    let on_seven = session.surface().store().comments_on(7);
    assert_eq!(on_seven[0].text, "Missing type hints");

    let texts: i64 = transport
        .connection()
        .call(|db| {
            Ok::<_, rusqlite::Error>(db.query_row("SELECT COUNT(*) FROM comment_texts", [], |r| r.get(0))?)
        })
        .await
        .unwrap();
    assert_eq!(texts, 3, "reused text is stored once");
}

#[tokio::test]
async fn auto_comments_do_not_mark_lines() {
    let (_dir, path) = temp_db_path();
    let (mut session, transport) = session_at(&path).await;
    transport
        .insert_auto(&FileId("solution-7".into()), 3, "W291 trailing whitespace")
        .await
        .unwrap();
    assert_eq!(session.load().await, 1);
    assert!(session.surface().store().marked_lines().is_empty());
    let unit = &session.surface().registry().container_for(3).unwrap().units[0];
    assert!(unit.is_auto);
    assert_eq!(unit.comment_id, session.surface().store().comments_on(3)[0].id);
    assert!(matches!(
        session.surface().store().get(&CommentId::from("missing")),
        Err(_)
    ));
}
