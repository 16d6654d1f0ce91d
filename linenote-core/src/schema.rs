/// DDL to create the schema_version tracking table.
///
/// Applied unconditionally on every DB open (before checking the version),
/// using `IF NOT EXISTS` so it is safe to run multiple times.
pub const SCHEMA_VERSION_DDL: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER NOT NULL
    ) STRICT;
";

/// DDL for the full v1 schema.
///
/// - `comment_texts`: every distinct comment body, stored once. Reusing a
///   text (a common comment, or the same remark typed twice) points at the
///   existing row.
/// - `comments`: one row per comment placed on a line of a file, keyed by
///   UUID v4 text.
pub const SCHEMA_V1_SQL: &str = "
    CREATE TABLE IF NOT EXISTS comment_texts (
        id    INTEGER PRIMARY KEY,
        text  TEXT    NOT NULL UNIQUE
    ) STRICT;

    CREATE TABLE IF NOT EXISTS comments (
        id           TEXT    PRIMARY KEY,
        file_id      TEXT    NOT NULL,
        exercise_id  INTEGER,
        line_number  INTEGER NOT NULL CHECK(line_number >= 1),
        author_id    INTEGER,
        author_name  TEXT    NOT NULL,
        author_role  TEXT    NOT NULL
                             CHECK(author_role IN ('student', 'staff', 'administrator')),
        text_id      INTEGER NOT NULL REFERENCES comment_texts(id),
        is_auto      INTEGER NOT NULL DEFAULT 0,
        created_at   INTEGER NOT NULL
    ) STRICT;

    CREATE INDEX IF NOT EXISTS comments_by_file ON comments(file_id, line_number);
";

/// Runs forward-only schema migration to the latest version.
///
/// Idempotent: safe to call on every open.
///
/// # Errors
///
/// Returns `rusqlite::Error` if the DDL fails or the version row cannot be read.
pub fn migrate(db: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    db.execute_batch(SCHEMA_VERSION_DDL)?;

    let version: i64 = db
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if version < 1 {
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute_batch(SCHEMA_V1_SQL)?;
        tx.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
        tx.commit()?;
    }

    Ok(())
}
