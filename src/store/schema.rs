use rusqlite::Connection;
use tracing::{info, warn};

/// Creates tables, the FTS index and its sync triggers. Safe to run repeatedly.
///
/// Returns whether full-text search is available. When the FTS5 module is
/// missing the service keeps running and search degrades to `LIKE` matching.
pub fn initialize(conn: &Connection) -> rusqlite::Result<bool> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT UNIQUE NOT NULL,
            password TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'user',
            location TEXT
        );
        CREATE TABLE IF NOT EXISTS notebooks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        );
        CREATE TABLE IF NOT EXISTS notes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            content TEXT,
            created_at TEXT NOT NULL,
            modified_at TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            notebook_id INTEGER,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (notebook_id) REFERENCES notebooks(id) ON DELETE SET NULL
        );
        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL
        );
        CREATE TABLE IF NOT EXISTS note_tags (
            note_id INTEGER NOT NULL,
            tag_id INTEGER NOT NULL,
            PRIMARY KEY (note_id, tag_id),
            FOREIGN KEY (note_id) REFERENCES notes(id) ON DELETE CASCADE,
            FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
        );
        CREATE TABLE IF NOT EXISTS attachments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            note_id INTEGER NOT NULL,
            filename TEXT NOT NULL,
            filepath TEXT NOT NULL,
            mimetype TEXT,
            FOREIGN KEY (note_id) REFERENCES notes(id) ON DELETE CASCADE
        );
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_notebooks_user ON notebooks(user_id);
        CREATE INDEX IF NOT EXISTS idx_notes_user_modified ON notes(user_id, modified_at);
        CREATE INDEX IF NOT EXISTS idx_notes_notebook ON notes(notebook_id);
        CREATE INDEX IF NOT EXISTS idx_attachments_note ON attachments(note_id);
        CREATE INDEX IF NOT EXISTS idx_note_tags_tag ON note_tags(tag_id);
        ",
    )?;

    let fts = conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS notes_fts USING fts5(
            title,
            content,
            content='notes',
            content_rowid='id',
            tokenize='porter'
        );",
    );
    if let Err(err) = fts {
        warn!("FTS5 virtual table creation failed, falling back to LIKE search: {err}");
        return Ok(false);
    }

    // External-content FTS: the triggers are the only thing keeping notes_fts
    // consistent with notes, so every write path to notes goes through them.
    conn.execute_batch(
        "
        CREATE TRIGGER IF NOT EXISTS notes_ai AFTER INSERT ON notes BEGIN
            INSERT INTO notes_fts(rowid, title, content)
            VALUES (new.id, new.title, COALESCE(new.content, ''));
        END;
        CREATE TRIGGER IF NOT EXISTS notes_ad AFTER DELETE ON notes BEGIN
            INSERT INTO notes_fts(notes_fts, rowid, title, content)
            VALUES ('delete', old.id, old.title, COALESCE(old.content, ''));
        END;
        CREATE TRIGGER IF NOT EXISTS notes_au AFTER UPDATE ON notes BEGIN
            INSERT INTO notes_fts(notes_fts, rowid, title, content)
            VALUES ('delete', old.id, old.title, COALESCE(old.content, ''));
            INSERT INTO notes_fts(rowid, title, content)
            VALUES (new.id, new.title, COALESCE(new.content, ''));
        END;
        ",
    )?;

    info!("Schema initialization complete (with FTS)");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT 1 FROM sqlite_master WHERE name = ?1",
            [name],
            |_| Ok(()),
        )
        .is_ok()
    }

    #[test]
    fn initialize_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(initialize(&conn).unwrap());
        for table in [
            "users",
            "notebooks",
            "notes",
            "tags",
            "note_tags",
            "attachments",
            "settings",
            "notes_fts",
            "notes_ai",
            "notes_ad",
            "notes_au",
        ] {
            assert!(table_exists(&conn, table), "{table} missing");
        }
    }

    #[test]
    fn initialize_is_idempotent_and_keeps_data() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn.execute(
            "INSERT INTO users (username, password) VALUES ('ada', 'x')",
            [],
        )
        .unwrap();

        initialize(&conn).unwrap();
        initialize(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO notebooks (name, user_id) VALUES ('orphan', 999)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn triggers_keep_fts_in_sync() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn.execute("INSERT INTO users (username, password) VALUES ('u', 'x')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO notes (title, content, created_at, modified_at, user_id)
             VALUES ('Groceries', 'buy apples', 't', 't', 1)",
            [],
        )
        .unwrap();

        let hits = |q: &str| -> i64 {
            conn.query_row(
                "SELECT COUNT(*) FROM notes_fts WHERE notes_fts MATCH ?1",
                [q],
                |row| row.get(0),
            )
            .unwrap()
        };
        assert_eq!(hits("apples"), 1);

        conn.execute("UPDATE notes SET content = 'buy pears' WHERE id = 1", [])
            .unwrap();
        assert_eq!(hits("apples"), 0);
        assert_eq!(hits("pears"), 1);

        conn.execute("DELETE FROM notes WHERE id = 1", []).unwrap();
        assert_eq!(hits("pears"), 0);
    }
}
