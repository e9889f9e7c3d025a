use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{attachments, notebooks, now_timestamp, tags, StoreError, StoreResult};
use crate::models::{Note, NoteDetail};

const NOTE_COLUMNS: &str = "n.id, n.title, n.content, n.created_at, n.modified_at, n.user_id, n.notebook_id";

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        created_at: row.get(3)?,
        modified_at: row.get(4)?,
        user_id: row.get(5)?,
        notebook_id: row.get(6)?,
    })
}

fn not_found() -> StoreError {
    StoreError::NotFound("Note not found or not owned by user".to_string())
}

fn check_notebook(conn: &Connection, user_id: i64, notebook_id: Option<i64>) -> StoreResult<()> {
    if let Some(notebook_id) = notebook_id {
        if !notebooks::is_owned(conn, user_id, notebook_id)? {
            return Err(StoreError::InvalidInput(
                "Notebook not found or not owned by user".to_string(),
            ));
        }
    }
    Ok(())
}

fn query_notes(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> StoreResult<Vec<Note>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, note_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn list(conn: &Connection, user_id: i64) -> StoreResult<Vec<Note>> {
    query_notes(
        conn,
        &format!(
            "SELECT {NOTE_COLUMNS} FROM notes n
             WHERE n.user_id = ?1
             ORDER BY n.modified_at DESC, n.id DESC"
        ),
        [user_id],
    )
}

pub fn list_in_notebook(conn: &Connection, user_id: i64, notebook_id: i64) -> StoreResult<Vec<Note>> {
    query_notes(
        conn,
        &format!(
            "SELECT {NOTE_COLUMNS} FROM notes n
             WHERE n.notebook_id = ?1 AND n.user_id = ?2
             ORDER BY n.modified_at DESC, n.id DESC"
        ),
        params![notebook_id, user_id],
    )
}

pub fn list_with_tag(conn: &Connection, user_id: i64, tag_name: &str) -> StoreResult<Vec<Note>> {
    query_notes(
        conn,
        &format!(
            "SELECT {NOTE_COLUMNS} FROM notes n
             JOIN note_tags nt ON nt.note_id = n.id
             JOIN tags t ON t.id = nt.tag_id
             WHERE t.name = ?1 AND n.user_id = ?2
             ORDER BY n.modified_at DESC, n.id DESC"
        ),
        params![tags::normalize(tag_name), user_id],
    )
}

pub fn get(conn: &Connection, user_id: i64, note_id: i64) -> StoreResult<Note> {
    conn.query_row(
        &format!("SELECT {NOTE_COLUMNS} FROM notes n WHERE n.id = ?1 AND n.user_id = ?2"),
        params![note_id, user_id],
        note_from_row,
    )
    .optional()?
    .ok_or_else(not_found)
}

/// Owner of a note, if the note exists at all.
pub fn owner(conn: &Connection, note_id: i64) -> StoreResult<Option<i64>> {
    Ok(conn
        .query_row("SELECT user_id FROM notes WHERE id = ?1", [note_id], |row| {
            row.get(0)
        })
        .optional()?)
}

pub fn detail(conn: &Connection, user_id: i64, note_id: i64) -> StoreResult<NoteDetail> {
    let note = get(conn, user_id, note_id)?;
    Ok(NoteDetail {
        attachments: attachments::summaries_for_note(conn, note.id)?,
        tags: tags::for_note(conn, note.id)?,
        note,
    })
}

pub fn create(
    conn: &Connection,
    user_id: i64,
    title: &str,
    content: Option<&str>,
    notebook_id: Option<i64>,
) -> StoreResult<Note> {
    check_notebook(conn, user_id, notebook_id)?;
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO notes (title, content, created_at, modified_at, user_id, notebook_id)
         VALUES (?1, ?2, ?3, ?3, ?4, ?5)",
        params![title, content, now, user_id, notebook_id],
    )?;
    Ok(Note {
        id: conn.last_insert_rowid(),
        title: title.to_string(),
        content: content.map(str::to_string),
        created_at: now.clone(),
        modified_at: now,
        user_id,
        notebook_id,
    })
}

pub fn update(
    conn: &Connection,
    user_id: i64,
    note_id: i64,
    title: &str,
    content: Option<&str>,
    notebook_id: Option<i64>,
) -> StoreResult<()> {
    check_notebook(conn, user_id, notebook_id)?;
    let changed = conn.execute(
        "UPDATE notes SET title = ?1, content = ?2, modified_at = ?3, notebook_id = ?4
         WHERE id = ?5 AND user_id = ?6",
        params![title, content, now_timestamp(), notebook_id, note_id, user_id],
    )?;
    if changed == 0 {
        return Err(not_found());
    }
    Ok(())
}

/// Deletes the note and returns the stored file names of its attachments.
pub fn delete(conn: &mut Connection, user_id: i64, note_id: i64) -> StoreResult<Vec<String>> {
    let tx = conn.transaction()?;
    let files = attachments::filenames_for_note(&tx, note_id)?;
    let changed = tx.execute(
        "DELETE FROM notes WHERE id = ?1 AND user_id = ?2",
        params![note_id, user_id],
    )?;
    if changed == 0 {
        return Err(not_found());
    }
    tx.commit()?;
    Ok(files)
}
