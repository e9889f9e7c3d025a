use rusqlite::{params, Connection};

use super::{StoreError, StoreResult};
use crate::models::{Tag, TagWithCount};

/// Tag names are shared across users, so they are compared in a canonical
/// form: trimmed, lowercased, inner whitespace collapsed to single spaces.
pub fn normalize(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn attach(conn: &Connection, note_id: i64, name: &str) -> StoreResult<Tag> {
    let name = normalize(name);
    if name.is_empty() {
        return Err(StoreError::InvalidInput("Tag name is required".to_string()));
    }

    conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", [&name])?;
    let id: i64 = conn.query_row("SELECT id FROM tags WHERE name = ?1", [&name], |row| {
        row.get(0)
    })?;
    conn.execute(
        "INSERT OR IGNORE INTO note_tags (note_id, tag_id) VALUES (?1, ?2)",
        params![note_id, id],
    )?;
    Ok(Tag { id, name })
}

pub fn detach(conn: &Connection, note_id: i64, tag_id: i64) -> StoreResult<()> {
    let changed = conn.execute(
        "DELETE FROM note_tags WHERE note_id = ?1 AND tag_id = ?2",
        params![note_id, tag_id],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound("Tag is not attached to this note".to_string()));
    }
    Ok(())
}

pub fn for_note(conn: &Connection, note_id: i64) -> StoreResult<Vec<Tag>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name FROM tags t
         JOIN note_tags nt ON nt.tag_id = t.id
         WHERE nt.note_id = ?1
         ORDER BY t.name",
    )?;
    let rows = stmt.query_map([note_id], |row| {
        Ok(Tag {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn list_for_user(conn: &Connection, user_id: i64) -> StoreResult<Vec<TagWithCount>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, COUNT(n.id) FROM tags t
         JOIN note_tags nt ON nt.tag_id = t.id
         JOIN notes n ON n.id = nt.note_id
         WHERE n.user_id = ?1
         GROUP BY t.id, t.name
         ORDER BY t.name",
    )?;
    let rows = stmt.query_map([user_id], |row| {
        Ok(TagWithCount {
            id: row.get(0)?,
            name: row.get(1)?,
            note_count: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
