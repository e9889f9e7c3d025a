use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension};

use super::{StoreError, StoreResult};
use crate::models::{Attachment, AttachmentSummary};

/// Public path an attachment is served under.
pub fn public_path(filename: &str) -> String {
    format!("/uploads/{filename}")
}

pub fn insert(
    conn: &Connection,
    note_id: i64,
    filename: &str,
    mimetype: Option<&str>,
) -> StoreResult<Attachment> {
    let filepath = public_path(filename);
    conn.execute(
        "INSERT INTO attachments (note_id, filename, filepath, mimetype) VALUES (?1, ?2, ?3, ?4)",
        params![note_id, filename, filepath, mimetype],
    )?;
    Ok(Attachment {
        id: conn.last_insert_rowid(),
        note_id,
        filename: filename.to_string(),
        filepath,
        mimetype: mimetype.map(str::to_string),
    })
}

/// Looks up an attachment together with the id of the user owning its note.
pub fn find_with_owner(conn: &Connection, attachment_id: i64) -> StoreResult<Option<(Attachment, i64)>> {
    Ok(conn
        .query_row(
            "SELECT a.id, a.note_id, a.filename, a.filepath, a.mimetype, n.user_id
             FROM attachments a
             JOIN notes n ON a.note_id = n.id
             WHERE a.id = ?1",
            [attachment_id],
            |row| {
                Ok((
                    Attachment {
                        id: row.get(0)?,
                        note_id: row.get(1)?,
                        filename: row.get(2)?,
                        filepath: row.get(3)?,
                        mimetype: row.get(4)?,
                    },
                    row.get(5)?,
                ))
            },
        )
        .optional()?)
}

pub fn delete(conn: &Connection, attachment_id: i64) -> StoreResult<()> {
    let changed = conn.execute("DELETE FROM attachments WHERE id = ?1", [attachment_id])?;
    if changed == 0 {
        return Err(StoreError::NotFound("Attachment not found.".to_string()));
    }
    Ok(())
}

pub fn summaries_for_note(conn: &Connection, note_id: i64) -> StoreResult<Vec<AttachmentSummary>> {
    let mut stmt = conn.prepare(
        "SELECT id, filename, filepath, mimetype FROM attachments WHERE note_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map([note_id], |row| {
        Ok(AttachmentSummary {
            id: row.get(0)?,
            filename: row.get(1)?,
            filepath: row.get(2)?,
            mimetype: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn collect_filenames(conn: &Connection, sql: &str, id: i64) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([id], |row| row.get(0))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn filenames_for_note(conn: &Connection, note_id: i64) -> StoreResult<Vec<String>> {
    collect_filenames(
        conn,
        "SELECT filename FROM attachments WHERE note_id = ?1 ORDER BY id",
        note_id,
    )
}

pub fn filenames_for_user(conn: &Connection, user_id: i64) -> StoreResult<Vec<String>> {
    collect_filenames(
        conn,
        "SELECT a.filename FROM attachments a
         JOIN notes n ON a.note_id = n.id
         WHERE n.user_id = ?1
         ORDER BY a.id",
        user_id,
    )
}

pub fn all_filenames(conn: &Connection) -> StoreResult<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT filename FROM attachments")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    Ok(rows.collect::<Result<HashSet<_>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{notes, test_support};

    #[test]
    fn find_with_owner_reports_note_owner() {
        let conn = test_support::conn();
        let ada = test_support::user(&conn, "ada");
        let note = notes::create(&conn, ada, "n", None, None).unwrap();
        let att = insert(&conn, note.id, "42-a.txt", Some("text/plain")).unwrap();

        let (found, owner) = find_with_owner(&conn, att.id).unwrap().unwrap();
        assert_eq!(found, att);
        assert_eq!(owner, ada);
        assert!(find_with_owner(&conn, att.id + 1).unwrap().is_none());
    }

    #[test]
    fn delete_removes_row_once() {
        let conn = test_support::conn();
        let ada = test_support::user(&conn, "ada");
        let note = notes::create(&conn, ada, "n", None, None).unwrap();
        let att = insert(&conn, note.id, "42-a.txt", None).unwrap();

        delete(&conn, att.id).unwrap();
        assert!(matches!(delete(&conn, att.id), Err(StoreError::NotFound(_))));
        assert!(all_filenames(&conn).unwrap().is_empty());
    }

    #[test]
    fn filenames_are_scoped() {
        let conn = test_support::conn();
        let ada = test_support::user(&conn, "ada");
        let bob = test_support::user(&conn, "bob");
        let a = notes::create(&conn, ada, "a", None, None).unwrap();
        let b = notes::create(&conn, bob, "b", None, None).unwrap();
        insert(&conn, a.id, "1-a.txt", None).unwrap();
        insert(&conn, b.id, "2-b.txt", None).unwrap();

        assert_eq!(filenames_for_user(&conn, ada).unwrap(), vec!["1-a.txt".to_string()]);
        assert_eq!(filenames_for_note(&conn, b.id).unwrap(), vec!["2-b.txt".to_string()]);
        assert_eq!(all_filenames(&conn).unwrap().len(), 2);
    }
}
