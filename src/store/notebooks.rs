use rusqlite::{params, Connection};

use super::{StoreError, StoreResult};
use crate::models::{Notebook, NotebookSummary};

fn not_found() -> StoreError {
    StoreError::NotFound("Notebook not found or not owned by user".to_string())
}

pub fn list(conn: &Connection, user_id: i64) -> StoreResult<Vec<Notebook>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, user_id FROM notebooks WHERE user_id = ?1 ORDER BY name, id",
    )?;
    let rows = stmt.query_map([user_id], |row| {
        Ok(Notebook {
            id: row.get(0)?,
            name: row.get(1)?,
            user_id: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn list_summaries(conn: &Connection, user_id: i64) -> StoreResult<Vec<NotebookSummary>> {
    Ok(list(conn, user_id)?
        .into_iter()
        .map(|nb| NotebookSummary {
            id: nb.id,
            name: nb.name,
        })
        .collect())
}

pub fn create(conn: &Connection, user_id: i64, name: &str) -> StoreResult<Notebook> {
    conn.execute(
        "INSERT INTO notebooks (name, user_id) VALUES (?1, ?2)",
        params![name, user_id],
    )?;
    Ok(Notebook {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        user_id,
    })
}

pub fn is_owned(conn: &Connection, user_id: i64, notebook_id: i64) -> StoreResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM notebooks WHERE id = ?1 AND user_id = ?2",
        params![notebook_id, user_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn rename(conn: &Connection, user_id: i64, notebook_id: i64, name: &str) -> StoreResult<()> {
    let changed = conn.execute(
        "UPDATE notebooks SET name = ?1 WHERE id = ?2 AND user_id = ?3",
        params![name, notebook_id, user_id],
    )?;
    if changed == 0 {
        return Err(not_found());
    }
    Ok(())
}

/// Notes filed in the notebook survive with their notebook cleared.
pub fn delete(conn: &Connection, user_id: i64, notebook_id: i64) -> StoreResult<()> {
    let changed = conn.execute(
        "DELETE FROM notebooks WHERE id = ?1 AND user_id = ?2",
        params![notebook_id, user_id],
    )?;
    if changed == 0 {
        return Err(not_found());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{notes, test_support};

    #[test]
    fn list_is_scoped_and_sorted_by_name() {
        let conn = test_support::conn();
        let ada = test_support::user(&conn, "ada");
        let bob = test_support::user(&conn, "bob");
        create(&conn, ada, "Zeta").unwrap();
        create(&conn, ada, "Alpha").unwrap();
        create(&conn, bob, "Bob's").unwrap();

        let names: Vec<String> = list(&conn, ada).unwrap().into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);
    }

    #[test]
    fn rename_and_delete_require_ownership() {
        let conn = test_support::conn();
        let ada = test_support::user(&conn, "ada");
        let bob = test_support::user(&conn, "bob");
        let nb = create(&conn, ada, "Work").unwrap();

        assert!(matches!(rename(&conn, bob, nb.id, "Mine"), Err(StoreError::NotFound(_))));
        assert!(matches!(delete(&conn, bob, nb.id), Err(StoreError::NotFound(_))));

        rename(&conn, ada, nb.id, "Office").unwrap();
        assert_eq!(list(&conn, ada).unwrap()[0].name, "Office");
    }

    #[test]
    fn delete_detaches_notes() {
        let conn = test_support::conn();
        let ada = test_support::user(&conn, "ada");
        let nb = create(&conn, ada, "Work").unwrap();
        let note = notes::create(&conn, ada, "Plan", None, Some(nb.id)).unwrap();

        delete(&conn, ada, nb.id).unwrap();

        let after = notes::get(&conn, ada, note.id).unwrap();
        assert_eq!(after.notebook_id, None);
        assert!(!is_owned(&conn, ada, nb.id).unwrap());
    }
}
