use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use super::{attachments, is_unique_violation, settings, StoreError, StoreResult};
use crate::models::{Role, User, UserProfile};

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        role: Role::parse(&role),
        location: row.get(4)?,
    })
}

pub fn count(conn: &Connection) -> StoreResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
}

pub fn insert(conn: &Connection, username: &str, password_hash: &str, role: Role) -> StoreResult<i64> {
    match conn.execute(
        "INSERT INTO users (username, password, role) VALUES (?1, ?2, ?3)",
        params![username, password_hash, role.as_str()],
    ) {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(err) if is_unique_violation(&err) => {
            Err(StoreError::Conflict("Username already exists".to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Creates an account. The very first account becomes the administrator; any
/// later one requires registration to be enabled.
pub fn register(conn: &mut Connection, username: &str, password_hash: &str) -> StoreResult<(i64, Role)> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let role = if count(&tx)? == 0 {
        Role::Admin
    } else if settings::signup_enabled(&tx)? {
        Role::User
    } else {
        return Err(StoreError::Forbidden(
            "User registration is currently disabled. Contact the administrator.".to_string(),
        ));
    };

    let id = insert(&tx, username, password_hash, role)?;
    tx.commit()?;
    Ok((id, role))
}

pub fn find_by_username(conn: &Connection, username: &str) -> StoreResult<Option<User>> {
    Ok(conn
        .query_row(
            "SELECT id, username, password, role, location FROM users WHERE username = ?1",
            [username],
            user_from_row,
        )
        .optional()?)
}

pub fn find_by_id(conn: &Connection, id: i64) -> StoreResult<Option<User>> {
    Ok(conn
        .query_row(
            "SELECT id, username, password, role, location FROM users WHERE id = ?1",
            [id],
            user_from_row,
        )
        .optional()?)
}

pub fn profile(conn: &Connection, id: i64) -> StoreResult<UserProfile> {
    let user = find_by_id(conn, id)?.ok_or_else(|| StoreError::NotFound("User not found".to_string()))?;
    Ok(UserProfile {
        id: user.id,
        username: user.username,
        location: user.location,
        role: user.role,
    })
}

pub fn update_location(conn: &Connection, id: i64, location: Option<&str>) -> StoreResult<()> {
    let changed = conn.execute(
        "UPDATE users SET location = ?1 WHERE id = ?2",
        params![location, id],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound("User not found".to_string()));
    }
    Ok(())
}

/// Deletes the account and everything it owns. Returns the stored file names
/// of the attachments that went with it so the caller can remove them.
pub fn delete(conn: &mut Connection, id: i64) -> StoreResult<Vec<String>> {
    let tx = conn.transaction()?;
    let files = attachments::filenames_for_user(&tx, id)?;
    let changed = tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(StoreError::NotFound("User not found".to_string()));
    }
    tx.commit()?;
    Ok(files)
}
