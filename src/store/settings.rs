use rusqlite::{params, Connection, OptionalExtension};

use super::StoreResult;

pub const SIGNUP_ENABLED: &str = "signup_enabled";

pub fn get(conn: &Connection, key: &str) -> StoreResult<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?)
}

pub fn set(conn: &Connection, key: &str, value: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Registration is open until an admin turns it off.
pub fn signup_enabled(conn: &Connection) -> StoreResult<bool> {
    Ok(get(conn, SIGNUP_ENABLED)?.map_or(true, |v| v == "true"))
}

pub fn set_signup_enabled(conn: &Connection, enabled: bool) -> StoreResult<()> {
    set(conn, SIGNUP_ENABLED, if enabled { "true" } else { "false" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support;

    #[test]
    fn signup_defaults_to_enabled() {
        let conn = test_support::conn();
        assert!(signup_enabled(&conn).unwrap());
    }

    #[test]
    fn set_overwrites_previous_value() {
        let conn = test_support::conn();
        set_signup_enabled(&conn, false).unwrap();
        assert!(!signup_enabled(&conn).unwrap());
        set_signup_enabled(&conn, true).unwrap();
        assert!(signup_enabled(&conn).unwrap());
        assert_eq!(get(&conn, SIGNUP_ENABLED).unwrap().as_deref(), Some("true"));
    }
}
