use rusqlite::{params, Connection};

use super::{StoreError, StoreResult};
use crate::models::SearchHit;

const FALLBACK_SNIPPET_CHARS: usize = 120;

/// Turns free text into an FTS5 query where every term is a quoted prefix
/// match (`"term"*`). Quoting keeps operators and punctuation in user input
/// from being parsed as FTS syntax. Terms without any alphanumeric character
/// carry no tokens and are dropped.
pub fn build_fts_query(raw: &str) -> Option<String> {
    let terms: Vec<String> = raw
        .split_whitespace()
        .filter(|term| term.chars().any(char::is_alphanumeric))
        .map(|term| format!("\"{}\"*", term.replace('"', "\"\"")))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" "))
}

fn map_fts_error(err: rusqlite::Error) -> StoreError {
    let msg = err.to_string();
    if msg.contains("fts5") || msg.contains("syntax") {
        StoreError::InvalidInput(format!("invalid search query: {msg}"))
    } else {
        StoreError::Database(err)
    }
}

pub fn search(conn: &Connection, user_id: i64, raw: &str, fts_enabled: bool) -> StoreResult<Vec<SearchHit>> {
    if fts_enabled {
        search_fts(conn, user_id, raw)
    } else {
        search_like(conn, user_id, raw)
    }
}

fn search_fts(conn: &Connection, user_id: i64, raw: &str) -> StoreResult<Vec<SearchHit>> {
    let Some(query) = build_fts_query(raw) else {
        return Ok(Vec::new());
    };

    let mut stmt = conn.prepare(
        "SELECT n.id, n.title, n.notebook_id,
                snippet(notes_fts, 1, '<b>', '</b>', '...', 15) AS snippet
         FROM notes_fts
         JOIN notes n ON notes_fts.rowid = n.id
         WHERE notes_fts MATCH ?1 AND n.user_id = ?2
         ORDER BY rank",
    )?;
    let rows = stmt
        .query_map(params![query, user_id], |row| {
            Ok(SearchHit {
                id: row.get(0)?,
                title: row.get(1)?,
                notebook_id: row.get(2)?,
                snippet: row.get(3)?,
            })
        })
        .map_err(map_fts_error)?;

    rows.map(|row| row.map_err(map_fts_error)).collect()
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn leading_snippet(content: Option<String>) -> Option<String> {
    let content = content?;
    if content.chars().count() <= FALLBACK_SNIPPET_CHARS {
        return Some(content);
    }
    let head: String = content.chars().take(FALLBACK_SNIPPET_CHARS).collect();
    Some(format!("{head}..."))
}

/// Every term must appear in the title or the content.
fn search_like(conn: &Connection, user_id: i64, raw: &str) -> StoreResult<Vec<SearchHit>> {
    let terms: Vec<String> = raw.split_whitespace().map(escape_like).collect();
    if terms.is_empty() {
        return Ok(Vec::new());
    }

    let mut sql = String::from(
        "SELECT id, title, notebook_id, content FROM notes WHERE user_id = ?1",
    );
    for idx in 0..terms.len() {
        let p = idx + 2;
        sql.push_str(&format!(
            " AND (title LIKE ?{p} ESCAPE '\\' OR content LIKE ?{p} ESCAPE '\\')"
        ));
    }
    sql.push_str(" ORDER BY modified_at DESC, id DESC");

    let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(user_id)];
    for term in terms {
        values.push(Box::new(term));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), |row| {
        Ok(SearchHit {
            id: row.get(0)?,
            title: row.get(1)?,
            notebook_id: row.get(2)?,
            snippet: leading_snippet(row.get(3)?),
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{notes, test_support};

    #[test]
    fn fts_query_quotes_and_prefixes_terms() {
        assert_eq!(build_fts_query("rust  async").as_deref(), Some("\"rust\"* \"async\"*"));
        assert_eq!(build_fts_query("say \"hi\"").as_deref(), Some("\"say\"* \"\"\"hi\"\"\"*"));
        assert_eq!(build_fts_query("  -- * "), None);
    }

    #[test]
    fn search_matches_prefixes_within_user_scope() {
        let conn = test_support::conn();
        let ada = test_support::user(&conn, "ada");
        let bob = test_support::user(&conn, "bob");
        let mine = notes::create(&conn, ada, "Groceries", Some("buy apples and bread"), None).unwrap();
        notes::create(&conn, bob, "Also groceries", Some("apples"), None).unwrap();

        let hits = search(&conn, ada, "appl", true).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, mine.id);
        let snippet = hits[0].snippet.as_deref().unwrap();
        assert!(snippet.contains("<b>"), "snippet should highlight: {snippet}");
    }

    #[test]
    fn search_tolerates_fts_operators_in_input() {
        let conn = test_support::conn();
        let ada = test_support::user(&conn, "ada");
        notes::create(&conn, ada, "AND OR NOT", Some("(weird) \"quotes\" col:on"), None).unwrap();

        for input in ["AND", "NOT OR", "(weird", "\"quotes", "col:on", "a*b^c"] {
            search(&conn, ada, input, true).unwrap();
        }
    }

    #[test]
    fn search_reflects_updates_and_deletes() {
        let mut conn = test_support::conn();
        let ada = test_support::user(&conn, "ada");
        let note = notes::create(&conn, ada, "Draft", Some("first version"), None).unwrap();

        notes::update(&conn, ada, note.id, "Draft", Some("second revision"), None).unwrap();
        assert!(search(&conn, ada, "first", true).unwrap().is_empty());
        assert_eq!(search(&conn, ada, "revision", true).unwrap().len(), 1);

        notes::delete(&mut conn, ada, note.id).unwrap();
        assert!(search(&conn, ada, "revision", true).unwrap().is_empty());
    }

    #[test]
    fn like_fallback_requires_every_term() {
        let conn = test_support::conn();
        let ada = test_support::user(&conn, "ada");
        let both = notes::create(&conn, ada, "Trip", Some("pack 100% cotton socks"), None).unwrap();
        notes::create(&conn, ada, "Other", Some("socks only"), None).unwrap();

        let hits = search(&conn, ada, "socks 100%", false).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, both.id);
        assert_eq!(hits[0].snippet.as_deref(), Some("pack 100% cotton socks"));
    }

    #[test]
    fn leading_snippet_truncates_on_char_boundary() {
        let long = "é".repeat(200);
        let snippet = leading_snippet(Some(long)).unwrap();
        assert!(snippet.ends_with("..."));
        assert_eq!(snippet.chars().count(), FALLBACK_SNIPPET_CHARS + 3);
    }
}
