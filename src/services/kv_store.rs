//! Durable namespaced key-value store on top of the `kv_store` table.
//! Values are stored as JSON text.

use crate::error::AppError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Local records, keyed by uuid
pub const RECORD_NAMESPACE: &str = "wow-obs";
/// Staged dependency records, keyed by `create:<uuid>` / `update:<uuid>`
pub const STAGING_NAMESPACE: &str = "wow-sw";

pub fn get<T: DeserializeOwned>(
    conn: &Connection,
    namespace: &str,
    key: &str,
) -> Result<Option<T>, AppError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM kv_store WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
            |row| row.get(0),
        )
        .optional()?;

    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn set<T: Serialize>(
    conn: &Connection,
    namespace: &str,
    key: &str,
    value: &T,
) -> Result<(), AppError> {
    let text = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO kv_store (namespace, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![namespace, key, text, Utc::now().timestamp_millis()],
    )?;
    Ok(())
}

/// Returns whether a value was removed
pub fn remove(conn: &Connection, namespace: &str, key: &str) -> Result<bool, AppError> {
    let removed = conn.execute(
        "DELETE FROM kv_store WHERE namespace = ?1 AND key = ?2",
        params![namespace, key],
    )?;
    Ok(removed > 0)
}

pub fn count(conn: &Connection, namespace: &str) -> Result<usize, AppError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM kv_store WHERE namespace = ?1",
        params![namespace],
        |row| row.get(0),
    )?;
    Ok(n as usize)
}

/// All values of a namespace in insertion order
pub fn values<T: DeserializeOwned>(conn: &Connection, namespace: &str) -> Result<Vec<T>, AppError> {
    let mut stmt =
        conn.prepare("SELECT value FROM kv_store WHERE namespace = ?1 ORDER BY rowid")?;
    let rows = stmt
        .query_map(params![namespace], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<String>, _>>()?;

    let mut result = Vec::with_capacity(rows.len());
    for text in rows {
        result.push(serde_json::from_str(&text)?);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setup_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::database::schema::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_set_get_overwrite() {
        let conn = setup_test_db();
        set(&conn, RECORD_NAMESPACE, "a", &json!({"v": 1})).unwrap();
        set(&conn, RECORD_NAMESPACE, "a", &json!({"v": 2})).unwrap();

        let value: Option<serde_json::Value> = get(&conn, RECORD_NAMESPACE, "a").unwrap();
        assert_eq!(value, Some(json!({"v": 2})));
        assert_eq!(count(&conn, RECORD_NAMESPACE).unwrap(), 1);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let conn = setup_test_db();
        set(&conn, RECORD_NAMESPACE, "a", &1).unwrap();
        set(&conn, STAGING_NAMESPACE, "create:a", &2).unwrap();

        let value: Option<i32> = get(&conn, RECORD_NAMESPACE, "a").unwrap();
        assert_eq!(value, Some(1));
        assert_eq!(count(&conn, STAGING_NAMESPACE).unwrap(), 1);
        let missing: Option<i32> = get(&conn, STAGING_NAMESPACE, "a").unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_remove_reports_presence() {
        let conn = setup_test_db();
        set(&conn, RECORD_NAMESPACE, "a", &1).unwrap();
        assert!(remove(&conn, RECORD_NAMESPACE, "a").unwrap());
        assert!(!remove(&conn, RECORD_NAMESPACE, "a").unwrap());
    }

    #[test]
    fn test_values_keep_insertion_order() {
        let conn = setup_test_db();
        set(&conn, RECORD_NAMESPACE, "b", &"first").unwrap();
        set(&conn, RECORD_NAMESPACE, "a", &"second").unwrap();
        let all: Vec<String> = values(&conn, RECORD_NAMESPACE).unwrap();
        assert_eq!(all, vec!["first".to_string(), "second".to_string()]);
    }
}
