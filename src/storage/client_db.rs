use rusqlite::{Connection, OptionalExtension, Result as SqlResult, params};
use std::path::Path;

/// Client-side key-value store (SQLite), the durable counterpart of
/// browser storage.
pub struct ClientDatabase {
    conn: Connection,
}

impl ClientDatabase {
    /// Open (or create) the database at `path`.
    pub fn with_path<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        let client_db = Self {
            conn: Connection::open(path)?,
        };
        client_db.init_schema()?;
        Ok(client_db)
    }

    pub fn in_memory() -> SqlResult<Self> {
        let client_db = Self {
            conn: Connection::open_in_memory()?,
        };
        client_db.init_schema()?;
        Ok(client_db)
    }

    fn init_schema(&self) -> SqlResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            )",
            [],
        )?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> SqlResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
    }

    /// Insert or replace the value stored under `key`.
    pub fn put(&self, key: &str, value: &str) -> SqlResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv_entries (key, value, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now'))",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> SqlResult<()> {
        self.conn
            .execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_replaces_and_remove_deletes() {
        let db = ClientDatabase::in_memory().unwrap();
        assert_eq!(db.get("k").unwrap(), None);

        db.put("k", "one").unwrap();
        db.put("k", "two").unwrap();
        assert_eq!(db.get("k").unwrap().as_deref(), Some("two"));

        db.remove("k").unwrap();
        assert_eq!(db.get("k").unwrap(), None);
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.db");

        ClientDatabase::with_path(&path)
            .unwrap()
            .put("k", "kept")
            .unwrap();

        let reopened = ClientDatabase::with_path(&path).unwrap();
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("kept"));
    }
}
