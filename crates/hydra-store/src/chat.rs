use rusqlite::{params, OptionalExtension, Row};

use crate::db::Store;
use crate::error::StoreError;

/// A chat discoverable on some vendor, upserted from `sync` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRow {
    pub id: i64,
    pub limb: String,
    pub chat_type: String,
    pub title: String,
}

fn row_to_chat(row: &Row<'_>) -> rusqlite::Result<ChatRow> {
    Ok(ChatRow {
        id: row.get(0)?,
        limb: row.get(1)?,
        chat_type: row.get(2)?,
        title: row.get(3)?,
    })
}

impl Store {
    /// Insert a chat or refresh its title when the limb is already known.
    pub fn add_or_update_chat(
        &self,
        limb: &str,
        chat_type: &str,
        title: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO chat (limb, chat_type, title) VALUES (?1, ?2, ?3)
             ON CONFLICT(limb) DO UPDATE SET title = excluded.title",
            params![limb, chat_type, title],
        )?;
        Ok(())
    }

    pub fn get_chat(&self, limb: &str) -> Result<Option<ChatRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let chat = conn
            .query_row(
                "SELECT id, limb, chat_type, title FROM chat WHERE limb = ?1",
                params![limb],
                row_to_chat,
            )
            .optional()?;
        Ok(chat)
    }

    /// Number of chats whose title matches `query` (all chats when empty).
    pub fn chat_count(&self, query: &str) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = if query.is_empty() {
            conn.query_row("SELECT count(*) FROM chat", [], |row| row.get(0))?
        } else {
            conn.query_row(
                "SELECT count(*) FROM chat WHERE title LIKE ?1",
                params![format!("%{query}%")],
                |row| row.get(0),
            )?
        };
        Ok(count as usize)
    }

    /// One page of the chat registry, 1-based.
    pub fn chat_list(
        &self,
        page: usize,
        page_size: usize,
        query: &str,
    ) -> Result<Vec<ChatRow>, StoreError> {
        let offset = page_size * page.saturating_sub(1);
        let conn = self.conn.lock().unwrap();
        let mut rows = Vec::new();
        if query.is_empty() {
            let mut stmt =
                conn.prepare("SELECT id, limb, chat_type, title FROM chat LIMIT ?1, ?2")?;
            for chat in stmt.query_map(params![offset, page_size], row_to_chat)? {
                rows.push(chat?);
            }
        } else {
            let mut stmt = conn.prepare(
                "SELECT id, limb, chat_type, title FROM chat
                 WHERE title LIKE ?1 LIMIT ?2, ?3",
            )?;
            for chat in
                stmt.query_map(params![format!("%{query}%"), offset, page_size], row_to_chat)?
            {
                rows.push(chat?);
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_refreshes_title_only() {
        let store = Store::open_in_memory().unwrap();
        store
            .add_or_update_chat("qq;9;g7", "group", "Group G7")
            .unwrap();
        store
            .add_or_update_chat("qq;9;g7", "private", "Renamed")
            .unwrap();

        let chat = store.get_chat("qq;9;g7").unwrap().unwrap();
        assert_eq!(chat.title, "Renamed");
        assert_eq!(chat.chat_type, "group");
    }

    #[test]
    fn list_and_count_honor_query() {
        let store = Store::open_in_memory().unwrap();
        store.add_or_update_chat("qq;9;1", "group", "alpha").unwrap();
        store.add_or_update_chat("qq;9;2", "group", "beta").unwrap();
        store
            .add_or_update_chat("qq;9;3", "private", "alphabet")
            .unwrap();

        assert_eq!(store.chat_count("").unwrap(), 3);
        assert_eq!(store.chat_count("alpha").unwrap(), 2);

        let page = store.chat_list(1, 2, "").unwrap();
        assert_eq!(page.len(), 2);
        let rest = store.chat_list(2, 2, "").unwrap();
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn missing_chat_is_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_chat("qq;9;none").unwrap().is_none());
    }
}
