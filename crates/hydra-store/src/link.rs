use rusqlite::{params, Row};

use crate::db::Store;
use crate::error::StoreError;

/// A bound master↔slave route. `title` is joined in from the chat registry
/// for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRow {
    pub id: i64,
    pub master_limb: String,
    pub slave_limb: String,
    pub title: String,
}

fn row_to_link(row: &Row<'_>) -> rusqlite::Result<LinkRow> {
    Ok(LinkRow {
        id: row.get(0)?,
        master_limb: row.get(1)?,
        slave_limb: row.get(2)?,
        title: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
    })
}

const LINK_SELECT: &str = "SELECT l.id, l.master_limb, l.slave_limb, c.title
    FROM link AS l LEFT JOIN chat AS c ON l.slave_limb = c.limb";

impl Store {
    pub fn link_list(&self) -> Result<Vec<LinkRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(LINK_SELECT)?;
        let mut links = Vec::new();
        for link in stmt.query_map([], row_to_link)? {
            links.push(link?);
        }
        Ok(links)
    }

    pub fn links_by_master(&self, master_limb: &str) -> Result<Vec<LinkRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("{LINK_SELECT} WHERE l.master_limb = ?1"))?;
        let mut links = Vec::new();
        for link in stmt.query_map(params![master_limb], row_to_link)? {
            links.push(link?);
        }
        Ok(links)
    }

    pub fn links_by_slave(&self, slave_limb: &str) -> Result<Vec<LinkRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("{LINK_SELECT} WHERE l.slave_limb = ?1"))?;
        let mut links = Vec::new();
        for link in stmt.query_map(params![slave_limb], row_to_link)? {
            links.push(link?);
        }
        Ok(links)
    }

    pub fn add_link(&self, master_limb: &str, slave_limb: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO link (master_limb, slave_limb) VALUES (?1, ?2)",
            params![master_limb, slave_limb],
        )?;
        Ok(())
    }

    pub fn delete_link(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM link WHERE id = ?1", params![id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_join_chat_titles() {
        let store = Store::open_in_memory().unwrap();
        store
            .add_or_update_chat("qq;9;g7", "group", "Group G7")
            .unwrap();
        store.add_link("telegram;42;-100123", "qq;9;g7").unwrap();
        store.add_link("telegram;42;-100123", "qq;9;g8").unwrap();

        let links = store.links_by_master("telegram;42;-100123").unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].title, "Group G7");
        assert_eq!(links[1].title, ""); // no chat row for g8

        let back = store.links_by_slave("qq;9;g7").unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].master_limb, "telegram;42;-100123");
    }

    #[test]
    fn duplicate_link_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        store.add_link("telegram;42;-1", "qq;9;g7").unwrap();
        assert!(store.add_link("telegram;42;-1", "qq;9;g7").is_err());
    }

    #[test]
    fn delete_removes_binding() {
        let store = Store::open_in_memory().unwrap();
        store.add_link("telegram;42;-1", "qq;9;g7").unwrap();
        let links = store.link_list().unwrap();
        store.delete_link(links[0].id).unwrap();
        assert!(store.link_list().unwrap().is_empty());
    }
}
