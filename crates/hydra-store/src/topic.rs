use rusqlite::{params, OptionalExtension, Row};

use crate::db::Store;
use crate::error::StoreError;

/// Forum-topic mapping inside an archive supergroup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRow {
    pub id: i64,
    pub master_limb: String,
    pub slave_limb: String,
    pub topic_id: i64,
}

fn row_to_topic(row: &Row<'_>) -> rusqlite::Result<TopicRow> {
    Ok(TopicRow {
        id: row.get(0)?,
        master_limb: row.get(1)?,
        slave_limb: row.get(2)?,
        topic_id: row.get(3)?,
    })
}

impl Store {
    pub fn get_topic(
        &self,
        master_limb: &str,
        slave_limb: &str,
    ) -> Result<Option<TopicRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let topic = conn
            .query_row(
                "SELECT id, master_limb, slave_limb, topic_id FROM topic
                 WHERE master_limb = ?1 AND slave_limb = ?2",
                params![master_limb, slave_limb],
                row_to_topic,
            )
            .optional()?;
        Ok(topic)
    }

    /// Reverse lookup: which slave chat does a forum thread belong to.
    pub fn topic_by_master(
        &self,
        master_limb: &str,
        topic_id: i64,
    ) -> Result<Option<TopicRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let topic = conn
            .query_row(
                "SELECT id, master_limb, slave_limb, topic_id FROM topic
                 WHERE master_limb = ?1 AND topic_id = ?2",
                params![master_limb, topic_id],
                row_to_topic,
            )
            .optional()?;
        Ok(topic)
    }

    pub fn add_topic(
        &self,
        master_limb: &str,
        slave_limb: &str,
        topic_id: i64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO topic (master_limb, slave_limb, topic_id) VALUES (?1, ?2, ?3)",
            params![master_limb, slave_limb, topic_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_lookup_both_directions() {
        let store = Store::open_in_memory().unwrap();
        store
            .add_topic("telegram;42;-100555", "qq;9999;g7", 9)
            .unwrap();

        let topic = store
            .get_topic("telegram;42;-100555", "qq;9999;g7")
            .unwrap()
            .unwrap();
        assert_eq!(topic.topic_id, 9);

        let back = store
            .topic_by_master("telegram;42;-100555", 9)
            .unwrap()
            .unwrap();
        assert_eq!(back.slave_limb, "qq;9999;g7");

        assert!(store
            .topic_by_master("telegram;42;-100555", 10)
            .unwrap()
            .is_none());
    }

    #[test]
    fn topic_pair_is_unique() {
        let store = Store::open_in_memory().unwrap();
        store.add_topic("telegram;42;-1", "qq;9;g7", 3).unwrap();
        assert!(store.add_topic("telegram;42;-1", "qq;9;g7", 4).is_err());
    }
}
