use hydra_core::types::ReplyInfo;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::Store;
use crate::error::StoreError;

/// One persisted cross-system message identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub id: i64,
    pub master_limb: String,
    pub master_msg_id: String,
    pub master_msg_thread_id: String,
    pub slave_limb: String,
    pub slave_msg_id: String,
    pub slave_sender: String,
    pub content: String,
    pub timestamp: i64,
}

/// Row to append; ids are assigned by the database.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub master_limb: String,
    pub master_msg_id: String,
    pub master_msg_thread_id: String,
    pub slave_limb: String,
    pub slave_msg_id: String,
    pub slave_sender: String,
    pub content: String,
    /// Vendor-reported timestamp, stored verbatim.
    pub timestamp: i64,
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        master_limb: row.get(1)?,
        master_msg_id: row.get(2)?,
        master_msg_thread_id: row.get(3)?,
        slave_limb: row.get(4)?,
        slave_msg_id: row.get(5)?,
        slave_sender: row.get(6)?,
        content: row.get(7)?,
        timestamp: row.get(8)?,
    })
}

const MESSAGE_SELECT: &str = "SELECT id, master_limb, master_msg_id, master_msg_thread_id,
    slave_limb, slave_msg_id, slave_sender, content, timestamp FROM message";

impl Store {
    pub fn add_message(&self, message: &NewMessage) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO message
             (master_limb, master_msg_id, master_msg_thread_id, slave_limb,
              slave_msg_id, slave_sender, content, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                message.master_limb,
                message.master_msg_id,
                message.master_msg_thread_id,
                message.slave_limb,
                message.slave_msg_id,
                message.slave_sender,
                message.content,
                message.timestamp,
            ],
        )?;
        Ok(())
    }

    pub fn message_by_master(
        &self,
        master_limb: &str,
        master_msg_id: &str,
    ) -> Result<Option<MessageRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let message = conn
            .query_row(
                &format!("{MESSAGE_SELECT} WHERE master_limb = ?1 AND master_msg_id = ?2"),
                params![master_limb, master_msg_id],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    /// Resolve a slave-side reply handle to the master messages it may
    /// quote. With a zero timestamp only an exact slave id matches;
    /// otherwise the timestamp must match and the stored slave id must
    /// start with the handle's id.
    pub fn messages_by_slave_reply(
        &self,
        slave_limb: &str,
        reply: &ReplyInfo,
    ) -> Result<Vec<MessageRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut messages = Vec::new();
        if reply.timestamp == 0 {
            let mut stmt = conn
                .prepare(&format!("{MESSAGE_SELECT} WHERE slave_limb = ?1 AND slave_msg_id = ?2"))?;
            for message in stmt.query_map(params![slave_limb, reply.id], row_to_message)? {
                messages.push(message?);
            }
        } else {
            let mut stmt = conn.prepare(&format!(
                "{MESSAGE_SELECT} WHERE slave_limb = ?1 AND timestamp = ?2 AND slave_msg_id LIKE ?3"
            ))?;
            for message in stmt.query_map(
                params![slave_limb, reply.timestamp, format!("{}%", reply.id)],
                row_to_message,
            )? {
                messages.push(message?);
            }
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(master_msg_id: &str, slave_msg_id: &str, timestamp: i64) -> NewMessage {
        NewMessage {
            master_limb: "telegram;42;-100123".into(),
            master_msg_id: master_msg_id.into(),
            master_msg_thread_id: "0".into(),
            slave_limb: "qq;9999;g7".into(),
            slave_msg_id: slave_msg_id.into(),
            slave_sender: "7".into(),
            content: "hello".into(),
            timestamp,
        }
    }

    #[test]
    fn master_lookup_round_trips() {
        let store = Store::open_in_memory().unwrap();
        store.add_message(&sample("100", "555", 1_700_000_000)).unwrap();

        let row = store
            .message_by_master("telegram;42;-100123", "100")
            .unwrap()
            .unwrap();
        assert_eq!(row.slave_msg_id, "555");
        assert_eq!(row.timestamp, 1_700_000_000);

        assert!(store
            .message_by_master("telegram;42;-100123", "101")
            .unwrap()
            .is_none());
    }

    #[test]
    fn one_row_per_master_message() {
        let store = Store::open_in_memory().unwrap();
        store.add_message(&sample("100", "555", 1)).unwrap();
        assert!(store.add_message(&sample("100", "556", 2)).is_err());
    }

    #[test]
    fn zero_timestamp_reply_matches_exact_id() {
        let store = Store::open_in_memory().unwrap();
        store.add_message(&sample("100", "555", 1_700_000_000)).unwrap();
        store.add_message(&sample("101", "5550", 1_700_000_000)).unwrap();

        let reply = ReplyInfo {
            id: "555".into(),
            timestamp: 0,
            ..Default::default()
        };
        let rows = store.messages_by_slave_reply("qq;9999;g7", &reply).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].master_msg_id, "100");
    }

    #[test]
    fn timestamped_reply_matches_by_prefix() {
        let store = Store::open_in_memory().unwrap();
        store.add_message(&sample("100", "555-abc", 1_700_000_000)).unwrap();
        store.add_message(&sample("101", "555-abc", 1_700_000_999)).unwrap();

        let reply = ReplyInfo {
            id: "555".into(),
            timestamp: 1_700_000_000,
            ..Default::default()
        };
        let rows = store.messages_by_slave_reply("qq;9999;g7", &reply).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].master_msg_id, "100");
    }

    #[test]
    fn reply_from_other_chat_does_not_match() {
        let store = Store::open_in_memory().unwrap();
        store.add_message(&sample("100", "555", 0)).unwrap();

        let reply = ReplyInfo {
            id: "555".into(),
            timestamp: 0,
            ..Default::default()
        };
        let rows = store.messages_by_slave_reply("qq;9999;g8", &reply).unwrap();
        assert!(rows.is_empty());
    }
}
