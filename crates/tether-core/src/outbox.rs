//! Durable outbox.
//!
//! Every outgoing message is persisted here before any network attempt and
//! removed only when the server acknowledges its `sender_message_id`
//! (success or idempotent-duplicate). A crash between enqueue and ack means
//! redelivery on the next session, never loss.

use crate::storage::{Storage, StorageError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tether_protocol::Subject;
use tracing::{debug, warn};

/// A not-yet-acknowledged outgoing message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    pub subject: Subject,
    pub message: serde_json::Value,
    pub sender_message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Durable queue of outgoing messages, one list per namespace.
pub struct Outbox {
    storage: Arc<dyn Storage>,
    key: String,
}

impl Outbox {
    /// Create an outbox over `storage` scoped to `namespace`.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, namespace: &str) -> Self {
        Self {
            storage,
            key: format!("{namespace}:outbox"),
        }
    }

    /// Append an entry and persist before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be persisted; callers must not
    /// attempt network delivery in that case.
    pub fn enqueue(&self, entry: OutboxEntry) -> Result<(), StorageError> {
        let mut entries = self.pending()?;
        debug!(
            subject = %entry.subject.name,
            sender_message_id = %entry.sender_message_id,
            "Outbox enqueue"
        );
        entries.push(entry);
        self.persist(&entries)
    }

    /// Remove the entry matching `sender_message_id` and persist.
    ///
    /// Returns `true` if an entry was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the updated list cannot be persisted.
    pub fn ack(&self, sender_message_id: &str) -> Result<bool, StorageError> {
        let mut entries = self.pending()?;
        let before = entries.len();
        entries.retain(|entry| entry.sender_message_id != sender_message_id);
        if entries.len() == before {
            return Ok(false);
        }
        debug!(sender_message_id, "Outbox ack");
        self.persist(&entries)?;
        Ok(true)
    }

    /// All persisted entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read. A corrupt list
    /// is logged and treated as empty rather than wedging the session.
    pub fn pending(&self) -> Result<Vec<OutboxEntry>, StorageError> {
        match self.storage.get(&self.key)? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => Ok(entries),
                Err(e) => {
                    warn!(error = %e, "Corrupt outbox list; discarding");
                    Ok(Vec::new())
                }
            },
            None => Ok(Vec::new()),
        }
    }

    fn persist(&self, entries: &[OutboxEntry]) -> Result<(), StorageError> {
        if entries.is_empty() {
            self.storage.remove(&self.key)
        } else {
            let raw = serde_json::to_string(entries)?;
            self.storage.set(&self.key, &raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    fn entry(id: &str) -> OutboxEntry {
        OutboxEntry {
            subject: "chat".into(),
            message: json!("hello"),
            sender_message_id: id.to_string(),
            key: None,
        }
    }

    #[test]
    fn test_enqueue_then_ack() {
        let storage = Arc::new(MemoryStorage::new());
        let outbox = Outbox::new(storage, "ns");

        outbox.enqueue(entry("u-1")).unwrap();
        outbox.enqueue(entry("u-2")).unwrap();
        assert_eq!(outbox.pending().unwrap().len(), 2);

        assert!(outbox.ack("u-1").unwrap());
        let pending = outbox.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].sender_message_id, "u-2");

        // Ack of an unknown id is a no-op
        assert!(!outbox.ack("u-9").unwrap());
    }

    #[test]
    fn test_pending_survives_new_outbox_same_namespace() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        Outbox::new(Arc::clone(&storage), "ns")
            .enqueue(entry("u-1"))
            .unwrap();

        // Simulates a restart: fresh outbox over the same storage namespace
        let replayed = Outbox::new(storage, "ns").pending().unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].sender_message_id, "u-1");
    }

    #[test]
    fn test_namespaces_isolated() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        Outbox::new(Arc::clone(&storage), "a")
            .enqueue(entry("u-1"))
            .unwrap();
        assert!(Outbox::new(storage, "b").pending().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_list_treated_as_empty() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        storage.set("ns:outbox", "not json").unwrap();
        assert!(Outbox::new(storage, "ns").pending().unwrap().is_empty());
    }
}
