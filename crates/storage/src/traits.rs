use chatvault_core::{ContactEntry, MessageRecord, TimeWindow};

use crate::error::StorageError;

/// A group conversation as listed for selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRoomSummary {
    pub room_id: String,
    pub label: String,
}

/// Read access to the merged message store.
pub trait MessageStore {
    /// Messages of one conversation inside `window`, oldest first.
    fn messages(
        &self,
        talker: &str,
        window: &TimeWindow,
    ) -> Result<Vec<MessageRecord>, StorageError>;

    fn message_count(&self) -> Result<u64, StorageError>;
}

/// Roster and contact lookups used to name message authors.
pub trait Directory {
    fn is_chatroom(&self, room_id: &str) -> Result<bool, StorageError>;

    /// Raw roster blob of a room; `None` when the room or its blob is absent.
    fn roster_blob(&self, room_id: &str) -> Result<Option<Vec<u8>>, StorageError>;

    fn contact(&self, id: &str) -> Result<Option<ContactEntry>, StorageError>;

    fn chatrooms(&self) -> Result<Vec<ChatRoomSummary>, StorageError>;
}
