use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};

use chatvault_core::{ContactEntry, MessageKind, MessageRecord, TimeWindow};

use crate::error::StorageError;
use crate::schema;
use crate::traits::{ChatRoomSummary, Directory, MessageStore};

/// Explicit handle on the logical database. Each export opens its own handle;
/// nothing is shared process-wide.
pub struct SqliteArchive {
    conn: Connection,
}

fn precondition(path: &Path, reason: impl Into<String>) -> StorageError {
    StorageError::Precondition {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn open_read_only(path: &Path) -> Result<Connection, StorageError> {
    if !path.is_file() {
        return Err(precondition(path, "file does not exist"));
    }
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    Connection::open_with_flags(path, flags).map_err(|e| precondition(path, e.to_string()))
}

impl SqliteArchive {
    /// Open a merged store read-only. It must already exist and hold the `MSG` table.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = open_read_only(path)?;
        match schema::table_exists(&conn, "MSG") {
            Ok(true) => Ok(Self { conn }),
            Ok(false) => Err(precondition(path, "no MSG table")),
            Err(e) => Err(precondition(path, e.to_string())),
        }
    }

    /// Open a merged message store with the contact directory attached from a
    /// separate file. Unqualified table names resolve across both.
    pub fn open_with_directory(path: &Path, directory: &Path) -> Result<Self, StorageError> {
        let archive = Self::open(path)?;
        if !directory.is_file() {
            return Err(precondition(directory, "file does not exist"));
        }
        archive
            .conn
            .execute(
                "ATTACH DATABASE ?1 AS directory",
                rusqlite::params![directory.to_string_lossy()],
            )
            .map_err(|e| precondition(directory, e.to_string()))?;
        Ok(archive)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        schema::init_logical_store(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Text columns occasionally hold blobs; read either without failing the row.
fn lossy_text(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
        ValueRef::Integer(n) => Some(n.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
    })
}

fn opt_blob(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<Vec<u8>>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Blob(bytes) | ValueRef::Text(bytes) => Some(bytes.to_vec()),
        _ => None,
    })
}

fn read_message(row: &rusqlite::Row) -> rusqlite::Result<MessageRecord> {
    let msg_type: Option<i64> = row.get(2)?;
    let sub_type: Option<i64> = row.get(3)?;
    let is_sender: Option<i64> = row.get(4)?;
    Ok(MessageRecord {
        local_id: row.get(0)?,
        talker: lossy_text(row, 1)?.unwrap_or_default(),
        kind: MessageKind::from_codes(msg_type.unwrap_or(0), sub_type.unwrap_or(0)),
        is_sender: is_sender.unwrap_or(0) != 0,
        create_time: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
        status: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
        content: lossy_text(row, 7)?,
        display_content: lossy_text(row, 8)?,
        compressed: opt_blob(row, 9)?,
        server_id: row.get::<_, Option<i64>>(10)?.unwrap_or(0),
        sequence: row.get::<_, Option<i64>>(11)?.unwrap_or(0),
        side_channel: opt_blob(row, 12)?,
    })
}

impl MessageStore for SqliteArchive {
    fn messages(
        &self,
        talker: &str,
        window: &TimeWindow,
    ) -> Result<Vec<MessageRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT localId, StrTalker, Type, SubType, IsSender, CreateTime, Status, StrContent, DisplayContent, CompressContent, MsgSvrID, Sequence, BytesExtra
             FROM MSG
             WHERE StrTalker = ?1
               AND (?2 IS NULL OR CreateTime >= ?2)
               AND (?3 IS NULL OR CreateTime <= ?3)
             ORDER BY CreateTime, Sequence, localId",
        )?;
        let messages = stmt
            .query_map(
                rusqlite::params![talker, window.start, window.end],
                read_message,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    fn message_count(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM MSG", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl Directory for SqliteArchive {
    fn is_chatroom(&self, room_id: &str) -> Result<bool, StorageError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM ChatRoom WHERE ChatRoomName = ?1)",
            rusqlite::params![room_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn roster_blob(&self, room_id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let blob = self
            .conn
            .query_row(
                "SELECT RoomData FROM ChatRoom WHERE ChatRoomName = ?1",
                rusqlite::params![room_id],
                |row| opt_blob(row, 0),
            )
            .optional()?;
        Ok(blob.flatten())
    }

    fn contact(&self, id: &str) -> Result<Option<ContactEntry>, StorageError> {
        let entry = self
            .conn
            .query_row(
                "SELECT UserName, Remark, NickName, Alias FROM Contact WHERE UserName = ?1",
                rusqlite::params![id],
                |row| {
                    Ok(ContactEntry {
                        id: lossy_text(row, 0)?.unwrap_or_default(),
                        remark: lossy_text(row, 1)?,
                        nickname: lossy_text(row, 2)?,
                        alias: lossy_text(row, 3)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    fn chatrooms(&self) -> Result<Vec<ChatRoomSummary>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.ChatRoomName, ct.Remark, ct.NickName
             FROM ChatRoom c
             LEFT JOIN Contact ct ON ct.UserName = c.ChatRoomName
             WHERE c.ChatRoomName IS NOT NULL
             ORDER BY c.ChatRoomName",
        )?;
        let rows = stmt.query_map([], |row| {
            let room_id = lossy_text(row, 0)?.unwrap_or_default();
            let label = [lossy_text(row, 1)?, lossy_text(row, 2)?]
                .into_iter()
                .flatten()
                .find(|s| !s.trim().is_empty())
                .unwrap_or_else(|| room_id.clone());
            Ok(ChatRoomSummary { room_id, label })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
