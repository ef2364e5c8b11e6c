use std::ffi::{c_int, c_void};
use std::path::{Path, PathBuf};

use chatvault_core::{ContactEntry, MessageKind};
use chatvault_storage::schema;
use rusqlite::{Connection, params};
use tempfile::TempDir;

const SQLITE_FCNTL_RESERVE_BYTES: c_int = 38;

/// One `MSG` row to seed a fixture shard with.
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub local_id: i64,
    pub server_id: i64,
    pub talker: String,
    pub kind: MessageKind,
    pub is_sender: bool,
    pub create_time: i64,
    pub sequence: i64,
    pub content: String,
    pub side_channel: Option<Vec<u8>>,
}

impl MessageRow {
    pub fn text(local_id: i64, talker: &str, create_time: i64, content: &str) -> Self {
        Self {
            local_id,
            server_id: 1_000 + local_id,
            talker: talker.to_string(),
            kind: MessageKind::Text,
            is_sender: false,
            create_time,
            sequence: create_time * 1_000,
            content: content.to_string(),
            side_channel: None,
        }
    }

    pub fn server_id(mut self, server_id: i64) -> Self {
        self.server_id = server_id;
        self
    }

    pub fn sequence(mut self, sequence: i64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn from_self(mut self) -> Self {
        self.is_sender = true;
        self
    }

    pub fn side_channel(mut self, blob: Vec<u8>) -> Self {
        self.side_channel = Some(blob);
        self
    }
}

pub fn insert_messages(conn: &Connection, rows: &[MessageRow]) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO MSG (localId, MsgSvrID, Type, SubType, IsSender, CreateTime, Sequence, Status, StrTalker, StrContent, BytesExtra)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 2, ?8, ?9, ?10)",
    )?;
    for row in rows {
        let (msg_type, sub_type) = row.kind.codes();
        stmt.execute(params![
            row.local_id,
            row.server_id,
            msg_type,
            sub_type,
            row.is_sender as i64,
            row.create_time,
            row.sequence,
            row.talker,
            row.content,
            row.side_channel,
        ])?;
    }
    Ok(())
}

pub fn insert_contact(conn: &Connection, contact: &ContactEntry) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO Contact (UserName, Remark, NickName, Alias) VALUES (?1, ?2, ?3, ?4)",
        params![contact.id, contact.remark, contact.nickname, contact.alias],
    )?;
    Ok(())
}

pub fn insert_room(conn: &Connection, room_id: &str, roster: Option<&[u8]>) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO ChatRoom (ChatRoomName, RoomData) VALUES (?1, ?2)",
        params![room_id, roster],
    )?;
    Ok(())
}

/// Create a new database whose pages keep `reserve` trailing bytes free, the
/// layout the vendor cipher stores its IV and tag in. Must run before any table
/// is created.
pub fn create_with_reserve(path: &Path, reserve: u8) -> Result<Connection, Box<dyn std::error::Error>> {
    let conn = Connection::open(path)?;
    let mut n: c_int = reserve as c_int;
    // SAFETY: `conn` owns an open handle for the whole call and nothing else
    // uses it concurrently. The schema name is a NUL-terminated static string.
    // SQLITE_FCNTL_RESERVE_BYTES reads and writes one `int` through the pointer,
    // and `n` is a live local `c_int`.
    let rc = unsafe {
        rusqlite::ffi::sqlite3_file_control(
            conn.handle(),
            c"main".as_ptr(),
            SQLITE_FCNTL_RESERVE_BYTES,
            &mut n as *mut c_int as *mut c_void,
        )
    };
    if rc != rusqlite::ffi::SQLITE_OK {
        return Err(format!("setting reserve bytes failed with code {rc}").into());
    }
    Ok(conn)
}

/// Reserve byte count recorded in a database file header.
pub fn header_reserve(path: &Path) -> std::io::Result<u8> {
    let bytes = std::fs::read(path)?;
    Ok(bytes.get(20).copied().unwrap_or(0))
}

/// A scratch directory of fixture databases, removed on drop.
pub struct TestVault {
    pub dir: TempDir,
}

impl TestVault {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Plain `MSG` shard, default page layout.
    pub fn message_shard(&self, name: &str, rows: &[MessageRow]) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = self.path(name);
        let conn = Connection::open(&path)?;
        schema::init_message_store(&conn)?;
        insert_messages(&conn, rows)?;
        Ok(path)
    }

    /// A database laid out for sealing, 48 reserve bytes per page, filled by `fill`.
    pub fn reserved(
        &self,
        name: &str,
        fill: impl FnOnce(&Connection) -> Result<(), Box<dyn std::error::Error>>,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = self.path(name);
        let conn = create_with_reserve(&path, 48)?;
        fill(&conn)?;
        drop(conn);
        let reserve = header_reserve(&path)?;
        if reserve != 48 {
            return Err(format!("fixture has {reserve} reserve bytes, wanted 48").into());
        }
        Ok(path)
    }

    pub fn reserved_message_shard(
        &self,
        name: &str,
        rows: &[MessageRow],
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        self.reserved(name, |conn| {
            schema::init_message_store(conn)?;
            insert_messages(conn, rows)?;
            Ok(())
        })
    }

    pub fn media_shard(&self, name: &str, entries: &[(&str, &[u8])]) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = self.path(name);
        let conn = Connection::open(&path)?;
        schema::init_media_store(&conn)?;
        for (key, buf) in entries {
            conn.execute(
                "INSERT INTO Media (Key, Reserved0, Buf) VALUES (?1, 0, ?2)",
                params![key, buf],
            )?;
        }
        Ok(path)
    }

    /// `MicroMsg.db`-style contact directory.
    pub fn directory(
        &self,
        name: &str,
        contacts: &[ContactEntry],
        rooms: &[(&str, Option<Vec<u8>>)],
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = self.path(name);
        let conn = Connection::open(&path)?;
        schema::init_directory(&conn)?;
        fill_directory(&conn, contacts, rooms)?;
        Ok(path)
    }

    /// A single-file archive holding messages, contacts and rooms together.
    pub fn logical_store(
        &self,
        name: &str,
        rows: &[MessageRow],
        contacts: &[ContactEntry],
        rooms: &[(&str, Option<Vec<u8>>)],
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = self.path(name);
        let conn = Connection::open(&path)?;
        schema::init_logical_store(&conn)?;
        insert_messages(&conn, rows)?;
        fill_directory(&conn, contacts, rooms)?;
        Ok(path)
    }
}

pub fn fill_directory(
    conn: &Connection,
    contacts: &[ContactEntry],
    rooms: &[(&str, Option<Vec<u8>>)],
) -> rusqlite::Result<()> {
    for contact in contacts {
        insert_contact(conn, contact)?;
    }
    for (room, roster) in rooms {
        insert_room(conn, room, roster.as_deref())?;
    }
    Ok(())
}

/// Count rows of `table` in the database at `path`.
pub fn row_count(path: &Path, table: &str) -> rusqlite::Result<i64> {
    let conn = Connection::open(path)?;
    conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))
}

/// `localId`s of `MSG`, ascending.
pub fn local_ids(path: &Path) -> rusqlite::Result<Vec<i64>> {
    let conn = Connection::open(path)?;
    let mut stmt = conn.prepare("SELECT localId FROM MSG ORDER BY localId")?;
    let ids = stmt.query_map([], |row| row.get(0))?.collect();
    ids
}
