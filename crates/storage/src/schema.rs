use rusqlite::Connection;

use crate::error::StorageError;

/// Tables of one message shard (`MSG{n}.db`).
pub const MESSAGE_SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS MSG (
    localId INTEGER PRIMARY KEY AUTOINCREMENT,
    TalkerId INT DEFAULT 0,
    MsgSvrID INT,
    Type INT,
    SubType INT,
    IsSender INT,
    CreateTime INT,
    Sequence INT DEFAULT 0,
    StatusEx INT DEFAULT 0,
    FlagEx INT,
    Status INT,
    MsgServerSeq INT,
    MsgSequence INT,
    StrTalker TEXT,
    StrContent TEXT,
    DisplayContent TEXT,
    Reserved0 INT DEFAULT 0,
    Reserved1 INT DEFAULT 0,
    Reserved2 INT DEFAULT 0,
    Reserved3 INT DEFAULT 0,
    Reserved4 TEXT,
    Reserved5 TEXT,
    Reserved6 TEXT,
    CompressContent BLOB,
    BytesExtra BLOB,
    BytesTrans BLOB
);
";

/// Tables of one media shard (`MediaMSG{n}.db`).
pub const MEDIA_SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS Media (
    Key TEXT,
    Reserved0 INT,
    Buf BLOB,
    Reserved1 INT,
    Reserved2 TEXT
);
";

/// Contact directory and room rosters (`MicroMsg.db`).
pub const DIRECTORY_SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS Contact (
    UserName TEXT PRIMARY KEY,
    Alias TEXT,
    EncryptUserName TEXT,
    DelFlag INTEGER DEFAULT 0,
    Type INTEGER DEFAULT 0,
    VerifyFlag INTEGER DEFAULT 0,
    Remark TEXT,
    NickName TEXT,
    LabelIDList TEXT,
    ChatRoomType INT,
    ExtraBuf BLOB
);

CREATE TABLE IF NOT EXISTS ChatRoom (
    ChatRoomName TEXT PRIMARY KEY,
    UserNameList TEXT,
    DisplayNameList TEXT,
    ChatRoomFlag INT DEFAULT 0,
    Owner INTEGER DEFAULT 0,
    IsShowName INTEGER DEFAULT 0,
    SelfDisplayName TEXT,
    RoomData BLOB
);
";

pub fn init_message_store(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(MESSAGE_SCHEMA_SQL)?;
    Ok(())
}

pub fn init_media_store(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(MEDIA_SCHEMA_SQL)?;
    Ok(())
}

pub fn init_directory(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(DIRECTORY_SCHEMA_SQL)?;
    Ok(())
}

/// Message, roster and contact tables in one file.
pub fn init_logical_store(conn: &Connection) -> Result<(), StorageError> {
    init_message_store(conn)?;
    init_directory(conn)
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, StorageError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        rusqlite::params![table],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Column names of `table` in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}
