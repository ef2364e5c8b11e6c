use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{MergeError, StorageError};
use crate::schema::{self, MEDIA_SCHEMA_SQL, MESSAGE_SCHEMA_SQL};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Which family of shard files is being merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShardKind {
    Message,
    Media,
}

impl ShardKind {
    pub fn table(self) -> &'static str {
        match self {
            ShardKind::Message => "MSG",
            ShardKind::Media => "Media",
        }
    }

    /// File name stem of the family (`MSG0.db`, `MediaMSG3.db`, ...).
    pub fn stem(self) -> &'static str {
        match self {
            ShardKind::Message => "MSG",
            ShardKind::Media => "MediaMSG",
        }
    }

    fn schema_sql(self) -> &'static str {
        match self {
            ShardKind::Message => MESSAGE_SCHEMA_SQL,
            ShardKind::Media => MEDIA_SCHEMA_SQL,
        }
    }

    /// Integer primary key column aliasing the rowid, if the table has one.
    fn row_id_column(self) -> Option<&'static str> {
        match self {
            ShardKind::Message => Some("localId"),
            ShardKind::Media => None,
        }
    }

    /// Column whose larger value marks the authoritative copy of a row.
    fn marker_column(self) -> Option<&'static str> {
        match self {
            ShardKind::Message => Some("Sequence"),
            ShardKind::Media => None,
        }
    }

    fn indexes(self) -> &'static [(&'static str, &'static [&'static str])] {
        match self {
            ShardKind::Message => &[
                ("idx_msg_talker_time", &["StrTalker", "CreateTime"]),
                ("idx_msg_svr", &["MsgSvrID"]),
            ],
            ShardKind::Media => &[("idx_media_key", &["Key"])],
        }
    }
}

/// A source shard that could not be merged. Its partial writes were rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedShard {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Shards whose rows are present in the target, the base included.
    pub shards_merged: usize,
    pub skipped: Vec<SkippedShard>,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    /// Rows in the target table once the merge committed.
    pub total_rows: u64,
}

impl MergeReport {
    pub fn rows_merged(&self) -> u64 {
        self.inserted + self.updated
    }
}

#[derive(Debug, Default)]
struct ShardStats {
    inserted: u64,
    updated: u64,
    unchanged: u64,
}

/// Merge `shards` into `target`. `shards[0]` is the base: when the target does
/// not exist yet it is copied verbatim, otherwise it is merged like the rest.
/// The remaining shards are merged in the order given.
pub fn merge_shards(
    kind: ShardKind,
    shards: &[PathBuf],
    target: &Path,
) -> Result<MergeReport, MergeError> {
    let Some((base, rest)) = shards.split_first() else {
        return Err(MergeError::NoBase);
    };
    check_base(kind, base)?;

    let mut report = MergeReport::default();
    let copied = copy_base(base, target)?;
    let sources: Vec<&PathBuf> = if copied {
        report.shards_merged += 1;
        info!(base = %base.display(), target = %target.display(), "base shard copied");
        rest.iter().collect()
    } else {
        shards.iter().collect()
    };

    let mut conn = Connection::open(target)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let mut tx = conn.transaction_with_behavior(TransactionBehavior::Exclusive)?;

    if !schema::table_exists(&tx, kind.table())? {
        tx.execute_batch(kind.schema_sql())?;
    }
    let target_columns = schema::table_columns(&tx, kind.table())?;
    ensure_indexes(&tx, kind, &target_columns)?;

    for source in sources {
        if same_file(source, target) {
            debug!(path = %source.display(), "source is the target, skipping");
            continue;
        }
        let sp = tx.savepoint()?;
        match merge_one(&sp, kind, source, &target_columns) {
            Ok(stats) => {
                sp.commit()?;
                info!(
                    path = %source.display(),
                    inserted = stats.inserted,
                    updated = stats.updated,
                    unchanged = stats.unchanged,
                    "shard merged"
                );
                report.shards_merged += 1;
                report.inserted += stats.inserted;
                report.updated += stats.updated;
                report.unchanged += stats.unchanged;
            }
            Err(e) => {
                // dropping the savepoint rolls it back
                drop(sp);
                warn!(path = %source.display(), error = %e, "skipping unreadable shard");
                report.skipped.push(SkippedShard {
                    path: source.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    let total: i64 = tx.query_row(
        &format!("SELECT COUNT(*) FROM \"{}\"", kind.table()),
        [],
        |row| row.get(0),
    )?;
    tx.commit()?;
    report.total_rows = total as u64;

    info!(
        target = %target.display(),
        shards = report.shards_merged,
        skipped = report.skipped.len(),
        rows = report.total_rows,
        "merge complete"
    );
    Ok(report)
}

fn open_source(path: &Path) -> Result<Connection, rusqlite::Error> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

fn check_base(kind: ShardKind, base: &Path) -> Result<(), MergeError> {
    let unreadable = |reason: String| MergeError::BaseUnreadable {
        path: base.to_path_buf(),
        reason,
    };
    if !base.is_file() {
        return Err(unreadable("file does not exist".into()));
    }
    let conn = open_source(base).map_err(|e| unreadable(e.to_string()))?;
    match schema::table_exists(&conn, kind.table()) {
        Ok(true) => Ok(()),
        Ok(false) => Err(unreadable(format!("no {} table", kind.table()))),
        Err(e) => Err(unreadable(e.to_string())),
    }
}

/// Copy the base into place unless a target already exists. Returns whether it copied.
fn copy_base(base: &Path, target: &Path) -> Result<bool, MergeError> {
    if target.exists() {
        return Ok(false);
    }
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(dir)?;
    io::copy(&mut File::open(base)?, &mut staged)?;
    staged.as_file().sync_all()?;
    match staged.persist_noclobber(target) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(MergeError::Io(e.error)),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn quoted(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

fn ensure_indexes(
    conn: &Connection,
    kind: ShardKind,
    target_columns: &[String],
) -> Result<(), StorageError> {
    for (name, columns) in kind.indexes() {
        if !columns.iter().all(|c| target_columns.iter().any(|t| t == c)) {
            continue;
        }
        let list = columns
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS {name} ON \"{}\" ({list})",
            kind.table()
        ))?;
    }
    Ok(())
}

fn as_i64(value: &Value) -> i64 {
    match value {
        Value::Integer(n) => *n,
        Value::Real(f) => *f as i64,
        Value::Text(s) => s.trim().parse().unwrap_or(0),
        Value::Null | Value::Blob(_) => 0,
    }
}

/// Natural key of one incoming row, resolved against the target.
enum Existing {
    Absent,
    Present { rowid: i64, marker: i64 },
}

struct RowLayout {
    columns: Vec<String>,
    row_id: Option<usize>,
    marker: Option<usize>,
    server_id: Option<usize>,
    talker: Option<usize>,
    create_time: Option<usize>,
    msg_type: Option<usize>,
    is_sender: Option<usize>,
    content: Option<usize>,
    key: Option<usize>,
}

impl RowLayout {
    fn new(kind: ShardKind, columns: Vec<String>) -> Self {
        let find = |name: &str| columns.iter().position(|c| c == name);
        let row_id = kind.row_id_column().and_then(find);
        let marker = kind.marker_column().and_then(find);
        let server_id = find("MsgSvrID");
        let talker = find("StrTalker");
        let create_time = find("CreateTime");
        let msg_type = find("Type");
        let is_sender = find("IsSender");
        let content = find("StrContent");
        let key = find("Key");
        Self {
            columns,
            row_id,
            marker,
            server_id,
            talker,
            create_time,
            msg_type,
            is_sender,
            content,
            key,
        }
    }

    fn value<'v>(&self, column: Option<usize>, values: &'v [Value]) -> &'v Value {
        column.map_or(&Value::Null, |i| &values[i])
    }
}

fn lookup(
    conn: &Connection,
    kind: ShardKind,
    layout: &RowLayout,
    values: &[Value],
) -> Result<Existing, StorageError> {
    let table = kind.table();
    let marker_expr = match kind.marker_column() {
        Some(m) => format!("IFNULL(\"{m}\", 0)"),
        None => "0".to_string(),
    };
    let found: Option<(i64, i64)> = match kind {
        ShardKind::Message => {
            let server_id = layout.server_id.map_or(0, |i| as_i64(&values[i]));
            if server_id != 0 {
                conn.prepare_cached(&format!(
                    "SELECT rowid, {marker_expr} FROM \"{table}\" WHERE MsgSvrID = ?1 LIMIT 1"
                ))?
                .query_row([server_id], |row| Ok((row.get(0)?, row.get(1)?)))
                .optional()?
            } else {
                // Rows without a server id keep their localId unless it collided on
                // an earlier merge. Try the id first, then the row's content, which
                // still matches after the id was reassigned.
                let talker = layout.value(layout.talker, values);
                let create_time = layout.value(layout.create_time, values);
                let by_id = match layout.row_id.map(|i| &values[i]) {
                    Some(local_id) => conn
                        .prepare_cached(&format!(
                            "SELECT rowid, {marker_expr} FROM \"{table}\"
                             WHERE StrTalker IS ?1 AND localId = ?2 AND CreateTime IS ?3
                               AND IFNULL(MsgSvrID, 0) = 0
                             LIMIT 1"
                        ))?
                        .query_row(rusqlite::params![talker, local_id, create_time], |row| {
                            Ok((row.get(0)?, row.get(1)?))
                        })
                        .optional()?,
                    None => None,
                };
                match by_id {
                    Some(found) => Some(found),
                    None => conn
                        .prepare_cached(&format!(
                            "SELECT rowid, {marker_expr} FROM \"{table}\"
                             WHERE StrTalker IS ?1 AND CreateTime IS ?2 AND Type IS ?3
                               AND IsSender IS ?4 AND StrContent IS ?5
                               AND IFNULL(MsgSvrID, 0) = 0
                             LIMIT 1"
                        ))?
                        .query_row(
                            rusqlite::params![
                                talker,
                                create_time,
                                layout.value(layout.msg_type, values),
                                layout.value(layout.is_sender, values),
                                layout.value(layout.content, values),
                            ],
                            |row| Ok((row.get(0)?, row.get(1)?)),
                        )
                        .optional()?,
                }
            }
        }
        ShardKind::Media => {
            let key = layout.value(layout.key, values);
            conn.prepare_cached(&format!(
                "SELECT rowid, {marker_expr} FROM \"{table}\" WHERE Key IS ?1 LIMIT 1"
            ))?
            .query_row([key], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?
        }
    };
    Ok(match found {
        Some((rowid, marker)) => Existing::Present { rowid, marker },
        None => Existing::Absent,
    })
}

fn row_id_taken(conn: &Connection, kind: ShardKind, value: &Value) -> Result<bool, StorageError> {
    let Some(column) = kind.row_id_column() else {
        return Ok(false);
    };
    let taken: bool = conn
        .prepare_cached(&format!(
            "SELECT EXISTS(SELECT 1 FROM \"{}\" WHERE \"{column}\" = ?1)",
            kind.table()
        ))?
        .query_row([value], |row| row.get(0))?;
    Ok(taken)
}

fn merge_one(
    conn: &Connection,
    kind: ShardKind,
    source: &Path,
    target_columns: &[String],
) -> Result<ShardStats, StorageError> {
    let src = open_source(source)?;
    if !schema::table_exists(&src, kind.table())? {
        return Err(StorageError::Schema(format!(
            "{} has no {} table",
            source.display(),
            kind.table()
        )));
    }
    let shared: Vec<String> = schema::table_columns(&src, kind.table())?
        .into_iter()
        .filter(|c| target_columns.contains(c))
        .collect();
    if shared.is_empty() {
        return Err(StorageError::Schema(format!(
            "{} shares no columns with the target",
            source.display()
        )));
    }
    let layout = RowLayout::new(kind, shared);
    let column_list = quoted(&layout.columns);
    let placeholders = vec!["?"; layout.columns.len()].join(", ");
    let insert_sql = format!(
        "INSERT INTO \"{}\" ({column_list}) VALUES ({placeholders})",
        kind.table()
    );
    let update_sql = {
        let assignments = layout
            .columns
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != layout.row_id)
            .map(|(i, c)| format!("\"{c}\" = ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "UPDATE \"{}\" SET {assignments} WHERE rowid = ?{}",
            kind.table(),
            layout.columns.len() + 1
        )
    };

    let mut stats = ShardStats::default();
    let mut stmt = src.prepare(&format!("SELECT {column_list} FROM \"{}\"", kind.table()))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut values = (0..layout.columns.len())
            .map(|i| row.get::<_, Value>(i))
            .collect::<Result<Vec<_>, _>>()?;

        match lookup(conn, kind, &layout, &values)? {
            Existing::Present { rowid, marker } => {
                let incoming = layout.marker.map_or(0, |i| as_i64(&values[i]));
                if layout.marker.is_some() && incoming > marker {
                    let mut params = values;
                    params.push(Value::Integer(rowid));
                    conn.prepare_cached(&update_sql)?
                        .execute(rusqlite::params_from_iter(params.iter()))?;
                    stats.updated += 1;
                } else {
                    stats.unchanged += 1;
                }
            }
            Existing::Absent => {
                if let Some(i) = layout.row_id {
                    if row_id_taken(conn, kind, &values[i])? {
                        values[i] = Value::Null;
                    }
                }
                conn.prepare_cached(&insert_sql)?
                    .execute(rusqlite::params_from_iter(values.iter()))?;
                stats.inserted += 1;
            }
        }
    }
    Ok(stats)
}
