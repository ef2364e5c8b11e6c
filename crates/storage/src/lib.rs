pub mod error;
pub mod merge;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use error::{MergeError, StorageError};
pub use merge::{MergeReport, ShardKind, SkippedShard, merge_shards};
pub use sqlite::SqliteArchive;
pub use traits::*;
