pub mod error;
pub mod export;
pub mod recover;
pub mod render;
pub mod resolver;
pub mod shards;
pub mod summary;

pub use error::{EngineError, ExportError};
pub use export::{ExportOutcome, ExportPipeline, ExportRequest};
pub use recover::{DIRECTORY_FILE, RecoveredArchive, ShardOutcome, decrypt_all, recover};
pub use render::{ConversationHeader, PlainTextRenderer, Renderer};
pub use resolver::SenderResolver;
pub use shards::{DecryptTask, discover_shards, shard_family};
pub use summary::{FailedShard, RunSummary};
