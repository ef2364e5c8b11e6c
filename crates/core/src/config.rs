use std::path::Path;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::message::{KindFilter, MessageKind};
use crate::time_window::Zone;

/// Run-wide tunables. Every field has a default, so a config file may set any subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub page_size: usize,
    pub reserve_size: usize,
    pub kdf_iterations: u32,
    /// Highest shard ordinal probed when collecting `MSG{n}.db` style families.
    pub max_shard_ordinal: u32,
    pub self_label: String,
    pub unknown_sender_label: String,
    /// Empty means every kind is exported.
    pub export_kinds: Vec<MessageKind>,
    /// Offset used to read date bounds. `None` reads them in the local zone.
    pub utc_offset_seconds: Option<i32>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            reserve_size: 48,
            kdf_iterations: 64_000,
            max_shard_ordinal: 50,
            self_label: "Me".into(),
            unknown_sender_label: "Unknown sender".into(),
            export_kinds: vec![MessageKind::Text, MessageKind::System],
            utc_offset_seconds: None,
        }
    }
}

impl VaultConfig {
    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        serde_json::from_str(json).map_err(|e| CoreError::Config(e.to_string()))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn zone(&self) -> Result<Zone, CoreError> {
        match self.utc_offset_seconds {
            None => Ok(Zone::Local),
            Some(secs) => FixedOffset::east_opt(secs)
                .map(Zone::Fixed)
                .ok_or_else(|| CoreError::Config(format!("utc offset out of range: {secs}"))),
        }
    }

    pub fn kind_filter(&self) -> KindFilter {
        if self.export_kinds.is_empty() {
            KindFilter::All
        } else {
            KindFilter::only(self.export_kinds.iter().copied())
        }
    }
}
