use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chatvault_codec::DecryptReport;
use chatvault_core::IdentitySource;
use chatvault_storage::{MergeReport, ShardKind};

use crate::export::ExportOutcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedShard {
    pub path: PathBuf,
    pub reason: String,
}

/// Everything one run did, aggregated for the user.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub shards_decrypted: usize,
    pub shards_failed: Vec<FailedShard>,
    pub pages_failed: u64,
    pub merges: BTreeMap<&'static str, MergeReport>,
    pub messages_exported: usize,
    pub fallbacks: BTreeMap<IdentitySource, usize>,
}

impl RunSummary {
    pub fn record_decrypt(&mut self, report: &DecryptReport) {
        self.shards_decrypted += 1;
        self.pages_failed += report.failed_pages.len() as u64;
    }

    pub fn record_failure(&mut self, path: PathBuf, reason: impl Into<String>) {
        self.shards_failed.push(FailedShard {
            path,
            reason: reason.into(),
        });
    }

    pub fn record_merge(&mut self, kind: ShardKind, report: MergeReport) {
        self.merges.insert(kind.stem(), report);
    }

    pub fn record_export(&mut self, outcome: &ExportOutcome) {
        self.messages_exported += outcome.records;
        for (source, count) in &outcome.fallbacks {
            *self.fallbacks.entry(*source).or_insert(0) += count;
        }
    }

    pub fn rows_merged(&self) -> u64 {
        self.merges.values().map(MergeReport::rows_merged).sum()
    }

    pub fn shards_skipped(&self) -> usize {
        self.merges.values().map(|m| m.skipped.len()).sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "shards decrypted: {}, failed: {}, pages failed: {}",
            self.shards_decrypted,
            self.shards_failed.len(),
            self.pages_failed
        )?;
        for failed in &self.shards_failed {
            writeln!(f, "  failed {}: {}", failed.path.display(), failed.reason)?;
        }
        for (stem, merge) in &self.merges {
            writeln!(
                f,
                "{stem}: {} shards merged, {} skipped, {} rows merged, {} rows total",
                merge.shards_merged,
                merge.skipped.len(),
                merge.rows_merged(),
                merge.total_rows
            )?;
        }
        write!(f, "messages exported: {}", self.messages_exported)?;
        if !self.fallbacks.is_empty() {
            let tiers = self
                .fallbacks
                .iter()
                .map(|(source, count)| format!("{source}={count}"))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " ({tiers})")?;
        }
        Ok(())
    }
}
