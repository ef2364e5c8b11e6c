use std::path::{Path, PathBuf};

use chatvault_codec::{CipherParams, DecryptError, DecryptReport, DecryptionKey, decrypt_with};
use chatvault_core::VaultConfig;
use chatvault_storage::{MergeError, ShardKind, merge_shards};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::shards::{DecryptTask, discover_shards, shard_family};
use crate::summary::RunSummary;

/// Result of one decryption task.
#[derive(Debug)]
pub struct ShardOutcome {
    pub input: PathBuf,
    pub output: PathBuf,
    pub result: Result<DecryptReport, DecryptError>,
}

/// Decrypt every task into `out_dir` in parallel. Each worker owns its own
/// input and output file, so output names must be distinct, as
/// [`discover_shards`] guarantees. One shard failing never affects the others.
pub fn decrypt_all(
    key: &DecryptionKey,
    tasks: &[DecryptTask],
    out_dir: &Path,
    params: &CipherParams,
) -> Vec<ShardOutcome> {
    tasks
        .par_iter()
        .map(|task| {
            let output = out_dir.join(&task.output_name);
            let result = decrypt_with(key, &task.input, &output, params);
            if let Err(e) = &result {
                warn!(path = %task.input.display(), error = %e, "shard not decrypted");
            }
            ShardOutcome {
                input: task.input.clone(),
                output,
                result,
            }
        })
        .collect()
}

/// Paths of the merged stores inside the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredArchive {
    pub messages: PathBuf,
    pub media: Option<PathBuf>,
    /// `MicroMsg.db`, holding contacts and rooms, when it was decrypted.
    pub directory: Option<PathBuf>,
}

pub const DIRECTORY_FILE: &str = "MicroMsg.db";

/// Decrypt everything under `input_dir` into `out_dir`, then merge the message
/// and media families into `MSG.db` and `MediaMSG.db`.
///
/// Fails only when no message base (`MSG0.db`) could be produced. A missing
/// media family is not an error.
pub fn recover(
    key: &DecryptionKey,
    input_dir: &Path,
    out_dir: &Path,
    config: &VaultConfig,
) -> Result<(RecoveredArchive, RunSummary), EngineError> {
    let params = CipherParams::from_config(config);
    params.validate()?;
    std::fs::create_dir_all(out_dir)?;

    let tasks = discover_shards(input_dir);
    info!(dir = %input_dir.display(), shards = tasks.len(), "decrypting shards");

    let mut summary = RunSummary::default();
    for outcome in decrypt_all(key, &tasks, out_dir, &params) {
        match outcome.result {
            Ok(report) => summary.record_decrypt(&report),
            Err(e) => summary.record_failure(outcome.input, e.to_string()),
        }
    }

    let messages = merge_family(ShardKind::Message, out_dir, config, &mut summary)?
        .ok_or(MergeError::NoBase)?;
    let media = merge_family(ShardKind::Media, out_dir, config, &mut summary)?;

    let directory = out_dir.join(DIRECTORY_FILE);
    let archive = RecoveredArchive {
        messages,
        media,
        directory: directory.is_file().then_some(directory),
    };
    info!(summary = %summary, "recovery finished");
    Ok((archive, summary))
}

/// Merge `stem0.db ..` into `stem.db`. `None` when the family has no base shard.
fn merge_family(
    kind: ShardKind,
    out_dir: &Path,
    config: &VaultConfig,
    summary: &mut RunSummary,
) -> Result<Option<PathBuf>, EngineError> {
    let family = shard_family(out_dir, kind.stem(), config.max_shard_ordinal);
    let base = out_dir.join(format!("{}0.db", kind.stem()));
    if family.first() != Some(&base) {
        warn!(stem = kind.stem(), "no base shard, family not merged");
        return Ok(None);
    }
    let target = out_dir.join(format!("{}.db", kind.stem()));
    let report = merge_shards(kind, &family, &target)?;
    summary.record_merge(kind, report);
    Ok(Some(target))
}
