use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

const SKIPPED_FILES: &[&str] = &["xInfo.db"];
const SIDECAR_MARKER: &str = ".db_SQLITE";

/// One encrypted file to decrypt and the plaintext file name it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptTask {
    pub input: PathBuf,
    pub output_name: String,
}

/// Walk `dir` for encrypted databases.
///
/// `*.db` files map to themselves and `name.db_SQLITE*` files map to `name.db`.
/// Output names are flat and unique: entries are visited in file name order and
/// the first file claiming a name keeps it, later ones are left out.
pub fn discover_shards(dir: &Path) -> Vec<DecryptTask> {
    let mut tasks = Vec::new();
    let mut claimed = HashSet::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if let Some(output_name) = output_name(name) {
            if !claimed.insert(output_name.clone()) {
                warn!(
                    path = %entry.path().display(),
                    output = %output_name,
                    "another shard already produces this file, skipping"
                );
                continue;
            }
            tasks.push(DecryptTask {
                input: entry.path().to_path_buf(),
                output_name,
            });
        }
    }
    tasks
}

fn output_name(file: &str) -> Option<String> {
    if SKIPPED_FILES.contains(&file) {
        return None;
    }
    if file.ends_with(".db") {
        return Some(file.to_string());
    }
    let (stem, _) = file.split_once(SIDECAR_MARKER)?;
    if stem.is_empty() || stem.contains('.') {
        return None;
    }
    Some(format!("{stem}.db"))
}

/// Ordinal of `file` within the `stem{n}.db` family.
fn ordinal(file: &str, stem: &str) -> Option<u32> {
    let digits = file.strip_prefix(stem)?.strip_suffix(".db")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Existing `stem0.db ..= stem{max_ordinal}.db` files directly under `dir`,
/// ascending by ordinal.
pub fn shard_family(dir: &Path, stem: &str, max_ordinal: u32) -> Vec<PathBuf> {
    let mut family: Vec<(u32, PathBuf)> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let n = ordinal(entry.file_name().to_str()?, stem)?;
            (n <= max_ordinal).then(|| (n, entry.into_path()))
        })
        .collect();
    family.sort_by_key(|(n, _)| *n);
    family.into_iter().map(|(_, path)| path).collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn output_names() {
        assert_eq!(output_name("MSG0.db").as_deref(), Some("MSG0.db"));
        assert_eq!(output_name("xInfo.db"), None);
        assert_eq!(
            output_name("MicroMsg.db_SQLITE_1").as_deref(),
            Some("MicroMsg.db")
        );
        assert_eq!(output_name("notes.txt"), None);
        assert_eq!(output_name("MSG0.db-wal"), None);
    }

    #[test]
    fn discovers_nested_shards() {
        let dir = tempfile::tempdir().unwrap();
        let multi = dir.path().join("Multi");
        fs::create_dir(&multi).unwrap();
        for path in [
            dir.path().join("MicroMsg.db"),
            dir.path().join("xInfo.db"),
            dir.path().join("readme.txt"),
            multi.join("MSG0.db"),
            multi.join("MSG1.db"),
            multi.join("MediaMSG0.db_SQLITE"),
        ] {
            fs::write(path, b"x").unwrap();
        }
        let mut names: Vec<_> = discover_shards(dir.path())
            .into_iter()
            .map(|t| t.output_name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["MSG0.db", "MSG1.db", "MediaMSG0.db", "MicroMsg.db"]);
    }

    #[test]
    fn clashing_output_names_keep_first_in_walk_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("A");
        let b = dir.path().join("B");
        fs::create_dir(&a).unwrap();
        fs::create_dir(&b).unwrap();
        for path in [
            a.join("MSG0.db"),
            b.join("MSG0.db"),
            b.join("MSG1.db"),
            dir.path().join("MicroMsg.db"),
            dir.path().join("MicroMsg.db_SQLITE"),
        ] {
            fs::write(path, b"x").unwrap();
        }

        let tasks = discover_shards(dir.path());
        let mut names: Vec<_> = tasks.iter().map(|t| t.output_name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["MSG0.db", "MSG1.db", "MicroMsg.db"]);

        let input_of = |name: &str| {
            tasks
                .iter()
                .find(|t| t.output_name == name)
                .map(|t| t.input.clone())
                .unwrap()
        };
        assert_eq!(input_of("MSG0.db"), a.join("MSG0.db"));
        assert_eq!(input_of("MicroMsg.db"), dir.path().join("MicroMsg.db"));
    }

    #[test]
    fn family_is_ordered_and_bounded() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["MSG10.db", "MSG2.db", "MSG0.db", "MSG.db", "MSGx.db", "MediaMSG0.db", "MSG60.db"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let family: Vec<_> = shard_family(dir.path(), "MSG", 50)
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(family, vec!["MSG0.db", "MSG2.db", "MSG10.db"]);

        let media = shard_family(dir.path(), "MediaMSG", 50);
        assert_eq!(media.len(), 1);
    }
}
