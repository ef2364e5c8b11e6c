use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chatvault_core::{
    AnnotatedMessage, IdentitySource, KindFilter, TimeWindow, VaultConfig, Zone,
};
use chatvault_storage::{ChatRoomSummary, Directory, MessageStore, SqliteArchive, StorageError};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::ExportError;
use crate::render::{ConversationHeader, Renderer};
use crate::resolver::SenderResolver;

/// One export call: which conversation, which window, where to put the artifact.
#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    pub conversation: String,
    /// Textual bounds; `None` or empty leaves that side open.
    pub start: Option<String>,
    pub end: Option<String>,
    pub out_dir: PathBuf,
    /// Artifact file name without extension. Defaults to the conversation's display name.
    pub label: Option<String>,
}

impl ExportRequest {
    pub fn new(conversation: impl Into<String>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            conversation: conversation.into(),
            out_dir: out_dir.into(),
            ..Self::default()
        }
    }

    pub fn window(mut self, start: Option<&str>, end: Option<&str>) -> Self {
        self.start = start.map(str::to_string);
        self.end = end.map(str::to_string);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    pub records: usize,
    pub path: PathBuf,
    /// How many messages each precedence tier named.
    pub fallbacks: BTreeMap<IdentitySource, usize>,
}

/// Reads the merged archive, names every author, and hands the result to a renderer.
///
/// Read-only against the archive. The artifact appears only once every message
/// has been processed; a fatal error or a cancellation leaves nothing behind.
pub struct ExportPipeline {
    archive: PathBuf,
    directory: Option<PathBuf>,
    config: VaultConfig,
    kinds: KindFilter,
    cancel: Arc<AtomicBool>,
}

impl ExportPipeline {
    pub fn new(archive: impl Into<PathBuf>, config: VaultConfig) -> Self {
        let kinds = config.kind_filter();
        Self {
            archive: archive.into(),
            directory: None,
            config,
            kinds,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Contact and room tables live in a separate file.
    pub fn with_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.directory = Some(path.into());
        self
    }

    pub fn with_kinds(mut self, kinds: KindFilter) -> Self {
        self.kinds = kinds;
        self
    }

    /// Setting the returned flag aborts a running export between two messages.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn open(&self) -> Result<SqliteArchive, ExportError> {
        let opened = match &self.directory {
            Some(directory) => SqliteArchive::open_with_directory(&self.archive, directory),
            None => SqliteArchive::open(&self.archive),
        };
        opened.map_err(|e| match e {
            StorageError::Precondition { path, reason } => ExportError::Precondition { path, reason },
            other => ExportError::Precondition {
                path: self.archive.clone(),
                reason: other.to_string(),
            },
        })
    }

    pub fn list_chatrooms(&self) -> Result<Vec<ChatRoomSummary>, ExportError> {
        Ok(self.open()?.chatrooms()?)
    }

    fn zone(&self) -> Result<Zone, ExportError> {
        Ok(self.config.zone()?)
    }

    /// Ordered, kind-filtered messages of one conversation with their authors named.
    pub fn annotate<S: MessageStore + Directory>(
        &self,
        store: &S,
        conversation: &str,
        window: &TimeWindow,
    ) -> Result<Vec<AnnotatedMessage>, ExportError> {
        let mut resolver = SenderResolver::new(store, &self.config);
        let mut annotated = Vec::new();
        for record in store.messages(conversation, window)? {
            if self.cancel.load(Ordering::Relaxed) {
                info!(conversation, done = annotated.len(), "export cancelled");
                return Err(ExportError::Cancelled);
            }
            if !self.kinds.allows(record.kind) {
                continue;
            }
            let sender = resolver.resolve(&record, conversation);
            annotated.push(AnnotatedMessage { record, sender });
        }
        Ok(annotated)
    }

    pub fn export<R: Renderer + ?Sized>(
        &self,
        request: &ExportRequest,
        renderer: &R,
    ) -> Result<ExportOutcome, ExportError> {
        let window = TimeWindow::parse(
            request.start.as_deref(),
            request.end.as_deref(),
            self.zone()?,
        )?;
        let archive = self.open()?;
        let messages = self.annotate(&archive, &request.conversation, &window)?;

        let label = match &request.label {
            Some(label) => label.clone(),
            None => conversation_label(&archive, &request.conversation),
        };
        let header = ConversationHeader {
            id: request.conversation.clone(),
            label: label.clone(),
            window,
        };

        std::fs::create_dir_all(&request.out_dir)?;
        let path = request
            .out_dir
            .join(format!("{}.{}", file_stem(&label), renderer.extension()));
        let staged = NamedTempFile::new_in(&request.out_dir)?;
        {
            let mut out = BufWriter::new(staged.as_file());
            renderer.render(&header, &messages, &mut out)?;
            out.flush()?;
        }
        if self.cancel.load(Ordering::Relaxed) {
            return Err(ExportError::Cancelled);
        }
        staged.as_file().sync_all()?;
        staged.persist(&path).map_err(|e| ExportError::Io(e.error))?;

        let mut fallbacks = BTreeMap::new();
        for message in &messages {
            *fallbacks.entry(message.sender.source).or_insert(0) += 1;
        }
        info!(
            conversation = %request.conversation,
            records = messages.len(),
            path = %path.display(),
            "conversation exported"
        );
        Ok(ExportOutcome {
            records: messages.len(),
            path,
            fallbacks,
        })
    }
}

fn conversation_label<D: Directory>(directory: &D, conversation: &str) -> String {
    match directory.contact(conversation) {
        Ok(Some(entry)) => entry.peer_identity().display,
        Ok(None) => conversation.to_string(),
        Err(e) => {
            debug!(conversation, error = %e, "no label for conversation");
            conversation.to_string()
        }
    }
}

/// Display names may contain characters that are not valid in file names.
fn file_stem(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "conversation".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stem_replaces_separators() {
        assert_eq!(file_stem("a/b:c"), "a_b_c");
        assert_eq!(file_stem("  "), "conversation");
        assert_eq!(file_stem(".."), "conversation");
        assert_eq!(file_stem("Book Club"), "Book Club");
    }

    #[test]
    fn missing_archive_is_precondition_failure() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ExportPipeline::new(dir.path().join("MSG.db"), VaultConfig::default());
        let err = pipeline
            .export(
                &ExportRequest::new("room@chatroom", dir.path()),
                &crate::render::PlainTextRenderer::new(Zone::utc()),
            )
            .unwrap_err();
        assert!(matches!(err, ExportError::Precondition { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn invalid_bound_reports_offending_value() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ExportPipeline::new(dir.path().join("MSG.db"), VaultConfig::default());
        let request = ExportRequest::new("room@chatroom", dir.path()).window(Some("yesterday"), None);
        let err = pipeline
            .export(&request, &crate::render::PlainTextRenderer::new(Zone::utc()))
            .unwrap_err();
        match err {
            ExportError::InvalidTimeRange { value, .. } => assert_eq!(value, "yesterday"),
            other => panic!("expected InvalidTimeRange, got {other:?}"),
        }
    }
}
