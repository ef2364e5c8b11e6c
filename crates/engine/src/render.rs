use std::io::{self, Write};

use chatvault_core::{AnnotatedMessage, IdentitySource, TimeWindow, Zone};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What a renderer knows about the conversation being exported.
#[derive(Debug, Clone)]
pub struct ConversationHeader {
    pub id: String,
    pub label: String,
    pub window: TimeWindow,
}

/// Turns a fully annotated message sequence into an artifact.
pub trait Renderer {
    /// File extension of the artifact, without the dot.
    fn extension(&self) -> &str;

    fn render(
        &self,
        header: &ConversationHeader,
        messages: &[AnnotatedMessage],
        out: &mut dyn Write,
    ) -> io::Result<()>;
}

/// `time name` line, then the content, one blank line between messages.
pub struct PlainTextRenderer {
    zone: Zone,
}

impl PlainTextRenderer {
    pub fn new(zone: Zone) -> Self {
        Self { zone }
    }

    fn timestamp(&self, ts: i64) -> String {
        self.zone
            .format(ts, TIME_FORMAT)
            .unwrap_or_else(|| ts.to_string())
    }
}

fn body(message: &AnnotatedMessage) -> &str {
    let record = &message.record;
    if let Some(placeholder) = record.kind.placeholder() {
        return placeholder;
    }
    record
        .content
        .as_deref()
        .or(record.display_content.as_deref())
        .unwrap_or("")
}

impl Renderer for PlainTextRenderer {
    fn extension(&self) -> &str {
        "txt"
    }

    fn render(
        &self,
        header: &ConversationHeader,
        messages: &[AnnotatedMessage],
        out: &mut dyn Write,
    ) -> io::Result<()> {
        writeln!(out, "Conversation: {} ({})", header.label, header.id)?;
        match (header.window.start, header.window.end) {
            (None, None) => {}
            (start, end) => writeln!(
                out,
                "Range: {} .. {}",
                start.map_or_else(|| "*".to_string(), |ts| self.timestamp(ts)),
                end.map_or_else(|| "*".to_string(), |ts| self.timestamp(ts)),
            )?,
        }
        writeln!(out, "Messages: {}", messages.len())?;

        for message in messages {
            writeln!(out)?;
            let time = self.timestamp(message.record.create_time);
            if message.sender.source == IdentitySource::NotApplicable {
                writeln!(out, "{time}")?;
            } else {
                writeln!(out, "{time} {}", message.sender.display)?;
            }
            writeln!(out, "{}", body(message))?;
        }
        Ok(())
    }
}
