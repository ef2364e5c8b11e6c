use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::contact::ResolvedIdentity;

pub const TYPE_TEXT: i64 = 1;
pub const TYPE_IMAGE: i64 = 3;
pub const TYPE_VOICE: i64 = 34;
pub const TYPE_VIDEO: i64 = 43;
pub const TYPE_EMOJI: i64 = 47;
pub const TYPE_APP: i64 = 49;
pub const TYPE_SYSTEM: i64 = 10000;

pub const APP_MUSIC: i64 = 3;
pub const APP_LINK: i64 = 5;
pub const APP_FILE: i64 = 6;

/// Closed set of message kinds, decoded from the row's (type, subtype) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Voice,
    Video,
    Emoji,
    File,
    Music,
    Link,
    System,
    Other { msg_type: i64, sub_type: i64 },
}

impl MessageKind {
    pub fn from_codes(msg_type: i64, sub_type: i64) -> Self {
        match (msg_type, sub_type) {
            (TYPE_TEXT, _) => Self::Text,
            (TYPE_IMAGE, _) => Self::Image,
            (TYPE_VOICE, _) => Self::Voice,
            (TYPE_VIDEO, _) => Self::Video,
            (TYPE_EMOJI, _) => Self::Emoji,
            (TYPE_APP, APP_FILE) => Self::File,
            (TYPE_APP, APP_MUSIC) => Self::Music,
            (TYPE_APP, APP_LINK) => Self::Link,
            (TYPE_SYSTEM, _) => Self::System,
            (msg_type, sub_type) => Self::Other { msg_type, sub_type },
        }
    }

    pub fn codes(&self) -> (i64, i64) {
        match self {
            Self::Text => (TYPE_TEXT, 0),
            Self::Image => (TYPE_IMAGE, 0),
            Self::Voice => (TYPE_VOICE, 0),
            Self::Video => (TYPE_VIDEO, 0),
            Self::Emoji => (TYPE_EMOJI, 0),
            Self::File => (TYPE_APP, APP_FILE),
            Self::Music => (TYPE_APP, APP_MUSIC),
            Self::Link => (TYPE_APP, APP_LINK),
            Self::System => (TYPE_SYSTEM, 0),
            Self::Other { msg_type, sub_type } => (*msg_type, *sub_type),
        }
    }

    /// System notices are not written by a conversation member.
    pub fn has_author(&self) -> bool {
        !matches!(self, Self::System)
    }

    /// Text shown in place of content that is not plain text.
    pub fn placeholder(&self) -> Option<&'static str> {
        match self {
            Self::Text | Self::System => None,
            Self::Image => Some("[Image]"),
            Self::Voice => Some("[Voice]"),
            Self::Video => Some("[Video]"),
            Self::Emoji => Some("[Sticker]"),
            Self::File => Some("[File]"),
            Self::Music => Some("[Music]"),
            Self::Link => Some("[Link]"),
            Self::Other { .. } => Some("[Unsupported message]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindFilter {
    All,
    Only(BTreeSet<MessageKind>),
}

impl KindFilter {
    pub fn only<I: IntoIterator<Item = MessageKind>>(kinds: I) -> Self {
        Self::Only(kinds.into_iter().collect())
    }

    pub fn allows(&self, kind: MessageKind) -> bool {
        match self {
            Self::All => true,
            Self::Only(kinds) => kinds.contains(&kind),
        }
    }
}

impl Default for KindFilter {
    fn default() -> Self {
        Self::only([MessageKind::Text, MessageKind::System])
    }
}

/// One row of the merged `MSG` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub local_id: i64,
    pub talker: String,
    pub kind: MessageKind,
    pub is_sender: bool,
    pub create_time: i64,
    pub status: i64,
    pub content: Option<String>,
    pub display_content: Option<String>,
    pub compressed: Option<Vec<u8>>,
    pub server_id: i64,
    pub sequence: i64,
    pub side_channel: Option<Vec<u8>>,
}

/// A message paired with the identity it will be rendered under.
#[derive(Debug, Clone)]
pub struct AnnotatedMessage {
    pub record: MessageRecord,
    pub sender: ResolvedIdentity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_subtypes_map_to_distinct_kinds() {
        assert_eq!(MessageKind::from_codes(49, 6), MessageKind::File);
        assert_eq!(MessageKind::from_codes(49, 3), MessageKind::Music);
        assert_eq!(MessageKind::from_codes(49, 5), MessageKind::Link);
        assert_eq!(
            MessageKind::from_codes(49, 57),
            MessageKind::Other { msg_type: 49, sub_type: 57 }
        );
    }

    #[test]
    fn known_codes_survive_conversion() {
        for kind in [
            MessageKind::Text,
            MessageKind::Image,
            MessageKind::Voice,
            MessageKind::Video,
            MessageKind::Emoji,
            MessageKind::File,
            MessageKind::Music,
            MessageKind::Link,
            MessageKind::System,
        ] {
            let (t, s) = kind.codes();
            assert_eq!(MessageKind::from_codes(t, s), kind);
        }
    }

    #[test]
    fn default_filter_is_text_and_system() {
        let filter = KindFilter::default();
        assert!(filter.allows(MessageKind::Text));
        assert!(filter.allows(MessageKind::System));
        assert!(!filter.allows(MessageKind::Image));
        assert!(KindFilter::All.allows(MessageKind::Image));
    }

    #[test]
    fn system_messages_have_no_author() {
        assert!(!MessageKind::System.has_author());
        assert!(MessageKind::Text.has_author());
        assert!(MessageKind::System.placeholder().is_none());
    }
}
