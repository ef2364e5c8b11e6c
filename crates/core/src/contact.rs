use std::fmt;

use serde::{Deserialize, Serialize};

/// A row of the `Contact` table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactEntry {
    pub id: String,
    pub remark: Option<String>,
    pub nickname: Option<String>,
    pub alias: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

impl ContactEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Label for the peer of a one-to-one conversation: remark, then nickname, then id.
    pub fn peer_identity(&self) -> ResolvedIdentity {
        if let Some(remark) = non_empty(&self.remark) {
            return ResolvedIdentity::new(remark, IdentitySource::PeerRemark);
        }
        if let Some(nickname) = non_empty(&self.nickname) {
            return ResolvedIdentity::new(nickname, IdentitySource::PeerNickname);
        }
        ResolvedIdentity::new(&self.id, IdentitySource::PeerId)
    }

    /// Label for a group member once the roster had nothing: remark, nickname, alias, id.
    pub fn member_identity(&self) -> ResolvedIdentity {
        if let Some(remark) = non_empty(&self.remark) {
            return ResolvedIdentity::new(remark, IdentitySource::Remark);
        }
        if let Some(nickname) = non_empty(&self.nickname) {
            return ResolvedIdentity::new(nickname, IdentitySource::Nickname);
        }
        if let Some(alias) = non_empty(&self.alias) {
            return ResolvedIdentity::new(alias, IdentitySource::Alias);
        }
        ResolvedIdentity::new(&self.id, IdentitySource::SenderId)
    }
}

/// Which tier of the precedence chain produced a display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    LocalUser,
    PeerRemark,
    PeerNickname,
    PeerId,
    RoomDisplayName,
    Remark,
    Nickname,
    Alias,
    SenderId,
    Unknown,
    /// Messages with no author, such as system notices.
    NotApplicable,
}

impl IdentitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalUser => "local_user",
            Self::PeerRemark => "peer_remark",
            Self::PeerNickname => "peer_nickname",
            Self::PeerId => "peer_id",
            Self::RoomDisplayName => "room_display_name",
            Self::Remark => "remark",
            Self::Nickname => "nickname",
            Self::Alias => "alias",
            Self::SenderId => "sender_id",
            Self::Unknown => "unknown",
            Self::NotApplicable => "not_applicable",
        }
    }
}

impl fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final display name attached to a message. Derived per export run, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub display: String,
    pub source: IdentitySource,
}

impl ResolvedIdentity {
    pub fn new(display: impl Into<String>, source: IdentitySource) -> Self {
        Self {
            display: display.into(),
            source,
        }
    }
}

impl fmt::Display for ResolvedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}
