use std::collections::HashMap;

use chatvault_core::{
    ContactEntry, IdentitySource, MessageRecord, ResolvedIdentity, Roster, SideChannel, VaultConfig,
};
use chatvault_storage::Directory;
use tracing::{debug, warn};

const CHATROOM_SUFFIX: &str = "@chatroom";

/// Names the author of each message in one export run.
///
/// Precedence for group messages, first match wins: room display name, contact
/// remark, nickname, alias, raw sender id. The unknown-sender label is used only
/// when no sender id can be read from the message at all. Lookup and decode
/// failures fall through to the next tier instead of failing the message.
pub struct SenderResolver<'a, D: Directory + ?Sized> {
    directory: &'a D,
    self_label: String,
    unknown_label: String,
    groups: HashMap<String, bool>,
    rosters: HashMap<String, Option<Roster>>,
    members: HashMap<String, ResolvedIdentity>,
    peers: HashMap<String, ResolvedIdentity>,
}

impl<'a, D: Directory + ?Sized> SenderResolver<'a, D> {
    pub fn new(directory: &'a D, config: &VaultConfig) -> Self {
        Self {
            directory,
            self_label: config.self_label.clone(),
            unknown_label: config.unknown_sender_label.clone(),
            groups: HashMap::new(),
            rosters: HashMap::new(),
            members: HashMap::new(),
            peers: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, message: &MessageRecord, conversation: &str) -> ResolvedIdentity {
        if !message.kind.has_author() {
            return ResolvedIdentity::new("", IdentitySource::NotApplicable);
        }
        if message.is_sender {
            return ResolvedIdentity::new(&self.self_label, IdentitySource::LocalUser);
        }
        if !self.is_group(conversation) {
            return self.peer(conversation);
        }

        let Some(sender) = self.sender_id(message) else {
            return ResolvedIdentity::new(&self.unknown_label, IdentitySource::Unknown);
        };
        if let Some(name) = self
            .roster(conversation)
            .and_then(|roster| roster.display_name_of(&sender))
        {
            return ResolvedIdentity::new(name, IdentitySource::RoomDisplayName);
        }
        self.member(&sender)
    }

    pub fn is_group(&mut self, conversation: &str) -> bool {
        if conversation.ends_with(CHATROOM_SUFFIX) {
            return true;
        }
        if let Some(&known) = self.groups.get(conversation) {
            return known;
        }
        let group = match self.directory.is_chatroom(conversation) {
            Ok(group) => group,
            Err(e) => {
                warn!(conversation, error = %e, "room lookup failed, treating as one-to-one");
                false
            }
        };
        self.groups.insert(conversation.to_string(), group);
        group
    }

    fn sender_id(&self, message: &MessageRecord) -> Option<String> {
        let blob = message.side_channel.as_deref()?;
        match SideChannel::decode_blob(blob) {
            Ok(side) => side.sender_id().map(str::to_string),
            Err(e) => {
                debug!(local_id = message.local_id, error = %e, "side channel undecodable");
                None
            }
        }
    }

    fn roster(&mut self, room: &str) -> Option<&Roster> {
        if !self.rosters.contains_key(room) {
            let roster = match self.directory.roster_blob(room) {
                Ok(Some(blob)) => match Roster::decode_blob(&blob) {
                    Ok(roster) => Some(roster),
                    Err(e) => {
                        warn!(room, error = %e, "roster undecodable");
                        None
                    }
                },
                Ok(None) => None,
                Err(e) => {
                    warn!(room, error = %e, "roster lookup failed");
                    None
                }
            };
            self.rosters.insert(room.to_string(), roster);
        }
        self.rosters.get(room).and_then(Option::as_ref)
    }

    fn contact(&self, id: &str) -> Option<ContactEntry> {
        match self.directory.contact(id) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(id, error = %e, "contact lookup failed");
                None
            }
        }
    }

    fn member(&mut self, sender: &str) -> ResolvedIdentity {
        if let Some(hit) = self.members.get(sender) {
            return hit.clone();
        }
        let identity = match self.contact(sender) {
            Some(entry) => entry.member_identity(),
            None => ResolvedIdentity::new(sender, IdentitySource::SenderId),
        };
        self.members.insert(sender.to_string(), identity.clone());
        identity
    }

    fn peer(&mut self, conversation: &str) -> ResolvedIdentity {
        if let Some(hit) = self.peers.get(conversation) {
            return hit.clone();
        }
        let identity = match self.contact(conversation) {
            Some(entry) => entry.peer_identity(),
            None => ResolvedIdentity::new(conversation, IdentitySource::PeerId),
        };
        self.peers.insert(conversation.to_string(), identity.clone());
        identity
    }
}
