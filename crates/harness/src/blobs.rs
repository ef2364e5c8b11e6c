use chatvault_core::{Roster, RosterMember, SideChannel, SideChannelEntry};
use prost::Message;

/// Side-channel blob with the given `(tag, value)` entries, in order.
pub fn side_channel_blob(entries: &[(i32, &str)]) -> Vec<u8> {
    SideChannel {
        entries: entries
            .iter()
            .map(|(tag, value)| SideChannelEntry {
                tag: *tag,
                value: value.as_bytes().to_vec(),
            })
            .collect(),
    }
    .encode_to_vec()
}

/// Side-channel blob with raw `(tag, payload)` entries, for non-text payloads.
pub fn raw_side_channel_blob(entries: &[(i32, &[u8])]) -> Vec<u8> {
    SideChannel {
        entries: entries
            .iter()
            .map(|(tag, value)| SideChannelEntry {
                tag: *tag,
                value: value.to_vec(),
            })
            .collect(),
    }
    .encode_to_vec()
}

/// A realistic side channel: a message-source entry first, then the sender.
pub fn sender_blob(sender: &str) -> Vec<u8> {
    side_channel_blob(&[(7, "<msgsource><atuserlist/></msgsource>"), (1, sender)])
}

pub fn roster_blob(members: &[(&str, Option<&str>)]) -> Vec<u8> {
    Roster {
        members: members
            .iter()
            .map(|(id, name)| RosterMember {
                id: id.to_string(),
                display_name: name.map(str::to_string),
                state: 0,
            })
            .collect(),
        capacity: 500,
    }
    .encode_to_vec()
}
