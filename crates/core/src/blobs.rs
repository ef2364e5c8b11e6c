//! Decoders for the protobuf blobs stored next to messages and rooms.
//!
//! Both decoders only name the fields they read. Unknown fields are skipped by
//! the protobuf decoder, so extra or reordered vendor fields never fail a decode.

use prost::Message;

use crate::error::CoreError;

/// Entry tag carrying the author id of a group message.
pub const SENDER_TAG: i32 = 1;

/// The `BytesExtra` column: a list of tagged entries under field 3.
#[derive(Clone, PartialEq, Message)]
pub struct SideChannel {
    #[prost(message, repeated, tag = "3")]
    pub entries: Vec<SideChannelEntry>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SideChannelEntry {
    #[prost(int32, tag = "1")]
    pub tag: i32,
    /// Raw payload; text only for some tags.
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

impl SideChannelEntry {
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

impl SideChannel {
    pub fn decode_blob(bytes: &[u8]) -> Result<Self, CoreError> {
        Self::decode(bytes).map_err(|e| CoreError::Decode(format!("side channel: {e}")))
    }

    /// First non-empty text value carried under `tag`, wherever it sits in the list.
    pub fn find(&self, tag: i32) -> Option<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.tag == tag)
            .filter_map(SideChannelEntry::text)
            .find(|value| !value.is_empty())
    }

    pub fn sender_id(&self) -> Option<&str> {
        self.find(SENDER_TAG)
    }
}

/// The `RoomData` column of the `ChatRoom` table.
#[derive(Clone, PartialEq, Message)]
pub struct Roster {
    #[prost(message, repeated, tag = "1")]
    pub members: Vec<RosterMember>,
    #[prost(int32, tag = "5")]
    pub capacity: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct RosterMember {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, optional, tag = "2")]
    pub display_name: Option<String>,
    #[prost(int32, tag = "3")]
    pub state: i32,
}

impl Roster {
    pub fn decode_blob(bytes: &[u8]) -> Result<Self, CoreError> {
        Self::decode(bytes).map_err(|e| CoreError::Decode(format!("roster: {e}")))
    }

    pub fn member(&self, id: &str) -> Option<&RosterMember> {
        self.members.iter().find(|m| m.id == id)
    }

    /// Room-specific name for `id`, if the member set a non-empty one.
    pub fn display_name_of(&self, id: &str) -> Option<&str> {
        self.member(id)
            .and_then(|m| m.display_name.as_deref())
            .filter(|name| !name.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(tag: i32, value: &str) -> SideChannelEntry {
        SideChannelEntry {
            tag,
            value: value.into(),
        }
    }

    #[test]
    fn sender_found_after_other_entries() {
        let blob = SideChannel {
            entries: vec![entry(7, "<msgsource/>"), entry(3, "thumb"), entry(1, "wxid_bob")],
        }
        .encode_to_vec();

        let decoded = SideChannel::decode_blob(&blob).unwrap();
        assert_eq!(decoded.sender_id(), Some("wxid_bob"));
    }

    #[test]
    fn missing_sender_tag_yields_none() {
        let blob = SideChannel {
            entries: vec![entry(7, "<msgsource/>"), entry(1, "")],
        }
        .encode_to_vec();
        assert_eq!(SideChannel::decode_blob(&blob).unwrap().sender_id(), None);
        assert_eq!(SideChannel::decode_blob(&[]).unwrap().sender_id(), None);
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let mut blob = Vec::new();
        // field 1, length-delimited, unrelated payload
        blob.extend_from_slice(&[0x0a, 0x02, 0x08, 0x01]);
        // field 9, varint
        blob.extend_from_slice(&[0x48, 0x96, 0x01]);
        blob.extend(
            SideChannel {
                entries: vec![entry(1, "wxid_carol")],
            }
            .encode_to_vec(),
        );
        assert_eq!(
            SideChannel::decode_blob(&blob).unwrap().sender_id(),
            Some("wxid_carol")
        );
    }

    #[test]
    fn binary_entry_beside_sender_is_tolerated() {
        let blob = SideChannel {
            entries: vec![
                SideChannelEntry {
                    tag: 3,
                    value: vec![0xff, 0xfe, 0x00],
                },
                entry(1, "wxid_x"),
            ],
        }
        .encode_to_vec();
        let decoded = SideChannel::decode_blob(&blob).unwrap();
        assert_eq!(decoded.sender_id(), Some("wxid_x"));
        assert_eq!(decoded.entries[0].text(), None);
    }

    #[test]
    fn invalid_utf8_sender_is_skipped() {
        let blob = SideChannel {
            entries: vec![
                SideChannelEntry {
                    tag: 1,
                    value: vec![0xc3, 0x28],
                },
                entry(1, "wxid_y"),
            ],
        }
        .encode_to_vec();
        assert_eq!(SideChannel::decode_blob(&blob).unwrap().sender_id(), Some("wxid_y"));
    }

    #[test]
    fn truncated_blob_is_a_decode_error() {
        let blob = SideChannel {
            entries: vec![entry(1, "wxid_dave")],
        }
        .encode_to_vec();
        let err = SideChannel::decode_blob(&blob[..blob.len() - 3]).unwrap_err();
        assert!(matches!(err, CoreError::Decode(_)));
    }

    #[test]
    fn roster_display_name_lookup() {
        let roster = Roster {
            members: vec![
                RosterMember {
                    id: "wxid_a".into(),
                    display_name: Some("Room Alice".into()),
                    state: 0,
                },
                RosterMember {
                    id: "wxid_b".into(),
                    display_name: Some(String::new()),
                    state: 0,
                },
                RosterMember {
                    id: "wxid_c".into(),
                    display_name: None,
                    state: 0,
                },
            ],
            capacity: 500,
        };
        let decoded = Roster::decode_blob(&roster.encode_to_vec()).unwrap();
        assert_eq!(decoded.display_name_of("wxid_a"), Some("Room Alice"));
        assert_eq!(decoded.display_name_of("wxid_b"), None);
        assert_eq!(decoded.display_name_of("wxid_c"), None);
        assert!(decoded.member("wxid_c").is_some());
        assert!(decoded.member("wxid_z").is_none());
    }

    proptest! {
        #[test]
        fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = SideChannel::decode_blob(&bytes);
            let _ = Roster::decode_blob(&bytes);
        }
    }
}
