//! Test support: on-disk fixture shards, a shard encryptor, and blob builders.

pub mod blobs;
pub mod fixtures;
pub mod sealer;

pub use blobs::{raw_side_channel_blob, roster_blob, sender_blob, side_channel_blob};
pub use fixtures::{MessageRow, TestVault};
pub use sealer::{random_key, seal_bytes, seal_database, synthetic_plaintext, test_params};
