pub mod blobs;
pub mod config;
pub mod contact;
pub mod error;
pub mod message;
pub mod time_window;

pub use blobs::{Roster, RosterMember, SideChannel, SideChannelEntry};
pub use config::VaultConfig;
pub use contact::{ContactEntry, IdentitySource, ResolvedIdentity};
pub use error::CoreError;
pub use message::{AnnotatedMessage, KindFilter, MessageKind, MessageRecord};
pub use time_window::{TimeWindow, Zone};
