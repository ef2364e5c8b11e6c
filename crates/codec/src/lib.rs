pub mod error;
pub mod key;
pub mod page;
pub mod params;
pub mod shard;

pub use error::DecryptError;
pub use key::DecryptionKey;
pub use page::PageKeys;
pub use params::CipherParams;
pub use shard::{DecryptReport, decrypt, decrypt_with};
