mod activities;
mod attachments;
mod directory;
mod error;
mod participants;

pub use activities::{MAX_BATCH_CREATE, MAX_BATCH_UPDATE};
pub use attachments::FileContent;
pub use directory::{HttpDirectory, IdentityDirectory, StaticDirectory};
pub use error::ServiceError;

use std::sync::Arc;

use creditflow_db::Db;
use creditflow_store::BlobStore;

/// Orchestration layer over the database, the blob store and the user
/// directory. Owns permission checks, validation and the side effects of
/// status transitions.
#[derive(Clone)]
pub struct ActivityService {
    db: Db,
    store: Arc<dyn BlobStore>,
    directory: Arc<dyn IdentityDirectory>,
}

impl ActivityService {
    pub fn new(db: Db, store: Arc<dyn BlobStore>, directory: Arc<dyn IdentityDirectory>) -> Self {
        Self {
            db,
            store,
            directory,
        }
    }
}

/// Hex sha256 of a byte slice.
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn sha256_hex_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
