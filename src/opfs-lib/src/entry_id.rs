use crate::{EntryId, FileSystemChildMetadata, FsResult};
use sha2::{Digest, Sha256};

/// Derives entry ids from their position in the tree.
///
/// Implementations must be deterministic: the same input always yields the
/// same id. Collisions are resolved by the caller, which salts the input with
/// the rejected candidate and asks again.
pub trait EntryIdGenerator: Send + Sync {
    fn derive_id(&self, child: &FileSystemChildMetadata) -> FsResult<EntryId>;

    fn root_id(&self, origin: &str) -> FsResult<EntryId>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256EntryIdGenerator;

impl EntryIdGenerator for Sha256EntryIdGenerator {
    fn derive_id(&self, child: &FileSystemChildMetadata) -> FsResult<EntryId> {
        let mut hasher = Sha256::new();
        hasher.update(child.parent_id.as_bytes());
        hasher.update(child.child_name.as_bytes());
        let digest: [u8; 32] = hasher.finalize().into();
        Ok(EntryId::from_bytes(digest))
    }

    fn root_id(&self, origin: &str) -> FsResult<EntryId> {
        let mut hasher = Sha256::new();
        hasher.update(origin.as_bytes());
        let digest: [u8; 32] = hasher.finalize().into();
        Ok(EntryId::from_bytes(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_generator_is_positional() {
        let gen = Sha256EntryIdGenerator;
        let root = gen.root_id("https://example.com").unwrap();
        assert_eq!(root, gen.root_id("https://example.com").unwrap());
        assert_ne!(root, gen.root_id("https://example.org").unwrap());

        let first = gen
            .derive_id(&FileSystemChildMetadata::new(root, "First"))
            .unwrap();
        let again = gen
            .derive_id(&FileSystemChildMetadata::new(root, "First"))
            .unwrap();
        assert_eq!(first, again);

        let nested = gen
            .derive_id(&FileSystemChildMetadata::new(first, "First"))
            .unwrap();
        assert_ne!(first, nested);
    }
}
