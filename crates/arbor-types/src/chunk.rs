use bytes::Bytes;

use crate::hash::Hash;

/// An immutable, content-addressed byte payload.
///
/// The hash is computed once at construction and cached. Chunks are cheap to
/// clone: the payload is reference-counted.
#[derive(Clone, PartialEq, Eq)]
pub struct Chunk {
    hash: Hash,
    data: Bytes,
}

impl Chunk {
    /// Create a chunk, hashing `data`.
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            hash: Hash::of(&data),
            data,
        }
    }

    /// Create a chunk whose hash is already known.
    ///
    /// Callers that receive chunks from an untrusted source should use
    /// [`Chunk::new`] and compare hashes instead.
    pub fn with_hash(hash: Hash, data: impl Into<Bytes>) -> Self {
        Self {
            hash,
            data: data.into(),
        }
    }

    /// The chunk with no bytes.
    pub fn empty() -> Self {
        Self::new(Bytes::new())
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("hash", &self.hash)
            .field("len", &self.data.len())
            .finish()
    }
}
