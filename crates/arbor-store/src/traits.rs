use async_trait::async_trait;
use arbor_types::{Chunk, Hash, HashSet};

use crate::error::StoreResult;

/// Content-addressed chunk store with a single atomically swappable root.
///
/// All implementations must satisfy these invariants:
/// - Chunks are immutable once written. Writing the same bytes twice is a
///   no-op.
/// - No chunk is ever deleted or rewritten through this interface.
/// - `update_root` is the only mutable operation with observable ordering:
///   of any number of concurrent calls with the same `expected` value,
///   exactly one may succeed.
/// - All backend errors are propagated, never silently ignored.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Read a chunk by hash.
    ///
    /// Returns `Ok(None)` if the chunk does not exist.
    async fn get(&self, hash: &Hash) -> StoreResult<Option<Chunk>>;

    /// Read every chunk in `hashes` that exists. Absent hashes are omitted.
    ///
    /// Default implementation calls `get()` for each hash. Remote backends
    /// override to use a single round trip.
    async fn get_many(&self, hashes: &[Hash]) -> StoreResult<Vec<Chunk>> {
        let mut found = Vec::with_capacity(hashes.len());
        for hash in hashes {
            if let Some(chunk) = self.get(hash).await? {
                found.push(chunk);
            }
        }
        Ok(found)
    }

    /// Check whether a chunk exists.
    async fn has(&self, hash: &Hash) -> StoreResult<bool>;

    /// The subset of `hashes` present in the store.
    async fn has_many(&self, hashes: &[Hash]) -> StoreResult<HashSet> {
        let mut present = HashSet::new();
        for hash in hashes {
            if self.has(hash).await? {
                present.insert(*hash);
            }
        }
        Ok(present)
    }

    /// Write a chunk. Idempotent on duplicate content.
    async fn put(&self, chunk: Chunk) -> StoreResult<()>;

    /// Write several chunks.
    ///
    /// May fail with [`StoreError::Backpressure`] naming exactly the chunks
    /// that were not admitted; the rest were written.
    ///
    /// [`StoreError::Backpressure`]: crate::StoreError::Backpressure
    async fn put_many(&self, chunks: Vec<Chunk>) -> StoreResult<()> {
        for chunk in chunks {
            self.put(chunk).await?;
        }
        Ok(())
    }

    /// Write chunks together with hints: hashes the writer asserts are
    /// already reachable from the root. Local stores have no use for hints;
    /// remote stores forward them so the receiver can validate cheaply.
    async fn write_hinted(&self, chunks: Vec<Chunk>, _hints: &HashSet) -> StoreResult<()> {
        self.put_many(chunks).await
    }

    /// The current root hash. The empty hash if no root was ever set.
    async fn root(&self) -> StoreResult<Hash>;

    /// Compare-and-swap the root: set it to `new` only if it currently
    /// equals `expected`. Returns `false` on mismatch.
    async fn update_root(&self, expected: Hash, new: Hash) -> StoreResult<bool>;

    /// Whether reads are served in-process (no network round trip).
    fn is_local(&self) -> bool {
        true
    }
}
