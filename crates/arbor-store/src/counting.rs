use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use arbor_types::{Chunk, Hash, HashSet};

use crate::error::StoreResult;
use crate::traits::ChunkStore;

/// A store wrapper that counts reads, existence checks and writes.
///
/// Every hash passed to a read counts once, found or not. Batched calls
/// count one per requested hash. Counters are monotonic and never reset
/// implicitly.
pub struct CountingStore<S> {
    inner: S,
    reads: AtomicU64,
    hases: AtomicU64,
    writes: AtomicU64,
}

impl<S: ChunkStore> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            reads: AtomicU64::new(0),
            hases: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Number of chunk reads served so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of existence checks served so far.
    pub fn hases(&self) -> u64 {
        self.hases.load(Ordering::SeqCst)
    }

    /// Number of chunks handed to the inner store for writing.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: ChunkStore> ChunkStore for CountingStore<S> {
    async fn get(&self, hash: &Hash) -> StoreResult<Option<Chunk>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(hash).await
    }

    async fn get_many(&self, hashes: &[Hash]) -> StoreResult<Vec<Chunk>> {
        self.reads.fetch_add(hashes.len() as u64, Ordering::SeqCst);
        self.inner.get_many(hashes).await
    }

    async fn has(&self, hash: &Hash) -> StoreResult<bool> {
        self.hases.fetch_add(1, Ordering::SeqCst);
        self.inner.has(hash).await
    }

    async fn has_many(&self, hashes: &[Hash]) -> StoreResult<HashSet> {
        self.hases.fetch_add(hashes.len() as u64, Ordering::SeqCst);
        self.inner.has_many(hashes).await
    }

    async fn put(&self, chunk: Chunk) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put(chunk).await
    }

    async fn put_many(&self, chunks: Vec<Chunk>) -> StoreResult<()> {
        self.writes.fetch_add(chunks.len() as u64, Ordering::SeqCst);
        self.inner.put_many(chunks).await
    }

    async fn write_hinted(&self, chunks: Vec<Chunk>, hints: &HashSet) -> StoreResult<()> {
        self.writes.fetch_add(chunks.len() as u64, Ordering::SeqCst);
        self.inner.write_hinted(chunks, hints).await
    }

    async fn root(&self) -> StoreResult<Hash> {
        self.inner.root().await
    }

    async fn update_root(&self, expected: Hash, new: Hash) -> StoreResult<bool> {
        self.inner.update_root(expected, new).await
    }

    fn is_local(&self) -> bool {
        self.inner.is_local()
    }
}
