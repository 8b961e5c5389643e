use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use arbor_types::{Chunk, Hash};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::ChunkStore;

/// A store that admits a growing prefix of each batch write.
///
/// The n-th call to `put_many` (counting from 1) writes the first n chunks
/// of the batch and rejects the rest with [`StoreError::Backpressure`].
/// Single-chunk `put` calls go straight through. Used to exercise the
/// retry path of batch writers.
pub struct BackpressureStore<S> {
    inner: S,
    calls: AtomicUsize,
}

impl<S: ChunkStore> BackpressureStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `put_many` calls seen so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: ChunkStore> ChunkStore for BackpressureStore<S> {
    async fn get(&self, hash: &Hash) -> StoreResult<Option<Chunk>> {
        self.inner.get(hash).await
    }

    async fn has(&self, hash: &Hash) -> StoreResult<bool> {
        self.inner.has(hash).await
    }

    async fn put(&self, chunk: Chunk) -> StoreResult<()> {
        self.inner.put(chunk).await
    }

    async fn put_many(&self, mut chunks: Vec<Chunk>) -> StoreResult<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if chunks.len() <= n {
            return self.inner.put_many(chunks).await;
        }
        let rejected: Vec<Hash> = chunks.split_off(n).iter().map(Chunk::hash).collect();
        debug!(call = n, admitted = chunks.len(), rejected = rejected.len(), "applying backpressure");
        self.inner.put_many(chunks).await?;
        Err(StoreError::Backpressure(rejected))
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
