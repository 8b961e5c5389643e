use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use arbor_types::{Chunk, Hash};
use tracing::debug;

use crate::error::StoreResult;
use crate::traits::ChunkStore;

/// In-memory, HashMap-based chunk store.
///
/// Intended for tests and embedding. Chunks live behind a `RwLock`; the root
/// lives behind its own `Mutex` so that compare-and-swap is atomic with
/// respect to every other root update.
pub struct MemoryStore {
    chunks: RwLock<HashMap<Hash, Chunk>>,
    root: Mutex<Hash>,
}

impl MemoryStore {
    /// Create a new empty store with the empty root.
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
            root: Mutex::new(Hash::empty()),
        }
    }

    /// Number of chunks currently stored.
    pub fn len(&self) -> usize {
        self.chunks.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored chunks.
    pub fn total_bytes(&self) -> u64 {
        self.chunks
            .read()
            .expect("lock poisoned")
            .values()
            .map(|c| c.len() as u64)
            .sum()
    }

    /// Sorted list of every stored hash.
    pub fn all_hashes(&self) -> Vec<Hash> {
        let map = self.chunks.read().expect("lock poisoned");
        let mut hashes: Vec<Hash> = map.keys().copied().collect();
        hashes.sort();
        hashes
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn get(&self, hash: &Hash) -> StoreResult<Option<Chunk>> {
        let map = self.chunks.read().expect("lock poisoned");
        Ok(map.get(hash).cloned())
    }

    async fn has(&self, hash: &Hash) -> StoreResult<bool> {
        let map = self.chunks.read().expect("lock poisoned");
        Ok(map.contains_key(hash))
    }

    async fn put(&self, chunk: Chunk) -> StoreResult<()> {
        let mut map = self.chunks.write().expect("lock poisoned");
        map.entry(chunk.hash()).or_insert(chunk);
        Ok(())
    }

    async fn put_many(&self, chunks: Vec<Chunk>) -> StoreResult<()> {
        let mut map = self.chunks.write().expect("lock poisoned");
        for chunk in chunks {
            map.entry(chunk.hash()).or_insert(chunk);
        }
        Ok(())
    }

    async fn root(&self) -> StoreResult<Hash> {
        Ok(*self.root.lock().expect("lock poisoned"))
    }

    async fn update_root(&self, expected: Hash, new: Hash) -> StoreResult<bool> {
        let mut root = self.root.lock().expect("lock poisoned");
        if *root != expected {
            debug!(expected = %expected.short_hex(), actual = %root.short_hex(), "root CAS mismatch");
            return Ok(false);
        }
        *root = new;
        Ok(true)
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("chunk_count", &self.len())
            .finish()
    }
}
