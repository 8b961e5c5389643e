use std::sync::Arc;

use arbor_store::ChunkStore;
use arbor_types::{Hash, HashSet};
use quick_cache::sync::Cache;
use tracing::debug;

use crate::batch::{BatchConfig, BatchStore};
use crate::codec;
use crate::error::{ValueError, ValueResult};
use crate::value::{Ref, Value};

/// Reads and writes typed values over a batched chunk store.
///
/// Reads are cached and remember, for every chunk seen, the chunk it was
/// reached through. Writes use that memory to attach hints, letting a
/// validating store accept new chunks without checking each referent.
///
/// Both caches hold at most `value_cache_entries` entries of the batch
/// config; cold entries are evicted first.
pub struct ValueStore {
    batch: Arc<BatchStore>,
    values: Cache<Hash, Value>,
    hints: Cache<Hash, Hash>,
}

impl ValueStore {
    pub fn new(store: Arc<dyn ChunkStore>, config: BatchConfig) -> Self {
        Self::with_batch(Arc::new(BatchStore::new(store, config)))
    }

    pub fn with_batch(batch: Arc<BatchStore>) -> Self {
        let capacity = batch.config().value_cache_entries.max(1);
        Self {
            batch,
            values: Cache::new(capacity),
            hints: Cache::new(capacity),
        }
    }

    pub fn batch(&self) -> &Arc<BatchStore> {
        &self.batch
    }

    pub fn is_local(&self) -> bool {
        self.batch.is_local()
    }

    /// The chunk through which `hash` was last reached, if it was read.
    pub fn hint_for(&self, hash: &Hash) -> Option<Hash> {
        self.hints.get(hash)
    }

    /// Number of decoded values currently cached.
    pub fn cached_values(&self) -> usize {
        self.values.len()
    }

    /// Read and decode the value stored at `hash`.
    pub async fn read_value(&self, hash: &Hash) -> ValueResult<Option<Value>> {
        let cached = self.values.get(hash);
        if cached.is_some() {
            return Ok(cached);
        }
        let Some(chunk) = self.batch.get(hash).await? else {
            return Ok(None);
        };
        let value = codec::decode_chunk(&chunk)?;

        self.hints.insert(*hash, *hash);
        for r in value.refs() {
            self.hints.insert(r.target(), *hash);
        }
        self.values.insert(*hash, value.clone());
        Ok(Some(value))
    }

    /// Read the value a ref points at. A ref that does not resolve is an
    /// error, not an absence.
    pub async fn read_ref(&self, r: &Ref) -> ValueResult<Value> {
        self.read_value(&r.target())
            .await?
            .ok_or(ValueError::MissingChunk(r.target()))
    }

    /// Encode `value`, schedule its chunk and return a ref to it.
    ///
    /// Does not wait for the chunk to reach the store; call [`flush`] for
    /// that.
    ///
    /// [`flush`]: ValueStore::flush
    pub async fn write_value(&self, value: &Value) -> ValueResult<Ref> {
        let chunk = codec::encode_chunk(value)?;
        let r = Ref::new(chunk.hash(), value.ref_height(), value.type_tag());

        let hints: HashSet = value
            .refs()
            .iter()
            .filter_map(|child| self.hints.get(&child.target()))
            .collect();
        debug!(target_hash = %r.target().short_hex(), height = r.height(), hints = hints.len(), "write value");
        self.batch.schedule_put(chunk, r.height(), &hints).await?;
        Ok(r)
    }

    pub async fn flush(&self) -> ValueResult<()> {
        self.batch.flush().await
    }

    pub async fn root(&self) -> ValueResult<Hash> {
        self.batch.root().await
    }

    /// Flush pending writes, then compare-and-swap the root.
    pub async fn update_root(&self, expected: Hash, new: Hash) -> ValueResult<bool> {
        self.batch.update_root(expected, new).await
    }
}

#[cfg(test)]
mod tests {
    use arbor_store::{CountingStore, MemoryStore};

    use super::*;

    #[tokio::test]
    async fn written_values_are_readable_before_flush() {
        let store = Arc::new(MemoryStore::new());
        let vs = ValueStore::new(store.clone(), BatchConfig::default());
        let r = vs.write_value(&Value::from("hello")).await.unwrap();

        assert!(store.is_empty());
        assert_eq!(vs.read_ref(&r).await.unwrap(), Value::from("hello"));

        vs.flush().await.unwrap();
        assert!(store.has(&r.target()).await.unwrap());
    }

    #[tokio::test]
    async fn reads_are_cached() {
        let store = Arc::new(CountingStore::new(MemoryStore::new()));
        let writer = ValueStore::new(store.clone(), BatchConfig::default());
        let r = writer.write_value(&Value::from(1.0)).await.unwrap();
        writer.flush().await.unwrap();

        let reader = ValueStore::new(store.clone(), BatchConfig::default());
        let before = store.reads();
        reader.read_value(&r.target()).await.unwrap().unwrap();
        reader.read_value(&r.target()).await.unwrap().unwrap();
        assert_eq!(store.reads() - before, 1);
    }

    #[tokio::test]
    async fn missing_values() {
        let vs = ValueStore::new(Arc::new(MemoryStore::new()), BatchConfig::default());
        let absent = Hash::of(b"absent");
        assert!(vs.read_value(&absent).await.unwrap().is_none());

        let r = Ref::new(absent, 1, Value::from(true).type_tag());
        assert!(matches!(vs.read_ref(&r).await, Err(ValueError::MissingChunk(h)) if h == absent));
    }

    #[tokio::test]
    async fn read_refs_become_write_hints() {
        let store = Arc::new(CountingStore::new(MemoryStore::new()));
        let writer = ValueStore::new(store.clone(), BatchConfig::default());
        let leaf = writer.write_value(&Value::from("leaf")).await.unwrap();
        let list = writer
            .write_value(&Value::List(vec![Value::Ref(leaf.clone())]))
            .await
            .unwrap();
        writer.flush().await.unwrap();

        let vs = ValueStore::new(store.clone(), BatchConfig::default());
        vs.read_value(&list.target()).await.unwrap().unwrap();
        assert_eq!(vs.hint_for(&list.target()), Some(list.target()));
        assert_eq!(vs.hint_for(&leaf.target()), Some(list.target()));

        let hases = store.hases();
        let top = vs
            .write_value(&Value::List(vec![Value::Ref(leaf), Value::Ref(list)]))
            .await
            .unwrap();
        vs.flush().await.unwrap();
        assert!(store.inner().has(&top.target()).await.unwrap());
        assert_eq!(store.hases(), hases, "hints vouched for every referent");
    }

    #[tokio::test]
    async fn value_cache_is_bounded() {
        let store = Arc::new(CountingStore::new(MemoryStore::new()));
        let config = BatchConfig {
            value_cache_entries: 4,
            ..BatchConfig::default()
        };
        let writer = ValueStore::new(store.clone(), config.clone());
        let mut refs = Vec::new();
        for n in 0..64 {
            refs.push(writer.write_value(&Value::from(f64::from(n))).await.unwrap());
        }
        writer.flush().await.unwrap();

        let reader = ValueStore::new(store.clone(), config);
        for r in &refs {
            reader.read_ref(r).await.unwrap();
        }
        assert!(reader.cached_values() < refs.len());

        let before = store.reads();
        for (n, r) in refs.iter().enumerate() {
            assert_eq!(reader.read_ref(r).await.unwrap(), Value::from(n as f64));
        }
        assert!(store.reads() - before >= 32, "evicted values are read again");
    }

    #[tokio::test]
    async fn update_root_publishes_pending_writes() {
        let store = Arc::new(MemoryStore::new());
        let vs = ValueStore::new(store.clone(), BatchConfig::default());
        let r = vs.write_value(&Value::from("root")).await.unwrap();
        assert!(vs.update_root(Hash::empty(), r.target()).await.unwrap());
        assert_eq!(vs.root().await.unwrap(), r.target());
        assert!(store.has(&r.target()).await.unwrap());
    }
}
