use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arbor_store::{ChunkStore, StoreError, StoreResult};
use arbor_types::{Chunk, Hash, HashSet};
use quick_cache::sync::Cache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::codec;
use crate::error::{ValueError, ValueResult};
use crate::read_batch::ReadBatcher;

/// Tuning for a [`BatchStore`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Pending chunk count beyond which writers wait for a write-back.
    pub max_pending_chunks: usize,
    /// Pending byte total beyond which writers wait for a write-back.
    pub max_pending_bytes: usize,
    /// Only write chunks whose referents are provably present. Ignored for
    /// remote stores, which validate on their side.
    pub validate: bool,
    /// How many consecutive backpressure rejections without progress are
    /// retried before giving up.
    pub flush_retries: u32,
    /// Base delay between retries; grows linearly per attempt.
    pub retry_backoff_ms: u64,
    /// Hashes remembered as present in the store.
    pub present_cache_entries: usize,
    /// Decoded values a [`crate::ValueStore`] keeps cached.
    pub value_cache_entries: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_pending_chunks: 4096,
            max_pending_bytes: 64 * 1024 * 1024,
            validate: true,
            flush_retries: 8,
            retry_backoff_ms: 10,
            present_cache_entries: 1 << 16,
            value_cache_entries: 1 << 14,
        }
    }
}

/// Outcome of one write-back pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteBack {
    pub written: usize,
    pub remaining: usize,
}

#[derive(Clone)]
struct PendingChunk {
    chunk: Chunk,
    height: u64,
    /// Direct referents.
    refs: Vec<Hash>,
}

#[derive(Default)]
struct Pending {
    chunks: HashMap<Hash, PendingChunk>,
    bytes: usize,
    /// Hints not yet expanded (validating) or not yet delivered (remote).
    hints: HashSet,
    /// Hashes proven present through hints.
    known: HashSet,
}

impl Pending {
    fn insert(&mut self, p: PendingChunk) {
        self.bytes += p.chunk.len();
        self.chunks.insert(p.chunk.hash(), p);
    }

    fn remove(&mut self, hash: &Hash) {
        if let Some(p) = self.chunks.remove(hash) {
            self.bytes -= p.chunk.len();
        }
    }

    fn over_bound(&self, config: &BatchConfig) -> bool {
        self.chunks.len() > config.max_pending_chunks || self.bytes > config.max_pending_bytes
    }

    /// Pending chunks bottom-up: ascending height, ties by hash.
    fn ordered(&self) -> Vec<PendingChunk> {
        let mut out: Vec<PendingChunk> = self.chunks.values().cloned().collect();
        out.sort_by_key(|p| (p.height, p.chunk.hash()));
        out
    }

    /// Forget delivered hints and the known set once nothing is pending.
    fn settle(&mut self, delivered: &HashSet) {
        if self.chunks.is_empty() {
            self.hints.retain(|h| !delivered.contains(h));
            self.known.clear();
        }
    }
}

/// Backoff state shared by every loop that retries backpressure.
///
/// The attempt count restarts whenever fewer chunks are rejected than
/// last time.
struct Retry<'a> {
    config: &'a BatchConfig,
    attempt: u32,
    last_rejected: usize,
}

impl<'a> Retry<'a> {
    fn new(config: &'a BatchConfig) -> Self {
        Self {
            config,
            attempt: 0,
            last_rejected: usize::MAX,
        }
    }

    /// Sleep before the next attempt, or hand `err` back once the budget
    /// is spent.
    async fn backoff(&mut self, err: ValueError) -> ValueResult<()> {
        let rejected = err.rejected_hashes().map_or(0, <[Hash]>::len);
        if rejected < self.last_rejected {
            self.attempt = 0;
        }
        self.last_rejected = rejected;
        if self.attempt >= self.config.flush_retries {
            return Err(err);
        }
        self.attempt += 1;
        let delay = self.config.retry_backoff_ms * u64::from(self.attempt);
        debug!(attempt = self.attempt, delay_ms = delay, rejected, "retrying after backpressure");
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(())
    }
}

/// Write-buffering layer over a [`ChunkStore`].
///
/// Writers schedule chunks top-down in any order; write-back hands them to
/// the store bottom-up by height. When validating, a chunk reaches the store
/// only once every chunk it references is known to be there, so the store
/// never holds a dangling ref.
///
/// Concurrent `get` and `has` calls that miss the pending set are merged
/// into shared `get_many`/`has_many` round trips. Write-back passes run one
/// at a time and hold the pending lock only between store calls.
pub struct BatchStore {
    store: Arc<dyn ChunkStore>,
    config: BatchConfig,
    pending: Mutex<Pending>,
    passes: Mutex<()>,
    /// Positive existence cache. Chunks are never deleted, so entries never
    /// go stale; eviction only costs a store round trip.
    present: Cache<Hash, ()>,
    has_reads: ReadBatcher<bool>,
    get_reads: ReadBatcher<Option<Chunk>>,
}

impl BatchStore {
    pub fn new(store: Arc<dyn ChunkStore>, config: BatchConfig) -> Self {
        Self {
            store,
            present: Cache::new(config.present_cache_entries.max(1)),
            config,
            pending: Mutex::new(Pending::default()),
            passes: Mutex::new(()),
            has_reads: ReadBatcher::new(),
            get_reads: ReadBatcher::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn is_local(&self) -> bool {
        self.store.is_local()
    }

    fn validating(&self) -> bool {
        self.config.validate && self.store.is_local()
    }

    fn is_present(&self, hash: &Hash) -> bool {
        self.present.get(hash).is_some()
    }

    fn mark_present(&self, hashes: impl IntoIterator<Item = Hash>) {
        for hash in hashes {
            self.present.insert(hash, ());
        }
    }

    fn prepare(&self, chunk: Chunk, height: u64) -> ValueResult<PendingChunk> {
        let refs = codec::decode_chunk(&chunk)?
            .refs()
            .iter()
            .map(|r| r.target())
            .collect();
        Ok(PendingChunk { chunk, height, refs })
    }

    /// Buffer a chunk for writing.
    ///
    /// Past the pending bound the caller writes back before returning,
    /// retrying backpressure like [`BatchStore::flush`]. If the store keeps
    /// refusing, the chunk is withdrawn and the backpressure error returned,
    /// so the pending set never outgrows its bound on account of a full
    /// store. A pass that writes nothing because referents are still to
    /// come does not block. Chunks that fail to decode are rejected here and
    /// never buffered.
    pub async fn schedule_put(&self, chunk: Chunk, height: u64, hints: &HashSet) -> ValueResult<()> {
        let hash = chunk.hash();
        let prepared = self.prepare(chunk, height)?;
        let over = {
            let mut pending = self.pending.lock().await;
            pending.hints.extend(hints.iter().copied());
            if pending.chunks.contains_key(&hash) || self.is_present(&hash) {
                return Ok(());
            }
            pending.insert(prepared);
            debug!(hash = %hash.short_hex(), height, "scheduled chunk");
            pending.over_bound(&self.config)
        };
        if over {
            if let Err(e) = self.relieve().await {
                self.pending.lock().await.remove(&hash);
                warn!(hash = %hash.short_hex(), error = %e, "withdrew chunk after backpressure");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Write back until the pending set is back within bounds or nothing
    /// more can be written yet.
    async fn relieve(&self) -> ValueResult<()> {
        let mut retry = Retry::new(&self.config);
        loop {
            match self.pass(false).await {
                Ok(wb) if wb.written == 0 => return Ok(()),
                Ok(_) => {
                    if !self.pending.lock().await.over_bound(&self.config) {
                        return Ok(());
                    }
                }
                Err(e) if e.rejected_hashes().is_some() => retry.backoff(e).await?,
                Err(e) => return Err(e),
            }
        }
    }

    /// Buffer chunks without waiting.
    ///
    /// Admits chunks in order until the pending bound is reached, then fails
    /// with a backpressure error naming exactly the chunks not admitted.
    /// Chunks that are already pending or stored count as admitted.
    pub async fn admit(&self, items: Vec<(Chunk, u64)>, hints: &HashSet) -> ValueResult<()> {
        let prepared = items
            .into_iter()
            .map(|(chunk, height)| self.prepare(chunk, height))
            .collect::<ValueResult<Vec<_>>>()?;

        let mut pending = self.pending.lock().await;
        pending.hints.extend(hints.iter().copied());
        let mut rejected = Vec::new();
        for p in prepared {
            let hash = p.chunk.hash();
            if pending.chunks.contains_key(&hash) || self.is_present(&hash) {
                continue;
            }
            let full = pending.chunks.len() >= self.config.max_pending_chunks
                || (!pending.chunks.is_empty()
                    && pending.bytes + p.chunk.len() > self.config.max_pending_bytes);
            if full || !rejected.is_empty() {
                rejected.push(hash);
                continue;
            }
            pending.insert(p);
        }
        if rejected.is_empty() {
            Ok(())
        } else {
            debug!(rejected = rejected.len(), pending = pending.chunks.len(), "admission limited");
            Err(StoreError::Backpressure(rejected).into())
        }
    }

    /// The chunks of `items` that reference something neither `items`, the
    /// pending set, `hints` nor the store can account for, in input order.
    ///
    /// A chunk whose referent is itself unresolvable is unresolvable too.
    /// Always empty when not validating.
    pub async fn unresolvable(&self, items: &[(Chunk, u64)], hints: &HashSet) -> ValueResult<Vec<Hash>> {
        if !self.validating() {
            return Ok(Vec::new());
        }
        let mut prepared = items
            .iter()
            .map(|(chunk, height)| self.prepare(chunk.clone(), *height))
            .collect::<ValueResult<Vec<_>>>()?;
        prepared.sort_by_key(|p| (p.height, p.chunk.hash()));
        let in_request: HashSet = prepared.iter().map(|p| p.chunk.hash()).collect();

        let fresh = {
            let pending = self.pending.lock().await;
            hints
                .iter()
                .filter(|h| !pending.known.contains(*h))
                .copied()
                .collect::<Vec<_>>()
        };
        let vouched = self.read_hints(&fresh).await?;

        let mut resolved = {
            let mut pending = self.pending.lock().await;
            pending.known.extend(vouched.iter().copied());
            let accounted = |r: &Hash| {
                in_request.contains(r)
                    || vouched.contains(r)
                    || pending.chunks.contains_key(r)
                    || pending.known.contains(r)
                    || self.is_present(r)
            };
            let asked: HashSet = prepared
                .iter()
                .flat_map(|p| p.refs.iter().copied())
                .filter(|r| !accounted(r))
                .collect();
            let mut resolved: HashSet = prepared
                .iter()
                .flat_map(|p| p.refs.iter().copied())
                .filter(|r| !in_request.contains(r) && accounted(r))
                .collect();
            drop(pending);
            if !asked.is_empty() {
                let asked: Vec<Hash> = asked.into_iter().collect();
                let found = self.store.has_many(&asked).await?;
                self.mark_present(found.iter().copied());
                resolved.extend(found);
            }
            resolved
        };

        let mut bad = HashSet::new();
        for p in &prepared {
            if p.refs.iter().all(|r| resolved.contains(r)) {
                resolved.insert(p.chunk.hash());
            } else {
                bad.insert(p.chunk.hash());
            }
        }
        if !bad.is_empty() {
            debug!(unresolvable = bad.len(), "request references absent chunks");
        }
        Ok(items
            .iter()
            .map(|(chunk, _)| chunk.hash())
            .filter(|h| bad.contains(h))
            .collect())
    }

    /// The hashes in `hashes` that are still waiting in the pending set.
    pub async fn still_pending(&self, hashes: &[Hash]) -> Vec<Hash> {
        let pending = self.pending.lock().await;
        hashes
            .iter()
            .filter(|h| pending.chunks.contains_key(*h))
            .copied()
            .collect()
    }

    pub async fn add_hints(&self, hints: impl IntoIterator<Item = Hash>) {
        self.pending.lock().await.hints.extend(hints);
    }

    /// Read a chunk, pending writes first.
    pub async fn get(&self, hash: &Hash) -> ValueResult<Option<Chunk>> {
        if let Some(p) = self.pending.lock().await.chunks.get(hash) {
            return Ok(Some(p.chunk.clone()));
        }
        let store = &self.store;
        let found = self
            .get_reads
            .lookup(*hash, |hashes| async move {
                let chunks = store.get_many(&hashes).await?;
                Ok::<_, StoreError>(
                    chunks
                        .into_iter()
                        .map(|c| (c.hash(), Some(c)))
                        .collect::<HashMap<Hash, Option<Chunk>>>(),
                )
            })
            .await?;
        Ok(found)
    }

    pub async fn has(&self, hash: &Hash) -> ValueResult<bool> {
        if self.pending.lock().await.chunks.contains_key(hash) || self.is_present(hash) {
            return Ok(true);
        }
        let store = &self.store;
        let found = self
            .has_reads
            .lookup(*hash, |hashes| async move {
                let present = store.has_many(&hashes).await?;
                Ok::<_, StoreError>(
                    present
                        .into_iter()
                        .map(|h| (h, true))
                        .collect::<HashMap<Hash, bool>>(),
                )
            })
            .await?;
        if found {
            self.mark_present([*hash]);
        }
        Ok(found)
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.chunks.len()
    }

    pub async fn pending_bytes(&self) -> usize {
        self.pending.lock().await.bytes
    }

    /// Move the writable part of the pending set into the store.
    ///
    /// When validating, that is every chunk whose referents are written in
    /// this pass, known through hints, or confirmed by one batched existence
    /// check. Otherwise everything pending is sent together with the hints.
    /// On backpressure the rejected chunks stay pending and the error is
    /// returned after the admitted ones are settled.
    pub async fn write_back(&self) -> ValueResult<WriteBack> {
        self.pass(true).await
    }

    /// One write-back pass. An incomplete pass to a store that does not
    /// validate sends only chunks whose referents are sent alongside or
    /// known present, leaving the rest for a later, complete pass.
    async fn pass(&self, complete: bool) -> ValueResult<WriteBack> {
        let _pass = self.passes.lock().await;

        if !self.validating() {
            let (batch, hints) = {
                let mut pending = self.pending.lock().await;
                if pending.chunks.is_empty() {
                    pending.hints.clear();
                    pending.known.clear();
                    return Ok(WriteBack::default());
                }
                let mut sent = HashSet::new();
                let mut batch = Vec::new();
                for p in pending.ordered() {
                    if complete || p.refs.iter().all(|r| sent.contains(r) || self.is_present(r)) {
                        sent.insert(p.chunk.hash());
                        batch.push(p.chunk);
                    }
                }
                if batch.is_empty() {
                    return Ok(WriteBack {
                        written: 0,
                        remaining: pending.chunks.len(),
                    });
                }
                (batch, pending.hints.clone())
            };
            let result = self.store.write_hinted(batch.clone(), &hints).await;
            return self.settle(batch, &hints, result).await;
        }

        let fresh = {
            let mut pending = self.pending.lock().await;
            if pending.chunks.is_empty() {
                pending.hints.clear();
                pending.known.clear();
                return Ok(WriteBack::default());
            }
            let fresh: Vec<Hash> = pending
                .hints
                .iter()
                .filter(|h| !pending.known.contains(*h))
                .copied()
                .collect();
            pending.hints.clear();
            fresh
        };
        let vouched = match self.read_hints(&fresh).await {
            Ok(vouched) => vouched,
            Err(e) => {
                self.pending.lock().await.hints.extend(fresh);
                return Err(e);
            }
        };

        let (snapshot, unresolved) = {
            let mut pending = self.pending.lock().await;
            pending.known.extend(vouched);
            if pending.chunks.is_empty() {
                pending.settle(&HashSet::new());
                return Ok(WriteBack::default());
            }
            let unresolved: HashSet = pending
                .chunks
                .values()
                .flat_map(|p| p.refs.iter().copied())
                .filter(|r| {
                    !pending.chunks.contains_key(r) && !pending.known.contains(r) && !self.is_present(r)
                })
                .collect();
            (pending.ordered(), unresolved)
        };

        let found = if unresolved.is_empty() {
            HashSet::new()
        } else {
            let asked: Vec<Hash> = unresolved.into_iter().collect();
            let found = self.store.has_many(&asked).await?;
            self.mark_present(found.iter().copied());
            found
        };

        let (batch, remaining) = {
            let pending = self.pending.lock().await;
            let mut written_now = HashSet::new();
            let mut batch = Vec::new();
            for p in snapshot {
                let resolvable = p.refs.iter().all(|r| {
                    written_now.contains(r)
                        || found.contains(r)
                        || pending.known.contains(r)
                        || self.is_present(r)
                });
                if resolvable {
                    written_now.insert(p.chunk.hash());
                    batch.push(p.chunk);
                }
            }
            (batch, pending.chunks.len())
        };

        if batch.is_empty() {
            return Ok(WriteBack { written: 0, remaining });
        }
        let result = self.store.put_many(batch.clone()).await;
        self.settle(batch, &HashSet::new(), result).await
    }

    async fn settle(
        &self,
        batch: Vec<Chunk>,
        delivered: &HashSet,
        result: StoreResult<()>,
    ) -> ValueResult<WriteBack> {
        let rejected: HashSet = match result {
            Ok(()) => HashSet::new(),
            Err(StoreError::Backpressure(rejected)) => rejected.into_iter().collect(),
            Err(e) => return Err(e.into()),
        };

        let mut pending = self.pending.lock().await;
        let mut written = 0;
        let mut still_rejected = Vec::new();
        for chunk in &batch {
            let hash = chunk.hash();
            if rejected.contains(&hash) {
                still_rejected.push(hash);
            } else {
                pending.remove(&hash);
                self.mark_present([hash]);
                written += 1;
            }
        }
        pending.settle(delivered);
        let remaining = pending.chunks.len();
        debug!(written, remaining, rejected = still_rejected.len(), "write-back");

        if still_rejected.is_empty() {
            Ok(WriteBack { written, remaining })
        } else {
            Err(StoreError::Backpressure(still_rejected).into())
        }
    }

    /// Each hinted chunk plus every chunk it references. Reads only the
    /// hinted chunks; hints for absent or undecodable chunks vouch for
    /// nothing.
    async fn read_hints(&self, hints: &[Hash]) -> ValueResult<HashSet> {
        let mut vouched = HashSet::new();
        if hints.is_empty() {
            return Ok(vouched);
        }
        let chunks = self.store.get_many(hints).await?;
        if chunks.len() < hints.len() {
            warn!(hinted = hints.len(), found = chunks.len(), "ignoring hints for absent chunks");
        }
        for chunk in chunks {
            match codec::decode_chunk(&chunk) {
                Ok(value) => {
                    vouched.insert(chunk.hash());
                    vouched.extend(value.refs().iter().map(|r| r.target()));
                }
                Err(e) => warn!(hint = %chunk.hash().short_hex(), error = %e, "undecodable hint"),
            }
        }
        Ok(vouched)
    }

    /// Write back until nothing is pending.
    ///
    /// Retries backpressure with linear backoff, giving up after
    /// `flush_retries` consecutive attempts that admit nothing. Fails with
    /// [`ValueError::Validation`] when the remaining chunks reference chunks
    /// that cannot be proven present.
    pub async fn flush(&self) -> ValueResult<()> {
        let mut retry = Retry::new(&self.config);
        loop {
            match self.write_back().await {
                Ok(wb) if wb.remaining == 0 => return Ok(()),
                Ok(wb) if wb.written == 0 => {
                    return Err(ValueError::Validation(format!(
                        "{} pending chunk(s) reference chunks that are not present",
                        wb.remaining
                    )));
                }
                Ok(_) => {}
                Err(e) if e.rejected_hashes().is_some() => retry.backoff(e).await?,
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn root(&self) -> ValueResult<Hash> {
        Ok(self.store.root().await?)
    }

    /// Flush, then compare-and-swap the store root.
    pub async fn update_root(&self, expected: Hash, new: Hash) -> ValueResult<bool> {
        self.flush().await?;
        Ok(self.store.update_root(expected, new).await?)
    }
}
