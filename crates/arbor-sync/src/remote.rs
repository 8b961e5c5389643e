use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use arbor_protocol::body::{
    encode_hash_list, parse_has_response, parse_hash_lines, root_update_query,
};
use arbor_protocol::codec::decompress;
use arbor_protocol::{endpoints, status, ChunkCodec, ProtocolError, WireRequest, WireResponse};
use arbor_store::{ChunkStore, StoreError, StoreResult};
use arbor_types::{Chunk, Hash, HashSet};
use bytes::Bytes;
use tracing::debug;

use crate::transport::RemoteTransport;

/// zstd level used for request bodies unless configured otherwise.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

fn malformed(e: ProtocolError) -> StoreError {
    StoreError::Transport(format!("malformed response: {e}"))
}

/// A [`ChunkStore`] backed by a remote server.
///
/// Batched operations cost one round trip each. The remote validates
/// writes, so hints travel with every write.
pub struct RemoteStore {
    transport: Arc<dyn RemoteTransport>,
    compression_level: i32,
}

impl RemoteStore {
    pub fn new(transport: Arc<dyn RemoteTransport>) -> Self {
        Self {
            transport,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    async fn call(&self, request: WireRequest) -> StoreResult<WireResponse> {
        self.transport
            .send(request)
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))
    }

    /// Map a non-success response onto the store error it stands for.
    fn failure(resp: &WireResponse) -> StoreError {
        match resp.status {
            status::TOO_MANY_REQUESTS => match parse_hash_lines(&resp.text()) {
                Ok(hashes) => StoreError::Backpressure(hashes),
                Err(e) => malformed(e),
            },
            status::BAD_REQUEST => StoreError::Rejected(resp.text()),
            other => StoreError::Transport(format!("unexpected status {other}: {}", resp.text())),
        }
    }

    async fn fetch(&self, hashes: &[Hash]) -> StoreResult<Vec<Chunk>> {
        let resp = self
            .call(WireRequest::form(endpoints::GET_REFS, encode_hash_list(hashes)))
            .await?;
        if resp.status != status::OK {
            return Err(Self::failure(&resp));
        }
        let raw = decompress(&resp.body).map_err(malformed)?;
        ChunkCodec::decode_frames(Bytes::from(raw)).map_err(malformed)
    }
}

impl fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStore")
            .field("remote", &self.transport.describe())
            .field("compression_level", &self.compression_level)
            .finish()
    }
}

#[async_trait]
impl ChunkStore for RemoteStore {
    async fn get(&self, hash: &Hash) -> StoreResult<Option<Chunk>> {
        Ok(self.fetch(&[*hash]).await?.into_iter().find(|c| c.hash() == *hash))
    }

    async fn get_many(&self, hashes: &[Hash]) -> StoreResult<Vec<Chunk>> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch(hashes).await
    }

    async fn has(&self, hash: &Hash) -> StoreResult<bool> {
        Ok(self.has_many(&[*hash]).await?.contains(hash))
    }

    async fn has_many(&self, hashes: &[Hash]) -> StoreResult<HashSet> {
        if hashes.is_empty() {
            return Ok(HashSet::new());
        }
        let resp = self
            .call(WireRequest::form(endpoints::HAS_REFS, encode_hash_list(hashes)))
            .await?;
        if resp.status != status::OK {
            return Err(Self::failure(&resp));
        }
        let answers = parse_has_response(&resp.text()).map_err(malformed)?;
        Ok(answers
            .into_iter()
            .filter_map(|(h, present)| present.then_some(h))
            .collect())
    }

    async fn put(&self, chunk: Chunk) -> StoreResult<()> {
        self.write_hinted(vec![chunk], &HashSet::new()).await
    }

    async fn put_many(&self, chunks: Vec<Chunk>) -> StoreResult<()> {
        self.write_hinted(chunks, &HashSet::new()).await
    }

    async fn write_hinted(&self, chunks: Vec<Chunk>, hints: &HashSet) -> StoreResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let body = ChunkCodec::encode_write_body(hints, &chunks, self.compression_level)
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        debug!(
            chunks = chunks.len(),
            hints = hints.len(),
            bytes = body.len(),
            remote = %self.transport.describe(),
            "writing chunks"
        );
        let resp = self.call(WireRequest::post(endpoints::WRITE_VALUE, body)).await?;
        match resp.status {
            status::CREATED | status::OK => Ok(()),
            _ => Err(Self::failure(&resp)),
        }
    }

    async fn root(&self) -> StoreResult<Hash> {
        let resp = self.call(WireRequest::get(endpoints::ROOT)).await?;
        if resp.status != status::OK {
            return Err(Self::failure(&resp));
        }
        let text = resp.text();
        Hash::from_hex(text.trim())
            .map_err(|e| StoreError::Transport(format!("malformed root {text:?}: {e}")))
    }

    async fn update_root(&self, expected: Hash, new: Hash) -> StoreResult<bool> {
        let request = WireRequest::post(endpoints::ROOT, Bytes::new())
            .with_query(root_update_query(&expected, &new));
        let resp = self.call(request).await?;
        match resp.status {
            status::OK => Ok(true),
            status::CONFLICT => Ok(false),
            _ => Err(Self::failure(&resp)),
        }
    }

    fn is_local(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use arbor_protocol::body::{encode_has_response, encode_hash_lines, parse_hash_list};
    use arbor_protocol::codec::compress;
    use arbor_values::{BatchConfig, BatchStore};
    use futures::future::join_all;

    use super::*;
    use crate::error::{SyncError, SyncResult};

    /// Replays canned responses and records every request.
    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<WireResponse>>,
        requests: Mutex<Vec<WireRequest>>,
    }

    impl Scripted {
        fn replying(responses: impl IntoIterator<Item = WireResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().collect()),
                requests: Mutex::default(),
            })
        }

        fn requests(&self) -> Vec<WireRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteTransport for Scripted {
        async fn send(&self, request: WireRequest) -> SyncResult<WireResponse> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| SyncError::TransportError("connection refused".into()))
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    #[tokio::test]
    async fn empty_batches_make_no_request() {
        let transport = Scripted::replying([]);
        let store = RemoteStore::new(transport.clone());
        assert!(store.get_many(&[]).await.unwrap().is_empty());
        assert!(store.has_many(&[]).await.unwrap().is_empty());
        store.put_many(Vec::new()).await.unwrap();
        assert!(transport.requests().is_empty());
        assert!(!store.is_local());
    }

    #[tokio::test]
    async fn get_decodes_compressed_frames() {
        let chunk = Chunk::new(b"remote".to_vec());
        let frames = ChunkCodec::encode_frames([&chunk]);
        let transport =
            Scripted::replying([WireResponse::new(status::OK, compress(&frames, 3).unwrap())]);
        let store = RemoteStore::new(transport.clone());

        assert_eq!(store.get(&chunk.hash()).await.unwrap(), Some(chunk));
        let sent = transport.requests();
        assert_eq!(sent[0].path, endpoints::GET_REFS);
        assert_eq!(sent[0].body, Bytes::from(encode_hash_list(&[Hash::of(b"remote")])));
    }

    #[tokio::test]
    async fn has_many_keeps_only_present() {
        let (a, b) = (Hash::of(b"a"), Hash::of(b"b"));
        let body = encode_has_response(&[(a, true), (b, false)]);
        let transport = Scripted::replying([WireResponse::new(status::OK, body)]);
        let store = RemoteStore::new(transport);
        let present = store.has_many(&[a, b]).await.unwrap();
        assert!(present.contains(&a) && !present.contains(&b));
    }

    #[tokio::test]
    async fn write_statuses_map_to_store_errors() {
        let rejected = vec![Hash::of(b"x"), Hash::of(b"y")];
        let transport = Scripted::replying([
            WireResponse::new(status::CREATED, ""),
            WireResponse::new(status::TOO_MANY_REQUESTS, encode_hash_lines(&rejected)),
            WireResponse::new(status::BAD_REQUEST, "bad chunk"),
            WireResponse::new(500, "boom"),
        ]);
        let store = RemoteStore::new(transport.clone());
        let chunk = || vec![Chunk::new(b"c".to_vec())];

        store.put_many(chunk()).await.unwrap();
        assert!(matches!(
            store.put_many(chunk()).await,
            Err(StoreError::Backpressure(h)) if h == rejected
        ));
        assert!(matches!(store.put_many(chunk()).await, Err(StoreError::Rejected(m)) if m == "bad chunk"));
        assert!(matches!(store.put_many(chunk()).await, Err(StoreError::Transport(_))));
        assert!(transport.requests().iter().all(|r| r.path == endpoints::WRITE_VALUE));
    }

    #[tokio::test]
    async fn write_body_carries_hints() {
        let transport = Scripted::replying([WireResponse::new(status::CREATED, "")]);
        let store = RemoteStore::new(transport.clone());
        let hints: HashSet = [Hash::of(b"hint")].into_iter().collect();
        let chunk = Chunk::new(b"payload".to_vec());
        store.write_hinted(vec![chunk.clone()], &hints).await.unwrap();

        let sent = transport.requests();
        let (decoded_hints, frames) = ChunkCodec::decode_write_body(&sent[0].body).unwrap();
        assert_eq!(decoded_hints, hints);
        let chunks: Vec<Chunk> = frames.map(|f| f.unwrap().verify().unwrap()).collect();
        assert_eq!(chunks, vec![chunk]);
    }

    #[tokio::test]
    async fn root_and_cas() {
        let root = Hash::of(b"root");
        let transport = Scripted::replying([
            WireResponse::new(status::OK, format!("{}\n", root.to_hex())),
            WireResponse::new(status::OK, ""),
            WireResponse::new(status::CONFLICT, ""),
            WireResponse::new(status::BAD_REQUEST, "not a dataset map"),
        ]);
        let store = RemoteStore::new(transport.clone());

        assert_eq!(store.root().await.unwrap(), root);
        assert!(store.update_root(root, Hash::of(b"next")).await.unwrap());
        assert!(!store.update_root(root, Hash::of(b"next")).await.unwrap());
        assert!(matches!(
            store.update_root(root, Hash::of(b"next")).await,
            Err(StoreError::Rejected(_))
        ));
        let q = transport.requests()[1].uri();
        assert!(q.starts_with("/root/?last="));
    }

    #[tokio::test]
    async fn transport_failure_surfaces_verbatim() {
        let store = RemoteStore::new(Scripted::replying([]));
        match store.root().await {
            Err(StoreError::Transport(msg)) => assert!(msg.contains("connection refused")),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    /// Answers every existence check with "absent" and counts requests.
    #[derive(Default)]
    struct Absent {
        requests: AtomicUsize,
    }

    #[async_trait]
    impl RemoteTransport for Absent {
        async fn send(&self, request: WireRequest) -> SyncResult<WireResponse> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let answers: Vec<(Hash, bool)> = parse_hash_list(&request.body)
                .unwrap()
                .into_iter()
                .map(|h| (h, false))
                .collect();
            Ok(WireResponse::new(status::OK, encode_has_response(&answers)))
        }

        fn describe(&self) -> String {
            "absent".into()
        }
    }

    #[tokio::test]
    async fn concurrent_has_checks_share_requests() {
        let transport = Arc::new(Absent::default());
        let batch = BatchStore::new(
            Arc::new(RemoteStore::new(transport.clone())),
            BatchConfig::default(),
        );
        let hashes: Vec<Hash> = (0..16u32).map(|n| Hash::of(&n.to_be_bytes())).collect();

        let answers = join_all(hashes.iter().map(|h| batch.has(h))).await;
        assert!(answers.into_iter().all(|a| !a.unwrap()));
        assert_eq!(transport.requests.load(Ordering::SeqCst), 1);
    }
}
