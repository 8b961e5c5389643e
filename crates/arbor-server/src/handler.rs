use std::sync::{Arc, Mutex};

use arbor_datas::validate_root;
use arbor_protocol::body::{encode_has_response, parse_blob_query, parse_hash_list, parse_root_update};
use arbor_protocol::codec::compress;
use arbor_protocol::{content_types, ChunkCodec, Frame, HealthResponse};
use arbor_store::ChunkStore;
use arbor_types::{Chunk, Hash, HashSet};
use arbor_values::{codec, Value};
use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// `GET /root/`: the current root as hex.
pub async fn get_root(State(state): State<AppState>) -> ServerResult<String> {
    Ok(state.store().root().await?.to_hex())
}

/// `POST /root/?last=&current=`: compare-and-swap the root.
///
/// Pending writes that can be resolved are written first; `current` must
/// then be stored and shaped like a dataset map.
pub async fn post_root(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> ServerResult<StatusCode> {
    let (last, current) = parse_root_update(query.as_deref().unwrap_or_default())?;
    write_back(&state).await?;

    if !current.is_empty() && !state.store().has(&current).await? {
        return Err(ServerError::BadRequest(format!(
            "root {} has not been written",
            current.short_hex()
        )));
    }
    validate_root(&state.values, &current).await?;

    if state.store().update_root(last, current).await? {
        info!(last = %last.short_hex(), current = %current.short_hex(), "root updated");
        Ok(StatusCode::OK)
    } else {
        debug!(last = %last.short_hex(), "root update lost the race");
        Ok(StatusCode::CONFLICT)
    }
}

/// `POST /writeValue/`: accept a compressed stream of chunks.
///
/// Every chunk is verified and decoded, and its referents resolved, before
/// any is admitted, so a bad chunk fails the whole request and leaves the
/// store untouched. Admission is a prefix of the request; chunks the
/// server has not yet stored are named back for the client to resend.
pub async fn write_value(State(state): State<AppState>, body: Bytes) -> ServerResult<StatusCode> {
    let (hints, frames) =
        ChunkCodec::decode_write_body_limited(&body, state.config.max_decompressed_bytes)?;
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for frame in frames {
        let frame = frame?;
        if seen.insert(frame.hash) {
            unique.push(frame);
        }
    }

    let decoded = verify_frames(unique, state.config.write_concurrency).await?;
    let received = decoded.len();
    let items: Vec<(Chunk, u64)> = decoded
        .into_iter()
        .map(|(chunk, value)| (chunk, value.ref_height()))
        .collect();
    let hashes: Vec<Hash> = items.iter().map(|(chunk, _)| chunk.hash()).collect();

    let dangling = state.batch().unresolvable(&items, &hints).await?;
    if !dangling.is_empty() {
        return Err(ServerError::BadRequest(format!(
            "{} chunk(s) reference absent chunks: {}",
            dangling.len(),
            short_list(&dangling)
        )));
    }

    let refused: HashSet = match state.batch().admit(items, &hints).await {
        Ok(()) => HashSet::new(),
        Err(e) => match e.rejected_hashes() {
            Some(rejected) => rejected.iter().copied().collect(),
            None => return Err(e.into()),
        },
    };
    write_back(&state).await?;

    let unstored: HashSet = state.batch().still_pending(&hashes).await.into_iter().collect();
    let not_taken: Vec<Hash> = hashes
        .into_iter()
        .filter(|h| refused.contains(h) || unstored.contains(h))
        .collect();
    if !not_taken.is_empty() {
        debug!(received, not_taken = not_taken.len(), "write deferred");
        return Err(ServerError::Backpressure(not_taken));
    }
    debug!(received, hints = hints.len(), "chunks accepted");
    Ok(StatusCode::CREATED)
}

/// `POST /getRefs/`: the requested chunks that exist, as compressed frames.
pub async fn get_refs(State(state): State<AppState>, body: Bytes) -> ServerResult<Response> {
    let hashes = distinct(parse_hash_list(&body)?);
    let chunks = state.store().get_many(&hashes).await?;
    let frames = ChunkCodec::encode_frames(&chunks);
    let compressed = compress(&frames, state.config.compression_level)?;
    debug!(asked = hashes.len(), found = chunks.len(), "get refs");
    Ok(([(header::CONTENT_TYPE, content_types::OCTET_STREAM)], compressed).into_response())
}

/// `POST /hasRefs/`: one answer line per distinct requested hash.
pub async fn has_refs(State(state): State<AppState>, body: Bytes) -> ServerResult<String> {
    let hashes = distinct(parse_hash_list(&body)?);
    let present = state.store().has_many(&hashes).await?;
    let answers: Vec<(Hash, bool)> = hashes.iter().map(|h| (*h, present.contains(h))).collect();
    Ok(encode_has_response(&answers))
}

/// `GET /getBlob/?h=`: the bytes of a stored blob.
pub async fn get_blob(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> ServerResult<Response> {
    let hash = parse_blob_query(query.as_deref().unwrap_or_default())?
        .ok_or_else(|| ServerError::BadRequest("missing `h` parameter".into()))?;
    let chunk = state
        .store()
        .get(&hash)
        .await?
        .ok_or_else(|| ServerError::BadRequest(format!("no chunk {}", hash.short_hex())))?;
    match codec::decode_chunk(&chunk)? {
        Value::Blob(bytes) => {
            Ok(([(header::CONTENT_TYPE, content_types::OCTET_STREAM)], bytes).into_response())
        }
        other => Err(ServerError::BadRequest(format!(
            "{} is a {}, not a blob",
            hash.short_hex(),
            other.type_tag()
        ))),
    }
}

/// Write back whatever is resolvable. Chunks the store pushes back on stay
/// pending; callers decide what to report.
async fn write_back(state: &AppState) -> ServerResult<()> {
    match state.batch().write_back().await {
        Ok(wb) => {
            debug!(written = wb.written, remaining = wb.remaining, "write-back");
            Ok(())
        }
        Err(e) if e.rejected_hashes().is_some() => {
            debug!(error = %e, "write-back deferred");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn short_list(hashes: &[Hash]) -> String {
    hashes.iter().map(Hash::short_hex).collect::<Vec<_>>().join(", ")
}

fn distinct(hashes: Vec<Hash>) -> Vec<Hash> {
    let mut seen = HashSet::new();
    hashes.into_iter().filter(|h| seen.insert(*h)).collect()
}

fn verify_frame(frame: Frame) -> ServerResult<(Chunk, Value)> {
    let chunk = frame.verify()?;
    let value = codec::decode_chunk(&chunk)?;
    Ok((chunk, value))
}

/// Verify and decode `frames` on up to `workers` tasks. Results come back
/// in input order. The result channel closes once every worker is done.
async fn verify_frames(frames: Vec<Frame>, workers: usize) -> ServerResult<Vec<(Chunk, Value)>> {
    let total = frames.len();
    if total == 0 {
        return Ok(Vec::new());
    }
    let workers = workers.clamp(1, total);
    let jobs = Arc::new(Mutex::new(frames.into_iter().enumerate()));
    let (tx, mut rx) = mpsc::channel(workers * 2);

    for _ in 0..workers {
        let jobs = Arc::clone(&jobs);
        let tx = tx.clone();
        tokio::spawn(async move {
            loop {
                let next = jobs.lock().expect("lock poisoned").next();
                let Some((i, frame)) = next else { break };
                let result = verify_frame(frame).map(|(chunk, value)| (i, chunk, value));
                if tx.send(result).await.is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    let mut slots: Vec<Option<(Chunk, Value)>> = (0..total).map(|_| None).collect();
    while let Some(result) = rx.recv().await {
        let (i, chunk, value) = result?;
        slots[i] = Some((chunk, value));
    }
    Ok(slots.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of(value: &Value) -> Frame {
        let chunk = codec::encode_chunk(value).unwrap();
        Frame {
            hash: chunk.hash(),
            data: chunk.data().clone(),
        }
    }

    #[tokio::test]
    async fn verification_keeps_input_order() {
        let values: Vec<Value> = (0..20).map(|n| Value::from(f64::from(n))).collect();
        let frames = values.iter().map(frame_of).collect();
        let decoded = verify_frames(frames, 3).await.unwrap();
        let got: Vec<Value> = decoded.into_iter().map(|(_, v)| v).collect();
        assert_eq!(got, values);
    }

    #[tokio::test]
    async fn one_bad_frame_fails_the_batch() {
        let mut frames: Vec<Frame> = (0..5).map(|n| frame_of(&Value::from(f64::from(n)))).collect();
        frames[3].hash = Hash::of(b"lie");
        assert!(matches!(
            verify_frames(frames, 2).await,
            Err(ServerError::Protocol(_))
        ));

        let junk = Chunk::new(b"not a value".to_vec());
        let frames = vec![Frame {
            hash: junk.hash(),
            data: junk.data().clone(),
        }];
        assert!(matches!(verify_frames(frames, 2).await, Err(ServerError::Value(_))));
    }

    #[test]
    fn distinct_keeps_first_occurrence() {
        let (a, b) = (Hash::of(b"a"), Hash::of(b"b"));
        assert_eq!(distinct(vec![a, b, a, b]), vec![a, b]);
    }
}
