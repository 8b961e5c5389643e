use std::io::Read;

use arbor_types::{Chunk, Hash, HashSet, HASH_LEN};
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};

/// Largest chunk a single frame may carry.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Default cap on the size of a decompressed body.
pub const MAX_DECOMPRESSED_SIZE: usize = 1024 * 1024 * 1024;

const FRAME_HEADER: usize = HASH_LEN + 4;

/// One frame of a chunk stream: the hash the sender claims and the bytes.
///
/// The claim is unchecked until [`Frame::verify`] is called.
#[derive(Clone, Debug)]
pub struct Frame {
    pub hash: Hash,
    pub data: Bytes,
}

impl Frame {
    /// Recompute the hash and turn the frame into a chunk.
    pub fn verify(self) -> ProtocolResult<Chunk> {
        let chunk = Chunk::new(self.data);
        if chunk.hash() != self.hash {
            return Err(ProtocolError::HashMismatch {
                claimed: self.hash,
                actual: chunk.hash(),
            });
        }
        Ok(chunk)
    }
}

/// Codec for chunk streams: `hash[32] ‖ u32-BE length ‖ bytes`, repeated.
pub struct ChunkCodec;

impl ChunkCodec {
    pub fn encode_frames<'a>(chunks: impl IntoIterator<Item = &'a Chunk>) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for chunk in chunks {
            Self::put_frame(&mut buf, chunk);
        }
        buf.to_vec()
    }

    fn put_frame(buf: &mut BytesMut, chunk: &Chunk) {
        buf.reserve(FRAME_HEADER + chunk.len());
        buf.put_slice(chunk.hash().as_bytes());
        buf.put_u32(chunk.len() as u32);
        buf.put_slice(chunk.data());
    }

    /// Decode and verify every frame.
    pub fn decode_frames(data: Bytes) -> ProtocolResult<Vec<Chunk>> {
        FrameReader::new(data).map(|f| f?.verify()).collect()
    }

    /// Hint header: `u32-BE count ‖ hash[32] * count`.
    pub fn encode_hints(hints: &HashSet) -> Vec<u8> {
        let mut sorted: Vec<&Hash> = hints.iter().collect();
        sorted.sort();
        let mut buf = BytesMut::with_capacity(4 + HASH_LEN * sorted.len());
        buf.put_u32(sorted.len() as u32);
        for h in sorted {
            buf.put_slice(h.as_bytes());
        }
        buf.to_vec()
    }

    /// Split a hint header off the front of `data`.
    pub fn decode_hints(data: &mut Bytes) -> ProtocolResult<HashSet> {
        if data.remaining() < 4 {
            return Err(ProtocolError::FramingError("missing hint header".into()));
        }
        let count = data.get_u32() as usize;
        if data.remaining() < count.saturating_mul(HASH_LEN) {
            return Err(ProtocolError::FramingError(format!(
                "hint header announces {count} hashes, {} bytes remain",
                data.remaining()
            )));
        }
        let mut hints = HashSet::with_capacity(count);
        for _ in 0..count {
            let raw = data.split_to(HASH_LEN);
            hints.insert(Hash::from_slice(&raw).map_err(|e| ProtocolError::InvalidHash(e.to_string()))?);
        }
        Ok(hints)
    }

    /// Body of `POST /writeValue/`: zstd(hint header ‖ frames).
    pub fn encode_write_body(hints: &HashSet, chunks: &[Chunk], level: i32) -> ProtocolResult<Vec<u8>> {
        let mut raw = Self::encode_hints(hints);
        raw.extend_from_slice(&Self::encode_frames(chunks));
        compress(&raw, level)
    }

    /// Inverse of [`ChunkCodec::encode_write_body`]. Frames are returned
    /// unverified so callers can verify them where they choose.
    pub fn decode_write_body(body: &[u8]) -> ProtocolResult<(HashSet, FrameReader)> {
        Self::decode_write_body_limited(body, MAX_DECOMPRESSED_SIZE)
    }

    /// [`ChunkCodec::decode_write_body`] with a cap on the decompressed size.
    pub fn decode_write_body_limited(
        body: &[u8],
        max_decompressed: usize,
    ) -> ProtocolResult<(HashSet, FrameReader)> {
        let mut raw = Bytes::from(decompress_limited(body, max_decompressed)?);
        let hints = Self::decode_hints(&mut raw)?;
        Ok((hints, FrameReader::new(raw)))
    }
}

/// Sequential reader over a chunk stream.
///
/// Yields frames in stream order without verifying them. Stops after the
/// first error.
pub struct FrameReader {
    data: Bytes,
    failed: bool,
}

impl FrameReader {
    pub fn new(data: Bytes) -> Self {
        Self { data, failed: false }
    }

    fn next_frame(&mut self) -> ProtocolResult<Frame> {
        if self.data.len() < FRAME_HEADER {
            return Err(ProtocolError::FramingError(format!(
                "truncated frame header: {} bytes",
                self.data.len()
            )));
        }
        let hash = Hash::from_slice(&self.data[..HASH_LEN])
            .map_err(|e| ProtocolError::InvalidHash(e.to_string()))?;
        self.data.advance(HASH_LEN);
        let len = self.data.get_u32() as usize;
        if len > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge { size: len, max: MAX_FRAME_SIZE });
        }
        if self.data.len() < len {
            return Err(ProtocolError::FramingError(format!(
                "incomplete frame: have {}, need {len}",
                self.data.len()
            )));
        }
        let data = self.data.split_to(len);
        Ok(Frame { hash, data })
    }
}

impl Iterator for FrameReader {
    type Item = ProtocolResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.data.is_empty() {
            return None;
        }
        let frame = self.next_frame();
        self.failed = frame.is_err();
        Some(frame)
    }
}

pub fn compress(data: &[u8], level: i32) -> ProtocolResult<Vec<u8>> {
    zstd::encode_all(data, level).map_err(|e| ProtocolError::Compression(e.to_string()))
}

pub fn decompress(data: &[u8]) -> ProtocolResult<Vec<u8>> {
    decompress_limited(data, MAX_DECOMPRESSED_SIZE)
}

/// Decompress at most `max` bytes. A body that expands past `max` is a
/// framing error; decoding stops as soon as the limit is crossed.
pub fn decompress_limited(data: &[u8], max: usize) -> ProtocolResult<Vec<u8>> {
    let decoder =
        zstd::stream::Decoder::new(data).map_err(|e| ProtocolError::Compression(e.to_string()))?;
    let mut out = Vec::new();
    decoder
        .take(max as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| ProtocolError::Compression(e.to_string()))?;
    if out.len() > max {
        return Err(ProtocolError::FramingError(format!(
            "body decompresses past {max} bytes"
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks() -> Vec<Chunk> {
        vec![
            Chunk::new(b"alpha".to_vec()),
            Chunk::empty(),
            Chunk::new(vec![7u8; 1000]),
        ]
    }

    #[test]
    fn frames_roundtrip_in_order() {
        let chunks = chunks();
        let encoded = ChunkCodec::encode_frames(&chunks);
        assert_eq!(encoded.len(), chunks.iter().map(|c| FRAME_HEADER + c.len()).sum::<usize>());
        let decoded = ChunkCodec::decode_frames(Bytes::from(encoded)).unwrap();
        assert_eq!(decoded, chunks);
    }

    #[test]
    fn empty_stream_has_no_frames() {
        assert!(ChunkCodec::decode_frames(Bytes::new()).unwrap().is_empty());
    }

    #[test]
    fn tampered_frame_fails_verification() {
        let mut encoded = ChunkCodec::encode_frames(&[Chunk::new(b"alpha".to_vec())]);
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        let err = ChunkCodec::decode_frames(Bytes::from(encoded)).unwrap_err();
        assert!(matches!(err, ProtocolError::HashMismatch { .. }));
    }

    #[test]
    fn truncated_frame_is_a_framing_error() {
        let encoded = ChunkCodec::encode_frames(&[Chunk::new(b"alpha".to_vec())]);
        let short = Bytes::from(encoded[..encoded.len() - 2].to_vec());
        let mut reader = FrameReader::new(short);
        assert!(matches!(reader.next(), Some(Err(ProtocolError::FramingError(_)))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut raw = BytesMut::new();
        raw.put_slice(Hash::of(b"x").as_bytes());
        raw.put_u32(u32::MAX);
        let mut reader = FrameReader::new(raw.freeze());
        assert!(matches!(reader.next(), Some(Err(ProtocolError::FrameTooLarge { .. }))));
    }

    #[test]
    fn write_body_carries_hints_and_frames() {
        let chunks = chunks();
        let hints: HashSet = [Hash::of(b"h1"), Hash::of(b"h2")].into_iter().collect();
        let body = ChunkCodec::encode_write_body(&hints, &chunks, 3).unwrap();

        let (decoded_hints, frames) = ChunkCodec::decode_write_body(&body).unwrap();
        assert_eq!(decoded_hints, hints);
        let decoded: Vec<Chunk> = frames.map(|f| f.unwrap().verify().unwrap()).collect();
        assert_eq!(decoded, chunks);
    }

    #[test]
    fn hint_header_count_must_match() {
        let mut raw = BytesMut::new();
        raw.put_u32(3);
        raw.put_slice(Hash::of(b"only one").as_bytes());
        let err = ChunkCodec::decode_hints(&mut raw.freeze()).unwrap_err();
        assert!(matches!(err, ProtocolError::FramingError(_)));
    }

    #[test]
    fn decompression_stops_at_the_limit() {
        let bomb = compress(&vec![0u8; 1 << 20], 3).unwrap();
        assert!(bomb.len() < 1 << 12);

        let err = decompress_limited(&bomb, 1 << 16).unwrap_err();
        assert!(matches!(err, ProtocolError::FramingError(_)));
        assert_eq!(decompress_limited(&bomb, 1 << 20).unwrap().len(), 1 << 20);

        let chunks = chunks();
        let body = ChunkCodec::encode_write_body(&HashSet::new(), &chunks, 3).unwrap();
        assert!(matches!(
            ChunkCodec::decode_write_body_limited(&body, 64),
            Err(ProtocolError::FramingError(_))
        ));
    }

    #[test]
    fn garbage_is_not_zstd() {
        assert!(matches!(decompress(b"bogus"), Err(ProtocolError::Compression(_))));
        assert!(ChunkCodec::decode_write_body(b"bogus").is_err());
    }
}
