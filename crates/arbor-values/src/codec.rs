//! Deterministic binary encoding of values.
//!
//! Values are encoded with `bincode`. Encoding is a pure function of the
//! value, so a value's identity is the hash of its encoding. Decoding rejects
//! trailing bytes and non-canonical collections, so every accepted chunk
//! re-encodes to exactly the bytes it was decoded from.

use arbor_types::{Chunk, Hash};

use crate::error::{ValueError, ValueResult};
use crate::value::Value;

pub fn encode(value: &Value) -> ValueResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| ValueError::Encode(e.to_string()))
}

pub fn encode_chunk(value: &Value) -> ValueResult<Chunk> {
    Ok(Chunk::new(encode(value)?))
}

/// Hash of a value's encoding: the address of the chunk it would occupy.
pub fn hash_of(value: &Value) -> ValueResult<Hash> {
    Ok(Hash::of(&encode(value)?))
}

pub fn decode(bytes: &[u8]) -> ValueResult<Value> {
    let value: Value =
        bincode::deserialize(bytes).map_err(|e| ValueError::Decode(e.to_string()))?;
    let size = bincode::serialized_size(&value).map_err(|e| ValueError::Decode(e.to_string()))?;
    if size != bytes.len() as u64 {
        return Err(ValueError::Decode(format!(
            "{} trailing byte(s)",
            bytes.len() as u64 - size.min(bytes.len() as u64)
        )));
    }
    if !value.is_canonical()? {
        return Err(ValueError::Decode("collection not in canonical order".into()));
    }
    Ok(value)
}

pub fn decode_chunk(chunk: &Chunk) -> ValueResult<Value> {
    decode(chunk.data())
}
