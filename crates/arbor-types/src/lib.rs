//! Foundation types for Arbor.
//!
//! Every other Arbor crate depends on `arbor-types`. It defines the two
//! primitives the whole store is built on:
//!
//! - [`Hash`] -- 32-byte BLAKE3 digest addressing a chunk
//! - [`Chunk`] -- immutable byte payload paired with its hash

pub mod chunk;
pub mod error;
pub mod hash;

pub use chunk::Chunk;
pub use error::TypeError;
pub use hash::{Hash, HashSet, HASH_LEN};
