//! Chunk storage for Arbor.
//!
//! A chunk store maps content hashes to immutable byte chunks and holds one
//! mutable pointer, the root, which changes only by compare-and-swap.
//!
//! # Backends
//!
//! All backends implement the [`ChunkStore`] trait:
//!
//! - [`MemoryStore`] -- `HashMap`-based store for tests and embedding
//! - [`CountingStore`] -- wrapper counting reads, has-checks and writes
//! - [`BackpressureStore`] -- wrapper that rejects part of each batch write
//!
//! Remote stores live in `arbor-sync`.
//!
//! # Design Rules
//!
//! 1. Chunks are immutable once written; duplicate writes are no-ops.
//! 2. Nothing is ever deleted through this interface.
//! 3. The root moves only through `update_root`, which is a CAS.
//! 4. All backend errors are propagated, never silently ignored.

pub mod backpressure;
pub mod counting;
pub mod error;
pub mod memory;
pub mod traits;

pub use backpressure::BackpressureStore;
pub use counting::CountingStore;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use traits::ChunkStore;
