//! Typed values over content-addressed chunks.
//!
//! # Layers
//!
//! - [`Value`], [`Ref`], [`TypeTag`] -- the value model; refs carry the
//!   height of the subgraph they point at
//! - [`codec`] -- deterministic encoding; a value's identity is the hash of
//!   its encoding
//! - [`BatchStore`] -- write buffering with hints, backpressure and
//!   bottom-up write-back over any [`arbor_store::ChunkStore`]; concurrent
//!   reads share batched round trips
//! - [`ValueStore`] -- encode, cache and hint tracking on top of the batch
//!   layer

pub mod batch;
pub mod codec;
pub mod error;
mod read_batch;
pub mod store;
pub mod value;

pub use batch::{BatchConfig, BatchStore, WriteBack};
pub use error::{ValueError, ValueResult};
pub use store::ValueStore;
pub use value::{Ref, TypeTag, Value};
