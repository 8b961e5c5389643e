//! Wire format for the Arbor remote chunk-store protocol.
//!
//! Transport-neutral: the server crate maps these types onto axum, clients
//! map them onto reqwest or drive a router in-process.
//!
//! - [`codec`] -- chunk frames, hint headers and zstd bodies
//! - [`body`] -- form-encoded hash lists and line-oriented answers
//! - [`message`] -- [`WireRequest`]/[`WireResponse`]
//! - [`endpoint`] -- paths and parameter names

pub mod body;
pub mod codec;
pub mod endpoint;
pub mod error;
pub mod message;

pub use codec::{ChunkCodec, Frame, FrameReader, MAX_DECOMPRESSED_SIZE, MAX_FRAME_SIZE};
pub use endpoint::{endpoints, params, HealthResponse, PROTOCOL_VERSION};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{content_types, status, Method, WireRequest, WireResponse};
