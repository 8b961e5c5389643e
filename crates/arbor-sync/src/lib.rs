//! Synchronization between Arbor databases.
//!
//! [`pull`] copies the part of a commit graph a sink lacks, walking source
//! and sink together from the tallest refs down so that shared history is
//! never traversed. Either side may be remote: [`RemoteStore`] speaks the
//! chunk-store protocol over any [`RemoteTransport`].

pub mod error;
pub mod http;
pub mod puller;
pub mod queue;
pub mod remote;
pub mod transport;

pub use error::{SyncError, SyncResult};
pub use http::HttpTransport;
pub use puller::{pull, pull_dataset, ProgressSender, PullProgress, PullReport};
pub use queue::RefQueue;
pub use remote::{RemoteStore, DEFAULT_COMPRESSION_LEVEL};
pub use transport::RemoteTransport;
