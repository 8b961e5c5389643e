//! Datasets and commits.
//!
//! A [`Database`] keeps named datasets, each pointing at the head
//! [`Commit`] of its history. The whole map of heads hangs off the store
//! root, so moving any head is a single compare-and-swap of the root.

pub mod commit;
pub mod database;
pub mod error;

pub use commit::{is_commit_ref, Commit, COMMIT_STRUCT, META_STRUCT};
pub use database::{dataset_map, validate_root, Database, Dataset, MAX_ROOT_RETRIES};
pub use error::{DatasError, DatasResult};
