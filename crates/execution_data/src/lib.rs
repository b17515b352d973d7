//! Content-addressed storage for execution data.
//!
//! Execution data is the full trace of state changes produced by executing a
//! block. It is serialized, split into bounded-size blobs, and stored as a
//! content-addressed tree whose root id doubles as the `execution_data_id`
//! committed on the sealed execution result.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            ExecutionDataService              │
//! │  (codec + chunking + tree traversal + check) │
//! └──────────────────┬───────────────────────────┘
//!                    │
//!             ┌──────▼──────┐
//!             │ BlobService │   content-addressed get/add/delete
//!             │   (trait)   │   (p2p fabric in production)
//!             └──────┬──────┘
//!                    │
//!          ┌─────────▼─────────┐
//!          │  LocalBlobService │  local-only, optional hash-on-read
//!          └─────────┬─────────┘
//!                    │
//!             ┌──────▼──────┐
//!             │  BlobStore  │   RocksDB / in-memory backends
//!             │   (trait)   │
//!             └─────────────┘
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod model;
pub mod service;
pub mod store;
pub mod tree;

pub use error::{BlobStoreError, ExecutionDataError};
pub use model::ExecutionData;
pub use service::{
    BlobIssue, BlobIssueKind, BlobService, CheckReport, ExecutionDataService, LocalBlobService,
};
pub use store::{BlobStore, MemoryBlobStore, RocksDbBlobStore};
pub use tree::{blob_id, MAX_BLOB_SIZE, MAX_TREE_DEPTH};
