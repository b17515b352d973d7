#![forbid(unsafe_code)]
#![deny(trivial_casts, trivial_numeric_casts)]

pub mod aliases;
pub mod height;
pub mod requester_config;
pub mod sealed;

pub use aliases::{BlobId, BlockId, ExecutionDataId};
pub use height::Height;
pub use requester_config::RequesterConfig;
pub use sealed::SealedBlock;
