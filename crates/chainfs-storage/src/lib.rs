//! chainfs-storage: read-only chunk store client over OpenDAL
//!
//! Chunks are opaque encrypted blobs stored at `{prefix}/chunks/{address}`.

pub mod health;
pub mod operator;
pub mod store;

pub use health::check_health;
pub use operator::{build_from_core_config, build_operator, S3Credentials};
pub use store::{ChunkStore, OpendalStore};
