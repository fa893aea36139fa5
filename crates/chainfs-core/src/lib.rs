pub mod config;
pub mod error;
pub mod types;

pub use error::{ChainError, ChainResult, CipherError, StoreError};
pub use types::Address;
