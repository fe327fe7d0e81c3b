pub mod codec;
pub mod config;
pub mod error;
pub mod handle;
pub mod persistence;
pub mod storage;
pub mod types;

pub use config::*;
pub use error::*;
pub use handle::*;
pub use persistence::*;
pub use storage::*;
pub use types::*;
