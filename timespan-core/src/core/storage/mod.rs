pub use engine::*;
pub use error::*;
pub use persistence::*;
pub use storage::*;

mod engine;
mod error;
mod persistence;
mod storage;
