pub use error::*;
pub use metadata::*;
pub use timespan::*;

mod error;
mod metadata;
mod timespan;
