pub use clock::*;
pub use source::*;

mod clock;
mod source;
