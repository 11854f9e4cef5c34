pub use accumulator::*;
pub use error::*;
pub use unit::*;
pub use value::*;

mod accumulator;
mod error;
mod unit;
mod value;
