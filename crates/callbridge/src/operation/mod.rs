mod outcome;
mod pending;

pub use outcome::*;
pub use pending::*;
