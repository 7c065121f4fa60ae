mod allocator;
mod correlation;

pub use allocator::*;
pub use correlation::*;
