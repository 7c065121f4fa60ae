mod call;
mod cancel;
mod facade;
mod stream;

pub use call::*;
pub(crate) use cancel::*;
pub use facade::*;
pub use stream::*;
