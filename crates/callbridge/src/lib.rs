mod bridge;
mod dispatch;
mod error;
mod id;
mod native;
mod operation;
mod registry;
mod timeout;

pub use crate::bridge::*;
pub use crate::dispatch::*;
pub use crate::error::*;
pub use crate::id::*;
pub use crate::native::*;
pub use crate::operation::*;
pub use crate::registry::*;
pub use crate::timeout::*;
