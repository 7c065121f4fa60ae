mod deliver;
mod entry;
mod registration;
mod status;

pub(crate) use entry::process_registry;
pub(crate) use registration::*;
pub use status::*;
