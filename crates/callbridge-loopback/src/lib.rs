#![doc = include_str!("../README.md")]

mod callbacks;
mod functions;
mod library;
mod pool;
mod request;
mod worker;

pub use crate::functions::*;
pub use crate::library::*;
