mod common;
pub mod tasks;

pub use common::*;
