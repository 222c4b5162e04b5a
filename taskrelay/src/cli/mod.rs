mod simulated;
mod tasks;
mod utils;

pub use simulated::*;
pub use tasks::*;
