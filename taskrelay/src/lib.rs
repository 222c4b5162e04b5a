pub mod chain;
pub mod cli;
pub mod config;
pub mod relay;
pub mod rpc;
pub mod simulate;
pub mod store;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;
