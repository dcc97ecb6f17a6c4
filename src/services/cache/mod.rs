pub mod client;
pub mod valkey;

#[cfg(test)]
pub(crate) mod fake;

pub use client::{CacheClient, CacheError, CacheResult};
pub use valkey::ValkeyClient;
