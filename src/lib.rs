pub mod config;
pub mod error;
pub mod http;
pub mod monitor;
pub mod mqtt;
pub mod persistence;
pub mod reading;
pub mod stats;

#[cfg(test)]
pub mod test_support;
