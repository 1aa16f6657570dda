pub mod amount;
pub mod config;
pub mod error;
pub mod http;
pub mod log;
pub mod tron;
