//! SPOTHEAT — spot-price driven heat pump controller
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod price;
pub mod storage;
pub mod device;
pub mod engine;
pub mod dashboard;
