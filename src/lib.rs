pub mod logging;
pub mod constants;
pub mod error;
pub mod session;
pub mod client;
pub mod actions;
pub mod weighted;
pub mod scenario;
pub mod config;
pub mod loadtest;
pub mod report;
pub mod mock;
