pub mod client;
pub mod config;
pub mod dashboard;
pub mod errors;
pub mod logging;
