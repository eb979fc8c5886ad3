//! Shared domain types for the job board server and its sync client.

pub mod board;
pub mod models;
pub mod protocol;
pub mod validate;

pub use board::{BoardError, Location, project};
pub use models::{Column, Dashboard, JobRecord, Task};
pub use validate::ValidationError;
