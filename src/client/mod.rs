//! Board client: an optimistic local mirror of the dashboard kept in step
//! with the server.
//!
//! | Module       | Responsibility                                          |
//! |--------------|---------------------------------------------------------|
//! | `transport`  | `SyncTransport` trait, `HttpTransport` over reqwest     |
//! | `controller` | `ReconciliationController`: apply, call, reconcile      |

pub mod controller;
pub mod transport;

pub use controller::{FailurePolicy, ReconciliationController, SyncEvent, SyncOutcome};
pub use transport::{HttpTransport, SyncTransport, TransportError};
