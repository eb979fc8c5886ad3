//! Dashboard server: the sync protocol over the job record store.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Board   │ ───────> │  server.rs  (router assembly, static frontend)   │
//! │  client  │ <─────── │    ├─ auth.rs  (CurrentUser, IdentityProvider)   │
//! └──────────┘   JSON   │    └─ api.rs   (sync endpoints, AppState)        │
//!                       │         │                                        │
//!                       │         │ DbHandle::call() on a blocking thread  │
//!                       │         v                                        │
//!                       │  db.rs  (JobDb: jobs, users, sessions)           │
//!                       │         │                                        │
//!                       │         │ board::project(records)                │
//!                       │         v                                        │
//!                       │  jobboard_common  (Dashboard, Task, Column)      │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Typical Request Flow (drag a card to "Interview")
//!
//! 1. `POST /dashboard/update` with `{taskId, sourceCol, destCol, destIndex}`
//! 2. `CurrentUser` resolves the session cookie or bearer token to an owner,
//!    or the request ends with 401.
//! 3. `api::relocate()` validates `destCol`, then `JobDb::move_job()` sets
//!    the status and renumbers both columns inside one transaction. A task
//!    the caller does not own is indistinguishable from a missing one (404).
//! 4. The next `GET /dashboard` re-projects every record of the owner, so
//!    the card appears in exactly one column at the stored position.

pub mod api;
pub mod auth;
pub mod db;
pub mod server;
