//! Leasehold — sandbox account lease lifecycle orchestration.
//!
//! Tracks a pool of temporary-use cloud sandbox accounts and the leases
//! that hand them to users, enforcing budget/duration policy from a
//! versioned global configuration. Every multi-step lifecycle operation
//! runs on an in-process compensating-action saga so that state spanning
//! the record store, the identity service, and the account directory
//! either fully commits or rolls back.
//!
//! The hosting layer (HTTP handlers, event triggers) lives elsewhere and
//! talks to [`orchestrator::Orchestrator`]; the collaborator backends plug
//! in behind the traits in [`store`] and [`services`].

pub mod cache;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod models;
pub mod orchestrator;
pub mod saga;
pub mod services;
pub mod store;

pub use errors::{Error, Result};
pub use orchestrator::Orchestrator;
