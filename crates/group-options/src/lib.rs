//! Options-page client for class grouping.
//!
//! Drives the teacher → class → roster selection against the school API,
//! collects pairing/separation constraints and submits a partition request
//! to the grouping service.
//!
//! - [`config`]: file + environment configuration
//! - [`api`]: JSON-over-HTTP client and endpoint paths
//! - [`resolver`]: per-level option fetching ([`resolver::RemoteResolver`])
//! - [`submitter`]: non re-entrant partition submission
//! - [`session`]: the coordinator that owns all page state
//! - [`telemetry`]: tracing setup
//!
//! The deterministic state machines live in the `selection` crate.

pub mod api;
pub mod config;
pub mod resolver;
pub mod session;
pub mod submitter;
pub mod telemetry;

pub use config::ClientConfig;
pub use resolver::{HttpResolver, RemoteResolver};
pub use session::{OptionsSession, PartitionConsumer, SessionError, SessionMessage};
pub use submitter::{HttpPartitionService, PartitionService, Submitter};
