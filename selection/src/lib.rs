//! Selection core for the class grouping options page.
//!
//! Deterministic, I/O-free building blocks:
//!
//! - [`options`]: cascade levels, endpoint record schemas, normalization
//! - [`cascade`]: teacher → class → student pool selection with epoch guards
//! - [`constraints`]: paired / separated student affiliations
//! - [`request`]: partition request assembly and validation
//! - [`busy`]: scoped, reference-counted busy indicator
//! - [`events`]: session events and the broadcast bus that carries them
//!
//! Network access lives in the `group-options` crate, which feeds fetch
//! outcomes back into these types.

pub mod busy;
pub mod cascade;
pub mod constraints;
pub mod error;
pub mod events;
pub mod options;
pub mod request;

pub use busy::{BusyGuard, BusyTracker};
pub use cascade::{CascadeTransition, FetchTicket, LevelPhase, Resolution, SelectionCascade};
pub use constraints::{ConstraintAggregator, ConstraintKind, ConstraintSet, StudentPair};
pub use error::{CascadeError, ResolveError, SubmitError, ValidationError};
pub use events::{EventBus, EventFilter, SessionEvent, SharedEventBus};
pub use options::{Level, OptionEntry};
pub use request::{PartitionRequest, DEFAULT_GROUP_SIZE, MAX_GROUP_SIZE, MIN_GROUP_SIZE};
