//! State-change events for the options session.
//!
//! The session coordinator is the only publisher. UI layers and tests
//! subscribe and observe a deterministic, totally ordered stream:
//!
//! ```text
//! ┌──────────────┐  publish   ┌──────────────┐  recv   ┌──────────────┐
//! │   Session    │──────────▶│  Event Bus   │───────▶│  Subscribers │
//! │ (coordinator)│           │  (broadcast) │        │  (UI, tests) │
//! └──────────────┘           └──────────────┘        └──────────────┘
//! ```

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventFilter, FilteredReceiver, SharedEventBus};
pub use types::SessionEvent;
