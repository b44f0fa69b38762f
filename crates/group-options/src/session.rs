//! Options-page session: the single coordinator for cascade, constraints
//! and submission.
//!
//! ## Message flow
//!
//! ```text
//! select(level, id)
//!   → cascade.select()            # synchronous invalidation below `level`
//!   → spawn resolver task         # busy from dispatch until it reports back
//!        └─ SessionMessage::Resolved ──▶ mpsc ──▶ next_message()
//!                                                   → cascade.on_resolved()
//!                                                   → SessionEvent on the bus
//! ```
//!
//! All state mutation happens on the caller's task, one message at a time,
//! in arrival order. Resolver tasks never touch session state; a stale
//! result is dropped by the cascade's epoch check when its message is
//! applied.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use selection::busy::{BusyGuard, BusyTracker};
use selection::cascade::{FetchTicket, Resolution, SelectionCascade};
use selection::constraints::{ConstraintAggregator, ConstraintKind, StudentPair};
use selection::error::{CascadeError, ResolveError, SubmitError, ValidationError};
use selection::events::{EventBus, SessionEvent, SharedEventBus};
use selection::options::{Level, OptionEntry};
use selection::request::{self, DEFAULT_GROUP_SIZE};

use crate::resolver::RemoteResolver;
use crate::submitter::{PartitionService, Submitter};

/// Downstream hand-off for a computed partition (the results page).
pub trait PartitionConsumer: Send {
    /// Called exactly once per successful submission.
    fn on_partition_computed(&mut self, result: Value);
}

/// Result of a resolver task, delivered back to the session.
#[derive(Debug)]
pub enum SessionMessage {
    Resolved {
        level: Level,
        epoch: u64,
        result: Result<Vec<OptionEntry>, ResolveError>,
    },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Cascade(#[from] CascadeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Submit(#[from] SubmitError),
}

impl SessionError {
    /// Whether repeating the same action may succeed without other input.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Submit(e) => e.is_retriable(),
            Self::Cascade(_) | Self::Validation(_) => false,
        }
    }
}

/// Reports one dispatched fetch back to the session.
///
/// Holds the busy guard from dispatch until the result is sent. If the
/// resolver task dies before sending, `Drop` reports a network error so
/// the level leaves `Loading` and `settle` still returns.
struct FetchReply {
    tx: mpsc::UnboundedSender<SessionMessage>,
    level: Level,
    epoch: u64,
    busy: Option<BusyGuard>,
    delivered: bool,
}

impl FetchReply {
    fn send(mut self, result: Result<Vec<OptionEntry>, ResolveError>) {
        self.deliver(result);
    }

    fn deliver(&mut self, result: Result<Vec<OptionEntry>, ResolveError>) {
        if self.delivered {
            return;
        }
        self.delivered = true;
        drop(self.busy.take());

        let message = SessionMessage::Resolved {
            level: self.level,
            epoch: self.epoch,
            result,
        };
        if self.tx.send(message).is_err() {
            debug!(level = %self.level, "Session dropped before options arrived");
        }
    }
}

impl Drop for FetchReply {
    fn drop(&mut self) {
        if !self.delivered {
            warn!(level = %self.level, epoch = self.epoch, "Resolver task ended without a result");
            self.deliver(Err(ResolveError::Network("resolver task aborted".into())));
        }
    }
}

pub struct OptionsSession {
    cascade: SelectionCascade,
    constraints: ConstraintAggregator,
    group_size_input: String,
    default_group_size: u8,
    resolver: Arc<dyn RemoteResolver>,
    submitter: Submitter,
    consumer: Box<dyn PartitionConsumer>,
    busy: BusyTracker,
    events: SharedEventBus,
    tx: mpsc::UnboundedSender<SessionMessage>,
    rx: mpsc::UnboundedReceiver<SessionMessage>,
    /// Resolver tasks whose message has not been applied yet, stale or not.
    outstanding: usize,
}

impl OptionsSession {
    pub fn new(
        resolver: Arc<dyn RemoteResolver>,
        service: Arc<dyn PartitionService>,
        consumer: Box<dyn PartitionConsumer>,
    ) -> Self {
        let busy = BusyTracker::new();
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            cascade: SelectionCascade::new(),
            constraints: ConstraintAggregator::new(),
            group_size_input: DEFAULT_GROUP_SIZE.to_string(),
            default_group_size: DEFAULT_GROUP_SIZE,
            resolver,
            submitter: Submitter::new(service, busy.clone()),
            consumer,
            busy,
            events: EventBus::new().shared(),
            tx,
            rx,
            outstanding: 0,
        }
    }

    /// Start the group-size input at `size` instead of the built-in default.
    pub fn with_default_group_size(mut self, size: u8) -> Self {
        self.default_group_size = size;
        self.group_size_input = size.to_string();
        self
    }

    /// Publish events on an existing bus.
    pub fn with_event_bus(mut self, events: SharedEventBus) -> Self {
        self.events = events;
        self
    }

    // ── Cascade ─────────────────────────────────────────────────────────────

    /// Fetch the teacher list (initial load, or retry after a failure).
    pub fn load_teachers(&mut self) -> Result<(), SessionError> {
        self.retry(Level::Teacher)
    }

    /// Re-issue the fetch for `level` using its parent's current selection.
    pub fn retry(&mut self, level: Level) -> Result<(), SessionError> {
        let ticket = self.cascade.reload(level)?;
        self.spawn_fetch(ticket);
        Ok(())
    }

    pub fn select_teacher(&mut self, teacher_id: &str) -> Result<(), SessionError> {
        self.select(Level::Teacher, teacher_id)
    }

    pub fn select_class(&mut self, class_id: &str) -> Result<(), SessionError> {
        self.select(Level::Class, class_id)
    }

    /// Select `id` at `level`. Everything below is invalidated at once and
    /// the direct child's options start loading.
    pub fn select(&mut self, level: Level, id: &str) -> Result<(), SessionError> {
        let ticket = self.cascade.select(level, id)?;
        self.publish(SessionEvent::LevelSelected {
            level,
            id: id.to_string(),
            timestamp: Utc::now(),
        });

        match level {
            Level::Teacher => {
                if self.constraints.class_id().is_some() {
                    self.constraints.unscope();
                    self.publish(SessionEvent::ConstraintsReset {
                        class_id: None,
                        timestamp: Utc::now(),
                    });
                }
            }
            Level::Class => {
                if self.constraints.scope_to(id) {
                    self.publish(SessionEvent::ConstraintsReset {
                        class_id: Some(id.to_string()),
                        timestamp: Utc::now(),
                    });
                }
            }
            Level::StudentPool => {}
        }

        if let Some(ticket) = ticket {
            self.spawn_fetch(ticket);
        }
        Ok(())
    }

    /// Apply the next resolver result, waiting for one if necessary.
    ///
    /// Returns `None` once no resolver task is outstanding.
    pub async fn next_message(&mut self) -> Option<Resolution> {
        if self.outstanding == 0 {
            return None;
        }
        let message = self.rx.recv().await?;
        Some(self.apply(message))
    }

    /// Apply messages until every outstanding resolver task has reported.
    pub async fn settle(&mut self) {
        while self.next_message().await.is_some() {}
    }

    /// Apply a message. Exposed for callers driving their own receive loop.
    pub fn apply(&mut self, message: SessionMessage) -> Resolution {
        let SessionMessage::Resolved {
            level,
            epoch,
            result,
        } = message;
        self.outstanding = self.outstanding.saturating_sub(1);

        let resolution = self.cascade.on_resolved(level, epoch, result);
        let event = match &resolution {
            Resolution::Applied { level, count } => SessionEvent::OptionsLoaded {
                level: *level,
                count: *count,
                timestamp: Utc::now(),
            },
            Resolution::Failed { level, error } => {
                warn!(%level, error = %error, "Failed to load options");
                SessionEvent::OptionsFailed {
                    level: *level,
                    error: error.clone(),
                    timestamp: Utc::now(),
                }
            }
            Resolution::Discarded {
                level,
                epoch,
                current,
            } => SessionEvent::StaleResultDiscarded {
                level: *level,
                epoch: *epoch,
                current: *current,
                timestamp: Utc::now(),
            },
        };
        self.publish(event);
        resolution
    }

    fn spawn_fetch(&mut self, ticket: FetchTicket) {
        self.publish(SessionEvent::OptionsRequested {
            level: ticket.level,
            parent_id: ticket.parent_id.clone(),
            epoch: ticket.epoch,
            timestamp: Utc::now(),
        });
        self.outstanding += 1;

        let reply = FetchReply {
            tx: self.tx.clone(),
            level: ticket.level,
            epoch: ticket.epoch,
            busy: Some(self.busy.acquire("resolve")),
            delivered: false,
        };
        let resolver = Arc::clone(&self.resolver);
        tokio::spawn(async move {
            let result = resolver
                .resolve(ticket.level, ticket.parent_id.as_deref())
                .await;
            reply.send(result);
        });
    }

    // ── Constraints ─────────────────────────────────────────────────────────

    /// Pair or separate two students of the selected class.
    pub fn add_pair(
        &mut self,
        kind: ConstraintKind,
        a: &str,
        b: &str,
    ) -> Result<(), SessionError> {
        if self.cascade.selected(Level::Class).is_none() {
            return Err(ValidationError::MissingClass.into());
        }
        if self.constraints.add_pair(kind, a, b)? {
            self.publish(SessionEvent::ConstraintChanged {
                kind,
                pair: StudentPair::new(a, b)?,
                added: true,
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    pub fn remove_pair(&mut self, kind: ConstraintKind, a: &str, b: &str) {
        if !self.constraints.remove_pair(kind, a, b) {
            return;
        }
        if let Ok(pair) = StudentPair::new(a, b) {
            self.publish(SessionEvent::ConstraintChanged {
                kind,
                pair,
                added: false,
                timestamp: Utc::now(),
            });
        }
    }

    /// Open or close the affiliation panel. Edits survive closing.
    pub fn toggle_panel(&mut self) -> bool {
        let open = self.constraints.toggle_visibility();
        self.publish(SessionEvent::PanelToggled {
            open,
            timestamp: Utc::now(),
        });
        open
    }

    // ── Submission ──────────────────────────────────────────────────────────

    pub fn set_group_size_input(&mut self, input: impl Into<String>) {
        self.group_size_input = input.into();
    }

    /// Validate, submit once, and hand the result to the consumer.
    ///
    /// On success the page-level state (constraints, panel, group size) is
    /// discarded. On any failure every piece of state is left as it was.
    pub async fn generate(&mut self) -> Result<(), SessionError> {
        let request =
            match request::build(&self.cascade, &self.constraints, &self.group_size_input) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "Partition request rejected locally");
                    self.publish(SessionEvent::ValidationFailed {
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    return Err(e.into());
                }
            };

        self.publish(SessionEvent::SubmissionStarted {
            class_id: request.class_id.clone(),
            group_size: request.group_size,
            timestamp: Utc::now(),
        });

        match self.submitter.submit(&request).await {
            Ok(result) => {
                self.consumer.on_partition_computed(result);
                self.publish(SessionEvent::PartitionComputed {
                    class_id: request.class_id,
                    timestamp: Utc::now(),
                });
                self.leave_page();
                Ok(())
            }
            Err(e) => {
                self.publish(SessionEvent::SubmissionFailed {
                    error: e.to_string(),
                    retriable: e.is_retriable(),
                    timestamp: Utc::now(),
                });
                Err(e.into())
            }
        }
    }

    fn leave_page(&mut self) {
        info!("Leaving options page");
        if !self.constraints.set().is_empty() {
            self.constraints.reset();
            self.publish(SessionEvent::ConstraintsReset {
                class_id: self.constraints.class_id().map(String::from),
                timestamp: Utc::now(),
            });
        }
        self.constraints.close_panel();
        self.group_size_input = self.default_group_size.to_string();
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn cascade(&self) -> &SelectionCascade {
        &self.cascade
    }

    pub fn constraints(&self) -> &ConstraintAggregator {
        &self.constraints
    }

    pub fn group_size_input(&self) -> &str {
        &self.group_size_input
    }

    pub fn busy(&self) -> &BusyTracker {
        &self.busy
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    /// A handle sharing this session's in-flight guard.
    pub fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }

    pub fn outstanding_fetches(&self) -> usize {
        self.outstanding
    }

    fn publish(&self, event: SessionEvent) {
        self.events.publish(event);
    }
}
