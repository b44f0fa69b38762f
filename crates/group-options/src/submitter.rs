//! Partition submission.
//!
//! [`Submitter`] wraps a [`PartitionService`] with two guarantees:
//! at most one request in flight (a second call fails fast with
//! [`SubmitError::InProgress`] and never reaches the service), and the
//! busy indicator is held for exactly the duration of the call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use selection::busy::BusyTracker;
use selection::error::SubmitError;
use selection::request::PartitionRequest;

use crate::api::{ApiClient, TransportError, PARTITION_PATH};

/// The external grouping algorithm. Its result is opaque to this crate.
#[async_trait]
pub trait PartitionService: Send + Sync {
    async fn submit(&self, request: &PartitionRequest) -> Result<Value, SubmitError>;
}

/// `POST /api/personalityData`.
pub struct HttpPartitionService {
    api: Arc<ApiClient>,
}

impl HttpPartitionService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PartitionService for HttpPartitionService {
    async fn submit(&self, request: &PartitionRequest) -> Result<Value, SubmitError> {
        self.api
            .post_json(PARTITION_PATH, request)
            .await
            .map_err(into_submit_error)
    }
}

fn into_submit_error(err: TransportError) -> SubmitError {
    match err {
        TransportError::Network { message, .. } => SubmitError::Network(message),
        TransportError::Status { status, body, .. } => SubmitError::Server { status, body },
        TransportError::Decode { message, .. } => SubmitError::Malformed(message),
    }
}

/// Holds the in-flight flag until dropped.
struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Non re-entrant front for a [`PartitionService`]. Cheap to clone; clones
/// share the in-flight flag.
#[derive(Clone)]
pub struct Submitter {
    service: Arc<dyn PartitionService>,
    in_flight: Arc<AtomicBool>,
    busy: BusyTracker,
}

impl Submitter {
    pub fn new(service: Arc<dyn PartitionService>, busy: BusyTracker) -> Self {
        Self {
            service,
            in_flight: Arc::new(AtomicBool::new(false)),
            busy,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn submit(&self, request: &PartitionRequest) -> Result<Value, SubmitError> {
        let Some(_slot) = InFlightGuard::try_acquire(&self.in_flight) else {
            warn!(class_id = %request.class_id, "Submission rejected: already in flight");
            return Err(SubmitError::InProgress);
        };
        let _busy = self.busy.acquire("submit");

        info!(
            class_id = %request.class_id,
            group_size = request.group_size,
            paired = request.paired_students.len(),
            separated = request.separated_students.len(),
            "Running partition algorithm"
        );

        let result = self.service.submit(request).await;
        match &result {
            Ok(_) => info!(class_id = %request.class_id, "Partition computed"),
            Err(e) => warn!(class_id = %request.class_id, error = %e, "Partition request failed"),
        }
        result
    }
}
