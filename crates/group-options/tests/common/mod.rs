//! In-process fakes shared by the integration tests. No network needed.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use group_options::{PartitionConsumer, RemoteResolver};
use selection::error::ResolveError;
use selection::options::{normalize, Level, OptionEntry};

pub type Reply = Result<Vec<OptionEntry>, ResolveError>;
type Key = (Level, Option<String>);

fn key(level: Level, parent: Option<&str>) -> Key {
    (level, parent.map(String::from))
}

/// Resolver answering from a script.
///
/// `respond` sets a standing reply; `gate` queues a one-off reply the test
/// releases by sending on the returned channel. Gates take priority.
#[derive(Default)]
pub struct FakeResolver {
    standing: Mutex<HashMap<Key, Reply>>,
    gates: Mutex<HashMap<Key, Vec<oneshot::Receiver<Reply>>>>,
    calls: Mutex<Vec<Key>>,
}

impl FakeResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, level: Level, parent: Option<&str>, reply: Reply) {
        self.standing
            .lock()
            .unwrap()
            .insert(key(level, parent), reply);
    }

    pub fn gate(&self, level: Level, parent: Option<&str>) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.gates
            .lock()
            .unwrap()
            .entry(key(level, parent))
            .or_default()
            .push(rx);
        tx
    }

    pub fn calls(&self) -> Vec<Key> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteResolver for FakeResolver {
    async fn resolve(&self, level: Level, parent_id: Option<&str>) -> Reply {
        let key = key(level, parent_id);
        self.calls.lock().unwrap().push(key.clone());

        let gated = self
            .gates
            .lock()
            .unwrap()
            .get_mut(&key)
            .filter(|queue| !queue.is_empty())
            .map(|queue| queue.remove(0));
        if let Some(rx) = gated {
            return rx
                .await
                .unwrap_or_else(|_| Err(ResolveError::Network("gate dropped".into())));
        }

        let standing = self.standing.lock().unwrap().get(&key).cloned();
        standing.unwrap_or_else(|| Err(ResolveError::Network(format!("no reply for {key:?}"))))
    }
}

/// Records every partition handed downstream.
#[derive(Clone, Default)]
pub struct RecordingConsumer {
    pub received: Arc<Mutex<Vec<Value>>>,
}

impl RecordingConsumer {
    pub fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

impl PartitionConsumer for RecordingConsumer {
    fn on_partition_computed(&mut self, result: Value) {
        self.received.lock().unwrap().push(result);
    }
}

pub fn teachers(ids: &[&str]) -> Reply {
    let body: Vec<Value> = ids.iter().map(|id| json!({ "id": id })).collect();
    Ok(normalize(Level::Teacher, Value::Array(body)).unwrap())
}

pub fn classes(ids: &[&str]) -> Reply {
    let body: Vec<Value> = ids
        .iter()
        .map(|id| json!({ "classId": id, "classCode": id.to_uppercase() }))
        .collect();
    Ok(normalize(Level::Class, Value::Array(body)).unwrap())
}

pub fn students(ids: &[&str]) -> Reply {
    let body: Vec<Value> = ids
        .iter()
        .map(|id| json!({ "username": id, "forename": format!("Student {id}") }))
        .collect();
    Ok(normalize(Level::StudentPool, Value::Array(body)).unwrap())
}

pub fn ids(entries: &[OptionEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.id.as_str()).collect()
}
