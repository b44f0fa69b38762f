//! Remote option resolution for one cascade level.
//!
//! | Level         | Endpoint                     | Parent id  |
//! |---------------|------------------------------|------------|
//! | `Teacher`     | `GET /api/cims/teacherIDs`   | ignored    |
//! | `Class`       | `POST /api/cims/classes`     | teacher id |
//! | `StudentPool` | `POST /api/cims/students`    | class id   |
//!
//! Resolvers fetch and normalize only. Applying a result to the cascade is
//! the session's job.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use selection::error::ResolveError;
use selection::options::{self, Level, OptionEntry};

use crate::api::{ApiClient, TransportError, CLASSES_PATH, STUDENTS_PATH, TEACHERS_PATH};

#[async_trait]
pub trait RemoteResolver: Send + Sync {
    async fn resolve(
        &self,
        level: Level,
        parent_id: Option<&str>,
    ) -> Result<Vec<OptionEntry>, ResolveError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassesQuery<'a> {
    teacher_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StudentsQuery<'a> {
    class_id: &'a str,
}

/// Resolver backed by the school information system endpoints.
pub struct HttpResolver {
    api: Arc<ApiClient>,
}

impl HttpResolver {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl RemoteResolver for HttpResolver {
    async fn resolve(
        &self,
        level: Level,
        parent_id: Option<&str>,
    ) -> Result<Vec<OptionEntry>, ResolveError> {
        let body = match level {
            Level::Teacher => self.api.get_json(TEACHERS_PATH).await,
            Level::Class => {
                let teacher_id = parent_id.ok_or(ResolveError::MissingParent(level))?;
                self.api
                    .post_json(CLASSES_PATH, &ClassesQuery { teacher_id })
                    .await
            }
            Level::StudentPool => {
                let class_id = parent_id.ok_or(ResolveError::MissingParent(level))?;
                self.api
                    .post_json(STUDENTS_PATH, &StudentsQuery { class_id })
                    .await
            }
        }
        .map_err(into_resolve_error)?;

        let entries = options::normalize(level, body)?;
        debug!(
            %level,
            parent_id = parent_id.unwrap_or("-"),
            count = entries.len(),
            "Options resolved"
        );
        Ok(entries)
    }
}

fn into_resolve_error(err: TransportError) -> ResolveError {
    match err {
        TransportError::Network { .. } | TransportError::Status { .. } => {
            ResolveError::Network(err.to_string())
        }
        TransportError::Decode { .. } => ResolveError::Malformed(err.to_string()),
    }
}
