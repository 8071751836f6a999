//! The contract a remote management API has to offer the reconciler.
//!
//! Transport and authentication live behind [`ResourceApi`]; the reconciler only
//! needs the four calls below and a way to tell "not found" apart from every
//! other failure.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("the remote resource was not found")]
    NotFound,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Error payload reported by the API when a long-running operation ends in failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Json::is_null")]
    pub details: Json,
}

impl Diagnostic {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into(), details: Json::Null }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if !self.details.is_null() {
            write!(f, " ({})", self.details)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationStatus {
    InProgress { retry_after: Option<Duration> },
    Succeeded(Option<Json>),
    Failed(Diagnostic),
}

/// One asynchronous remote mutation, observed through its status endpoint.
#[async_trait]
pub trait Operation: Send {
    async fn poll(&mut self) -> Result<OperationStatus, ApiError>;
}

pub struct OperationHandle {
    description: String,
    operation: Box<dyn Operation>,
}

impl OperationHandle {
    pub fn new(description: impl Into<String>, operation: impl Operation + 'static) -> Self {
        Self { description: description.into(), operation: Box::new(operation) }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub(crate) async fn poll(&mut self) -> Result<OperationStatus, ApiError> {
        self.operation.poll().await
    }
}

impl fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationHandle").field("description", &self.description).finish_non_exhaustive()
    }
}

/// What a mutating call hands back: either the finished result or a handle to wait on.
#[derive(Debug)]
pub enum Submitted {
    Done(Option<Json>),
    Pending(OperationHandle),
}

#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// PUT: creates the resource or replaces it wholesale.
    async fn create_or_update(&self, resource_group: &str, name: &str, body: Json) -> Result<Submitted, ApiError>;

    /// PATCH: changes only the properties present in `body`.
    async fn update(&self, resource_group: &str, name: &str, body: Json) -> Result<Submitted, ApiError>;

    async fn get(&self, resource_group: &str, name: &str) -> Result<Json, ApiError>;

    async fn delete(&self, resource_group: &str, name: &str) -> Result<Submitted, ApiError>;
}
