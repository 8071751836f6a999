use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::api::{ApiError, Diagnostic};
use crate::id::MalformedIdError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action { Create, Read, Update, Delete, Import }

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Create => "creating",
            Action::Read => "reading",
            Action::Update => "updating",
            Action::Delete => "deleting",
            Action::Import => "importing",
        })
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid value for `{attribute}`: {reason}")]
    Validation { attribute: String, reason: String },

    #[error(transparent)]
    MalformedId(#[from] MalformedIdError),

    #[error("cannot map `{attribute}` from the remote representation: {reason}")]
    Mapping { attribute: String, reason: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("the remote resource was not found")]
    NotFound,

    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("long-running operation failed: {0}")]
    OperationFailed(Diagnostic),

    #[error("operation was cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("the remote resource carries no id")]
    MissingId,

    #[error("error {action} {kind} {name:?} (resource group {resource_group:?}): {source}")]
    Context {
        kind: &'static str,
        action: Action,
        name: String,
        resource_group: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn validation(attribute: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation { attribute: attribute.into(), reason: reason.into() }
    }

    pub fn mapping(attribute: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Mapping { attribute: attribute.into(), reason: reason.into() }
    }

    /// Folds resource coordinates into the message, keeping the original error as the source.
    pub fn context(self, kind: &'static str, action: Action, name: &str, resource_group: &str) -> Self {
        Error::Context {
            kind,
            action,
            name: name.to_owned(),
            resource_group: resource_group.to_owned(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through any `Context` layers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::NotFound)
    }
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::NotFound => Error::NotFound,
            ApiError::Transport(reason) => Error::Transport(reason),
            ApiError::Rejected { status, message } => Error::Rejected { status, message },
        }
    }
}
