//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Error types for the Dataset controller

use thiserror::Error;

/// Controller error types
#[derive(Error, Debug)]
pub enum ControllerError {
    /// Kubernetes API error not covered by a more specific variant
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// HTTP server error
    #[error("HTTP server error: {0}")]
    HttpError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Resource already exists
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Write rejected by the optimistic concurrency check
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Dependent object is labelled for another Dataset
    #[error("Ownership conflict: {0}")]
    OwnershipConflict(String),

    /// Invalid resource state
    #[error("Invalid resource state: {0}")]
    InvalidState(String),
}

impl ControllerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ControllerError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ControllerError::AlreadyExists(_))
    }

    /// Map an API error onto the store error taxonomy
    pub fn from_api(err: kube::Error, what: impl Into<String>) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => ControllerError::NotFound(what.into()),
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                ControllerError::AlreadyExists(what.into())
            }
            kube::Error::Api(ae) if ae.code == 409 => {
                ControllerError::Conflict(format!("{}: {}", what.into(), ae.message))
            }
            other => ControllerError::Kube(other),
        }
    }
}

/// Turns a missing object into `None`
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, ControllerError>;
}

impl<T> OptionalExt<T> for Result<T, ControllerError> {
    fn optional(self) -> Result<Option<T>, ControllerError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
