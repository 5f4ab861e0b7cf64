//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Kubernetes controller for Dataset resources
//!
//! A Dataset describes a data source (object store, repository, model hub,
//! existing claim, network share or another Dataset) and the rounds in which
//! its content is synced onto a persistent volume. The controller provisions
//! the volume, runs one sync job per round and reports progress on the
//! Dataset status.

pub mod conditions;
pub mod config;
pub mod controller;
pub mod crd;
pub mod dataset;
pub mod error;
pub mod metrics;
pub mod names;
pub mod reconcile;
pub mod source;
pub mod store;

/// Re-export main components
pub use config::{ControllerConfig, JobTemplate};
pub use controller::Controller;
pub use dataset::{Dataset, DatasetPhase, DatasetSpec, DatasetStatus, DatasetType};
pub use error::ControllerError;
pub use metrics::Metrics;
pub use reconcile::{reconcile_dataset, Context};
pub use store::{ClusterStore, KubeStore};

/// Result type for controller operations
pub type ControllerResult<T> = Result<T, ControllerError>;
