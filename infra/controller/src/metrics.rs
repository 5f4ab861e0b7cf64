//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Metrics collection for the Dataset controller

use crate::{ControllerError, ControllerResult};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

pub const RECONCILE_DURATION: &str = "dataset_controller_reconcile_duration_seconds";
pub const RECONCILIATIONS_TOTAL: &str = "dataset_controller_reconciliations_total";
pub const RECONCILIATION_ERRORS_TOTAL: &str = "dataset_controller_reconciliation_errors_total";
pub const SYNC_JOBS_CREATED_TOTAL: &str = "dataset_controller_sync_jobs_created_total";

/// Metrics collection for the controller
#[derive(Clone, Default)]
pub struct Metrics {
    /// Prometheus exposition, present once a recorder is installed
    handle: Option<PrometheusHandle>,
}

impl Metrics {
    /// Metrics without an exporter; recorded values go to whatever recorder is
    /// installed, if any
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Install the global Prometheus recorder
    pub fn install_prometheus() -> ControllerResult<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            ControllerError::ConfigurationError(format!("Failed to install metrics recorder: {e}"))
        })?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Render metrics in the Prometheus text format
    pub fn render(&self) -> String {
        self.handle
            .as_ref()
            .map(PrometheusHandle::render)
            .unwrap_or_default()
    }

    /// Record reconciliation duration
    pub fn record_reconcile_duration(&self, duration: std::time::Duration) {
        metrics::histogram!(RECONCILE_DURATION, duration.as_secs_f64());
    }

    /// Increment reconciliation counter
    pub fn increment_reconciliations(&self) {
        metrics::counter!(RECONCILIATIONS_TOTAL, 1);
    }

    /// Increment reconciliation errors counter
    pub fn increment_reconciliation_errors(&self) {
        metrics::counter!(RECONCILIATION_ERRORS_TOTAL, 1);
    }

    /// Increment sync jobs created counter
    pub fn increment_sync_jobs_created(&self) {
        metrics::counter!(SYNC_JOBS_CREATED_TOTAL, 1);
    }

    /// Time an async reconciliation operation
    pub async fn time_reconciliation_async<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let start = Instant::now();
        let result = f().await;
        self.record_reconcile_duration(start.elapsed());
        result
    }
}
