//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Reconciliation of a single Dataset
//!
//! A pass loads the Dataset, runs an ordered chain of sub-reconcilers against
//! a working copy, derives the phase and writes the status back only when it
//! changed. Each sub-reconciler owns a disjoint set of status fields.

pub mod environment;
pub mod finalizer;
pub mod history;
pub mod job;
pub mod phase;
pub mod sharing;
pub mod storage;

use crate::conditions::set_condition;
use crate::config::JobTemplate;
use crate::dataset::{Dataset, DatasetPhase};
use crate::store::ClusterStore;
use crate::{ControllerResult, Metrics};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Requeue interval while nothing is in flight
pub const IDLE_REQUEUE: Duration = Duration::from_secs(30);

/// Requeue interval while a sync round is running
pub const PROCESSING_REQUEUE: Duration = Duration::from_secs(5);

/// Shared state handed to every reconciliation pass
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn ClusterStore>,
    pub job_template: JobTemplate,
    pub metrics: Arc<Metrics>,
}

impl Context {
    pub fn new(store: Arc<dyn ClusterStore>, job_template: JobTemplate, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            job_template,
            metrics,
        }
    }
}

/// One sub-reconciler of the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Sharing,
    Finalizer,
    Storage,
    EnvironmentConfig,
    SyncJob,
    RoundHistory,
}

const DELETION_STEPS: &[Step] = &[Step::Storage, Step::SyncJob, Step::Finalizer];

const STEPS: &[Step] = &[
    Step::Sharing,
    Step::Finalizer,
    Step::Storage,
    Step::EnvironmentConfig,
    Step::SyncJob,
    Step::RoundHistory,
];

impl Step {
    /// Condition recording the outcome of the step, if any
    pub fn condition(&self) -> Option<&'static str> {
        match self {
            Step::Sharing => Some("Config"),
            Step::Finalizer => None,
            Step::Storage => Some("PVC"),
            Step::EnvironmentConfig => Some("ConfigMap"),
            Step::SyncJob => Some("Job"),
            Step::RoundHistory => Some("JobStatus"),
        }
    }

    /// Steps to run for a Dataset in its current lifecycle state
    pub fn chain(ds: &Dataset) -> &'static [Step] {
        if ds.is_deleted() {
            DELETION_STEPS
        } else {
            STEPS
        }
    }

    async fn run(self, ctx: &Context, ds: &mut Dataset) -> ControllerResult<()> {
        match self {
            Step::Sharing => sharing::reconcile_sharing(ctx, ds).await,
            Step::Finalizer => finalizer::reconcile_finalizer(ctx, ds).await,
            Step::Storage => storage::reconcile_storage(ctx, ds).await,
            Step::EnvironmentConfig => environment::reconcile_environment_config(ctx, ds).await,
            Step::SyncJob => job::reconcile_sync_job(ctx, ds).await,
            Step::RoundHistory => history::reconcile_round_history(ctx, ds).await,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Sharing => "sharing",
            Step::Finalizer => "finalizer",
            Step::Storage => "storage",
            Step::EnvironmentConfig => "environment-config",
            Step::SyncJob => "sync-job",
            Step::RoundHistory => "round-history",
        };
        f.write_str(name)
    }
}

/// When to look at a Dataset again given its phase
pub fn requeue_for(phase: DatasetPhase) -> Action {
    match phase {
        DatasetPhase::Ready | DatasetPhase::Failed => Action::await_change(),
        DatasetPhase::Processing => Action::requeue(PROCESSING_REQUEUE),
        DatasetPhase::Pending => Action::requeue(IDLE_REQUEUE),
    }
}

/// Run one reconciliation pass for the named Dataset
pub async fn reconcile_dataset(ctx: &Context, namespace: &str, name: &str) -> ControllerResult<Action> {
    let mut ds = match ctx.store.get_dataset(namespace, name).await {
        Ok(ds) => ds,
        Err(e) => {
            warn!(dataset = %name, namespace = %namespace, error = %e, "failed to load dataset");
            return Ok(Action::await_change());
        }
    };

    let before = ds.status.clone();
    ds.status_mut();

    for step in Step::chain(&ds) {
        let result = step.run(ctx, &mut ds).await;
        if let Some(type_) = step.condition() {
            set_condition(&mut ds.status_mut().conditions, type_, result.as_ref().map(|_| ()));
        }
        if let Err(e) = result {
            warn!(dataset = %name, namespace = %namespace, step = %step, error = %e, "reconcile step failed");
            break;
        }
    }

    phase::reconcile_phase(&mut ds);
    let phase = ds.status_or_default().phase;

    if ds.status != before {
        match ctx.store.update_dataset_status(&ds).await {
            Ok(_) => debug!(dataset = %ds.name_any(), namespace = %namespace, phase = ?phase, "updated status"),
            Err(e) if e.is_not_found() && ds.is_deleted() => {
                debug!(dataset = %name, namespace = %namespace, "dataset purged before status write")
            }
            Err(e) => return Err(e),
        }
    }

    Ok(requeue_for(phase))
}
