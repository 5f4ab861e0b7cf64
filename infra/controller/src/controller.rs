//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Controller runtime wiring for Dataset resources

use crate::reconcile::{reconcile_dataset, Context, IDLE_REQUEUE};
use crate::{ControllerError, ControllerResult, Dataset};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim};
use kube::api::Api;
use kube::runtime::controller::{Action, Controller as Runtime};
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

/// Controller for managing Dataset resources
pub struct Controller {
    client: Client,
    ctx: Arc<Context>,
    last_event: Arc<RwLock<DateTime<Utc>>>,
}

impl Controller {
    /// Create a new controller instance
    pub fn new(client: Client, ctx: Context, last_event: Arc<RwLock<DateTime<Utc>>>) -> Self {
        Self {
            client,
            ctx: Arc::new(ctx),
            last_event,
        }
    }

    /// Run the controller until a shutdown signal arrives
    pub async fn run(self) -> ControllerResult<()> {
        info!("Starting Dataset controller");

        let datasets = Api::<Dataset>::all(self.client.clone());
        datasets
            .list(&Default::default())
            .await
            .map_err(|e| ControllerError::ConfigurationError(format!("Dataset CRD is not queryable: {e}")))?;

        let last_event = self.last_event.clone();
        Runtime::new(datasets, watcher::Config::default())
            .owns(Api::<Job>::all(self.client.clone()), watcher::Config::default())
            .owns(Api::<ConfigMap>::all(self.client.clone()), watcher::Config::default())
            .owns(
                Api::<PersistentVolumeClaim>::all(self.client.clone()),
                watcher::Config::default(),
            )
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.ctx)
            .for_each(|result| {
                let last_event = last_event.clone();
                async move {
                    match result {
                        Ok((obj, _)) => {
                            *last_event.write().await = Utc::now();
                            info!(dataset = %obj.name, namespace = ?obj.namespace, "reconciled");
                        }
                        Err(e) => warn!(error = %e, "reconcile failed"),
                    }
                }
            })
            .await;

        info!("Dataset controller stopped");
        Ok(())
    }
}

/// Reconcile a Dataset
#[instrument(skip(obj, ctx), fields(dataset = %obj.name_any(), namespace = ?obj.namespace()))]
pub async fn reconcile(obj: Arc<Dataset>, ctx: Arc<Context>) -> ControllerResult<Action> {
    let namespace = obj.namespace().unwrap_or_default();
    let name = obj.name_any();

    let result = ctx
        .metrics
        .time_reconciliation_async(|| reconcile_dataset(&ctx, &namespace, &name))
        .await;

    match &result {
        Ok(_) => ctx.metrics.increment_reconciliations(),
        Err(_) => ctx.metrics.increment_reconciliation_errors(),
    }
    result
}

/// Requeue every failed pass after the idle interval
pub fn error_policy(obj: Arc<Dataset>, err: &ControllerError, _ctx: Arc<Context>) -> Action {
    warn!(dataset = %obj.name_any(), namespace = ?obj.namespace(), error = %err, "reconcile error");
    Action::requeue(IDLE_REQUEUE)
}
