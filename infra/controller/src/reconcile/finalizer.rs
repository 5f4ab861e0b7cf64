//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Cleanup finalizer management

use super::Context;
use crate::dataset::Dataset;
use crate::names::DATASET_FINALIZER;
use crate::ControllerResult;
use kube::ResourceExt;
use tracing::debug;

/// Add the cleanup finalizer, or clear all finalizers once the Dataset is
/// being deleted and dependent cleanup has run.
pub async fn reconcile_finalizer(ctx: &Context, ds: &mut Dataset) -> ControllerResult<()> {
    if ds.is_deleted() {
        ds.metadata.finalizers = None;
    } else if ds.finalizers().iter().any(|f| f == DATASET_FINALIZER) {
        return Ok(());
    } else {
        ds.finalizers_mut().push(DATASET_FINALIZER.to_string());
    }

    match ctx.store.update_dataset(ds).await {
        Ok(updated) => {
            debug!(dataset = %ds.name_any(), finalizers = ?updated.metadata.finalizers, "updated finalizers");
            ds.metadata = updated.metadata;
            Ok(())
        }
        // the store purged the object as soon as the last finalizer went away
        Err(e) if e.is_not_found() && ds.is_deleted() => Ok(()),
        Err(e) => Err(e),
    }
}
