//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Authorizes cross-namespace references to a shared Dataset

use super::Context;
use crate::dataset::{Dataset, DatasetType};
use crate::source::SourceUri;
use crate::{ControllerError, ControllerResult};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::core::{Selector, SelectorExt};
use kube::ResourceExt;
use std::collections::BTreeMap;

/// Fetch the Dataset a reference-type Dataset points at
pub(crate) async fn source_dataset(ctx: &Context, ds: &Dataset) -> ControllerResult<Dataset> {
    let (namespace, name) = match SourceUri::parse(&ds.spec.source)? {
        SourceUri::Reference { namespace, name } => (namespace, name),
        _ => {
            return Err(ControllerError::InvalidState(format!(
                "dataset {} is not a reference",
                ds.name_any()
            )))
        }
    };
    ctx.store.get_dataset(&namespace, &name).await.map_err(|e| {
        ControllerError::InvalidState(format!(
            "fetch source dataset {} error: {}",
            ds.spec.source.uri, e
        ))
    })
}

/// Fails unless the referenced Dataset is shared with this Dataset's namespace
pub async fn reconcile_sharing(ctx: &Context, ds: &mut Dataset) -> ControllerResult<()> {
    if ds.source_type() != DatasetType::Reference {
        return Ok(());
    }

    let source = source_dataset(ctx, ds).await?;
    if !source.spec.share {
        return Err(ControllerError::ValidationError(format!(
            "source dataset {} is not shared",
            ds.spec.source.uri
        )));
    }

    if let Some(selector) = &source.spec.share_to_namespace_selector {
        let namespace = ds.namespace_or_default();
        let current = ctx.store.get_namespace(&namespace).await.map_err(|e| {
            ControllerError::InvalidState(format!(
                "fetch current namespace {namespace} error: {e}"
            ))
        })?;
        if !selector_matches(selector, current.labels())? {
            return Err(ControllerError::ValidationError(format!(
                "source dataset {} is not shared to current namespace",
                ds.spec.source.uri
            )));
        }
    }

    Ok(())
}

/// Evaluate a label selector; an empty selector matches everything
pub fn selector_matches(
    selector: &LabelSelector,
    labels: &BTreeMap<String, String>,
) -> ControllerResult<bool> {
    let selector = Selector::try_from(selector.clone()).map_err(|e| {
        ControllerError::ValidationError(format!(
            "parse share to namespace selector error: {e}"
        ))
    })?;
    Ok(selector.matches(labels))
}
