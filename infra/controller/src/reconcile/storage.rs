//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Storage binding for Datasets
//!
//! Each source type maps onto one [`StorageStrategy`]. A strategy either binds
//! the claim completely on its own (adopted claims) or prepares a
//! [`ClaimPlan`] that the common claim step turns into an owned claim.

use super::sharing::source_dataset;
use super::Context;
use crate::dataset::{Dataset, DatasetType};
use crate::error::OptionalExt;
use crate::names::{
    deletion_grace_elapsed, labelled_for, owned_labels, owner_references, volume_name,
    DATASET_NAME_LABEL,
};
use crate::source::SourceUri;
use crate::{ControllerError, ControllerResult};
use chrono::Utc;
use k8s_openapi::api::core::v1::{
    PersistentVolume, PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{error, info};

pub const DEFAULT_ACCESS_MODE: &str = "ReadWriteMany";
pub const DEFAULT_VOLUME_MODE: &str = "Filesystem";
pub const DEFAULT_STORAGE_REQUEST: &str = "100Ti";
pub const RECLAIM_RETAIN: &str = "Retain";

/// Base volume for network-share Datasets
pub const NFS_VOLUME_TEMPLATE: &str = r#"
apiVersion: v1
kind: PersistentVolume
metadata:
  annotations:
    pv.kubernetes.io/provisioned-by: nfs.csi.k8s.io
spec:
  capacity:
    storage: 100Ti
  accessModes:
    - ReadWriteMany
  persistentVolumeReclaimPolicy: Retain
  storageClassName: nfs-csi
  mountOptions:
    - nfsvers=4.1
  csi:
    driver: nfs.csi.k8s.io
    volumeHandle: ""
"#;

/// How a Dataset obtains its volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStrategy {
    /// Claim created from the Dataset's own template
    Owned,
    /// Pre-existing claim named by a `pvc://` URI
    Adopted,
    /// Volume cloned from a shared Dataset
    Reference,
    /// Volume provisioned for a `nfs://` share
    NetworkShare,
}

/// Input for the common claim step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimPlan {
    pub name: String,
    /// Replaces the template derived spec
    pub spec: Option<PersistentVolumeClaimSpec>,
    pub volume_name: Option<String>,
    pub storage_class: Option<String>,
}

/// Result of a strategy's bind
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Nothing left for the common claim step
    Complete,
    Claim(ClaimPlan),
}

impl StorageStrategy {
    pub fn for_type(type_: DatasetType) -> Self {
        match type_ {
            DatasetType::Pvc => StorageStrategy::Adopted,
            DatasetType::Reference => StorageStrategy::Reference,
            DatasetType::Nfs => StorageStrategy::NetworkShare,
            _ => StorageStrategy::Owned,
        }
    }

    /// Name of the claim backing the Dataset
    pub fn claim_name(&self, ds: &Dataset) -> ControllerResult<String> {
        match self {
            StorageStrategy::Adopted => match SourceUri::parse(&ds.spec.source)? {
                SourceUri::Claim { name, .. } => Ok(name),
                _ => Err(ControllerError::InvalidState(format!(
                    "dataset {} has no claim uri",
                    ds.name_any()
                ))),
            },
            _ => Ok(template_claim_name(ds)),
        }
    }

    pub async fn bind(&self, ctx: &Context, ds: &mut Dataset) -> ControllerResult<Binding> {
        match self {
            StorageStrategy::Owned => Ok(Binding::Claim(ClaimPlan {
                name: self.claim_name(ds)?,
                ..Default::default()
            })),
            StorageStrategy::Adopted => bind_adopted(ctx, ds, self.claim_name(ds)?).await,
            StorageStrategy::Reference => bind_reference(ctx, ds, self.claim_name(ds)?).await,
            StorageStrategy::NetworkShare => bind_network_share(ctx, ds, self.claim_name(ds)?).await,
        }
    }

    pub async fn unbind(&self, ctx: &Context, ds: &Dataset) -> ControllerResult<()> {
        match self {
            // the cloned volume and claim are garbage collected through owner references
            StorageStrategy::Reference => Ok(()),
            StorageStrategy::Adopted => {
                match self.claim_name(ds) {
                    Ok(claim) => release_adopted(ctx, ds, &claim).await,
                    Err(e) => info!(
                        dataset = %ds.name_any(),
                        namespace = %ds.namespace_or_default(),
                        error = %e,
                        "no adopted pvc to release"
                    ),
                }
                Ok(())
            }
            StorageStrategy::NetworkShare => {
                let claim = self.claim_name(ds)?;
                let pv = volume_name(&ds.namespace_or_default(), &claim);
                tolerate_during_deletion(ds, ctx.store.delete_pv(&pv).await, || {
                    format!("delete pv {pv}")
                })?;
                delete_claim(ctx, ds, &claim).await
            }
            StorageStrategy::Owned => delete_claim(ctx, ds, &self.claim_name(ds)?).await,
        }
    }
}

fn template_claim_name(ds: &Dataset) -> String {
    ds.spec
        .volume_claim_template
        .metadata
        .name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| ds.name_any())
}

/// Provision or adopt the volume backing a Dataset, or release it on deletion
pub async fn reconcile_storage(ctx: &Context, ds: &mut Dataset) -> ControllerResult<()> {
    let strategy = StorageStrategy::for_type(ds.source_type());
    if ds.is_deleted() {
        return strategy.unbind(ctx, ds).await;
    }

    match strategy.bind(ctx, ds).await? {
        Binding::Complete => Ok(()),
        Binding::Claim(plan) => ensure_claim(ctx, ds, plan).await,
    }
}

/// Swallow a cleanup error once the deletion grace window has passed
fn tolerate_during_deletion<F>(
    ds: &Dataset,
    result: ControllerResult<()>,
    what: F,
) -> ControllerResult<()>
where
    F: FnOnce() -> String,
{
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) if deletion_grace_elapsed(ds, Utc::now()) => {
            error!(
                dataset = %ds.name_any(),
                namespace = %ds.namespace_or_default(),
                error = %e,
                "{} failed, but force delete",
                what()
            );
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn delete_claim(ctx: &Context, ds: &Dataset, claim: &str) -> ControllerResult<()> {
    let namespace = ds.namespace_or_default();
    tolerate_during_deletion(ds, ctx.store.delete_pvc(&namespace, claim).await, || {
        format!("delete pvc {namespace}/{claim}")
    })
}

async fn bind_adopted(ctx: &Context, ds: &mut Dataset, claim: String) -> ControllerResult<Binding> {
    let namespace = ds.namespace_or_default();
    let name = ds.name_any();
    let mut pvc = ctx.store.get_pvc(&namespace, &claim).await?;

    let owner = pvc.labels().get(DATASET_NAME_LABEL).cloned();
    match owner {
        Some(owner) if owner != name => {
            return Err(ControllerError::OwnershipConflict(format!(
                "pvc {claim} is not belong to dataset {namespace}/{name}"
            )));
        }
        Some(_) => {}
        None => {
            pvc.labels_mut().insert(DATASET_NAME_LABEL.to_string(), name.clone());
            ctx.store.update_pvc(&pvc).await?;
            info!(dataset = %name, namespace = %namespace, pvc = %claim, "adopted existing pvc");
        }
    }

    ds.status_mut().pvc_name = claim;
    Ok(Binding::Complete)
}

/// Best effort removal of the ownership label from an adopted claim
async fn release_adopted(ctx: &Context, ds: &Dataset, claim: &str) {
    let namespace = ds.namespace_or_default();
    let name = ds.name_any();
    let Ok(mut pvc) = ctx.store.get_pvc(&namespace, claim).await else {
        return;
    };
    if !labelled_for(pvc.metadata.labels.as_ref(), &name) {
        return;
    }
    pvc.labels_mut().remove(DATASET_NAME_LABEL);
    if let Err(e) = ctx.store.update_pvc(&pvc).await {
        error!(
            dataset = %name,
            namespace = %namespace,
            pvc = %claim,
            error = %e,
            "failed to release adopted pvc"
        );
    }
}

async fn bind_reference(ctx: &Context, ds: &mut Dataset, claim: String) -> ControllerResult<Binding> {
    let source = source_dataset(ctx, ds).await?;
    let source_namespace = source.namespace_or_default();
    let source_name = source.name_any();
    let source_claim = source.status_or_default().pvc_name;
    if source_claim.is_empty() {
        return Err(ControllerError::InvalidState(format!(
            "source dataset {source_namespace}/{source_name} has no pvc"
        )));
    }

    let pvc = ctx
        .store
        .get_pvc(&source_namespace, &source_claim)
        .await
        .map_err(|e| {
            ControllerError::InvalidState(format!(
                "get pvc {source_namespace}/{source_claim} for source dataset {source_namespace}/{source_name} error: {e}"
            ))
        })?;
    let mut spec = pvc.spec.clone().unwrap_or_default();
    let bound = spec.volume_name.clone().filter(|v| !v.is_empty()).ok_or_else(|| {
        ControllerError::InvalidState(format!("pvc {source_namespace}/{source_claim} has no volume"))
    })?;

    let pv = ctx.store.get_pv(&bound).await.map_err(|e| {
        ControllerError::InvalidState(format!(
            "get pv {bound} for source dataset {source_namespace}/{source_name} error: {e}"
        ))
    })?;

    let clone_name = volume_name(&ds.namespace_or_default(), &ds.name_any());
    if ctx.store.get_pv(&clone_name).await.optional()?.is_none() {
        let clone = clone_volume(&pv, &clone_name, ds);
        ctx.store.create_pv(&clone).await?;
        info!(
            dataset = %ds.name_any(),
            source = %format!("{source_namespace}/{source_name}"),
            pv = %clone_name,
            "cloned source volume"
        );
    }
    spec.volume_name = Some(clone_name);

    let round = ds.spec.data_sync_round;
    let status = ds.status_mut();
    status.last_succeed_round = round;
    status.read_only = true;

    Ok(Binding::Claim(ClaimPlan {
        name: claim,
        spec: Some(spec),
        ..Default::default()
    }))
}

/// Copy of a source volume that the consumer Dataset owns
pub fn clone_volume(source: &PersistentVolume, name: &str, ds: &Dataset) -> PersistentVolume {
    let mut labels = source.labels().clone();
    labels.insert(DATASET_NAME_LABEL.to_string(), ds.name_any());

    let mut spec = source.spec.clone().unwrap_or_default();
    spec.claim_ref = None;
    spec.persistent_volume_reclaim_policy = Some(RECLAIM_RETAIN.to_string());

    PersistentVolume {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            annotations: source.metadata.annotations.clone(),
            owner_references: owner_references(ds),
            ..Default::default()
        },
        spec: Some(spec),
        status: None,
    }
}

async fn bind_network_share(
    ctx: &Context,
    ds: &mut Dataset,
    claim: String,
) -> ControllerResult<Binding> {
    let (host, path) = match SourceUri::parse(&ds.spec.source)? {
        SourceUri::NetworkShare { host, path } => (host, path),
        _ => {
            return Err(ControllerError::InvalidState(format!(
                "dataset {} has no nfs uri",
                ds.name_any()
            )))
        }
    };
    let pv_name = volume_name(&ds.namespace_or_default(), &claim);
    let template = network_share_volume(ds, &pv_name, &claim, &host, &path)?;
    let storage_class = template
        .spec
        .as_ref()
        .and_then(|s| s.storage_class_name.clone());

    match ctx.store.get_pv(&pv_name).await.optional()? {
        Some(existing) => {
            if !labelled_for(existing.metadata.labels.as_ref(), &ds.name_any()) {
                return Err(ControllerError::OwnershipConflict(format!(
                    "pv {pv_name} is not belong to dataset {}/{}",
                    ds.namespace_or_default(),
                    ds.name_any()
                )));
            }
        }
        None => {
            ctx.store.create_pv(&template).await?;
            info!(dataset = %ds.name_any(), pv = %pv_name, server = %host, "provisioned nfs volume");
        }
    }

    let round = ds.spec.data_sync_round;
    ds.status_mut().last_succeed_round = round;

    Ok(Binding::Claim(ClaimPlan {
        name: claim,
        spec: None,
        volume_name: Some(pv_name),
        storage_class,
    }))
}

/// Network-share volume built from [`NFS_VOLUME_TEMPLATE`]
pub fn network_share_volume(
    ds: &Dataset,
    pv_name: &str,
    claim: &str,
    host: &str,
    path: &str,
) -> ControllerResult<PersistentVolume> {
    let mut pv: PersistentVolume = serde_yaml::from_str(NFS_VOLUME_TEMPLATE)?;
    let namespace = ds.namespace_or_default();

    pv.metadata.name = Some(pv_name.to_string());
    pv.metadata.owner_references = owner_references(ds);
    pv.labels_mut()
        .insert(DATASET_NAME_LABEL.to_string(), ds.name_any());

    let spec = pv.spec.get_or_insert_with(Default::default);
    let csi = spec.csi.get_or_insert_with(Default::default);
    let attributes = csi.volume_attributes.get_or_insert_with(BTreeMap::new);
    attributes.insert("server".to_string(), host.to_string());
    attributes.insert("share".to_string(), "/".to_string());
    attributes.insert("subdir".to_string(), path.to_string());
    attributes.insert("onDelete".to_string(), "retain".to_string());
    attributes.insert("csi.storage.k8s.io/pv/name".to_string(), pv_name.to_string());
    attributes.insert("csi.storage.k8s.io/pvc/name".to_string(), claim.to_string());
    attributes.insert("csi.storage.k8s.io/pvc/namespace".to_string(), namespace);
    attributes
        .entry("mountPermissions".to_string())
        .or_insert_with(|| ds.spec.mount_options.mode.clone());
    csi.volume_handle = format!("{host}#{path}#{pv_name}#");

    Ok(pv)
}

/// Claim spec derived from the Dataset's template with defaults filled in
pub fn template_claim_spec(ds: &Dataset, storage_class: Option<&str>) -> PersistentVolumeClaimSpec {
    let mut spec = ds
        .spec
        .volume_claim_template
        .spec
        .clone()
        .unwrap_or_default();

    if spec.access_modes.as_ref().map_or(true, Vec::is_empty) {
        spec.access_modes = Some(vec![DEFAULT_ACCESS_MODE.to_string()]);
    }
    if spec.volume_mode.is_none() {
        spec.volume_mode = Some(DEFAULT_VOLUME_MODE.to_string());
    }
    let resources = spec
        .resources
        .get_or_insert_with(VolumeResourceRequirements::default);
    let requests = resources.requests.get_or_insert_with(BTreeMap::new);
    if requests.get("storage").map_or(true, quantity_is_zero) {
        requests.insert(
            "storage".to_string(),
            Quantity(DEFAULT_STORAGE_REQUEST.to_string()),
        );
    }
    if let Some(class) = storage_class {
        spec.storage_class_name = Some(class.to_string());
    }
    spec
}

/// Whether a quantity denotes zero, e.g. `0`, `0Gi` or `0.0`.
///
/// A value without a parsable numeric prefix (empty, `abc`, `Gi`) also counts
/// as zero, so the claim template falls back to [`DEFAULT_STORAGE_REQUEST`].
pub fn quantity_is_zero(quantity: &Quantity) -> bool {
    let number: String = quantity
        .0
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | '+' | '-'))
        .collect();
    number.parse::<f64>().map(|n| n == 0.0).unwrap_or(true)
}

/// Create the claim described by `plan` or verify the existing one
async fn ensure_claim(ctx: &Context, ds: &mut Dataset, plan: ClaimPlan) -> ControllerResult<()> {
    let namespace = ds.namespace_or_default();
    let name = ds.name_any();
    ds.status_mut().pvc_name = plan.name.clone();

    let existing = ctx.store.get_pvc(&namespace, &plan.name).await.optional()?;
    if let Some(existing) = existing {
        if !labelled_for(existing.metadata.labels.as_ref(), &name) {
            return Err(ControllerError::OwnershipConflict(format!(
                "pvc {} already exists, but not belong to dataset {}",
                plan.name, name
            )));
        }
        return Ok(());
    }

    let mut spec = match plan.spec {
        Some(spec) => spec,
        None => template_claim_spec(ds, plan.storage_class.as_deref()),
    };
    if let Some(volume) = plan.volume_name {
        spec.volume_name = Some(volume);
    }

    let annotations = ds.annotations().clone();
    let pvc = PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(plan.name.clone()),
            namespace: Some(namespace.clone()),
            labels: Some(owned_labels(ds)),
            annotations: (!annotations.is_empty()).then_some(annotations),
            owner_references: owner_references(ds),
            ..Default::default()
        },
        spec: Some(spec),
        status: None,
    };
    ctx.store.create_pvc(&pvc).await?;
    info!(dataset = %name, namespace = %namespace, pvc = %plan.name, "created pvc");
    Ok(())
}
