//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Well-known names, labels and paths shared by the sub-reconcilers

use crate::dataset::Dataset;
use chrono::{DateTime, Duration, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Finalizer gating removal of a Dataset until cleanup ran
pub const DATASET_FINALIZER: &str = "dataset-controller";

/// Label binding dependent objects to the Dataset that owns them
pub const DATASET_NAME_LABEL: &str = "baize.io/dataset-name";

/// Directory the credential secret is mounted at inside sync jobs
pub const SECRETS_MOUNT_PATH: &str = "/run/dataset/secrets";

/// Directory the environment config object is mounted at inside sync jobs
pub const CONDA_CONFIG_DIR: &str = "/run/dataset/conda";
pub const CONDA_ENVIRONMENT_YAML_FILENAME: &str = "environment.yaml";
pub const PIP_REQUIREMENTS_TXT_FILENAME: &str = "requirements.txt";

/// Where the Dataset claim is mounted inside sync jobs
pub const DATA_ROOT_MOUNT_PATH: &str = "/baize/dataset/data";

/// Number of rounds kept in the sync history
pub const KEEP_ROUNDS: i32 = 5;

/// How long deletion cleanup errors block finalizer removal
pub fn deletion_grace() -> Duration {
    Duration::minutes(5)
}

pub fn job_name(dataset: &str, round: i32) -> String {
    format!("dataset-{dataset}-round-{round}")
}

pub fn config_map_name(dataset: &str) -> String {
    format!("dataset-{dataset}-config")
}

/// Name of a cluster scoped volume provisioned for a Dataset
pub fn volume_name(namespace: &str, name: &str) -> String {
    format!("dataset-{namespace}-pvc-{name}")
}

pub fn dataset_selector(dataset: &str) -> String {
    format!("{DATASET_NAME_LABEL}={dataset}")
}

/// The Dataset's labels plus the ownership label
pub fn owned_labels(ds: &Dataset) -> BTreeMap<String, String> {
    let mut labels = ds.labels().clone();
    labels.insert(DATASET_NAME_LABEL.to_string(), ds.name_any());
    labels
}

pub fn owner_references(ds: &Dataset) -> Option<Vec<OwnerReference>> {
    ds.controller_owner_ref(&()).map(|owner| vec![owner])
}

/// Whether the object carries the ownership label of `dataset`
pub fn labelled_for(labels: Option<&BTreeMap<String, String>>, dataset: &str) -> bool {
    labels
        .and_then(|l| l.get(DATASET_NAME_LABEL))
        .map(|v| v == dataset)
        .unwrap_or(false)
}

/// Whether cleanup errors may be ignored so the finalizer can be removed
pub fn deletion_grace_elapsed(ds: &Dataset, now: DateTime<Utc>) -> bool {
    ds.metadata
        .deletion_timestamp
        .as_ref()
        .map(|ts| ts.0 + deletion_grace() < now)
        .unwrap_or(false)
}
