//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Dataset custom resource
//!
//! A Dataset describes a data source that is materialized onto a persistent
//! volume and kept in sync across explicit rounds.

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, LabelSelector, Time};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of data source backing a Dataset
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum DatasetType {
    #[serde(rename = "GIT")]
    Git,
    #[serde(rename = "S3")]
    S3,
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "PVC")]
    Pvc,
    #[serde(rename = "NFS")]
    Nfs,
    #[serde(rename = "CONDA")]
    Conda,
    #[serde(rename = "REFERENCE")]
    Reference,
    #[serde(rename = "HUGGING_FACE")]
    HuggingFace,
    #[serde(rename = "MODEL_SCOPE")]
    ModelScope,
}

impl DatasetType {
    /// Wire name, also the first positional argument of the data loader
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetType::Git => "GIT",
            DatasetType::S3 => "S3",
            DatasetType::Http => "HTTP",
            DatasetType::Pvc => "PVC",
            DatasetType::Nfs => "NFS",
            DatasetType::Conda => "CONDA",
            DatasetType::Reference => "REFERENCE",
            DatasetType::HuggingFace => "HUGGING_FACE",
            DatasetType::ModelScope => "MODEL_SCOPE",
        }
    }

    /// Whether data for this type is copied in by a sync job
    pub fn supports_preload(&self) -> bool {
        matches!(
            self,
            DatasetType::Git
                | DatasetType::S3
                | DatasetType::Http
                | DatasetType::Conda
                | DatasetType::HuggingFace
                | DatasetType::ModelScope
        )
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the data of a Dataset comes from
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSource {
    /// Source type, immutable after creation
    #[serde(rename = "type")]
    pub type_: DatasetType,
    /// Source location, immutable after creation
    ///
    /// - GIT: `http[s]://<host>/<owner>/<repo>[.git]` or `git://<host>/<owner>/<repo>[.git]`
    /// - S3: `s3://<bucket>/<path>`
    /// - HTTP: `http[s]://<host>/<path>?<query>`
    /// - PVC: `pvc://<name>/<path>`
    /// - NFS: `nfs://<host>/<path>`
    /// - CONDA: `conda://<name>?[python=<version>]`
    /// - REFERENCE: `dataset://<namespace>/<dataset>`
    /// - HUGGING_FACE: `huggingface://<repo>?[repoType=<type>]`
    /// - MODEL_SCOPE: `modelscope://<namespace>/<model>`
    pub uri: String,
    /// Type specific options, e.g. `{"branch": "master"}`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

/// Ownership and permissions applied to the synced data
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MountOptions {
    /// Sub directory of the volume the data lands in, `/` for the root
    #[serde(default = "default_mount_path")]
    pub path: String,
    /// Octal permission mode of the mounted directory
    #[serde(default = "default_mount_mode")]
    pub mode: String,
    #[serde(default = "default_mount_id")]
    pub uid: i64,
    #[serde(default = "default_mount_id")]
    pub gid: i64,
}

fn default_mount_path() -> String {
    "/".to_string()
}

fn default_mount_mode() -> String {
    "0774".to_string()
}

fn default_mount_id() -> i64 {
    1000
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            path: default_mount_path(),
            mode: default_mount_mode(),
            uid: default_mount_id(),
            gid: default_mount_id(),
        }
    }
}

/// Desired state of a Dataset
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "dataset.baizeai.io",
    version = "v1alpha1",
    kind = "Dataset",
    plural = "datasets",
    shortname = "data",
    status = "DatasetStatus",
    namespaced,
    printcolumn = r#"{"name":"type","type":"string","jsonPath":".spec.source.type"}"#,
    printcolumn = r#"{"name":"uri","type":"string","jsonPath":".spec.source.uri"}"#,
    printcolumn = r#"{"name":"phase","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSpec {
    /// Whether other namespaces may reference this Dataset
    #[serde(default)]
    pub share: bool,
    /// Restricts sharing to namespaces matching this selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_to_namespace_selector: Option<LabelSelector>,
    pub source: DatasetSource,
    /// Name of the secret holding source credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
    #[serde(default)]
    pub mount_options: MountOptions,
    /// Requested sync round, may only be incremented by one at a time
    #[serde(default)]
    pub data_sync_round: i32,
    /// Template for the claim owned by this Dataset
    #[serde(default)]
    pub volume_claim_template: PersistentVolumeClaim,
}

/// Coarse lifecycle state of a Dataset
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum DatasetPhase {
    #[default]
    Pending,
    Processing,
    Ready,
    Failed,
}

/// Outcome of one sync round
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataLoadStatus {
    pub round: i32,
    pub job_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<Time>,
    #[serde(default)]
    pub succeed: bool,
}

/// Observed state of a Dataset
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatasetStatus {
    #[serde(default)]
    pub phase: DatasetPhase,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub in_processing: bool,
    #[serde(default)]
    pub in_processing_round: i32,
    #[serde(default)]
    pub last_succeed_round: i32,
    /// Statuses of the most recent sync rounds only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sync_round_statuses: Vec<DataLoadStatus>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pvc_name: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<Time>,
}

impl Dataset {
    /// Namespace of the Dataset, empty when unset
    pub fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_default()
    }

    /// Whether a deletion timestamp has been set
    pub fn is_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Status, initialised on first access
    pub fn status_mut(&mut self) -> &mut DatasetStatus {
        self.status.get_or_insert_with(DatasetStatus::default)
    }

    /// Status or the defaults of a freshly created Dataset
    pub fn status_or_default(&self) -> DatasetStatus {
        self.status.clone().unwrap_or_default()
    }

    pub fn source_type(&self) -> DatasetType {
        self.spec.source.type_
    }
}
