//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! In-memory cluster used by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dataset_controller::config::{JobTemplate, DEFAULT_JOB_SPEC_YAML};
use dataset_controller::dataset::{DatasetSource, MountOptions};
use dataset_controller::{
    ClusterStore, Context, ControllerError, ControllerResult, Dataset, DatasetSpec, DatasetType,
    Metrics,
};
use k8s_openapi::api::batch::v1::{Job, JobCondition, JobStatus};
use k8s_openapi::api::core::v1::{
    ConfigMap, Namespace, PersistentVolume, PersistentVolumeClaim, PersistentVolumeClaimSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[derive(Default)]
struct State {
    datasets: BTreeMap<Key, Dataset>,
    namespaces: BTreeMap<String, Namespace>,
    pvs: BTreeMap<String, PersistentVolume>,
    pvcs: BTreeMap<Key, PersistentVolumeClaim>,
    config_maps: BTreeMap<Key, ConfigMap>,
    jobs: BTreeMap<Key, Job>,
    version: u64,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

/// [`ClusterStore`] keeping every object in memory
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
    fail_pvc_deletes: Mutex<bool>,
    fail_status_writes: Mutex<bool>,
    status_writes: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every claim deletion fail with a transient error
    pub fn fail_pvc_deletes(&self) {
        *self.fail_pvc_deletes.lock().unwrap() = true;
    }

    /// Make every status write fail with a conflict
    pub fn fail_status_writes(&self) {
        *self.fail_status_writes.lock().unwrap() = true;
    }

    /// Number of status writes the controller performed
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    pub fn insert_dataset(&self, mut ds: Dataset) {
        let mut state = self.state.lock().unwrap();
        let namespace = ds.namespace().unwrap_or_default();
        let name = ds.name_any();
        ds.metadata.uid = Some(format!("uid-{namespace}-{name}"));
        ds.metadata.resource_version = Some(state.next_version());
        ds.metadata
            .creation_timestamp
            .get_or_insert_with(|| Time(Utc::now() - Duration::hours(1)));
        state.datasets.insert(key(&namespace, &name), ds);
    }

    pub fn dataset(&self, namespace: &str, name: &str) -> Option<Dataset> {
        self.state.lock().unwrap().datasets.get(&key(namespace, name)).cloned()
    }

    /// Apply a change to the stored Dataset the way a user edit would
    pub fn edit_dataset(&self, namespace: &str, name: &str, edit: impl FnOnce(&mut Dataset)) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        let ds = state
            .datasets
            .get_mut(&key(namespace, name))
            .expect("dataset exists");
        edit(ds);
        ds.metadata.resource_version = Some(version);
    }

    /// Request deletion `ago` before now
    pub fn mark_deleted(&self, namespace: &str, name: &str, ago: Duration) {
        self.edit_dataset(namespace, name, |ds| {
            ds.metadata.deletion_timestamp = Some(Time(Utc::now() - ago));
        });
    }

    pub fn insert_namespace(&self, name: &str, labels: &[(&str, &str)]) {
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        };
        self.state
            .lock()
            .unwrap()
            .namespaces
            .insert(name.to_string(), ns);
    }

    pub fn insert_pv(&self, pv: PersistentVolume) {
        self.state.lock().unwrap().pvs.insert(pv.name_any(), pv);
    }

    pub fn pv(&self, name: &str) -> Option<PersistentVolume> {
        self.state.lock().unwrap().pvs.get(name).cloned()
    }

    pub fn insert_pvc(&self, pvc: PersistentVolumeClaim) {
        let namespace = pvc.namespace().unwrap_or_default();
        let name = pvc.name_any();
        self.state
            .lock()
            .unwrap()
            .pvcs
            .insert(key(&namespace, &name), pvc);
    }

    pub fn pvc(&self, namespace: &str, name: &str) -> Option<PersistentVolumeClaim> {
        self.state.lock().unwrap().pvcs.get(&key(namespace, name)).cloned()
    }

    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.state
            .lock()
            .unwrap()
            .config_maps
            .get(&key(namespace, name))
            .cloned()
    }

    pub fn job(&self, namespace: &str, name: &str) -> Option<Job> {
        self.state.lock().unwrap().jobs.get(&key(namespace, name)).cloned()
    }

    pub fn job_names(&self, namespace: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Report the job as completed successfully
    pub fn succeed_job(&self, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        let job = state.jobs.get_mut(&key(namespace, name)).expect("job exists");
        job.status = Some(JobStatus {
            succeeded: Some(1),
            start_time: Some(Time(Utc::now() - Duration::minutes(2))),
            completion_time: Some(Time(Utc::now())),
            ..Default::default()
        });
    }

    /// Report the job as failed after exhausting its retries
    pub fn fail_job(&self, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        let job = state.jobs.get_mut(&key(namespace, name)).expect("job exists");
        job.status = Some(JobStatus {
            failed: Some(5),
            conditions: Some(vec![JobCondition {
                type_: "Failed".to_string(),
                status: "True".to_string(),
                reason: Some("BackoffLimitExceeded".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        });
    }
}

fn not_found(what: String) -> ControllerError {
    ControllerError::NotFound(what)
}

fn check_version(stored: Option<&String>, incoming: Option<&String>, what: &str) -> ControllerResult<()> {
    match incoming {
        Some(v) if Some(v) != stored => Err(ControllerError::Conflict(format!(
            "{what}: the object has been modified"
        ))),
        _ => Ok(()),
    }
}

#[async_trait]
impl ClusterStore for FakeStore {
    async fn get_dataset(&self, namespace: &str, name: &str) -> ControllerResult<Dataset> {
        self.dataset(namespace, name)
            .ok_or_else(|| not_found(format!("dataset {namespace}/{name}")))
    }

    async fn update_dataset(&self, dataset: &Dataset) -> ControllerResult<Dataset> {
        let namespace = dataset.namespace().unwrap_or_default();
        let name = dataset.name_any();
        let k = key(&namespace, &name);
        let mut state = self.state.lock().unwrap();
        let stored = state
            .datasets
            .get(&k)
            .cloned()
            .ok_or_else(|| not_found(format!("dataset {namespace}/{name}")))?;
        check_version(
            stored.metadata.resource_version.as_ref(),
            dataset.metadata.resource_version.as_ref(),
            &name,
        )?;

        let mut updated = dataset.clone();
        updated.status = stored.status;
        updated.metadata.resource_version = Some(state.next_version());
        if updated.metadata.deletion_timestamp.is_some() && updated.finalizers().is_empty() {
            state.datasets.remove(&k);
        } else {
            state.datasets.insert(k, updated.clone());
        }
        Ok(updated)
    }

    async fn update_dataset_status(&self, dataset: &Dataset) -> ControllerResult<Dataset> {
        let namespace = dataset.namespace().unwrap_or_default();
        let name = dataset.name_any();
        if *self.fail_status_writes.lock().unwrap() {
            return Err(ControllerError::Conflict(format!(
                "dataset status {namespace}/{name}: the object has been modified"
            )));
        }
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        let stored = state
            .datasets
            .get_mut(&key(&namespace, &name))
            .ok_or_else(|| not_found(format!("dataset status {namespace}/{name}")))?;
        check_version(
            stored.metadata.resource_version.as_ref(),
            dataset.metadata.resource_version.as_ref(),
            &name,
        )?;
        stored.status = dataset.status.clone();
        stored.metadata.resource_version = Some(version);
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored.clone())
    }

    async fn get_namespace(&self, name: &str) -> ControllerResult<Namespace> {
        self.state
            .lock()
            .unwrap()
            .namespaces
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(format!("namespace {name}")))
    }

    async fn get_pv(&self, name: &str) -> ControllerResult<PersistentVolume> {
        self.pv(name).ok_or_else(|| not_found(format!("pv {name}")))
    }

    async fn create_pv(&self, pv: &PersistentVolume) -> ControllerResult<()> {
        let mut state = self.state.lock().unwrap();
        let name = pv.name_any();
        if state.pvs.contains_key(&name) {
            return Err(ControllerError::AlreadyExists(format!("pv {name}")));
        }
        state.pvs.insert(name, pv.clone());
        Ok(())
    }

    async fn delete_pv(&self, name: &str) -> ControllerResult<()> {
        self.state
            .lock()
            .unwrap()
            .pvs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(format!("pv {name}")))
    }

    async fn get_pvc(&self, namespace: &str, name: &str) -> ControllerResult<PersistentVolumeClaim> {
        self.pvc(namespace, name)
            .ok_or_else(|| not_found(format!("pvc {namespace}/{name}")))
    }

    async fn create_pvc(&self, pvc: &PersistentVolumeClaim) -> ControllerResult<()> {
        let k = key(&pvc.namespace().unwrap_or_default(), &pvc.name_any());
        let mut state = self.state.lock().unwrap();
        if state.pvcs.contains_key(&k) {
            return Err(ControllerError::AlreadyExists(format!("pvc {}/{}", k.0, k.1)));
        }
        state.pvcs.insert(k, pvc.clone());
        Ok(())
    }

    async fn update_pvc(&self, pvc: &PersistentVolumeClaim) -> ControllerResult<()> {
        let k = key(&pvc.namespace().unwrap_or_default(), &pvc.name_any());
        let mut state = self.state.lock().unwrap();
        match state.pvcs.get_mut(&k) {
            Some(stored) => {
                *stored = pvc.clone();
                Ok(())
            }
            None => Err(not_found(format!("pvc {}/{}", k.0, k.1))),
        }
    }

    async fn delete_pvc(&self, namespace: &str, name: &str) -> ControllerResult<()> {
        if *self.fail_pvc_deletes.lock().unwrap() {
            return Err(ControllerError::InvalidState(format!(
                "pvc {namespace}/{name} is protected"
            )));
        }
        self.state
            .lock()
            .unwrap()
            .pvcs
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| not_found(format!("pvc {namespace}/{name}")))
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> ControllerResult<ConfigMap> {
        self.config_map(namespace, name)
            .ok_or_else(|| not_found(format!("configmap {namespace}/{name}")))
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> ControllerResult<()> {
        let k = key(&config_map.namespace().unwrap_or_default(), &config_map.name_any());
        let mut state = self.state.lock().unwrap();
        if state.config_maps.contains_key(&k) {
            return Err(ControllerError::AlreadyExists(format!("configmap {}/{}", k.0, k.1)));
        }
        state.config_maps.insert(k, config_map.clone());
        Ok(())
    }

    async fn update_config_map(&self, config_map: &ConfigMap) -> ControllerResult<()> {
        let k = key(&config_map.namespace().unwrap_or_default(), &config_map.name_any());
        let mut state = self.state.lock().unwrap();
        match state.config_maps.get_mut(&k) {
            Some(stored) => {
                *stored = config_map.clone();
                Ok(())
            }
            None => Err(not_found(format!("configmap {}/{}", k.0, k.1))),
        }
    }

    async fn get_job(&self, namespace: &str, name: &str) -> ControllerResult<Job> {
        self.job(namespace, name)
            .ok_or_else(|| not_found(format!("job {namespace}/{name}")))
    }

    async fn create_job(&self, job: &Job) -> ControllerResult<()> {
        let k = key(&job.namespace().unwrap_or_default(), &job.name_any());
        let mut state = self.state.lock().unwrap();
        if state.jobs.contains_key(&k) {
            return Err(ControllerError::AlreadyExists(format!("job {}/{}", k.0, k.1)));
        }
        state.jobs.insert(k, job.clone());
        Ok(())
    }

    async fn list_jobs(&self, namespace: &str, label_selector: &str) -> ControllerResult<Vec<Job>> {
        let (label, value) = label_selector.split_once('=').unwrap_or((label_selector, ""));
        Ok(self
            .state
            .lock()
            .unwrap()
            .jobs
            .iter()
            .filter(|((ns, _), job)| {
                ns == namespace && job.labels().get(label).map(String::as_str) == Some(value)
            })
            .map(|(_, job)| job.clone())
            .collect())
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> ControllerResult<()> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| not_found(format!("job {namespace}/{name}")))
    }
}

pub fn context(store: &Arc<FakeStore>) -> Context {
    let template = JobTemplate::from_yaml(DEFAULT_JOB_SPEC_YAML).unwrap();
    Context::new(store.clone(), template, Arc::new(Metrics::new()))
}

pub fn dataset(namespace: &str, name: &str, type_: DatasetType, uri: &str) -> Dataset {
    let mut ds = Dataset::new(
        name,
        DatasetSpec {
            share: false,
            share_to_namespace_selector: None,
            source: DatasetSource {
                type_,
                uri: uri.to_string(),
                options: BTreeMap::new(),
            },
            secret_ref: None,
            mount_options: MountOptions::default(),
            data_sync_round: 1,
            volume_claim_template: PersistentVolumeClaim::default(),
        },
    );
    ds.metadata.namespace = Some(namespace.to_string());
    ds
}

pub fn pvc(namespace: &str, name: &str, labels: &[(&str, &str)], volume: Option<&str>) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            volume_name: volume.map(str::to_string),
            ..Default::default()
        }),
        status: None,
    }
}
