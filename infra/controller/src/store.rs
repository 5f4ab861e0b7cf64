//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Object store access used by the sub-reconcilers
//!
//! Every call maps API failures onto [`ControllerError`] so that callers can
//! branch on `NotFound` / `AlreadyExists` without inspecting status codes.

use crate::dataset::Dataset;
use crate::{ControllerError, ControllerResult};
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, PersistentVolume, PersistentVolumeClaim};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};

/// Operations the controller performs against the cluster
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get_dataset(&self, namespace: &str, name: &str) -> ControllerResult<Dataset>;

    /// Replace the Dataset object, returning the stored version
    async fn update_dataset(&self, dataset: &Dataset) -> ControllerResult<Dataset>;

    /// Replace the status subresource
    async fn update_dataset_status(&self, dataset: &Dataset) -> ControllerResult<Dataset>;

    async fn get_namespace(&self, name: &str) -> ControllerResult<Namespace>;

    async fn get_pv(&self, name: &str) -> ControllerResult<PersistentVolume>;

    async fn create_pv(&self, pv: &PersistentVolume) -> ControllerResult<()>;

    async fn delete_pv(&self, name: &str) -> ControllerResult<()>;

    async fn get_pvc(&self, namespace: &str, name: &str) -> ControllerResult<PersistentVolumeClaim>;

    async fn create_pvc(&self, pvc: &PersistentVolumeClaim) -> ControllerResult<()>;

    async fn update_pvc(&self, pvc: &PersistentVolumeClaim) -> ControllerResult<()>;

    async fn delete_pvc(&self, namespace: &str, name: &str) -> ControllerResult<()>;

    async fn get_config_map(&self, namespace: &str, name: &str) -> ControllerResult<ConfigMap>;

    async fn create_config_map(&self, config_map: &ConfigMap) -> ControllerResult<()>;

    async fn update_config_map(&self, config_map: &ConfigMap) -> ControllerResult<()>;

    async fn get_job(&self, namespace: &str, name: &str) -> ControllerResult<Job>;

    async fn create_job(&self, job: &Job) -> ControllerResult<()>;

    /// List jobs matching a label selector such as `key=value`
    async fn list_jobs(&self, namespace: &str, label_selector: &str) -> ControllerResult<Vec<Job>>;

    async fn delete_job(&self, namespace: &str, name: &str) -> ControllerResult<()>;
}

/// [`ClusterStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn cluster<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::ClusterResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::all(self.client.clone())
    }
}

fn key(kind: &str, namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        format!("{kind} {name}")
    } else {
        format!("{kind} {namespace}/{name}")
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_dataset(&self, namespace: &str, name: &str) -> ControllerResult<Dataset> {
        self.namespaced::<Dataset>(namespace)
            .get(name)
            .await
            .map_err(|e| ControllerError::from_api(e, key("dataset", namespace, name)))
    }

    async fn update_dataset(&self, dataset: &Dataset) -> ControllerResult<Dataset> {
        let namespace = dataset.namespace_or_default();
        let name = dataset.name_any();
        self.namespaced::<Dataset>(&namespace)
            .replace(&name, &PostParams::default(), dataset)
            .await
            .map_err(|e| ControllerError::from_api(e, key("dataset", &namespace, &name)))
    }

    async fn update_dataset_status(&self, dataset: &Dataset) -> ControllerResult<Dataset> {
        let namespace = dataset.namespace_or_default();
        let name = dataset.name_any();
        let body = serde_json::to_vec(dataset)?;
        self.namespaced::<Dataset>(&namespace)
            .replace_status(&name, &PostParams::default(), body)
            .await
            .map_err(|e| ControllerError::from_api(e, key("dataset status", &namespace, &name)))
    }

    async fn get_namespace(&self, name: &str) -> ControllerResult<Namespace> {
        self.cluster::<Namespace>()
            .get(name)
            .await
            .map_err(|e| ControllerError::from_api(e, key("namespace", "", name)))
    }

    async fn get_pv(&self, name: &str) -> ControllerResult<PersistentVolume> {
        self.cluster::<PersistentVolume>()
            .get(name)
            .await
            .map_err(|e| ControllerError::from_api(e, key("pv", "", name)))
    }

    async fn create_pv(&self, pv: &PersistentVolume) -> ControllerResult<()> {
        let name = pv.name_any();
        self.cluster::<PersistentVolume>()
            .create(&PostParams::default(), pv)
            .await
            .map(|_| ())
            .map_err(|e| ControllerError::from_api(e, key("pv", "", &name)))
    }

    async fn delete_pv(&self, name: &str) -> ControllerResult<()> {
        self.cluster::<PersistentVolume>()
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| ControllerError::from_api(e, key("pv", "", name)))
    }

    async fn get_pvc(&self, namespace: &str, name: &str) -> ControllerResult<PersistentVolumeClaim> {
        self.namespaced::<PersistentVolumeClaim>(namespace)
            .get(name)
            .await
            .map_err(|e| ControllerError::from_api(e, key("pvc", namespace, name)))
    }

    async fn create_pvc(&self, pvc: &PersistentVolumeClaim) -> ControllerResult<()> {
        let namespace = pvc.namespace().unwrap_or_default();
        let name = pvc.name_any();
        self.namespaced::<PersistentVolumeClaim>(&namespace)
            .create(&PostParams::default(), pvc)
            .await
            .map(|_| ())
            .map_err(|e| ControllerError::from_api(e, key("pvc", &namespace, &name)))
    }

    async fn update_pvc(&self, pvc: &PersistentVolumeClaim) -> ControllerResult<()> {
        let namespace = pvc.namespace().unwrap_or_default();
        let name = pvc.name_any();
        self.namespaced::<PersistentVolumeClaim>(&namespace)
            .replace(&name, &PostParams::default(), pvc)
            .await
            .map(|_| ())
            .map_err(|e| ControllerError::from_api(e, key("pvc", &namespace, &name)))
    }

    async fn delete_pvc(&self, namespace: &str, name: &str) -> ControllerResult<()> {
        self.namespaced::<PersistentVolumeClaim>(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| ControllerError::from_api(e, key("pvc", namespace, name)))
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> ControllerResult<ConfigMap> {
        self.namespaced::<ConfigMap>(namespace)
            .get(name)
            .await
            .map_err(|e| ControllerError::from_api(e, key("configmap", namespace, name)))
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> ControllerResult<()> {
        let namespace = config_map.namespace().unwrap_or_default();
        let name = config_map.name_any();
        self.namespaced::<ConfigMap>(&namespace)
            .create(&PostParams::default(), config_map)
            .await
            .map(|_| ())
            .map_err(|e| ControllerError::from_api(e, key("configmap", &namespace, &name)))
    }

    async fn update_config_map(&self, config_map: &ConfigMap) -> ControllerResult<()> {
        let namespace = config_map.namespace().unwrap_or_default();
        let name = config_map.name_any();
        self.namespaced::<ConfigMap>(&namespace)
            .replace(&name, &PostParams::default(), config_map)
            .await
            .map(|_| ())
            .map_err(|e| ControllerError::from_api(e, key("configmap", &namespace, &name)))
    }

    async fn get_job(&self, namespace: &str, name: &str) -> ControllerResult<Job> {
        self.namespaced::<Job>(namespace)
            .get(name)
            .await
            .map_err(|e| ControllerError::from_api(e, key("job", namespace, name)))
    }

    async fn create_job(&self, job: &Job) -> ControllerResult<()> {
        let namespace = job.namespace().unwrap_or_default();
        let name = job.name_any();
        self.namespaced::<Job>(&namespace)
            .create(&PostParams::default(), job)
            .await
            .map(|_| ())
            .map_err(|e| ControllerError::from_api(e, key("job", &namespace, &name)))
    }

    async fn list_jobs(&self, namespace: &str, label_selector: &str) -> ControllerResult<Vec<Job>> {
        self.namespaced::<Job>(namespace)
            .list(&ListParams::default().labels(label_selector))
            .await
            .map(|list| list.items)
            .map_err(|e| ControllerError::from_api(e, key("jobs", namespace, label_selector)))
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> ControllerResult<()> {
        // pods of a deleted job are removed by the garbage collector
        self.namespaced::<Job>(namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map(|_| ())
            .map_err(|e| ControllerError::from_api(e, key("job", namespace, name)))
    }
}
