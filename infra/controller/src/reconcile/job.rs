//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Sync jobs
//!
//! A sync job runs the data loader once for a given round. Jobs are named after
//! the round, so re-creating the job of an in-flight round is a no-op.

use super::Context;
use crate::config::JobTemplate;
use crate::dataset::{Dataset, DatasetType};
use crate::names::{
    config_map_name, dataset_selector, deletion_grace_elapsed, job_name, owned_labels,
    owner_references, CONDA_CONFIG_DIR, CONDA_ENVIRONMENT_YAML_FILENAME, DATA_ROOT_MOUNT_PATH,
    PIP_REQUIREMENTS_TXT_FILENAME, SECRETS_MOUNT_PATH,
};
use crate::source::SourceOptions;
use crate::ControllerResult;
use chrono::Utc;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, KeyToPath, PersistentVolumeClaimVolumeSource, PodSpec,
    ResourceRequirements, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{error, info};

pub const LOADER_CONTAINER_NAME: &str = "dataset-loader";
const CONDA_VOLUME_NAME: &str = "dataset-config-conda";
const SECRET_VOLUME_NAME: &str = "dataset-secret";
const DATA_VOLUME_NAME: &str = "dataset-pvc";

/// Requests and limits for source types that need more headroom than the
/// template provides
fn resource_profile(
    type_: DatasetType,
) -> Option<(BTreeMap<String, Quantity>, BTreeMap<String, Quantity>)> {
    let (cpu_request, memory_request, cpu_limit, memory_limit) = match type_ {
        DatasetType::Conda => ("2", "2Gi", "4", "4Gi"),
        DatasetType::HuggingFace | DatasetType::ModelScope => ("2", "2Gi", "4", "8Gi"),
        _ => return None,
    };
    Some((
        quantities(&[("cpu", cpu_request), ("memory", memory_request)]),
        quantities(&[("cpu", cpu_limit), ("memory", memory_limit)]),
    ))
}

fn quantities(pairs: &[(&str, &str)]) -> BTreeMap<String, Quantity> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
        .collect()
}

/// Data loader arguments for one round
pub fn loader_args(ds: &Dataset, options: &SourceOptions) -> Vec<String> {
    let mount = &ds.spec.mount_options;
    let mut args = vec![ds.source_type().to_string(), ds.spec.source.uri.clone()];
    args.extend(options.loader_args());
    if !mount.path.is_empty() {
        args.push(format!("--mount-path={}", mount.path));
    }
    if !mount.mode.is_empty() {
        args.push(format!("--mount-mode={}", mount.mode));
    }
    args.push(format!("--mount-uid={}", mount.uid));
    args.push(format!("--mount-gid={}", mount.gid));
    args.push(format!("--mount-root={DATA_ROOT_MOUNT_PATH}"));
    args
}

/// Build the job that syncs `round` of a Dataset
pub fn build_sync_job(ds: &Dataset, template: &JobTemplate, round: i32) -> Job {
    let options = SourceOptions::parse(&ds.spec.source);
    let mut spec = template.spec();
    let pod = spec.template.spec.get_or_insert_with(PodSpec::default);
    if pod.containers.is_empty() {
        pod.containers.push(Default::default());
    }

    let mut requests = BTreeMap::new();
    let mut limits = BTreeMap::new();
    if let Some((profile_requests, profile_limits)) = resource_profile(ds.source_type()) {
        requests.extend(profile_requests);
        limits.extend(profile_limits);
    }
    if let Some(accelerator) = &options.accelerator {
        for (key, value) in accelerator.resources() {
            requests.insert(key.to_string(), Quantity(value.to_string()));
            limits.insert(key.to_string(), Quantity(value.to_string()));
        }
    }

    let mut volumes = Vec::new();
    let mut mounts = Vec::new();

    if ds.source_type() == DatasetType::Conda && options.has_environment() {
        let mut items = Vec::new();
        if options.conda_environment_yml.is_some() {
            items.push(key_to_path(CONDA_ENVIRONMENT_YAML_FILENAME));
        }
        if options.pip_requirements_txt.is_some() {
            items.push(key_to_path(PIP_REQUIREMENTS_TXT_FILENAME));
        }
        volumes.push(Volume {
            name: CONDA_VOLUME_NAME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: config_map_name(&ds.name_any()),
                items: Some(items),
                ..Default::default()
            }),
            ..Default::default()
        });
        mounts.push(VolumeMount {
            name: CONDA_VOLUME_NAME.to_string(),
            mount_path: CONDA_CONFIG_DIR.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }

    if let Some(secret) = ds.spec.secret_ref.as_ref().filter(|s| !s.is_empty()) {
        volumes.push(Volume {
            name: SECRET_VOLUME_NAME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret.clone()),
                ..Default::default()
            }),
            ..Default::default()
        });
        mounts.push(VolumeMount {
            name: SECRET_VOLUME_NAME.to_string(),
            mount_path: SECRETS_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }

    volumes.push(Volume {
        name: DATA_VOLUME_NAME.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: ds.status_or_default().pvc_name,
            read_only: None,
        }),
        ..Default::default()
    });
    mounts.push(VolumeMount {
        name: DATA_VOLUME_NAME.to_string(),
        mount_path: DATA_ROOT_MOUNT_PATH.to_string(),
        ..Default::default()
    });

    pod.volumes.get_or_insert_with(Vec::new).extend(volumes);

    let container = &mut pod.containers[0];
    container.name = LOADER_CONTAINER_NAME.to_string();
    if !requests.is_empty() || !limits.is_empty() {
        let resources = container
            .resources
            .get_or_insert_with(ResourceRequirements::default);
        if !requests.is_empty() {
            resources.requests = Some(requests);
        }
        if !limits.is_empty() {
            resources.limits = Some(limits);
        }
    }
    container.volume_mounts.get_or_insert_with(Vec::new).extend(mounts);
    container.args = Some(loader_args(ds, &options));

    let annotations = ds.annotations().clone();
    Job {
        metadata: ObjectMeta {
            name: Some(job_name(&ds.name_any(), round)),
            namespace: ds.namespace(),
            labels: Some(owned_labels(ds)),
            annotations: (!annotations.is_empty()).then_some(annotations),
            owner_references: owner_references(ds),
            ..Default::default()
        },
        spec: Some(spec),
        status: None,
    }
}

fn key_to_path(key: &str) -> KeyToPath {
    KeyToPath {
        key: key.to_string(),
        path: key.to_string(),
        mode: None,
    }
}

/// Start a sync job for the requested round if it has not succeeded yet,
/// or delete all sync jobs of a Dataset being deleted.
pub async fn reconcile_sync_job(ctx: &Context, ds: &mut Dataset) -> ControllerResult<()> {
    if !ds.source_type().supports_preload() {
        return Ok(());
    }
    if ds.is_deleted() {
        return delete_sync_jobs(ctx, ds).await;
    }

    let round = ds.spec.data_sync_round;
    if round <= ds.status_or_default().last_succeed_round {
        return Ok(());
    }

    let status = ds.status_mut();
    status.in_processing = true;
    status.in_processing_round = round;

    let job = build_sync_job(ds, &ctx.job_template, round);
    match ctx.store.create_job(&job).await {
        Ok(()) => {
            ctx.metrics.increment_sync_jobs_created();
            info!(
                dataset = %ds.name_any(),
                namespace = %ds.namespace_or_default(),
                job = %job.name_any(),
                round,
                "created sync job"
            );
            Ok(())
        }
        Err(e) if e.is_already_exists() => Ok(()),
        Err(e) => Err(e),
    }
}

async fn delete_sync_jobs(ctx: &Context, ds: &Dataset) -> ControllerResult<()> {
    let namespace = ds.namespace_or_default();
    let force = deletion_grace_elapsed(ds, Utc::now());

    let jobs = match ctx
        .store
        .list_jobs(&namespace, &dataset_selector(&ds.name_any()))
        .await
    {
        Ok(jobs) => jobs,
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) if force => {
            error!(dataset = %ds.name_any(), namespace = %namespace, error = %e, "list jobs failed, but force delete");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    for job in jobs {
        let name = job.name_any();
        match ctx.store.delete_job(&namespace, &name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) if force => {
                error!(dataset = %ds.name_any(), job = %name, error = %e, "delete job failed, but force delete");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_JOB_SPEC_YAML;
    use crate::dataset::{DatasetSource, DatasetSpec, DatasetStatus, MountOptions};

    fn dataset(type_: DatasetType, uri: &str, options: &[(&str, &str)]) -> Dataset {
        let mut ds = Dataset::new(
            "mnist",
            DatasetSpec {
                share: false,
                share_to_namespace_selector: None,
                source: DatasetSource {
                    type_,
                    uri: uri.to_string(),
                    options: options
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                },
                secret_ref: None,
                mount_options: MountOptions::default(),
                data_sync_round: 1,
                volume_claim_template: Default::default(),
            },
        );
        ds.metadata.namespace = Some("team-a".to_string());
        ds.status = Some(DatasetStatus {
            pvc_name: "mnist".to_string(),
            ..Default::default()
        });
        ds
    }

    fn template() -> JobTemplate {
        JobTemplate::from_yaml(DEFAULT_JOB_SPEC_YAML).unwrap()
    }

    fn pod(job: &Job) -> PodSpec {
        job.spec.clone().unwrap().template.spec.unwrap()
    }

    #[test]
    fn test_job_identity() {
        let ds = dataset(DatasetType::S3, "s3://bucket/mnist", &[]);
        let job = build_sync_job(&ds, &template(), 3);

        assert_eq!(job.metadata.name.as_deref(), Some("dataset-mnist-round-3"));
        assert_eq!(job.metadata.namespace.as_deref(), Some("team-a"));
        assert_eq!(
            job.metadata.labels.unwrap().get("baize.io/dataset-name").map(String::as_str),
            Some("mnist")
        );
        assert_eq!(job.spec.as_ref().unwrap().backoff_limit, Some(4));
    }

    #[test]
    fn test_loader_arguments() {
        let mut ds = dataset(
            DatasetType::Git,
            "https://example.com/repo.git",
            &[("branch", "main"), ("gpuType", "nvidia-gpu")],
        );
        ds.spec.mount_options.path = "/data".to_string();

        let job = build_sync_job(&ds, &template(), 1);
        let container = &pod(&job).containers[0];
        assert_eq!(container.name, "dataset-loader");
        assert_eq!(
            container.args.clone().unwrap(),
            vec![
                "GIT",
                "https://example.com/repo.git",
                "--options=branch=main",
                "--mount-path=/data",
                "--mount-mode=0774",
                "--mount-uid=1000",
                "--mount-gid=1000",
                "--mount-root=/baize/dataset/data",
            ]
        );
    }

    #[test]
    fn test_template_resources_kept_for_plain_sources() {
        let ds = dataset(DatasetType::S3, "s3://bucket/mnist", &[]);
        let job = build_sync_job(&ds, &template(), 1);
        let resources = pod(&job).containers[0].resources.clone().unwrap();
        assert_eq!(
            resources.requests.unwrap().get("cpu"),
            Some(&Quantity("100m".to_string()))
        );
    }

    #[test]
    fn test_model_hub_profile_with_vgpu() {
        let ds = dataset(
            DatasetType::HuggingFace,
            "huggingface://bert-base",
            &[("gpuType", "nvidia-vgpu")],
        );
        let job = build_sync_job(&ds, &template(), 1);
        let resources = pod(&job).containers[0].resources.clone().unwrap();
        let requests = resources.requests.unwrap();
        let limits = resources.limits.unwrap();

        assert_eq!(requests["cpu"], Quantity("2".to_string()));
        assert_eq!(limits["memory"], Quantity("8Gi".to_string()));
        assert_eq!(requests["nvidia.com/vgpu"], Quantity("1".to_string()));
        assert_eq!(requests["nvidia.com/gpumem"], Quantity("500".to_string()));
        assert_eq!(limits["nvidia.com/gpumem"], Quantity("500".to_string()));
    }

    #[test]
    fn test_conda_mounts() {
        let mut ds = dataset(
            DatasetType::Conda,
            "conda://env?python=3.10",
            &[("pipRequirementsTxt", "torch\nnumpy")],
        );
        ds.spec.secret_ref = Some("creds".to_string());

        let job = build_sync_job(&ds, &template(), 1);
        let pod = pod(&job);
        let volumes = pod.volumes.unwrap();
        let names: Vec<_> = volumes.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["dataset-config-conda", "dataset-secret", "dataset-pvc"]);

        let config_map = volumes[0].config_map.clone().unwrap();
        assert_eq!(config_map.name, "dataset-mnist-config");
        let items = config_map.items.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key, "requirements.txt");

        let mounts = pod.containers[0].volume_mounts.clone().unwrap();
        assert_eq!(mounts[0].mount_path, "/run/dataset/conda");
        assert_eq!(mounts[0].read_only, Some(true));
        assert_eq!(mounts[1].mount_path, "/run/dataset/secrets");
        assert_eq!(mounts[2].mount_path, "/baize/dataset/data");
        assert_eq!(
            volumes[2].persistent_volume_claim.clone().unwrap().claim_name,
            "mnist"
        );

        // environment keys are consumed and not forwarded
        let args = pod.containers[0].args.clone().unwrap();
        assert!(!args.iter().any(|a| a.contains("pipRequirementsTxt")));
    }

    #[test]
    fn test_conda_without_environment_has_no_config_volume() {
        let ds = dataset(DatasetType::Conda, "conda://env", &[]);
        let job = build_sync_job(&ds, &template(), 1);
        let volumes = pod(&job).volumes.unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].name, "dataset-pvc");
    }
}
