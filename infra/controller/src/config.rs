//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Controller configuration
//!
//! Loaded once at process start and handed to the reconciliation context.
//! Values come from an optional file and `DATASET_CONTROLLER_*` environment
//! variables, in that order of precedence (environment wins).

use crate::{ControllerError, ControllerResult};
use k8s_openapi::api::batch::v1::JobSpec;
use k8s_openapi::api::core::v1::{Container, PodSpec};
use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

/// Environment prefix for configuration overrides
pub const ENV_PREFIX: &str = "DATASET_CONTROLLER";

/// Built-in base template for sync jobs
pub const DEFAULT_JOB_SPEC_YAML: &str = r#"
backoffLimit: 4
completionMode: NonIndexed
completions: 1
parallelism: 1
template:
  spec:
    restartPolicy: Never
    containers:
    - image: ubuntu:20.04
      command: ["/bin/bash", "-c", "echo 'Container args: '$(echo $@)"]
      resources:
        requests:
          cpu: 100m
          memory: 100Mi
        limits:
          cpu: 500m
          memory: 500Mi
"#;

/// Controller configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ControllerConfig {
    /// Address of the health and metrics server
    #[validate(length(min = 1))]
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Job spec every sync job starts from
    #[validate(length(min = 1))]
    #[serde(default = "default_job_spec_yaml")]
    pub job_spec_yaml: String,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_job_spec_yaml() -> String {
    DEFAULT_JOB_SPEC_YAML.to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            job_spec_yaml: default_job_spec_yaml(),
            log_json: false,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from an optional file plus the environment
    pub fn load(path: Option<&Path>) -> ControllerResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()
            .map_err(|e| {
                ControllerError::ConfigurationError(format!("Failed to load configuration: {e}"))
            })?;

        let config: ControllerConfig = settings.try_deserialize().map_err(|e| {
            ControllerError::ConfigurationError(format!("Failed to deserialize configuration: {e}"))
        })?;

        config.validate().map_err(|e| {
            ControllerError::ValidationError(format!("Configuration validation failed: {e}"))
        })?;

        Ok(config)
    }

    /// Parse the configured job template
    pub fn job_template(&self) -> ControllerResult<JobTemplate> {
        JobTemplate::from_yaml(&self.job_spec_yaml)
    }
}

/// Parsed base job spec
#[derive(Debug, Clone, PartialEq)]
pub struct JobTemplate {
    spec: JobSpec,
}

impl JobTemplate {
    pub fn from_yaml(yaml: &str) -> ControllerResult<Self> {
        let mut spec: JobSpec = serde_yaml::from_str(yaml)?;
        let pod = spec.template.spec.get_or_insert_with(PodSpec::default);
        if pod.containers.is_empty() {
            pod.containers.push(Container::default());
        }
        Ok(Self { spec })
    }

    /// A fresh copy of the base spec
    pub fn spec(&self) -> JobSpec {
        self.spec.clone()
    }
}
