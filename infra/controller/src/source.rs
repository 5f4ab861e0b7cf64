//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Typed views over a Dataset source URI and its option bag

use crate::dataset::{DatasetSource, DatasetType};
use crate::{ControllerError, ControllerResult};
use std::collections::BTreeMap;
use url::Url;

/// Option key selecting an accelerator for the sync job
pub const OPTION_GPU_TYPE: &str = "gpuType";
/// Option key carrying a conda `environment.yaml`
pub const OPTION_CONDA_ENVIRONMENT_YML: &str = "condaEnvironmentYml";
/// Option key carrying a pip `requirements.txt`
pub const OPTION_PIP_REQUIREMENTS_TXT: &str = "pipRequirementsTxt";

/// Location of a source, parsed per scheme
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUri {
    /// `dataset://<namespace>/<name>`
    Reference { namespace: String, name: String },
    /// `pvc://<name>/<path>`
    Claim { name: String, path: String },
    /// `nfs://<host>/<path>`
    NetworkShare { host: String, path: String },
    /// Interpreted by the data loader only
    Opaque(String),
}

impl SourceUri {
    pub fn parse(source: &DatasetSource) -> ControllerResult<Self> {
        match source.type_ {
            DatasetType::Reference => {
                let url = parse_url(&source.uri)?;
                let namespace = required_host(&url, &source.uri)?;
                let name = url.path().trim_matches('/').to_string();
                if name.is_empty() {
                    return Err(ControllerError::ValidationError(format!(
                        "reference uri {} has no dataset name",
                        source.uri
                    )));
                }
                Ok(SourceUri::Reference { namespace, name })
            }
            DatasetType::Pvc => {
                let url = parse_url(&source.uri)?;
                Ok(SourceUri::Claim {
                    name: required_host(&url, &source.uri)?,
                    path: url.path().to_string(),
                })
            }
            DatasetType::Nfs => {
                let url = parse_url(&source.uri)?;
                Ok(SourceUri::NetworkShare {
                    host: required_host(&url, &source.uri)?,
                    path: url.path().to_string(),
                })
            }
            _ => Ok(SourceUri::Opaque(source.uri.clone())),
        }
    }
}

fn parse_url(uri: &str) -> ControllerResult<Url> {
    Url::parse(uri)
        .map_err(|e| ControllerError::ValidationError(format!("malformed uri {uri}: {e}")))
}

fn required_host(url: &Url, uri: &str) -> ControllerResult<String> {
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(host.to_string()),
        _ => Err(ControllerError::ValidationError(format!(
            "uri {uri} has no host"
        ))),
    }
}

/// Accelerator requested through the `gpuType` option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accelerator {
    NvidiaGpu,
    NvidiaVgpu,
    MetaxGpu,
    /// Not recognised, requests nothing
    Unknown(String),
}

impl Accelerator {
    fn parse(kind: &str) -> Self {
        match kind {
            "nvidia-gpu" => Accelerator::NvidiaGpu,
            "nvidia-vgpu" => Accelerator::NvidiaVgpu,
            "metax-gpu" => Accelerator::MetaxGpu,
            other => Accelerator::Unknown(other.to_string()),
        }
    }

    /// Extended resources to request and limit, as `(resource key, quantity)`
    pub fn resources(&self) -> Vec<(&'static str, &'static str)> {
        match self {
            Accelerator::NvidiaGpu => vec![("nvidia.com/gpu", "1")],
            Accelerator::NvidiaVgpu => vec![("nvidia.com/vgpu", "1"), ("nvidia.com/gpumem", "500")],
            Accelerator::MetaxGpu => vec![("metax-tech.com/gpu", "1")],
            Accelerator::Unknown(_) => Vec::new(),
        }
    }
}

/// Source options split into the keys the controller consumes and the rest,
/// which are forwarded to the data loader untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceOptions {
    pub accelerator: Option<Accelerator>,
    pub conda_environment_yml: Option<String>,
    pub pip_requirements_txt: Option<String>,
    pub passthrough: BTreeMap<String, String>,
}

impl SourceOptions {
    pub fn parse(source: &DatasetSource) -> Self {
        let mut options = SourceOptions::default();
        for (key, value) in &source.options {
            match key.as_str() {
                OPTION_GPU_TYPE => options.accelerator = Some(Accelerator::parse(value)),
                OPTION_CONDA_ENVIRONMENT_YML if source.type_ == DatasetType::Conda => {
                    options.conda_environment_yml = non_blank(value);
                }
                OPTION_PIP_REQUIREMENTS_TXT if source.type_ == DatasetType::Conda => {
                    options.pip_requirements_txt = non_blank(value);
                }
                _ => {
                    options.passthrough.insert(key.clone(), value.clone());
                }
            }
        }
        options
    }

    /// Whether an environment definition was supplied
    pub fn has_environment(&self) -> bool {
        self.conda_environment_yml.is_some() || self.pip_requirements_txt.is_some()
    }

    /// `--options=key=value` arguments for the data loader
    pub fn loader_args(&self) -> Vec<String> {
        self.passthrough
            .iter()
            .map(|(key, value)| {
                if value.chars().any(char::is_whitespace) {
                    format!("--options={key}={value:?}")
                } else {
                    format!("--options={key}={value}")
                }
            })
            .collect()
    }
}

fn non_blank(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
