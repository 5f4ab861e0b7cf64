//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Config object carrying the environment definition of conda Datasets

use super::Context;
use crate::dataset::{Dataset, DatasetType};
use crate::error::OptionalExt;
use crate::names::{
    config_map_name, owned_labels, owner_references, CONDA_ENVIRONMENT_YAML_FILENAME,
    PIP_REQUIREMENTS_TXT_FILENAME,
};
use crate::source::SourceOptions;
use crate::ControllerResult;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::info;

/// Write the supplied environment definitions into `data`.
///
/// Keys that are not supplied are left alone so manual edits survive.
/// Returns whether anything changed.
pub fn apply_environment(data: &mut BTreeMap<String, String>, options: &SourceOptions) -> bool {
    let mut changed = false;
    let entries = [
        (CONDA_ENVIRONMENT_YAML_FILENAME, &options.conda_environment_yml),
        (PIP_REQUIREMENTS_TXT_FILENAME, &options.pip_requirements_txt),
    ];
    for (key, value) in entries {
        if let Some(value) = value {
            if data.get(key) != Some(value) {
                data.insert(key.to_string(), value.clone());
                changed = true;
            }
        }
    }
    changed
}

pub async fn reconcile_environment_config(ctx: &Context, ds: &mut Dataset) -> ControllerResult<()> {
    if ds.source_type() != DatasetType::Conda {
        return Ok(());
    }

    let namespace = ds.namespace_or_default();
    let name = config_map_name(&ds.name_any());
    let options = SourceOptions::parse(&ds.spec.source);

    match ctx.store.get_config_map(&namespace, &name).await.optional()? {
        None if !options.has_environment() => Ok(()),
        None => {
            let mut data = BTreeMap::new();
            apply_environment(&mut data, &options);
            let config_map = ConfigMap {
                metadata: ObjectMeta {
                    name: Some(name.clone()),
                    namespace: Some(namespace.clone()),
                    labels: Some(owned_labels(ds)),
                    owner_references: owner_references(ds),
                    ..Default::default()
                },
                data: Some(data),
                ..Default::default()
            };
            ctx.store.create_config_map(&config_map).await?;
            info!(dataset = %ds.name_any(), namespace = %namespace, configmap = %name, "created environment config");
            Ok(())
        }
        Some(mut config_map) => {
            let data = config_map.data.get_or_insert_with(BTreeMap::new);
            if apply_environment(data, &options) {
                ctx.store.update_config_map(&config_map).await?;
                info!(dataset = %ds.name_any(), namespace = %namespace, configmap = %name, "updated environment config");
            }
            Ok(())
        }
    }
}
