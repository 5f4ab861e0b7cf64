//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Custom Resource Definition generation for the Dataset controller

use crate::{ControllerResult, Dataset};
use kube::CustomResourceExt;

/// Generate the CRD for Dataset resources
pub fn generate_crd() -> ControllerResult<String> {
    let crd = Dataset::crd();
    Ok(serde_yaml::to_string(&crd)?)
}

/// Print the CRD to stdout
pub fn print_crd() -> ControllerResult<()> {
    println!("{}", generate_crd()?);
    Ok(())
}
