//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! CRD generation binary for the Dataset controller

fn main() -> Result<(), dataset_controller::ControllerError> {
    dataset_controller::crd::print_crd()
}
