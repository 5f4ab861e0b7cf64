//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Derives the overall phase of a Dataset from its accumulated status

use crate::conditions::any_condition_false;
use crate::dataset::{Dataset, DatasetPhase, DatasetStatus, DatasetType};

/// Compute the phase for a Dataset of the given type.
///
/// Reference and adopted-claim Datasets have no sync round to wait for, so a
/// failing condition is the only thing that can hold them back from Ready.
/// Never returns `Pending`; that phase only comes from the status default.
pub fn derive_phase(type_: DatasetType, data_sync_round: i32, status: &DatasetStatus) -> DatasetPhase {
    let roundless = matches!(type_, DatasetType::Reference | DatasetType::Pvc);
    if roundless && any_condition_false(&status.conditions) {
        return DatasetPhase::Failed;
    }

    if type_ == DatasetType::Pvc {
        DatasetPhase::Ready
    } else if status.in_processing {
        DatasetPhase::Processing
    } else if status.last_succeed_round == data_sync_round {
        DatasetPhase::Ready
    } else {
        DatasetPhase::Failed
    }
}

/// Store the derived phase on the Dataset status
pub fn reconcile_phase(ds: &mut Dataset) {
    let type_ = ds.source_type();
    let round = ds.spec.data_sync_round;
    let status = ds.status_mut();
    let phase = derive_phase(type_, round, status);
    status.phase = phase;
}
