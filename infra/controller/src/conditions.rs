//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Named health conditions recorded on a Dataset status

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";

/// Record the outcome of a named step.
///
/// An entry is only touched when its status flips, so the transition time and
/// message describe the first pass that observed the current state.
pub fn set_condition<E: std::fmt::Display>(
    conditions: &mut Vec<Condition>,
    type_: &str,
    outcome: Result<(), &E>,
) {
    let index = match conditions.iter().position(|c| c.type_ == type_) {
        Some(i) => i,
        None => {
            conditions.push(Condition {
                type_: type_.to_string(),
                reason: format!("{type_}Ready"),
                status: String::new(),
                message: String::new(),
                last_transition_time: Time(Utc::now()),
                observed_generation: None,
            });
            conditions.len() - 1
        }
    };
    let condition = &mut conditions[index];

    match outcome {
        Ok(()) => {
            if condition.status != CONDITION_TRUE {
                condition.status = CONDITION_TRUE.to_string();
                condition.last_transition_time = Time(Utc::now());
                condition.message = String::new();
            }
        }
        Err(err) => {
            if condition.status != CONDITION_FALSE {
                condition.status = CONDITION_FALSE.to_string();
                condition.last_transition_time = Time(Utc::now());
                condition.message = err.to_string();
            }
        }
    }
}

/// Whether the named condition exists and is True
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    conditions
        .iter()
        .find(|c| c.type_ == type_)
        .map(|c| c.status == CONDITION_TRUE)
        .unwrap_or(false)
}

pub fn any_condition_false(conditions: &[Condition]) -> bool {
    conditions.iter().any(|c| c.status == CONDITION_FALSE)
}
