//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Round history tracking
//!
//! Folds the outcome of the in-flight sync job into the Dataset status and
//! keeps the recorded history bounded.

use super::Context;
use crate::dataset::{DataLoadStatus, Dataset, DatasetStatus};
use crate::error::OptionalExt;
use crate::names::{job_name, KEEP_ROUNDS};
use crate::ControllerResult;
use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use tracing::{debug, info, warn};

/// Outcome of a sync job as far as the controller cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Running,
    Succeeded,
    Failed,
}

pub fn job_outcome(job: &Job) -> JobOutcome {
    let Some(status) = job.status.as_ref() else {
        return JobOutcome::Running;
    };
    if status.succeeded.unwrap_or(0) > 0 {
        return JobOutcome::Succeeded;
    }
    let failed = status
        .conditions
        .iter()
        .flatten()
        .any(|c| c.type_ == "Failed" && c.status == "True");
    if failed {
        JobOutcome::Failed
    } else {
        JobOutcome::Running
    }
}

/// Record the state of the job syncing `status.in_processing_round`
pub fn record_round(status: &mut DatasetStatus, job: &Job, now: DateTime<Utc>) -> JobOutcome {
    let round = status.in_processing_round;
    let name = job.name_any();

    let index = match status.sync_round_statuses.iter().position(|s| s.round == round) {
        Some(index) => index,
        None => {
            status.sync_round_statuses.push(DataLoadStatus {
                round,
                job_name: name,
                start_time: Some(Time(now)),
                end_time: None,
                succeed: false,
            });
            status.sync_round_statuses.len() - 1
        }
    };

    let outcome = job_outcome(job);
    let job_status = job.status.clone().unwrap_or_default();
    match outcome {
        JobOutcome::Running => {}
        JobOutcome::Succeeded => {
            let entry = &mut status.sync_round_statuses[index];
            if let Some(start) = job_status.start_time {
                entry.start_time = Some(start);
            }
            entry.end_time = Some(job_status.completion_time.unwrap_or(Time(now)));
            entry.succeed = true;
            status.last_sync_time = entry.end_time.clone();
            status.last_succeed_round = round;
            status.in_processing = false;
            status.in_processing_round = 0;
        }
        JobOutcome::Failed => {
            status.sync_round_statuses[index].succeed = false;
            status.in_processing = false;
            status.in_processing_round = 0;
        }
    }
    outcome
}

/// Drop rounds that fell out of the retention window
pub fn trim_history(status: &mut DatasetStatus, data_sync_round: i32) {
    status
        .sync_round_statuses
        .retain(|s| s.round + KEEP_ROUNDS > data_sync_round);
}

pub async fn reconcile_round_history(ctx: &Context, ds: &mut Dataset) -> ControllerResult<()> {
    let namespace = ds.namespace_or_default();
    let name = ds.name_any();
    let created = ds.creation_timestamp();

    if !ds.source_type().supports_preload() {
        ds.status_mut().last_sync_time = created;
        return Ok(());
    }

    let status = ds.status_or_default();
    if !status.in_processing {
        let mut completed = None;
        if status.last_succeed_round > 0 {
            let last = job_name(&name, status.last_succeed_round);
            match ctx.store.get_job(&namespace, &last).await.optional()? {
                Some(job) => completed = job.status.and_then(|s| s.completion_time),
                None => debug!(dataset = %name, job = %last, "last succeeded job is gone"),
            }
        }
        ds.status_mut().last_sync_time = completed.or(created);
    } else {
        let current = job_name(&name, status.in_processing_round);
        let job = ctx.store.get_job(&namespace, &current).await?;
        let round = status.in_processing_round;
        match record_round(ds.status_mut(), &job, Utc::now()) {
            JobOutcome::Running => {}
            JobOutcome::Succeeded => {
                info!(dataset = %name, namespace = %namespace, round, "sync round succeeded")
            }
            JobOutcome::Failed => {
                warn!(dataset = %name, namespace = %namespace, round, "sync round failed")
            }
        }
    }

    let round = ds.spec.data_sync_round;
    trim_history(ds.status_mut(), round);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::batch::v1::{JobCondition, JobStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn job(status: Option<JobStatus>) -> Job {
        Job {
            metadata: ObjectMeta {
                name: Some("dataset-mnist-round-2".to_string()),
                ..Default::default()
            },
            spec: None,
            status,
        }
    }

    fn processing(round: i32) -> DatasetStatus {
        DatasetStatus {
            in_processing: true,
            in_processing_round: round,
            last_succeed_round: round - 1,
            ..Default::default()
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_running_job_opens_entry_once() {
        let mut status = processing(2);
        assert_eq!(record_round(&mut status, &job(None), at(10)), JobOutcome::Running);
        assert_eq!(record_round(&mut status, &job(None), at(20)), JobOutcome::Running);

        assert_eq!(status.sync_round_statuses.len(), 1);
        let entry = &status.sync_round_statuses[0];
        assert_eq!(entry.round, 2);
        assert_eq!(entry.job_name, "dataset-mnist-round-2");
        assert_eq!(entry.start_time, Some(Time(at(10))));
        assert!(status.in_processing);
    }

    #[test]
    fn test_succeeded_job_closes_round() {
        let mut status = processing(2);
        let done = job(Some(JobStatus {
            succeeded: Some(1),
            start_time: Some(Time(at(5))),
            completion_time: Some(Time(at(50))),
            ..Default::default()
        }));

        assert_eq!(record_round(&mut status, &done, at(60)), JobOutcome::Succeeded);
        assert!(!status.in_processing);
        assert_eq!(status.in_processing_round, 0);
        assert_eq!(status.last_succeed_round, 2);
        assert_eq!(status.last_sync_time, Some(Time(at(50))));

        let entry = &status.sync_round_statuses[0];
        assert!(entry.succeed);
        assert_eq!(entry.start_time, Some(Time(at(5))));
        assert_eq!(entry.end_time, Some(Time(at(50))));
    }

    #[test]
    fn test_failed_job_keeps_last_succeed_round() {
        let mut status = processing(2);
        let failed = job(Some(JobStatus {
            failed: Some(5),
            conditions: Some(vec![JobCondition {
                type_: "Failed".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }));

        assert_eq!(record_round(&mut status, &failed, at(60)), JobOutcome::Failed);
        assert!(!status.in_processing);
        assert_eq!(status.in_processing_round, 0);
        assert_eq!(status.last_succeed_round, 1);
        assert!(!status.sync_round_statuses[0].succeed);
        assert_eq!(status.last_sync_time, None);
    }

    #[test]
    fn test_trim_history() {
        let mut status = DatasetStatus {
            sync_round_statuses: (1..=8)
                .map(|round| DataLoadStatus {
                    round,
                    job_name: format!("dataset-mnist-round-{round}"),
                    start_time: None,
                    end_time: None,
                    succeed: true,
                })
                .collect(),
            ..Default::default()
        };

        trim_history(&mut status, 8);
        let rounds: Vec<_> = status.sync_round_statuses.iter().map(|s| s.round).collect();
        assert_eq!(rounds, vec![4, 5, 6, 7, 8]);
    }
}
