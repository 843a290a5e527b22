// Job Scheduler - Central scheduler for background jobs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{error, info};
use uuid::Uuid;

use super::{SyncReconcilerJob, SyncSweepResult};
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionLog {
    pub id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub items_processed: i32,
    pub errors: Vec<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Completed,
    Failed,
    PartialFailure,
}

const MAX_EXECUTION_LOGS: usize = 100;

/// Shared, bounded history of job runs
pub type ExecutionLog = Arc<RwLock<Vec<JobExecutionLog>>>;

impl JobExecutionLog {
    /// Describe a finished reconciliation sweep.
    pub fn for_sweep(
        job_name: &str,
        started_at: DateTime<Utc>,
        outcome: &Result<SyncSweepResult, StoreError>,
    ) -> Self {
        let (status, items_processed, errors) = match outcome {
            Ok(result) if result.errors.is_empty() => (JobStatus::Completed, result.items(), vec![]),
            Ok(result) => (JobStatus::PartialFailure, result.items(), result.errors.clone()),
            Err(e) => (JobStatus::Failed, 0, vec![e.to_string()]),
        };

        let completed_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_name: job_name.to_string(),
            started_at,
            completed_at: Some(completed_at),
            status,
            items_processed,
            errors,
            duration_ms: Some((completed_at - started_at).num_milliseconds()),
        }
    }
}

/// Cron expression firing every `minutes` minutes
pub fn every_minutes(minutes: u32) -> JobResult<String> {
    if minutes == 0 || minutes > 59 {
        return Err(JobError::ConfigError(format!(
            "sweep interval must be between 1 and 59 minutes, got {}",
            minutes
        )));
    }
    Ok(format!("0 */{} * * * *", minutes))
}

pub struct JobScheduler {
    scheduler: TokioScheduler,
    reconciler: Arc<SyncReconcilerJob>,
    sweep_interval_minutes: u32,
    execution_log: ExecutionLog,
}

impl JobScheduler {
    pub async fn new(
        reconciler: Arc<SyncReconcilerJob>,
        sweep_interval_minutes: u32,
        execution_log: ExecutionLog,
    ) -> JobResult<Self> {
        let scheduler = TokioScheduler::new().await?;

        Ok(Self {
            scheduler,
            reconciler,
            sweep_interval_minutes,
            execution_log,
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        info!("Starting background job scheduler");

        self.schedule_sync_reconciler().await?;
        self.scheduler.start().await?;

        info!("Background job scheduler started successfully");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down background job scheduler");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    async fn schedule_sync_reconciler(&self) -> JobResult<()> {
        let interval = self.sweep_interval_minutes;
        let cron_expr = every_minutes(interval)?;

        let reconciler = self.reconciler.clone();
        let log = self.execution_log.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let reconciler = reconciler.clone();
            let log = log.clone();

            Box::pin(async move {
                info!("Running sync reconciler job");
                let started_at = Utc::now();
                let outcome = reconciler.run().await;
                if let Err(e) = &outcome {
                    error!("Sync reconciler failed: {}", e);
                }
                record(&log, JobExecutionLog::for_sweep(SYNC_RECONCILER, started_at, &outcome)).await;
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled sync reconciler to run every {} minutes", interval);

        Ok(())
    }
}

pub const SYNC_RECONCILER: &str = "Sync Reconciler";

/// Append a run, dropping the oldest past the bound.
pub async fn record(log: &ExecutionLog, entry: JobExecutionLog) {
    let mut logs = log.write().await;
    logs.push(entry);
    if logs.len() > MAX_EXECUTION_LOGS {
        logs.remove(0);
    }
}
