// Background Jobs Service
//
// The sync reconciler retries CRM sync for tickets a failed or missed
// completion trigger left behind. Jobs are scheduled with tokio-cron-scheduler.

pub mod scheduler;
pub mod sync_reconciler;

pub use scheduler::{
    record, ExecutionLog, JobError, JobExecutionLog, JobResult, JobScheduler, JobStatus,
    SYNC_RECONCILER,
};
pub use sync_reconciler::{SyncReconcilerJob, SyncSweepResult};
