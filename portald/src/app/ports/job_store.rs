// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::{JobQuery, JobRecord, JobStatus, NewJob};

#[async_trait]
/// Persistence boundary for job records.
/// Every call is a single-row operation; there are no cross-row transactions.
pub trait JobStorePort: Send + Sync {
    /// Inserts a Queueing job with an empty scheduler id and returns its job number.
    async fn insert_job(&self, job: &NewJob) -> AppResult<i64>;
    async fn get_job(&self, id: i64) -> AppResult<Option<JobRecord>>;
    /// Newest first, windowed by the query's page.
    async fn list_jobs(&self, query: &JobQuery) -> AppResult<Vec<JobRecord>>;
    async fn count_jobs(&self, query: &JobQuery) -> AppResult<i64>;
    async fn list_unfinished_jobs(&self) -> AppResult<Vec<JobRecord>>;
    async fn set_scheduler_id(&self, id: i64, job_id: &str) -> AppResult<()>;
    async fn update_status(
        &self,
        id: i64,
        status: JobStatus,
        walltime_secs: Option<i64>,
    ) -> AppResult<()>;
    async fn delete_job(&self, id: i64) -> AppResult<bool>;
}
