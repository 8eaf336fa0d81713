// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::db::{JobStoreError, PortalStore};
use crate::app::errors::{
    AppError, AppErrorKind, AppResult, codes, invalid_argument, not_found,
};
use crate::app::ports::{CustomStorePort, JobStorePort, ProjectStorePort};
use crate::app::types::{
    CustomKind, CustomRecord, JobQuery, JobRecord, JobStatus, NewJob, ProjectRecord,
};

#[derive(Clone)]
pub struct SqliteStoreAdapter {
    store: Arc<PortalStore>,
}

impl SqliteStoreAdapter {
    pub fn new(store: PortalStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }
}

/// Outbound adapter boundary: persistence errors become app-level errors here
/// so the core never sees sqlx types.
fn map_store_error(err: JobStoreError) -> AppError {
    match err {
        JobStoreError::EmptyProjectName | JobStoreError::EmptyLabel => {
            invalid_argument(err.to_string())
        }
        JobStoreError::ProjectNotFound(_) => not_found(err.to_string()),
        JobStoreError::InvalidStatus { .. } | JobStoreError::Sqlx(_) => {
            tracing::error!("job store failure: {err}");
            AppError::new(AppErrorKind::Internal, codes::INTERNAL_ERROR).with_context(err.to_string())
        }
    }
}

#[async_trait]
impl JobStorePort for SqliteStoreAdapter {
    async fn insert_job(&self, job: &NewJob) -> AppResult<i64> {
        self.store.insert_job(job).await.map_err(map_store_error)
    }

    async fn get_job(&self, id: i64) -> AppResult<Option<JobRecord>> {
        self.store.get_job(id).await.map_err(map_store_error)
    }

    async fn list_jobs(&self, query: &JobQuery) -> AppResult<Vec<JobRecord>> {
        self.store.list_jobs(query).await.map_err(map_store_error)
    }

    async fn count_jobs(&self, query: &JobQuery) -> AppResult<i64> {
        self.store.count_jobs(query).await.map_err(map_store_error)
    }

    async fn list_unfinished_jobs(&self) -> AppResult<Vec<JobRecord>> {
        self.store
            .list_unfinished_jobs()
            .await
            .map_err(map_store_error)
    }

    async fn set_scheduler_id(&self, id: i64, job_id: &str) -> AppResult<()> {
        self.store
            .set_scheduler_id(id, job_id)
            .await
            .map_err(map_store_error)
    }

    async fn update_status(
        &self,
        id: i64,
        status: JobStatus,
        walltime_secs: Option<i64>,
    ) -> AppResult<()> {
        self.store
            .update_status(id, status, walltime_secs)
            .await
            .map_err(map_store_error)
    }

    async fn delete_job(&self, id: i64) -> AppResult<bool> {
        self.store.delete_job(id).await.map_err(map_store_error)
    }
}

#[async_trait]
impl ProjectStorePort for SqliteStoreAdapter {
    async fn insert_project(&self, name: &str) -> AppResult<ProjectRecord> {
        self.store
            .insert_project(name)
            .await
            .map_err(map_store_error)
    }

    async fn get_project(&self, id: i64) -> AppResult<Option<ProjectRecord>> {
        self.store.get_project(id).await.map_err(map_store_error)
    }

    async fn list_projects(&self) -> AppResult<Vec<ProjectRecord>> {
        self.store.list_projects().await.map_err(map_store_error)
    }

    async fn delete_project(&self, id: i64) -> AppResult<bool> {
        self.store.delete_project(id).await.map_err(map_store_error)
    }
}

#[async_trait]
impl CustomStorePort for SqliteStoreAdapter {
    async fn insert_custom(
        &self,
        kind: CustomKind,
        label: &str,
        script_lines: &str,
    ) -> AppResult<CustomRecord> {
        self.store
            .insert_custom(kind, label, script_lines)
            .await
            .map_err(map_store_error)
    }

    async fn get_custom(&self, kind: CustomKind, id: i64) -> AppResult<Option<CustomRecord>> {
        self.store
            .get_custom(kind, id)
            .await
            .map_err(map_store_error)
    }

    async fn list_custom(&self, kind: CustomKind) -> AppResult<Vec<CustomRecord>> {
        self.store.list_custom(kind).await.map_err(map_store_error)
    }

    async fn delete_custom(&self, kind: CustomKind, id: i64) -> AppResult<bool> {
        self.store
            .delete_custom(kind, id)
            .await
            .map_err(map_store_error)
    }
}
