// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::ProjectRecord;

#[async_trait]
/// Persistence boundary for project groupings.
pub trait ProjectStorePort: Send + Sync {
    async fn insert_project(&self, name: &str) -> AppResult<ProjectRecord>;
    async fn get_project(&self, id: i64) -> AppResult<Option<ProjectRecord>>;
    async fn list_projects(&self) -> AppResult<Vec<ProjectRecord>>;
    /// Jobs of a deleted project keep existing with no project.
    async fn delete_project(&self, id: i64) -> AppResult<bool>;
}
