// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::PathBuf;

use async_trait::async_trait;

use crate::app::errors::AppResult;

#[async_trait]
/// Per-job working directory boundary.
/// The directory path is a pure function of the job number.
pub trait JobDirectoryPort: Send + Sync {
    fn job_dir(&self, id: i64) -> PathBuf;
    /// Fails if the directory already exists.
    async fn create_directory(&self, id: i64) -> AppResult<PathBuf>;
    /// Writes `content` under the basename of `uploaded_name` and returns that basename.
    async fn stage_file(&self, id: i64, uploaded_name: &str, content: &[u8]) -> AppResult<String>;
    /// Writes the submission script and returns its path.
    async fn write_script(&self, id: i64, text: &str) -> AppResult<PathBuf>;
    /// Reads a marker file written by the running job; `None` when absent.
    async fn read_marker(&self, id: i64, name: &str) -> AppResult<Option<String>>;
    /// Recursive delete; an already missing directory is not an error.
    async fn remove(&self, id: i64) -> AppResult<()>;
}
