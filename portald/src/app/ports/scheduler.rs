// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::app::types::JobStatus;

/// Any failure of the external scheduler: non-zero exit, timeout or unreadable output.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct SchedulerError {
    message: String,
}

impl SchedulerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[async_trait]
/// Batch scheduler boundary. Implementations never retry.
pub trait SchedulerPort: Send + Sync {
    /// Submits `script_path` with `working_dir` as the process working directory.
    async fn submit(&self, script_path: &Path, working_dir: &Path) -> Result<String, SchedulerError>;
    async fn status(&self, job_id: &str) -> Result<JobStatus, SchedulerError>;
    async fn delete(&self, job_id: &str) -> Result<(), SchedulerError>;
}
