// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::app::ports::{SchedulerError, SchedulerPort};
use crate::app::services::scheduler_status::parse_scheduler_status;
use crate::app::types::JobStatus;

pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_DELETE_TIMEOUT: Duration = Duration::from_secs(10);

const TIMED_OUT: &str = "Scheduler command timed out";

#[derive(Clone, Debug)]
pub struct SchedulerSettings {
    pub submit_command: Vec<String>,
    pub status_command: Vec<String>,
    pub delete_command: Vec<String>,
    /// Appended as the last argument of every call when set.
    pub cluster: Option<String>,
    pub submit_timeout: Duration,
    pub status_timeout: Duration,
    pub delete_timeout: Duration,
}

/// Scheduler gateway that shells out to the site's scheduler tools.
/// Every call is bounded by its own timeout and the child is killed when the
/// deadline passes.
#[derive(Clone, Debug)]
pub struct ProcessScheduler {
    settings: SchedulerSettings,
}

impl ProcessScheduler {
    pub fn new(settings: SchedulerSettings) -> Self {
        Self { settings }
    }

    async fn run(
        &self,
        command: &[String],
        args: Vec<OsString>,
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<String, SchedulerError> {
        let (program, leading) = command
            .split_first()
            .ok_or_else(|| SchedulerError::new("scheduler command is not configured"))?;

        let mut cmd = Command::new(program);
        cmd.args(leading)
            .args(args)
            .args(self.settings.cluster.iter())
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(program = %program, cwd = %working_dir.display(), "spawning scheduler command");
        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return Err(SchedulerError::new(format!(
                    "failed to run {program}: {err}"
                )));
            }
            Err(_) => {
                tracing::warn!(program = %program, timeout_secs = timeout.as_secs_f64(), "scheduler command timed out");
                return Err(SchedulerError::new(TIMED_OUT));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("{program} exited with {}", output.status)
            } else {
                stderr
            };
            return Err(SchedulerError::new(message));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Directory used for calls that have no job directory of their own.
fn neutral_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(std::env::temp_dir)
}

#[async_trait]
impl SchedulerPort for ProcessScheduler {
    #[tracing::instrument(name = "scheduler", level = "debug", skip(self), fields(op = "submit"))]
    async fn submit(&self, script_path: &Path, working_dir: &Path) -> Result<String, SchedulerError> {
        if !script_path.is_file() {
            return Err(SchedulerError::new(format!(
                "submission script {} does not exist",
                script_path.display()
            )));
        }
        let job_id = self
            .run(
                &self.settings.submit_command,
                vec![script_path.as_os_str().to_os_string()],
                working_dir,
                self.settings.submit_timeout,
            )
            .await?;
        if job_id.is_empty() {
            return Err(SchedulerError::new("scheduler returned an empty job id"));
        }
        Ok(job_id)
    }

    #[tracing::instrument(name = "scheduler", level = "debug", skip(self), fields(op = "status"))]
    async fn status(&self, job_id: &str) -> Result<JobStatus, SchedulerError> {
        let output = self
            .run(
                &self.settings.status_command,
                vec![OsString::from(job_id)],
                &neutral_dir(),
                self.settings.status_timeout,
            )
            .await?;
        parse_scheduler_status(&output).ok_or_else(|| {
            SchedulerError::new(format!("unrecognised scheduler status '{output}'"))
        })
    }

    #[tracing::instrument(name = "scheduler", level = "debug", skip(self), fields(op = "delete"))]
    async fn delete(&self, job_id: &str) -> Result<(), SchedulerError> {
        self.run(
            &self.settings.delete_command,
            vec![OsString::from(job_id)],
            &neutral_dir(),
            self.settings.delete_timeout,
        )
        .await?;
        Ok(())
    }
}
