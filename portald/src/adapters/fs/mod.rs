// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::app::errors::{AppResult, directory_error, validation_error};
use crate::app::ports::JobDirectoryPort;
use crate::app::services::catalog::{RESERVED_FILE_NAMES, sanitize_file_name};
use crate::app::services::script::SCRIPT_FILE_NAME;
use crate::app::types::format_job_number;

/// Job working directories under a single jobs root:
/// `<jobs_root>/<8-digit job number>`.
#[derive(Clone, Debug)]
pub struct LocalJobDirectories {
    root: PathBuf,
}

impl LocalJobDirectories {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl JobDirectoryPort for LocalJobDirectories {
    fn job_dir(&self, id: i64) -> PathBuf {
        self.root.join(format_job_number(id))
    }

    #[tracing::instrument(name = "fs", level = "debug", skip(self), fields(op = "create_directory"))]
    async fn create_directory(&self, id: i64) -> AppResult<PathBuf> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|err| {
            directory_error(format!(
                "failed to create jobs root {}: {err}",
                self.root.display()
            ))
        })?;
        let dir = self.job_dir(id);
        tokio::fs::create_dir(&dir).await.map_err(|err| {
            directory_error(format!("failed to create {}: {err}", dir.display()))
        })?;
        Ok(dir)
    }

    #[tracing::instrument(name = "fs", level = "debug", skip(self, content), fields(op = "stage_file", bytes = content.len()))]
    async fn stage_file(&self, id: i64, uploaded_name: &str, content: &[u8]) -> AppResult<String> {
        let Some(name) = sanitize_file_name(uploaded_name) else {
            return Err(validation_error(format!(
                "invalid input file name '{uploaded_name}'"
            )));
        };
        if RESERVED_FILE_NAMES.contains(&name) {
            return Err(validation_error(format!(
                "input file name '{name}' is reserved"
            )));
        }
        let path = self.job_dir(id).join(name);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::AlreadyExists => {
                    validation_error(format!("input file '{name}' was already staged"))
                }
                _ => directory_error(format!("failed to write {}: {err}", path.display())),
            })?;
        file.write_all(content).await.map_err(|err| {
            directory_error(format!("failed to write {}: {err}", path.display()))
        })?;
        file.flush().await.map_err(|err| {
            directory_error(format!("failed to write {}: {err}", path.display()))
        })?;
        Ok(name.to_string())
    }

    #[tracing::instrument(name = "fs", level = "debug", skip(self, text), fields(op = "write_script"))]
    async fn write_script(&self, id: i64, text: &str) -> AppResult<PathBuf> {
        let path = self.job_dir(id).join(SCRIPT_FILE_NAME);
        tokio::fs::write(&path, text).await.map_err(|err| {
            directory_error(format!("failed to write {}: {err}", path.display()))
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o755);
            tokio::fs::set_permissions(&path, perms).await.map_err(|err| {
                directory_error(format!(
                    "failed to set permissions on {}: {err}",
                    path.display()
                ))
            })?;
        }
        Ok(path)
    }

    #[tracing::instrument(name = "fs", level = "debug", skip(self), fields(op = "read_marker"))]
    async fn read_marker(&self, id: i64, name: &str) -> AppResult<Option<String>> {
        let path = self.job_dir(id).join(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(directory_error(format!(
                "failed to read {}: {err}",
                path.display()
            ))),
        }
    }

    #[tracing::instrument(name = "fs", level = "debug", skip(self), fields(op = "remove"))]
    async fn remove(&self, id: i64) -> AppResult<()> {
        let dir = self.job_dir(id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(directory_error(format!(
                "failed to remove {}: {err}",
                dir.display()
            ))),
        }
    }
}
