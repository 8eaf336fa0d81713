// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt;

use crate::app::ports::SchedulerError;

pub mod codes {
    pub const INVALID_ARGUMENT: &str = "invalid_argument";
    pub const NOT_FOUND: &str = "not_found";
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const SCHEDULER_ERROR: &str = "scheduler_error";
    pub const DIRECTORY_ERROR: &str = "directory_error";
    pub const CONFIGURATION_ERROR: &str = "configuration_error";
    pub const VALIDATION_ERROR: &str = "validation_error";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppErrorKind {
    InvalidArgument,
    NotFound,
    Internal,
    /// The external scheduler failed, timed out or produced unreadable output.
    Scheduler,
    /// Filesystem failure inside the jobs root.
    Directory,
    /// Bad profile index, malformed template or unknown placeholder.
    Configuration,
    /// User supplied input rejected before any side effect.
    Validation,
}

#[derive(Debug, Clone)]
pub struct AppError {
    kind: AppErrorKind,
    code: &'static str,
    message: String,
    context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind, code: &'static str) -> Self {
        Self {
            kind,
            code,
            message: code.to_string(),
            context: None,
        }
    }

    pub fn with_message(
        kind: AppErrorKind,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn kind(&self) -> AppErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Scheduler failures leave all state intact and may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        self.kind == AppErrorKind::Scheduler
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ctx) = &self.context {
            write!(f, "{} ({})", self.message, ctx)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for AppError {}

impl From<SchedulerError> for AppError {
    fn from(err: SchedulerError) -> Self {
        AppError::with_message(
            AppErrorKind::Scheduler,
            codes::SCHEDULER_ERROR,
            err.to_string(),
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;

pub fn invalid_argument(message: impl Into<String>) -> AppError {
    AppError::with_message(
        AppErrorKind::InvalidArgument,
        codes::INVALID_ARGUMENT,
        message,
    )
}

pub fn not_found(message: impl Into<String>) -> AppError {
    AppError::with_message(AppErrorKind::NotFound, codes::NOT_FOUND, message)
}

pub fn directory_error(message: impl Into<String>) -> AppError {
    AppError::with_message(AppErrorKind::Directory, codes::DIRECTORY_ERROR, message)
}

pub fn configuration_error(message: impl Into<String>) -> AppError {
    AppError::with_message(
        AppErrorKind::Configuration,
        codes::CONFIGURATION_ERROR,
        message,
    )
}

pub fn validation_error(message: impl Into<String>) -> AppError {
    AppError::with_message(AppErrorKind::Validation, codes::VALIDATION_ERROR, message)
}
