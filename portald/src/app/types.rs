// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Width of the zero-padded job number used for directory names.
pub const JOB_NUMBER_WIDTH: usize = 8;

/// Job state machine: Queueing -> Running -> Completed, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Queueing,
    Running,
    Completed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queueing => "Queueing",
            JobStatus::Running => "Running",
            JobStatus::Completed => "Completed",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == JobStatus::Completed
    }

    fn rank(self) -> u8 {
        match self {
            JobStatus::Queueing => 0,
            JobStatus::Running => 1,
            JobStatus::Completed => 2,
        }
    }

    /// Returns the state to persist when the scheduler reports `reported`.
    /// `None` means no forward transition happened.
    pub fn advance_to(self, reported: JobStatus) -> Option<JobStatus> {
        if reported.rank() > self.rank() {
            Some(reported)
        } else {
            None
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseJobStatusError(pub String);

impl fmt::Display for ParseJobStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown job status: {}", self.0)
    }
}

impl std::error::Error for ParseJobStatusError {}

impl FromStr for JobStatus {
    type Err = ParseJobStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queueing" | "q" => Ok(JobStatus::Queueing),
            "running" | "r" => Ok(JobStatus::Running),
            "completed" | "c" => Ok(JobStatus::Completed),
            other => Err(ParseJobStatusError(other.to_string())),
        }
    }
}

/// Zero-padded rendering of an internal job number, e.g. `00000042`.
pub fn format_job_number(id: i64) -> String {
    format!("{id:0width$}", width = JOB_NUMBER_WIDTH)
}

/// Payload for inserting a job row; the row id becomes the job number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub description: String,
    pub project_id: Option<i64>,
    /// Snapshot of the resource profile description at creation time.
    pub resources: String,
    /// Snapshot of the software profile name at creation time.
    pub software: String,
    pub submission_time: String, // RFC3339
}

/// Full stored job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRecord {
    pub id: i64,
    /// Scheduler job identifier; empty until submission succeeds.
    pub job_id: String,
    pub status: JobStatus,
    pub submission_time: String,
    pub description: String,
    pub project_id: Option<i64>,
    pub project_name: Option<String>,
    pub resources: String,
    pub software: String,
    pub walltime_secs: Option<i64>,
}

impl JobRecord {
    pub fn job_number(&self) -> String {
        format_job_number(self.id)
    }
}

/// Filters and window for job listings. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobQuery {
    pub description_contains: Option<String>,
    pub description_excludes: Option<String>,
    pub project_id: Option<i64>,
    pub status: Option<JobStatus>,
    pub resources: Option<String>,
    pub software: Option<String>,
    pub page: u32,
    pub per_page: u32,
}

impl Default for JobQuery {
    fn default() -> Self {
        Self {
            description_contains: None,
            description_excludes: None,
            project_id: None,
            status: None,
            resources: None,
            software: None,
            page: 1,
            per_page: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectRecord {
    pub id: i64,
    pub name: String,
    pub job_count: i64,
}

/// Which family of user-authored directive snippets a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomKind {
    /// Extra directives appended to a script (`CustomConfig`).
    Config,
    /// Resource directives selectable as a resource profile (`CustomResource`).
    Resource,
}

impl CustomKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CustomKind::Config => "custom config",
            CustomKind::Resource => "custom resource",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomRecord {
    pub id: i64,
    pub label: String,
    pub script_lines: String,
}

/// A configured bundle of scheduler resource directives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProfile {
    pub description: String,
    pub script_lines: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFileSpec {
    pub key: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFiles {
    #[serde(default)]
    pub required: Option<Vec<InputFileSpec>>,
    #[serde(default)]
    pub optional: Option<Vec<InputFileSpec>>,
}

impl InputFiles {
    pub fn required(&self) -> &[InputFileSpec] {
        self.required.as_deref().unwrap_or_default()
    }

    pub fn optional(&self) -> &[InputFileSpec] {
        self.optional.as_deref().unwrap_or_default()
    }

    pub fn declares(&self, key: &str) -> bool {
        self.required()
            .iter()
            .chain(self.optional())
            .any(|spec| spec.key == key)
    }
}

/// A configured application: its input slots and command template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareProfile {
    pub name: String,
    #[serde(default)]
    pub input_files: InputFiles,
    pub commands: String,
    #[serde(default)]
    pub help_text: String,
}

/// An uploaded input file as received from the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Name supplied by the client; only its basename is ever used on disk.
    pub name: String,
    pub content: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Elapsed execution time as reported to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walltime {
    /// Queueing jobs have not started.
    NotApplicable,
    /// Read from the job's WALLTIME marker while running.
    Live(Duration),
    /// Persisted when the job completed.
    Stored(Duration),
    Unknown,
}

impl Walltime {
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Walltime::Live(d) | Walltime::Stored(d) => Some(*d),
            Walltime::NotApplicable | Walltime::Unknown => None,
        }
    }
}

impl fmt::Display for Walltime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Walltime::NotApplicable => f.write_str("N/A"),
            Walltime::Unknown => f.write_str("Unknown"),
            Walltime::Live(d) | Walltime::Stored(d) => {
                let secs = d.as_secs();
                write!(f, "{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
            }
        }
    }
}

/// A job together with its derived walltime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobView {
    pub job: JobRecord,
    pub walltime: Walltime,
}

/// Outcome of one status-refresh sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Jobs whose status was queried.
    pub checked: usize,
    /// Jobs whose stored status moved forward.
    pub updated: usize,
    /// Scheduler errors seen during the sweep.
    pub failures: usize,
    /// True when the error budget ran out and the remaining jobs were skipped.
    pub aborted: bool,
}

/// One refreshed page of the job listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPage {
    pub jobs: Vec<JobView>,
    /// Jobs matching the filters across all pages.
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub sweep: SweepReport,
}
