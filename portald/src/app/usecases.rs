// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use time::format_description::well_known::Rfc3339;
use tokio::time::sleep;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes, not_found};
use crate::app::ports::{
    ClockPort, CustomStorePort, JobDirectoryPort, JobStorePort, ProjectStorePort, SchedulerPort,
    TelemetryEvent, TelemetryPort,
};
use crate::app::services::directives::DirectiveValidator;
use crate::app::services::script::{self, ScriptInputs};
use crate::app::services::{catalog, walltime};
use crate::app::types::{
    CustomKind, CustomRecord, JobPage, JobQuery, JobRecord, JobStatus, JobView, NewJob,
    ProjectRecord, ResourceProfile, SoftwareProfile, SweepReport, UploadedFile, Walltime,
    format_job_number,
};

/// Everything the lifecycle manager reads from configuration.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub script_template: String,
    pub resources: Vec<ResourceProfile>,
    pub software: Vec<SoftwareProfile>,
    pub directives: DirectiveValidator,
    pub delete_grace_period: Duration,
    /// Scheduler errors tolerated per sweep; 0 aborts on the first one.
    pub sweep_error_budget: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CreateJobInput {
    pub description: String,
    /// Input-file slot key to uploaded file.
    pub input_files: BTreeMap<String, UploadedFile>,
    pub project_id: Option<i64>,
    pub resource_index: usize,
    pub software_index: usize,
    pub custom_config_id: Option<i64>,
}

/// The job lifecycle manager: creates, refreshes and deletes jobs while
/// keeping the record, the working directory and the scheduler entry aligned.
#[derive(Clone)]
pub struct UseCases {
    pub(crate) jobs: Arc<dyn JobStorePort>,
    pub(crate) projects: Arc<dyn ProjectStorePort>,
    pub(crate) customs: Arc<dyn CustomStorePort>,
    pub(crate) dirs: Arc<dyn JobDirectoryPort>,
    pub(crate) scheduler: Arc<dyn SchedulerPort>,
    pub(crate) clock: Arc<dyn ClockPort>,
    pub(crate) telemetry: Arc<dyn TelemetryPort>,
    pub(crate) settings: Arc<LifecycleSettings>,
}

impl UseCases {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        jobs: Arc<dyn JobStorePort>,
        projects: Arc<dyn ProjectStorePort>,
        customs: Arc<dyn CustomStorePort>,
        dirs: Arc<dyn JobDirectoryPort>,
        scheduler: Arc<dyn SchedulerPort>,
        clock: Arc<dyn ClockPort>,
        telemetry: Arc<dyn TelemetryPort>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            jobs,
            projects,
            customs,
            dirs,
            scheduler,
            clock,
            telemetry,
            settings: Arc::new(settings),
        }
    }

    /// Configured resource profiles followed by stored custom resources.
    pub async fn resource_choices(&self) -> AppResult<Vec<ResourceProfile>> {
        let custom = self.customs.list_custom(CustomKind::Resource).await?;
        Ok(catalog::resource_profiles(&self.settings.resources, &custom))
    }

    pub fn software_profiles(&self) -> &[SoftwareProfile] {
        &self.settings.software
    }

    /// Creates a job and submits it. The record only survives if submission
    /// succeeded; any later failure removes the directory and the record.
    pub async fn create_job(&self, input: CreateJobInput) -> AppResult<JobRecord> {
        let resources = self.resource_choices().await?;
        let resource = catalog::resolve_resource(&resources, input.resource_index)?;
        let software = catalog::resolve_software(&self.settings.software, input.software_index)?;
        catalog::check_input_slots(software, input.input_files.keys())?;
        catalog::check_upload_names(&input.input_files)?;

        let custom = match input.custom_config_id {
            Some(id) => Some(
                self.customs
                    .get_custom(CustomKind::Config, id)
                    .await?
                    .ok_or_else(|| not_found(format!("custom config {id} does not exist")))?,
            ),
            None => None,
        };
        if let Some(project_id) = input.project_id {
            if self.projects.get_project(project_id).await?.is_none() {
                return Err(not_found(format!("project {project_id} does not exist")));
            }
        }

        let submission_time = self.clock.now_utc().format(&Rfc3339).map_err(|err| {
            AppError::new(AppErrorKind::Internal, codes::INTERNAL_ERROR)
                .with_context(format!("failed to format submission time: {err}"))
        })?;
        let id = self
            .jobs
            .insert_job(&NewJob {
                description: input.description.trim().to_string(),
                project_id: input.project_id,
                resources: resource.description.clone(),
                software: software.name.clone(),
                submission_time,
            })
            .await?;

        let job_id = match self
            .provision_and_submit(id, &input, &resource, software, custom.as_ref())
            .await
        {
            Ok(job_id) => job_id,
            Err(err) => {
                self.roll_back_creation(id, &software.name, &err).await;
                return Err(err);
            }
        };

        if let Err(err) = self.jobs.set_scheduler_id(id, &job_id).await {
            if let Err(cancel_err) = self.scheduler.delete(&job_id).await {
                tracing::warn!(
                    job_id = %job_id,
                    "failed to cancel scheduler job after persistence failure: {cancel_err}"
                );
            }
            self.roll_back_creation(id, &software.name, &err).await;
            return Err(err);
        }

        let job = self.jobs.get_job(id).await?.ok_or_else(|| {
            AppError::new(AppErrorKind::Internal, codes::INTERNAL_ERROR)
                .with_context(format!("job {id} vanished after creation"))
        })?;
        self.telemetry.event(
            "job_created",
            TelemetryEvent {
                job_number: Some(job.job_number()),
                job_id: Some(job.job_id.clone()),
                status: Some(job.status.to_string()),
                software: Some(job.software.clone()),
                ..Default::default()
            },
        );
        Ok(job)
    }

    async fn provision_and_submit(
        &self,
        id: i64,
        input: &CreateJobInput,
        resource: &ResourceProfile,
        software: &SoftwareProfile,
        custom: Option<&CustomRecord>,
    ) -> AppResult<String> {
        let dir = self.dirs.create_directory(id).await?;

        let mut staged = BTreeMap::new();
        for (key, file) in &input.input_files {
            let name = self.dirs.stage_file(id, &file.name, &file.content).await?;
            staged.insert(key.clone(), name);
        }

        let bindings = catalog::file_bindings(software, &staged);
        let text = script::render_script(&ScriptInputs {
            template: &self.settings.script_template,
            commands_template: &software.commands,
            resource_directives: &resource.script_lines,
            custom_directives: custom.map(|record| record.script_lines.as_str()),
            job_name: script::job_display_name(&format_job_number(id)),
            file_bindings: &bindings,
        })?;
        let script_path = self.dirs.write_script(id, &text).await?;

        let job_id = self.scheduler.submit(&script_path, &dir).await?;
        Ok(job_id)
    }

    async fn roll_back_creation(&self, id: i64, software: &str, cause: &AppError) {
        if let Err(err) = self.dirs.remove(id).await {
            tracing::warn!(job = id, "failed to remove job directory during rollback: {err}");
        }
        if let Err(err) = self.jobs.delete_job(id).await {
            tracing::warn!(job = id, "failed to remove job record during rollback: {err}");
        }
        self.telemetry.event(
            "job_submit_failed",
            TelemetryEvent {
                job_number: Some(format_job_number(id)),
                software: Some(software.to_string()),
                detail: Some(cause.to_string()),
                ..Default::default()
            },
        );
    }

    /// Queries the scheduler for each non-terminal job in the given order and
    /// persists forward transitions. Scheduler errors count against the error
    /// budget; once it is exhausted the remaining jobs are left untouched.
    pub async fn refresh_statuses(&self, jobs: &[JobRecord]) -> AppResult<SweepReport> {
        let mut report = SweepReport::default();
        for job in jobs {
            if job.status.is_terminal() {
                continue;
            }
            if job.job_id.is_empty() {
                tracing::debug!(job = job.id, "job has no scheduler id; skipping");
                continue;
            }

            report.checked += 1;
            let reported = match self.scheduler.status(&job.job_id).await {
                Ok(status) => status,
                Err(err) => {
                    report.failures += 1;
                    if report.failures > self.settings.sweep_error_budget {
                        tracing::warn!(
                            job_id = %job.job_id,
                            failures = report.failures,
                            "aborting status sweep: {err}"
                        );
                        self.telemetry.event(
                            "sweep_aborted",
                            TelemetryEvent {
                                job_number: Some(job.job_number()),
                                job_id: Some(job.job_id.clone()),
                                detail: Some(err.to_string()),
                                ..Default::default()
                            },
                        );
                        report.aborted = true;
                        break;
                    }
                    tracing::debug!(job_id = %job.job_id, "status query failed: {err}");
                    continue;
                }
            };

            let Some(next) = job.status.advance_to(reported) else {
                continue;
            };
            let walltime_secs = if next == JobStatus::Completed {
                self.stored_walltime(job.id).await
            } else {
                None
            };
            self.jobs.update_status(job.id, next, walltime_secs).await?;
            report.updated += 1;
            self.telemetry.event(
                "job_status_changed",
                TelemetryEvent {
                    job_number: Some(job.job_number()),
                    job_id: Some(job.job_id.clone()),
                    status: Some(next.to_string()),
                    software: Some(job.software.clone()),
                    ..Default::default()
                },
            );
        }
        Ok(report)
    }

    /// Sweeps every non-terminal job, newest first.
    pub async fn refresh_unfinished(&self) -> AppResult<SweepReport> {
        let jobs = self.jobs.list_unfinished_jobs().await?;
        self.refresh_statuses(&jobs).await
    }

    async fn stored_walltime(&self, id: i64) -> Option<i64> {
        let marker = self.read_walltime_marker(id).await?;
        let elapsed = walltime::parse_marker(&marker)?;
        i64::try_from(walltime::round_walltime(elapsed).as_secs()).ok()
    }

    async fn read_walltime_marker(&self, id: i64) -> Option<String> {
        match self.dirs.read_marker(id, walltime::WALLTIME_MARKER).await {
            Ok(contents) => contents,
            Err(err) => {
                tracing::warn!(job = id, "failed to read walltime marker: {err}");
                None
            }
        }
    }

    async fn walltime_for(&self, job: &JobRecord) -> Walltime {
        let marker = if job.status == JobStatus::Running {
            self.read_walltime_marker(job.id).await
        } else {
            None
        };
        walltime::report(job.status, job.walltime_secs, marker.as_deref())
    }

    async fn view(&self, job: JobRecord) -> JobView {
        let walltime = self.walltime_for(&job).await;
        JobView { job, walltime }
    }

    /// Loads a page, sweeps its unfinished jobs, then returns the page again
    /// with the refreshed statuses.
    pub async fn list_jobs(&self, query: &JobQuery) -> AppResult<JobPage> {
        let query = JobQuery {
            page: query.page.max(1),
            per_page: query.per_page.max(1),
            ..query.clone()
        };
        let visible = self.jobs.list_jobs(&query).await?;
        let sweep = self.refresh_statuses(&visible).await?;
        let refreshed = if sweep.updated > 0 {
            self.jobs.list_jobs(&query).await?
        } else {
            visible
        };
        let total = self.jobs.count_jobs(&query).await?;

        let mut jobs = Vec::with_capacity(refreshed.len());
        for job in refreshed {
            jobs.push(self.view(job).await);
        }
        Ok(JobPage {
            jobs,
            total,
            page: query.page,
            per_page: query.per_page,
            sweep,
        })
    }

    pub async fn get_job(&self, id: i64) -> AppResult<JobView> {
        let job = self
            .jobs
            .get_job(id)
            .await?
            .ok_or_else(|| not_found(format!("job {id} does not exist")))?;
        Ok(self.view(job).await)
    }

    /// Cancels the scheduler entry of an unfinished job, waits out the grace
    /// period, then removes the directory and the record. A failed cancel
    /// leaves everything in place.
    pub async fn delete_job(&self, id: i64) -> AppResult<()> {
        let job = self
            .jobs
            .get_job(id)
            .await?
            .ok_or_else(|| not_found(format!("job {id} does not exist")))?;

        if !job.status.is_terminal() && !job.job_id.is_empty() {
            self.scheduler.delete(&job.job_id).await?;
            if !self.settings.delete_grace_period.is_zero() {
                sleep(self.settings.delete_grace_period).await;
            }
        }

        self.dirs.remove(id).await?;
        self.jobs.delete_job(id).await?;
        self.telemetry.event(
            "job_deleted",
            TelemetryEvent {
                job_number: Some(job.job_number()),
                job_id: Some(job.job_id.clone()),
                status: Some(job.status.to_string()),
                software: Some(job.software),
                ..Default::default()
            },
        );
        Ok(())
    }

    pub async fn create_project(&self, name: &str) -> AppResult<ProjectRecord> {
        self.projects.insert_project(name.trim()).await
    }

    pub async fn list_projects(&self) -> AppResult<Vec<ProjectRecord>> {
        self.projects.list_projects().await
    }

    /// Jobs of the project stay, detached from it.
    pub async fn delete_project(&self, id: i64) -> AppResult<()> {
        if self.projects.delete_project(id).await? {
            Ok(())
        } else {
            Err(not_found(format!("project {id} does not exist")))
        }
    }

    /// Stores a directive snippet after checking every line against the
    /// configured pattern.
    pub async fn add_custom(
        &self,
        kind: CustomKind,
        label: &str,
        script_lines: &str,
    ) -> AppResult<CustomRecord> {
        let script_lines = script_lines.trim();
        self.settings.directives.validate(script_lines)?;
        self.customs
            .insert_custom(kind, label.trim(), script_lines)
            .await
    }

    pub async fn list_custom(&self, kind: CustomKind) -> AppResult<Vec<CustomRecord>> {
        self.customs.list_custom(kind).await
    }

    pub async fn delete_custom(&self, kind: CustomKind, id: i64) -> AppResult<()> {
        if self.customs.delete_custom(kind, id).await? {
            Ok(())
        } else {
            Err(not_found(format!("{} {id} does not exist", kind.as_str())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use time::macros::datetime;

    use crate::adapters::db::{PortalStore, SqliteStoreAdapter};
    use crate::adapters::fs::LocalJobDirectories;
    use crate::adapters::time::FixedClock;
    use crate::app::ports::{NoopTelemetry, SchedulerError};
    use crate::app::types::{InputFileSpec, InputFiles};

    const TEMPLATE: &str = "#!/bin/bash\n#PBS -N {{ job_name }}\n{{ resources }}\n{{ custom_config }}cd $PBS_O_WORKDIR\n{{ commands }}\n";

    /// Scheduler fake answering from per-operation scripts; an unscripted
    /// call panics.
    #[derive(Default)]
    struct ScriptedScheduler {
        submits: Mutex<VecDeque<Result<String, SchedulerError>>>,
        statuses: Mutex<VecDeque<Result<JobStatus, SchedulerError>>>,
        deletes: Mutex<VecDeque<Result<(), SchedulerError>>>,
        calls: Mutex<Vec<String>>,
        submitted_from: Mutex<Vec<PathBuf>>,
        watched_dir: Mutex<Option<PathBuf>>,
        dir_present_on_delete: Mutex<Vec<bool>>,
    }

    impl ScriptedScheduler {
        fn with_submit(self, result: Result<&str, &str>) -> Self {
            self.submits.lock().unwrap().push_back(
                result
                    .map(str::to_string)
                    .map_err(SchedulerError::new),
            );
            self
        }

        fn with_status(self, result: Result<JobStatus, &str>) -> Self {
            self.statuses
                .lock()
                .unwrap()
                .push_back(result.map_err(SchedulerError::new));
            self
        }

        fn with_delete(self, result: Result<(), &str>) -> Self {
            self.deletes
                .lock()
                .unwrap()
                .push_back(result.map_err(SchedulerError::new));
            self
        }

        fn push_status(&self, result: Result<JobStatus, &str>) {
            self.statuses
                .lock()
                .unwrap()
                .push_back(result.map_err(SchedulerError::new));
        }

        fn push_delete(&self, result: Result<(), &str>) {
            self.deletes
                .lock()
                .unwrap()
                .push_back(result.map_err(SchedulerError::new));
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl SchedulerPort for ScriptedScheduler {
        async fn submit(
            &self,
            script_path: &Path,
            working_dir: &Path,
        ) -> Result<String, SchedulerError> {
            assert!(script_path.is_file(), "script must exist before submit");
            self.calls
                .lock()
                .unwrap()
                .push(format!("submit:{}", script_path.display()));
            self.submitted_from
                .lock()
                .unwrap()
                .push(working_dir.to_path_buf());
            self.submits
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected submit of {}", script_path.display()))
        }

        async fn status(&self, job_id: &str) -> Result<JobStatus, SchedulerError> {
            self.calls.lock().unwrap().push(format!("status:{job_id}"));
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected status query for {job_id}"))
        }

        async fn delete(&self, job_id: &str) -> Result<(), SchedulerError> {
            self.calls.lock().unwrap().push(format!("delete:{job_id}"));
            if let Some(dir) = self.watched_dir.lock().unwrap().as_ref() {
                self.dir_present_on_delete.lock().unwrap().push(dir.exists());
            }
            self.deletes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected delete of {job_id}"))
        }
    }

    struct Harness {
        usecases: UseCases,
        scheduler: Arc<ScriptedScheduler>,
        dirs: LocalJobDirectories,
        jobs_root: PathBuf,
        _tmp: TempDir,
    }

    impl Harness {
        fn job_dir(&self, id: i64) -> PathBuf {
            self.dirs.job_dir(id)
        }

        fn residual_dirs(&self) -> usize {
            match std::fs::read_dir(&self.jobs_root) {
                Ok(entries) => entries.count(),
                Err(_) => 0,
            }
        }

        async fn job_count(&self) -> i64 {
            self.usecases
                .jobs
                .count_jobs(&JobQuery::default())
                .await
                .unwrap()
        }

        async fn record(&self, id: i64) -> Option<JobRecord> {
            self.usecases.jobs.get_job(id).await.unwrap()
        }
    }

    fn gaussian() -> SoftwareProfile {
        SoftwareProfile {
            name: "Gaussian".to_string(),
            input_files: InputFiles {
                required: Some(vec![InputFileSpec {
                    key: "com".to_string(),
                    description: "Gaussian input".to_string(),
                }]),
                optional: Some(vec![InputFileSpec {
                    key: "fchk".to_string(),
                    description: "formatted checkpoint".to_string(),
                }]),
            },
            commands: "g16 {{ com }} {{ fchk }}".to_string(),
            help_text: String::new(),
        }
    }

    fn settings(sweep_error_budget: usize) -> LifecycleSettings {
        LifecycleSettings {
            script_template: TEMPLATE.to_string(),
            resources: vec![ResourceProfile {
                description: "1 core, 1 hour".to_string(),
                script_lines: "#PBS -l select=1:ncpus=1\n#PBS -l walltime=01:00:00".to_string(),
            }],
            software: vec![gaussian()],
            directives: DirectiveValidator::new(r"#PBS\s+-[a-zA-Z]").unwrap(),
            delete_grace_period: Duration::ZERO,
            sweep_error_budget,
        }
    }

    async fn harness_with(scheduler: ScriptedScheduler, sweep_error_budget: usize) -> Harness {
        harness_with_settings(scheduler, settings(sweep_error_budget)).await
    }

    async fn harness_with_settings(
        scheduler: ScriptedScheduler,
        lifecycle: LifecycleSettings,
    ) -> Harness {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(SqliteStoreAdapter::new(
            PortalStore::open_memory().await.unwrap(),
        ));
        let jobs_root = tmp.path().join("jobs");
        let dirs = LocalJobDirectories::new(&jobs_root);
        let scheduler = Arc::new(scheduler);
        let usecases = UseCases::new(
            store.clone(),
            store.clone(),
            store,
            Arc::new(dirs.clone()),
            scheduler.clone(),
            Arc::new(FixedClock(datetime!(2026-01-05 10:00 UTC))),
            Arc::new(NoopTelemetry),
            lifecycle,
        );
        Harness {
            usecases,
            scheduler,
            dirs,
            jobs_root,
            _tmp: tmp,
        }
    }

    async fn harness(scheduler: ScriptedScheduler) -> Harness {
        harness_with(scheduler, 0).await
    }

    fn water_input() -> CreateJobInput {
        let mut input_files = BTreeMap::new();
        input_files.insert(
            "com".to_string(),
            UploadedFile::new("../inputs/water.com", b"%chk=water\n#p hf/sto-3g\n".to_vec()),
        );
        CreateJobInput {
            description: "water optimisation".to_string(),
            input_files,
            ..Default::default()
        }
    }

    fn script_of(h: &Harness, id: i64) -> String {
        std::fs::read_to_string(h.job_dir(id).join(script::SCRIPT_FILE_NAME)).unwrap()
    }

    #[tokio::test]
    async fn create_job_renders_supplied_and_empty_optional_slots() {
        let h = harness(ScriptedScheduler::default().with_submit(Ok("101.pbs01"))).await;
        let job = h.usecases.create_job(water_input()).await.unwrap();

        assert_eq!(job.id, 1);
        assert_eq!(job.job_id, "101.pbs01");
        assert_eq!(job.status, JobStatus::Queueing);
        assert_eq!(job.resources, "1 core, 1 hour");
        assert_eq!(job.software, "Gaussian");
        assert_eq!(job.submission_time, "2026-01-05T10:00:00Z");
        assert_eq!(job.description, "water optimisation");

        let script = script_of(&h, 1);
        assert!(script.contains("#PBS -N portal_job_00000001\n"));
        assert!(script.contains("#PBS -l select=1:ncpus=1\n"));
        assert!(script.lines().any(|line| line.trim_end() == "g16 water.com"));
        assert!(h.job_dir(1).join("water.com").is_file());
        assert_eq!(
            h.scheduler.submitted_from.lock().unwrap().as_slice(),
            &[h.job_dir(1)]
        );
    }

    #[tokio::test]
    async fn failed_submission_leaves_no_record_or_directory() {
        let h = harness(ScriptedScheduler::default().with_submit(Err("qsub: Unknown queue"))).await;
        let err = h.usecases.create_job(water_input()).await.unwrap_err();

        assert_eq!(err.kind(), AppErrorKind::Scheduler);
        assert_eq!(err.message(), "qsub: Unknown queue");
        assert!(err.is_retryable());
        assert_eq!(h.job_count().await, 0);
        assert!(h.record(1).await.is_none());
        assert!(!h.job_dir(1).exists());
        assert_eq!(h.residual_dirs(), 0);
    }

    #[tokio::test]
    async fn job_numbers_keep_increasing_after_rollback() {
        let h = harness(
            ScriptedScheduler::default()
                .with_submit(Err("qsub: down"))
                .with_submit(Ok("7.pbs")),
        )
        .await;
        h.usecases.create_job(water_input()).await.unwrap_err();
        let job = h.usecases.create_job(water_input()).await.unwrap();
        assert_eq!(job.id, 2);
        assert!(!h.job_dir(1).exists());
        assert!(h.job_dir(2).is_dir());
        assert_eq!(h.residual_dirs(), 1);
    }

    #[tokio::test]
    async fn missing_required_file_is_rejected_before_any_side_effect() {
        let h = harness(ScriptedScheduler::default()).await;
        let input = CreateJobInput {
            description: "no inputs".to_string(),
            ..Default::default()
        };
        let err = h.usecases.create_job(input).await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::Validation);
        assert_eq!(h.job_count().await, 0);
        assert_eq!(h.residual_dirs(), 0);
        assert!(h.scheduler.calls().is_empty());
    }

    #[tokio::test]
    async fn undeclared_slot_is_rejected() {
        let h = harness(ScriptedScheduler::default()).await;
        let mut input = water_input();
        input
            .input_files
            .insert("log".to_string(), UploadedFile::new("water.log", b"".to_vec()));
        let err = h.usecases.create_job(input).await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::Validation);
        assert_eq!(h.job_count().await, 0);
    }

    #[tokio::test]
    async fn colliding_or_reserved_file_names_are_rejected_before_any_side_effect() {
        let h = harness(ScriptedScheduler::default()).await;
        let mut input = water_input();
        input.input_files.insert(
            "fchk".to_string(),
            UploadedFile::new("other/water.com", b"not a checkpoint".to_vec()),
        );
        let err = h.usecases.create_job(input).await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::Validation);

        let mut input = water_input();
        input
            .input_files
            .insert("com".to_string(), UploadedFile::new("WALLTIME", b"1".to_vec()));
        let err = h.usecases.create_job(input).await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::Validation);

        assert_eq!(h.job_count().await, 0);
        assert_eq!(h.residual_dirs(), 0);
        assert!(h.scheduler.calls().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_profile_is_a_configuration_error() {
        let h = harness(ScriptedScheduler::default()).await;
        let mut input = water_input();
        input.resource_index = 4;
        let err = h.usecases.create_job(input).await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::Configuration);

        let mut input = water_input();
        input.software_index = 1;
        let err = h.usecases.create_job(input).await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::Configuration);
        assert_eq!(h.job_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_project_is_rejected_without_residue() {
        let h = harness(ScriptedScheduler::default()).await;
        let mut input = water_input();
        input.project_id = Some(42);
        let err = h.usecases.create_job(input).await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::NotFound);
        assert_eq!(h.job_count().await, 0);
        assert_eq!(h.residual_dirs(), 0);
    }

    #[tokio::test]
    async fn running_walltime_is_live_and_completed_walltime_is_rounded() {
        let h = harness(
            ScriptedScheduler::default()
                .with_submit(Ok("55.pbs"))
                .with_status(Ok(JobStatus::Running)),
        )
        .await;
        let job = h.usecases.create_job(water_input()).await.unwrap();
        std::fs::write(h.job_dir(job.id).join(walltime::WALLTIME_MARKER), "1000").unwrap();

        let page = h.usecases.list_jobs(&JobQuery::default()).await.unwrap();
        assert_eq!(page.sweep.updated, 1);
        assert_eq!(page.jobs.len(), 1);
        assert_eq!(page.jobs[0].job.status, JobStatus::Running);
        assert_eq!(page.jobs[0].walltime, Walltime::Live(Duration::from_secs(1000)));
        assert_eq!(page.jobs[0].job.walltime_secs, None);

        h.scheduler.push_status(Ok(JobStatus::Completed));
        let page = h.usecases.list_jobs(&JobQuery::default()).await.unwrap();
        assert_eq!(page.jobs[0].job.status, JobStatus::Completed);
        assert_eq!(page.jobs[0].job.walltime_secs, Some(1005));
        assert_eq!(
            page.jobs[0].walltime,
            Walltime::Stored(Duration::from_secs(1005))
        );

        let view = h.usecases.get_job(job.id).await.unwrap();
        assert_eq!(view.walltime.to_string(), "0:16:45");

        // Completed jobs are no longer queried.
        let page = h.usecases.list_jobs(&JobQuery::default()).await.unwrap();
        assert_eq!(page.sweep.checked, 0);
    }

    #[tokio::test]
    async fn completed_without_marker_reports_unknown_walltime() {
        let h = harness(
            ScriptedScheduler::default()
                .with_submit(Ok("56.pbs"))
                .with_status(Ok(JobStatus::Completed)),
        )
        .await;
        let job = h.usecases.create_job(water_input()).await.unwrap();
        let report = h.usecases.refresh_unfinished().await.unwrap();
        assert_eq!(report.updated, 1);

        let view = h.usecases.get_job(job.id).await.unwrap();
        assert_eq!(view.job.status, JobStatus::Completed);
        assert_eq!(view.walltime, Walltime::Unknown);
    }

    #[tokio::test]
    async fn queueing_job_has_no_walltime() {
        let h = harness(ScriptedScheduler::default().with_submit(Ok("57.pbs"))).await;
        let job = h.usecases.create_job(water_input()).await.unwrap();
        std::fs::write(h.job_dir(job.id).join(walltime::WALLTIME_MARKER), "30").unwrap();
        let view = h.usecases.get_job(job.id).await.unwrap();
        assert_eq!(view.walltime, Walltime::NotApplicable);
        assert_eq!(view.walltime.to_string(), "N/A");
    }

    async fn three_jobs(h: &Harness) -> Vec<JobRecord> {
        let mut jobs = Vec::new();
        for _ in 0..3 {
            jobs.push(h.usecases.create_job(water_input()).await.unwrap());
        }
        jobs
    }

    #[tokio::test]
    async fn sweep_stops_at_first_scheduler_error() {
        let h = harness(
            ScriptedScheduler::default()
                .with_submit(Ok("1.pbs"))
                .with_submit(Ok("2.pbs"))
                .with_submit(Ok("3.pbs"))
                .with_status(Ok(JobStatus::Running))
                .with_status(Err("qstat: cannot connect to server")),
        )
        .await;
        let jobs = three_jobs(&h).await;

        let report = h.usecases.refresh_statuses(&jobs).await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                checked: 2,
                updated: 1,
                failures: 1,
                aborted: true,
            }
        );
        assert_eq!(h.record(1).await.unwrap().status, JobStatus::Running);
        assert_eq!(h.record(2).await.unwrap().status, JobStatus::Queueing);
        assert_eq!(h.record(3).await.unwrap().status, JobStatus::Queueing);
        assert!(!h.scheduler.calls().contains(&"status:3.pbs".to_string()));
    }

    #[tokio::test]
    async fn sweep_error_budget_tolerates_failures() {
        let h = harness_with(
            ScriptedScheduler::default()
                .with_submit(Ok("1.pbs"))
                .with_submit(Ok("2.pbs"))
                .with_submit(Ok("3.pbs"))
                .with_status(Err("timeout"))
                .with_status(Ok(JobStatus::Running))
                .with_status(Ok(JobStatus::Completed)),
            1,
        )
        .await;
        let jobs = three_jobs(&h).await;

        let report = h.usecases.refresh_statuses(&jobs).await.unwrap();
        assert_eq!(report.failures, 1);
        assert!(!report.aborted);
        assert_eq!(report.updated, 2);
        assert_eq!(h.record(1).await.unwrap().status, JobStatus::Queueing);
        assert_eq!(h.record(2).await.unwrap().status, JobStatus::Running);
        assert_eq!(h.record(3).await.unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn listing_swallows_sweep_errors() {
        let h = harness(
            ScriptedScheduler::default()
                .with_submit(Ok("1.pbs"))
                .with_status(Err("qstat: timed out")),
        )
        .await;
        h.usecases.create_job(water_input()).await.unwrap();
        let page = h.usecases.list_jobs(&JobQuery::default()).await.unwrap();
        assert!(page.sweep.aborted);
        assert_eq!(page.total, 1);
        assert_eq!(page.jobs[0].job.status, JobStatus::Queueing);
    }

    #[tokio::test]
    async fn sweep_never_moves_backwards() {
        let h = harness(
            ScriptedScheduler::default()
                .with_submit(Ok("9.pbs"))
                .with_status(Ok(JobStatus::Running))
                .with_status(Ok(JobStatus::Queueing)),
        )
        .await;
        h.usecases.create_job(water_input()).await.unwrap();
        h.usecases.refresh_unfinished().await.unwrap();
        let report = h.usecases.refresh_unfinished().await.unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.updated, 0);
        assert_eq!(h.record(1).await.unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn delete_cancels_before_removing_directory() {
        let h = harness(
            ScriptedScheduler::default()
                .with_submit(Ok("88.pbs"))
                .with_delete(Ok(())),
        )
        .await;
        let job = h.usecases.create_job(water_input()).await.unwrap();
        *h.scheduler.watched_dir.lock().unwrap() = Some(h.job_dir(job.id));

        h.usecases.delete_job(job.id).await.unwrap();
        assert_eq!(
            h.scheduler.dir_present_on_delete.lock().unwrap().as_slice(),
            &[true]
        );
        assert!(h.scheduler.calls().contains(&"delete:88.pbs".to_string()));
        assert!(!h.job_dir(job.id).exists());
        assert!(h.record(job.id).await.is_none());
    }

    #[tokio::test]
    async fn deleting_completed_job_skips_scheduler() {
        let h = harness(
            ScriptedScheduler::default()
                .with_submit(Ok("89.pbs"))
                .with_status(Ok(JobStatus::Completed)),
        )
        .await;
        let job = h.usecases.create_job(water_input()).await.unwrap();
        h.usecases.refresh_unfinished().await.unwrap();

        h.usecases.delete_job(job.id).await.unwrap();
        assert!(!h.scheduler.calls().iter().any(|c| c.starts_with("delete:")));
        assert!(!h.job_dir(job.id).exists());
        assert_eq!(h.job_count().await, 0);
    }

    #[tokio::test]
    async fn delete_keeps_directory_until_grace_period_has_passed() {
        let grace = Duration::from_millis(400);
        let mut lifecycle = settings(0);
        lifecycle.delete_grace_period = grace;
        let h = harness_with_settings(
            ScriptedScheduler::default()
                .with_submit(Ok("92.pbs"))
                .with_delete(Ok(())),
            lifecycle,
        )
        .await;
        let job = h.usecases.create_job(water_input()).await.unwrap();
        let dir = h.job_dir(job.id);

        let started = std::time::Instant::now();
        let (deleted, mid_grace) = tokio::join!(h.usecases.delete_job(job.id), async {
            tokio::time::sleep(grace / 4).await;
            (
                h.scheduler.calls().contains(&"delete:92.pbs".to_string()),
                dir.is_dir(),
            )
        });
        deleted.unwrap();

        assert_eq!(mid_grace, (true, true));
        assert!(started.elapsed() >= grace);
        assert!(!dir.exists());
        assert!(h.record(job.id).await.is_none());
    }

    #[tokio::test]
    async fn deleting_completed_job_does_not_wait() {
        let grace = Duration::from_secs(30);
        let mut lifecycle = settings(0);
        lifecycle.delete_grace_period = grace;
        let h = harness_with_settings(
            ScriptedScheduler::default()
                .with_submit(Ok("93.pbs"))
                .with_status(Ok(JobStatus::Completed)),
            lifecycle,
        )
        .await;
        let job = h.usecases.create_job(water_input()).await.unwrap();
        h.usecases.refresh_unfinished().await.unwrap();

        let started = std::time::Instant::now();
        h.usecases.delete_job(job.id).await.unwrap();
        assert!(started.elapsed() < grace);
        assert!(!h.job_dir(job.id).exists());
    }

    #[tokio::test]
    async fn failed_cancel_leaves_job_intact_and_can_be_retried() {
        let h = harness(
            ScriptedScheduler::default()
                .with_submit(Ok("90.pbs"))
                .with_delete(Err("qdel: Server unavailable")),
        )
        .await;
        let job = h.usecases.create_job(water_input()).await.unwrap();

        let err = h.usecases.delete_job(job.id).await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::Scheduler);
        assert!(err.is_retryable());
        assert!(h.job_dir(job.id).is_dir());
        assert!(h.record(job.id).await.is_some());

        h.scheduler.push_delete(Ok(()));
        h.usecases.delete_job(job.id).await.unwrap();
        assert!(h.record(job.id).await.is_none());
    }

    #[tokio::test]
    async fn delete_tolerates_missing_directory() {
        let h = harness(
            ScriptedScheduler::default()
                .with_submit(Ok("91.pbs"))
                .with_delete(Ok(())),
        )
        .await;
        let job = h.usecases.create_job(water_input()).await.unwrap();
        std::fs::remove_dir_all(h.job_dir(job.id)).unwrap();
        h.usecases.delete_job(job.id).await.unwrap();
        assert_eq!(h.job_count().await, 0);
    }

    #[tokio::test]
    async fn deleting_unknown_job_is_not_found() {
        let h = harness(ScriptedScheduler::default()).await;
        let err = h.usecases.delete_job(3).await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::NotFound);
    }

    #[tokio::test]
    async fn custom_config_is_validated_and_appended() {
        let h = harness(ScriptedScheduler::default().with_submit(Ok("92.pbs"))).await;
        let err = h
            .usecases
            .add_custom(CustomKind::Config, "mail", "#PBS -m abe\nrm -rf /")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::Validation);
        assert_eq!(err.message(), "invalid line: 'rm -rf /'");

        let custom = h
            .usecases
            .add_custom(CustomKind::Config, "mail", "  #PBS -m abe   \n")
            .await
            .unwrap();
        assert_eq!(custom.script_lines, "#PBS -m abe");

        let mut input = water_input();
        input.custom_config_id = Some(custom.id);
        let job = h.usecases.create_job(input).await.unwrap();
        assert!(script_of(&h, job.id).contains("#PBS -m abe\ncd $PBS_O_WORKDIR"));
    }

    #[tokio::test]
    async fn unknown_custom_config_is_not_found() {
        let h = harness(ScriptedScheduler::default()).await;
        let mut input = water_input();
        input.custom_config_id = Some(5);
        let err = h.usecases.create_job(input).await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::NotFound);
        assert_eq!(h.job_count().await, 0);
    }

    #[tokio::test]
    async fn custom_resources_extend_the_catalog() {
        let h = harness(ScriptedScheduler::default().with_submit(Ok("93.pbs"))).await;
        h.usecases
            .add_custom(CustomKind::Resource, "big node", "#PBS -l select=1:ncpus=64")
            .await
            .unwrap();
        let choices = h.usecases.resource_choices().await.unwrap();
        assert_eq!(choices.len(), 2);
        assert_eq!(choices[1].description, "big node");

        let mut input = water_input();
        input.resource_index = 1;
        let job = h.usecases.create_job(input).await.unwrap();
        assert_eq!(job.resources, "big node");
        assert!(script_of(&h, job.id).contains("#PBS -l select=1:ncpus=64\n"));
    }

    #[tokio::test]
    async fn deleting_project_detaches_its_jobs() {
        let h = harness(ScriptedScheduler::default().with_submit(Ok("94.pbs"))).await;
        let project = h.usecases.create_project("  solvation  ").await.unwrap();
        assert_eq!(project.name, "solvation");

        let mut input = water_input();
        input.project_id = Some(project.id);
        let job = h.usecases.create_job(input).await.unwrap();
        assert_eq!(job.project_name.as_deref(), Some("solvation"));
        assert_eq!(h.usecases.list_projects().await.unwrap()[0].job_count, 1);

        h.usecases.delete_project(project.id).await.unwrap();
        let job = h.record(job.id).await.unwrap();
        assert_eq!(job.project_id, None);
        let err = h.usecases.delete_project(project.id).await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::NotFound);
    }

    #[tokio::test]
    async fn listing_applies_filters_and_pages() {
        let h = harness(
            ScriptedScheduler::default()
                .with_submit(Ok("1.pbs"))
                .with_submit(Ok("2.pbs"))
                .with_submit(Ok("3.pbs"))
                .with_status(Ok(JobStatus::Queueing)),
        )
        .await;
        three_jobs(&h).await;

        let page = h
            .usecases
            .list_jobs(&JobQuery {
                page: 2,
                per_page: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.jobs.len(), 1);
        assert_eq!(page.jobs[0].job.id, 1);
        assert_eq!(h.scheduler.calls().last().unwrap(), "status:1.pbs");
    }
}
