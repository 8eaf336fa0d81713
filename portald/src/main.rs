// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use serde_json::json;

mod adapters;
mod app;
mod config;
mod logging;

use adapters::cli::{Command, CustomCommand, JobsArgs, ProjectCommand, SubmitArgs};
use app::errors::{AppError, codes};
use app::types::{CustomKind, JobPage, JobQuery, JobView, UploadedFile};
use app::usecases::{CreateJobInput, UseCases};

fn log_config_report(report: &config::ConfigReport) {
    match (&report.config_path, report.config_path_source) {
        (Some(path), Some(source)) => {
            tracing::info!(
                "config path: {} (source={}, present={})",
                path.display(),
                source.as_str(),
                report.config_file_present
            );
        }
        (Some(path), None) => {
            tracing::info!(
                "config path: {} (present={})",
                path.display(),
                report.config_file_present
            );
        }
        (None, _) => {
            tracing::info!("config path: (none)");
        }
    }
    tracing::info!(
        "config database_path: {} (source={})",
        report.database_path.value.display(),
        report.database_path.source.as_str()
    );
    tracing::info!(
        "config jobs_dir: {} (source={})",
        report.jobs_dir.value.display(),
        report.jobs_dir.source.as_str()
    );
    tracing::info!(
        "config cluster: {} (source={})",
        report.cluster.value.as_deref().unwrap_or("(none)"),
        report.cluster.source.as_str()
    );
    tracing::info!(
        "config sweep_error_budget: {} (source={})",
        report.sweep_error_budget.value,
        report.sweep_error_budget.source.as_str()
    );
    tracing::info!(
        "config verbose: {} (source={})",
        report.verbose.value,
        report.verbose.source.as_str()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = adapters::cli::parse_opts();
    let opts = parsed.opts;
    let config::LoadResult { config, report } = config::load_with_report(
        opts.config,
        config::Overrides {
            database_path: opts.database_path,
            jobs_dir: opts.jobs_dir,
            verbose: parsed.verbose_override,
        },
    )?;
    logging::init(config.verbose);
    log_config_report(&report);
    config::ensure_parent_dir(&config.database_path)?;

    let db = adapters::db::PortalStore::open(&config.database_path)
        .await
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    let store = Arc::new(adapters::db::SqliteStoreAdapter::new(db));
    let dirs = Arc::new(adapters::fs::LocalJobDirectories::new(&config.jobs_dir));
    let scheduler = Arc::new(adapters::scheduler::ProcessScheduler::new(
        config.scheduler_settings(),
    ));
    let clock = Arc::new(adapters::time::SystemClock::new());
    let telemetry = Arc::new(adapters::telemetry::TracingTelemetry::new());

    let usecases = UseCases::new(
        store.clone(),
        store.clone(),
        store,
        dirs,
        scheduler,
        clock,
        telemetry,
        config.lifecycle_settings()?,
    );

    let as_json = opts.json;
    let result = run(&usecases, opts.command, as_json, config.lifecycle.page_size).await;
    if as_json {
        if let Err(err) = &result {
            print_json(&error_json(err))?;
        }
    }
    result
}

/// JSON body for a failed command. Errors raised outside the lifecycle core
/// are reported as internal.
fn error_json(err: &anyhow::Error) -> serde_json::Value {
    let app_err = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<AppError>());
    let (code, retryable) = match app_err {
        Some(app_err) => (app_err.code(), app_err.is_retryable()),
        None => (codes::INTERNAL_ERROR, false),
    };
    json!({
        "error": {
            "code": code,
            "message": format!("{err:#}"),
            "retryable": retryable,
        }
    })
}

fn delete_failure(id: i64, err: AppError) -> anyhow::Error {
    if err.is_retryable() {
        anyhow::Error::new(err).context(format!(
            "could not cancel job {id}; please try again later"
        ))
    } else {
        err.into()
    }
}

async fn run(
    usecases: &UseCases,
    command: Command,
    as_json: bool,
    page_size: u32,
) -> anyhow::Result<()> {
    match command {
        Command::Submit(args) => {
            let input = submit_input(args).await?;
            let job = usecases
                .create_job(input)
                .await
                .context("job submission failed")?;
            if as_json {
                print_json(&job)?;
            } else {
                println!(
                    "Job {} submitted as {} ({}, {})",
                    job.job_number(),
                    job.job_id,
                    job.software,
                    job.resources
                );
            }
        }
        Command::Jobs(args) => {
            let query = job_query(args, page_size);
            let page = usecases.list_jobs(&query).await?;
            print_page(&page, as_json)?;
        }
        Command::Show { id } => {
            let view = usecases.get_job(id).await?;
            if as_json {
                print_json(&view_json(&view))?;
            } else {
                print_view(&view);
            }
        }
        Command::Delete { id } => {
            usecases
                .delete_job(id)
                .await
                .map_err(|err| delete_failure(id, err))?;
            if !as_json {
                println!("Job {} deleted", app::types::format_job_number(id));
            }
        }
        Command::Refresh => {
            let report = usecases.refresh_unfinished().await?;
            if as_json {
                print_json(&json!({
                    "checked": report.checked,
                    "updated": report.updated,
                    "failures": report.failures,
                    "aborted": report.aborted,
                }))?;
            } else {
                println!(
                    "checked {} job(s), updated {}{}",
                    report.checked,
                    report.updated,
                    if report.aborted {
                        " (stopped after scheduler errors)"
                    } else {
                        ""
                    }
                );
            }
        }
        Command::Project { action } => match action {
            ProjectCommand::Add { name } => {
                let project = usecases.create_project(&name).await?;
                if as_json {
                    print_json(&project)?;
                } else {
                    println!("Project {} created: {}", project.id, project.name);
                }
            }
            ProjectCommand::List => {
                let projects = usecases.list_projects().await?;
                if as_json {
                    print_json(&projects)?;
                } else {
                    for project in projects {
                        println!("{:>4}  {}  ({} jobs)", project.id, project.name, project.job_count);
                    }
                }
            }
            ProjectCommand::Delete { id } => {
                usecases.delete_project(id).await?;
            }
        },
        Command::CustomConfig { action } => {
            run_custom(usecases, CustomKind::Config, action, as_json).await?;
        }
        Command::CustomResource { action } => {
            run_custom(usecases, CustomKind::Resource, action, as_json).await?;
        }
        Command::Profiles => {
            let resources = usecases.resource_choices().await?;
            let software = usecases.software_profiles();
            if as_json {
                print_json(&json!({ "resources": resources, "software": software }))?;
            } else {
                println!("Resources:");
                for (index, resource) in resources.iter().enumerate() {
                    println!("{index:>4}  {}", resource.description);
                }
                println!("Software:");
                for (index, profile) in software.iter().enumerate() {
                    let slots: Vec<String> = profile
                        .input_files
                        .required()
                        .iter()
                        .map(|spec| spec.key.clone())
                        .chain(
                            profile
                                .input_files
                                .optional()
                                .iter()
                                .map(|spec| format!("[{}]", spec.key)),
                        )
                        .collect();
                    println!("{index:>4}  {}  files: {}", profile.name, slots.join(" "));
                }
            }
        }
    }
    Ok(())
}

async fn run_custom(
    usecases: &UseCases,
    kind: CustomKind,
    action: CustomCommand,
    as_json: bool,
) -> anyhow::Result<()> {
    match action {
        CustomCommand::Add { label, lines } => {
            let record = usecases.add_custom(kind, &label, &lines).await?;
            if as_json {
                print_json(&record)?;
            } else {
                println!("Created {} {}: {}", kind.as_str(), record.id, record.label);
            }
        }
        CustomCommand::List => {
            let records = usecases.list_custom(kind).await?;
            if as_json {
                print_json(&records)?;
            } else {
                for record in records {
                    println!("{:>4}  {}", record.id, record.label);
                    for line in record.script_lines.lines() {
                        println!("      {line}");
                    }
                }
            }
        }
        CustomCommand::Delete { id } => {
            usecases.delete_custom(kind, id).await?;
        }
    }
    Ok(())
}

async fn submit_input(args: SubmitArgs) -> anyhow::Result<CreateJobInput> {
    let mut input_files = BTreeMap::new();
    for (slot, path) in args.files {
        let content = tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file = UploadedFile::new(path.to_string_lossy(), content);
        if input_files.insert(slot.clone(), file).is_some() {
            anyhow::bail!("input file slot '{slot}' given more than once");
        }
    }
    Ok(CreateJobInput {
        description: args.description,
        input_files,
        project_id: args.project,
        resource_index: args.resource,
        software_index: args.software,
        custom_config_id: args.custom_config,
    })
}

fn job_query(args: JobsArgs, page_size: u32) -> JobQuery {
    JobQuery {
        description_contains: args.contains,
        description_excludes: args.excludes,
        project_id: args.project,
        status: args.status,
        resources: args.resources,
        software: args.software,
        page: args.page,
        per_page: args.per_page.unwrap_or(page_size),
    }
}

fn view_json(view: &JobView) -> serde_json::Value {
    json!({
        "job_number": view.job.job_number(),
        "job": view.job,
        "walltime": view.walltime.to_string(),
        "walltime_secs": view.walltime.duration().map(|d| d.as_secs()),
    })
}

fn print_page(page: &JobPage, as_json: bool) -> anyhow::Result<()> {
    if as_json {
        let jobs: Vec<serde_json::Value> = page.jobs.iter().map(view_json).collect();
        return print_json(&json!({
            "jobs": jobs,
            "total": page.total,
            "page": page.page,
            "per_page": page.per_page,
        }));
    }
    println!(
        "{:<10} {:<16} {:<10} {:<9} {:<20} DESCRIPTION",
        "JOB", "SCHEDULER ID", "STATUS", "WALLTIME", "SOFTWARE"
    );
    for view in &page.jobs {
        let job = &view.job;
        println!(
            "{:<10} {:<16} {:<10} {:<9} {:<20} {}",
            job.job_number(),
            job.job_id,
            job.status.as_str(),
            view.walltime.to_string(),
            job.software,
            job.description
        );
    }
    let pages = (page.total + i64::from(page.per_page) - 1) / i64::from(page.per_page);
    println!("page {} of {} ({} jobs)", page.page, pages.max(1), page.total);
    Ok(())
}

fn print_view(view: &JobView) {
    let job = &view.job;
    println!("Job:          {}", job.job_number());
    println!("Scheduler id: {}", job.job_id);
    println!("Status:       {}", job.status);
    println!("Walltime:     {}", view.walltime);
    println!("Submitted:    {}", job.submission_time);
    println!("Software:     {}", job.software);
    println!("Resources:    {}", job.resources);
    println!(
        "Project:      {}",
        job.project_name.as_deref().unwrap_or("-")
    );
    println!("Description:  {}", job.description);
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
