// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::PathBuf;

use clap::{Args, CommandFactory, FromArgMatches, Parser, Subcommand};

use crate::app::types::JobStatus;

#[derive(Parser, Debug)]
#[command(
    name = "portald",
    version,
    about = "Submit and track batch jobs on an HPC scheduler",
    long_about = None,
    after_help = "Configuration precedence: defaults < config file < command-line flags.\n\
Config path precedence: defaults < PORTAL_CONFIG_PATH < command-line flags.\n\
If --config is omitted, portald tries PORTAL_CONFIG_PATH, then the default config file location; missing default config is OK.\n\
Paths in the config file are resolved relative to the config file directory; paths passed as flags are resolved relative to the current working directory."
)]
pub struct Opts {
    #[arg(
        short,
        long,
        global = true,
        value_name = "PATH",
        help = "Path to a TOML config file. When omitted, portald uses PORTAL_CONFIG_PATH if set, otherwise the default config file location if available."
    )]
    pub config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Path to the SQLite database file. Overrides `database_path` from the config file."
    )]
    pub database_path: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Root directory holding one working directory per job. Overrides `jobs_dir` from the config file."
    )]
    pub jobs_dir: Option<PathBuf>,
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::SetTrue,
        help = "Enable debug logging and include logs from dependencies. Overrides `verbose` from the config file."
    )]
    pub verbose: bool,
    #[arg(
        long,
        global = true,
        action = clap::ArgAction::SetTrue,
        help = "Print results as JSON."
    )]
    pub json: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a job from a software and resource profile and submit it.
    Submit(SubmitArgs),
    /// List jobs, refreshing the status of unfinished jobs on the page first.
    Jobs(JobsArgs),
    /// Show one job with its walltime.
    Show {
        #[arg(value_name = "JOB")]
        id: i64,
    },
    /// Cancel a job if it is still queued or running, then remove it.
    Delete {
        #[arg(value_name = "JOB")]
        id: i64,
    },
    /// Refresh the status of every unfinished job.
    Refresh,
    /// Manage projects.
    Project {
        #[command(subcommand)]
        action: ProjectCommand,
    },
    /// Manage extra scheduler directives appended to scripts.
    CustomConfig {
        #[command(subcommand)]
        action: CustomCommand,
    },
    /// Manage user-defined resource profiles.
    CustomResource {
        #[command(subcommand)]
        action: CustomCommand,
    },
    /// List the selectable resource and software profiles with their indices.
    Profiles,
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    #[arg(long, value_name = "INDEX", help = "Software profile index (see `portald profiles`).")]
    pub software: usize,
    #[arg(long, value_name = "INDEX", help = "Resource profile index (see `portald profiles`).")]
    pub resource: usize,
    #[arg(short, long, default_value = "", help = "Free-text job description.")]
    pub description: String,
    #[arg(long, value_name = "ID", help = "Attach the job to a project.")]
    pub project: Option<i64>,
    #[arg(long, value_name = "ID", help = "Append a stored custom config to the script.")]
    pub custom_config: Option<i64>,
    #[arg(
        short = 'f',
        long = "file",
        value_name = "SLOT=PATH",
        value_parser = parse_file_binding,
        help = "Input file for a slot of the software profile. Repeat for each slot."
    )]
    pub files: Vec<(String, PathBuf)>,
}

#[derive(Args, Debug)]
pub struct JobsArgs {
    #[arg(long, value_name = "TEXT", help = "Only jobs whose description contains TEXT.")]
    pub contains: Option<String>,
    #[arg(long, value_name = "TEXT", help = "Skip jobs whose description contains TEXT.")]
    pub excludes: Option<String>,
    #[arg(long, value_name = "ID")]
    pub project: Option<i64>,
    #[arg(long, value_name = "STATUS", help = "queueing, running or completed.")]
    pub status: Option<JobStatus>,
    #[arg(long, value_name = "TEXT", help = "Exact resource profile description.")]
    pub resources: Option<String>,
    #[arg(long, value_name = "NAME", help = "Exact software profile name.")]
    pub software: Option<String>,
    #[arg(long, default_value_t = 1)]
    pub page: u32,
    #[arg(long, value_name = "N", help = "Jobs per page. Defaults to `lifecycle.page_size`.")]
    pub per_page: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    Add { name: String },
    List,
    Delete { id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum CustomCommand {
    Add {
        label: String,
        #[arg(long, value_name = "TEXT", help = "Directive lines; each must match `custom_config_line_regex`.")]
        lines: String,
    },
    List,
    Delete { id: i64 },
}

pub struct ParsedOpts {
    pub opts: Opts,
    pub verbose_override: Option<bool>,
}

const HELP_TEMPLATE: &str = r#"{before-help}{name} {version}
{about-with-newline}{usage-heading} {usage}
{after-help}

{all-args}
"#;

fn parse_file_binding(raw: &str) -> Result<(String, PathBuf), String> {
    let (slot, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected SLOT=PATH, got '{raw}'"))?;
    let slot = slot.trim();
    if slot.is_empty() || path.is_empty() {
        return Err(format!("expected SLOT=PATH, got '{raw}'"));
    }
    Ok((slot.to_string(), PathBuf::from(path)))
}

fn apply_help_template_recursively(cmd: &mut clap::Command) {
    let mut owned = std::mem::take(cmd);
    owned = owned.help_template(HELP_TEMPLATE);
    for sub in owned.get_subcommands_mut() {
        apply_help_template_recursively(sub);
    }
    *cmd = owned;
}

pub fn cli_command() -> clap::Command {
    let mut cmd = Opts::command();
    apply_help_template_recursively(&mut cmd);
    cmd
}

pub fn parse_opts() -> ParsedOpts {
    let cmd = cli_command();
    let matches = cmd.get_matches();
    let verbose_override = if matches.get_flag("verbose") {
        Some(true)
    } else {
        None
    };
    let opts = Opts::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    ParsedOpts {
        opts,
        verbose_override,
    }
}
