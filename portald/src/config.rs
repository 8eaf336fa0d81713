// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::adapters::scheduler::{
    DEFAULT_DELETE_TIMEOUT, DEFAULT_STATUS_TIMEOUT, DEFAULT_SUBMIT_TIMEOUT, SchedulerSettings,
};
use crate::app::errors::{AppResult, configuration_error};
use crate::app::services::directives::DirectiveValidator;
use crate::app::services::script;
use crate::app::types::{ResourceProfile, SoftwareProfile};
use crate::app::usecases::LifecycleSettings;

const APP_DIR_NAME: &str = "portal";
const CONFIG_FILE_NAME: &str = "portal.toml";
const CONFIG_ENV_VAR: &str = "PORTAL_CONFIG_PATH";
const DATABASE_FILE_NAME: &str = "portal.sqlite";
const JOBS_DIR_NAME: &str = "jobs";
const DEFAULT_DELETE_GRACE_PERIOD_SECS: u64 = 2;
const DEFAULT_SWEEP_ERROR_BUDGET: usize = 0;
const DEFAULT_PAGE_SIZE: u32 = 25;
const DEFAULT_CUSTOM_CONFIG_LINE_REGEX: &str = r"#PBS\s+-[A-Za-z]";
const DEFAULT_SCRIPT_TEMPLATE: &str = "#!/bin/bash\n\
#PBS -N {{ job_name }}\n\
{{ resources }}\n\
{{ custom_config }}\n\
cd \"$PBS_O_WORKDIR\"\n\
\n\
{{ commands }}\n";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    database_path: Option<String>,
    jobs_dir: Option<String>,
    cluster: Option<String>,
    script_template: Option<String>,
    custom_config_line_regex: Option<String>,
    #[serde(default)]
    scheduler: FileSchedulerConfig,
    #[serde(default)]
    lifecycle: FileLifecycleConfig,
    #[serde(default)]
    resources: Vec<ResourceProfile>,
    #[serde(default)]
    software: Vec<SoftwareProfile>,
    verbose: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSchedulerConfig {
    submit_command: Option<Vec<String>>,
    status_command: Option<Vec<String>>,
    delete_command: Option<Vec<String>>,
    submit_timeout_secs: Option<u64>,
    status_timeout_secs: Option<u64>,
    delete_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileLifecycleConfig {
    delete_grace_period_secs: Option<u64>,
    sweep_error_budget: Option<usize>,
    page_size: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub submit_command: Vec<String>,
    pub status_command: Vec<String>,
    pub delete_command: Vec<String>,
    pub submit_timeout: Duration,
    pub status_timeout: Duration,
    pub delete_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub delete_grace_period: Duration,
    pub sweep_error_budget: usize,
    pub page_size: u32,
}

#[derive(Debug)]
pub struct Config {
    pub database_path: PathBuf,
    pub jobs_dir: PathBuf,
    pub cluster: Option<String>,
    pub script_template: String,
    pub custom_config_line_regex: String,
    pub scheduler: SchedulerConfig,
    pub lifecycle: LifecycleConfig,
    pub resources: Vec<ResourceProfile>,
    pub software: Vec<SoftwareProfile>,
    pub verbose: bool,
    #[allow(dead_code)]
    pub config_path: Option<PathBuf>,
}

impl Config {
    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            submit_command: self.scheduler.submit_command.clone(),
            status_command: self.scheduler.status_command.clone(),
            delete_command: self.scheduler.delete_command.clone(),
            cluster: self.cluster.clone(),
            submit_timeout: self.scheduler.submit_timeout,
            status_timeout: self.scheduler.status_timeout,
            delete_timeout: self.scheduler.delete_timeout,
        }
    }

    pub fn lifecycle_settings(&self) -> AppResult<LifecycleSettings> {
        Ok(LifecycleSettings {
            script_template: self.script_template.clone(),
            resources: self.resources.clone(),
            software: self.software.clone(),
            directives: directive_validator(&self.custom_config_line_regex)?,
            delete_grace_period: self.lifecycle.delete_grace_period,
            sweep_error_budget: self.lifecycle.sweep_error_budget,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Override,
    Env,
    ConfigFile,
    Default,
}

impl ConfigSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigSource::Override => "override",
            ConfigSource::Env => "env",
            ConfigSource::ConfigFile => "config",
            ConfigSource::Default => "default",
        }
    }
}

#[derive(Debug)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

#[derive(Debug)]
pub struct ConfigReport {
    pub config_path: Option<PathBuf>,
    pub config_path_source: Option<ConfigSource>,
    pub config_file_present: bool,
    pub database_path: ConfigValue<PathBuf>,
    pub jobs_dir: ConfigValue<PathBuf>,
    pub cluster: ConfigValue<Option<String>>,
    pub sweep_error_budget: ConfigValue<usize>,
    pub verbose: ConfigValue<bool>,
}

#[derive(Debug)]
pub struct LoadResult {
    pub config: Config,
    pub report: ConfigReport,
}

#[derive(Debug, Default)]
pub struct Overrides {
    pub database_path: Option<PathBuf>,
    pub jobs_dir: Option<PathBuf>,
    pub verbose: Option<bool>,
}

#[allow(dead_code)]
pub fn load(config_path_override: Option<PathBuf>, overrides: Overrides) -> Result<Config> {
    Ok(load_with_report(config_path_override, overrides)?.config)
}

pub fn load_with_report(
    config_path_override: Option<PathBuf>,
    overrides: Overrides,
) -> Result<LoadResult> {
    let (config_path, config_path_source, required) = match config_path_override {
        Some(path) => (Some(expand_path(path)), Some(ConfigSource::Override), true),
        None => match config_path_from_env()? {
            Some(path) => (Some(expand_path(path)), Some(ConfigSource::Env), true),
            None => match default_config_path().ok() {
                Some(path) => (Some(path), Some(ConfigSource::Default), false),
                None => (None, None, false),
            },
        },
    };
    let config_file_present = config_path
        .as_deref()
        .map(|path| path.exists())
        .unwrap_or(false);

    let file_config = match config_path.as_deref() {
        Some(path) => read_config_file(path, required)?,
        None => FileConfig::default(),
    };
    let base_dir = config_path.as_deref().and_then(|path| path.parent());

    let (database_path, database_source) = match overrides.database_path {
        Some(path) => (expand_path(path), ConfigSource::Override),
        None => match file_config.database_path.as_deref() {
            Some(raw) => (resolve_path(raw, base_dir), ConfigSource::ConfigFile),
            None => (
                default_data_file(DATABASE_FILE_NAME).with_context(|| {
                    "failed to resolve default database path; specify --database-path or set database_path in the config file"
                })?,
                ConfigSource::Default,
            ),
        },
    };

    let (jobs_dir, jobs_dir_source) = match overrides.jobs_dir {
        Some(path) => (expand_path(path), ConfigSource::Override),
        None => match file_config.jobs_dir.as_deref() {
            Some(raw) => (resolve_path(raw, base_dir), ConfigSource::ConfigFile),
            None => (
                default_data_file(JOBS_DIR_NAME).with_context(|| {
                    "failed to resolve default jobs directory; specify --jobs-dir or set jobs_dir in the config file"
                })?,
                ConfigSource::Default,
            ),
        },
    };

    let (verbose, verbose_source) = match overrides.verbose {
        Some(verbose) => (verbose, ConfigSource::Override),
        None => match file_config.verbose {
            Some(verbose) => (verbose, ConfigSource::ConfigFile),
            None => (false, ConfigSource::Default),
        },
    };

    let cluster = file_config
        .cluster
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    let cluster_source = if cluster.is_some() {
        ConfigSource::ConfigFile
    } else {
        ConfigSource::Default
    };

    let (sweep_error_budget, sweep_error_budget_source) =
        match file_config.lifecycle.sweep_error_budget {
            Some(budget) => (budget, ConfigSource::ConfigFile),
            None => (DEFAULT_SWEEP_ERROR_BUDGET, ConfigSource::Default),
        };
    let page_size = file_config
        .lifecycle
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE);
    if page_size == 0 {
        anyhow::bail!("lifecycle.page_size must be at least 1");
    }

    let scheduler = file_config.scheduler;
    let config = Config {
        database_path,
        jobs_dir,
        cluster,
        script_template: file_config
            .script_template
            .unwrap_or_else(|| DEFAULT_SCRIPT_TEMPLATE.to_string()),
        custom_config_line_regex: file_config
            .custom_config_line_regex
            .unwrap_or_else(|| DEFAULT_CUSTOM_CONFIG_LINE_REGEX.to_string()),
        scheduler: SchedulerConfig {
            submit_command: scheduler
                .submit_command
                .unwrap_or_else(|| vec!["portal-submit".to_string()]),
            status_command: scheduler
                .status_command
                .unwrap_or_else(|| vec!["portal-status".to_string()]),
            delete_command: scheduler
                .delete_command
                .unwrap_or_else(|| vec!["portal-delete".to_string()]),
            submit_timeout: secs_or(scheduler.submit_timeout_secs, DEFAULT_SUBMIT_TIMEOUT),
            status_timeout: secs_or(scheduler.status_timeout_secs, DEFAULT_STATUS_TIMEOUT),
            delete_timeout: secs_or(scheduler.delete_timeout_secs, DEFAULT_DELETE_TIMEOUT),
        },
        lifecycle: LifecycleConfig {
            delete_grace_period: Duration::from_secs(
                file_config
                    .lifecycle
                    .delete_grace_period_secs
                    .unwrap_or(DEFAULT_DELETE_GRACE_PERIOD_SECS),
            ),
            sweep_error_budget,
            page_size,
        },
        resources: file_config.resources,
        software: file_config.software,
        verbose,
        config_path: config_path.clone(),
    };
    validate(&config)?;

    let report = ConfigReport {
        config_path,
        config_path_source,
        config_file_present,
        database_path: ConfigValue {
            value: config.database_path.clone(),
            source: database_source,
        },
        jobs_dir: ConfigValue {
            value: config.jobs_dir.clone(),
            source: jobs_dir_source,
        },
        cluster: ConfigValue {
            value: config.cluster.clone(),
            source: cluster_source,
        },
        sweep_error_budget: ConfigValue {
            value: config.lifecycle.sweep_error_budget,
            source: sweep_error_budget_source,
        },
        verbose: ConfigValue {
            value: config.verbose,
            source: verbose_source,
        },
    };

    Ok(LoadResult { config, report })
}

/// Rejects configuration that would only fail later, at render or submit time.
pub fn validate(config: &Config) -> AppResult<()> {
    directive_validator(&config.custom_config_line_regex)?;
    script::check_template("script_template", &config.script_template)?;

    for (name, command) in [
        ("scheduler.submit_command", &config.scheduler.submit_command),
        ("scheduler.status_command", &config.scheduler.status_command),
        ("scheduler.delete_command", &config.scheduler.delete_command),
    ] {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(configuration_error(format!("{name} must name a program")));
        }
    }

    for software in &config.software {
        script::check_template(&format!("commands of '{}'", software.name), &software.commands)?;
        let mut seen = HashSet::new();
        for spec in software
            .input_files
            .required()
            .iter()
            .chain(software.input_files.optional())
        {
            if !seen.insert(spec.key.as_str()) {
                return Err(configuration_error(format!(
                    "software '{}' declares input file '{}' more than once",
                    software.name, spec.key
                )));
            }
        }
    }
    Ok(())
}

fn directive_validator(pattern: &str) -> AppResult<DirectiveValidator> {
    DirectiveValidator::new(pattern).map_err(|err| {
        configuration_error(format!("invalid custom_config_line_regex: {err}"))
    })
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

fn secs_or(value: Option<u64>, default: Duration) -> Duration {
    value.map(Duration::from_secs).unwrap_or(default)
}

fn read_config_file(path: &Path, required: bool) -> Result<FileConfig> {
    if !path.exists() {
        if required {
            anyhow::bail!("config file not found at {}", path.display());
        }
        return Ok(FileConfig::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn resolve_path(raw: &str, base_dir: Option<&Path>) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    let path = PathBuf::from(expanded.as_ref());
    if path.is_absolute() {
        return path;
    }
    match base_dir {
        Some(dir) => dir.join(path),
        None => path,
    }
}

fn expand_path(path: PathBuf) -> PathBuf {
    let path_string = path.to_string_lossy().to_string();
    let expanded = shellexpand::tilde(&path_string);
    PathBuf::from(expanded.as_ref())
}

fn config_path_from_env() -> Result<Option<PathBuf>> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(value) => {
            if value.is_empty() {
                anyhow::bail!("{CONFIG_ENV_VAR} is set but empty");
            }
            Ok(Some(PathBuf::from(value)))
        }
        None => Ok(None),
    }
}

fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("failed to resolve config directory")?;
    Ok(base.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn default_data_file(name: &str) -> Result<PathBuf> {
    let base = dirs::data_dir().context("failed to resolve data directory")?;
    Ok(base.join(APP_DIR_NAME).join(name))
}
