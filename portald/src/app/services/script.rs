// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;

use tera::{Context, Tera};

use crate::app::errors::{AppResult, configuration_error};

/// File name of the rendered submission script inside a job directory.
pub const SCRIPT_FILE_NAME: &str = "sub.sh";

const JOB_NAME_PREFIX: &str = "portal_job_";

/// Everything needed to render one submission script.
#[derive(Debug, Clone)]
pub struct ScriptInputs<'a> {
    /// Outer template; placeholders `resources`, `custom_config`, `job_name`, `commands`.
    pub template: &'a str,
    /// Software command template; placeholders are the input-file slot keys.
    pub commands_template: &'a str,
    pub resource_directives: &'a str,
    pub custom_directives: Option<&'a str>,
    pub job_name: String,
    /// Slot key to staged file name, or empty for an unsupplied optional slot.
    pub file_bindings: &'a BTreeMap<String, String>,
}

pub fn job_display_name(job_number: &str) -> String {
    format!("{JOB_NAME_PREFIX}{job_number}")
}

/// Renders the commands first, then the outer template.
/// Unknown placeholders fail with a configuration error.
pub fn render_script(inputs: &ScriptInputs<'_>) -> AppResult<String> {
    let mut commands_ctx = Context::new();
    for (key, value) in inputs.file_bindings {
        commands_ctx.insert(key.as_str(), value);
    }
    let commands = render_one(inputs.commands_template, &commands_ctx, "commands template")?;

    let custom_config = custom_block(inputs.custom_directives);
    let mut ctx = Context::new();
    ctx.insert("commands", &commands);
    ctx.insert("resources", inputs.resource_directives);
    ctx.insert("custom_config", &custom_config);
    ctx.insert("job_name", &inputs.job_name);
    render_one(inputs.template, &ctx, "script template")
}

/// Parses a template without rendering it, for load-time checks.
pub fn check_template(name: &str, template: &str) -> AppResult<()> {
    let mut tera = Tera::default();
    tera.add_raw_template(name, template)
        .map(|_| ())
        .map_err(|err| configuration_error(format!("invalid {name}: {}", describe(&err))))
}

fn custom_block(custom: Option<&str>) -> String {
    match custom.map(str::trim_end) {
        Some(lines) if !lines.is_empty() => format!("{lines}\n"),
        _ => String::new(),
    }
}

fn render_one(template: &str, ctx: &Context, what: &str) -> AppResult<String> {
    Tera::one_off(template, ctx, false)
        .map_err(|err| configuration_error(format!("failed to render {what}: {}", describe(&err))))
}

// tera keeps the useful part of the message in the source chain.
fn describe(err: &tera::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}
