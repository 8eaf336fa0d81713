// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;

use crate::app::errors::{AppResult, configuration_error, validation_error};
use crate::app::services::script::SCRIPT_FILE_NAME;
use crate::app::services::walltime::WALLTIME_MARKER;
use crate::app::types::{CustomRecord, ResourceProfile, SoftwareProfile, UploadedFile};

/// Names the portal or the running job write into a job directory.
pub const RESERVED_FILE_NAMES: &[&str] =
    &[SCRIPT_FILE_NAME, WALLTIME_MARKER, "FILES_TO_PUBLISH", "METADATA"];

/// Selectable resource profiles: configured ones first, then stored custom
/// resources, indexed continuously.
pub fn resource_profiles(
    configured: &[ResourceProfile],
    custom: &[CustomRecord],
) -> Vec<ResourceProfile> {
    configured
        .iter()
        .cloned()
        .chain(custom.iter().map(|record| ResourceProfile {
            description: record.label.clone(),
            script_lines: record.script_lines.clone(),
        }))
        .collect()
}

pub fn resolve_resource(profiles: &[ResourceProfile], index: usize) -> AppResult<ResourceProfile> {
    profiles.get(index).cloned().ok_or_else(|| {
        configuration_error(format!(
            "resource index {index} is out of range ({} available)",
            profiles.len()
        ))
    })
}

pub fn resolve_software(software: &[SoftwareProfile], index: usize) -> AppResult<&SoftwareProfile> {
    software.get(index).ok_or_else(|| {
        configuration_error(format!(
            "software index {index} is out of range ({} available)",
            software.len()
        ))
    })
}

/// Every required slot must be supplied and every supplied slot must be declared.
pub fn check_input_slots<'a>(
    software: &SoftwareProfile,
    supplied: impl IntoIterator<Item = &'a String>,
) -> AppResult<()> {
    let supplied: Vec<&String> = supplied.into_iter().collect();
    for key in &supplied {
        if !software.input_files.declares(key) {
            return Err(validation_error(format!(
                "'{}' does not accept an input file named '{key}'",
                software.name
            )));
        }
    }
    for spec in software.input_files.required() {
        if !supplied.iter().any(|key| **key == spec.key) {
            return Err(validation_error(format!(
                "'{}' requires input file '{}' ({})",
                software.name, spec.key, spec.description
            )));
        }
    }
    Ok(())
}

/// Reduces a client supplied file name to its final component.
/// Both `/` and `\` count as separators so `..\..\x` cannot escape either.
pub fn sanitize_file_name(uploaded_name: &str) -> Option<&str> {
    let base = uploaded_name.rsplit(['/', '\\']).next()?.trim();
    match base {
        "" | "." | ".." => None,
        name => Some(name),
    }
}

/// Uploads must reduce to distinct, non-reserved basenames.
pub fn check_upload_names<'a>(
    uploads: impl IntoIterator<Item = (&'a String, &'a UploadedFile)>,
) -> AppResult<()> {
    let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
    for (slot, file) in uploads {
        let Some(name) = sanitize_file_name(&file.name) else {
            return Err(validation_error(format!(
                "invalid input file name '{}'",
                file.name
            )));
        };
        if RESERVED_FILE_NAMES.contains(&name) {
            return Err(validation_error(format!(
                "input file name '{name}' is reserved"
            )));
        }
        if let Some(other) = seen.insert(name, slot.as_str()) {
            return Err(validation_error(format!(
                "input files '{other}' and '{slot}' are both named '{name}'"
            )));
        }
    }
    Ok(())
}

/// Binds every declared slot to its staged file name, or to an empty string
/// for an optional slot that was not supplied.
pub fn file_bindings(
    software: &SoftwareProfile,
    staged: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    software
        .input_files
        .required()
        .iter()
        .chain(software.input_files.optional())
        .map(|spec| {
            let value = staged.get(&spec.key).cloned().unwrap_or_default();
            (spec.key.clone(), value)
        })
        .collect()
}
