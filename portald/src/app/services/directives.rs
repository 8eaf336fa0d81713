// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use regex::Regex;

use crate::app::errors::{AppResult, validation_error};

/// Validates user-authored scheduler directive text line by line.
#[derive(Debug, Clone)]
pub struct DirectiveValidator {
    line: Regex,
}

impl DirectiveValidator {
    /// The pattern must match at the start of each line.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let line = Regex::new(&format!("^(?:{pattern})"))?;
        Ok(Self { line })
    }

    pub fn validate(&self, script_lines: &str) -> AppResult<()> {
        for line in script_lines.trim().split('\n') {
            let line = line.trim_end_matches('\r');
            if !self.line.is_match(line) {
                return Err(validation_error(format!("invalid line: '{line}'")));
            }
        }
        Ok(())
    }
}
