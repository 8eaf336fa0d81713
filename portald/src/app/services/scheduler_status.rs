// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::types::JobStatus;

/// Maps the scheduler tool's status vocabulary onto the job state machine.
/// Only the first non-empty line of output is considered.
pub fn parse_scheduler_status(output: &str) -> Option<JobStatus> {
    let word = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())?;
    match word.to_ascii_lowercase().as_str() {
        "queued" | "queued_held" | "queueing" | "held" | "suspended" | "waiting"
        | "undetermined" | "q" | "h" | "w" | "t" => Some(JobStatus::Queueing),
        "running" | "r" | "e" => Some(JobStatus::Running),
        "completed" | "complete" | "done" | "c" | "f" | "x" => Some(JobStatus::Completed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_adapter_words() {
        assert_eq!(parse_scheduler_status("queued\n"), Some(JobStatus::Queueing));
        assert_eq!(
            parse_scheduler_status("queued_held"),
            Some(JobStatus::Queueing)
        );
        assert_eq!(parse_scheduler_status("Running"), Some(JobStatus::Running));
        assert_eq!(
            parse_scheduler_status("  completed  "),
            Some(JobStatus::Completed)
        );
    }

    #[test]
    fn maps_pbs_state_letters() {
        assert_eq!(parse_scheduler_status("Q"), Some(JobStatus::Queueing));
        assert_eq!(parse_scheduler_status("H"), Some(JobStatus::Queueing));
        assert_eq!(parse_scheduler_status("R"), Some(JobStatus::Running));
        assert_eq!(parse_scheduler_status("E"), Some(JobStatus::Running));
        assert_eq!(parse_scheduler_status("F"), Some(JobStatus::Completed));
    }

    #[test]
    fn uses_first_non_empty_line() {
        assert_eq!(
            parse_scheduler_status("\n\nrunning\ncompleted\n"),
            Some(JobStatus::Running)
        );
    }

    #[test]
    fn unknown_or_empty_output_is_unmapped() {
        assert_eq!(parse_scheduler_status(""), None);
        assert_eq!(parse_scheduler_status("   \n"), None);
        assert_eq!(parse_scheduler_status("on fire"), None);
    }
}
