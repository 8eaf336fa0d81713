// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::time::Duration;

use crate::app::types::{JobStatus, Walltime};

/// Marker file written by the running job: elapsed seconds as plain text.
pub const WALLTIME_MARKER: &str = "WALLTIME";

/// Stored walltimes are multiples of this.
pub const ROUNDING_INTERVAL: Duration = Duration::from_secs(15);

/// Rounds to the nearest multiple of [`ROUNDING_INTERVAL`], ties up.
/// Jobs killed at their walltime limit then report exactly that limit.
pub fn round_walltime(elapsed: Duration) -> Duration {
    let interval = ROUNDING_INTERVAL.as_millis();
    let steps = (elapsed.as_millis() + interval / 2) / interval;
    Duration::from_millis((steps * interval) as u64)
}

pub fn parse_marker(contents: &str) -> Option<Duration> {
    contents.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Derives the reported walltime from a job's status, its stored value and,
/// for running jobs, the live marker contents.
pub fn report(status: JobStatus, stored_secs: Option<i64>, marker: Option<&str>) -> Walltime {
    match status {
        JobStatus::Queueing => Walltime::NotApplicable,
        JobStatus::Completed => match stored_secs {
            Some(secs) if secs >= 0 => Walltime::Stored(Duration::from_secs(secs as u64)),
            _ => Walltime::Unknown,
        },
        JobStatus::Running => match marker.and_then(parse_marker) {
            Some(elapsed) => Walltime::Live(elapsed),
            None => Walltime::Unknown,
        },
    }
}
