// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::ports::{TelemetryEvent, TelemetryPort};

/// Lifecycle events as structured `info` records under `portald::telemetry`.
#[derive(Clone, Default)]
pub struct TracingTelemetry;

impl TracingTelemetry {
    pub fn new() -> Self {
        Self
    }
}

impl TelemetryPort for TracingTelemetry {
    fn event(&self, name: &'static str, fields: TelemetryEvent) {
        let TelemetryEvent {
            job_number,
            job_id,
            status,
            software,
            detail,
        } = fields;

        tracing::info!(
            target: "portald::telemetry",
            event = name,
            job_number = job_number.as_deref(),
            job_id = job_id.as_deref(),
            status = status.as_deref(),
            software = software.as_deref(),
            detail = detail.as_deref(),
        );
    }
}
