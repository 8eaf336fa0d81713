// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod clock;
pub mod custom_store;
pub mod job_dirs;
pub mod job_store;
pub mod project_store;
pub mod scheduler;
pub mod telemetry;

pub use clock::ClockPort;
pub use custom_store::CustomStorePort;
pub use job_dirs::JobDirectoryPort;
pub use job_store::JobStorePort;
pub use project_store::ProjectStorePort;
pub use scheduler::{SchedulerError, SchedulerPort};
#[allow(unused_imports)]
pub use telemetry::{NoopTelemetry, TelemetryEvent, TelemetryPort};
