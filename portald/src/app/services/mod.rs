// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod catalog;
pub mod directives;
pub mod scheduler_status;
pub mod script;
pub mod walltime;
