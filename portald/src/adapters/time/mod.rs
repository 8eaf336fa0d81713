// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use time::OffsetDateTime;

use crate::app::ports::ClockPort;

#[derive(Clone, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl ClockPort for SystemClock {
    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock pinned to one instant, for deterministic submission times in tests.
#[cfg(test)]
#[derive(Clone)]
pub struct FixedClock(pub OffsetDateTime);

#[cfg(test)]
impl ClockPort for FixedClock {
    fn now_utc(&self) -> OffsetDateTime {
        self.0
    }
}
