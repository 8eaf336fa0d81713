// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::{CustomKind, CustomRecord};

#[async_trait]
/// Persistence boundary for user-authored directive snippets.
pub trait CustomStorePort: Send + Sync {
    async fn insert_custom(
        &self,
        kind: CustomKind,
        label: &str,
        script_lines: &str,
    ) -> AppResult<CustomRecord>;
    async fn get_custom(&self, kind: CustomKind, id: i64) -> AppResult<Option<CustomRecord>>;
    /// Ordered by id so resource indices stay stable.
    async fn list_custom(&self, kind: CustomKind) -> AppResult<Vec<CustomRecord>>;
    async fn delete_custom(&self, kind: CustomKind, id: i64) -> AppResult<bool>;
}
