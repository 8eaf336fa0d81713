// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{path::Path, str::FromStr, time::Duration};
use thiserror::Error;

use crate::app::types::{
    CustomKind, CustomRecord, JobQuery, JobRecord, JobStatus, NewJob, ProjectRecord,
};

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("empty project name")]
    EmptyProjectName,
    #[error("empty label")]
    EmptyLabel,
    #[error("project not found: {0}")]
    ProjectNotFound(i64),
    #[error("invalid status stored for job {id}: {value}")]
    InvalidStatus { id: i64, value: String },
}

pub type Result<T> = std::result::Result<T, JobStoreError>;

const JOB_COLUMNS: &str = r#"
    j.id as id,
    j.job_id as job_id,
    j.status as status,
    j.submission_time as submission_time,
    j.description as description,
    j.project_id as project_id,
    p.name as project_name,
    j.resources as resources,
    j.software as software,
    j.walltime_secs as walltime_secs
"#;

// Optional filters are bound as NULL when unset.
const JOB_FILTER: &str = r#"
    where (?1 is null or j.description like ?1 escape '\')
      and (?2 is null or j.description not like ?2 escape '\')
      and (?3 is null or j.project_id = ?3)
      and (?4 is null or j.status = ?4)
      and (?5 is null or j.resources = ?5)
      and (?6 is null or j.software = ?6)
"#;

/// Async SQLite store for jobs, projects and custom directive snippets.
#[derive(Clone)]
pub struct PortalStore {
    pool: SqlitePool,
}

impl PortalStore {
    /// Open (or create) a file-backed SQLite DB.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let url = format!("sqlite://{}", path_ref.to_string_lossy());
        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    /// Open an in-memory store (handy for tests).
    #[allow(dead_code)]
    pub async fn open_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    async fn bootstrap(&self) -> Result<()> {
        // Improve concurrency for file DBs.
        let _ = sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await;

        self.ensure_projects_table().await?;
        self.ensure_jobs_table().await?;
        self.ensure_custom_tables().await?;
        Ok(())
    }

    async fn ensure_projects_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              name TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ensure_jobs_table(&self) -> Result<()> {
        // AUTOINCREMENT keeps job numbers (and so directory names) from being reused.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              status TEXT NOT NULL DEFAULT 'Queueing',
              job_id TEXT NOT NULL DEFAULT '',
              submission_time TEXT NOT NULL,
              description TEXT NOT NULL DEFAULT '',
              project_id INTEGER REFERENCES projects(id) ON DELETE SET NULL,
              resources TEXT NOT NULL,
              software TEXT NOT NULL,
              walltime_secs INTEGER,
              CHECK (status IN ('Queueing', 'Running', 'Completed'))
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_jobs_project_id ON jobs(project_id);
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ensure_custom_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS custom_configs (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              label TEXT NOT NULL,
              script_lines TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS custom_resources (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              label TEXT NOT NULL,
              script_lines TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -- jobs

    pub async fn insert_job(&self, job: &NewJob) -> Result<i64> {
        if let Some(project_id) = job.project_id {
            if self.get_project(project_id).await?.is_none() {
                return Err(JobStoreError::ProjectNotFound(project_id));
            }
        }
        let rec = sqlx::query(
            r#"
            insert into jobs(status, job_id, submission_time, description, project_id, resources, software)
            values (?1, '', ?2, ?3, ?4, ?5, ?6)
            returning id;
            "#,
        )
        .bind(JobStatus::Queueing.as_str())
        .bind(&job.submission_time)
        .bind(&job.description)
        .bind(job.project_id)
        .bind(&job.resources)
        .bind(&job.software)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec.try_get::<i64, _>("id")?)
    }

    pub async fn get_job(&self, id: i64) -> Result<Option<JobRecord>> {
        let sql = format!(
            "select {JOB_COLUMNS} from jobs j left join projects p on j.project_id = p.id where j.id = ?1"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_job).transpose()
    }

    pub async fn list_jobs(&self, query: &JobQuery) -> Result<Vec<JobRecord>> {
        let per_page = query.per_page.max(1) as i64;
        let offset = (query.page.max(1) as i64 - 1) * per_page;
        let sql = format!(
            "select {JOB_COLUMNS} from jobs j left join projects p on j.project_id = p.id {JOB_FILTER} order by j.id desc limit ?7 offset ?8"
        );
        let rows = bind_filter(sqlx::query(&sql), query)
            .bind(per_page)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_job).collect()
    }

    pub async fn count_jobs(&self, query: &JobQuery) -> Result<i64> {
        let sql = format!("select count(*) as n from jobs j {JOB_FILTER}");
        let row = bind_filter(sqlx::query(&sql), query)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")?)
    }

    pub async fn list_unfinished_jobs(&self) -> Result<Vec<JobRecord>> {
        let sql = format!(
            "select {JOB_COLUMNS} from jobs j left join projects p on j.project_id = p.id where j.status != ?1 order by j.id desc"
        );
        let rows = sqlx::query(&sql)
            .bind(JobStatus::Completed.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_job).collect()
    }

    pub async fn set_scheduler_id(&self, id: i64, job_id: &str) -> Result<()> {
        sqlx::query("update jobs set job_id = ?1 where id = ?2")
            .bind(job_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Status and walltime are written in one statement.
    pub async fn update_status(
        &self,
        id: i64,
        status: JobStatus,
        walltime_secs: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            update jobs
            set status = ?1,
                walltime_secs = coalesce(?2, walltime_secs)
            where id = ?3
            "#,
        )
        .bind(status.as_str())
        .bind(walltime_secs)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_job(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("delete from jobs where id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- projects

    pub async fn insert_project(&self, name: &str) -> Result<ProjectRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Err(JobStoreError::EmptyProjectName);
        }
        let rec = sqlx::query("insert into projects(name) values (?1) returning id")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(ProjectRecord {
            id: rec.try_get("id")?,
            name: name.to_string(),
            job_count: 0,
        })
    }

    pub async fn get_project(&self, id: i64) -> Result<Option<ProjectRecord>> {
        let row = sqlx::query(
            r#"
            select p.id as id, p.name as name, count(j.id) as job_count
            from projects p
            left join jobs j on j.project_id = p.id
            where p.id = ?1
            group by p.id
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_project).transpose()
    }

    pub async fn list_projects(&self) -> Result<Vec<ProjectRecord>> {
        let rows = sqlx::query(
            r#"
            select p.id as id, p.name as name, count(j.id) as job_count
            from projects p
            left join jobs j on j.project_id = p.id
            group by p.id
            order by p.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_project).collect()
    }

    pub async fn delete_project(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("delete from projects where id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- custom directive snippets

    pub async fn insert_custom(
        &self,
        kind: CustomKind,
        label: &str,
        script_lines: &str,
    ) -> Result<CustomRecord> {
        let label = label.trim();
        if label.is_empty() {
            return Err(JobStoreError::EmptyLabel);
        }
        let sql = format!(
            "insert into {}(label, script_lines) values (?1, ?2) returning id",
            custom_table(kind)
        );
        let rec = sqlx::query(&sql)
            .bind(label)
            .bind(script_lines)
            .fetch_one(&self.pool)
            .await?;
        Ok(CustomRecord {
            id: rec.try_get("id")?,
            label: label.to_string(),
            script_lines: script_lines.to_string(),
        })
    }

    pub async fn get_custom(&self, kind: CustomKind, id: i64) -> Result<Option<CustomRecord>> {
        let sql = format!(
            "select id, label, script_lines from {} where id = ?1",
            custom_table(kind)
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_custom).transpose()
    }

    pub async fn list_custom(&self, kind: CustomKind) -> Result<Vec<CustomRecord>> {
        let sql = format!(
            "select id, label, script_lines from {} order by id",
            custom_table(kind)
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_custom).collect()
    }

    pub async fn delete_custom(&self, kind: CustomKind, id: i64) -> Result<bool> {
        let sql = format!("delete from {} where id = ?1", custom_table(kind));
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

// -- helpers

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_filter<'q>(query: SqliteQuery<'q>, filter: &JobQuery) -> SqliteQuery<'q> {
    query
        .bind(filter.description_contains.as_deref().map(like_pattern))
        .bind(filter.description_excludes.as_deref().map(like_pattern))
        .bind(filter.project_id)
        .bind(filter.status.map(JobStatus::as_str))
        .bind(filter.resources.clone())
        .bind(filter.software.clone())
}

fn like_pattern(needle: &str) -> String {
    format!("%{}%", escape_like(needle))
}

fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn custom_table(kind: CustomKind) -> &'static str {
    match kind {
        CustomKind::Config => "custom_configs",
        CustomKind::Resource => "custom_resources",
    }
}

fn row_to_job(row: sqlx::sqlite::SqliteRow) -> Result<JobRecord> {
    let id: i64 = row.try_get("id")?;
    let status_raw: String = row.try_get("status")?;
    let status = status_raw
        .parse::<JobStatus>()
        .map_err(|_| JobStoreError::InvalidStatus {
            id,
            value: status_raw.clone(),
        })?;
    Ok(JobRecord {
        id,
        job_id: row.try_get("job_id")?,
        status,
        submission_time: row.try_get("submission_time")?,
        description: row.try_get("description")?,
        project_id: row.try_get("project_id").ok().flatten(),
        project_name: row.try_get("project_name").ok().flatten(),
        resources: row.try_get("resources")?,
        software: row.try_get("software")?,
        walltime_secs: row.try_get("walltime_secs").ok().flatten(),
    })
}

fn row_to_project(row: sqlx::sqlite::SqliteRow) -> Result<ProjectRecord> {
    Ok(ProjectRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        job_count: row.try_get("job_count")?,
    })
}

fn row_to_custom(row: sqlx::sqlite::SqliteRow) -> Result<CustomRecord> {
    Ok(CustomRecord {
        id: row.try_get("id")?,
        label: row.try_get("label")?,
        script_lines: row.try_get("script_lines")?,
    })
}
