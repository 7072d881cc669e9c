//! The durable job queue.
//!
//! A job is `available` until a worker claims it, at which point it is `running` and `claimed_at` is stamped. Claims
//! are a single `UPDATE ... RETURNING`, so two workers never receive the same job from the same claim. A `running` job
//! whose lease has run out is treated as abandoned and can be claimed again.
use chrono::{DateTime, Duration, Utc};
use log::{trace, warn};
use sqlx::SqliteConnection;

use crate::db_types::{Job, JobId, JobStatus, NewJob};

pub async fn enqueue(job: &NewJob, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Job, sqlx::Error> {
    let job: Job = sqlx::query_as(
        r#"
        INSERT INTO jobs (kind, payload, status, attempts, max_attempts, run_at, created_at)
        VALUES ($1, $2, $3, 0, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(&job.kind)
    .bind(&job.payload)
    .bind(JobStatus::Available)
    .bind(job.max_attempts)
    .bind(job.run_at)
    .bind(now)
    .fetch_one(conn)
    .await?;
    trace!("🕰️ Job {} ({}) enqueued to run at {}", job.id, job.kind, job.run_at);
    Ok(job)
}

pub async fn claim(
    kind: &str,
    limit: i64,
    now: DateTime<Utc>,
    lease: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<Job>, sqlx::Error> {
    let lease_expired = now - lease;
    let mut jobs: Vec<Job> = sqlx::query_as(
        r#"
        UPDATE jobs SET status = $1, attempts = attempts + 1, claimed_at = $2
        WHERE id IN (
            SELECT id FROM jobs
            WHERE kind = $3 AND (
                (status = $4 AND run_at <= $2) OR
                (status = $1 AND claimed_at <= $5)
            )
            ORDER BY run_at, id
            LIMIT $6
        )
        RETURNING *
        "#,
    )
    .bind(JobStatus::Running)
    .bind(now)
    .bind(kind)
    .bind(JobStatus::Available)
    .bind(lease_expired)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    jobs.sort_by_key(|j| (j.run_at, j.id));
    trace!("🕰️ Claimed {} {kind} jobs", jobs.len());
    Ok(jobs)
}

pub async fn complete(id: JobId, conn: &mut SqliteConnection) -> Result<Option<Job>, sqlx::Error> {
    let job = sqlx::query_as("UPDATE jobs SET status = $1, last_error = NULL WHERE id = $2 RETURNING *")
        .bind(JobStatus::Completed)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(job)
}

/// Records the error and either reschedules the job at `retry_at` or, once it has no attempts left, discards it.
pub async fn fail(
    id: JobId,
    error: &str,
    retry_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Job>, sqlx::Error> {
    let job: Option<Job> = sqlx::query_as(
        r#"
        UPDATE jobs SET
            status = CASE WHEN attempts >= max_attempts THEN $1 ELSE $2 END,
            run_at = $3,
            claimed_at = NULL,
            last_error = $4
        WHERE id = $5
        RETURNING *
        "#,
    )
    .bind(JobStatus::Discarded)
    .bind(JobStatus::Available)
    .bind(retry_at)
    .bind(error)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    if let Some(j) = job.as_ref().filter(|j| j.status == JobStatus::Discarded) {
        warn!("🕰️ Job {} ({}) discarded after {} attempts. Last error: {error}", j.id, j.kind, j.attempts);
    }
    Ok(job)
}

pub async fn fetch(id: JobId, conn: &mut SqliteConnection) -> Result<Option<Job>, sqlx::Error> {
    let job = sqlx::query_as("SELECT * FROM jobs WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(job)
}
