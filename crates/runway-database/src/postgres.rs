//! PostgreSQL datastore.
//!
//! Entities are stored as JSON documents in `rt_entity`, keyed by kind and
//! id, with the optimistic-locking revision mirrored in its own column.
//! Job claiming is a single `UPDATE ... WHERE id IN (SELECT ... FOR UPDATE
//! SKIP LOCKED)` statement.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use runway_core::AppResult;
use runway_core::config::DatabaseConfig;
use runway_core::error::{AppError, ErrorKind};
use runway_core::types::JobId;
use runway_entity::job::Job;

use crate::entity::{DbEntity, EntityKind};
use crate::filter::select_bodies;
use crate::query::EntityQuery;
use crate::session::{ClaimRequest, Datastore, DbOperation, PersistenceSession, acquisition_order};

const CLAIM_JOBS: &str = "\
UPDATE rt_entity SET \
    revision = revision + 1, \
    body = jsonb_set(jsonb_set(jsonb_set(body, \
        '{lock_owner}', to_jsonb($1::text)), \
        '{lock_expiration_time}', to_jsonb($2::timestamptz)), \
        '{revision}', to_jsonb(revision + 1)) \
WHERE kind = 'job' AND id IN ( \
    SELECT id FROM rt_entity \
    WHERE kind = 'job' \
      AND (body->>'suspended')::boolean = false \
      AND (body->>'retries')::int > 0 \
      AND (body->>'due_date')::timestamptz <= $3 \
      AND (body->>'lock_expiration_time' IS NULL \
           OR (body->>'lock_expiration_time')::timestamptz <= $3) \
      AND ($5::text[] IS NULL OR body->>'deployment_id' IS NULL \
           OR body->>'deployment_id' = ANY($5)) \
      AND ($6::bigint IS NULL OR (body->>'priority')::bigint >= $6) \
      AND ($7::bigint IS NULL OR (body->>'priority')::bigint <= $7) \
    ORDER BY (body->>'priority')::bigint DESC, \
             (body->>'due_date')::timestamptz ASC, \
             id ASC \
    LIMIT $4 \
    FOR UPDATE SKIP LOCKED \
) RETURNING body";

const RELEASE_JOBS: &str = "\
UPDATE rt_entity SET \
    revision = revision + 1, \
    body = jsonb_set(jsonb_set(jsonb_set(body, \
        '{lock_owner}', 'null'::jsonb), \
        '{lock_expiration_time}', 'null'::jsonb), \
        '{revision}', to_jsonb(revision + 1)) \
WHERE kind = 'job' AND id = ANY($1) AND body->>'lock_owner' = $2";

/// Partial indexes the claim, definition cascade and authorization lookups
/// depend on.
const REQUIRED_INDEXES: [&str; 3] = [
    "idx_rt_entity_job_priority",
    "idx_rt_entity_job_definition",
    "idx_rt_entity_authorization_resource",
];

/// Map a sqlx error, prefixing the failed step.
fn map_sqlx_error(message: &str, err: sqlx::Error) -> AppError {
    let mut mapped = AppError::from(err);
    mapped.message = format!("{message}: {}", mapped.message);
    mapped
}

fn decode_job(body: serde_json::Value) -> AppResult<Job> {
    Ok(serde_json::from_value(body)?)
}

/// Datastore backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgDatastore {
    pool: PgPool,
}

impl PgDatastore {
    /// Create a datastore over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with the configured pool limits, apply pending migrations
    /// and check that the entity table and its indexes are in place.
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        info!(
            url = %mask_password(&config.url),
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error("Failed to connect to database", e))?;

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    format!("Failed to run migrations: {e}"),
                    e,
                )
            })?;

        let datastore = Self { pool };
        datastore.verify_schema().await?;
        Ok(datastore)
    }

    async fn verify_schema(&self) -> AppResult<()> {
        let present: Vec<String> = sqlx::query_scalar(
            "SELECT indexname::text FROM pg_indexes WHERE tablename = 'rt_entity'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("Failed to inspect schema", e))?;

        let missing = missing_indexes(&present);
        if !missing.is_empty() {
            return Err(AppError::new(
                ErrorKind::Database,
                format!("rt_entity is missing indexes: {}", missing.join(", ")),
            ));
        }

        let counts: Vec<(String, i64)> =
            sqlx::query_as("SELECT kind, count(*) FROM rt_entity GROUP BY kind ORDER BY kind")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("Failed to count entities", e))?;
        for (kind, count) in counts {
            info!(kind = %kind, count, "Stored entities");
        }
        Ok(())
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}

fn missing_indexes(present: &[String]) -> Vec<&'static str> {
    REQUIRED_INDEXES
        .into_iter()
        .filter(|name| !present.iter().any(|p| p == name))
        .collect()
}

/// Mask the password portion of a database URL for logging.
fn mask_password(url: &str) -> String {
    let scheme_end = url.find("://").map_or(0, |p| p + 3);
    match url.rfind('@') {
        Some(at) if at > scheme_end => match url[scheme_end..at].find(':') {
            Some(colon) => {
                let colon = scheme_end + colon;
                format!("{}:****@{}", &url[..colon], &url[at + 1..])
            }
            None => url.to_string(),
        },
        _ => url.to_string(),
    }
}

#[async_trait]
impl Datastore for PgDatastore {
    async fn open_session(&self) -> AppResult<Box<dyn PersistenceSession>> {
        Ok(Box::new(PgSession {
            pool: self.pool.clone(),
            tx: None,
        }))
    }

    async fn claim_jobs(&self, request: &ClaimRequest) -> AppResult<Vec<Job>> {
        let bodies: Vec<serde_json::Value> = sqlx::query_scalar(CLAIM_JOBS)
            .bind(&request.lock_owner)
            .bind(request.lock_expiration)
            .bind(request.now)
            .bind(i64::try_from(request.max_jobs).unwrap_or(i64::MAX))
            .bind(request.deployment_ids.clone())
            .bind(request.priority_min)
            .bind(request.priority_max)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Failed to claim jobs", e))?;

        let mut jobs = bodies
            .into_iter()
            .map(decode_job)
            .collect::<AppResult<Vec<_>>>()?;
        jobs.sort_by(acquisition_order);

        if !jobs.is_empty() {
            debug!(owner = %request.lock_owner, claimed = jobs.len(), "Claimed jobs");
        }
        Ok(jobs)
    }

    async fn release_jobs(&self, owner: &str, ids: &[JobId]) -> AppResult<usize> {
        let ids: Vec<Uuid> = ids.iter().map(|id| id.into_uuid()).collect();
        let result = sqlx::query(RELEASE_JOBS)
            .bind(ids)
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Failed to release jobs", e))?;
        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }
}

/// Session holding one PostgreSQL transaction, begun on first use.
pub struct PgSession {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl fmt::Debug for PgSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgSession")
            .field("in_transaction", &self.tx.is_some())
            .finish()
    }
}

impl PgSession {
    async fn transaction(&mut self) -> AppResult<&mut Transaction<'static, Postgres>> {
        if self.tx.is_none() {
            let tx = self
                .pool
                .begin()
                .await
                .map_err(|e| map_sqlx_error("Failed to begin transaction", e))?;
            self.tx = Some(tx);
        }
        self.tx
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction was not started"))
    }
}

#[async_trait]
impl PersistenceSession for PgSession {
    async fn select(&mut self, kind: EntityKind, id: Uuid) -> AppResult<Option<DbEntity>> {
        let tx = self.transaction().await?;
        let body: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT body FROM rt_entity WHERE kind = $1 AND id = $2")
                .bind(kind.as_str())
                .bind(id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("Failed to select entity", e))?;

        body.map(|b| DbEntity::from_json(kind, b)).transpose()
    }

    async fn select_list(&mut self, query: &EntityQuery) -> AppResult<Vec<DbEntity>> {
        let kind = query.kind();
        let tx = self.transaction().await?;
        let mut sql = select_bodies(query);
        let bodies: Vec<serde_json::Value> = sql
            .build_query_scalar()
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("Failed to select entities", e))?;

        bodies
            .into_iter()
            .map(|body| DbEntity::from_json(kind, body))
            .collect()
    }

    async fn flush(&mut self, operations: Vec<DbOperation>) -> AppResult<()> {
        let tx = self.transaction().await?;

        for op in operations {
            let key = op.key();
            let affected = match &op {
                DbOperation::Insert(entity) => sqlx::query(
                    "INSERT INTO rt_entity (kind, id, revision, body) VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (kind, id) DO NOTHING",
                )
                .bind(key.kind.as_str())
                .bind(key.id)
                .bind(entity.revision())
                .bind(entity.to_json()?)
                .execute(&mut **tx)
                .await,
                DbOperation::Update {
                    entity,
                    expected_revision,
                } => sqlx::query(
                    "UPDATE rt_entity SET revision = $3, body = $4 \
                     WHERE kind = $1 AND id = $2 AND revision = $5",
                )
                .bind(key.kind.as_str())
                .bind(key.id)
                .bind(entity.revision())
                .bind(entity.to_json()?)
                .bind(*expected_revision)
                .execute(&mut **tx)
                .await,
                DbOperation::Delete {
                    expected_revision, ..
                } => sqlx::query(
                    "DELETE FROM rt_entity WHERE kind = $1 AND id = $2 AND revision = $3",
                )
                .bind(key.kind.as_str())
                .bind(key.id)
                .bind(*expected_revision)
                .execute(&mut **tx)
                .await,
            }
            .map_err(|e| map_sqlx_error("Failed to flush entity", e))?
            .rows_affected();

            if affected == 0 {
                return Err(AppError::concurrent_modification(format!(
                    "{key} was modified by another transaction"
                )));
            }
        }
        Ok(())
    }

    async fn commit(&mut self) -> AppResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("Failed to commit transaction", e))?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> AppResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("Failed to roll back transaction", e))?;
        }
        Ok(())
    }

    async fn close(&mut self) -> AppResult<()> {
        self.rollback().await
    }
}
