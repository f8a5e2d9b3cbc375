//! SQL rendering of entity queries.
//!
//! Each filter a query carries becomes a predicate on the JSON body, so
//! PostgreSQL returns only the documents the query selects.

use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::query::{
    AuthorizationQuery, BatchQuery, EntityQuery, IncidentQuery, JobDefinitionQuery, JobQuery,
};

/// Build `SELECT body FROM rt_entity WHERE kind = $1 AND ... ORDER BY id`.
pub(crate) fn select_bodies(query: &EntityQuery) -> QueryBuilder<'static, Postgres> {
    let mut sql = QueryBuilder::new("SELECT body FROM rt_entity WHERE kind = ");
    sql.push_bind(query.kind().as_str());

    match query {
        EntityQuery::Job(q) => push_job(&mut sql, q),
        EntityQuery::JobDefinition(q) => push_job_definition(&mut sql, q),
        EntityQuery::Batch(q) => push_batch(&mut sql, q),
        EntityQuery::Authorization(q) => push_authorization(&mut sql, q),
        EntityQuery::Incident(q) => push_incident(&mut sql, q),
    }

    sql.push(" ORDER BY id");
    sql
}

fn push_job(sql: &mut QueryBuilder<'static, Postgres>, q: &JobQuery) {
    if let Some(ids) = &q.job_ids {
        id_in(sql, ids.iter().map(|id| id.into_uuid()).collect());
    }
    if let Some(ids) = &q.job_definition_ids {
        uuid_field_in(
            sql,
            "job_definition_id",
            ids.iter().map(|id| id.into_uuid()).collect(),
        );
    }
    if let Some(job_type) = &q.job_type {
        text_eq(sql, "job_type", job_type.clone());
    }
    if let Some(deployment_id) = &q.deployment_id {
        text_eq(sql, "deployment_id", deployment_id.clone());
    }
    if let Some(tenant_id) = &q.tenant_id {
        text_eq(sql, "tenant_id", tenant_id.clone());
    }
    if let Some(suspended) = q.suspended {
        bool_eq(sql, "suspended", suspended);
    }
    if q.with_retries_left {
        sql.push(" AND (body->>'retries')::int > 0");
    }
    if q.no_retries_left {
        sql.push(" AND (body->>'retries')::int <= 0");
    }
    if q.with_exception {
        sql.push(" AND body->>'exception_message' IS NOT NULL");
    }
    if let Some(owner) = &q.lock_owner {
        text_eq(sql, "lock_owner", owner.clone());
    }
}

fn push_job_definition(sql: &mut QueryBuilder<'static, Postgres>, q: &JobDefinitionQuery) {
    if let Some(ids) = &q.ids {
        id_in(sql, ids.iter().map(|id| id.into_uuid()).collect());
    }
    if let Some(job_type) = &q.job_type {
        text_eq(sql, "job_type", job_type.clone());
    }
    if let Some(suspended) = q.suspended {
        bool_eq(sql, "suspended", suspended);
    }
}

fn push_batch(sql: &mut QueryBuilder<'static, Postgres>, q: &BatchQuery) {
    if let Some(id) = q.batch_id {
        sql.push(" AND id = ");
        sql.push_bind(id.into_uuid());
    }
    if let Some(batch_type) = &q.batch_type {
        text_eq(sql, "batch_type", batch_type.clone());
    }
    if let Some(suspended) = q.suspended {
        bool_eq(sql, "suspended", suspended);
    }
    match q.completed {
        Some(true) => {
            sql.push(" AND body->>'completed_at' IS NOT NULL");
        }
        Some(false) => {
            sql.push(" AND body->>'completed_at' IS NULL");
        }
        None => {}
    }
    if let Some(tenant_id) = &q.tenant_id {
        text_eq(sql, "tenant_id", tenant_id.clone());
    }
}

fn push_authorization(sql: &mut QueryBuilder<'static, Postgres>, q: &AuthorizationQuery) {
    if let Some(resources) = &q.resources {
        text_in(
            sql,
            "resource",
            resources.iter().map(|r| r.as_str().to_string()).collect(),
        );
    }
    if let Some(resource_id) = &q.resource_id {
        text_eq(sql, "resource_id", resource_id.clone());
    }
    if let Some(auth_type) = q.auth_type {
        text_eq(sql, "auth_type", auth_type.to_string());
    }
    if let Some(user_ids) = &q.user_ids {
        text_in(sql, "user_id", user_ids.clone());
    }
    if let Some(group_ids) = &q.group_ids {
        text_in(sql, "group_id", group_ids.clone());
    }
}

fn push_incident(sql: &mut QueryBuilder<'static, Postgres>, q: &IncidentQuery) {
    if let Some(ids) = &q.job_ids {
        uuid_field_in(sql, "job_id", ids.iter().map(|id| id.into_uuid()).collect());
    }
    if let Some(id) = q.job_definition_id {
        sql.push(" AND (body->>'job_definition_id')::uuid = ");
        sql.push_bind(id.into_uuid());
    }
    if let Some(incident_type) = &q.incident_type {
        text_eq(sql, "incident_type", incident_type.clone());
    }
}

fn id_in(sql: &mut QueryBuilder<'static, Postgres>, ids: Vec<Uuid>) {
    sql.push(" AND id = ANY(");
    sql.push_bind(ids);
    sql.push(")");
}

fn uuid_field_in(sql: &mut QueryBuilder<'static, Postgres>, field: &str, ids: Vec<Uuid>) {
    sql.push(format_args!(" AND (body->>'{field}')::uuid = ANY("));
    sql.push_bind(ids);
    sql.push(")");
}

fn text_eq(sql: &mut QueryBuilder<'static, Postgres>, field: &str, value: String) {
    sql.push(format_args!(" AND body->>'{field}' = "));
    sql.push_bind(value);
}

fn text_in(sql: &mut QueryBuilder<'static, Postgres>, field: &str, values: Vec<String>) {
    sql.push(format_args!(" AND body->>'{field}' = ANY("));
    sql.push_bind(values);
    sql.push(")");
}

fn bool_eq(sql: &mut QueryBuilder<'static, Postgres>, field: &str, value: bool) {
    sql.push(format_args!(" AND (body->>'{field}')::boolean = "));
    sql.push_bind(value);
}
