//! Typed entity queries.
//!
//! A query is a plain filter value. Sessions evaluate it against stored
//! documents and the command context evaluates it again against entities
//! it holds in memory, so a query always sees the caller's own pending
//! changes.

use runway_core::types::{BatchId, JobDefinitionId, JobId};
use runway_entity::authorization::{Authorization, AuthorizationType, Resource};
use runway_entity::batch::Batch;
use runway_entity::incident::Incident;
use runway_entity::job::{Job, JobDefinition};

use crate::entity::{DbEntity, Entity, EntityKind};

/// A filter over one entity type.
pub trait Query: Send + Sync {
    /// Entity type returned by the query.
    type Entity: Entity;

    /// Whether `entity` passes the filter.
    fn matches(&self, entity: &Self::Entity) -> bool;

    /// Erase into the session-level query.
    fn into_entity_query(self) -> EntityQuery;
}

/// Session-level query over any entity kind.
#[derive(Debug, Clone)]
pub enum EntityQuery {
    /// Jobs.
    Job(JobQuery),
    /// Job definitions.
    JobDefinition(JobDefinitionQuery),
    /// Batches.
    Batch(BatchQuery),
    /// Authorizations.
    Authorization(AuthorizationQuery),
    /// Incidents.
    Incident(IncidentQuery),
}

impl EntityQuery {
    /// Kind of entity the query selects.
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Job(_) => EntityKind::Job,
            Self::JobDefinition(_) => EntityKind::JobDefinition,
            Self::Batch(_) => EntityKind::Batch,
            Self::Authorization(_) => EntityKind::Authorization,
            Self::Incident(_) => EntityKind::Incident,
        }
    }

    /// Whether `entity` passes the filter.
    pub fn matches(&self, entity: &DbEntity) -> bool {
        match (self, entity) {
            (Self::Job(q), DbEntity::Job(e)) => q.matches(e),
            (Self::JobDefinition(q), DbEntity::JobDefinition(e)) => q.matches(e),
            (Self::Batch(q), DbEntity::Batch(e)) => q.matches(e),
            (Self::Authorization(q), DbEntity::Authorization(e)) => q.matches(e),
            (Self::Incident(q), DbEntity::Incident(e)) => q.matches(e),
            _ => false,
        }
    }
}

fn opt_eq<T: PartialEq>(filter: &Option<T>, value: &T) -> bool {
    filter.as_ref().is_none_or(|f| f == value)
}

fn opt_in<T: PartialEq>(filter: &Option<Vec<T>>, value: &T) -> bool {
    filter.as_ref().is_none_or(|values| values.contains(value))
}

/// Job filter.
#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    /// Restrict to these ids.
    pub job_ids: Option<Vec<JobId>>,
    /// Restrict to jobs of these definitions.
    pub job_definition_ids: Option<Vec<JobDefinitionId>>,
    /// Restrict to a job type.
    pub job_type: Option<String>,
    /// Restrict to a deployment.
    pub deployment_id: Option<String>,
    /// Restrict to a tenant.
    pub tenant_id: Option<String>,
    /// Restrict to suspended or active jobs.
    pub suspended: Option<bool>,
    /// Only jobs with `retries > 0`.
    pub with_retries_left: bool,
    /// Only jobs with `retries <= 0`.
    pub no_retries_left: bool,
    /// Only jobs with a recorded failure.
    pub with_exception: bool,
    /// Restrict to jobs leased by this owner.
    pub lock_owner: Option<String>,
}

impl JobQuery {
    /// Match every job.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a single job.
    pub fn job_id(mut self, id: JobId) -> Self {
        self.job_ids = Some(vec![id]);
        self
    }

    /// Restrict to a set of jobs.
    pub fn job_ids(mut self, ids: Vec<JobId>) -> Self {
        self.job_ids = Some(ids);
        self
    }

    /// Restrict to jobs of one definition.
    pub fn job_definition_id(mut self, id: JobDefinitionId) -> Self {
        self.job_definition_ids = Some(vec![id]);
        self
    }

    /// Restrict to jobs of several definitions.
    pub fn job_definition_ids(mut self, ids: Vec<JobDefinitionId>) -> Self {
        self.job_definition_ids = Some(ids);
        self
    }

    /// Restrict to a job type.
    pub fn job_type(mut self, job_type: impl Into<String>) -> Self {
        self.job_type = Some(job_type.into());
        self
    }

    /// Restrict to a deployment.
    pub fn deployment_id(mut self, deployment_id: impl Into<String>) -> Self {
        self.deployment_id = Some(deployment_id.into());
        self
    }

    /// Restrict to a tenant.
    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Restrict to suspended (`true`) or active (`false`) jobs.
    pub fn suspended(mut self, suspended: bool) -> Self {
        self.suspended = Some(suspended);
        self
    }

    /// Only jobs that still have retries.
    pub fn with_retries_left(mut self) -> Self {
        self.with_retries_left = true;
        self
    }

    /// Only jobs whose retries are exhausted.
    pub fn no_retries_left(mut self) -> Self {
        self.no_retries_left = true;
        self
    }

    /// Only jobs with a recorded failure.
    pub fn with_exception(mut self) -> Self {
        self.with_exception = true;
        self
    }

    /// Restrict to jobs leased by `owner`.
    pub fn lock_owner(mut self, owner: impl Into<String>) -> Self {
        self.lock_owner = Some(owner.into());
        self
    }
}

impl Query for JobQuery {
    type Entity = Job;

    fn matches(&self, job: &Job) -> bool {
        opt_in(&self.job_ids, &job.id)
            && self
                .job_definition_ids
                .as_ref()
                .is_none_or(|ids| job.job_definition_id.is_some_and(|id| ids.contains(&id)))
            && opt_eq(&self.job_type, &job.job_type)
            && self
                .deployment_id
                .as_ref()
                .is_none_or(|d| job.deployment_id.as_ref() == Some(d))
            && self
                .tenant_id
                .as_ref()
                .is_none_or(|t| job.tenant_id.as_ref() == Some(t))
            && opt_eq(&self.suspended, &job.suspended)
            && (!self.with_retries_left || job.retries > 0)
            && (!self.no_retries_left || job.retries <= 0)
            && (!self.with_exception || job.exception_message.is_some())
            && self
                .lock_owner
                .as_ref()
                .is_none_or(|o| job.lock_owner.as_ref() == Some(o))
    }

    fn into_entity_query(self) -> EntityQuery {
        EntityQuery::Job(self)
    }
}

/// Job definition filter.
#[derive(Debug, Clone, Default)]
pub struct JobDefinitionQuery {
    /// Restrict to these ids.
    pub ids: Option<Vec<JobDefinitionId>>,
    /// Restrict to a job type.
    pub job_type: Option<String>,
    /// Restrict to suspended or active definitions.
    pub suspended: Option<bool>,
}

impl JobDefinitionQuery {
    /// Match every definition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a set of definitions.
    pub fn ids(mut self, ids: Vec<JobDefinitionId>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Restrict to a job type.
    pub fn job_type(mut self, job_type: impl Into<String>) -> Self {
        self.job_type = Some(job_type.into());
        self
    }

    /// Restrict to suspended (`true`) or active (`false`) definitions.
    pub fn suspended(mut self, suspended: bool) -> Self {
        self.suspended = Some(suspended);
        self
    }
}

impl Query for JobDefinitionQuery {
    type Entity = JobDefinition;

    fn matches(&self, definition: &JobDefinition) -> bool {
        opt_in(&self.ids, &definition.id)
            && opt_eq(&self.job_type, &definition.job_type)
            && opt_eq(&self.suspended, &definition.suspended)
    }

    fn into_entity_query(self) -> EntityQuery {
        EntityQuery::JobDefinition(self)
    }
}

/// Batch filter.
#[derive(Debug, Clone, Default)]
pub struct BatchQuery {
    /// Restrict to one batch.
    pub batch_id: Option<BatchId>,
    /// Restrict to a batch type.
    pub batch_type: Option<String>,
    /// Restrict to suspended or active batches.
    pub suspended: Option<bool>,
    /// Restrict to completed (`true`) or running (`false`) batches.
    pub completed: Option<bool>,
    /// Restrict to a tenant.
    pub tenant_id: Option<String>,
}

impl BatchQuery {
    /// Match every batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one batch.
    pub fn batch_id(mut self, id: BatchId) -> Self {
        self.batch_id = Some(id);
        self
    }

    /// Restrict to a batch type.
    pub fn batch_type(mut self, batch_type: impl Into<String>) -> Self {
        self.batch_type = Some(batch_type.into());
        self
    }

    /// Restrict to suspended (`true`) or active (`false`) batches.
    pub fn suspended(mut self, suspended: bool) -> Self {
        self.suspended = Some(suspended);
        self
    }

    /// Restrict to completed (`true`) or running (`false`) batches.
    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }
}

impl Query for BatchQuery {
    type Entity = Batch;

    fn matches(&self, batch: &Batch) -> bool {
        opt_eq(&self.batch_id, &batch.id)
            && opt_eq(&self.batch_type, &batch.batch_type)
            && opt_eq(&self.suspended, &batch.suspended)
            && opt_eq(&self.completed, &batch.is_completed())
            && self
                .tenant_id
                .as_ref()
                .is_none_or(|t| batch.tenant_id.as_ref() == Some(t))
    }

    fn into_entity_query(self) -> EntityQuery {
        EntityQuery::Batch(self)
    }
}

/// Authorization filter.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationQuery {
    /// Restrict to these resource types.
    pub resources: Option<Vec<Resource>>,
    /// Restrict to one resource instance (exact match, `*` included).
    pub resource_id: Option<String>,
    /// Restrict to a record kind.
    pub auth_type: Option<AuthorizationType>,
    /// Restrict to records of these users.
    pub user_ids: Option<Vec<String>>,
    /// Restrict to records of these groups.
    pub group_ids: Option<Vec<String>>,
}

impl AuthorizationQuery {
    /// Match every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to these resource types.
    pub fn resources(mut self, resources: Vec<Resource>) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Restrict to one resource instance.
    pub fn resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Restrict to a record kind.
    pub fn auth_type(mut self, auth_type: AuthorizationType) -> Self {
        self.auth_type = Some(auth_type);
        self
    }

    /// Restrict to records of these users.
    pub fn user_ids(mut self, user_ids: Vec<String>) -> Self {
        self.user_ids = Some(user_ids);
        self
    }

    /// Restrict to records of these groups.
    pub fn group_ids(mut self, group_ids: Vec<String>) -> Self {
        self.group_ids = Some(group_ids);
        self
    }
}

impl Query for AuthorizationQuery {
    type Entity = Authorization;

    fn matches(&self, authorization: &Authorization) -> bool {
        opt_in(&self.resources, &authorization.resource)
            && opt_eq(&self.resource_id, &authorization.resource_id)
            && opt_eq(&self.auth_type, &authorization.auth_type)
            && self.user_ids.as_ref().is_none_or(|ids| {
                authorization
                    .user_id
                    .as_ref()
                    .is_some_and(|u| ids.contains(u))
            })
            && self.group_ids.as_ref().is_none_or(|ids| {
                authorization
                    .group_id
                    .as_ref()
                    .is_some_and(|g| ids.contains(g))
            })
    }

    fn into_entity_query(self) -> EntityQuery {
        EntityQuery::Authorization(self)
    }
}

/// Incident filter.
#[derive(Debug, Clone, Default)]
pub struct IncidentQuery {
    /// Restrict to incidents of these jobs.
    pub job_ids: Option<Vec<JobId>>,
    /// Restrict to incidents of a job definition.
    pub job_definition_id: Option<JobDefinitionId>,
    /// Restrict to an incident type.
    pub incident_type: Option<String>,
}

impl IncidentQuery {
    /// Match every incident.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to incidents of one job.
    pub fn job_id(mut self, id: JobId) -> Self {
        self.job_ids = Some(vec![id]);
        self
    }

    /// Restrict to incidents of several jobs.
    pub fn job_ids(mut self, ids: Vec<JobId>) -> Self {
        self.job_ids = Some(ids);
        self
    }

    /// Restrict to incidents of a job definition.
    pub fn job_definition_id(mut self, id: JobDefinitionId) -> Self {
        self.job_definition_id = Some(id);
        self
    }

    /// Restrict to an incident type.
    pub fn incident_type(mut self, incident_type: impl Into<String>) -> Self {
        self.incident_type = Some(incident_type.into());
        self
    }
}

impl Query for IncidentQuery {
    type Entity = Incident;

    fn matches(&self, incident: &Incident) -> bool {
        opt_in(&self.job_ids, &incident.job_id)
            && self
                .job_definition_id
                .as_ref()
                .is_none_or(|d| incident.job_definition_id.as_ref() == Some(d))
            && opt_eq(&self.incident_type, &incident.incident_type)
    }

    fn into_entity_query(self) -> EntityQuery {
        EntityQuery::Incident(self)
    }
}
