//! Traits for storage backends, the assignment ledger, and the push gateway.

use crate::{
    AssignmentStatus, DispatchHistoryEntry, Job, JobAssignment, PushMessage, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// String-keyed JSON document store. No transactions.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, KvStoreError>;

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), KvStoreError>;

    async fn keys(&self) -> Result<Vec<String>, KvStoreError>;
}

/// Users and jobs of the marketplace, as far as dispatch needs them.
#[async_trait]
pub trait MarketplaceStore: Send + Sync {
    async fn get_users(&self) -> Result<Vec<User>, StoreError>;

    /// Insert or replace by id.
    async fn save_user(&self, user: &User) -> Result<(), StoreError>;

    async fn get_jobs(&self) -> Result<Vec<Job>, StoreError>;

    async fn get_job_by_id(&self, id: &str) -> Result<Option<Job>, StoreError>;

    /// Insert or replace by id.
    async fn save_job(&self, job: &Job) -> Result<(), StoreError>;
}

/// Outcome of a ledger status transition (accept or reject).
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The transition happened; carries the updated record.
    Applied(JobAssignment),
    NotFound,
    /// Assignment was already in the given terminal status.
    NotPending(AssignmentStatus),
    /// Response window elapsed; the assignment is now `expired`.
    Expired,
    /// A sibling was accepted first; this assignment is now `rejected`.
    Conflict,
}

impl TransitionOutcome {
    /// The updated record, or the caller-facing reason the transition did not happen.
    pub fn into_result(self) -> Result<JobAssignment, DispatchError> {
        match self {
            TransitionOutcome::Applied(a) => Ok(a),
            TransitionOutcome::NotFound => Err(DispatchError::AssignmentNotFound),
            TransitionOutcome::NotPending(status) => Err(DispatchError::InvalidState(status)),
            TransitionOutcome::Expired => Err(DispatchError::Expired),
            TransitionOutcome::Conflict => Err(DispatchError::Conflict),
        }
    }
}

/// Assignment ledger, dispatch history and push token registry.
///
/// Contract: for any job at most one assignment is `accepted`. Implementations must make
/// `accept_assignment` and `reject_assignment` single serialized check-and-write steps so
/// concurrent responses to sibling offers cannot both succeed.
#[async_trait]
pub trait DispatchStore: Send + Sync {
    async fn get_assignments(&self) -> Result<Vec<JobAssignment>, StoreError>;

    async fn get_assignment_by_id(&self, id: &str) -> Result<Option<JobAssignment>, StoreError>;

    async fn get_assignments_for_job(&self, job_id: &str) -> Result<Vec<JobAssignment>, StoreError>;

    async fn get_assignments_for_contractor(
        &self,
        contractor_id: &str,
    ) -> Result<Vec<JobAssignment>, StoreError>;

    /// Pending assignments of a contractor that have not expired at `now`.
    async fn get_pending_assignments_for_contractor(
        &self,
        contractor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobAssignment>, StoreError> {
        let all = self.get_assignments_for_contractor(contractor_id).await?;
        Ok(all.into_iter().filter(|a| a.is_live_at(now)).collect())
    }

    async fn create_bulk_assignments(&self, assignments: &[JobAssignment]) -> Result<(), StoreError>;

    /// Set status (and `responded_at` when given). Returns `None` when the id is unknown.
    async fn update_assignment_status(
        &self,
        id: &str,
        status: AssignmentStatus,
        responded_at: Option<DateTime<Utc>>,
    ) -> Result<Option<JobAssignment>, StoreError>;

    /// Record gateway ticket ids (assignment id -> push id). Unknown ids are skipped.
    async fn set_push_notification_ids(
        &self,
        push_ids: &HashMap<String, String>,
    ) -> Result<(), StoreError>;

    /// Move every pending assignment past its expiry to `expired`; returns those records.
    async fn mark_expired_assignments(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobAssignment>, StoreError>;

    async fn get_accepted_assignment_for_job(
        &self,
        job_id: &str,
    ) -> Result<Option<JobAssignment>, StoreError> {
        let all = self.get_assignments_for_job(job_id).await?;
        Ok(all
            .into_iter()
            .find(|a| a.status == AssignmentStatus::Accepted))
    }

    async fn has_accepted_assignment(&self, job_id: &str) -> Result<bool, StoreError> {
        Ok(self.get_accepted_assignment_for_job(job_id).await?.is_some())
    }

    /// Accept `id` and reject its pending siblings in one step.
    async fn accept_assignment(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, StoreError>;

    /// Reject `id` if it is still pending. Siblings are untouched.
    async fn reject_assignment(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, StoreError>;

    async fn get_dispatch_history(&self) -> Result<Vec<DispatchHistoryEntry>, StoreError>;

    async fn save_dispatch_history(&self, entry: &DispatchHistoryEntry) -> Result<(), StoreError>;

    /// Highest round recorded for the job, 0 when it was never dispatched.
    async fn get_dispatch_round_for_job(&self, job_id: &str) -> Result<u32, StoreError> {
        let history = self.get_dispatch_history().await?;
        Ok(history
            .iter()
            .filter(|h| h.job_id == job_id)
            .map(|h| h.round)
            .max()
            .unwrap_or(0))
    }

    async fn save_push_token(&self, contractor_id: &str, token: &str) -> Result<(), StoreError>;

    async fn get_push_token(&self, contractor_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get_all_push_tokens().await?.remove(contractor_id))
    }

    async fn get_all_push_tokens(&self) -> Result<HashMap<String, String>, StoreError>;
}

/// Push notification transport. Returns the gateway's notification id when it reports one.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<Option<String>, PushError>;
}

#[derive(Debug, thiserror::Error)]
pub enum KvStoreError {
    #[error("kv store error: {0}")]
    Other(String),
    #[error("kv io: {0}")]
    Io(#[from] std::io::Error),
    #[error("kv serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend: {0}")]
    Kv(#[from] KvStoreError),
    #[error("malformed document at '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push transport: {0}")]
    Transport(String),
    #[error("push gateway error {status}: {body}")]
    Gateway { status: u16, body: String },
}

/// Dispatch failure taxonomy. `Display` is the caller-facing `error` text.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Assignment not found")]
    AssignmentNotFound,
    #[error("Job not found: {0}")]
    JobNotFound(String),
    #[error("Assignment already {0}")]
    InvalidState(AssignmentStatus),
    #[error("Assignment has expired")]
    Expired,
    #[error("Job already accepted by another contractor")]
    Conflict,
    #[error("No eligible contractors remain for job {0}")]
    Exhausted(String),
    #[error("store: {0}")]
    Store(#[from] StoreError),
}
