//! Assignment ledger, dispatch history and push tokens over a key/value store.

use crate::document::{load, save};
use crate::keys;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_types::{
    AssignmentStatus, DispatchHistoryEntry, DispatchStore, JobAssignment, KvStore, StoreError,
    TransitionOutcome,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// `DispatchStore` backed by three JSON documents.
///
/// Every read-modify-write of a document runs under `write_lock`, so accept and reject are
/// atomic with respect to all other writers sharing this instance.
pub struct KvDispatchStore {
    kv: Arc<dyn KvStore>,
    write_lock: Mutex<()>,
}

impl KvDispatchStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    async fn save_assignments(&self, assignments: &[JobAssignment]) -> Result<(), StoreError> {
        save(self.kv.as_ref(), keys::JOB_ASSIGNMENTS, assignments).await
    }
}

#[async_trait]
impl DispatchStore for KvDispatchStore {
    async fn get_assignments(&self) -> Result<Vec<JobAssignment>, StoreError> {
        load(self.kv.as_ref(), keys::JOB_ASSIGNMENTS).await
    }

    async fn get_assignment_by_id(&self, id: &str) -> Result<Option<JobAssignment>, StoreError> {
        Ok(self.get_assignments().await?.into_iter().find(|a| a.id == id))
    }

    async fn get_assignments_for_job(&self, job_id: &str) -> Result<Vec<JobAssignment>, StoreError> {
        let all = self.get_assignments().await?;
        Ok(all.into_iter().filter(|a| a.job_id == job_id).collect())
    }

    async fn get_assignments_for_contractor(
        &self,
        contractor_id: &str,
    ) -> Result<Vec<JobAssignment>, StoreError> {
        let all = self.get_assignments().await?;
        Ok(all
            .into_iter()
            .filter(|a| a.contractor_id == contractor_id)
            .collect())
    }

    async fn create_bulk_assignments(&self, assignments: &[JobAssignment]) -> Result<(), StoreError> {
        if assignments.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        let mut all = self.get_assignments().await?;
        all.extend_from_slice(assignments);
        self.save_assignments(&all).await
    }

    async fn update_assignment_status(
        &self,
        id: &str,
        status: AssignmentStatus,
        responded_at: Option<DateTime<Utc>>,
    ) -> Result<Option<JobAssignment>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.get_assignments().await?;
        let Some(assignment) = all.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };
        assignment.status = status;
        if responded_at.is_some() {
            assignment.responded_at = responded_at;
        }
        let updated = assignment.clone();
        self.save_assignments(&all).await?;
        Ok(Some(updated))
    }

    async fn set_push_notification_ids(
        &self,
        push_ids: &HashMap<String, String>,
    ) -> Result<(), StoreError> {
        if push_ids.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        let mut all = self.get_assignments().await?;
        let mut changed = false;
        for a in all.iter_mut() {
            if let Some(push_id) = push_ids.get(&a.id) {
                a.push_notification_id = Some(push_id.clone());
                changed = true;
            }
        }
        if changed {
            self.save_assignments(&all).await?;
        }
        Ok(())
    }

    async fn mark_expired_assignments(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobAssignment>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.get_assignments().await?;
        let mut expired = Vec::new();
        for a in all.iter_mut() {
            if a.is_pending() && a.is_expired_at(now) {
                a.status = AssignmentStatus::Expired;
                expired.push(a.clone());
            }
        }
        if !expired.is_empty() {
            self.save_assignments(&all).await?;
            tracing::debug!(count = expired.len(), "marked assignments expired");
        }
        Ok(expired)
    }

    async fn accept_assignment(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.get_assignments().await?;
        let Some(idx) = all.iter().position(|a| a.id == id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        let target = &all[idx];
        if target.status.is_terminal() {
            return Ok(TransitionOutcome::NotPending(target.status));
        }
        if target.is_expired_at(now) {
            all[idx].status = AssignmentStatus::Expired;
            self.save_assignments(&all).await?;
            return Ok(TransitionOutcome::Expired);
        }
        let job_id = target.job_id.clone();
        let sibling_accepted = all
            .iter()
            .any(|a| a.job_id == job_id && a.status == AssignmentStatus::Accepted);
        if sibling_accepted {
            all[idx].status = AssignmentStatus::Rejected;
            self.save_assignments(&all).await?;
            return Ok(TransitionOutcome::Conflict);
        }

        for (i, a) in all.iter_mut().enumerate() {
            if i == idx {
                a.status = AssignmentStatus::Accepted;
                a.responded_at = Some(now);
            } else if a.job_id == job_id && a.is_pending() {
                a.status = AssignmentStatus::Rejected;
            }
        }
        let accepted = all[idx].clone();
        self.save_assignments(&all).await?;
        Ok(TransitionOutcome::Applied(accepted))
    }

    async fn reject_assignment(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.get_assignments().await?;
        let Some(target) = all.iter_mut().find(|a| a.id == id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        if target.status.is_terminal() {
            return Ok(TransitionOutcome::NotPending(target.status));
        }
        target.status = AssignmentStatus::Rejected;
        target.responded_at = Some(now);
        let rejected = target.clone();
        self.save_assignments(&all).await?;
        Ok(TransitionOutcome::Applied(rejected))
    }

    async fn get_dispatch_history(&self) -> Result<Vec<DispatchHistoryEntry>, StoreError> {
        load(self.kv.as_ref(), keys::DISPATCH_HISTORY).await
    }

    async fn save_dispatch_history(&self, entry: &DispatchHistoryEntry) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut history = self.get_dispatch_history().await?;
        history.push(entry.clone());
        save(self.kv.as_ref(), keys::DISPATCH_HISTORY, &history).await
    }

    async fn save_push_token(&self, contractor_id: &str, token: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut tokens = self.get_all_push_tokens().await?;
        tokens.insert(contractor_id.to_string(), token.to_string());
        save(self.kv.as_ref(), keys::CONTRACTOR_PUSH_TOKENS, &tokens).await
    }

    async fn get_all_push_tokens(&self) -> Result<HashMap<String, String>, StoreError> {
        load(self.kv.as_ref(), keys::CONTRACTOR_PUSH_TOKENS).await
    }
}
