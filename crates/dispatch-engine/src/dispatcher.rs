//! LightningDispatcher: one dispatch round per ping, offer responses, and auto-reassign.

use crate::DispatchConfig;
use chrono::{Duration, Utc};
use dispatch_geo::find_nearest_available_contractors;
use dispatch_push::Notifier;
use dispatch_types::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Orchestrates dispatch rounds over a ledger, the marketplace store and a push notifier.
///
/// Public operations never fail: errors become `success: false` results (or `None`) and are
/// logged. The `try_*` variants expose the underlying `DispatchError`.
///
/// Opening a round (and deciding whether to open one) is serialized per job, across clones.
#[derive(Clone)]
pub struct LightningDispatcher {
    store: Arc<dyn DispatchStore>,
    marketplace: Arc<dyn MarketplaceStore>,
    notifier: Notifier,
    config: DispatchConfig,
    round_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl LightningDispatcher {
    pub fn new(
        store: Arc<dyn DispatchStore>,
        marketplace: Arc<dyn MarketplaceStore>,
        notifier: Notifier,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            marketplace,
            notifier,
            config,
            round_locks: Arc::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn DispatchStore> {
        &self.store
    }

    pub fn marketplace(&self) -> &Arc<dyn MarketplaceStore> {
        &self.marketplace
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    async fn lock_job(&self, job_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.round_locks.lock().await;
            Arc::clone(locks.entry(job_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Run the next dispatch round for a job.
    pub async fn dispatch_ping(&self, request: &DispatchPingRequest) -> DispatchPingResponse {
        let dispatch_id = new_dispatch_id();
        let result = self.try_dispatch_ping(request, &dispatch_id).await;
        Self::ping_envelope(&request.job_id, dispatch_id, result)
    }

    fn ping_envelope(
        job_id: &str,
        dispatch_id: String,
        result: Result<DispatchPingResponse, DispatchError>,
    ) -> DispatchPingResponse {
        match result {
            Ok(res) => res,
            Err(DispatchError::Conflict) => {
                tracing::debug!(job_id, "job already accepted, not dispatching");
                DispatchPingResponse::empty(dispatch_id)
            }
            Err(DispatchError::Exhausted(_)) => {
                tracing::info!(job_id, "no eligible contractors left");
                DispatchPingResponse::empty(dispatch_id)
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "dispatch ping failed");
                DispatchPingResponse::empty(dispatch_id)
            }
        }
    }

    /// Like [`dispatch_ping`](Self::dispatch_ping) but reports why a round did not start:
    /// `Conflict` when the job is already accepted, `Exhausted` when nobody is left to ask.
    pub async fn try_dispatch_ping(
        &self,
        request: &DispatchPingRequest,
        dispatch_id: &str,
    ) -> Result<DispatchPingResponse, DispatchError> {
        let _round = self.lock_job(&request.job_id).await;
        self.open_round(request, dispatch_id).await
    }

    /// Caller holds the job's round lock.
    async fn open_round(
        &self,
        request: &DispatchPingRequest,
        dispatch_id: &str,
    ) -> Result<DispatchPingResponse, DispatchError> {
        let job_id = request.job_id.as_str();
        if self.store.has_accepted_assignment(job_id).await? {
            return Err(DispatchError::Conflict);
        }

        let round = self.store.get_dispatch_round_for_job(job_id).await? + 1;
        let exclude: HashSet<String> = self
            .store
            .get_assignments_for_job(job_id)
            .await?
            .into_iter()
            .map(|a| a.contractor_id)
            .collect();
        let users = self.marketplace.get_users().await?;
        let tokens = self.store.get_all_push_tokens().await?;
        let nearest = find_nearest_available_contractors(
            request.job_location,
            &users,
            &tokens,
            self.config.contractors_per_round,
            &exclude,
            self.config.max_distance_miles,
        );
        if nearest.is_empty() {
            return Err(DispatchError::Exhausted(job_id.to_string()));
        }

        let now = Utc::now();
        let expires_at = now + Duration::minutes(request.urgency.expiration_minutes());
        let mut assignments: Vec<JobAssignment> = nearest
            .iter()
            .map(|contractor| JobAssignment {
                id: new_assignment_id(),
                job_id: job_id.to_string(),
                contractor_id: contractor.contractor_id.clone(),
                status: AssignmentStatus::Pending,
                dispatch_round: round,
                distance_to_job: contractor.distance,
                created_at: now,
                expires_at,
                responded_at: None,
                push_notification_id: None,
            })
            .collect();

        self.store.create_bulk_assignments(&assignments).await?;
        self.store
            .save_dispatch_history(&DispatchHistoryEntry {
                id: dispatch_id.to_string(),
                job_id: job_id.to_string(),
                round,
                contractors_notified: nearest.iter().map(|c| c.contractor_id.clone()).collect(),
                created_at: now,
                status: DispatchHistoryStatus::Active,
            })
            .await?;

        // Offers are persisted before anyone is pinged.
        let mut push_ids = HashMap::new();
        for (contractor, assignment) in nearest.iter().zip(assignments.iter_mut()) {
            if let Some(push_id) = self.notifier.notify(contractor, assignment, request).await {
                push_ids.insert(assignment.id.clone(), push_id.clone());
                assignment.push_notification_id = Some(push_id);
            }
        }
        if !push_ids.is_empty() {
            if let Err(e) = self.store.set_push_notification_ids(&push_ids).await {
                tracing::warn!(job_id, error = %e, "failed to record push notification ids");
            }
        }

        tracing::info!(
            job_id,
            dispatch_id,
            round,
            notified = assignments.len(),
            urgency = request.urgency.as_str(),
            "dispatch round started"
        );
        Ok(DispatchPingResponse {
            success: true,
            dispatch_id: dispatch_id.to_string(),
            contractors_notified: assignments.len(),
            assignments,
            next_dispatch_at: Some(expires_at),
        })
    }

    /// Accept an offer; the job is assigned to its contractor.
    pub async fn accept_assignment(&self, assignment_id: &str) -> AssignmentResponse {
        match self.try_accept_assignment(assignment_id).await {
            Ok(a) => AssignmentResponse::ok(a),
            Err(DispatchError::Store(e)) => {
                tracing::error!(assignment_id, error = %e, "accept assignment failed");
                AssignmentResponse::failed("Failed to accept assignment")
            }
            Err(e) => AssignmentResponse::failed(e.to_string()),
        }
    }

    /// Once the ledger has recorded the acceptance the call succeeds; a failure to update the
    /// job record afterwards is logged, not returned.
    pub async fn try_accept_assignment(
        &self,
        assignment_id: &str,
    ) -> Result<JobAssignment, DispatchError> {
        let now = Utc::now();
        let accepted = self
            .store
            .accept_assignment(assignment_id, now)
            .await?
            .into_result()?;

        if let Err(e) = self.assign_job(&accepted, now).await {
            tracing::error!(
                job_id = %accepted.job_id,
                assignment_id,
                error = %e,
                "assignment accepted but job record not updated"
            );
        }
        tracing::info!(
            job_id = %accepted.job_id,
            assignment_id,
            contractor_id = %accepted.contractor_id,
            round = accepted.dispatch_round,
            "assignment accepted"
        );
        Ok(accepted)
    }

    async fn assign_job(
        &self,
        accepted: &JobAssignment,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match self.marketplace.get_job_by_id(&accepted.job_id).await? {
            Some(mut job) => {
                job.contractor_id = Some(accepted.contractor_id.clone());
                job.status = JobStatus::Assigned;
                job.updated_at = now;
                self.marketplace.save_job(&job).await
            }
            None => {
                tracing::warn!(job_id = %accepted.job_id, "accepted assignment for unknown job");
                Ok(())
            }
        }
    }

    /// Decline an offer. Other offers of the round stay live.
    pub async fn reject_assignment(&self, assignment_id: &str) -> AssignmentResponse {
        match self.try_reject_assignment(assignment_id).await {
            Ok(a) => AssignmentResponse::ok(a),
            Err(DispatchError::Store(e)) => {
                tracing::error!(assignment_id, error = %e, "reject assignment failed");
                AssignmentResponse::failed("Failed to reject assignment")
            }
            Err(e) => AssignmentResponse::failed(e.to_string()),
        }
    }

    pub async fn try_reject_assignment(
        &self,
        assignment_id: &str,
    ) -> Result<JobAssignment, DispatchError> {
        let rejected = self
            .store
            .reject_assignment(assignment_id, Utc::now())
            .await?
            .into_result()?;
        tracing::info!(job_id = %rejected.job_id, assignment_id, "assignment rejected");
        Ok(rejected)
    }

    /// Start the next round once every offer of the current one has lapsed or been declined.
    ///
    /// Returns `None` when nothing was dispatched: the job is accepted, an offer is still
    /// live, the job is unknown, or a store error occurred. An exhausted pool yields an
    /// unsuccessful response.
    pub async fn check_and_auto_reassign(&self, job_id: &str) -> Option<DispatchPingResponse> {
        let dispatch_id = new_dispatch_id();
        match self.try_check_and_auto_reassign(job_id, &dispatch_id).await {
            Ok(res) => res,
            Err(e @ (DispatchError::Exhausted(_) | DispatchError::Conflict)) => {
                Some(Self::ping_envelope(job_id, dispatch_id, Err(e)))
            }
            Err(DispatchError::JobNotFound(_)) => {
                tracing::debug!(job_id, "auto-reassign skipped, job not found");
                None
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "auto-reassign check failed");
                None
            }
        }
    }

    /// `Ok(None)` while the job is accepted or an offer is live. `JobNotFound` when the job
    /// record is gone; otherwise the errors of [`try_dispatch_ping`](Self::try_dispatch_ping).
    pub async fn try_check_and_auto_reassign(
        &self,
        job_id: &str,
        dispatch_id: &str,
    ) -> Result<Option<DispatchPingResponse>, DispatchError> {
        let _round = self.lock_job(job_id).await;
        if self.store.has_accepted_assignment(job_id).await? {
            return Ok(None);
        }
        self.store.mark_expired_assignments(Utc::now()).await?;

        let assignments = self.store.get_assignments_for_job(job_id).await?;
        if assignments.iter().any(JobAssignment::is_pending) {
            return Ok(None);
        }

        let Some(job) = self.marketplace.get_job_by_id(job_id).await? else {
            return Err(DispatchError::JobNotFound(job_id.to_string()));
        };
        let request = DispatchPingRequest::from_job(&job);
        tracing::info!(job_id, "round lapsed, dispatching next round");
        self.open_round(&request, dispatch_id).await.map(Some)
    }

    pub async fn register_push_token(
        &self,
        contractor_id: &str,
        token: &str,
    ) -> RegisterTokenResponse {
        match self.store.save_push_token(contractor_id, token).await {
            Ok(()) => RegisterTokenResponse { success: true },
            Err(e) => {
                tracing::error!(contractor_id, error = %e, "failed to register push token");
                RegisterTokenResponse { success: false }
            }
        }
    }

    /// Live offers for a contractor.
    pub async fn get_pending_assignments(&self, contractor_id: &str) -> Vec<JobAssignment> {
        match self
            .store
            .get_pending_assignments_for_contractor(contractor_id, Utc::now())
            .await
        {
            Ok(list) => list,
            Err(e) => {
                tracing::error!(contractor_id, error = %e, "failed to load pending assignments");
                Vec::new()
            }
        }
    }

    pub async fn has_accepted_assignment(&self, job_id: &str) -> Result<bool, DispatchError> {
        Ok(self.store.has_accepted_assignment(job_id).await?)
    }

    pub async fn assignments_for_job(&self, job_id: &str) -> Result<Vec<JobAssignment>, DispatchError> {
        Ok(self.store.get_assignments_for_job(job_id).await?)
    }
}
