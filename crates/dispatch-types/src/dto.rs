//! Request and response DTOs of the dispatch API, plus the push gateway payload.

use crate::{GeoPoint, Job, JobAssignment, Urgency};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request to run one dispatch round for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchPingRequest {
    pub job_id: String,
    pub job_location: GeoPoint,
    pub job_type: String,
    #[serde(default)]
    pub estimated_value: f64,
    #[serde(default)]
    pub urgency: Urgency,
}

impl DispatchPingRequest {
    /// Rebuild the request for a follow-up round from the stored job.
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            job_location: job.location(),
            job_type: job.title.clone(),
            estimated_value: job.estimated_cost.midpoint(),
            urgency: job.urgency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchPingResponse {
    pub success: bool,
    pub dispatch_id: String,
    pub contractors_notified: usize,
    pub assignments: Vec<JobAssignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_dispatch_at: Option<DateTime<Utc>>,
}

impl DispatchPingResponse {
    /// Unsuccessful round: nobody notified, no follow-up time.
    pub fn empty(dispatch_id: String) -> Self {
        Self {
            success: false,
            dispatch_id,
            contractors_notified: 0,
            assignments: Vec::new(),
            next_dispatch_at: None,
        }
    }

    /// True when the round found nobody left to notify.
    pub fn is_exhausted(&self) -> bool {
        !self.success && self.contractors_notified == 0
    }
}

/// Result of accepting or rejecting an assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment: Option<JobAssignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AssignmentResponse {
    pub fn ok(assignment: JobAssignment) -> Self {
        Self {
            success: true,
            assignment: Some(assignment),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            assignment: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterTokenResponse {
    pub success: bool,
}

/// Data block attached to a dispatch push notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushData {
    pub assignment_id: String,
    pub job_id: String,
    pub action: String,
    pub expires_at: DateTime<Utc>,
    pub countdown_seconds: i64,
}

/// Expo push message (`POST /--/api/v2/push/send`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub to: String,
    pub sound: String,
    pub title: String,
    pub body: String,
    pub data: PushData,
}

pub const DISPATCH_PING_ACTION: &str = "dispatch_ping";
