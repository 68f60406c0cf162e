//! Dispatch records (assignments, history) and the marketplace entities they refer to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a single assignment offer.
///
/// `Pending` is the only non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Expired,
    Reassigned,
}

impl AssignmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Accepted => "accepted",
            AssignmentStatus::Rejected => "rejected",
            AssignmentStatus::Expired => "expired",
            AssignmentStatus::Reassigned => "reassigned",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, AssignmentStatus::Pending)
    }
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One time-boxed offer of a job to one contractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAssignment {
    pub id: String,
    pub job_id: String,
    pub contractor_id: String,
    #[serde(default)]
    pub status: AssignmentStatus,
    pub dispatch_round: u32,
    /// Miles from the job location at dispatch time.
    pub distance_to_job: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_notification_id: Option<String>,
}

impl JobAssignment {
    pub fn is_pending(&self) -> bool {
        self.status == AssignmentStatus::Pending
    }

    /// True once `expires_at` has been reached.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Pending and still inside its response window.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && !self.is_expired_at(now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchHistoryStatus {
    #[default]
    Active,
    Completed,
    Expired,
}

/// Audit record of one dispatch round. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchHistoryEntry {
    pub id: String,
    pub job_id: String,
    pub round: u32,
    pub contractors_notified: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: DispatchHistoryStatus,
}

/// Job urgency. Unrecognized values read as `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Urgency {
    #[default]
    Normal,
    Urgent,
    Emergency,
}

impl Urgency {
    /// Response window for offers of this urgency.
    pub fn expiration_minutes(self) -> i64 {
        match self {
            Urgency::Normal => 3,
            Urgency::Urgent => 2,
            Urgency::Emergency => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Urgency::Normal => "normal",
            Urgency::Urgent => "urgent",
            Urgency::Emergency => "emergency",
        }
    }
}

impl From<&str> for Urgency {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "urgent" => Urgency::Urgent,
            "emergency" => Urgency::Emergency,
            _ => Urgency::Normal,
        }
    }
}

impl From<String> for Urgency {
    fn from(s: String) -> Self {
        Urgency::from(s.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CostRange {
    pub min: f64,
    pub max: f64,
}

impl CostRange {
    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Draft,
    #[default]
    Posted,
    Bidding,
    Assigned,
    InProgress,
    Completed,
    Disputed,
}

/// Marketplace job. Only `contractor_id`, `status` and `updated_at` are written by dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub homeowner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contractor_id: Option<String>,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub estimated_cost: CostRange,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Job location; missing coordinates read as 0.
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(
            self.address.lat.unwrap_or(0.0),
            self.address.lng.unwrap_or(0.0),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Homeowner,
    Contractor,
    Operator,
    GeneralContractor,
    Subcontractor,
    Partner,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Busy,
    #[default]
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContractorLocation {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub address: String,
}

impl ContractorLocation {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractorProfile {
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub completed_jobs: u32,
    pub location: ContractorLocation,
    #[serde(default)]
    pub availability: Availability,
    #[serde(default)]
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expo_push_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub role: UserRole,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contractor_profile: Option<ContractorProfile>,
}

/// A ranked dispatch candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractorDispatchInfo {
    pub contractor_id: String,
    pub name: String,
    pub location: ContractorLocation,
    pub distance: f64,
    pub rating: f64,
    pub completed_jobs: u32,
    pub availability: Availability,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expo_push_token: Option<String>,
}

pub fn new_assignment_id() -> String {
    format!("assign_{}", Uuid::new_v4().simple())
}

pub fn new_dispatch_id() -> String {
    format!("dispatch_{}", Uuid::new_v4().simple())
}
