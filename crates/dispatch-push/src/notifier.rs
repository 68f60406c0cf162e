//! Best-effort delivery of dispatch offers.

use dispatch_types::{
    ContractorDispatchInfo, DispatchPingRequest, JobAssignment, PushData, PushGateway, PushMessage,
    DISPATCH_PING_ACTION,
};
use std::sync::Arc;

pub const ALERT_TITLE: &str = "⚡ New Job Alert!";

/// Sends one push per assignment. Failures are logged and never surface to the caller.
#[derive(Clone)]
pub struct Notifier {
    gateway: Arc<dyn PushGateway>,
}

impl Notifier {
    pub fn new(gateway: Arc<dyn PushGateway>) -> Self {
        Self { gateway }
    }

    /// Push message offering `assignment` to the holder of `token`.
    pub fn build_message(
        token: &str,
        assignment: &JobAssignment,
        request: &DispatchPingRequest,
    ) -> PushMessage {
        let minutes = request.urgency.expiration_minutes();
        PushMessage {
            to: token.to_string(),
            sound: "default".to_string(),
            title: ALERT_TITLE.to_string(),
            body: format!(
                "{} job {:.1} miles away - ${}. Accept in {}:00!",
                request.job_type,
                assignment.distance_to_job,
                format_amount(request.estimated_value),
                minutes
            ),
            data: PushData {
                assignment_id: assignment.id.clone(),
                job_id: assignment.job_id.clone(),
                action: DISPATCH_PING_ACTION.to_string(),
                expires_at: assignment.expires_at,
                countdown_seconds: minutes * 60,
            },
        }
    }

    /// Notify the contractor of a new offer. Returns the gateway's notification id, or `None`
    /// when the contractor has no token or delivery failed.
    pub async fn notify(
        &self,
        contractor: &ContractorDispatchInfo,
        assignment: &JobAssignment,
        request: &DispatchPingRequest,
    ) -> Option<String> {
        let token = contractor.expo_push_token.as_deref()?;
        let message = Self::build_message(token, assignment, request);
        match self.gateway.send(&message).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(
                    assignment_id = %assignment.id,
                    contractor_id = %contractor.contractor_id,
                    error = %e,
                    "push notification failed"
                );
                None
            }
        }
    }
}

/// Dollar amount with thousands separators and at most two decimals (`2500.5` -> `2,500.5`).
/// Expects a finite amount. NaN renders as `0` and infinities saturate.
pub fn format_amount(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let frac = cents % 100;
    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    match frac {
        0 => format!("{sign}{grouped}"),
        f if f % 10 == 0 => format!("{sign}{grouped}.{}", f / 10),
        f => format!("{sign}{grouped}.{f:02}"),
    }
}
