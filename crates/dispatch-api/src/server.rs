//! Axum server and routes.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use dispatch_engine::LightningDispatcher;
use dispatch_scheduler::ReassignScheduler;
use dispatch_types::{
    new_dispatch_id, AssignmentResponse, DispatchError, DispatchPingRequest,
    DispatchPingResponse, Job, JobAssignment, MarketplaceStore, RegisterTokenResponse, User,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub dispatcher: Arc<LightningDispatcher>,
    pub scheduler: Arc<ReassignScheduler>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/dispatch/ping", post(handle_dispatch_ping))
        .route("/assignments/:id/accept", post(handle_accept))
        .route("/assignments/:id/reject", post(handle_reject))
        .route("/jobs", post(handle_save_job))
        .route("/jobs/:id/reassign", post(handle_reassign))
        .route("/jobs/:id/assignments", get(handle_job_assignments))
        .route("/users", post(handle_save_user))
        .route("/contractors/:id/push-token", post(handle_register_token))
        .route(
            "/contractors/:id/assignments/pending",
            get(handle_pending_assignments),
        )
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn handle_dispatch_ping(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DispatchPingRequest>,
) -> Json<DispatchPingResponse> {
    let res = state.dispatcher.dispatch_ping(&req).await;
    if res.success {
        state.scheduler.track(&req.job_id).await;
    }
    Json(res)
}

async fn handle_accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<AssignmentResponse> {
    let res = state.dispatcher.accept_assignment(&id).await;
    if let Some(ref a) = res.assignment {
        state.scheduler.untrack(&a.job_id).await;
    }
    Json(res)
}

async fn handle_reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<AssignmentResponse> {
    Json(state.dispatcher.reject_assignment(&id).await)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReassignResponse {
    pub triggered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchPingResponse>,
}

async fn handle_reassign(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Json<ReassignResponse> {
    let dispatch_id = new_dispatch_id();
    let dispatch = match state
        .dispatcher
        .try_check_and_auto_reassign(&job_id, &dispatch_id)
        .await
    {
        Ok(dispatch) => dispatch,
        Err(DispatchError::Exhausted(_)) => {
            state.scheduler.untrack(&job_id).await;
            Some(DispatchPingResponse::empty(dispatch_id))
        }
        Err(DispatchError::Conflict) => {
            state.scheduler.untrack(&job_id).await;
            None
        }
        Err(DispatchError::JobNotFound(_)) => None,
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "reassign check failed");
            None
        }
    };
    Json(ReassignResponse {
        triggered: dispatch.is_some(),
        dispatch,
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobAssignmentsResponse {
    pub success: bool,
    pub assignments: Vec<JobAssignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn handle_job_assignments(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Json<JobAssignmentsResponse> {
    match state.dispatcher.assignments_for_job(&job_id).await {
        Ok(mut assignments) => {
            assignments.sort_by(|a, b| {
                a.dispatch_round
                    .cmp(&b.dispatch_round)
                    .then(a.created_at.cmp(&b.created_at))
            });
            Json(JobAssignmentsResponse {
                success: true,
                assignments,
                error: None,
            })
        }
        Err(e) => Json(JobAssignmentsResponse {
            success: false,
            assignments: Vec::new(),
            error: Some(e.to_string()),
        }),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SaveResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SaveResponse {
    fn from_result<E: std::fmt::Display>(r: Result<(), E>) -> Self {
        match r {
            Ok(()) => Self {
                success: true,
                error: None,
            },
            Err(e) => Self {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }
}

async fn handle_save_job(
    State(state): State<Arc<AppState>>,
    Json(job): Json<Job>,
) -> Json<SaveResponse> {
    let res = state.dispatcher.marketplace().save_job(&job).await;
    if let Err(ref e) = res {
        tracing::error!(job_id = %job.id, error = %e, "failed to save job");
    }
    Json(SaveResponse::from_result(res))
}

async fn handle_save_user(
    State(state): State<Arc<AppState>>,
    Json(user): Json<User>,
) -> Json<SaveResponse> {
    let res = state.dispatcher.marketplace().save_user(&user).await;
    if let Err(ref e) = res {
        tracing::error!(user_id = %user.id, error = %e, "failed to save user");
    }
    Json(SaveResponse::from_result(res))
}

#[derive(Debug, Deserialize)]
pub struct RegisterTokenRequest {
    pub token: String,
}

async fn handle_register_token(
    State(state): State<Arc<AppState>>,
    Path(contractor_id): Path<String>,
    Json(req): Json<RegisterTokenRequest>,
) -> Json<RegisterTokenResponse> {
    Json(
        state
            .dispatcher
            .register_push_token(&contractor_id, &req.token)
            .await,
    )
}

async fn handle_pending_assignments(
    State(state): State<Arc<AppState>>,
    Path(contractor_id): Path<String>,
) -> Json<Vec<JobAssignment>> {
    Json(state.dispatcher.get_pending_assignments(&contractor_id).await)
}

async fn handle_health() -> &'static str {
    "ok"
}
