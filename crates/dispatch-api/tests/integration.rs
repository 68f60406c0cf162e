//! Integration tests: seed, ping, accept/reject, reassign, push tokens, pending offers.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use dispatch_api::server::{self, AppState};
use dispatch_engine::{DispatchConfig, LightningDispatcher};
use dispatch_push::{MockPushGateway, Notifier};
use dispatch_scheduler::{ReassignScheduler, SchedulerConfig};
use dispatch_store::{InMemoryKvStore, KvDispatchStore, KvMarketplaceStore, KvStore};
use dispatch_types::{
    AssignmentStatus, DispatchStore, Job, KvStoreError, MarketplaceStore, StoreError, User,
};
use std::sync::atomic::{AtomicBool, Ordering};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

struct TestApp {
    router: axum::Router,
    state: Arc<AppState>,
    gateway: Arc<MockPushGateway>,
}

fn test_app() -> TestApp {
    let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
    test_app_with(Arc::clone(&kv), Arc::new(KvMarketplaceStore::new(kv)))
}

fn test_app_with(kv: Arc<dyn KvStore>, marketplace: Arc<dyn MarketplaceStore>) -> TestApp {
    let gateway = Arc::new(MockPushGateway::new());
    let dispatcher = Arc::new(LightningDispatcher::new(
        Arc::new(KvDispatchStore::new(kv)),
        marketplace,
        Notifier::new(gateway.clone()),
        DispatchConfig::default(),
    ));
    let scheduler = Arc::new(ReassignScheduler::new(
        Arc::clone(&dispatcher),
        SchedulerConfig {
            poll_interval: Duration::from_secs(3600),
        },
    ));
    let state = Arc::new(AppState {
        dispatcher,
        scheduler,
    });
    TestApp {
        router: server::router(Arc::clone(&state)),
        state,
        gateway,
    }
}

async fn call(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> Value {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn contractor(id: &str, lat: f64) -> Value {
    json!({
        "id": id,
        "role": "contractor",
        "name": format!("Contractor {id}"),
        "email": format!("{id}@example.com"),
        "contractorProfile": {
            "rating": 4.7,
            "completedJobs": 20,
            "location": { "lat": lat, "lng": -96.797, "address": "Dallas, TX" },
            "availability": "available",
            "verified": true,
            "expoPushToken": format!("ExponentPushToken[{id}]")
        }
    })
}

async fn seed(app: &axum::Router, contractors: usize, urgency: &str) -> Value {
    for i in 0..contractors {
        let j = call(
            app,
            "POST",
            "/users",
            Some(contractor(&format!("c{i}"), 32.78 + 0.01 * i as f64)),
        )
        .await;
        assert_eq!(j["success"], true);
    }
    let homeowner = json!({ "id": "h1", "role": "homeowner", "name": "Pat" });
    call(app, "POST", "/users", Some(homeowner)).await;
    let job = json!({
        "id": "J1",
        "title": "Plumbing",
        "status": "posted",
        "homeownerId": "h1",
        "address": { "street": "1 Elm", "city": "Dallas", "state": "TX", "zip": "75201",
                     "lat": 32.7767, "lng": -96.797 },
        "urgency": urgency,
        "estimatedCost": { "min": 2000.0, "max": 3000.0 },
        "createdAt": "2026-10-01T12:00:00Z",
        "updatedAt": "2026-10-01T12:00:00Z"
    });
    assert_eq!(call(app, "POST", "/jobs", Some(job)).await["success"], true);
    json!({
        "jobId": "J1",
        "jobLocation": { "lat": 32.7767, "lng": -96.797 },
        "jobType": "Plumbing",
        "estimatedValue": 2500.0,
        "urgency": urgency
    })
}

#[tokio::test]
async fn health() {
    let app = test_app();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let res = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn ping_notifies_nearest_and_tracks_job() {
    let app = test_app();
    let ping = seed(&app.router, 4, "emergency").await;
    let j = call(&app.router, "POST", "/dispatch/ping", Some(ping)).await;
    assert_eq!(j["success"], true);
    assert_eq!(j["contractorsNotified"], 3);
    assert!(j["dispatchId"].as_str().unwrap().starts_with("dispatch_"));
    let assignments = j["assignments"].as_array().unwrap();
    let ids: Vec<&str> = assignments
        .iter()
        .map(|a| a["contractorId"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["c0", "c1", "c2"]);
    assert_eq!(assignments[0]["status"], "pending");
    assert_eq!(assignments[0]["dispatchRound"], 1);
    assert_eq!(j["nextDispatchAt"], assignments[0]["expiresAt"]);
    assert!(app.state.scheduler.is_tracked("J1").await);

    let sent = app.gateway.sent().await;
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].data.countdown_seconds, 60);
    assert_eq!(
        sent[0].body,
        format!(
            "Plumbing job {:.1} miles away - $2,500. Accept in 1:00!",
            assignments[0]["distanceToJob"].as_f64().unwrap()
        )
    );
}

#[tokio::test]
async fn accept_assigns_job_and_closes_the_round() {
    let app = test_app();
    let ping = seed(&app.router, 3, "normal").await;
    let j = call(&app.router, "POST", "/dispatch/ping", Some(ping.clone())).await;
    let winner = j["assignments"][0]["id"].as_str().unwrap().to_string();

    let uri = format!("/assignments/{}/accept", winner);
    let res = call(&app.router, "POST", &uri, None).await;
    assert_eq!(res["success"], true);
    assert_eq!(res["assignment"]["status"], "accepted");
    assert!(res["assignment"]["respondedAt"].is_string());
    assert!(!app.state.scheduler.is_tracked("J1").await);

    let list = call(&app.router, "GET", "/jobs/J1/assignments", None).await;
    let statuses: Vec<&str> = list["assignments"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|a| a["id"] != winner.as_str())
        .map(|a| a["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["rejected", "rejected"]);

    let job = app
        .state
        .dispatcher
        .marketplace()
        .get_job_by_id("J1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.contractor_id.as_deref(), Some("c0"));

    let second = call(&app.router, "POST", &uri, None).await;
    assert_eq!(second["success"], false);
    assert_eq!(second["error"], "Assignment already accepted");

    let again = call(&app.router, "POST", "/dispatch/ping", Some(ping)).await;
    assert_eq!(again["success"], false);
    assert_eq!(again["contractorsNotified"], 0);
}

#[tokio::test]
async fn unknown_assignment_reports_not_found() {
    let app = test_app();
    let res = call(&app.router, "POST", "/assignments/assign_nope/accept", None).await;
    assert_eq!(res["success"], false);
    assert_eq!(res["error"], "Assignment not found");
    let res = call(&app.router, "POST", "/assignments/assign_nope/reject", None).await;
    assert_eq!(res["error"], "Assignment not found");
}

#[tokio::test]
async fn reassign_waits_then_runs_next_round() {
    let app = test_app();
    let ping = seed(&app.router, 5, "urgent").await;
    let first = call(&app.router, "POST", "/dispatch/ping", Some(ping)).await;

    let now = call(&app.router, "POST", "/jobs/J1/reassign", None).await;
    assert_eq!(now["triggered"], false);
    assert!(now.get("dispatch").is_none());

    for a in first["assignments"].as_array().unwrap() {
        let uri = format!("/assignments/{}/reject", a["id"].as_str().unwrap());
        let r = call(&app.router, "POST", &uri, None).await;
        assert_eq!(r["assignment"]["status"], "rejected");
    }
    let next = call(&app.router, "POST", "/jobs/J1/reassign", None).await;
    assert_eq!(next["triggered"], true);
    assert_eq!(next["dispatch"]["success"], true);
    assert_eq!(next["dispatch"]["contractorsNotified"], 2);
    assert_eq!(next["dispatch"]["assignments"][0]["dispatchRound"], 2);

    let store = app.state.dispatcher.store();
    for a in store.get_assignments_for_job("J1").await.unwrap() {
        if a.status == AssignmentStatus::Pending {
            store
                .update_assignment_status(&a.id, AssignmentStatus::Expired, None)
                .await
                .unwrap();
        }
    }
    let done = call(&app.router, "POST", "/jobs/J1/reassign", None).await;
    assert_eq!(done["triggered"], true);
    assert_eq!(done["dispatch"]["success"], false);
    assert_eq!(done["dispatch"]["contractorsNotified"], 0);
    assert!(!app.state.scheduler.is_tracked("J1").await);
}

#[tokio::test]
async fn registered_token_is_used_and_pending_list_is_scoped() {
    let app = test_app();
    let ping = seed(&app.router, 1, "normal").await;
    let r = call(
        &app.router,
        "POST",
        "/contractors/c0/push-token",
        Some(json!({ "token": "ExponentPushToken[new]" })),
    )
    .await;
    assert_eq!(r["success"], true);

    call(&app.router, "POST", "/dispatch/ping", Some(ping)).await;
    assert_eq!(app.gateway.sent().await[0].to, "ExponentPushToken[new]");

    let pending = call(&app.router, "GET", "/contractors/c0/assignments/pending", None).await;
    assert_eq!(pending.as_array().unwrap().len(), 1);
    assert_eq!(pending[0]["jobId"], "J1");
    let other = call(&app.router, "GET", "/contractors/c9/assignments/pending", None).await;
    assert!(other.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn out_of_range_contractors_are_never_pinged() {
    let app = test_app();
    let far = contractor("far", 40.7128);
    call(&app.router, "POST", "/users", Some(far)).await;
    let ping = seed(&app.router, 0, "normal").await;
    let j = call(&app.router, "POST", "/dispatch/ping", Some(ping)).await;
    assert_eq!(j["success"], false);
    assert_eq!(j["contractorsNotified"], 0);
    assert!(j.get("nextDispatchAt").is_none());
    assert!(app.gateway.sent().await.is_empty());
    assert!(!app.state.scheduler.is_tracked("J1").await);
}

/// Marketplace whose user listing fails while `down` is set.
struct FlakyMarketplace {
    inner: KvMarketplaceStore,
    down: AtomicBool,
}

#[async_trait::async_trait]
impl MarketplaceStore for FlakyMarketplace {
    async fn get_users(&self) -> Result<Vec<User>, StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Kv(KvStoreError::Other("transient".to_string())));
        }
        self.inner.get_users().await
    }
    async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        self.inner.save_user(user).await
    }
    async fn get_jobs(&self) -> Result<Vec<Job>, StoreError> {
        self.inner.get_jobs().await
    }
    async fn get_job_by_id(&self, id: &str) -> Result<Option<Job>, StoreError> {
        self.inner.get_job_by_id(id).await
    }
    async fn save_job(&self, job: &Job) -> Result<(), StoreError> {
        self.inner.save_job(job).await
    }
}

#[tokio::test]
async fn reassign_store_failure_keeps_job_tracked() {
    let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
    let flaky = Arc::new(FlakyMarketplace {
        inner: KvMarketplaceStore::new(Arc::clone(&kv)),
        down: AtomicBool::new(false),
    });
    let app = test_app_with(kv, flaky.clone());
    let ping = seed(&app.router, 2, "normal").await;
    let first = call(&app.router, "POST", "/dispatch/ping", Some(ping)).await;
    assert_eq!(first["success"], true);
    for a in first["assignments"].as_array().unwrap() {
        let uri = format!("/assignments/{}/reject", a["id"].as_str().unwrap());
        call(&app.router, "POST", &uri, None).await;
    }

    flaky.down.store(true, Ordering::SeqCst);
    let res = call(&app.router, "POST", "/jobs/J1/reassign", None).await;
    assert_eq!(res["triggered"], false);
    assert!(res.get("dispatch").is_none());
    assert!(app.state.scheduler.is_tracked("J1").await);
}
