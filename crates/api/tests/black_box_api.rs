use std::sync::Arc;

use bloodline_api::app::{self, services::AppServices};
use bloodline_auth::{JwtClaims, Role};
use bloodline_core::UserId;
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory store, ephemeral port.
        let services = Arc::new(AppServices::in_memory(10));
        let app = app::build_app(JWT_SECRET.to_string(), services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn put(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// Register a bank; returns its id and its records keyed by blood group.
    async fn register_bank(&self, staff: &str, name: &str) -> (String, Value) {
        let res = self
            .post(staff, "/banks", json!({ "name": name, "city": "Lahore" }))
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = res.json().await.unwrap();
        (body["bank"]["id"].as_str().unwrap().to_string(), body)
    }

    async fn record_id(&self, staff: &str, bank_id: &str, group: &str) -> String {
        let records: Value = self.get(staff, "/inventory").await.json().await.unwrap();
        records
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["blood_bank_id"] == bank_id && r["blood_group"] == group)
            .map(|r| r["id"].as_str().unwrap().to_string())
            .expect("record not found")
    }

    async fn submit(&self, token: &str, group: &str, units: i64) -> reqwest::Response {
        self.post(
            token,
            "/requests",
            json!({
                "blood_group": group,
                "units": units,
                "city": "Lahore",
                "hospital_name": "General",
            }),
        )
        .await
    }

    async fn submit_ok(&self, token: &str, group: &str, units: i64) -> String {
        let res = self.submit(token, group, units).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = res.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }

    async fn group_total(&self, token: &str, group: &str) -> u64 {
        let summary: Value = self
            .get(token, "/inventory/summary")
            .await
            .json()
            .await
            .unwrap();
        summary["by_group"][group].as_u64().unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(sub: UserId, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub,
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn staff_token() -> String {
    mint_jwt(UserId::new(), vec![Role::ADMIN])
}

fn donor() -> (UserId, String) {
    let id = UserId::new();
    (id, mint_jwt(id, vec![Role::DONOR]))
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv.get("not-a-jwt", "/whoami").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let now = Utc::now();
    let expired = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &JwtClaims {
            sub: UserId::new(),
            roles: vec![Role::ADMIN],
            issued_at: now - ChronoDuration::hours(2),
            expires_at: now - ChronoDuration::hours(1),
        },
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    let res = srv.get(&expired, "/whoami").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn identity_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let (user, token) = donor();

    let res = srv.get(&token, "/whoami").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user_id"].as_str().unwrap(), user.to_string());
    assert_eq!(body["is_staff"], false);
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "donor"));
}

#[tokio::test]
async fn staff_only_endpoints_reject_donors() {
    let srv = TestServer::spawn().await;
    let (_, token) = donor();

    let res = srv.post(&token, "/banks", json!({ "name": "North" })).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");

    assert_eq!(srv.get(&token, "/inventory").await.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        srv.get(&token, "/requests/pending/count").await.status(),
        StatusCode::FORBIDDEN
    );

    let request_id = srv.submit_ok(&token, "A+", 1).await;
    let res = srv
        .post(&token, &format!("/requests/{request_id}/approve"), json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn registering_a_bank_provisions_every_group() {
    let srv = TestServer::spawn().await;
    let staff = staff_token();

    let (bank_id, body) = srv.register_bank(&staff, "Central").await;
    let records = body["records"].as_array().unwrap();
    assert_eq!(records.len(), 8);
    assert!(records.iter().all(|r| r["units"] == 10 && r["created"] == true));

    // Explicit re-provisioning is idempotent.
    let res = srv
        .post(
            &staff,
            &format!("/banks/{bank_id}/provision"),
            json!({ "blood_groups": ["A+", "O-"] }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    let records = body["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r["created"] == false));

    let all: Value = srv.get(&staff, "/inventory").await.json().await.unwrap();
    assert_eq!(all.as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn provisioning_validates_input() {
    let srv = TestServer::spawn().await;
    let staff = staff_token();

    let res = srv
        .post(&staff, &format!("/banks/{}/provision", UserId::new()), json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = srv.post(&staff, "/banks/not-an-id/provision", json!({})).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let (bank_id, _) = srv.register_bank(&staff, "Central").await;
    let res = srv
        .post(
            &staff,
            &format!("/banks/{bank_id}/provision"),
            json!({ "blood_groups": ["C+"] }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv.post(&staff, "/banks", json!({ "name": "   " })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn provisioning_rejects_malformed_bodies_but_accepts_none() {
    let srv = TestServer::spawn().await;
    let staff = staff_token();
    let (bank_id, _) = srv.register_bank(&staff, "Central").await;
    let path = format!("/banks/{bank_id}/provision");

    let res = srv
        .post(&staff, &path, json!({ "blood_groups": ["A+"], "default_units": -5 }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");

    let res = srv
        .client
        .post(srv.url(&path))
        .bearer_auth(&staff)
        .header("content-type", "application/json")
        .body("{\"blood_groups\": [")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // No body falls back to every group at the configured default.
    let res = srv
        .client
        .post(srv.url(&path))
        .bearer_auth(&staff)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["records"].as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn approval_lifecycle_decrements_stock_and_records_history() {
    let srv = TestServer::spawn().await;
    let staff = staff_token();
    let (donor_id, donor_token) = donor();
    srv.register_bank(&staff, "Central").await;

    let request_id = srv.submit_ok(&donor_token, "O-", 3).await;

    let res = srv.get(&staff, "/requests/pending/count").await;
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["pending"], 1);

    let res = srv
        .post(&staff, &format!("/requests/{request_id}/approve"), json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let entry: Value = res.json().await.unwrap();
    assert_eq!(entry["units"], 3);
    assert_eq!(entry["donor"].as_str().unwrap(), donor_id.to_string());
    assert_eq!(entry["request_id"].as_str().unwrap(), request_id);

    assert_eq!(srv.group_total(&staff, "O-").await, 7);

    // Approving twice is refused and changes nothing.
    let res = srv
        .post(&staff, &format!("/requests/{request_id}/approve"), json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "already_processed");
    assert_eq!(srv.group_total(&staff, "O-").await, 7);

    let mine: Value = srv.get(&donor_token, "/history").await.json().await.unwrap();
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let res = srv
        .get(&donor_token, &format!("/donors/{donor_id}/history"))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let (_, other_token) = donor();
    let res = srv
        .get(&other_token, &format!("/donors/{donor_id}/history"))
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let theirs: Value = srv.get(&other_token, "/history").await.json().await.unwrap();
    assert!(theirs.as_array().unwrap().is_empty());

    let requests: Value = srv.get(&donor_token, "/requests").await.json().await.unwrap();
    assert_eq!(requests[0]["status"], "approved");
}

#[tokio::test]
async fn refused_approvals_map_to_client_errors() {
    let srv = TestServer::spawn().await;
    let staff = staff_token();
    let (_, donor_token) = donor();

    // No bank holds any stock yet.
    let request_id = srv.submit_ok(&donor_token, "B+", 1).await;
    let res = srv
        .post(&staff, &format!("/requests/{request_id}/approve"), json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "no_inventory");

    srv.register_bank(&staff, "Central").await;
    let request_id = srv.submit_ok(&donor_token, "B+", 11).await;
    let res = srv
        .post(&staff, &format!("/requests/{request_id}/approve"), json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(srv.group_total(&staff, "B+").await, 10);

    let res = srv
        .post(
            &staff,
            &format!("/requests/{}/approve", UserId::new()),
            json!({}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn submission_validates_units_and_blood_group() {
    let srv = TestServer::spawn().await;
    let (_, token) = donor();

    let res = srv.submit(&token, "A+", 0).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_units");

    let res = srv.submit(&token, "Z+", 1).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn rejected_request_cannot_be_approved() {
    let srv = TestServer::spawn().await;
    let staff = staff_token();
    let (_, donor_token) = donor();
    srv.register_bank(&staff, "Central").await;

    let request_id = srv.submit_ok(&donor_token, "AB-", 2).await;
    let res = srv
        .post(&staff, &format!("/requests/{request_id}/reject"), json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "rejected");

    let res = srv
        .post(&staff, &format!("/requests/{request_id}/approve"), json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let res = srv
        .post(&staff, &format!("/requests/{request_id}/reject"), json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(srv.group_total(&staff, "AB-").await, 10);
}

#[tokio::test]
async fn stock_corrections_are_validated() {
    let srv = TestServer::spawn().await;
    let staff = staff_token();
    let (bank_id, _) = srv.register_bank(&staff, "Central").await;
    let record_id = srv.record_id(&staff, &bank_id, "A-").await;

    let res = srv
        .put(&staff, &format!("/inventory/{record_id}"), json!({ "units": 42 }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["units"], 42);

    let res = srv
        .put(&staff, &format!("/inventory/{record_id}"), json!({ "units": -1 }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv
        .put(
            &staff,
            &format!("/inventory/{}", UserId::new()),
            json!({ "units": 1 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(srv.group_total(&staff, "A-").await, 42);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_never_over_allocate() {
    let srv = Arc::new(TestServer::spawn().await);
    let staff = staff_token();
    let (_, donor_token) = donor();
    let (bank_id, _) = srv.register_bank(&staff, "Central").await;
    let record_id = srv.record_id(&staff, &bank_id, "O-").await;
    srv.put(&staff, &format!("/inventory/{record_id}"), json!({ "units": 5 }))
        .await;

    let r1 = srv.submit_ok(&donor_token, "O-", 3).await;
    let r2 = srv.submit_ok(&donor_token, "O-", 4).await;

    let approve = |id: String| {
        let srv = srv.clone();
        let staff = staff.clone();
        tokio::spawn(async move {
            srv.post(&staff, &format!("/requests/{id}/approve"), json!({}))
                .await
                .status()
        })
    };
    let (s1, s2) = tokio::join!(approve(r1), approve(r2));
    let (s1, s2) = (s1.unwrap(), s2.unwrap());

    let wins = [s1, s2].iter().filter(|s| **s == StatusCode::OK).count();
    assert_eq!(wins, 1, "statuses: {s1} {s2}");
    assert!([s1, s2].contains(&StatusCode::UNPROCESSABLE_ENTITY));

    let remaining = srv.group_total(&staff, "O-").await;
    if s1 == StatusCode::OK {
        assert_eq!(remaining, 2);
    } else {
        assert_eq!(remaining, 1);
    }

    let history: Value = srv.get(&staff, "/history").await.json().await.unwrap();
    assert_eq!(history.as_array().unwrap().len(), 1);
}
