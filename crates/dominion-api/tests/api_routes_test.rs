//! HTTP routes against in-memory stores and a mock Strava server.
//!
//! Each test spawns the router on an ephemeral port and drives it with
//! reqwest; Strava endpoints are served by wiremock.

use std::sync::Arc;

use dominion_api::{router, AppState};
use dominion_core::memory::InMemoryStore;
use dominion_core::{Credential, CredentialRepository, H3Indexer};
use dominion_engine::{ImportOptions, ImportOrchestrator, InfluenceAggregator};
use dominion_strava::{StravaClient, StravaConfig, StravaTokenProvider};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VERIFY_TOKEN: &str = "dominion-verify";
const ATHLETE: i64 = 134815;
// Three distinct, well separated samples
const THREE_POINTS: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";
// Four samples at the same point
const LOITER: &str = "_p~iF~ps|U??????";

struct TestServer {
    base_url: String,
    store: InMemoryStore,
    strava: MockServer,
    client: reqwest::Client,
}

async fn spawn_test_server() -> TestServer {
    let strava = MockServer::start().await;
    let store = InMemoryStore::new();

    let shared = Arc::new(store.clone());
    let aggregator = InfluenceAggregator::new(
        shared.clone(),
        shared.clone(),
        shared,
        Arc::new(H3Indexer::default()),
    );
    let config = StravaConfig::default()
        .with_base_url(&strava.uri())
        .with_client("client", "secret");
    let feed = StravaClient::new(config.clone()).unwrap();
    let tokens = StravaTokenProvider::new(config, store.clone()).unwrap();
    let orchestrator = ImportOrchestrator::new(aggregator, Arc::new(feed), Arc::new(tokens));

    let state = AppState::new(
        orchestrator,
        ImportOptions::default().with_page_size(2),
        VERIFY_TOKEN,
    );
    let app = router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        store,
        strava,
        client: reqwest::Client::new(),
    }
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn connect(&self, user: Uuid) {
        self.store
            .upsert(&Credential {
                user_id: user,
                athlete_id: Some(ATHLETE),
                access_token: "access".into(),
                refresh_token: "refresh".into(),
                expires_at: chrono::Utc::now().timestamp() + 3600,
            })
            .await
            .unwrap();
    }

    async fn mount_page(&self, page: u32, body: Value) {
        Mock::given(method("GET"))
            .and(path("/athlete/activities"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.strava)
            .await;
    }
}

#[tokio::test]
async fn test_health() {
    let server = spawn_test_server().await;
    let resp = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_manual_activity_then_stats_and_territories() {
    let server = spawn_test_server().await;
    let user = Uuid::new_v4();

    let resp = server
        .client
        .post(server.url(&format!("/users/{}/activities", user)))
        .json(&json!({ "polyline": LOITER }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["outcome"]["status"], "imported");
    assert_eq!(body["outcome"]["cells_affected"], 1);
    assert_eq!(body["cells"][0]["influence"], 4.0);

    let stats: Value = server
        .client
        .get(server.url(&format!("/users/{}/stats", user)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["cells"], 1);
    assert_eq!(stats["total_influence"], 4.0);

    let territories: Vec<Value> = server
        .client
        .get(server.url("/territories"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(territories.len(), 1);
    assert_eq!(territories[0]["user_id"], user.to_string());
}

#[tokio::test]
async fn test_manual_activity_without_geodata_is_skipped() {
    let server = spawn_test_server().await;
    let resp = server
        .client
        .post(server.url(&format!("/users/{}/activities", Uuid::new_v4())))
        .json(&json!({ "polyline": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["outcome"]["reason"], "no-geodata");
}

#[tokio::test]
async fn test_malformed_polyline_is_bad_request() {
    let server = spawn_test_server().await;
    let resp = server
        .client
        .post(server.url(&format!("/users/{}/activities", Uuid::new_v4())))
        .json(&json!({ "polyline": "!!!!" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("polyline"));
}

#[tokio::test]
async fn test_import_recent_reads_one_page() {
    let server = spawn_test_server().await;
    let user = Uuid::new_v4();
    server.connect(user).await;
    server
        .mount_page(
            1,
            json!([
                {"id": 1, "map": {"summary_polyline": THREE_POINTS}},
                {"id": 2, "map": {"summary_polyline": null}}
            ]),
        )
        .await;
    server
        .mount_page(2, json!([{"id": 3, "map": {"summary_polyline": LOITER}}]))
        .await;

    let resp = server
        .client
        .post(server.url(&format!("/users/{}/import", user)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let report: Value = resp.json().await.unwrap();
    assert_eq!(report["status"], "completed");
    assert_eq!(report["summary"]["imported"], 1);
    assert_eq!(report["summary"]["skipped_no_geodata"], 1);
    assert_eq!(report["summary"]["pages"], 1);
}

#[tokio::test]
async fn test_import_all_walks_history() {
    let server = spawn_test_server().await;
    let user = Uuid::new_v4();
    server.connect(user).await;
    server
        .mount_page(
            1,
            json!([
                {"id": 1, "map": {"summary_polyline": THREE_POINTS}},
                {"id": 2, "map": {"summary_polyline": "!!!!"}}
            ]),
        )
        .await;
    server
        .mount_page(2, json!([{"id": 3, "map": {"summary_polyline": LOITER}}]))
        .await;
    server.mount_page(3, json!([])).await;

    let report: Value = server
        .client
        .post(server.url(&format!("/users/{}/import/all", user)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["summary"]["imported"], 2);
    assert_eq!(report["summary"]["failed"], 1);
    assert_eq!(report["summary"]["pages"], 2);
    assert_eq!(report["failures"][0]["external_id"], 2);
}

#[tokio::test]
async fn test_import_without_credential_reports_failure() {
    let server = spawn_test_server().await;
    let resp = server
        .client
        .post(server.url(&format!("/users/{}/import", Uuid::new_v4())))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    let report: Value = resp.json().await.unwrap();
    assert_eq!(report["status"], "failed");
    assert_eq!(report["summary"]["pages"], 0);
    assert!(report["error"].as_str().unwrap().contains("no provider credential"));
}

#[tokio::test]
async fn test_invalid_user_id_is_rejected() {
    let server = spawn_test_server().await;
    let resp = server
        .client
        .get(server.url("/users/not-a-uuid/stats"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_webhook_verification() {
    let server = spawn_test_server().await;

    let ok = server
        .client
        .get(server.url("/strava/webhook"))
        .query(&[
            ("hub.mode", "subscribe"),
            ("hub.challenge", "abc123"),
            ("hub.verify_token", VERIFY_TOKEN),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), 200);
    let body: Value = ok.json().await.unwrap();
    assert_eq!(body, json!({"hub.challenge": "abc123"}));

    let denied = server
        .client
        .get(server.url("/strava/webhook"))
        .query(&[
            ("hub.mode", "subscribe"),
            ("hub.challenge", "abc123"),
            ("hub.verify_token", "wrong"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 403);
}

#[tokio::test]
async fn test_webhook_event_imports_activity() {
    let server = spawn_test_server().await;
    let user = Uuid::new_v4();
    server.connect(user).await;
    Mock::given(method("GET"))
        .and(path("/activities/555"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": 555, "map": {"summary_polyline": LOITER}})),
        )
        .expect(1)
        .mount(&server.strava)
        .await;

    let event = json!({
        "object_type": "activity",
        "aspect_type": "create",
        "object_id": 555,
        "owner_id": ATHLETE,
        "subscription_id": 1,
        "event_time": 1_700_000_000
    });
    let resp = server
        .client
        .post(server.url("/strava/webhook"))
        .json(&event)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "processed");
    assert_eq!(body["summary"]["imported"], 1);

    // Redelivery is a duplicate and does not fetch again
    let again: Value = server
        .client
        .post(server.url("/strava/webhook"))
        .json(&event)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again["summary"]["skipped_duplicate"], 1);
    assert_eq!(server.store.activity_count().await, 1);
}

#[tokio::test]
async fn test_webhook_event_for_unknown_owner_is_acknowledged() {
    let server = spawn_test_server().await;
    let resp = server
        .client
        .post(server.url("/strava/webhook"))
        .json(&json!({
            "object_type": "activity",
            "aspect_type": "create",
            "object_id": 1,
            "owner_id": 999
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "unknown_owner");
}

#[tokio::test]
async fn test_webhook_unreadable_payload_is_acknowledged() {
    let server = spawn_test_server().await;

    let resp = server
        .client
        .post(server.url("/strava/webhook"))
        .json(&json!({
            "object_type": "athlete",
            "aspect_type": "update",
            "object_id": 1
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "malformed");
    assert!(body["error"].as_str().unwrap().contains("owner_id"));

    let resp = server
        .client
        .post(server.url("/strava/webhook"))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "malformed");
}
