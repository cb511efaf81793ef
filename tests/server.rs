use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use journal::aggregator::Aggregator;
use journal::document::{DocumentStore, InMemoryDocumentStore};
use journal::migrate::migrate_relational;
use journal::search::{FtsSearchIndex, SearchIndex};
use journal::server::{router, AppState};
use journal::sync::RetryPolicy;

struct TestServer {
    _tmp: TempDir,
    pool: SqlitePool,
    base: String,
    client: reqwest::Client,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

async fn start_server() -> TestServer {
    let tmp = TempDir::new().unwrap();
    let pool = journal::db::open(&tmp.path().join("journal.sqlite")).await.unwrap();
    migrate_relational(&pool).await.unwrap();

    let documents: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let search: Arc<dyn SearchIndex> = Arc::new(FtsSearchIndex::new(pool.clone()));
    let aggregator = Aggregator::new(pool.clone(), documents.clone(), search.clone(), Duration::from_secs(3));
    let retry = RetryPolicy {
        max_attempts: 1,
        delay: Duration::from_millis(1),
        attempt_timeout: Duration::from_secs(1),
    };
    let app = router(AppState::new(aggregator, documents, search, retry));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        _tmp: tmp,
        pool,
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
    }
}

async fn post_json(server: &TestServer, path: &str, body: Value) -> (u16, Value) {
    let resp = server
        .client
        .post(server.url(path))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap_or(Value::Null))
}

async fn get_json(server: &TestServer, path: &str) -> (u16, Value) {
    let resp = server.client.get(server.url(path)).send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

/// Creates Chest and Triceps plus a Bench Press exercise using both.
async fn seed_bench(server: &TestServer) -> (String, String) {
    let (status, chest) = post_json(server, "/api/muscles", json!({ "name": "Chest" })).await;
    assert_eq!(status, 201);
    let (_, triceps) = post_json(server, "/api/muscles", json!({ "name": "Triceps" })).await;

    let (status, bench) = post_json(
        server,
        "/api/exercises",
        json!({
            "name": "Bench Press",
            "description": "Flat barbell press",
            "type": "strength",
            "muscleIds": [chest["id"], triceps["id"]]
        }),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(bench["type"], "strength");

    (
        bench["id"].as_str().unwrap().to_string(),
        chest["id"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn test_health() {
    let server = start_server().await;
    let (status, body) = get_json(&server, "/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_list_page_shape() {
    let server = start_server().await;
    seed_bench(&server).await;

    let (status, page) = get_json(&server, "/api/muscles?sortBy=name&pageIndex=0&pageSize=1").await;
    assert_eq!(status, 200);
    assert_eq!(page["all"], 2);
    assert_eq!(page["index"], 0);
    assert_eq!(page["size"], 1);
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["name"], "Chest");
    assert!(page["items"][0]["createdDate"].is_string());
}

#[tokio::test]
async fn test_include_after_document_sync() {
    let server = start_server().await;
    seed_bench(&server).await;

    let (status, body) = post_json(&server, "/api/exercises/sync-document-store", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["synced"], 1);

    let (_, page) = get_json(&server, "/api/exercises?include=muscles&musclesSortBy=name&musclesSortOrder=desc").await;
    let muscles: Vec<&str> = page["items"][0]["muscles"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["name"].as_str().unwrap())
        .collect();
    assert_eq!(muscles, vec!["Triceps", "Chest"]);

    let (_, page) = get_json(&server, "/api/exercises").await;
    assert!(page["items"][0]["muscles"].is_null());
}

#[tokio::test]
async fn test_workout_lifecycle() {
    let server = start_server().await;
    let (bench, _) = seed_bench(&server).await;
    let user = "0c1d2e3f-4a5b-4c6d-8e7f-9a0b1c2d3e01";

    let (status, workout) = post_json(
        &server,
        "/api/workouts",
        json!({
            "exerciseId": bench,
            "userId": user,
            "weekPlans": [{ "dateOfWeek": "Friday", "time": "06:15:00", "weekPlanSets": [{ "value": 12 }] }]
        }),
    )
    .await;
    assert_eq!(status, 201);
    let id = workout["id"].as_str().unwrap().to_string();

    let (status, _) = post_json(&server, "/api/workouts/sync-document-store", json!({})).await;
    assert_eq!(status, 200);

    let (_, page) = get_json(
        &server,
        "/api/workouts?include=exercise,weekplans.weekplansets",
    )
    .await;
    let item = &page["items"][0];
    assert_eq!(item["exercise"]["name"], "Bench Press");
    assert!(item["exercise"]["muscles"].is_null());
    assert_eq!(item["weekPlans"][0]["time"], "06:15:00");
    assert_eq!(item["weekPlans"][0]["weekPlanSets"][0]["value"], 12);

    let resp = server
        .client
        .put(server.url(&format!("/api/workouts/{id}")))
        .json(&json!({ "exerciseId": bench, "userId": "0c1d2e3f-4a5b-4c6d-8e7f-9a0b1c2d3e02" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 204);

    let (_, page) = get_json(&server, &format!("/api/workouts?userId={user}")).await;
    assert_eq!(page["all"], 0);

    let resp = server
        .client
        .delete(server.url(&format!("/api/workouts/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 204);

    let resp = server
        .client
        .delete(server.url(&format!("/api/workouts/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_delete_exercise_cascades_on_request() {
    let server = start_server().await;
    let (bench, _) = seed_bench(&server).await;
    let (status, _) = post_json(
        &server,
        "/api/workouts",
        json!({ "exerciseId": bench, "userId": "0c1d2e3f-4a5b-4c6d-8e7f-9a0b1c2d3e01" }),
    )
    .await;
    assert_eq!(status, 201);

    let resp = server
        .client
        .delete(server.url(&format!("/api/exercises/{bench}?deleteWorkouts=true")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 204);

    let (_, page) = get_json(&server, "/api/workouts").await;
    assert_eq!(page["all"], 0);
}

#[tokio::test]
async fn test_error_contract() {
    let server = start_server().await;

    let (status, body) = get_json(&server, "/api/exercises?createdDate=someday").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"].as_str().unwrap().contains("createdDate"));

    let (status, body) = get_json(&server, "/api/workouts?pageSize=ten").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = post_json(
        &server,
        "/api/workouts",
        json!({
            "exerciseId": "2b7e1c54-8d0f-4c1e-a5f3-0e9d7c6b5a09",
            "userId": "0c1d2e3f-4a5b-4c6d-8e7f-9a0b1c2d3e01"
        }),
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, body) = post_json(
        &server,
        "/api/exercises",
        json!({ "name": "Dip", "muscleIds": ["6f1c1f0e-3a51-4a3e-9d53-1d2b8f7c0a09"] }),
    )
    .await;
    assert_eq!(status, 400);
    assert!(body["error"]["message"].as_str().unwrap().contains("unknown muscle"));

    let lats = json!({ "id": "6f1c1f0e-3a51-4a3e-9d53-1d2b8f7c0a10", "name": "Lats" });
    let (status, _) = post_json(&server, "/api/muscles", lats.clone()).await;
    assert_eq!(status, 201);
    let (status, body) = post_json(&server, "/api/muscles", lats).await;
    assert_eq!(status, 400);
    assert!(body["error"]["message"].as_str().unwrap().contains("already exists"));

    let resp = server
        .client
        .put(server.url("/api/muscles/not-a-uuid"))
        .json(&json!({ "name": "Lats" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn test_relational_failure_is_internal_error() {
    let server = start_server().await;
    seed_bench(&server).await;
    sqlx::query("DROP TABLE exercises")
        .execute(&server.pool)
        .await
        .unwrap();

    let (status, body) = get_json(&server, "/api/exercises?sortBy=name").await;
    assert_eq!(status, 500);
    assert_eq!(body["error"]["code"], "internal");
    assert!(body["error"]["message"].is_string());
}

#[tokio::test]
async fn test_search_endpoint_sync() {
    let server = start_server().await;
    seed_bench(&server).await;
    post_json(&server, "/api/muscles", json!({ "name": "Quadriceps" })).await;
    post_json(
        &server,
        "/api/exercises",
        json!({ "name": "Back Squat", "description": "Barbell squat", "type": "strength" }),
    )
    .await;

    let (status, body) = post_json(&server, "/api/exercises/sync-search", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["synced"], 2);

    let (_, page) = get_json(&server, "/api/exercises?searchTerm=squat").await;
    assert_eq!(page["all"], 1);
    assert_eq!(page["items"][0]["name"], "Back Squat");
}
