use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;

use shuttle_o_mat::web::{build_state, router, Config};

const NETWORK: &str = r#"
routes:
  - id: green
    short_name: G
    long_name: Green Line
    path: [[40.0, -88.0], [40.0, -87.99], [40.0, -87.98]]
    stops:
      - { id: library, name: Library, sequence: 1, lat: 40.0, lng: -88.0 }
      - { id: union, name: Union, sequence: 2, lat: 40.0, lng: -87.99 }
      - { id: quad, name: Quad, sequence: 3, lat: 40.0, lng: -87.98 }
vehicles:
  - { id: v1, label: "Shuttle 1", route_id: green }
  - { id: v2, label: "Shuttle 2", route_id: green }
drivers:
  - { user_id: alice, name: Alice, assigned_vehicle: v1 }
  - { user_id: bob, name: Bob, assigned_vehicle: v2, active: false }
"#;

const CONFIG: &str = r#"
web:
  bind: 127.0.0.1:0
reference:
  path: network.yaml
identities:
  - { key: k-alice, user_id: alice, name: Alice }
  - { key: k-bob, user_id: bob, name: Bob }
  - { key: k-sam, user_id: sam, name: Sam }
store:
  history_path: pings.jsonl
"#;

struct TestServer {
    base: String,
    client: reqwest::Client,
    dir: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("network.yaml"), NETWORK).unwrap();
        std::fs::write(dir.path().join("config.yaml"), CONFIG).unwrap();
        Self::start_in(dir).await
    }

    /// Serve from an existing directory, keeping whatever history it holds.
    async fn start_in(dir: TempDir) -> Self {
        let config = Config::from_file(&dir.path().join("config.yaml")).unwrap();
        let app = router(build_state(config).unwrap());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestServer {
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
            dir,
        }
    }

    async fn ingest(&self, token: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(format!("{}/api/ingest", self.base))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let response = self
            .client
            .get(format!("{}{}", self.base, path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }
}

fn ping(label: &str, lat: f64, lng: f64, timestamp: &str) -> Value {
    json!({
        "vehicle_label": label,
        "lat": lat,
        "lng": lng,
        "timestamp": timestamp,
        "speed": 4.0,
        "accuracy": 8.0,
        "battery": 64.0
    })
}

fn timestamp_of(position: &Value) -> DateTime<Utc> {
    position["timestamp"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_valid_batch_is_fully_processed() {
    let server = TestServer::start().await;

    let (status, body) = server
        .ingest(
            "k-alice",
            json!({ "pings": [
                ping("Shuttle 1", 40.0, -87.999, "2026-03-02T08:00:01Z"),
                ping("Shuttle 1", 40.0, -87.998, "2026-03-02T08:00:02Z"),
                ping("Shuttle 1", 40.0, -87.997, "2026-03-02T08:00:03Z"),
            ]}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["processed"], 3);
    assert_eq!(body["total"], 3);
    assert!(body.get("errors").is_none());
    assert_eq!(body["message"], "Successfully processed 3 of 3 pings");

    let (status, position) = server.get("k-sam", "/api/vehicles/v1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        timestamp_of(&position),
        "2026-03-02T08:00:03Z".parse::<DateTime<Utc>>().unwrap()
    );
    assert_eq!(position["route_id"], "green");
    assert_eq!(position["battery"], 64.0);
}

#[tokio::test]
async fn test_invalid_item_does_not_abort_batch() {
    let server = TestServer::start().await;

    let (status, body) = server
        .ingest(
            "k-alice",
            json!({ "pings": [
                ping("Shuttle 1", 40.0, -87.999, "2026-03-02T08:00:01Z"),
                ping("Shuttle 1", 200.0, -87.998, "2026-03-02T08:00:02Z"),
            ]}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processed"], 1);
    assert_eq!(body["total"], 2);
    assert_eq!(body["errors"], json!(["Invalid coordinates"]));
    assert_eq!(body["rejections"][0]["index"], 1);
    assert_eq!(body["rejections"][0]["reason"], "validation");
    assert_eq!(body["rejections"][0]["retryable"], false);
}

#[tokio::test]
async fn test_ping_for_other_vehicle_is_rejected() {
    let server = TestServer::start().await;

    let (status, body) = server
        .ingest(
            "k-alice",
            json!({ "pings": [ping("Shuttle 2", 40.0, -87.999, "2026-03-02T08:00:01Z")] }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processed"], 0);
    assert_eq!(
        body["errors"],
        json!(["Ping for vehicle Shuttle 2 rejected - not assigned to driver"])
    );

    let (status, _) = server.get("k-sam", "/api/vehicles/v2").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_late_ping_does_not_regress_latest() {
    let server = TestServer::start().await;

    server
        .ingest(
            "k-alice",
            json!({ "pings": [ping("Shuttle 1", 40.0, -87.995, "2026-03-02T08:00:10Z")] }),
        )
        .await;
    let (_, body) = server
        .ingest(
            "k-alice",
            json!({ "pings": [ping("Shuttle 1", 40.0, -87.999, "2026-03-02T08:00:05Z")] }),
        )
        .await;
    assert_eq!(body["processed"], 1);

    let (_, position) = server.get("k-sam", "/api/vehicles/v1").await;
    assert_eq!(
        timestamp_of(&position),
        "2026-03-02T08:00:10Z".parse::<DateTime<Utc>>().unwrap()
    );

    // Both pings are in history even though only one is latest.
    let (status, pings) = server.get("k-sam", "/api/vehicles/v1/pings?limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pings.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_restart_keeps_latest_position() {
    let server = TestServer::start().await;
    server
        .ingest(
            "k-alice",
            json!({ "pings": [ping("Shuttle 1", 40.0, -87.995, "2026-03-02T08:00:10Z")] }),
        )
        .await;

    let restarted = TestServer::start_in(server.dir).await;

    let (status, position) = restarted.get("k-sam", "/api/vehicles/v1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        timestamp_of(&position),
        "2026-03-02T08:00:10Z".parse::<DateTime<Utc>>().unwrap()
    );

    let (_, body) = restarted
        .ingest(
            "k-alice",
            json!({ "pings": [ping("Shuttle 1", 40.0, -87.999, "2026-03-02T08:00:05Z")] }),
        )
        .await;
    assert_eq!(body["processed"], 1);

    let (_, position) = restarted.get("k-sam", "/api/vehicles/v1").await;
    assert_eq!(
        timestamp_of(&position),
        "2026-03-02T08:00:10Z".parse::<DateTime<Utc>>().unwrap()
    );
}

#[tokio::test]
async fn test_batch_level_errors() {
    let server = TestServer::start().await;
    let url = format!("{}/api/ingest", server.base);

    let response = server.client.post(&url).body("{}").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Missing authorization header");

    let (status, body) = server
        .ingest("k-nobody", json!({ "pings": [] }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid authorization token");

    let response = server
        .client
        .post(&url)
        .bearer_auth("k-alice")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid pings data");

    let (status, _) = server.ingest("k-alice", json!({ "pings": [] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let batch = json!({ "pings": [ping("Shuttle 2", 40.0, -87.999, "2026-03-02T08:00:01Z")] });
    let (status, body) = server.ingest("k-bob", batch.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Driver not found or inactive");

    let (status, _) = server.ingest("k-sam", batch).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_cors_preflight_needs_no_auth() {
    let server = TestServer::start().await;

    let response = server
        .client
        .request(Method::OPTIONS, format!("{}/api/ingest", server.base))
        .header("Origin", "https://campus.example")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "authorization, content-type")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*"
    );
}

#[tokio::test]
async fn test_etas_follow_stop_order() {
    let server = TestServer::start().await;
    server
        .ingest(
            "k-alice",
            json!({ "pings": [ping("Shuttle 1", 40.0, -87.995, "2026-03-02T08:00:10Z")] }),
        )
        .await;

    let (status, etas) = server.get("k-sam", "/api/vehicles/v1/etas").await;
    assert_eq!(status, StatusCode::OK);
    let stops: Vec<&str> = etas
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["stop_id"].as_str().unwrap())
        .collect();
    assert_eq!(stops, ["union", "quad"]);

    let (_, quad) = server.get("k-sam", "/api/etas?stop=quad").await;
    assert_eq!(quad.as_array().unwrap().len(), 1);
    assert_eq!(quad[0]["vehicle_id"], "v1");

    let (status, _) = server.get("k-sam", "/api/etas?stop=nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, vehicles) = server.get("k-sam", "/api/vehicles").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(vehicles.as_array().unwrap().len(), 2);
    assert!(vehicles[1]["position"].is_null());
}

#[tokio::test]
async fn test_realtime_stream_signals_position_change() {
    let server = TestServer::start().await;

    let mut stream = server
        .client
        .get(format!("{}/api/realtime?vehicles=v1", server.base))
        .bearer_auth("k-sam")
        .send()
        .await
        .unwrap();
    assert_eq!(stream.status(), StatusCode::OK);

    server
        .ingest(
            "k-alice",
            json!({ "pings": [ping("Shuttle 1", 40.0, -87.995, "2026-03-02T08:00:10Z")] }),
        )
        .await;

    let chunk = tokio::time::timeout(Duration::from_secs(5), stream.chunk())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8_lossy(&chunk);
    assert!(text.contains("event: position_changed"), "{}", text);
    assert!(text.contains("\"vehicle_id\":\"v1\""), "{}", text);
}

#[tokio::test]
async fn test_dashboard_lists_vehicles() {
    let server = TestServer::start().await;

    // No bearer token: the status page is public
    let response = server.client.get(&server.base).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = response.text().await.unwrap();
    assert!(html.contains("Shuttle 1"));
    assert!(html.contains("Shuttle 2"));
}
