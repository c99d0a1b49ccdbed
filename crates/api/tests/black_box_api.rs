use chrono::{Duration as ChronoDuration, Utc};
use fleetops_api::{ApiConfig, build_app};
use fleetops_auth::{JwtClaims, Role};
use fleetops_core::{SiteId, UserId};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port.
        let app = build_app(&ApiConfig::local(SECRET));
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

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn put(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    /// POST and insist on the expected status, returning the body.
    async fn ok(&self, token: &str, path: &str, body: Value, expected: StatusCode) -> Value {
        let (status, body) = self.post(token, path, body).await;
        assert_eq!(status, expected, "POST {path} answered {body}");
        body
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(site_id: Option<SiteId>, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(),
        name: "Test user".to_string(),
        site_id,
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn admin() -> String {
    mint_jwt(None, vec![Role::admin()])
}

fn site_user(site: SiteId) -> String {
    mint_jwt(Some(site), vec![Role::site_user()])
}

fn id_of<T: std::str::FromStr>(body: &Value) -> T
where
    T::Err: std::fmt::Debug,
{
    body["id"].as_str().expect("id in body").parse().unwrap()
}

/// Two sites, a unit and an item, created through the API.
struct Fixture {
    store: SiteId,
    project: SiteId,
    unit_id: String,
    item_id: String,
}

async fn fixture(server: &TestServer, token: &str) -> Fixture {
    let store = server
        .ok(token, "/sites", json!({"name": "Central Store", "code": "HQ"}), StatusCode::CREATED)
        .await;
    let project = server
        .ok(token, "/sites", json!({"name": "Kandy Road", "code": "KRS"}), StatusCode::CREATED)
        .await;
    let unit = server
        .ok(token, "/units", json!({"name": "Bags", "symbol": "bag"}), StatusCode::CREATED)
        .await;
    let item = server
        .ok(
            token,
            "/items",
            json!({
                "name": "Cement 50kg",
                "code": "CEM-50",
                "group_id": null,
                "unit_id": unit["id"],
            }),
            StatusCode::CREATED,
        )
        .await;

    Fixture {
        store: id_of(&store),
        project: id_of(&project),
        unit_id: unit["id"].as_str().unwrap().to_string(),
        item_id: item["id"].as_str().unwrap().to_string(),
    }
}

#[tokio::test]
async fn health_is_public_and_everything_else_needs_a_token() {
    let server = TestServer::spawn().await;

    let res = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = server.client.get(server.url("/requisitions")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = server
        .client
        .get(server.url("/requisitions"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");

    let (status, who) = server.get(&admin(), "/whoami").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(who["admin"], true);
}

#[tokio::test]
async fn reference_data_is_admin_maintained() {
    let server = TestServer::spawn().await;
    let admin = admin();
    let fx = fixture(&server, &admin).await;
    let user = site_user(fx.project);

    let (status, _) = server
        .post(&user, "/units", json!({"name": "Litres", "symbol": "l"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, page) = server.get(&user, "/sites?search=kandy").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total_count"], 1);

    let (status, updated) = server
        .put(
            &admin,
            &format!("/units/{}", fx.unit_id),
            json!({"name": "Bags (50kg)", "symbol": "bag"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["id"], fx.unit_id.as_str());
    assert_eq!(updated["name"], "Bags (50kg)");

    let (status, _) = server
        .post(&admin, "/sites", json!({"name": "  ", "code": "X"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let res = server
        .client
        .delete(server.url(&format!("/units/{}", fx.unit_id)))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let (status, body) = server.get(&admin, &format!("/units/{}", fx.unit_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = server.get(&admin, "/units/not-an-id").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn requisition_lifecycle_moves_stock_to_the_requesting_site() {
    let server = TestServer::spawn().await;
    let admin = admin();
    let fx = fixture(&server, &admin).await;
    let requester = site_user(fx.project);
    let responder = site_user(fx.store);

    let created = server
        .ok(
            &requester,
            "/requisitions",
            json!({
                "requisition_no": "REQ-001",
                "requesting_site": fx.project,
                "priority": "urgent",
                "items": [{"item_id": fx.item_id, "unit_id": fx.unit_id, "quantity": 10}],
            }),
            StatusCode::CREATED,
        )
        .await;
    assert_eq!(created["status"], "pending");
    assert_eq!(created["priority"], "high");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _) = server
        .post(
            &requester,
            "/requisitions",
            json!({
                "requisition_no": "req-001",
                "requesting_site": fx.project,
                "items": [{"item_id": fx.item_id, "unit_id": fx.unit_id, "quantity": 1}],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "numbers are unique ignoring case");

    let steps = [
        (&admin, "forward", json!({"to_site": fx.store}), "forwarded"),
        (
            &responder,
            "respond",
            json!({"responses": [{"line_no": 1, "can_fulfill": true, "quantity": 10}]}),
            "approved",
        ),
        (&responder, "issue", json!({}), "issued"),
        (&requester, "receive", json!({}), "received"),
    ];
    for (token, action, body, expected) in steps {
        let next = server
            .ok(token, &format!("/requisitions/{id}/{action}"), body, StatusCode::OK)
            .await;
        assert_eq!(next["status"], expected, "after {action}");
    }

    let (status, stock) = server
        .get(&admin, &format!("/inventory/{}/{}", fx.project, fx.item_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stock["quantity"], 10);
    assert_eq!(stock["item_code"], "CEM-50");

    // Receiving again changes nothing.
    server
        .ok(&requester, &format!("/requisitions/{id}/receive"), json!({}), StatusCode::OK)
        .await;
    let (_, stock) = server
        .get(&admin, &format!("/inventory/{}/{}", fx.project, fx.item_id))
        .await;
    assert_eq!(stock["quantity"], 10);

    let (status, events) = server.get(&requester, &format!("/requisitions/{id}/events")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(events.as_array().unwrap().len() >= 5);

    let (_, page) = server.get(&admin, "/requisitions?status=received&priority=urgent").await;
    assert_eq!(page["total_count"], 1);
}

#[tokio::test]
async fn illegal_transitions_are_refused() {
    let server = TestServer::spawn().await;
    let admin = admin();
    let fx = fixture(&server, &admin).await;
    let requester = site_user(fx.project);

    let created = server
        .ok(
            &requester,
            "/requisitions",
            json!({
                "requisition_no": "REQ-002",
                "requesting_site": fx.project,
                "items": [{"item_id": fx.item_id, "unit_id": fx.unit_id, "quantity": 3}],
            }),
            StatusCode::CREATED,
        )
        .await;
    let id = created["id"].as_str().unwrap().to_string();

    // Wrong state.
    let (status, body) = server
        .post(&admin, &format!("/requisitions/{id}/issue"), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    // Right state, wrong party.
    let (status, _) = server
        .post(&requester, &format!("/requisitions/{id}/forward"), json!({"to_site": fx.store}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Unknown action segment.
    let (status, _) = server
        .post(&admin, &format!("/requisitions/{id}/approve"), json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Rejection from pending is not offered.
    let (status, _) = server
        .post(&admin, &format!("/requisitions/{id}/reject"), json!({"notes": "no"}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Other sites cannot see it at all.
    let outsider = site_user(fx.store);
    let (status, _) = server.get(&outsider, &format!("/requisitions/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    for action in ["issue", "receive", "respond"] {
        let (status, body) = server
            .post(&outsider, &format!("/requisitions/{id}/{action}"), json!({}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{action}");
        assert_eq!(body["error"], "not_found");
    }

    // Quantities past the line limit never reach stock.
    let (status, _) = server
        .post(
            &requester,
            "/requisitions",
            json!({
                "requisition_no": "REQ-003",
                "requesting_site": fx.project,
                "items": [{"item_id": fx.item_id, "unit_id": fx.unit_id, "quantity": i64::MAX}],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, unchanged) = server.get(&admin, &format!("/requisitions/{id}")).await;
    assert_eq!(unchanged["status"], "pending");
}

#[tokio::test]
async fn logbook_rejects_bad_readings_with_field_errors() {
    let server = TestServer::spawn().await;
    let admin = admin();
    let fx = fixture(&server, &admin).await;
    let user = site_user(fx.project);

    let machine = server
        .ok(
            &admin,
            "/machines",
            json!({"name": "Tipper", "registration_no": "WP LB-4411", "site_id": fx.project}),
            StatusCode::CREATED,
        )
        .await;

    let mut entry = json!({
        "machine_id": machine["id"],
        "site_id": fx.project,
        "date": "2026-03-02",
        "opening_km": 100.0,
        "closing_km": 300.0,
        "opening_hrs": 10.0,
        "closing_hrs": 18.0,
        "opening_balance": 50.0,
        "diesel_issued": 20.0,
        "closing_balance": 80.0,
    });

    let (status, body) = server.post(&user, "/logbook", entry.clone()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_fields");
    assert!(body["fields"]["closing_balance"].is_string());

    entry["closing_balance"] = json!(10.0);
    let saved = server.ok(&user, "/logbook", entry.clone(), StatusCode::CREATED).await;
    assert_eq!(saved["figures"]["diesel_used"], 60.0);
    assert_eq!(saved["figures"]["total_run_km"], 200.0);
    assert_eq!(saved["figures"]["avg_per_km"], 3.33);

    let (status, _) = server.post(&user, "/logbook", entry).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, page) = server
        .get(&user, &format!("/logbook?machine={}", machine["id"].as_str().unwrap()))
        .await;
    assert_eq!(page["total_count"], 1);
}

#[tokio::test]
async fn machine_transfer_moves_the_machine_on_completion() {
    let server = TestServer::spawn().await;
    let admin = admin();
    let fx = fixture(&server, &admin).await;
    let sender = site_user(fx.project);
    let receiver = site_user(fx.store);

    let machine = server
        .ok(
            &admin,
            "/machines",
            json!({"name": "Excavator", "registration_no": "WP CAA-1234", "site_id": fx.project}),
            StatusCode::CREATED,
        )
        .await;
    let machine_id = machine["id"].as_str().unwrap().to_string();

    let transfer = server
        .ok(
            &sender,
            "/transfers",
            json!({"machine_id": machine_id, "from_site": fx.project, "to_site": fx.store}),
            StatusCode::CREATED,
        )
        .await;
    assert_eq!(transfer["status"], "pending");
    let id = transfer["id"].as_str().unwrap().to_string();

    let (status, _) = server
        .post(
            &sender,
            "/transfers",
            json!({"machine_id": machine_id, "from_site": fx.project, "to_site": fx.store}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "one open transfer per machine");

    let (status, _) = server
        .post(&receiver, &format!("/transfers/{id}/approve"), json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    server
        .ok(&admin, &format!("/transfers/{id}/approve"), json!({}), StatusCode::OK)
        .await;

    let (status, _) = server
        .post(&sender, &format!("/transfers/{id}/complete"), json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "only the destination completes");

    let done = server
        .ok(
            &receiver,
            &format!("/transfers/{id}/complete"),
            json!({"notes": "arrived"}),
            StatusCode::OK,
        )
        .await;
    assert_eq!(done["status"], "completed");

    let (_, moved) = server.get(&admin, &format!("/machines/{machine_id}")).await;
    assert_eq!(moved["site_id"], json!(fx.store));
}

#[tokio::test]
async fn procurement_receipt_and_payment_slip() {
    let server = TestServer::spawn().await;
    let admin = admin();
    let fx = fixture(&server, &admin).await;
    let site = site_user(fx.project);

    let procurement = server
        .ok(
            &admin,
            "/procurements",
            json!({
                "procurement_no": "PO-7",
                "vendor": "Lanka Cement",
                "site_id": fx.project,
                "lines": [{"item_id": fx.item_id, "quantity": 5, "unit_price": 1000}],
            }),
            StatusCode::CREATED,
        )
        .await;
    assert_eq!(procurement["status"], "draft");
    let id = procurement["id"].as_str().unwrap().to_string();

    let slip = |amount: i64, reference: Option<&str>, slip_no: &str| {
        json!({
            "slip_no": slip_no,
            "procurement_id": id,
            "payee": "Lanka Cement",
            "amount": amount,
            "method": "bank_transfer",
            "reference": reference,
            "paid_on": "2026-03-05",
        })
    };

    let (status, _) = server.post(&admin, "/payments", slip(1000, Some("TT-1"), "PS-1")).await;
    assert_eq!(status, StatusCode::CONFLICT, "draft procurements are not payable");

    server
        .ok(&admin, &format!("/procurements/{id}/approve"), json!({}), StatusCode::OK)
        .await;
    let received = server
        .ok(&site, &format!("/procurements/{id}/receive"), json!({}), StatusCode::OK)
        .await;
    assert_eq!(received["status"], "received");

    let (_, stock) = server
        .get(&admin, &format!("/inventory/{}/{}", fx.project, fx.item_id))
        .await;
    assert_eq!(stock["quantity"], 5);

    let (status, _) = server.post(&admin, "/payments", slip(2000, None, "PS-1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "bank transfers need a reference");

    let paid = server
        .ok(&admin, "/payments", slip(2000, Some("TT-1"), "PS-1"), StatusCode::CREATED)
        .await;

    let (status, _) = server.post(&admin, "/payments", slip(4000, Some("TT-2"), "PS-2")).await;
    assert_eq!(status, StatusCode::CONFLICT, "only 3,000.00 is outstanding");

    let res = server
        .client
        .get(server.url(&format!("/payments/{}/download", paid["id"].as_str().unwrap())))
        .bearer_auth(&site)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let disposition = res.headers()[reqwest::header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("payment-slip-PS-1.txt"));
    let text = res.text().await.unwrap();
    assert!(text.contains("PAYMENT SLIP PS-1"));
    assert!(text.contains("20.00"));
    assert!(text.contains("PO-7"));
}
