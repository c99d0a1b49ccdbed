use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use fleetops_api::{ApiConfig, build_app};
use fleetops_auth::{Hs256JwtValidator, JwtClaims, Role};
use fleetops_catalog::{Item, Site, Unit};
use fleetops_client::{
    ApiClient, ClientError, MemoryNotifier, QueryCache, Severity, WorkflowError, WorkflowService,
};
use fleetops_core::{Actor, ItemId, SiteId, UnitId, UserId};
use fleetops_listing::ListQuery;
use fleetops_purchasing::{NewPaymentSlip, PaymentMethod, Procurement};
use fleetops_requisitions::{
    Action, ActionKind, LineResponse, NewLine, NewRequisition, Priority, RequisitionStatus,
};

const SECRET: &str = "client-test-secret";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let app = build_app(&ApiConfig::local(SECRET));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { base_url, handle }
    }

    /// Client and matching actor for a freshly minted token.
    fn client(&self, site_id: Option<SiteId>, admin: bool) -> (ApiClient, Actor) {
        let now = Utc::now();
        let user_id = UserId::new();
        let claims = JwtClaims {
            sub: user_id,
            name: "Client test".into(),
            site_id,
            roles: vec![if admin { Role::admin() } else { Role::site_user() }],
            issued_at: now,
            expires_at: now + Duration::minutes(10),
        };
        let token = Hs256JwtValidator::new(SECRET).mint(&claims).unwrap();
        let actor = Actor {
            user_id,
            site_id,
            admin,
        };
        (ApiClient::with_token(self.base_url.clone(), token), actor)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Fixture {
    requesting: SiteId,
    holding: SiteId,
    unit_id: UnitId,
    item_id: ItemId,
}

async fn fixture(admin: &ApiClient) -> Fixture {
    let mut ids = Vec::new();
    for (name, code) in [("Kandy Road", "KRS"), ("Central Store", "HQ")] {
        let site: Site = admin
            .post(
                "/sites",
                &Site {
                    id: SiteId::new(),
                    name: name.into(),
                    code: code.into(),
                    location: String::new(),
                },
            )
            .await
            .unwrap();
        ids.push(site.id);
    }
    let unit: Unit = admin
        .post(
            "/units",
            &Unit {
                id: UnitId::new(),
                name: "Bags".into(),
                symbol: "bag".into(),
            },
        )
        .await
        .unwrap();
    let item: Item = admin
        .post(
            "/items",
            &Item {
                id: ItemId::new(),
                name: "Cement 50kg".into(),
                code: "CEM-50".into(),
                group_id: None,
                unit_id: Some(unit.id),
                description: String::new(),
            },
        )
        .await
        .unwrap();

    Fixture {
        requesting: ids[0],
        holding: ids[1],
        unit_id: unit.id,
        item_id: item.id,
    }
}

fn service(
    client: ApiClient,
    actor: Actor,
) -> (WorkflowService<ApiClient, Arc<MemoryNotifier>>, Arc<MemoryNotifier>) {
    let notifier = Arc::new(MemoryNotifier::new());
    let cache = Arc::new(QueryCache::new(Duration::minutes(5)));
    (
        WorkflowService::new(client, cache, notifier.clone(), actor),
        notifier,
    )
}

#[tokio::test]
async fn workflow_runs_a_requisition_to_receipt() {
    let server = TestServer::spawn().await;
    let (admin_client, admin_actor) = server.client(None, true);
    let fx = fixture(&admin_client).await;

    let (requester_client, requester_actor) = server.client(Some(fx.requesting), false);
    let (holder_client, holder_actor) = server.client(Some(fx.holding), false);

    let created = requester_client
        .create_requisition(&NewRequisition {
            requisition_no: "REQ-100".into(),
            requesting_site: fx.requesting,
            priority: Priority::Medium,
            items: vec![NewLine {
                item_id: fx.item_id,
                unit_id: fx.unit_id,
                quantity: 6,
            }],
            notes: Some("for the culvert".into()),
        })
        .await
        .unwrap();
    let id = created.id_typed();

    let (admin, admin_toasts) = service(admin_client, admin_actor);
    let view = admin.view(id).await.unwrap();
    assert!(view.can(ActionKind::Forward));

    let forwarded = admin
        .perform(
            id,
            Action::Forward {
                to_site: fx.holding,
                notes: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(forwarded.status(), RequisitionStatus::Forwarded);
    let toasts = admin_toasts.take();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].severity, Severity::Success);

    let (holder, _) = service(holder_client, holder_actor);
    holder
        .perform(
            id,
            Action::Respond {
                responses: vec![LineResponse {
                    line_no: 1,
                    can_fulfill: true,
                    quantity: 6,
                    notes: None,
                }],
                notes: None,
            },
        )
        .await
        .unwrap();
    holder
        .perform(id, Action::Issue { notes: None })
        .await
        .unwrap();

    let (requester, _) = service(requester_client.clone(), requester_actor);
    let received = requester
        .perform(
            id,
            Action::Receive {
                lines: Default::default(),
                notes: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(received.status(), RequisitionStatus::Received);
    assert!(received.all_received());

    let stock = requester_client
        .stock(fx.requesting, fx.item_id)
        .await
        .unwrap();
    assert_eq!(stock.quantity, 6);

    let page = requester
        .list(&ListQuery::default().with_filter("status", "received"))
        .await
        .unwrap();
    assert_eq!(page.total_count, 1);
}

#[tokio::test]
async fn refused_actions_toast_once_and_leave_the_cache_alone() {
    let server = TestServer::spawn().await;
    let (admin_client, admin_actor) = server.client(None, true);
    let fx = fixture(&admin_client).await;
    let (requester_client, requester_actor) = server.client(Some(fx.requesting), false);

    let created = requester_client
        .create_requisition(&NewRequisition {
            requisition_no: "REQ-101".into(),
            requesting_site: fx.requesting,
            priority: Priority::Low,
            items: vec![NewLine {
                item_id: fx.item_id,
                unit_id: fx.unit_id,
                quantity: 2,
            }],
            notes: None,
        })
        .await
        .unwrap();
    let id = created.id_typed();

    // Local guard: the requesting site cannot forward.
    let (requester, toasts) = service(requester_client, requester_actor);
    let err = requester
        .perform(
            id,
            Action::Forward {
                to_site: fx.holding,
                notes: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Refused(_)));
    let raised = toasts.take();
    assert_eq!(raised.len(), 1);
    assert_eq!(raised[0].severity, Severity::Error);

    // Passes the local guard, refused by the server: unknown destination.
    let (admin, toasts) = service(admin_client, admin_actor);
    let before = admin.load(id).await.unwrap();
    let err = admin
        .perform(
            id,
            Action::Forward {
                to_site: SiteId::new(),
                notes: None,
            },
        )
        .await
        .unwrap_err();
    match &err {
        WorkflowError::Client(ClientError::Api { status, message, .. }) => {
            assert_eq!(*status, 400);
            assert!(message.contains("unknown site"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    let raised = toasts.take();
    assert_eq!(raised.len(), 1);
    assert!(raised[0].description.contains("unknown site"));

    let cached: fleetops_requisitions::Requisition = admin
        .cache()
        .get(&fleetops_client::workflow::requisition_key(id))
        .unwrap();
    assert_eq!(cached, before);
    assert_eq!(cached.status(), RequisitionStatus::Pending);
}

#[tokio::test]
async fn stale_cached_copies_are_refreshed_before_refusing() {
    let server = TestServer::spawn().await;
    let (admin_client, admin_actor) = server.client(None, true);
    let fx = fixture(&admin_client).await;
    let (requester_client, _) = server.client(Some(fx.requesting), false);

    let created = requester_client
        .create_requisition(&NewRequisition {
            requisition_no: "REQ-102".into(),
            requesting_site: fx.requesting,
            priority: Priority::Medium,
            items: vec![NewLine {
                item_id: fx.item_id,
                unit_id: fx.unit_id,
                quantity: 1,
            }],
            notes: None,
        })
        .await
        .unwrap();
    let id = created.id_typed();

    let (admin, toasts) = service(admin_client.clone(), admin_actor);
    assert_eq!(admin.load(id).await.unwrap().status(), RequisitionStatus::Pending);

    // Someone else forwards it while the pending copy is still cached.
    admin_client
        .transition(
            id,
            &Action::Forward {
                to_site: fx.holding,
                notes: None,
            },
        )
        .await
        .unwrap();

    let rejected = admin
        .perform(
            id,
            Action::Reject {
                notes: Some("duplicate request".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(rejected.status(), RequisitionStatus::Rejected);
    let raised = toasts.take();
    assert_eq!(raised.len(), 1);
    assert_eq!(raised[0].severity, Severity::Success);
}

#[tokio::test]
async fn payment_slip_downloads_to_a_directory() {
    let server = TestServer::spawn().await;
    let (admin, _) = server.client(None, true);
    let fx = fixture(&admin).await;

    let procurement: Procurement = admin
        .post(
            "/procurements",
            &serde_json::json!({
                "procurement_no": "PO-1",
                "vendor": "Lanka Cement",
                "site_id": fx.requesting,
                "lines": [{"item_id": fx.item_id, "quantity": 10, "unit_price": 1250}],
            }),
        )
        .await
        .unwrap();
    admin
        .advance_procurement(procurement.id_typed(), "approve", Some("ok"))
        .await
        .unwrap();

    let slip = admin
        .record_payment(&NewPaymentSlip {
            slip_no: "PS/7".into(),
            procurement_id: procurement.id_typed(),
            payee: "Lanka Cement".into(),
            amount: 12_500,
            method: PaymentMethod::Cash,
            reference: None,
            paid_on: NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
            notes: None,
        })
        .await
        .unwrap();

    let dir = std::env::temp_dir().join(format!("fleetops-slips-{}", uuid::Uuid::now_v7()));
    std::fs::create_dir_all(&dir).unwrap();
    let saved = admin.download_payment_slip(slip.id, &dir).await.unwrap();

    assert_eq!(saved.file_name().unwrap(), "payment-slip-PS_7.txt");
    let text = std::fs::read_to_string(&saved).unwrap();
    assert!(text.contains("PAYMENT SLIP PS/7"));
    assert!(text.contains("125.00"));

    let missing = admin
        .download_payment_slip(fleetops_purchasing::PaymentId::generate(), &dir)
        .await
        .unwrap_err();
    assert!(missing.is_not_found());
}
