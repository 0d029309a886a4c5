use actix_web::{http::StatusCode, test, web::Data, App};
use async_trait::async_trait;
use chrono::Utc;
use regway_core::RGGateway;
use regway_driver_modbus::{RegisterSession, SessionConnector};
use regway_error::{comm::CommError, CommResult};
use regway_models::{
    domain::prelude::{ConnectionConfig, DeviceConfig},
    settings::Poller,
    Gateway,
};
use regway_storage::{memory::MemoryStore, TimeSeriesStore};
use regway_web::{configure_app, AppState};
use serde_json::{json, Value};
use std::sync::Arc;

struct OfflineConnector;

#[async_trait]
impl SessionConnector for OfflineConnector {
    async fn connect(&self, _device: &DeviceConfig) -> CommResult<Box<dyn RegisterSession>> {
        Err(CommError::ConnectFailed("connection refused".into()))
    }
}

fn gateway(store: Arc<MemoryStore>) -> Arc<dyn Gateway> {
    let device = DeviceConfig {
        id: "fy600".into(),
        name: Some("FY600".into()),
        profile: Some("fy600".into()),
        measurement: None,
        connection: ConnectionConfig::Tcp {
            host: "127.0.0.1".into(),
            port: 502,
        },
        unit_id: 1,
        interval_ms: None,
        registers: vec![],
    }
    .resolve()
    .unwrap();
    Arc::new(
        RGGateway::new(
            Poller::default(),
            vec![device],
            330,
            store as Arc<dyn TimeSeriesStore>,
            Arc::new(OfflineConnector),
        )
        .unwrap(),
    )
}

macro_rules! app {
    ($store:expr) => {
        test::init_service(
            App::new()
                .app_data(Data::new(Arc::new(AppState::new(gateway($store)))))
                .configure(configure_app("/api".into())),
        )
        .await
    };
}

#[actix_web::test]
async fn health_is_up() {
    let app = app!(Arc::new(MemoryStore::default()));
    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "status": "up" }));
}

#[actix_web::test]
async fn lists_devices_with_register_map() {
    let app = app!(Arc::new(MemoryStore::default()));
    let req = test::TestRequest::get().uri("/api/device/list").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["code"], 0);
    let dev = &body["data"][0];
    assert_eq!(dev["id"], "fy600");
    assert_eq!(dev["status"], "disconnected");
    let sv = dev["registers"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "sv")
        .unwrap();
    assert_eq!(sv["writable"], true);
    assert_eq!(sv["kind"], "holding");
}

#[actix_web::test]
async fn latest_of_offline_device_still_answers() {
    let app = app!(Arc::new(MemoryStore::default()));
    let req = test::TestRequest::get().uri("/api/device/fy600/latest").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["deviceId"], "fy600");
    assert_eq!(body["data"]["status"], "disconnected");

    let req = test::TestRequest::get().uri("/api/device/nope/latest").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn invalid_writes_are_bad_requests() {
    let app = app!(Arc::new(MemoryStore::default()));
    for (uri, payload) in [
        ("/api/device/fy600/register/nope", json!({ "value": 1.0 })),
        ("/api/device/fy600/register/pv", json!({ "value": 1.0 })),
        ("/api/device/nope/register/sv", json!({ "value": 1.0 })),
        ("/api/device/fy600/registers", json!({ "writes": [] })),
        ("/api/device/fy600/register/sv", json!({ "val": 1.0 })),
    ] {
        let req = test::TestRequest::post().uri(uri).set_json(&payload).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri} {payload}");
    }
}

#[actix_web::test]
async fn write_to_offline_device_reports_failure() {
    let app = app!(Arc::new(MemoryStore::default()));
    let req = test::TestRequest::post()
        .uri("/api/device/fy600/registers")
        .set_json(json!({ "writes": [{ "name": "sv", "value": 25.5 }, { "name": "pid_p", "value": 2.0 }] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], 500);
    assert_eq!(body["data"]["ok"], false);
    assert_eq!(body["data"]["appliedCount"], 0);
    assert_eq!(body["data"]["failedIndex"], 0);
}

#[actix_web::test]
async fn history_reads_from_store() {
    let store = Arc::new(MemoryStore::default());
    store
        .write_point("fy600", &[("device", "FY600")], &[("pv", 120.0)], Utc::now())
        .await
        .unwrap();
    let app = app!(Arc::clone(&store));

    let req = test::TestRequest::get().uri("/api/history?measurement=fy600").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"][0]["field"], "pv");
    assert_eq!(body["data"][0]["value"], 120.0);
    assert_eq!(body["data"][0]["device"], "FY600");

    let req = test::TestRequest::get()
        .uri("/api/history?measurement=fy600&start=2024-05-02%2000:00:00&end=2024-05-01%2000:00:00")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get().uri("/api/history?measurement=other").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"], json!([]));
}
