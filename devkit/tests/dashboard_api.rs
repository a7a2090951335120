//! Scénarios de bout en bout sur le vrai routeur (HTTP + WebSocket)

use futures_util::StreamExt;
use netdash_devkit::{device_body, FixedSampler, RecordingNotifier, TestHarness};
use netdash_kernel::models::NewDevice;
use netdash_kernel::notify::ChangeEvent;
use netdash_kernel::sampler::sample_once;
use netdash_kernel::storage::Storage;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio_tungstenite::tungstenite::Message;

fn ts(value: &Value) -> OffsetDateTime {
    OffsetDateTime::parse(value.as_str().expect("timestamp string"), &Rfc3339).expect("rfc3339")
}

#[tokio::test]
async fn create_then_toggle_twice() {
    let harness = TestHarness::start().await.unwrap();

    let created = harness
        .post("/api/devices", Some(device_body("Test", "10.0.0.5", "AA:BB:CC:DD:EE:00")))
        .await
        .unwrap();
    assert_eq!(created.status, 200);
    assert_eq!(created.body["id"], 1);
    assert_eq!(created.body["isBlocked"], false);
    assert_eq!(created.body["isOnline"], true);

    harness.clock.advance(time::Duration::seconds(30));
    let blocked = harness.post("/api/devices/1/toggle-block", None).await.unwrap();
    assert_eq!(blocked.status, 200);
    assert_eq!(blocked.body["isBlocked"], true);
    assert!(ts(&blocked.body["lastSeen"]) > ts(&created.body["lastSeen"]));

    harness.clock.advance(time::Duration::seconds(30));
    let unblocked = harness.post("/api/devices/1/toggle-block", None).await.unwrap();
    assert_eq!(unblocked.body["isBlocked"], false);
    assert!(ts(&unblocked.body["lastSeen"]) >= ts(&blocked.body["lastSeen"]));
    assert_eq!(unblocked.body["name"], "Test");
}

#[tokio::test]
async fn create_forces_counters_and_assigns_increasing_ids() {
    let harness = TestHarness::start().await.unwrap();

    let mut body = device_body("Laptop", "192.168.1.20", "00:AA:BB:CC:DD:EE");
    body["downloadUsage"] = json!(123_456);
    body["uploadUsage"] = json!(42);
    body["id"] = json!(77);
    let first = harness.post("/api/devices", Some(body)).await.unwrap();
    assert_eq!(first.body["downloadUsage"], 0);
    assert_eq!(first.body["uploadUsage"], 0);
    assert_eq!(first.body["id"], 1);

    let second = harness
        .post("/api/devices", Some(device_body("Phone", "192.168.1.21", "00:AA:BB:CC:DD:EF")))
        .await
        .unwrap();
    assert_eq!(second.body["id"], 2);

    let listed = harness.get("/api/devices").await.unwrap();
    let ids: Vec<i64> = listed.body.as_array().unwrap().iter().map(|d| d["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn malformed_create_is_rejected_with_400() {
    let harness = TestHarness::start().await.unwrap();

    let missing_mac = harness
        .post("/api/devices", Some(json!({ "name": "x", "ipAddress": "10.0.0.9" })))
        .await
        .unwrap();
    assert_eq!(missing_mac.status, 400);
    assert_eq!(missing_mac.body["error"], "Invalid device data");

    let wrong_type = harness
        .post("/api/devices", Some(json!({ "name": "x", "ipAddress": "10.0.0.9", "macAddress": "m", "isBlocked": "yes" })))
        .await
        .unwrap();
    assert_eq!(wrong_type.status, 400);

    let broken = harness.send_raw_json(Method::POST, "/api/devices", "{ not json").await.unwrap();
    assert_eq!(broken.status, 400);

    assert_eq!(harness.storage.list_devices().unwrap().len(), 0);
}

#[tokio::test]
async fn patch_merges_and_reports_errors() {
    let harness = TestHarness::start().await.unwrap();
    harness
        .post("/api/devices", Some(device_body("TV", "192.168.1.50", "11:22:33:44:55:66")))
        .await
        .unwrap();

    let patched = harness.patch("/api/devices/1", json!({ "isBlocked": true })).await.unwrap();
    assert_eq!(patched.status, 200);
    assert_eq!(patched.body["isBlocked"], true);
    assert_eq!(patched.body["name"], "TV");
    assert_eq!(patched.body["ipAddress"], "192.168.1.50");
    assert_eq!(patched.body["macAddress"], "11:22:33:44:55:66");
    assert_eq!(patched.body["downloadUsage"], 0);

    let renamed = harness.patch("/api/devices/1", json!({ "id": 9, "name": "Living room TV" })).await.unwrap();
    assert_eq!(renamed.body["id"], 1);
    assert_eq!(renamed.body["name"], "Living room TV");
    assert_eq!(renamed.body["isBlocked"], true);

    let bad_id = harness.patch("/api/devices/abc", json!({ "isBlocked": true })).await.unwrap();
    assert_eq!(bad_id.status, 400);
    assert_eq!(bad_id.body["error"], "Invalid device ID");

    let missing = harness.patch("/api/devices/404", json!({ "isBlocked": true })).await.unwrap();
    assert_eq!(missing.status, 404);
    assert_eq!(missing.body["error"], "Device not found");

    let bad_body = harness.patch("/api/devices/1", json!({ "isOnline": "sometimes" })).await.unwrap();
    assert_eq!(bad_body.status, 400);
}

#[tokio::test]
async fn get_and_toggle_unknown_device() {
    let harness = TestHarness::start().await.unwrap();

    assert_eq!(harness.get("/api/devices/12").await.unwrap().status, 404);
    assert_eq!(harness.get("/api/devices/nope").await.unwrap().status, 400);
    assert_eq!(harness.post("/api/devices/12/toggle-block", None).await.unwrap().status, 404);
    assert_eq!(harness.post("/api/devices/x/toggle-block", None).await.unwrap().status, 400);
}

#[tokio::test]
async fn cold_start_stats_are_synthesized() {
    let harness = TestHarness::start().await.unwrap();
    harness.storage.create_device(NewDevice::new("a", "10.0.0.1", "00:00:00:00:00:01")).unwrap();

    let reply = harness.get("/api/network/stats").await.unwrap();
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body["downloadSpeed"], 100_000_000);
    assert_eq!(reply.body["uploadSpeed"], 50_000_000);
    assert_eq!(reply.body["connectedDevices"], 1);
    // le harness démarre à 20h
    assert_eq!(reply.body["peakHourUsage"], true);

    let again = harness.get("/api/network/stats").await.unwrap();
    assert_eq!(again.body["id"], reply.body["id"]);
}

#[tokio::test]
async fn baseline_insertion_is_announced_once() {
    let harness = TestHarness::start().await.unwrap();
    let mut changes = harness.changes();

    harness.get("/api/network/stats").await.unwrap();
    assert_eq!(changes.try_recv().unwrap(), ChangeEvent::Update);

    harness.get("/api/network/stats").await.unwrap();
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn unstorable_patch_is_rejected_and_nothing_changes() {
    let harness = TestHarness::start().await.unwrap();
    let created = harness
        .post("/api/devices", Some(device_body("Test", "10.0.0.5", "AA:BB:CC:DD:EE:00")))
        .await
        .unwrap();
    let mut changes = harness.changes();

    let huge = harness
        .patch("/api/devices/1", json!({ "downloadUsage": u64::MAX, "isBlocked": true }))
        .await
        .unwrap();
    assert_eq!(huge.status, 400);
    assert_eq!(huge.body["error"], "Invalid device data");

    let far_future = harness
        .patch("/api/devices/1", json!({ "lastSeen": "9999-12-31T23:59:59Z" }))
        .await
        .unwrap();
    assert_eq!(far_future.status, 400);

    assert!(changes.try_recv().is_err());
    let reread = harness.get("/api/devices/1").await.unwrap();
    assert_eq!(reread.body, created.body);
}

#[tokio::test]
async fn history_only_keeps_the_last_24_hours() {
    let harness = TestHarness::start().await.unwrap();
    let notifier = RecordingNotifier::new();
    let sampler = FixedSampler::default();

    let first = sample_once(harness.storage.as_ref(), &notifier, &sampler).unwrap();
    harness.clock.advance(time::Duration::hours(6)); // 02:00, hors pointe
    let second = sample_once(harness.storage.as_ref(), &notifier, &sampler).unwrap();
    assert!(!second.peak_hour_usage);
    harness.clock.advance(time::Duration::hours(19));
    let third = sample_once(harness.storage.as_ref(), &notifier, &sampler).unwrap();
    assert_eq!(notifier.published(), 3);

    let history = harness.get("/api/network/history").await.unwrap();
    let ids: Vec<i64> = history.body.as_array().unwrap().iter().map(|s| s["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![second.id, third.id]);
    assert!(!ids.contains(&first.id));

    let latest = harness.get("/api/network/stats").await.unwrap();
    assert_eq!(latest.body["id"], third.id);
    assert_eq!(latest.body["downloadSpeed"], 150_000_000);
}

#[tokio::test]
async fn mutations_publish_change_events() {
    let harness = TestHarness::start().await.unwrap();
    let mut changes = harness.changes();

    harness
        .post("/api/devices", Some(device_body("Test", "10.0.0.5", "AA:BB:CC:DD:EE:00")))
        .await
        .unwrap();
    assert_eq!(changes.try_recv().unwrap(), ChangeEvent::Update);

    harness.patch("/api/devices/1", json!({ "name": "Renamed" })).await.unwrap();
    assert_eq!(changes.try_recv().unwrap(), ChangeEvent::Update);

    harness.post("/api/devices/1/toggle-block", None).await.unwrap();
    assert_eq!(changes.try_recv().unwrap(), ChangeEvent::Update);

    // lectures et échecs : aucune annonce
    harness.get("/api/devices").await.unwrap();
    harness.patch("/api/devices/99", json!({ "name": "ghost" })).await.unwrap();
    harness.post("/api/devices", Some(json!({}))).await.unwrap();
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn websocket_clients_receive_update_markers() {
    let harness = TestHarness::start().await.unwrap();
    let (mut socket, _) = tokio_tungstenite::connect_async(harness.ws_url()).await.unwrap();

    // attendre que le serveur ait abonné la connexion
    for _ in 0..50 {
        if harness.notifier.subscriber_count() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(harness.notifier.subscriber_count(), 1);

    harness
        .post("/api/devices", Some(device_body("Test", "10.0.0.5", "AA:BB:CC:DD:EE:00")))
        .await
        .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .expect("no frame before timeout")
        .expect("socket closed")
        .unwrap();
    match frame {
        Message::Text(text) => {
            let marker: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(marker, json!({ "type": "update" }));
        }
        other => panic!("unexpected frame: {other:?}"),
    }
}

#[tokio::test]
async fn api_key_guards_everything_but_health() {
    let harness = TestHarness::start_with_api_key(Some("s3cret")).await.unwrap();

    assert_eq!(harness.get("/health").await.unwrap().status, 200);
    assert_eq!(harness.get("/api/devices").await.unwrap().status, 401);

    let wrong = harness
        .send(harness.request(Method::GET, "/api/devices").header("x-api-key", "guess"))
        .await
        .unwrap();
    assert_eq!(wrong.status, 401);

    let ok = harness
        .send(harness.request(Method::GET, "/api/devices").header("x-api-key", "s3cret"))
        .await
        .unwrap();
    assert_eq!(ok.status, 200);
}

#[tokio::test]
async fn system_health_reports_store_counters() {
    let harness = TestHarness::start().await.unwrap();
    harness.post("/api/devices", Some(device_body("a", "10.0.0.1", "00:00:00:00:00:01"))).await.unwrap();
    harness.get("/api/network/stats").await.unwrap();

    let health = harness.get("/system/health").await.unwrap();
    assert_eq!(health.status, 200);
    assert_eq!(health.body["storage_backend"], "memory");
    assert_eq!(health.body["devices_tracked"], 1);
    assert_eq!(health.body["stats_retained"], 1);
}
