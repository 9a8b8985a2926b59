// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle tests for the session manager, driven through the mock
//! transport factory.

use std::time::Duration;

use sendari_core::types::{ConnectionState, DeviceKey, InboundMessage, TransportEvent};
use sendari_session::SessionManager;
use sendari_storage::queries::{autoreply, devices, groups};
use sendari_test_utils::{
    connect_session, seed_device, temp_db, test_manager, test_session_config, wait_for,
    MockNotifier, MockTransportFactory,
};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test(flavor = "multi_thread")]
async fn rapid_repeated_create_opens_a_single_connection() {
    let (db, dir) = temp_db().await;
    seed_device(&db, "dev-1", 0).await;
    let factory = MockTransportFactory::new();
    // Hold connects open long enough for the second create to race the first.
    factory.set_connect_delay(Duration::from_millis(100));
    let manager = test_manager(db, factory.clone(), MockNotifier::new(), dir.path());

    let key = DeviceKey("dev-1".into());
    tokio::join!(
        manager.create_session(&key),
        manager.create_session(&key),
        manager.create_session(&key),
    );

    assert!(wait_for(WAIT, || manager.is_connected("dev-1")).await);
    assert_eq!(
        factory.connect_count("dev-1"),
        1,
        "concurrent creates must collapse into one connection"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn connected_transition_persists_identity_and_notifies() {
    let (db, dir) = temp_db().await;
    seed_device(&db, "dev-1", 0).await;
    let factory = MockTransportFactory::new();
    let notifier = MockNotifier::new();
    let manager = test_manager(db.clone(), factory, notifier.clone(), dir.path());

    connect_session(&manager, "dev-1", WAIT).await;

    let snapshot = manager.get_session(&DeviceKey("dev-1".into())).unwrap();
    assert_eq!(snapshot.state, ConnectionState::Connected);
    assert_eq!(snapshot.reconnect_attempts, 0);
    assert!(snapshot.device_id.is_some(), "device row must be cached");

    let device = devices::get_by_key(&db, "dev-1").await.unwrap().unwrap();
    assert_eq!(device.status, "connected");
    // Identity resolved from the mock jid `dev-1@mock.net`.
    assert_eq!(device.phone.as_deref(), Some("dev-1"));

    assert_eq!(
        notifier.connection_statuses(),
        vec![("dev-1".to_string(), true)]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn qr_challenge_renders_artifact_with_debounce() {
    let (db, dir) = temp_db().await;
    seed_device(&db, "dev-1", 0).await;
    let factory = MockTransportFactory::new().manual_handshake();
    let notifier = MockNotifier::new();
    let mut config = test_session_config(dir.path());
    config.qr_debounce_secs = 60;
    let manager = SessionManager::new(db, factory.clone(), notifier.clone(), config);

    let key = DeviceKey("dev-1".into());
    manager.create_session(&key).await;
    let handle = factory.handle("dev-1").unwrap();

    handle
        .emit(TransportEvent::QrChallenge("payload-1".into()))
        .await;
    assert!(wait_for(WAIT, || !notifier.qr_updates().is_empty()).await);

    let snapshot = manager.get_session(&key).unwrap();
    assert_eq!(snapshot.state, ConnectionState::QrPending);
    let artifact = snapshot.qr_artifact.expect("artifact path");
    assert!(std::path::Path::new(&artifact).exists());

    // A second challenge inside the debounce window is suppressed.
    handle
        .emit(TransportEvent::QrChallenge("payload-2".into()))
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(notifier.qr_updates().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn terminal_logout_parks_the_session_without_reconnect() {
    let (db, dir) = temp_db().await;
    seed_device(&db, "dev-1", 0).await;
    let factory = MockTransportFactory::new();
    let manager = test_manager(db.clone(), factory.clone(), MockNotifier::new(), dir.path());

    connect_session(&manager, "dev-1", WAIT).await;
    let handle = factory.handle("dev-1").unwrap();
    handle.emit(TransportEvent::LoggedOut).await;

    let key = DeviceKey("dev-1".into());
    assert!(
        wait_for(WAIT, || {
            manager
                .get_session(&key)
                .map(|s| s.state == ConnectionState::LoggedOut)
                .unwrap_or(false)
        })
        .await
    );

    // Still queryable, with a diagnostic, and excluded from reconnects.
    let snapshot = manager.get_session(&key).unwrap();
    assert!(snapshot.last_error.is_some());
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(factory.connect_count("dev-1"), 1, "no automatic reconnect");

    let device = devices::get_by_key(&db, "dev-1").await.unwrap().unwrap();
    assert_eq!(device.status, "disconnected");
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_drop_reconnects_with_backoff() {
    let (db, dir) = temp_db().await;
    seed_device(&db, "dev-1", 0).await;
    let factory = MockTransportFactory::new();
    let manager = test_manager(db, factory.clone(), MockNotifier::new(), dir.path());

    connect_session(&manager, "dev-1", WAIT).await;
    let handle = factory.handle("dev-1").unwrap();
    handle
        .emit(TransportEvent::Disconnected {
            reason: "stream error".into(),
        })
        .await;

    assert!(
        wait_for(WAIT, || factory.connect_count("dev-1") == 2).await,
        "a transient drop must trigger exactly one reconnect"
    );
    assert!(wait_for(WAIT, || manager.is_connected("dev-1")).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn setup_failure_is_recorded_and_retried() {
    let (db, dir) = temp_db().await;
    seed_device(&db, "dev-1", 0).await;
    let factory = MockTransportFactory::new();
    factory.fail_connects("dev-1");
    let manager = test_manager(db.clone(), factory.clone(), MockNotifier::new(), dir.path());

    let key = DeviceKey("dev-1".into());
    manager.create_session(&key).await;

    let snapshot = manager.get_session(&key).unwrap();
    assert_eq!(snapshot.state, ConnectionState::Error);
    assert!(snapshot.last_error.is_some());
    let device = devices::get_by_key(&db, "dev-1").await.unwrap().unwrap();
    assert_eq!(device.status, "error");

    // Clear the fault: the scheduled backoff retry brings the session up.
    factory.clear_connect_failure("dev-1");
    assert!(wait_for(WAIT, || manager.is_connected("dev-1")).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn init_sessions_restores_only_folders_with_credentials() {
    let (db, dir) = temp_db().await;
    seed_device(&db, "dev-good", 0).await;
    seed_device(&db, "dev-bad", 0).await;

    let factory = MockTransportFactory::new();
    let manager = test_manager(db.clone(), factory.clone(), MockNotifier::new(), dir.path());

    let sessions = dir.path().join("sessions");
    std::fs::create_dir_all(sessions.join("dev-good")).unwrap();
    std::fs::write(sessions.join("dev-good/creds.json"), "{}").unwrap();
    std::fs::create_dir_all(sessions.join("dev-bad")).unwrap();

    manager.init_sessions().await.unwrap();

    assert!(wait_for(WAIT, || manager.is_connected("dev-good")).await);
    assert_eq!(factory.connect_count("dev-bad"), 0);
    let bad = devices::get_by_key(&db, "dev-bad").await.unwrap().unwrap();
    assert_eq!(bad.status, "error");
}

#[tokio::test(flavor = "multi_thread")]
async fn remove_session_releases_transport_and_credentials() {
    let (db, dir) = temp_db().await;
    seed_device(&db, "dev-1", 0).await;
    let factory = MockTransportFactory::new();
    let manager = test_manager(db.clone(), factory.clone(), MockNotifier::new(), dir.path());

    connect_session(&manager, "dev-1", WAIT).await;
    let cred_dir = dir.path().join("sessions/dev-1");
    assert!(cred_dir.exists());

    let key = DeviceKey("dev-1".into());
    manager.remove_session(&key, true).await;

    assert!(manager.get_session(&key).is_none());
    assert!(factory.handle("dev-1").unwrap().is_closed());
    assert!(!cred_dir.exists());
    let device = devices::get_by_key(&db, "dev-1").await.unwrap().unwrap();
    assert_eq!(device.status, "removed");
}

#[tokio::test(flavor = "multi_thread")]
async fn close_all_keeps_credentials_and_marks_disconnected() {
    let (db, dir) = temp_db().await;
    seed_device(&db, "dev-1", 0).await;
    let factory = MockTransportFactory::new();
    let manager = test_manager(db.clone(), factory.clone(), MockNotifier::new(), dir.path());

    connect_session(&manager, "dev-1", WAIT).await;
    manager.close_all().await;

    assert!(factory.handle("dev-1").unwrap().is_closed());
    assert!(dir.path().join("sessions/dev-1").exists(), "credentials kept");
    let device = devices::get_by_key(&db, "dev-1").await.unwrap().unwrap();
    assert_eq!(device.status, "disconnected");
}

#[tokio::test(flavor = "multi_thread")]
async fn send_text_requires_every_recipient_to_deliver() {
    let (db, dir) = temp_db().await;
    seed_device(&db, "dev-1", 0).await;
    let factory = MockTransportFactory::new();
    let manager = test_manager(db, factory.clone(), MockNotifier::new(), dir.path());

    connect_session(&manager, "dev-1", WAIT).await;
    let handle = factory.handle("dev-1").unwrap();
    handle.fail_recipient("222");

    let key = DeviceKey("dev-1".into());
    let receipt = manager.send_text(&key, "111, 222", "hello").await.unwrap();
    assert_eq!(receipt.results.len(), 2);
    assert!(!receipt.all_delivered());

    let receipt = manager.send_text(&key, "111,333", "hello").await.unwrap();
    assert!(receipt.all_delivered());
}

#[tokio::test(flavor = "multi_thread")]
async fn inbound_register_creates_alias_and_replies() {
    let (db, dir) = temp_db().await;
    seed_device(&db, "dev-1", 0).await;
    let factory = MockTransportFactory::new();
    let manager = test_manager(db.clone(), factory.clone(), MockNotifier::new(), dir.path());

    connect_session(&manager, "dev-1", WAIT).await;
    let handle = factory.handle("dev-1").unwrap();
    handle
        .emit(TransportEvent::Inbound(InboundMessage {
            chat_id: "777@g.us".into(),
            sender: None,
            text: "/register".into(),
            is_group: true,
        }))
        .await;

    let mut registered = false;
    for _ in 0..100 {
        if groups::find_by_underlying(&db, "777@g.us", "dev-1")
            .await
            .unwrap()
            .is_some()
        {
            registered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(registered, "alias mapping should be created");

    // The confirmation reply went back into the group chat.
    assert!(
        wait_for(WAIT, || handle
            .sent_messages()
            .iter()
            .any(|(to, body)| to == "777@g.us" && body.contains("Group registered")))
        .await
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn inbound_keyword_triggers_autoreply_for_matching_device() {
    let (db, dir) = temp_db().await;
    let device = seed_device(&db, "dev-1", 0).await;
    autoreply::create(&db, 1, device.id, "ping", "pong!")
        .await
        .unwrap();

    let factory = MockTransportFactory::new();
    let manager = test_manager(db.clone(), factory.clone(), MockNotifier::new(), dir.path());

    connect_session(&manager, "dev-1", WAIT).await;
    manager.refresh_autoreply_cache().await;

    let handle = factory.handle("dev-1").unwrap();
    handle
        .emit(TransportEvent::Inbound(InboundMessage {
            chat_id: "628555@mock.net".into(),
            sender: Some("628555".into()),
            text: "PING".into(),
            is_group: false,
        }))
        .await;

    assert!(
        wait_for(WAIT, || handle
            .sent_messages()
            .iter()
            .any(|(to, body)| to == "628555@mock.net" && body == "pong!"))
        .await
    );

    // Unknown keywords stay silent.
    let before = handle.sent_count();
    handle
        .emit(TransportEvent::Inbound(InboundMessage {
            chat_id: "628555@mock.net".into(),
            sender: Some("628555".into()),
            text: "hello there".into(),
            is_group: false,
        }))
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.sent_count(), before);
}
