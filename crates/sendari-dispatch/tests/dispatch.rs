// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch pipeline tests: claims, quotas, pacing brakes, and recovery.

use std::time::Duration;

use sendari_core::types::{MessageClass, MessageStatus};
use sendari_dispatch::{maintenance, pipeline, DispatchScheduler};
use sendari_storage::queries::{devices, groups, messages};
use sendari_storage::Database;
use sendari_test_utils::{
    connect_session, seed_device, temp_db, test_dispatch_config, test_manager, MockNotifier,
    MockTransportFactory,
};

const WAIT: Duration = Duration::from_secs(5);

/// Insert `n` already-delivered rows for today, to preload the quota count.
async fn seed_counted(db: &Database, device_id: i64, n: i64) {
    db.connection()
        .call(move |conn| -> rusqlite::Result<()> {
            for i in 0..n {
                conn.execute(
                    "INSERT INTO messages (owner_id, device_id, class, recipient, body, status)
                     VALUES (1, ?1, 'personal', ?2, 'seed', 'sent')",
                    rusqlite::params![device_id, format!("s{i}")],
                )?;
            }
            Ok(())
        })
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn pending_message_reaches_sent_through_the_pipeline() {
    let (db, dir) = temp_db().await;
    let device = seed_device(&db, "dev-1", 0).await;
    let factory = MockTransportFactory::new();
    let manager = test_manager(db.clone(), factory.clone(), MockNotifier::new(), dir.path());
    connect_session(&manager, "dev-1", WAIT).await;

    let id = messages::enqueue(&db, 1, device.id, MessageClass::Personal, "628111", "hi", None)
        .await
        .unwrap();

    pipeline::process_session(&db, &manager, &test_dispatch_config(), &device, MessageClass::Personal)
        .await
        .unwrap();

    let msg = messages::get(&db, id).await.unwrap().unwrap();
    assert_eq!(msg.status, "sent");
    // The raw receipt payload is persisted alongside the status.
    assert!(msg.response.unwrap().contains("delivered"));
    assert_eq!(factory.handle("dev-1").unwrap().sent_count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn quota_blocks_claims_once_reached() {
    let (db, dir) = temp_db().await;
    let device = seed_device(&db, "dev-1", 5).await;
    let factory = MockTransportFactory::new();
    let manager = test_manager(db.clone(), factory.clone(), MockNotifier::new(), dir.path());
    connect_session(&manager, "dev-1", WAIT).await;

    // 5 rows already in non-pending status today; the device limit is 5.
    seed_counted(&db, device.id, 5).await;
    let sixth = messages::enqueue(&db, 1, device.id, MessageClass::Personal, "628111", "x", None)
        .await
        .unwrap();

    pipeline::process_session(&db, &manager, &test_dispatch_config(), &device, MessageClass::Personal)
        .await
        .unwrap();

    // The sixth message was neither claimed nor attempted.
    let msg = messages::get(&db, sixth).await.unwrap().unwrap();
    assert_eq!(msg.status, "pending");
    assert_eq!(factory.handle("dev-1").unwrap().sent_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn quota_boundary_is_exact_within_a_claimed_batch() {
    let (db, dir) = temp_db().await;
    let device = seed_device(&db, "dev-1", 250).await;
    let factory = MockTransportFactory::new();
    let manager = test_manager(db.clone(), factory.clone(), MockNotifier::new(), dir.path());
    connect_session(&manager, "dev-1", WAIT).await;

    // 248 of 250 used; 5 pending rows claimed in one batch.
    seed_counted(&db, device.id, 248).await;
    for i in 0..5 {
        messages::enqueue(
            &db,
            1,
            device.id,
            MessageClass::Personal,
            &format!("62811{i}"),
            "x",
            None,
        )
        .await
        .unwrap();
    }

    pipeline::process_session(&db, &manager, &test_dispatch_config(), &device, MessageClass::Personal)
        .await
        .unwrap();

    // Exactly two attempts fit under the 250 boundary.
    assert_eq!(factory.handle("dev-1").unwrap().sent_count(), 2);
    let today = sendari_storage::today();
    let sent = messages::count_with_status(&db, device.id, MessageStatus::Sent, &today)
        .await
        .unwrap();
    let processing =
        messages::count_with_status(&db, device.id, MessageStatus::Processing, &today)
            .await
            .unwrap();
    assert_eq!(sent, 2 + 248);
    assert_eq!(processing, 3, "unattempted claims stay processing");
}

#[tokio::test(flavor = "multi_thread")]
async fn three_consecutive_failures_abandon_the_batch() {
    let (db, dir) = temp_db().await;
    let device = seed_device(&db, "dev-1", 0).await;
    let factory = MockTransportFactory::new();
    let manager = test_manager(db.clone(), factory.clone(), MockNotifier::new(), dir.path());
    connect_session(&manager, "dev-1", WAIT).await;

    let handle = factory.handle("dev-1").unwrap();
    for i in 0..6 {
        let recipient = format!("62811{i}");
        if i < 3 {
            handle.error_recipient(&recipient);
        }
        messages::enqueue(&db, 1, device.id, MessageClass::Personal, &recipient, "x", None)
            .await
            .unwrap();
    }

    pipeline::process_session(&db, &manager, &test_dispatch_config(), &device, MessageClass::Personal)
        .await
        .unwrap();

    let today = sendari_storage::today();
    let failed = messages::count_with_status(&db, device.id, MessageStatus::Failed, &today)
        .await
        .unwrap();
    let processing =
        messages::count_with_status(&db, device.id, MessageStatus::Processing, &today)
            .await
            .unwrap();
    assert_eq!(failed, 3, "the three bad sends are failed");
    assert_eq!(processing, 3, "the rest of the batch is abandoned, not attempted");
    assert_eq!(handle.sent_count(), 0, "erroring sends never reached the wire");
}

#[tokio::test(flavor = "multi_thread")]
async fn single_failures_do_not_abort_the_batch() {
    let (db, dir) = temp_db().await;
    let device = seed_device(&db, "dev-1", 0).await;
    let factory = MockTransportFactory::new();
    let manager = test_manager(db.clone(), factory.clone(), MockNotifier::new(), dir.path());
    connect_session(&manager, "dev-1", WAIT).await;

    let handle = factory.handle("dev-1").unwrap();
    // Failures at positions 0, 2, 4 never become consecutive.
    for i in 0..6 {
        let recipient = format!("62811{i}");
        if i % 2 == 0 {
            handle.error_recipient(&recipient);
        }
        messages::enqueue(&db, 1, device.id, MessageClass::Personal, &recipient, "x", None)
            .await
            .unwrap();
    }

    pipeline::process_session(&db, &manager, &test_dispatch_config(), &device, MessageClass::Personal)
        .await
        .unwrap();

    let today = sendari_storage::today();
    let failed = messages::count_with_status(&db, device.id, MessageStatus::Failed, &today)
        .await
        .unwrap();
    let sent = messages::count_with_status(&db, device.id, MessageStatus::Sent, &today)
        .await
        .unwrap();
    assert_eq!(failed, 3);
    assert_eq!(sent, 3, "every interleaved good message still goes out");
}

#[tokio::test(flavor = "multi_thread")]
async fn group_alias_resolves_to_underlying_identifier() {
    let (db, dir) = temp_db().await;
    let device = seed_device(&db, "dev-1", 0).await;
    let factory = MockTransportFactory::new();
    let manager = test_manager(db.clone(), factory.clone(), MockNotifier::new(), dir.path());
    connect_session(&manager, "dev-1", WAIT).await;

    groups::register(&db, "OPS123", "7777@g.us", None, "dev-1")
        .await
        .unwrap();
    messages::enqueue(&db, 1, device.id, MessageClass::Group, "OPS123", "deploy done", None)
        .await
        .unwrap();

    pipeline::process_session(&db, &manager, &test_dispatch_config(), &device, MessageClass::Group)
        .await
        .unwrap();

    let sent = factory.handle("dev-1").unwrap().sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "7777@g.us", "alias resolved before sending");
}

#[tokio::test(flavor = "multi_thread")]
async fn unresolvable_alias_fails_without_aborting() {
    let (db, dir) = temp_db().await;
    let device = seed_device(&db, "dev-1", 0).await;
    let factory = MockTransportFactory::new();
    let manager = test_manager(db.clone(), factory.clone(), MockNotifier::new(), dir.path());
    connect_session(&manager, "dev-1", WAIT).await;

    let bad = messages::enqueue(&db, 1, device.id, MessageClass::Group, "NOPE99", "x", None)
        .await
        .unwrap();
    let good = messages::enqueue(&db, 1, device.id, MessageClass::Group, "8888@g.us", "y", None)
        .await
        .unwrap();

    pipeline::process_session(&db, &manager, &test_dispatch_config(), &device, MessageClass::Group)
        .await
        .unwrap();

    let bad_msg = messages::get(&db, bad).await.unwrap().unwrap();
    assert_eq!(bad_msg.status, "failed");
    assert!(bad_msg.response.unwrap().contains("unknown group alias"));

    // One alias failure is not the breaker threshold; the next message sends.
    let good_msg = messages::get(&db, good).await.unwrap().unwrap();
    assert_eq!(good_msg.status, "sent");
}

#[tokio::test(flavor = "multi_thread")]
async fn abandoned_claims_recover_through_the_requeue_job() {
    let (db, dir) = temp_db().await;
    let device = seed_device(&db, "dev-1", 0).await;
    let factory = MockTransportFactory::new();
    let manager = test_manager(db.clone(), factory.clone(), MockNotifier::new(), dir.path());
    connect_session(&manager, "dev-1", WAIT).await;

    let handle = factory.handle("dev-1").unwrap();
    for i in 0..4 {
        let recipient = format!("62811{i}");
        if i < 3 {
            handle.error_recipient(&recipient);
        }
        messages::enqueue(&db, 1, device.id, MessageClass::Personal, &recipient, "x", None)
            .await
            .unwrap();
    }

    pipeline::process_session(&db, &manager, &test_dispatch_config(), &device, MessageClass::Personal)
        .await
        .unwrap();

    let today = sendari_storage::today();
    assert_eq!(
        messages::count_with_status(&db, device.id, MessageStatus::Processing, &today)
            .await
            .unwrap(),
        1
    );

    // A zero-minute threshold requeues immediately; the next tick drains it.
    let requeued = maintenance::requeue_stale_processing(&db, 0).await.unwrap();
    assert_eq!(requeued, 1);

    pipeline::process_session(&db, &manager, &test_dispatch_config(), &device, MessageClass::Personal)
        .await
        .unwrap();
    assert_eq!(
        messages::count_with_status(&db, device.id, MessageStatus::Sent, &today)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn reaper_releases_removed_devices_and_cascades_deleted_ones() {
    let (db, dir) = temp_db().await;
    seed_device(&db, "dev-removed", 0).await;
    let deleted = seed_device(&db, "dev-deleted", 0).await;
    let orphan = messages::enqueue(&db, 1, deleted.id, MessageClass::Personal, "1", "x", None)
        .await
        .unwrap();

    let factory = MockTransportFactory::new();
    let manager = test_manager(db.clone(), factory.clone(), MockNotifier::new(), dir.path());
    connect_session(&manager, "dev-removed", WAIT).await;
    connect_session(&manager, "dev-deleted", WAIT).await;

    devices::update_status(&db, "dev-removed", sendari_core::types::DeviceStatus::Removed)
        .await
        .unwrap();
    devices::update_status(&db, "dev-deleted", sendari_core::types::DeviceStatus::Deleted)
        .await
        .unwrap();

    let reaped = maintenance::reap_removed_devices(&db, &manager).await.unwrap();
    assert_eq!(reaped, 1);
    assert!(!manager.is_connected("dev-removed"));

    let cascaded = maintenance::cascade_delete_devices(&db, &manager).await.unwrap();
    assert_eq!(cascaded, 1);
    assert!(devices::get_by_key(&db, "dev-deleted").await.unwrap().is_none());
    assert!(messages::get(&db, orphan).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn scheduler_stops_within_the_grace_period() {
    let (db, dir) = temp_db().await;
    let factory = MockTransportFactory::new();
    let manager = test_manager(db.clone(), factory, MockNotifier::new(), dir.path());

    let scheduler = DispatchScheduler::new(
        db,
        manager,
        test_dispatch_config(),
        sendari_config::model::RetentionConfig::default(),
    );
    scheduler.init_crons();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let stopped = tokio::time::timeout(Duration::from_secs(5), scheduler.stop()).await;
    assert!(stopped.is_ok(), "stop must complete within the grace period");
}
