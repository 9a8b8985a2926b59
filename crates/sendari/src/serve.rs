// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `sendari serve` command implementation.
//!
//! Wires storage, the session lifecycle manager, and the dispatch
//! scheduler together, restores persisted sessions, and runs until a
//! shutdown signal arrives. Shutdown order matters: scheduler timers stop
//! first so no new ticks start, in-flight ticks get a bounded grace
//! period, then every live connection is closed gracefully (credentials
//! kept), and only then is the store released.

use sendari_config::SendariConfig;
use sendari_core::SendariError;
use sendari_dispatch::DispatchScheduler;
use sendari_session::SessionManager;
use sendari_storage::Database;
use tracing::info;

use crate::notify::BroadcastNotifier;
use crate::shutdown;
use crate::transport::LoopbackTransportFactory;

/// Runs the `sendari serve` command.
pub async fn run_serve(config: SendariConfig) -> Result<(), SendariError> {
    init_tracing(&config.gateway.log_level);

    info!(gateway = config.gateway.name.as_str(), "starting sendari serve");

    let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;

    let notifier = BroadcastNotifier::new(256);
    let factory = LoopbackTransportFactory::new();
    let manager = SessionManager::new(
        db.clone(),
        factory,
        notifier,
        config.session.clone(),
    );

    manager.init_sessions().await?;

    let scheduler = DispatchScheduler::new(
        db.clone(),
        manager.clone(),
        config.dispatch.clone(),
        config.retention.clone(),
    );
    scheduler.init_crons();

    info!("sendari gateway running");

    let cancel = shutdown::install_signal_handler();
    cancel.cancelled().await;

    // Ordered teardown: scheduler -> sessions -> store.
    scheduler.stop().await;
    manager.close_all().await;
    db.close().await?;

    info!("sendari shut down cleanly");
    Ok(())
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sendari={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
