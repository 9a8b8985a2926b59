// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Sendari integration tests.
//!
//! Provides a scripted mock transport, a capturing mock notifier, and a
//! harness of temp-database and sleep-free-config fixtures.

pub mod harness;
pub mod mock_notifier;
pub mod mock_transport;

pub use harness::{
    connect_session, seed_device, temp_db, test_config, test_dispatch_config, test_manager,
    test_session_config, wait_for,
};
pub use mock_notifier::MockNotifier;
pub use mock_transport::{MockTransport, MockTransportFactory};
