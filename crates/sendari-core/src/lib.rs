// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Sendari gateway.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Sendari workspace. The transport and
//! notifier seams defined here are what the session lifecycle manager and
//! dispatch scheduler are written against.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::SendariError;
pub use traits::{Notifier, Transport, TransportConnection, TransportFactory};
pub use types::{
    ConnectionState, DeviceKey, MessageClass, MessageStatus, Notification, QuotaPolicy,
};
