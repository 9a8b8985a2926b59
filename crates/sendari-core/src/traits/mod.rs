// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the gateway core and its external collaborators.

pub mod notifier;
pub mod transport;

pub use notifier::Notifier;
pub use transport::{Transport, TransportConnection, TransportFactory};
