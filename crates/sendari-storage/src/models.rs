// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types are defined in `sendari-core::types` for use across
//! trait boundaries. This module re-exports them for convenience within the
//! storage crate.

pub use sendari_core::types::{AutoreplyRule, Device, GroupAlias, QueuedMessage};
