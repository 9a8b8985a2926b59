// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query operations, grouped by entity.

pub mod autoreply;
pub mod devices;
pub mod groups;
pub mod messages;
