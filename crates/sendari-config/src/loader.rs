// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./sendari.toml` > `~/.config/sendari/sendari.toml` > `/etc/sendari/sendari.toml`
//! with environment variable overrides via `SENDARI_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::SendariConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/sendari/sendari.toml` (system-wide)
/// 3. `~/.config/sendari/sendari.toml` (user XDG config)
/// 4. `./sendari.toml` (local directory)
/// 5. `SENDARI_*` environment variables
pub fn load_config() -> Result<SendariConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SendariConfig::default()))
        .merge(Toml::file("/etc/sendari/sendari.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("sendari/sendari.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("sendari.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<SendariConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SendariConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<SendariConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SendariConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. For example, `SENDARI_DISPATCH_TICK_INTERVAL_SECS`
/// must map to `dispatch.tick_interval_secs`, not `dispatch.tick.interval.secs`.
fn env_provider() -> Env {
    Env::prefixed("SENDARI_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: SENDARI_DISPATCH_TICK_INTERVAL_SECS -> "dispatch_tick_interval_secs"
        let key_str = key.as_str();
        let mapped = ["gateway", "storage", "session", "dispatch", "retention"]
            .iter()
            .find_map(|section| {
                key_str
                    .strip_prefix(&format!("{section}_"))
                    .map(|rest| format!("{section}.{rest}"))
            })
            .unwrap_or_else(|| key_str.to_string());
        mapped.into()
    })
}
