// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as ordered delay ranges, a sane operational hour
//! window, and non-empty paths.

use sendari_core::types::DelayRange;

use crate::model::SendariConfig;
use crate::ConfigError;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &SendariConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.session.session_dir.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "session.session_dir must not be empty".to_string(),
        });
    }

    if config.session.init_concurrency == 0 {
        errors.push(ConfigError::Validation {
            message: "session.init_concurrency must be at least 1".to_string(),
        });
    }

    if !(0.0..=1.0).contains(&config.session.reconnect_jitter) {
        errors.push(ConfigError::Validation {
            message: format!(
                "session.reconnect_jitter must be within 0.0-1.0, got {}",
                config.session.reconnect_jitter
            ),
        });
    }

    if config.session.reconnect_base_delay_ms > config.session.reconnect_max_delay_ms {
        errors.push(ConfigError::Validation {
            message: format!(
                "session.reconnect_base_delay_ms ({}) exceeds reconnect_max_delay_ms ({})",
                config.session.reconnect_base_delay_ms, config.session.reconnect_max_delay_ms
            ),
        });
    }

    let hours = (config.dispatch.active_hours_start, config.dispatch.active_hours_end);
    if hours.0 >= hours.1 || hours.1 > 24 {
        errors.push(ConfigError::Validation {
            message: format!(
                "dispatch operational window {}-{} is not a valid hour range",
                hours.0, hours.1
            ),
        });
    }

    if config.dispatch.tick_interval_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatch.tick_interval_secs must be at least 1".to_string(),
        });
    }

    if config.dispatch.daily_limit_default <= 0 {
        errors.push(ConfigError::Validation {
            message: format!(
                "dispatch.daily_limit_default must be positive, got {}",
                config.dispatch.daily_limit_default
            ),
        });
    }

    if config.dispatch.claim_batch_size <= 0 || config.dispatch.session_page_size <= 0 {
        errors.push(ConfigError::Validation {
            message: "dispatch batch and page sizes must be positive".to_string(),
        });
    }

    if config.dispatch.failure_threshold == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatch.failure_threshold must be at least 1".to_string(),
        });
    }

    if config.dispatch.micro_sleep_every == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatch.micro_sleep_every must be at least 1".to_string(),
        });
    }

    for (name, range) in [
        ("session.autoreply_delay", &config.session.autoreply_delay),
        ("dispatch.message_delay", &config.dispatch.message_delay),
        ("dispatch.session_delay", &config.dispatch.session_delay),
        ("dispatch.micro_sleep", &config.dispatch.micro_sleep),
    ] {
        check_range(name, range, &mut errors);
    }

    for (name, schedule) in [
        ("retention.purge_schedule", &config.retention.purge_schedule),
        ("retention.life_schedule", &config.retention.life_schedule),
        ("retention.warning_schedule", &config.retention.warning_schedule),
    ] {
        if schedule.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("{name} must not be empty"),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_range(name: &str, range: &DelayRange, errors: &mut Vec<ConfigError>) {
    if range.min_ms > range.max_ms {
        errors.push(ConfigError::Validation {
            message: format!(
                "{name}: min_ms ({}) exceeds max_ms ({})",
                range.min_ms, range.max_ms
            ),
        });
    }
}
