// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound message hook.
//!
//! Connected sessions receive messages too: group chats can register or
//! unregister a delivery alias with `/register` / `/unregister`, and
//! keyword autoreply rules answer direct messages. Everything here is
//! best-effort; a failing handler never affects the session itself.

use std::sync::Arc;

use sendari_core::types::{DeviceKey, InboundMessage};
use sendari_core::SendariError;
use sendari_resilience::pacing;
use sendari_storage::queries::{autoreply, groups};
use tracing::{info, warn};

use crate::ident;
use crate::manager::SessionManager;

pub(crate) async fn handle(manager: &Arc<SessionManager>, key: &DeviceKey, msg: InboundMessage) {
    if manager.is_shutting_down() {
        return;
    }
    let text = msg.text.trim();
    if text.is_empty() {
        return;
    }
    let lower = text.to_lowercase();

    let outcome = if msg.is_group && lower == "/register" {
        handle_register(manager, key, &msg).await
    } else if msg.is_group && lower == "/unregister" {
        handle_unregister(manager, key, &msg).await
    } else {
        handle_autoreply(manager, key, &msg, &lower).await
    };

    if let Err(e) = outcome {
        warn!(key = %key, error = %e, "inbound handler error");
    }
}

async fn reply(
    manager: &Arc<SessionManager>,
    key: &DeviceKey,
    chat_id: &str,
    text: &str,
) -> Result<(), SendariError> {
    let transport = manager.transport_for(key.as_str()).ok_or_else(|| {
        SendariError::SessionUnavailable {
            key: key.to_string(),
            state: "no transport".to_string(),
        }
    })?;
    transport.send_text(chat_id, text).await.map(|_| ())
}

async fn handle_register(
    manager: &Arc<SessionManager>,
    key: &DeviceKey,
    msg: &InboundMessage,
) -> Result<(), SendariError> {
    match groups::find_by_underlying(manager.db(), &msg.chat_id, key.as_str()).await? {
        Some(existing) => {
            reply(
                manager,
                key,
                &msg.chat_id,
                &format!("Group already registered: {}", existing.alias),
            )
            .await
        }
        None => {
            let alias = ident::generate_alias();
            groups::register(manager.db(), &alias, &msg.chat_id, None, key.as_str()).await?;
            info!(key = %key, alias = alias.as_str(), chat = msg.chat_id.as_str(), "group registered");
            reply(
                manager,
                key,
                &msg.chat_id,
                &format!("Group registered: {alias}"),
            )
            .await
        }
    }
}

async fn handle_unregister(
    manager: &Arc<SessionManager>,
    key: &DeviceKey,
    msg: &InboundMessage,
) -> Result<(), SendariError> {
    let removed = groups::unregister(manager.db(), &msg.chat_id, key.as_str()).await?;
    let text = if removed {
        info!(key = %key, chat = msg.chat_id.as_str(), "group unregistered");
        "Group unregistered."
    } else {
        "This group is not registered."
    };
    reply(manager, key, &msg.chat_id, text).await
}

async fn handle_autoreply(
    manager: &Arc<SessionManager>,
    key: &DeviceKey,
    msg: &InboundMessage,
    lower: &str,
) -> Result<(), SendariError> {
    // Rules are strictly scoped to the session's device row; without a
    // resolved device id nothing matches.
    let device_id = match manager.get_session(key).and_then(|s| s.device_id) {
        Some(id) => id,
        None => return Ok(()),
    };

    let rules = manager.autoreply_rules().await;
    let rule = rules
        .iter()
        .find(|r| r.device_id == device_id && r.keyword.to_lowercase() == lower);
    let Some(rule) = rule else {
        return Ok(());
    };

    // Humanized pause so the reply doesn't look instantaneous.
    tokio::time::sleep(pacing::sample(&manager.config().autoreply_delay)).await;

    reply(manager, key, &msg.chat_id, &rule.response).await?;
    if let Err(e) = autoreply::record_use(manager.db(), rule.id).await {
        warn!(key = %key, rule = rule.id, error = %e, "failed to record autoreply use");
    }
    Ok(())
}
