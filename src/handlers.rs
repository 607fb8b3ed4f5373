use std::sync::Arc;
use teloxide::{prelude::*, types::Me};

use crate::agent::{BriefRequest, BriefingAgent};
use crate::auth::{self, OAuthFlow};
use crate::config::Config;
use crate::session::SessionStore;

/// Handler for /start command
pub async fn start_handler(bot: Bot, msg: Message, me: Me) -> ResponseResult<()> {
    let text = format!(
        "☀️ Hi! I'm {}, your personal morning brief.\n\n\
        Connect your Google account and I'll summarise today's calendar, \
        birthdays and unread emails for you.\n\n\
        1️⃣ /connect - Connect your Google account\n\
        2️⃣ /brief - Generate today's brief\n\
        /status - Connection status\n\
        /disconnect - Forget your Google connection\n\
        /help - Help",
        me.username()
    );

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Handler for /help command
pub async fn help_handler(bot: Bot, msg: Message) -> ResponseResult<()> {
    let text = "📖 How to use your Morning Brief:\n\n\
        1️⃣ Send /connect and open the link to authorise read-only access\n\
        2️⃣ After approving, your browser lands on a page whose address contains a code\n\
        3️⃣ Send /code followed by that address (or just the code)\n\
        4️⃣ Send /brief whenever you want today's summary\n\n\
        🔒 Permissions (read-only):\n\
        - Google Calendar\n\
        - Google Contacts (birthdays)\n\
        - Gmail (unread messages, subject and sender only)\n\n\
        Your connection is kept in memory only. Use /disconnect to drop it.";

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Handler for /status command
pub async fn status_handler(
    bot: Bot,
    msg: Message,
    config: Arc<Config>,
    sessions: SessionStore,
) -> ResponseResult<()> {
    let connection = match sessions.get(msg.chat.id).await {
        Some(session) => format!(
            "✅ Connected to Google services (since {})",
            session.connected_at.format("%Y-%m-%d %H:%M UTC")
        ),
        None => "❌ Not connected. Use /connect".to_string(),
    };

    let text = format!(
        "🤖 Status\n\n\
        {}\n\
        🧠 Decision process: {:?}\n\
        🔁 Step limit: {}\n\
        ⏱️ Per-source timeout: {}s",
        connection,
        config.ai_model.provider,
        config
            .briefing
            .max_steps
            .map(|n| n.to_string())
            .unwrap_or_else(|| "2 × tools".to_string()),
        config.briefing.tool_timeout_secs
    );

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Handler for /connect command
pub async fn connect_handler(
    bot: Bot,
    msg: Message,
    config: Arc<Config>,
    sessions: SessionStore,
) -> ResponseResult<()> {
    if sessions.get(msg.chat.id).await.is_some() {
        bot.send_message(
            msg.chat.id,
            "✅ Already connected to Google services. Use /disconnect first to switch account.",
        )
        .await?;
        return Ok(());
    }

    let state = sessions.begin_handshake(msg.chat.id).await;
    let flow = OAuthFlow::new(&config.google);
    match flow.authorization_url(&state) {
        Ok(url) => {
            log::info!("Authorization started for chat {}", msg.chat.id);
            bot.send_message(
                msg.chat.id,
                format!(
                    "🔐 Please authorise read-only access:\n\n{}\n\n\
                    When you're done, send /code followed by the address your browser landed on.",
                    url
                ),
            )
            .await?;
        }
        Err(e) => {
            log::error!("Failed to build authorization URL: {}", e);
            bot.send_message(msg.chat.id, e.user_message()).await?;
        }
    }

    Ok(())
}

/// Handler for /code command (completes the authorization handshake)
pub async fn code_handler(
    bot: Bot,
    msg: Message,
    input: String,
    config: Arc<Config>,
    sessions: SessionStore,
) -> ResponseResult<()> {
    let (code, state) = match auth::parse_redirect(&input) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::warn!("Authorization input rejected for chat {}: {}", msg.chat.id, e);
            bot.send_message(msg.chat.id, e.user_message()).await?;
            return Ok(());
        }
    };

    if !sessions.finish_handshake(msg.chat.id, state.as_deref()).await {
        bot.send_message(
            msg.chat.id,
            "❓ This code doesn't match an authorization started here. Use /connect to start again.",
        )
        .await?;
        return Ok(());
    }

    let flow = OAuthFlow::new(&config.google);
    match flow.exchange_code(&code).await {
        Ok(credential) => {
            sessions.connect(msg.chat.id, credential).await;
            bot.send_message(
                msg.chat.id,
                "✅ Connected to Google services! Send /brief to get today's brief.",
            )
            .await?;
        }
        Err(e) => {
            log::error!("Authorization failed for chat {}: {}", msg.chat.id, e);
            bot.send_message(msg.chat.id, e.user_message()).await?;
        }
    }

    Ok(())
}

/// Handler for /brief command
pub async fn brief_handler(
    bot: Bot,
    msg: Message,
    config: Arc<Config>,
    sessions: SessionStore,
) -> ResponseResult<()> {
    let Some(session) = sessions.get(msg.chat.id).await else {
        bot.send_message(
            msg.chat.id,
            "🔌 Connect your Google account first with /connect.",
        )
        .await?;
        return Ok(());
    };

    let ack_msg = bot
        .send_message(msg.chat.id, "🔍 Gathering your daily information...")
        .await?;

    let result = match BriefingAgent::from_config(&config, &session.credential) {
        Ok(agent) => agent.get_brief(&BriefRequest::today()).await,
        Err(e) => Err(e),
    };

    let _ = bot.delete_message(msg.chat.id, ack_msg.id).await;

    match result {
        Ok(brief) => {
            log::info!(
                "Brief generated for chat {} ({} tool call(s), partial={})",
                msg.chat.id,
                brief.transcript.len(),
                brief.is_partial()
            );
            let mut text = format!("☀️ Your Morning Brief\n\n{}", brief.text);
            if let Some(reason) = &brief.cut_short {
                text.push_str(&format!("\n\n{}", reason.user_message()));
            }
            bot.send_message(msg.chat.id, text).await?;
        }
        Err(e) => {
            log::error!("Brief failed for chat {}: {}", msg.chat.id, e);
            if e.clears_session() {
                sessions.disconnect(msg.chat.id).await;
            }
            bot.send_message(msg.chat.id, e.user_message()).await?;
        }
    }

    Ok(())
}

/// Handler for /disconnect command
pub async fn disconnect_handler(
    bot: Bot,
    msg: Message,
    sessions: SessionStore,
) -> ResponseResult<()> {
    let text = if sessions.disconnect(msg.chat.id).await {
        "👋 Disconnected from Google services."
    } else {
        "You're not connected. Use /connect to get started."
    };

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Handler for text messages (fallback)
pub async fn text_handler(bot: Bot, msg: Message) -> ResponseResult<()> {
    let text = "📝 I only understand commands.\n\n\
        Use /brief for today's summary, or /help for instructions.";

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}
