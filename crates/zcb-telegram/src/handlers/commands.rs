use std::sync::Arc;

use teloxide::{prelude::*, types::ParseMode};
use tracing::debug;

use zcb_core::{
    command::CommandArgs,
    domain::{ChannelId, PostId},
};

use crate::{render::markdown_to_html, router::AppState};

const WELCOME_TEXT: &str = "Hi! Replies to your `/zoom` commands are delivered here. \
Add me to a group and use `/zoom start` to start a meeting, or `/zoom help` for more.";

/// Strip a `@botname` suffix from the command token. Returns `None` when the
/// command is addressed to a different bot.
pub fn normalize_command(text: &str, bot_username: &str) -> Option<String> {
    let text = text.trim();
    let (first, rest) = match text.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim_start()),
        None => (text, ""),
    };

    let command = match first.split_once('@') {
        Some((command, target)) if target.eq_ignore_ascii_case(bot_username) => command,
        Some(_) => return None,
        None => first,
    };

    if rest.is_empty() {
        Some(command.to_string())
    } else {
        Some(format!("{command} {rest}"))
    }
}

pub async fn handle_command(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    let Some(command) = msg
        .text()
        .and_then(|t| normalize_command(t, &state.bot_username))
    else {
        return Ok(());
    };
    let token = command.split_whitespace().next().unwrap_or("");

    if token == "/start" && msg.chat.is_private() {
        bot.send_message(msg.chat.id, markdown_to_html(WELCOME_TEXT))
            .parse_mode(ParseMode::Html)
            .await?;
        return Ok(());
    }
    if token != state.cfg.trigger {
        return Ok(());
    }

    let user = state.platform.remember_user(from);
    let args = CommandArgs {
        user_id: user.id,
        channel_id: ChannelId(msg.chat.id.0),
        root_id: msg
            .reply_to_message()
            .map(|m| PostId(i64::from(m.id.0))),
        command,
    };
    debug!(user_id = %args.user_id, channel_id = %args.channel_id, command = %args.command, "zoom command");

    state.commands.handle(&args).await;
    Ok(())
}
