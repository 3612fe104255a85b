use std::sync::Arc;

use teloxide::prelude::*;
use tracing::debug;

use zcb_core::{
    dispatcher::start_reply,
    domain::PostAction,
    meeting::StartRequest,
    telemetry::StartSource,
};

use crate::router::AppState;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let Some(action) = q.data.as_deref().and_then(PostAction::decode) else {
        let _ = bot.answer_callback_query(cb_id).await;
        return Ok(());
    };

    // Answer right away; starting a meeting can take longer than Telegram's
    // callback timeout.
    let _ = bot.answer_callback_query(cb_id).await;

    // Prompts are one-shot: drop the keyboard so a second press can't start
    // a second meeting.
    if let Some(message) = q.message.as_ref() {
        if let Err(e) = bot
            .edit_message_reply_markup(message.chat.id, message.id)
            .await
        {
            debug!(error = %e, "failed to clear prompt keyboard");
        }
    }

    let user = state.platform.remember_user(&q.from);
    let user_id = user.id;
    debug!(user_id = %user_id, action = %action.encode(), "prompt answered");

    let (channel_id, result) = match action {
        PostAction::UsePmi {
            channel_id,
            use_pmi,
        } => (
            channel_id,
            state
                .meetings
                .start_with_choice(&user, channel_id, use_pmi)
                .await,
        ),
        PostAction::StartNew { channel_id } => (
            channel_id,
            state
                .meetings
                .start(StartRequest {
                    user,
                    channel_id,
                    root_id: None,
                    topic: String::new(),
                    source: StartSource::Confirm,
                    force: true,
                })
                .await,
        ),
    };

    state
        .commands
        .deliver(user_id, channel_id, start_reply(result, channel_id))
        .await;

    Ok(())
}
