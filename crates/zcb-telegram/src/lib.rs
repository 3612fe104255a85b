//! Telegram adapter (teloxide).
//!
//! Implements the `zcb-core` ChatPlatform port over the Telegram Bot API and
//! routes `/zoom` commands and button presses into the core.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::{
    prelude::*,
    types::{ChatMemberKind, Message, ParseMode},
};
use tokio::time::sleep;

pub mod handlers;
pub mod history;
pub mod render;
pub mod router;
pub mod users;

use zcb_core::{
    config::Config,
    domain::{ChannelId, Post, PostId, User, UserId},
    errors::Error,
    ports::ChatPlatform,
    Result,
};

use crate::{history::PostHistory, users::UserDirectory};

pub struct TelegramPlatform {
    bot: Bot,
    history: PostHistory,
    users: UserDirectory,
}

impl TelegramPlatform {
    pub fn new(bot: Bot, cfg: Arc<Config>) -> Self {
        Self {
            bot,
            history: PostHistory::new(cfg.history_size),
            users: UserDirectory::new(cfg),
        }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    /// Cache the sender of an update and return their profile.
    pub fn remember_user(&self, user: &teloxide::types::User) -> User {
        self.users.remember(user)
    }

    fn tg_chat(channel_id: ChannelId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(channel_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Platform(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(teloxide::RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    sleep(d).await;
                }
                Err(other) => return Err(Self::map_err(other)),
            }
        }
    }

    async fn send(
        &self,
        chat: teloxide::types::ChatId,
        post: &Post,
        reply_to: Option<PostId>,
    ) -> Result<Message> {
        let html = render::post_html(post);
        let keyboard = render::keyboard(post);
        self.with_retry(|| {
            let mut req = self
                .bot
                .send_message(chat, html.clone())
                .parse_mode(ParseMode::Html)
                .disable_web_page_preview(true);
            if let Some(markup) = keyboard.clone() {
                req = req.reply_markup(markup);
            }
            if let Some(root) = reply_to.and_then(reply_target) {
                req = req
                    .reply_to_message_id(root)
                    .allow_sending_without_reply(true);
            }
            req
        })
        .await
    }
}

/// Telegram message ids are `i32`; anything outside that range can't be a
/// thread root, so the post goes out unthreaded.
fn reply_target(root: PostId) -> Option<teloxide::types::MessageId> {
    i32::try_from(root.0).ok().map(teloxide::types::MessageId)
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    async fn get_user(&self, user_id: UserId) -> Result<User> {
        self.users
            .get(user_id)
            .ok_or_else(|| Error::NotFound(format!("telegram user {user_id}")))
    }

    async fn is_channel_member(&self, channel_id: ChannelId, user_id: UserId) -> Result<bool> {
        // Private chat with the bot.
        if channel_id.0 == user_id.0 {
            return Ok(true);
        }
        let member = self
            .with_retry(|| {
                self.bot.get_chat_member(
                    Self::tg_chat(channel_id),
                    teloxide::types::UserId(user_id.0 as u64),
                )
            })
            .await?;
        Ok(!matches!(
            member.kind,
            ChatMemberKind::Left | ChatMemberKind::Banned(_)
        ))
    }

    /// Telegram has no per-user visibility inside a group; the post goes to
    /// the user's private chat with the bot instead.
    async fn send_ephemeral(&self, user_id: UserId, post: Post) -> Result<()> {
        self.send(teloxide::types::ChatId(user_id.0), &post, None)
            .await?;
        Ok(())
    }

    async fn create_post(&self, mut post: Post) -> Result<PostId> {
        let msg = self
            .send(Self::tg_chat(post.channel_id), &post, post.root_id)
            .await?;
        let id = PostId(i64::from(msg.id.0));
        post.id = Some(id);
        post.created_at = msg.date;
        self.history.record(post);
        Ok(id)
    }

    async fn posts_since(&self, channel_id: ChannelId, since: DateTime<Utc>) -> Result<Vec<Post>> {
        Ok(self.history.since(channel_id, since))
    }
}
