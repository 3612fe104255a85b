use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    domain::{ChannelId, Post, PostId, User, UserId},
    preferences::PreferenceStore,
    provider::{Credential, Meeting, OAuthToken, ZoomUser},
    store::KvStore,
    telemetry::Telemetry,
    Result,
};

/// Hexagonal port for the chat platform (users, channels, posts).
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn get_user(&self, user_id: UserId) -> Result<User>;

    async fn is_channel_member(&self, channel_id: ChannelId, user_id: UserId) -> Result<bool>;

    /// Deliver a post visible only to `user_id`.
    async fn send_ephemeral(&self, user_id: UserId, post: Post) -> Result<()>;

    /// Publish a regular channel post.
    async fn create_post(&self, post: Post) -> Result<PostId>;

    /// Posts in `channel_id` created at or after `since`, newest first.
    async fn posts_since(&self, channel_id: ChannelId, since: DateTime<Utc>) -> Result<Vec<Post>>;
}

/// Hexagonal port for the meeting provider (Zoom REST + OAuth).
#[async_trait]
pub trait MeetingProvider: Send + Sync {
    /// Look up a Zoom user by id, email, or `"me"`.
    async fn get_user(&self, credential: &Credential, user: &str) -> Result<ZoomUser>;

    async fn create_meeting(
        &self,
        credential: &Credential,
        host: &ZoomUser,
        topic: &str,
    ) -> Result<Meeting>;

    /// Exchange an authorization code for a token.
    async fn exchange_code(&self, code: &str) -> Result<OAuthToken>;

    /// Provider authorize URL the user is redirected to, carrying `state`.
    fn authorize_url(&self, state: &str) -> String;
}

/// Bundle of adapter handles the application services are built from.
#[derive(Clone)]
pub struct Ports {
    pub platform: Arc<dyn ChatPlatform>,
    pub provider: Arc<dyn MeetingProvider>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub kv: Arc<dyn KvStore>,
    pub telemetry: Arc<dyn Telemetry>,
}
