//! Second half of the connect protocol: the provider redirect comes back with
//! `state` and `code`, and the pending intent recorded earlier is resumed.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    auth::IdentityResolver,
    config::Config,
    domain::UserId,
    errors::Error,
    meeting::{MeetingService, StartOutcome},
    pending::PendingConnections,
    ports::Ports,
    posts,
    provider::{Credential, OAuthUserInfo},
    telemetry::StartSource,
    Result,
};

/// What happened after a successful code exchange.
#[derive(Debug)]
pub enum Completion {
    Connected,
    MeetingStarted(StartOutcome),
}

pub struct OAuthFlow {
    cfg: Arc<Config>,
    ports: Ports,
    meetings: Arc<MeetingService>,
    identities: IdentityResolver,
    pending: PendingConnections,
}

impl OAuthFlow {
    pub fn new(cfg: Arc<Config>, ports: Ports, meetings: Arc<MeetingService>) -> Self {
        Self {
            identities: IdentityResolver::new(
                cfg.clone(),
                ports.kv.clone(),
                ports.provider.clone(),
            ),
            pending: PendingConnections::new(ports.kv.clone()),
            cfg,
            ports,
            meetings,
        }
    }

    /// Provider authorize URL for the user's pending connection.
    pub async fn authorize_url(&self, user_id: UserId) -> Result<String> {
        let pending = self
            .pending
            .peek(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no pending connection for user {user_id}")))?;
        Ok(self.ports.provider.authorize_url(&pending.state))
    }

    pub async fn complete(&self, user_id: UserId, state: &str, code: &str) -> Result<Completion> {
        let pending = self
            .pending
            .consume(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no pending connection for user {user_id}")))?;
        if pending.state != state {
            return Err(Error::External("invalid oauth state".to_string()));
        }

        let token = self.ports.provider.exchange_code(code).await?;

        if self.cfg.account_level_app {
            self.identities.store_superuser_token(&token).await?;
        } else {
            let credential = Credential::User(token.clone());
            let zoom_user = self.ports.provider.get_user(&credential, "me").await?;
            self.identities
                .store_linked_user(&OAuthUserInfo {
                    user_id,
                    zoom_id: zoom_user.id,
                    zoom_email: zoom_user.email,
                    token,
                })
                .await?;
        }
        info!(user_id = %user_id, account_level = self.cfg.account_level_app, "zoom account connected");

        if pending.just_connect {
            let post = posts::ephemeral_reply(
                &self.cfg,
                pending.channel_id,
                "Successfully connected to Zoom",
            );
            if let Err(e) = self.ports.platform.send_ephemeral(user_id, post).await {
                warn!(user_id = %user_id, error = %e, "failed to send connect confirmation");
            }
            return Ok(Completion::Connected);
        }

        let user = self.ports.platform.get_user(user_id).await?;
        let outcome = self
            .meetings
            .start_personal(&user, pending.channel_id, StartSource::OAuth)
            .await?;
        Ok(Completion::MeetingStarted(outcome))
    }
}
