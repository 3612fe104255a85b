use std::sync::Arc;

use crate::{
    config::Config,
    domain::{User, UserId},
    errors::Error,
    ports::MeetingProvider,
    provider::{Credential, OAuthToken, OAuthUserInfo, ZoomIdentity},
    store::{self, KvStore},
    Result,
};

const USER_TOKEN_PREFIX: &str = "zoomtoken_";
const ZOOM_ID_TOKEN_PREFIX: &str = "zoomtokenbyzoomid_";
const SUPERUSER_TOKEN_KEY: &str = "zoom_superuser_token";

/// Result of resolving a chat user to a Zoom account.
#[derive(Debug)]
pub enum AuthOutcome {
    Connected(ZoomIdentity),
    /// No usable link. `prompt` is what the user should be told; `cause` is the
    /// underlying failure, if there was one, for logging.
    NotConnected {
        prompt: String,
        cause: Option<Error>,
    },
}

pub fn oauth_prompt(cfg: &Config) -> String {
    format!(
        "[Click here to link your Zoom account.]({})",
        cfg.oauth_connect_url()
    )
}

fn email_mismatch_prompt(email: &str) -> String {
    format!(
        "We could not verify your chat account in Zoom. Please ensure that your chat email address {email} matches your Zoom login email address."
    )
}

/// Resolves chat users to Zoom identities and owns the stored credentials.
pub struct IdentityResolver {
    cfg: Arc<Config>,
    kv: Arc<dyn KvStore>,
    provider: Arc<dyn MeetingProvider>,
}

impl IdentityResolver {
    pub fn new(
        cfg: Arc<Config>,
        kv: Arc<dyn KvStore>,
        provider: Arc<dyn MeetingProvider>,
    ) -> Self {
        Self { cfg, kv, provider }
    }

    pub async fn authenticate(&self, user: &User) -> AuthOutcome {
        if !self.cfg.oauth_enabled {
            return self.authenticate_by_email(user, Credential::App).await;
        }

        if self.cfg.account_level_app {
            return match self.superuser_token().await {
                Ok(Some(token)) => {
                    self.authenticate_by_email(user, Credential::Account(token))
                        .await
                }
                Ok(None) => AuthOutcome::NotConnected {
                    prompt: oauth_prompt(&self.cfg),
                    cause: None,
                },
                Err(e) => AuthOutcome::NotConnected {
                    prompt: oauth_prompt(&self.cfg),
                    cause: Some(e),
                },
            };
        }

        let info = match self.linked_user(user.id).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                return AuthOutcome::NotConnected {
                    prompt: oauth_prompt(&self.cfg),
                    cause: None,
                }
            }
            Err(e) => {
                return AuthOutcome::NotConnected {
                    prompt: oauth_prompt(&self.cfg),
                    cause: Some(e),
                }
            }
        };

        let credential = Credential::User(info.token);
        match self.provider.get_user(&credential, "me").await {
            Ok(zoom_user) => AuthOutcome::Connected(ZoomIdentity {
                user: zoom_user,
                credential,
            }),
            Err(e) => AuthOutcome::NotConnected {
                prompt: oauth_prompt(&self.cfg),
                cause: Some(e),
            },
        }
    }

    async fn authenticate_by_email(&self, user: &User, credential: Credential) -> AuthOutcome {
        let Some(email) = user.email.as_deref().filter(|e| !e.is_empty()) else {
            return AuthOutcome::NotConnected {
                prompt: email_mismatch_prompt("(none)"),
                cause: Some(Error::NotFound(format!(
                    "no email address known for user {}",
                    user.id
                ))),
            };
        };

        match self.provider.get_user(&credential, email).await {
            Ok(zoom_user) => AuthOutcome::Connected(ZoomIdentity {
                user: zoom_user,
                credential,
            }),
            Err(e) => AuthOutcome::NotConnected {
                prompt: email_mismatch_prompt(email),
                cause: Some(e),
            },
        }
    }

    pub async fn linked_user(&self, user_id: UserId) -> Result<Option<OAuthUserInfo>> {
        store::load(self.kv.as_ref(), &format!("{USER_TOKEN_PREFIX}{user_id}")).await
    }

    pub async fn store_linked_user(&self, info: &OAuthUserInfo) -> Result<()> {
        store::save(
            self.kv.as_ref(),
            &format!("{USER_TOKEN_PREFIX}{}", info.user_id),
            info,
        )
        .await?;
        store::save(
            self.kv.as_ref(),
            &format!("{ZOOM_ID_TOKEN_PREFIX}{}", info.zoom_id),
            info,
        )
        .await
    }

    /// Remove the link for `user_id` under both keys.
    pub async fn disconnect_user(&self, user_id: UserId) -> Result<()> {
        let info = self
            .linked_user(user_id)
            .await?
            .ok_or_else(|| Error::NotFound("could not find Zoom user".to_string()))?;
        self.kv
            .delete(&format!("{USER_TOKEN_PREFIX}{user_id}"))
            .await?;
        self.kv
            .delete(&format!("{ZOOM_ID_TOKEN_PREFIX}{}", info.zoom_id))
            .await
    }

    pub async fn superuser_token(&self) -> Result<Option<OAuthToken>> {
        store::load(self.kv.as_ref(), SUPERUSER_TOKEN_KEY).await
    }

    pub async fn store_superuser_token(&self, token: &OAuthToken) -> Result<()> {
        store::save(self.kv.as_ref(), SUPERUSER_TOKEN_KEY, token).await
    }

    pub async fn remove_superuser_token(&self) -> Result<()> {
        self.kv.delete(SUPERUSER_TOKEN_KEY).await
    }
}
