//! Zoom adapter (REST API + OAuth token endpoint).
//!
//! Implements [`MeetingProvider`] for the core. Three credential flavours are
//! supported: a linked user's token, the shared account-level token, and the
//! server-to-server app credentials (`account_credentials` grant).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use zcb_core::{
    config::Config,
    errors::Error,
    ports::MeetingProvider,
    provider::{Credential, Meeting, OAuthToken, ZoomUser},
    Result,
};

/// Instant meeting.
const MEETING_TYPE_INSTANT: u8 = 1;
const ERROR_BODY_LIMIT: usize = 200;
/// Refresh the app token this long before Zoom says it expires.
const APP_TOKEN_SLACK_SECS: i64 = 60;

#[derive(Clone, Debug)]
pub struct ZoomSettings {
    pub api_url: String,
    pub oauth_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub account_id: Option<String>,
    pub redirect_uri: String,
}

impl ZoomSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            api_url: cfg.zoom_api_url.clone(),
            oauth_url: cfg.zoom_url.clone(),
            client_id: cfg.zoom_client_id.clone(),
            client_secret: cfg.zoom_client_secret.clone(),
            account_id: cfg.zoom_account_id.clone(),
            redirect_uri: format!("{}/oauth2/complete", cfg.site_url.trim_end_matches('/')),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_token(self, now: DateTime<Utc>) -> OAuthToken {
        OAuthToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            expires_at: self
                .expires_in
                .map(|secs| now + chrono::Duration::seconds(secs)),
        }
    }
}

pub struct ZoomClient {
    settings: ZoomSettings,
    api_base: Url,
    oauth_base: Url,
    http: reqwest::Client,
    app_token: Mutex<Option<OAuthToken>>,
}

impl ZoomClient {
    pub fn new(settings: ZoomSettings) -> Result<Self> {
        let api_base = parse_base(&settings.api_url)?;
        let oauth_base = parse_base(&settings.oauth_url)?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("zoom http client: {e}")))?;
        Ok(Self {
            settings,
            api_base,
            oauth_base,
            http,
            app_token: Mutex::new(None),
        })
    }

    fn url(base: &Url, segments: &[&str]) -> Result<Url> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("zoom url cannot be a base: {base}")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn bearer(&self, credential: &Credential) -> Result<String> {
        match credential {
            Credential::User(token) | Credential::Account(token) => Ok(token.access_token.clone()),
            Credential::App => Ok(self.app_token().await?.access_token),
        }
    }

    /// Server-to-server token, cached until shortly before it expires.
    pub async fn app_token(&self) -> Result<OAuthToken> {
        let mut cached = self.app_token.lock().await;
        if let Some(token) = cached.as_ref() {
            let fresh = token
                .expires_at
                .map(|at| at - chrono::Duration::seconds(APP_TOKEN_SLACK_SECS) > Utc::now())
                .unwrap_or(false);
            if fresh {
                return Ok(token.clone());
            }
        }

        let account_id = self
            .settings
            .account_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Config("ZOOM_ACCOUNT_ID is required for app credentials".to_string()))?;
        let token = self
            .token_request(&[
                ("grant_type", "account_credentials"),
                ("account_id", account_id),
            ])
            .await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<OAuthToken> {
        let url = Self::url(&self.oauth_base, &["oauth", "token"])?;
        let resp = self
            .http
            .post(url)
            .basic_auth(&self.settings.client_id, Some(&self.settings.client_secret))
            .form(params)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("token request error: {e}")))?;
        let resp = ensure_success(resp, "token request").await?;
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| Error::Provider(format!("token json error: {e}")))?;
        Ok(body.into_token(Utc::now()))
    }
}

fn parse_base(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::Config(format!("invalid zoom url {raw:?}: {e}")))
}

async fn ensure_success(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Provider(format!(
        "{what} failed: {status} {}",
        body.chars().take(ERROR_BODY_LIMIT).collect::<String>()
    )))
}

#[async_trait]
impl MeetingProvider for ZoomClient {
    async fn get_user(&self, credential: &Credential, user: &str) -> Result<ZoomUser> {
        let url = Self::url(&self.api_base, &["users", user])?;
        debug!(%url, "zoom get user");
        let resp = self
            .http
            .get(url)
            .bearer_auth(self.bearer(credential).await?)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("get user request error: {e}")))?;
        let resp = ensure_success(resp, "get user").await?;
        resp.json()
            .await
            .map_err(|e| Error::Provider(format!("get user json error: {e}")))
    }

    async fn create_meeting(
        &self,
        credential: &Credential,
        host: &ZoomUser,
        topic: &str,
    ) -> Result<Meeting> {
        let url = Self::url(&self.api_base, &["users", host.id.as_str(), "meetings"])?;
        debug!(%url, topic, "zoom create meeting");
        let resp = self
            .http
            .post(url)
            .bearer_auth(self.bearer(credential).await?)
            .json(&serde_json::json!({
                "topic": topic,
                "type": MEETING_TYPE_INSTANT,
            }))
            .send()
            .await
            .map_err(|e| Error::Provider(format!("create meeting request error: {e}")))?;
        let resp = ensure_success(resp, "create meeting").await?;
        resp.json()
            .await
            .map_err(|e| Error::Provider(format!("create meeting json error: {e}")))
    }

    async fn exchange_code(&self, code: &str) -> Result<OAuthToken> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
        ])
        .await
    }

    fn authorize_url(&self, state: &str) -> String {
        let mut url = self.oauth_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["oauth", "authorize"]);
        }
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("redirect_uri", &self.settings.redirect_uri)
            .append_pair("state", state);
        url.into()
    }
}
