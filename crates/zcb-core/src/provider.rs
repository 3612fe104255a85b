//! Zoom-side data model shared between the core and the `zcb-zoom` adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::UserId;

pub const PROVIDER_NAME: &str = "Zoom";
pub const DEFAULT_MEETING_TOPIC: &str = "Zoom Meeting";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// A Zoom account as returned by `GET /users/{id}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoomUser {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    /// Personal Meeting ID.
    #[serde(default)]
    pub pmi: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: i64,
    #[serde(default)]
    pub join_url: String,
    #[serde(default)]
    pub topic: String,
}

/// Per-user link between a chat account and a Zoom account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthUserInfo {
    pub user_id: UserId,
    pub zoom_id: String,
    pub zoom_email: String,
    pub token: OAuthToken,
}

/// Which credential a provider call runs under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credential {
    /// Token of the linked user (per-user OAuth app).
    User(OAuthToken),
    /// Shared admin token (account-level OAuth app).
    Account(OAuthToken),
    /// Server-to-server app credentials from the deployment config.
    App,
}

/// A chat user resolved to their Zoom account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZoomIdentity {
    pub user: ZoomUser,
    pub credential: Credential,
}
