use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chat user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Chat channel id (numeric). Private chats share the user's id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub i64);

/// Chat post id (numeric, unique within a channel).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chat user profile as resolved by the platform adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub is_system_admin: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MeetingStatus {
    Started,
    Ended,
}

/// Meeting details attached to an announcement post.
///
/// The recent-meeting detector keys off `provider` + `link`, so both must be
/// non-empty on anything we post.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeetingCard {
    pub meeting_id: i64,
    pub link: String,
    pub status: MeetingStatus,
    pub personal: bool,
    pub topic: String,
    pub creator_username: String,
    pub provider: String,
}

/// Follow-up action carried by an interactive button.
///
/// Buttons are the second phase of deferred flows: the prompt is posted and the
/// invocation ends; a press arrives later as a separate update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostAction {
    /// Answer to the "use your PMI?" prompt.
    UsePmi { channel_id: ChannelId, use_pmi: bool },
    /// "Create New Meeting" on the recent-meeting confirmation.
    StartNew { channel_id: ChannelId },
}

const ACTION_PREFIX: &str = "zcb";

impl PostAction {
    /// Compact wire form (fits Telegram's 64-byte callback data limit).
    pub fn encode(&self) -> String {
        match self {
            PostAction::UsePmi {
                channel_id,
                use_pmi,
            } => format!("{ACTION_PREFIX}:pmi:{}:{channel_id}", u8::from(*use_pmi)),
            PostAction::StartNew { channel_id } => format!("{ACTION_PREFIX}:new:{channel_id}"),
        }
    }

    pub fn decode(data: &str) -> Option<Self> {
        let mut parts = data.split(':');
        if parts.next()? != ACTION_PREFIX {
            return None;
        }
        let action = match parts.next()? {
            "pmi" => {
                let use_pmi = match parts.next()? {
                    "1" => true,
                    "0" => false,
                    _ => return None,
                };
                let channel_id = ChannelId(parts.next()?.parse().ok()?);
                PostAction::UsePmi {
                    channel_id,
                    use_pmi,
                }
            }
            "new" => PostAction::StartNew {
                channel_id: ChannelId(parts.next()?.parse().ok()?),
            },
            _ => return None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(action)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PostButton {
    Link { label: String, url: String },
    Action { label: String, action: PostAction },
}

/// A chat post, either a regular channel post or an ephemeral reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Post {
    pub id: Option<PostId>,
    pub author_id: UserId,
    pub channel_id: ChannelId,
    pub root_id: Option<PostId>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub meeting: Option<MeetingCard>,
    pub buttons: Vec<PostButton>,
}

impl Post {
    pub fn new(author_id: UserId, channel_id: ChannelId, message: impl Into<String>) -> Self {
        Self {
            id: None,
            author_id,
            channel_id,
            root_id: None,
            message: message.into(),
            created_at: Utc::now(),
            meeting: None,
            buttons: Vec::new(),
        }
    }
}
