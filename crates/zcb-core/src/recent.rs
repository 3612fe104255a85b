use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};

use crate::{
    domain::{ChannelId, MeetingStatus, Post},
    ports::ChatPlatform,
    Result,
};

/// A meeting announced in the channel within the lookback window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecentMeeting {
    pub link: String,
    pub creator_name: String,
    pub provider: String,
}

/// Finds meetings started moments ago so a second `/zoom start` can offer to
/// join instead of creating a duplicate.
///
/// This is a read-then-act check, not a lock: two starts racing inside the
/// window can both miss each other.
pub struct RecentMeetingDetector {
    platform: Arc<dyn ChatPlatform>,
    window: Duration,
}

impl RecentMeetingDetector {
    pub fn new(platform: Arc<dyn ChatPlatform>, window: Duration) -> Self {
        Self { platform, window }
    }

    pub async fn check(&self, channel_id: ChannelId) -> Result<Option<RecentMeeting>> {
        self.check_at(channel_id, Utc::now()).await
    }

    pub async fn check_at(
        &self,
        channel_id: ChannelId,
        now: DateTime<Utc>,
    ) -> Result<Option<RecentMeeting>> {
        let window = chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::zero());
        let posts = self.platform.posts_since(channel_id, now - window).await?;
        Ok(find_recent_meeting(&posts))
    }
}

/// Newest post carrying a started meeting card with both a provider and a
/// link.
pub fn find_recent_meeting(posts: &[Post]) -> Option<RecentMeeting> {
    posts
        .iter()
        .filter_map(|p| p.meeting.as_ref().map(|m| (p.created_at, m)))
        .filter(|(_, m)| m.status == MeetingStatus::Started)
        .filter(|(_, m)| !m.provider.is_empty() && !m.link.is_empty())
        .max_by_key(|(created_at, _)| *created_at)
        .map(|(_, m)| RecentMeeting {
            link: m.link.clone(),
            creator_name: m.creator_username.clone(),
            provider: m.provider.clone(),
        })
}
