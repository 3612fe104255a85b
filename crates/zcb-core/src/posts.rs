//! Builders for the posts the bridge publishes.

use crate::{
    config::Config,
    domain::{ChannelId, MeetingCard, MeetingStatus, Post, PostAction, PostButton, PostId, User},
    provider::PROVIDER_NAME,
    recent::RecentMeeting,
};

pub fn meeting_link(cfg: &Config, meeting_id: i64) -> String {
    format!("{}/j/{meeting_id}", cfg.zoom_url)
}

pub struct Announcement<'a> {
    pub creator: &'a User,
    pub meeting_id: i64,
    pub personal: bool,
    pub channel_id: ChannelId,
    pub root_id: Option<PostId>,
    pub topic: &'a str,
}

/// Public "meeting started" post, authored by the bot.
pub fn meeting_announcement(cfg: &Config, a: Announcement<'_>) -> Post {
    let link = meeting_link(cfg, a.meeting_id);
    let mut post = Post::new(cfg.bot_user_id, a.channel_id, "I have started a meeting");
    post.root_id = a.root_id;
    post.meeting = Some(MeetingCard {
        meeting_id: a.meeting_id,
        link: link.clone(),
        status: MeetingStatus::Started,
        personal: a.personal,
        topic: a.topic.to_string(),
        creator_username: a.creator.username.clone(),
        provider: PROVIDER_NAME.to_string(),
    });
    post.buttons.push(PostButton::Link {
        label: "Join Meeting".to_string(),
        url: link,
    });
    post
}

/// Ephemeral "someone just started a meeting here" prompt.
pub fn recent_meeting_confirmation(
    cfg: &Config,
    recent: &RecentMeeting,
    channel_id: ChannelId,
    root_id: Option<PostId>,
) -> Post {
    let message = format!(
        "There is another recent meeting that was created on this channel by {} ({}). Do you want to join or create a new meeting?",
        recent.creator_name, recent.provider
    );
    let mut post = Post::new(cfg.bot_user_id, channel_id, message);
    post.root_id = root_id;
    post.buttons = vec![
        PostButton::Link {
            label: "Join Meeting".to_string(),
            url: recent.link.clone(),
        },
        PostButton::Action {
            label: "Create New Meeting".to_string(),
            action: PostAction::StartNew { channel_id },
        },
    ];
    post
}

/// Ephemeral prompt asking whether to use the Personal Meeting ID.
pub fn ask_pmi_prompt(cfg: &Config, channel_id: ChannelId) -> Post {
    let mut post = Post::new(
        cfg.bot_user_id,
        channel_id,
        "Would you like to use your Personal Meeting ID for this meeting? \
You can set a default with `/zoom setting use_pmi [true/false/ask]`.",
    );
    post.buttons = vec![
        PostButton::Action {
            label: "Use Personal Meeting ID".to_string(),
            action: PostAction::UsePmi {
                channel_id,
                use_pmi: true,
            },
        },
        PostButton::Action {
            label: "Use a unique meeting ID".to_string(),
            action: PostAction::UsePmi {
                channel_id,
                use_pmi: false,
            },
        },
    ];
    post
}

/// Plain ephemeral reply authored by the bot.
pub fn ephemeral_reply(cfg: &Config, channel_id: ChannelId, message: &str) -> Post {
    Post::new(cfg.bot_user_id, channel_id, message)
}
