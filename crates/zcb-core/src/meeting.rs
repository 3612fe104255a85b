//! Meeting-start decision engine.
//!
//! Every `start` is a fresh run through the same guards:
//! membership -> recent meeting -> auth -> PMI preference -> post & track.
//! Nothing is held in memory between invocations; when the user has to decide
//! something (connect their account, pick PMI or not) the run ends and the
//! answer re-enters through [`MeetingService::start_with_choice`] or the OAuth
//! completion path.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    auth::{AuthOutcome, IdentityResolver},
    config::Config,
    domain::{ChannelId, PostId, User, UserId},
    errors::Error,
    pending::PendingConnections,
    ports::Ports,
    posts::{self, Announcement},
    preferences::{pmi_setting, PmiSetting},
    provider::{ZoomIdentity, DEFAULT_MEETING_TOPIC},
    recent::{RecentMeeting, RecentMeetingDetector},
    telemetry::StartSource,
    Result,
};

const MEETING_POST_PREFIX: &str = "post_meeting_";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartRequest {
    pub user: User,
    pub channel_id: ChannelId,
    pub root_id: Option<PostId>,
    /// Accepted from `/zoom start <topic>` but not used: meetings are always
    /// created and announced with the default topic.
    pub topic: String,
    pub source: StartSource,
    /// Skip the recent-meeting guard ("Create New Meeting" on the confirmation).
    pub force: bool,
}

/// Terminal state of one start attempt. Hard failures are `Err`.
#[derive(Debug)]
pub enum StartOutcome {
    NotMember,
    ScanFailed,
    /// A recent meeting exists; the user was shown a join/create prompt.
    Reused(RecentMeeting),
    /// The user must link their Zoom account first. A pending connection was
    /// recorded (best-effort) so OAuth completion can resume.
    AuthRequired {
        prompt: String,
        cause: Option<Error>,
    },
    /// The user was asked whether to use their PMI; nothing was created.
    Deferred,
    Started { meeting_id: i64, personal: bool },
}

/// What the PMI guard settled on.
#[derive(Debug)]
enum MeetingDecision {
    Pending,
    Created { meeting_id: i64, personal: bool },
    Failed(Error),
}

pub struct MeetingService {
    cfg: Arc<Config>,
    ports: Ports,
    identities: IdentityResolver,
    pending: PendingConnections,
    recent: RecentMeetingDetector,
}

impl MeetingService {
    pub fn new(cfg: Arc<Config>, ports: Ports) -> Self {
        Self {
            identities: IdentityResolver::new(
                cfg.clone(),
                ports.kv.clone(),
                ports.provider.clone(),
            ),
            pending: PendingConnections::new(ports.kv.clone()),
            recent: RecentMeetingDetector::new(
                ports.platform.clone(),
                cfg.recent_meeting_window,
            ),
            cfg,
            ports,
        }
    }

    pub async fn start(&self, req: StartRequest) -> Result<StartOutcome> {
        let user = &req.user;

        if !self.is_member(user.id, req.channel_id).await {
            return Ok(StartOutcome::NotMember);
        }

        if !req.force {
            match self.recent.check(req.channel_id).await {
                Ok(Some(recent)) => {
                    let post = posts::recent_meeting_confirmation(
                        &self.cfg,
                        &recent,
                        req.channel_id,
                        req.root_id,
                    );
                    if let Err(e) = self.ports.platform.send_ephemeral(user.id, post).await {
                        warn!(error = %e, "failed to send recent meeting confirmation");
                    }
                    return Ok(StartOutcome::Reused(recent));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(channel_id = %req.channel_id, error = %e, "failed to check previous messages");
                    return Ok(StartOutcome::ScanFailed);
                }
            }
        }

        let identity = match self.identities.authenticate(user).await {
            AuthOutcome::Connected(identity) => identity,
            AuthOutcome::NotConnected { prompt, cause } => {
                // Needed later when OAuth completes to start the meeting here.
                if let Err(e) = self.pending.store(user.id, req.channel_id, false).await {
                    warn!(user_id = %user.id, error = %e, "failed to store user state");
                }
                return Ok(StartOutcome::AuthRequired { prompt, cause });
            }
        };

        let decision = match pmi_setting(self.ports.preferences.as_ref(), user.id).await {
            Ok(PmiSetting::Unset | PmiSetting::Ask) => {
                self.ask_pmi(user.id, req.channel_id).await;
                MeetingDecision::Pending
            }
            Ok(PmiSetting::True) => MeetingDecision::Created {
                meeting_id: identity.user.pmi,
                personal: true,
            },
            Ok(PmiSetting::False) => match self.create_fresh(&identity).await {
                Ok(meeting_id) => MeetingDecision::Created {
                    meeting_id,
                    personal: false,
                },
                Err(e) => MeetingDecision::Failed(e),
            },
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "failed to read PMI preference; asking instead");
                self.ask_pmi(user.id, req.channel_id).await;
                MeetingDecision::Pending
            }
        };

        let (meeting_id, personal) = match decision {
            MeetingDecision::Pending => return Ok(StartOutcome::Deferred),
            MeetingDecision::Failed(e) => {
                warn!(user_id = %user.id, error = %e, "meeting creation failed");
                return Err(Error::Provider("error while create new meeting".to_string()));
            }
            MeetingDecision::Created {
                meeting_id,
                personal,
            } => (meeting_id, personal),
        };

        self.announce(user, meeting_id, personal, req.channel_id, req.root_id)
            .await?;
        self.ports
            .telemetry
            .track_meeting_start(user.id, req.source);

        Ok(StartOutcome::Started {
            meeting_id,
            personal,
        })
    }

    /// Second phase of the ask-PMI prompt. The channel comes back from the
    /// client, so membership is checked again.
    pub async fn start_with_choice(
        &self,
        user: &User,
        channel_id: ChannelId,
        use_pmi: bool,
    ) -> Result<StartOutcome> {
        if !self.is_member(user.id, channel_id).await {
            return Ok(StartOutcome::NotMember);
        }

        let identity = match self.identities.authenticate(user).await {
            AuthOutcome::Connected(identity) => identity,
            AuthOutcome::NotConnected { prompt, cause } => {
                return Ok(StartOutcome::AuthRequired { prompt, cause })
            }
        };

        let meeting_id = if use_pmi {
            identity.user.pmi
        } else {
            self.create_fresh(&identity).await.map_err(|e| {
                warn!(user_id = %user.id, error = %e, "meeting creation failed");
                Error::Provider("error while create new meeting".to_string())
            })?
        };

        self.announce(user, meeting_id, use_pmi, channel_id, None)
            .await?;
        self.ports
            .telemetry
            .track_meeting_start(user.id, StartSource::AskPmi);

        Ok(StartOutcome::Started {
            meeting_id,
            personal: use_pmi,
        })
    }

    /// Start on the user's PMI right after they connected their account.
    pub async fn start_personal(
        &self,
        user: &User,
        channel_id: ChannelId,
        source: StartSource,
    ) -> Result<StartOutcome> {
        let identity = match self.identities.authenticate(user).await {
            AuthOutcome::Connected(identity) => identity,
            AuthOutcome::NotConnected { prompt, cause } => {
                return Ok(StartOutcome::AuthRequired { prompt, cause })
            }
        };

        let meeting_id = identity.user.pmi;
        self.announce(user, meeting_id, true, channel_id, None)
            .await?;
        self.ports.telemetry.track_meeting_start(user.id, source);

        Ok(StartOutcome::Started {
            meeting_id,
            personal: true,
        })
    }

    /// A failed lookup counts as "not a member".
    async fn is_member(&self, user_id: UserId, channel_id: ChannelId) -> bool {
        match self
            .ports
            .platform
            .is_channel_member(channel_id, user_id)
            .await
        {
            Ok(member) => member,
            Err(e) => {
                warn!(channel_id = %channel_id, error = %e, "channel member lookup failed");
                false
            }
        }
    }

    async fn ask_pmi(&self, user_id: UserId, channel_id: ChannelId) {
        let post = posts::ask_pmi_prompt(&self.cfg, channel_id);
        if let Err(e) = self.ports.platform.send_ephemeral(user_id, post).await {
            warn!(user_id = %user_id, error = %e, "failed to send PMI prompt");
        }
    }

    async fn create_fresh(&self, identity: &ZoomIdentity) -> Result<i64> {
        let meeting = self
            .ports
            .provider
            .create_meeting(&identity.credential, &identity.user, DEFAULT_MEETING_TOPIC)
            .await?;
        Ok(meeting.id)
    }

    /// Publish the announcement. The meeting already exists on Zoom at this
    /// point; a failed post is reported, not rolled back.
    async fn announce(
        &self,
        user: &User,
        meeting_id: i64,
        personal: bool,
        channel_id: ChannelId,
        root_id: Option<PostId>,
    ) -> Result<PostId> {
        let post = posts::meeting_announcement(
            &self.cfg,
            Announcement {
                creator: user,
                meeting_id,
                personal,
                channel_id,
                root_id,
                topic: DEFAULT_MEETING_TOPIC,
            },
        );
        let post_id = self.ports.platform.create_post(post).await?;
        info!(user_id = %user.id, channel_id = %channel_id, meeting_id, personal, "meeting started");

        if let Err(e) = self
            .ports
            .kv
            .set(
                &format!("{MEETING_POST_PREFIX}{meeting_id}"),
                serde_json::json!(post_id.0),
            )
            .await
        {
            warn!(meeting_id, error = %e, "failed to store meeting post id");
        }

        Ok(post_id)
    }
}
