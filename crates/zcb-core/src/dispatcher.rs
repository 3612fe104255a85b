//! `/zoom` command dispatch.

use std::sync::Arc;

use tracing::warn;

use crate::{
    auth::{oauth_prompt, IdentityResolver},
    command::{parse_command, Action, CommandArgs, SettingAction},
    config::Config,
    domain::{ChannelId, PostId, User, UserId},
    errors::Error,
    meeting::{MeetingService, StartOutcome, StartRequest},
    pending::PendingConnections,
    ports::Ports,
    posts,
    preferences::{set_pmi_setting, PmiSetting},
    telemetry::StartSource,
};

const STARTER_TEXT: &str = "###### Zoom Bridge - Slash Command Help\n";
const HELP_TEXT: &str = "* |/zoom start| - Start a zoom meeting\n";
const SETTING_HELP_TEXT: &str = "* |/zoom setting| - Configure setting options";
const OAUTH_HELP_TEXT: &str = "* |/zoom disconnect| - Disconnect from zoom";
const SETTING_PMI_HELP_TEXT: &str =
    "* |/zoom setting use_pmi [true/false/ask]| - enable / disable / undecide to use PMI to create meeting";
const ALREADY_CONNECTED: &str = "Already connected";
const PREFERENCE_UPDATE_ERROR: &str = "Cannot update preference in zoom setting";

/// What to show the invoking user, plus the failure behind it (if any) for
/// the log. Either part may be empty.
#[derive(Debug, Default)]
pub struct Reply {
    pub message: String,
    pub error: Option<Error>,
}

impl Reply {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error: None,
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn failed(message: impl Into<String>, error: Error) -> Self {
        Self {
            message: message.into(),
            error: Some(error),
        }
    }
}

/// Render a start attempt for the user who asked for it.
pub fn start_reply(result: crate::Result<StartOutcome>, channel_id: ChannelId) -> Reply {
    match result {
        Ok(StartOutcome::NotMember) => Reply::text(format!(
            "We could not get channel members (channelId: {channel_id})"
        )),
        Ok(StartOutcome::ScanFailed) => Reply::text("Error checking previous messages"),
        Ok(StartOutcome::AuthRequired { prompt, cause }) => Reply {
            message: prompt,
            error: cause,
        },
        Ok(StartOutcome::Reused(_))
        | Ok(StartOutcome::Deferred)
        | Ok(StartOutcome::Started { .. }) => Reply::silent(),
        Err(e) => Reply::failed("", e),
    }
}

fn markdown(text: &str) -> String {
    text.replace('|', "`")
}

pub struct CommandHandler {
    cfg: Arc<Config>,
    ports: Ports,
    meetings: Arc<MeetingService>,
    identities: IdentityResolver,
    pending: PendingConnections,
}

impl CommandHandler {
    pub fn new(cfg: Arc<Config>, ports: Ports) -> Self {
        let meetings = Arc::new(MeetingService::new(cfg.clone(), ports.clone()));
        Self::with_meetings(cfg, ports, meetings)
    }

    pub fn with_meetings(cfg: Arc<Config>, ports: Ports, meetings: Arc<MeetingService>) -> Self {
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

    pub fn meetings(&self) -> Arc<MeetingService> {
        self.meetings.clone()
    }

    /// Execute and deliver the reply to the invoking user.
    pub async fn handle(&self, args: &CommandArgs) {
        let reply = self.execute(args).await;
        self.deliver(args.user_id, args.channel_id, reply).await;
    }

    /// Log the error part and send the message part as an ephemeral post.
    pub async fn deliver(&self, user_id: UserId, channel_id: ChannelId, reply: Reply) {
        if let Some(e) = &reply.error {
            warn!(user_id = %user_id, error = %e, "failed to execute command");
        }
        if reply.message.is_empty() {
            return;
        }
        let post = posts::ephemeral_reply(&self.cfg, channel_id, &reply.message);
        if let Err(e) = self.ports.platform.send_ephemeral(user_id, post).await {
            warn!(user_id = %user_id, error = %e, "failed to send command response");
        }
    }

    pub async fn execute(&self, args: &CommandArgs) -> Reply {
        let parsed = parse_command(&args.command);

        if parsed.command != self.cfg.trigger {
            return Reply::text(format!(
                "Command '{}' is not {}. Please try again.",
                parsed.command, self.cfg.trigger
            ));
        }
        if parsed.action.is_empty() {
            return Reply::text(format!(
                "Please specify an action for {} command.",
                self.cfg.trigger
            ));
        }

        let user = match self.ports.platform.get_user(args.user_id).await {
            Ok(user) => user,
            Err(e) => {
                warn!(user_id = %args.user_id, error = %e, "user lookup failed");
                return Reply::text(format!(
                    "We could not retrieve user (userId: {})",
                    args.user_id
                ));
            }
        };

        match parsed.action() {
            Action::Connect => self.connect(&user, args.channel_id).await,
            Action::Start { topic } => {
                self.start(user, args.channel_id, args.root_id, topic)
                    .await
            }
            Action::Disconnect => self.disconnect(&user).await,
            Action::Help => Reply::text(self.help_text()),
            Action::Setting(setting) => self.setting(&user, setting).await,
            Action::Unknown(action) => Reply::text(format!("Unknown action {action}")),
        }
    }

    fn can_connect(&self, user: &User) -> bool {
        self.cfg.oauth_enabled && (!self.cfg.account_level_app || user.is_system_admin)
    }

    async fn start(
        &self,
        user: User,
        channel_id: ChannelId,
        root_id: Option<PostId>,
        topic: String,
    ) -> Reply {
        let result = self
            .meetings
            .start(StartRequest {
                user,
                channel_id,
                root_id,
                topic,
                source: StartSource::Command,
                force: false,
            })
            .await;
        start_reply(result, channel_id)
    }

    async fn connect(&self, user: &User, channel_id: ChannelId) -> Reply {
        if !self.can_connect(user) {
            return Reply::text("Unknown action `connect`");
        }

        let connected = if self.cfg.account_level_app {
            matches!(self.identities.superuser_token().await, Ok(Some(_)))
        } else {
            matches!(self.identities.linked_user(user.id).await, Ok(Some(_)))
        };
        if connected {
            return Reply::text(ALREADY_CONNECTED);
        }

        if let Err(e) = self.pending.store(user.id, channel_id, true).await {
            return Reply::failed("", Error::Store(format!("cannot store state: {e}")));
        }
        Reply::text(oauth_prompt(&self.cfg))
    }

    async fn disconnect(&self, user: &User) -> Reply {
        if !self.can_connect(user) {
            return Reply::text("Unknown action `disconnect`");
        }

        if self.cfg.account_level_app {
            return match self.identities.remove_superuser_token().await {
                Ok(()) => Reply::text("Successfully disconnected from Zoom."),
                Err(e) => Reply::text(format!("Error disconnecting, {e}")),
            };
        }

        match self.identities.disconnect_user(user.id).await {
            Ok(()) => {
                self.ports.telemetry.track_disconnect(user.id);
                Reply::text("User disconnected from Zoom.")
            }
            Err(e) => Reply::text(format!("Could not disconnect OAuth from zoom, {e}")),
        }
    }

    async fn setting(&self, user: &User, action: SettingAction) -> Reply {
        match action {
            SettingAction::Help => Reply::text(markdown(&format!(
                "{STARTER_TEXT}{SETTING_PMI_HELP_TEXT}"
            ))),
            SettingAction::UsePmi(None) => Reply::text("Set PMI option to \"true\"|\"false\"|\"ask\""),
            SettingAction::UsePmi(Some(value)) => {
                let Some(setting) = PmiSetting::from_choice(&value) else {
                    return Reply::text(format!("Unknown setting option {value}"));
                };
                match set_pmi_setting(self.ports.preferences.as_ref(), user.id, setting).await {
                    Ok(()) => Reply::text(format!("Update successfully, use_pmi: {setting}")),
                    Err(e) => {
                        warn!(user_id = %user.id, error = %e, "failed to update PMI preference");
                        Reply::text(PREFERENCE_UPDATE_ERROR)
                    }
                }
            }
            SettingAction::Unknown(other) => Reply::text(format!("Unknown Action {other}")),
        }
    }

    fn help_text(&self) -> String {
        let mut text = String::from(STARTER_TEXT);
        text.push_str(&markdown(&format!("{HELP_TEXT}{SETTING_HELP_TEXT}")));
        if self.cfg.oauth_enabled {
            text.push('\n');
            text.push_str(&markdown(OAUTH_HELP_TEXT));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::pmi_setting;
    use crate::provider::OAuthUserInfo;
    use crate::store::KvStore;
    use crate::test_support::{
        test_user, token, BrokenPreferences, FakePlatform, FakeProvider, Harness,
    };

    const CHANNEL: ChannelId = ChannelId(-42);

    fn args(command: &str) -> CommandArgs {
        CommandArgs {
            user_id: UserId(1),
            channel_id: CHANNEL,
            root_id: None,
            command: command.to_string(),
        }
    }

    fn harness(cfg: Config, user: User) -> Harness {
        Harness::new(cfg, FakePlatform::with_user(user), FakeProvider::default())
    }

    fn handler(h: &Harness) -> CommandHandler {
        CommandHandler::new(h.cfg.clone(), h.ports())
    }

    #[tokio::test]
    async fn rejects_other_commands_and_missing_action() {
        let h = harness(Config::default(), test_user(1));
        let handler = handler(&h);

        let reply = handler.execute(&args("/meet start")).await;
        assert_eq!(reply.message, "Command '/meet' is not /zoom. Please try again.");

        let reply = handler.execute(&args("/zoom")).await;
        assert_eq!(reply.message, "Please specify an action for /zoom command.");

        let reply = handler.execute(&args("/zoom Start")).await;
        assert_eq!(reply.message, "Unknown action Start");
    }

    #[tokio::test]
    async fn user_lookup_failure_is_reported_by_id() {
        let h = Harness::new(
            Config::default(),
            FakePlatform {
                fail_get_user: true,
                ..FakePlatform::default()
            },
            FakeProvider::default(),
        );
        let reply = handler(&h).execute(&args("/zoom help")).await;
        assert_eq!(reply.message, "We could not retrieve user (userId: 1)");
        assert!(reply.error.is_none());
    }

    #[tokio::test]
    async fn help_mentions_disconnect_only_with_oauth() {
        let h = harness(Config::default(), test_user(1));
        let text = handler(&h).execute(&args("/zoom help")).await.message;
        assert!(text.contains("`/zoom start`"));
        assert!(text.contains("`/zoom disconnect`"));
        assert!(!text.contains('|'));

        let h = harness(
            Config {
                oauth_enabled: false,
                ..Config::default()
            },
            test_user(1),
        );
        let text = handler(&h).execute(&args("/zoom help")).await.message;
        assert!(!text.contains("disconnect"));
    }

    #[tokio::test]
    async fn connect_is_gated_on_oauth_mode() {
        let h = harness(
            Config {
                oauth_enabled: false,
                ..Config::default()
            },
            test_user(1),
        );
        let handler = handler(&h);
        assert_eq!(
            handler.execute(&args("/zoom connect")).await.message,
            "Unknown action `connect`"
        );
        assert_eq!(
            handler.execute(&args("/zoom disconnect")).await.message,
            "Unknown action `disconnect`"
        );

        // Account-level apps: only admins may connect.
        let h = harness(
            Config {
                account_level_app: true,
                ..Config::default()
            },
            test_user(1),
        );
        assert_eq!(
            self::handler(&h).execute(&args("/zoom connect")).await.message,
            "Unknown action `connect`"
        );

        let admin = User {
            is_system_admin: true,
            ..test_user(1)
        };
        let h = harness(
            Config {
                account_level_app: true,
                ..Config::default()
            },
            admin,
        );
        let reply = self::handler(&h).execute(&args("/zoom connect")).await;
        assert!(reply.message.contains("http://localhost:8065/oauth2/connect"));
    }

    #[tokio::test]
    async fn connect_records_pending_connection() {
        let h = harness(Config::default(), test_user(1));
        let reply = handler(&h).execute(&args("/zoom connect")).await;
        assert_eq!(
            reply.message,
            "[Click here to link your Zoom account.](http://localhost:8065/oauth2/connect)"
        );

        let pending = PendingConnections::new(h.kv.clone())
            .peek(UserId(1))
            .await
            .unwrap()
            .unwrap();
        assert!(pending.just_connect);
        assert_eq!(pending.channel_id, CHANNEL);
    }

    #[tokio::test]
    async fn connect_when_linked_is_a_no_op() {
        let h = harness(Config::default(), test_user(1));
        IdentityResolver::new(h.cfg.clone(), h.kv.clone(), h.provider.clone())
            .store_linked_user(&OAuthUserInfo {
                user_id: UserId(1),
                zoom_id: "z1".to_string(),
                zoom_email: "user1@example.com".to_string(),
                token: token("t"),
            })
            .await
            .unwrap();

        let reply = handler(&h).execute(&args("/zoom connect")).await;
        assert_eq!(reply.message, "Already connected");
        assert_eq!(h.kv.get("oauth_user_state_1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn disconnect_tracks_and_reports() {
        let h = harness(Config::default(), test_user(1));
        let handler = handler(&h);

        let reply = handler.execute(&args("/zoom disconnect")).await;
        assert_eq!(
            reply.message,
            "Could not disconnect OAuth from zoom, not found: could not find Zoom user"
        );
        assert!(h.telemetry.disconnects().is_empty());

        IdentityResolver::new(h.cfg.clone(), h.kv.clone(), h.provider.clone())
            .store_linked_user(&OAuthUserInfo {
                user_id: UserId(1),
                zoom_id: "z1".to_string(),
                zoom_email: "user1@example.com".to_string(),
                token: token("t"),
            })
            .await
            .unwrap();
        let reply = handler.execute(&args("/zoom disconnect")).await;
        assert_eq!(reply.message, "User disconnected from Zoom.");
        assert_eq!(h.telemetry.disconnects(), vec![UserId(1)]);
    }

    #[tokio::test]
    async fn account_level_disconnect_removes_superuser_token() {
        let admin = User {
            is_system_admin: true,
            ..test_user(1)
        };
        let h = harness(
            Config {
                account_level_app: true,
                ..Config::default()
            },
            admin,
        );
        h.kv.set("zoom_superuser_token", serde_json::json!({"access_token": "a"}))
            .await
            .unwrap();

        let reply = handler(&h).execute(&args("/zoom disconnect")).await;
        assert_eq!(reply.message, "Successfully disconnected from Zoom.");
        assert_eq!(h.kv.get("zoom_superuser_token").await.unwrap(), None);
    }

    #[tokio::test]
    async fn setting_validates_before_writing() {
        let h = harness(Config::default(), test_user(1));
        let handler = handler(&h);

        let reply = handler.execute(&args("/zoom setting use_pmi maybe")).await;
        assert_eq!(reply.message, "Unknown setting option maybe");
        assert_eq!(
            pmi_setting(h.preferences.as_ref(), UserId(1)).await.unwrap(),
            PmiSetting::Unset
        );

        let reply = handler.execute(&args("/zoom setting use_pmi ask")).await;
        assert_eq!(reply.message, "Update successfully, use_pmi: ask");
        assert_eq!(
            pmi_setting(h.preferences.as_ref(), UserId(1)).await.unwrap(),
            PmiSetting::Ask
        );

        let reply = handler.execute(&args("/zoom setting use_pmi")).await;
        assert_eq!(reply.message, "Set PMI option to \"true\"|\"false\"|\"ask\"");

        let reply = handler.execute(&args("/zoom setting colour")).await;
        assert_eq!(reply.message, "Unknown Action colour");

        let reply = handler.execute(&args("/zoom setting")).await;
        assert!(reply.message.contains("`/zoom setting use_pmi [true/false/ask]`"));
    }

    #[tokio::test]
    async fn setting_write_failure_has_fixed_message() {
        let h = harness(Config::default(), test_user(1))
            .with_preferences(Arc::new(BrokenPreferences));
        let reply = handler(&h)
            .execute(&args("/zoom setting use_pmi true"))
            .await;
        assert_eq!(reply.message, "Cannot update preference in zoom setting");
    }

    #[tokio::test]
    async fn start_from_chat_creates_one_meeting() {
        let h = harness(Config::default(), test_user(1));
        IdentityResolver::new(h.cfg.clone(), h.kv.clone(), h.provider.clone())
            .store_linked_user(&OAuthUserInfo {
                user_id: UserId(1),
                zoom_id: "z1".to_string(),
                zoom_email: "user1@example.com".to_string(),
                token: token("t"),
            })
            .await
            .unwrap();
        set_pmi_setting(h.preferences.as_ref(), UserId(1), PmiSetting::False)
            .await
            .unwrap();

        let reply = handler(&h).execute(&args("/zoom start team sync")).await;
        assert_eq!(reply.message, "");
        assert!(reply.error.is_none());
        assert_eq!(h.provider.created_topics(), vec!["Zoom Meeting".to_string()]);
        assert_eq!(h.platform.posts().len(), 1);
        assert_eq!(h.telemetry.starts(), vec![(UserId(1), StartSource::Command)]);
    }

    #[tokio::test]
    async fn unauthenticated_start_replies_with_prompt() {
        let h = harness(Config::default(), test_user(1));
        let handler = handler(&h);
        handler.handle(&args("/zoom start")).await;

        let ephemerals = h.platform.ephemerals();
        assert_eq!(ephemerals.len(), 1);
        assert_eq!(ephemerals[0].0, UserId(1));
        assert!(ephemerals[0].1.message.contains("Click here to link"));
        assert!(h.platform.posts().is_empty());
    }

    #[tokio::test]
    async fn non_member_reply_names_channel() {
        let h = harness(Config::default(), test_user(1));
        h.platform
            .non_members
            .lock()
            .unwrap()
            .insert((CHANNEL, UserId(1)));
        let reply = handler(&h).execute(&args("/zoom start")).await;
        assert_eq!(
            reply.message,
            "We could not get channel members (channelId: -42)"
        );
    }

    #[tokio::test]
    async fn silent_reply_sends_nothing() {
        let h = harness(Config::default(), test_user(1));
        handler(&h)
            .deliver(UserId(1), CHANNEL, Reply::silent())
            .await;
        assert!(h.platform.ephemerals().is_empty());
    }
}
