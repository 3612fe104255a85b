//! Fake ports shared by the unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    config::Config,
    domain::{ChannelId, Post, PostId, User, UserId},
    errors::Error,
    ports::{ChatPlatform, MeetingProvider, Ports},
    preferences::{KvPreferenceStore, PreferenceStore},
    provider::{Credential, Meeting, OAuthToken, ZoomUser},
    store::MemoryKvStore,
    telemetry::{StartSource, Telemetry},
    Result,
};

pub const TEST_PMI: i64 = 9_876_543_210;
pub const CREATED_MEETING_ID: i64 = 81_234_567;

pub fn test_user(id: i64) -> User {
    User {
        id: UserId(id),
        username: format!("user{id}"),
        email: Some(format!("user{id}@example.com")),
        is_system_admin: false,
    }
}

pub fn token(access: &str) -> OAuthToken {
    OAuthToken {
        access_token: access.to_string(),
        refresh_token: String::new(),
        token_type: "bearer".to_string(),
        expires_at: None,
    }
}

pub fn zoom_user(pmi: i64) -> ZoomUser {
    ZoomUser {
        id: "zoom-user".to_string(),
        email: "zoom@example.com".to_string(),
        first_name: "Zoe".to_string(),
        last_name: "Oom".to_string(),
        pmi,
    }
}

#[derive(Default)]
pub struct FakePlatform {
    pub users: Mutex<HashMap<UserId, User>>,
    /// Channels the user is NOT a member of.
    pub non_members: Mutex<HashSet<(ChannelId, UserId)>>,
    pub history: Mutex<Vec<Post>>,
    pub ephemerals: Mutex<Vec<(UserId, Post)>>,
    pub posts: Mutex<Vec<Post>>,
    pub fail_history: bool,
    pub fail_create_post: bool,
    pub fail_get_user: bool,
}

impl FakePlatform {
    pub fn with_user(user: User) -> Self {
        let platform = Self::default();
        platform.users.lock().unwrap().insert(user.id, user);
        platform
    }

    pub fn ephemerals(&self) -> Vec<(UserId, Post)> {
        self.ephemerals.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<Post> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn get_user(&self, user_id: UserId) -> Result<User> {
        if self.fail_get_user {
            return Err(Error::Platform("user lookup failed".to_string()));
        }
        self.users
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("user {user_id}")))
    }

    async fn is_channel_member(&self, channel_id: ChannelId, user_id: UserId) -> Result<bool> {
        Ok(!self
            .non_members
            .lock()
            .unwrap()
            .contains(&(channel_id, user_id)))
    }

    async fn send_ephemeral(&self, user_id: UserId, post: Post) -> Result<()> {
        self.ephemerals.lock().unwrap().push((user_id, post));
        Ok(())
    }

    async fn create_post(&self, mut post: Post) -> Result<PostId> {
        if self.fail_create_post {
            return Err(Error::Platform("create post failed".to_string()));
        }
        let mut posts = self.posts.lock().unwrap();
        let id = PostId(posts.len() as i64 + 1);
        post.id = Some(id);
        posts.push(post);
        Ok(id)
    }

    async fn posts_since(&self, channel_id: ChannelId, since: DateTime<Utc>) -> Result<Vec<Post>> {
        if self.fail_history {
            return Err(Error::Platform("history unavailable".to_string()));
        }
        let mut out: Vec<Post> = self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.channel_id == channel_id && p.created_at >= since)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}

pub struct FakeProvider {
    pub user: ZoomUser,
    pub fail_get_user: bool,
    pub fail_create: bool,
    pub exchanged_token: OAuthToken,
    pub lookups: Mutex<Vec<String>>,
    pub created_topics: Mutex<Vec<String>>,
    pub exchanged_codes: Mutex<Vec<String>>,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self {
            user: zoom_user(TEST_PMI),
            fail_get_user: false,
            fail_create: false,
            exchanged_token: token("fresh-token"),
            lookups: Mutex::new(Vec::new()),
            created_topics: Mutex::new(Vec::new()),
            exchanged_codes: Mutex::new(Vec::new()),
        }
    }
}

impl FakeProvider {
    pub fn user_lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }

    pub fn created_topics(&self) -> Vec<String> {
        self.created_topics.lock().unwrap().clone()
    }

    pub fn exchanged_codes(&self) -> Vec<String> {
        self.exchanged_codes.lock().unwrap().clone()
    }
}

#[async_trait]
impl MeetingProvider for FakeProvider {
    async fn get_user(&self, _credential: &Credential, user: &str) -> Result<ZoomUser> {
        self.lookups.lock().unwrap().push(user.to_string());
        if self.fail_get_user {
            return Err(Error::Provider("user not found".to_string()));
        }
        Ok(self.user.clone())
    }

    async fn create_meeting(
        &self,
        _credential: &Credential,
        _host: &ZoomUser,
        topic: &str,
    ) -> Result<Meeting> {
        self.created_topics.lock().unwrap().push(topic.to_string());
        if self.fail_create {
            return Err(Error::Provider("create meeting failed".to_string()));
        }
        Ok(Meeting {
            id: CREATED_MEETING_ID,
            join_url: format!("https://zoom.us/j/{CREATED_MEETING_ID}"),
            topic: topic.to_string(),
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<OAuthToken> {
        self.exchanged_codes.lock().unwrap().push(code.to_string());
        Ok(self.exchanged_token.clone())
    }

    fn authorize_url(&self, state: &str) -> String {
        format!("https://zoom.us/oauth/authorize?state={state}")
    }
}

#[derive(Default)]
pub struct FakeTelemetry {
    pub starts: Mutex<Vec<(UserId, StartSource)>>,
    pub disconnects: Mutex<Vec<UserId>>,
}

impl FakeTelemetry {
    pub fn starts(&self) -> Vec<(UserId, StartSource)> {
        self.starts.lock().unwrap().clone()
    }

    pub fn disconnects(&self) -> Vec<UserId> {
        self.disconnects.lock().unwrap().clone()
    }
}

impl Telemetry for FakeTelemetry {
    fn track_meeting_start(&self, user_id: UserId, source: StartSource) {
        self.starts.lock().unwrap().push((user_id, source));
    }

    fn track_disconnect(&self, user_id: UserId) {
        self.disconnects.lock().unwrap().push(user_id);
    }
}

/// Preferences whose reads and writes always fail.
pub struct BrokenPreferences;

#[async_trait]
impl PreferenceStore for BrokenPreferences {
    async fn get(&self, _user_id: UserId, _category: &str, _name: &str) -> Result<Option<String>> {
        Err(Error::Store("preferences unavailable".to_string()))
    }

    async fn set(&self, _user_id: UserId, _category: &str, _name: &str, _value: &str) -> Result<()> {
        Err(Error::Store("preferences unavailable".to_string()))
    }
}

/// Fully wired fake environment.
pub struct Harness {
    pub cfg: Arc<Config>,
    pub platform: Arc<FakePlatform>,
    pub provider: Arc<FakeProvider>,
    pub kv: Arc<MemoryKvStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub telemetry: Arc<FakeTelemetry>,
}

impl Harness {
    pub fn new(cfg: Config, platform: FakePlatform, provider: FakeProvider) -> Self {
        let kv = Arc::new(MemoryKvStore::new());
        Self {
            cfg: Arc::new(cfg),
            platform: Arc::new(platform),
            provider: Arc::new(provider),
            preferences: Arc::new(KvPreferenceStore::new(kv.clone())),
            kv,
            telemetry: Arc::new(FakeTelemetry::default()),
        }
    }

    pub fn with_preferences(mut self, preferences: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn ports(&self) -> Ports {
        Ports {
            platform: self.platform.clone(),
            provider: self.provider.clone(),
            preferences: self.preferences.clone(),
            kv: self.kv.clone(),
            telemetry: self.telemetry.clone(),
        }
    }
}
