use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use crate::{domain::UserId, errors::Error, store::KvStore, Result};

pub const PREFERENCE_CATEGORY: &str = "plugin:zoom";
pub const PMI_SETTING_NAME: &str = "use-pmi";

/// Per-user single-valued settings keyed by `(category, name)`.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, user_id: UserId, category: &str, name: &str) -> Result<Option<String>>;

    async fn set(&self, user_id: UserId, category: &str, name: &str, value: &str) -> Result<()>;
}

/// Whether meetings started with `/zoom start` use the Personal Meeting ID.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PmiSetting {
    /// Never configured; behaves like `Ask`.
    #[default]
    Unset,
    True,
    False,
    Ask,
}

impl PmiSetting {
    pub fn as_str(self) -> &'static str {
        match self {
            PmiSetting::Unset => "",
            PmiSetting::True => "true",
            PmiSetting::False => "false",
            PmiSetting::Ask => "ask",
        }
    }

    /// Parse a user-typed value from `/zoom setting use_pmi <value>`.
    pub fn from_choice(value: &str) -> Option<Self> {
        match value {
            "true" => Some(PmiSetting::True),
            "false" => Some(PmiSetting::False),
            "ask" => Some(PmiSetting::Ask),
            _ => None,
        }
    }

    /// Interpret a stored value. Any concrete value other than `true`/`ask`
    /// means "create a fresh meeting".
    pub fn from_stored(value: &str) -> Self {
        match value {
            "" => PmiSetting::Unset,
            "ask" => PmiSetting::Ask,
            "true" => PmiSetting::True,
            _ => PmiSetting::False,
        }
    }
}

impl fmt::Display for PmiSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub async fn pmi_setting(prefs: &dyn PreferenceStore, user_id: UserId) -> Result<PmiSetting> {
    let stored = prefs
        .get(user_id, PREFERENCE_CATEGORY, PMI_SETTING_NAME)
        .await?;
    Ok(stored
        .as_deref()
        .map(PmiSetting::from_stored)
        .unwrap_or_default())
}

pub async fn set_pmi_setting(
    prefs: &dyn PreferenceStore,
    user_id: UserId,
    setting: PmiSetting,
) -> Result<()> {
    prefs
        .set(
            user_id,
            PREFERENCE_CATEGORY,
            PMI_SETTING_NAME,
            setting.as_str(),
        )
        .await
}

/// Preferences kept in the bridge's own KV store, for platforms without a
/// native per-user preference API.
pub struct KvPreferenceStore {
    kv: Arc<dyn KvStore>,
}

impl KvPreferenceStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn key(user_id: UserId, category: &str, name: &str) -> String {
        format!("pref_{user_id}_{category}_{name}")
    }
}

#[async_trait]
impl PreferenceStore for KvPreferenceStore {
    async fn get(&self, user_id: UserId, category: &str, name: &str) -> Result<Option<String>> {
        match self.kv.get(&Self::key(user_id, category, name)).await? {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(Error::Store(format!(
                "preference {category}/{name} is not a string: {other}"
            ))),
        }
    }

    async fn set(&self, user_id: UserId, category: &str, name: &str, value: &str) -> Result<()> {
        self.kv
            .set(
                &Self::key(user_id, category, name),
                Value::String(value.to_string()),
            )
            .await
    }
}
