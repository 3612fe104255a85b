use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::UserId, errors::Error, Result};

/// Typed, immutable deployment configuration.
///
/// Built once at startup and shared as `Arc<Config>`; nothing in the core reads
/// the environment after `load()` returns.
#[derive(Clone, Debug)]
pub struct Config {
    // Chat platform
    pub telegram_bot_token: String,
    pub bot_user_id: UserId,
    pub trigger: String,
    pub site_url: String,
    pub admin_users: Vec<i64>,
    pub user_emails: HashMap<i64, String>,

    // Zoom
    pub oauth_enabled: bool,
    pub account_level_app: bool,
    pub zoom_client_id: String,
    pub zoom_client_secret: String,
    pub zoom_account_id: Option<String>,
    pub zoom_api_url: String,
    pub zoom_url: String,

    // Persistence / telemetry
    pub store_file: PathBuf,
    pub telemetry_log_path: PathBuf,

    // Behavior
    pub recent_meeting_window: Duration,
    pub history_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_bot_token: String::new(),
            bot_user_id: UserId(0),
            trigger: "/zoom".to_string(),
            site_url: "http://localhost:8065".to_string(),
            admin_users: Vec::new(),
            user_emails: HashMap::new(),
            oauth_enabled: true,
            account_level_app: false,
            zoom_client_id: String::new(),
            zoom_client_secret: String::new(),
            zoom_account_id: None,
            zoom_api_url: "https://api.zoom.us/v2".to_string(),
            zoom_url: "https://zoom.us".to_string(),
            store_file: PathBuf::from("/tmp/zcb-store.json"),
            telemetry_log_path: PathBuf::from("/tmp/zcb-telemetry.log"),
            recent_meeting_window: Duration::from_secs(30),
            history_size: 50,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        let defaults = Self::default();

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let site_url = env_str("ZCB_SITE_URL")
            .and_then(non_empty)
            .map(|s| s.trim_end_matches('/').to_string())
            .ok_or_else(|| {
                Error::Config("ZCB_SITE_URL environment variable is required".to_string())
            })?;

        let admin_users = parse_csv_i64(env_str("ZCB_ADMIN_USERS"));
        let user_emails = parse_user_emails(env_str("ZCB_USER_EMAILS"));

        let oauth_enabled = env_bool("ZOOM_ENABLE_OAUTH").unwrap_or(defaults.oauth_enabled);
        let account_level_app =
            env_bool("ZOOM_ACCOUNT_LEVEL_APP").unwrap_or(defaults.account_level_app);

        let zoom_client_id = env_str("ZOOM_OAUTH_CLIENT_ID").unwrap_or_default();
        let zoom_client_secret = env_str("ZOOM_OAUTH_CLIENT_SECRET").unwrap_or_default();
        if oauth_enabled && (zoom_client_id.is_empty() || zoom_client_secret.is_empty()) {
            return Err(Error::Config(
                "ZOOM_OAUTH_CLIENT_ID and ZOOM_OAUTH_CLIENT_SECRET are required when OAuth is enabled"
                    .to_string(),
            ));
        }
        let zoom_account_id = env_str("ZOOM_ACCOUNT_ID").and_then(non_empty);

        let zoom_api_url = env_str("ZOOM_API_URL")
            .and_then(non_empty)
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(defaults.zoom_api_url);
        let zoom_url = env_str("ZOOM_URL")
            .and_then(non_empty)
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(defaults.zoom_url);

        let store_file = env_path("ZCB_STORE_FILE").unwrap_or(defaults.store_file);
        let telemetry_log_path =
            env_path("ZCB_TELEMETRY_LOG").unwrap_or(defaults.telemetry_log_path);

        let recent_meeting_window = env_u64("ZCB_RECENT_MEETING_WINDOW")
            .map(Duration::from_secs)
            .unwrap_or(defaults.recent_meeting_window);
        let history_size = env_usize("ZCB_HISTORY_SIZE")
            .unwrap_or(defaults.history_size)
            .max(1);

        Ok(Self {
            telegram_bot_token,
            bot_user_id: defaults.bot_user_id,
            trigger: defaults.trigger,
            site_url,
            admin_users,
            user_emails,
            oauth_enabled,
            account_level_app,
            zoom_client_id,
            zoom_client_secret,
            zoom_account_id,
            zoom_api_url,
            zoom_url,
            store_file,
            telemetry_log_path,
            recent_meeting_window,
            history_size,
        })
    }

    /// Where `/zoom connect` sends the user to link their account.
    pub fn oauth_connect_url(&self) -> String {
        format!("{}/oauth2/connect", self.site_url)
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_users.contains(&user_id.0)
    }

    pub fn email_for(&self, user_id: UserId) -> Option<String> {
        self.user_emails.get(&user_id.0).cloned()
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

/// `123=alice@example.com,456=bob@example.com`
fn parse_user_emails(v: Option<String>) -> HashMap<i64, String> {
    v.unwrap_or_default()
        .split(',')
        .filter_map(|pair| {
            let (id, email) = pair.split_once('=')?;
            let id = id.trim().parse::<i64>().ok()?;
            let email = email.trim();
            if email.is_empty() {
                return None;
            }
            Some((id, email.to_string()))
        })
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
