use std::{collections::HashMap, sync::Arc, sync::Mutex};

use zcb_core::{
    config::Config,
    domain::{User, UserId},
};

/// Profiles of users seen in updates. Telegram exposes neither email nor a
/// notion of system admin, so both come from the deployment config.
pub struct UserDirectory {
    cfg: Arc<Config>,
    users: Mutex<HashMap<UserId, User>>,
}

impl UserDirectory {
    pub fn new(cfg: Arc<Config>) -> Self {
        Self {
            cfg,
            users: Mutex::new(HashMap::new()),
        }
    }

    pub fn remember(&self, tg: &teloxide::types::User) -> User {
        let id = UserId(tg.id.0 as i64);
        let user = User {
            id,
            username: tg.username.clone().unwrap_or_else(|| tg.first_name.clone()),
            email: self.cfg.email_for(id),
            is_system_admin: self.cfg.is_admin(id),
        };
        self.users
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, user.clone());
        user
    }

    pub fn get(&self, id: UserId) -> Option<User> {
        self.users
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }
}
