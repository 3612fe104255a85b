use std::sync::Arc;

use serde_json::Value;

use crate::{
    domain::{ChannelId, UserId},
    errors::Error,
    store::KvStore,
    Result,
};

const NONCE_LEN: usize = 15;

/// Intent recorded before sending a user through OAuth, consumed when the
/// redirect comes back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingConnection {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    /// `true` when recorded by `/zoom connect`; `false` when an unauthenticated
    /// `/zoom start` sent the user to connect, in which case completing OAuth
    /// starts a meeting in `channel_id`.
    pub just_connect: bool,
    /// Opaque OAuth `state` parameter (`<nonce>_<user>_<channel>_<flag>`).
    pub state: String,
}

impl PendingConnection {
    fn parse(state: &str) -> Option<Self> {
        let mut parts = state.split('_');
        let nonce = parts.next()?;
        let user_id = UserId(parts.next()?.parse().ok()?);
        let channel_id = ChannelId(parts.next()?.parse().ok()?);
        let just_connect = match parts.next()? {
            "true" => true,
            "false" => false,
            _ => return None,
        };
        if nonce.is_empty() || parts.next().is_some() {
            return None;
        }
        Some(Self {
            user_id,
            channel_id,
            just_connect,
            state: state.to_string(),
        })
    }
}

/// At most one pending connection per user; a new one replaces the old.
pub struct PendingConnections {
    kv: Arc<dyn KvStore>,
}

impl PendingConnections {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn key(user_id: UserId) -> String {
        format!("oauth_user_state_{user_id}")
    }

    pub async fn store(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        just_connect: bool,
    ) -> Result<PendingConnection> {
        let nonce: String = uuid::Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(NONCE_LEN)
            .collect();
        let state = format!("{nonce}_{user_id}_{channel_id}_{just_connect}");
        self.kv
            .set(&Self::key(user_id), Value::String(state.clone()))
            .await?;
        Ok(PendingConnection {
            user_id,
            channel_id,
            just_connect,
            state,
        })
    }

    /// Read without consuming (used to build the authorize URL).
    pub async fn peek(&self, user_id: UserId) -> Result<Option<PendingConnection>> {
        let value = self.kv.get(&Self::key(user_id)).await?;
        Self::decode(user_id, value)
    }

    /// Read-then-delete. A second call for the same entry returns `None`.
    pub async fn consume(&self, user_id: UserId) -> Result<Option<PendingConnection>> {
        let value = self.kv.take(&Self::key(user_id)).await?;
        Self::decode(user_id, value)
    }

    fn decode(user_id: UserId, value: Option<Value>) -> Result<Option<PendingConnection>> {
        let Some(value) = value else {
            return Ok(None);
        };
        let pending = value
            .as_str()
            .and_then(PendingConnection::parse)
            .ok_or_else(|| Error::Store(format!("malformed oauth state for user {user_id}")))?;
        if pending.user_id != user_id {
            return Err(Error::Store(format!(
                "oauth state for user {user_id} belongs to user {}",
                pending.user_id
            )));
        }
        Ok(Some(pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKvStore;

    fn tracker() -> (Arc<MemoryKvStore>, PendingConnections) {
        let kv = Arc::new(MemoryKvStore::new());
        (kv.clone(), PendingConnections::new(kv))
    }

    #[tokio::test]
    async fn consume_is_one_shot() {
        let (_, pending) = tracker();
        let stored = pending
            .store(UserId(1), ChannelId(-100), false)
            .await
            .unwrap();

        let first = pending.consume(UserId(1)).await.unwrap();
        assert_eq!(first, Some(stored));
        assert_eq!(pending.consume(UserId(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn second_store_overwrites_first() {
        let (_, pending) = tracker();
        pending.store(UserId(1), ChannelId(10), false).await.unwrap();
        let latest = pending.store(UserId(1), ChannelId(20), true).await.unwrap();

        let got = pending.consume(UserId(1)).await.unwrap().unwrap();
        assert_eq!(got.channel_id, ChannelId(20));
        assert!(got.just_connect);
        assert_eq!(got.state, latest.state);
    }

    #[tokio::test]
    async fn peek_does_not_consume() {
        let (_, pending) = tracker();
        pending.store(UserId(3), ChannelId(3), true).await.unwrap();
        assert!(pending.peek(UserId(3)).await.unwrap().is_some());
        assert!(pending.consume(UserId(3)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn state_layout_matches_stored_value() {
        let (kv, pending) = tracker();
        let p = pending.store(UserId(42), ChannelId(-7), true).await.unwrap();
        let raw = kv.get("oauth_user_state_42").await.unwrap().unwrap();
        assert_eq!(raw.as_str(), Some(p.state.as_str()));

        let parts: Vec<&str> = p.state.split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0].len(), NONCE_LEN);
        assert_eq!(&parts[1..], &["42", "-7", "true"]);
    }

    #[tokio::test]
    async fn malformed_state_is_an_error() {
        let (kv, pending) = tracker();
        kv.set("oauth_user_state_5", Value::String("garbage".to_string()))
            .await
            .unwrap();
        assert!(pending.consume(UserId(5)).await.is_err());
    }
}
