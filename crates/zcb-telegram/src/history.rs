//! Bot API has no "read channel history" call, so the adapter keeps the posts
//! it published itself, per chat, in a bounded ring buffer.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use chrono::{DateTime, Utc};

use zcb_core::domain::{ChannelId, Post};

pub struct PostHistory {
    capacity: usize,
    inner: Mutex<HashMap<ChannelId, VecDeque<Post>>>,
}

impl PostHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, post: Post) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let ring = inner.entry(post.channel_id).or_default();
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(post);
    }

    /// Posts in `channel_id` created at or after `since`, newest first.
    pub fn since(&self, channel_id: ChannelId, since: DateTime<Utc>) -> Vec<Post> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .get(&channel_id)
            .map(|ring| {
                ring.iter()
                    .rev()
                    .filter(|p| p.created_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
