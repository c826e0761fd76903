use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use portal_types::domain::notification::{Notification, NotificationLevel};
use portal_types::ports::notifier::Notifier;
use serde::Serialize;
use tracing::{error, info, warn};

pub const FEED_CAPACITY: usize = 50;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FeedEntry {
    pub id: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub notification: Notification,
}

#[derive(Default)]
struct Feed {
    entries: VecDeque<FeedEntry>,
    last_id: u64,
}

/// The most recent toasts, oldest first.
#[derive(Default)]
pub struct NotificationFeed {
    feed: Mutex<Feed>,
}

impl NotificationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries with an id greater than `after`.
    pub fn since(&self, after: u64) -> Vec<FeedEntry> {
        let Ok(feed) = self.feed.lock() else {
            return Vec::new();
        };
        feed.entries
            .iter()
            .filter(|e| e.id > after)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<FeedEntry> {
        self.since(0)
    }
}

impl Notifier for NotificationFeed {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Success => info!(message = %notification.message, "notify"),
            NotificationLevel::Warning => warn!(message = %notification.message, "notify"),
            NotificationLevel::Error => error!(message = %notification.message, "notify"),
        }

        let Ok(mut feed) = self.feed.lock() else {
            return;
        };
        feed.last_id += 1;
        let entry = FeedEntry {
            id: feed.last_id,
            at: Utc::now(),
            notification,
        };
        feed.entries.push_back(entry);
        while feed.entries.len() > FEED_CAPACITY {
            feed.entries.pop_front();
        }
    }
}
