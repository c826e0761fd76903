//! Last-known order snapshot for offline reads.
//!
//! Two entries live under the namespace: the serialized order list and the
//! epoch-millisecond time it was written. A snapshot older than the freshness
//! window is reported absent even though the bytes are still there.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use portal_types::domain::order::Order;
use portal_types::ports::key_value_store::KeyValueStore;
use portal_types::ports::order_cache::OrderCache;
use tracing::{debug, warn};

pub const DEFAULT_NAMESPACE: &str = "owner_portal";
pub const ORDERS_KEY: &str = "cached_orders";
pub const TIMESTAMP_KEY: &str = "cached_orders_timestamp";

pub fn default_freshness() -> Duration {
    Duration::minutes(5)
}

pub struct LocalCache<S: KeyValueStore> {
    store: S,
    namespace: String,
    freshness: Duration,
}

impl<S: KeyValueStore> LocalCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            namespace: DEFAULT_NAMESPACE.to_string(),
            freshness: default_freshness(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn key(&self, name: &str) -> String {
        format!("{}:{}", self.namespace, name)
    }

    pub async fn save_at(&self, orders: &[Order], now: DateTime<Utc>) {
        let payload = match serde_json::to_string(orders) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "could not serialize order snapshot");
                return;
            }
        };
        if let Err(e) = self.store.set(&self.key(ORDERS_KEY), &payload).await {
            warn!(error = %e, "could not write order snapshot");
            return;
        }
        let stamp = now.timestamp_millis().to_string();
        if let Err(e) = self.store.set(&self.key(TIMESTAMP_KEY), &stamp).await {
            warn!(error = %e, "could not write order snapshot timestamp");
            return;
        }
        debug!(count = orders.len(), "order snapshot saved");
    }

    pub async fn load_at(&self, now: DateTime<Utc>) -> Option<Vec<Order>> {
        let raw = self.read(ORDERS_KEY).await?;
        let saved_at = self
            .read(TIMESTAMP_KEY)
            .await?
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)?;

        let age = now.signed_duration_since(saved_at);
        if age >= self.freshness {
            debug!(age_secs = age.num_seconds(), "order snapshot too old");
            return None;
        }

        match serde_json::from_str::<Vec<Order>>(&raw) {
            Ok(orders) => Some(orders),
            Err(e) => {
                warn!(error = %e, "discarding unreadable order snapshot");
                None
            }
        }
    }

    async fn read(&self, name: &str) -> Option<String> {
        match self.store.get(&self.key(name)).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, key = name, "could not read order snapshot");
                None
            }
        }
    }
}

#[async_trait]
impl<S: KeyValueStore> OrderCache for LocalCache<S> {
    async fn save(&self, orders: &[Order]) {
        self.save_at(orders, Utc::now()).await
    }

    async fn load(&self) -> Option<Vec<Order>> {
        self.load_at(Utc::now()).await
    }
}
