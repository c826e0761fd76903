use async_trait::async_trait;

use crate::domain::order::Order;

/// Best-effort snapshot of the last successful fetch.
#[async_trait]
pub trait OrderCache: Send + Sync + 'static {
    /// Overwrites the snapshot. Storage problems are logged, not returned.
    async fn save(&self, orders: &[Order]);

    /// The snapshot, if one exists and is still within its freshness window.
    async fn load(&self) -> Option<Vec<Order>>;
}
