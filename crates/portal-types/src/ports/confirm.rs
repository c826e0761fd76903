use async_trait::async_trait;

use crate::domain::order::OrderStatus;

/// Yes/no question put to the operator before a destructive transition.
#[async_trait]
pub trait ConfirmPrompt: Send + Sync {
    async fn confirm(&self, order_id: &str, status: OrderStatus) -> bool;
}
