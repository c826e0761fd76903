use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::domain::analytics::AnalyticsSummary;
use crate::domain::customer::Customer;
use crate::domain::order::{Order, OrderStatus};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("endpoint answered with http {code}")]
    Status { code: u16, message: Option<String> },

    #[error("request timed out")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("rejected by endpoint: {0}")]
    Rejected(String),
}

impl GatewayError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GatewayError::Cancelled)
    }

    /// Failures worth another transport. A rejection is the endpoint's final
    /// word and a cancellation must stop the chain.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Transport(_)
                | GatewayError::Status { .. }
                | GatewayError::Timeout
                | GatewayError::Decode(_)
        )
    }

    pub fn server_message(&self) -> Option<&str> {
        match self {
            GatewayError::Status {
                message: Some(m), ..
            } => Some(m),
            GatewayError::Rejected(m) => Some(m),
            _ => None,
        }
    }
}

/// Orders as handed to the board. `offline` marks data that did not come
/// from a live fetch (cached snapshot or nothing at all).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderList {
    pub orders: Vec<Order>,
    pub offline: bool,
}

impl OrderList {
    pub fn live(orders: Vec<Order>) -> Self {
        Self {
            orders,
            offline: false,
        }
    }

    pub fn offline(orders: Vec<Order>) -> Self {
        Self {
            orders,
            offline: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched(OrderList),
    /// The caller's token fired; nothing must be applied.
    Cancelled,
}

/// Acknowledgement of a status mutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerAck {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl ServerAck {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(_) => serde_json::from_value(value).unwrap_or_default(),
            Value::Null => Self::default(),
            other => Self {
                data: Some(other),
                ..Self::default()
            },
        }
    }
}

#[async_trait]
pub trait OrderGateway: Send + Sync + 'static {
    /// Never fails: falls back to the cached snapshot, then to an empty list.
    async fn fetch_orders(&self, cancel: &CancellationToken) -> FetchOutcome;

    /// Live fetch only; every failure is returned to the caller.
    async fn try_fetch_orders(&self, cancel: &CancellationToken)
        -> Result<Vec<Order>, GatewayError>;

    async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<ServerAck, GatewayError>;

    async fn fetch_analytics(&self) -> AnalyticsSummary;

    async fn fetch_customers(&self) -> Vec<Customer>;
}
