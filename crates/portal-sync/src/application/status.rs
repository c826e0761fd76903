use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use portal_types::domain::notification::Notification;
use portal_types::domain::order::OrderStatus;
use portal_types::ports::confirm::ConfirmPrompt;
use portal_types::ports::notifier::Notifier;
use portal_types::ports::order_gateway::{GatewayError, OrderGateway};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::board::OrderBoard;
use super::scheduler::PollingScheduler;

pub const GENERIC_FAILURE: &str = "Failed to update order. Please try again.";

/// When the board shows a new status: before the endpoint answers, or after.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePolicy {
    #[default]
    Optimistic,
    Pessimistic,
}

impl fmt::Display for UpdatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdatePolicy::Optimistic => f.write_str("optimistic"),
            UpdatePolicy::Pessimistic => f.write_str("pessimistic"),
        }
    }
}

impl FromStr for UpdatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "optimistic" => Ok(UpdatePolicy::Optimistic),
            "pessimistic" => Ok(UpdatePolicy::Pessimistic),
            other => Err(format!("unknown update policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StatusChange {
    Applied {
        order_id: String,
        status: OrderStatus,
        policy: UpdatePolicy,
    },
    /// The operator said no at the confirmation step.
    Declined { order_id: String },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdateError {
    #[error("order {0} is not on the board")]
    NotFound(String),

    #[error("order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Answers every confirmation the same way. Used where the caller has
/// already asked, e.g. an HTTP request carrying `confirm: true`.
pub struct PresetAnswer(pub bool);

#[async_trait]
impl ConfirmPrompt for PresetAnswer {
    async fn confirm(&self, _order_id: &str, _status: OrderStatus) -> bool {
        self.0
    }
}

pub struct StatusUpdateCoordinator<G: OrderGateway> {
    gateway: Arc<G>,
    board: OrderBoard,
    scheduler: PollingScheduler<G>,
    notifier: Arc<dyn Notifier>,
}

impl<G: OrderGateway> StatusUpdateCoordinator<G> {
    pub fn new(
        gateway: Arc<G>,
        scheduler: PollingScheduler<G>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            gateway,
            board: scheduler.board().clone(),
            scheduler,
            notifier,
        }
    }

    pub async fn change_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        policy: UpdatePolicy,
        prompt: &dyn ConfirmPrompt,
    ) -> Result<StatusChange, StatusUpdateError> {
        let current = self
            .board
            .order(order_id)
            .await
            .ok_or_else(|| StatusUpdateError::NotFound(order_id.to_string()))?;

        if !current.status.can_transition_to(status) {
            self.notifier.notify(Notification::error(format!(
                "Order {order_id} cannot move from {} to {status}",
                current.status
            )));
            return Err(StatusUpdateError::InvalidTransition {
                order_id: order_id.to_string(),
                from: current.status,
                to: status,
            });
        }

        if status.requires_confirmation() && !prompt.confirm(order_id, status).await {
            info!(order_id, "cancellation not confirmed");
            return Ok(StatusChange::Declined {
                order_id: order_id.to_string(),
            });
        }

        match policy {
            UpdatePolicy::Optimistic => self.optimistic(order_id, status).await?,
            UpdatePolicy::Pessimistic => self.pessimistic(order_id, status).await?,
        }
        Ok(StatusChange::Applied {
            order_id: order_id.to_string(),
            status,
            policy,
        })
    }

    async fn optimistic(&self, order_id: &str, status: OrderStatus) -> Result<(), StatusUpdateError> {
        let update = self
            .board
            .apply_optimistic(order_id, status)
            .await
            .ok_or_else(|| StatusUpdateError::NotFound(order_id.to_string()))?;

        match self.gateway.update_status(order_id, status).await {
            Ok(_) => {
                self.notify_success(order_id, status);
                Ok(())
            }
            Err(e) => {
                let restored = self.board.rollback(&update).await;
                warn!(order_id, error = %e, restored, "status update failed, rolled back");
                self.notify_failure(&e);
                Err(e.into())
            }
        }
    }

    async fn pessimistic(&self, order_id: &str, status: OrderStatus) -> Result<(), StatusUpdateError> {
        if let Err(e) = self.gateway.update_status(order_id, status).await {
            warn!(order_id, error = %e, "status update failed");
            self.notify_failure(&e);
            return Err(e.into());
        }
        self.notify_success(order_id, status);
        let result = self.scheduler.refresh_latest().await;
        info!(order_id, ?result, "refreshed after confirmed update");
        Ok(())
    }

    fn notify_success(&self, order_id: &str, status: OrderStatus) {
        let message = if status == OrderStatus::Cancelled {
            format!("Order {order_id} cancelled")
        } else {
            format!("Order {order_id} updated to {status}")
        };
        info!(order_id, %status, "status updated");
        self.notifier.notify(Notification::success(message));
    }

    fn notify_failure(&self, err: &GatewayError) {
        let message = err.server_message().unwrap_or(GENERIC_FAILURE);
        self.notifier.notify(Notification::error(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Pessimistic".parse::<UpdatePolicy>(), Ok(UpdatePolicy::Pessimistic));
        assert_eq!(" optimistic ".parse::<UpdatePolicy>(), Ok(UpdatePolicy::Optimistic));
        assert!("eager".parse::<UpdatePolicy>().is_err());
        assert_eq!(UpdatePolicy::default(), UpdatePolicy::Optimistic);
    }

    #[test]
    fn change_serializes_with_outcome_tag() {
        let json = serde_json::to_value(StatusChange::Applied {
            order_id: "A".into(),
            status: OrderStatus::Ready,
            policy: UpdatePolicy::Pessimistic,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "outcome": "applied",
                "order_id": "A",
                "status": "ready",
                "policy": "pessimistic"
            })
        );
    }
}
