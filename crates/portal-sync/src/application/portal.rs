use std::sync::Arc;
use std::time::{Duration, Instant};

use portal_types::domain::analytics::AnalyticsSummary;
use portal_types::domain::customer::Customer;
use portal_types::domain::order::{Order, OrderStatus};
use portal_types::ports::confirm::ConfirmPrompt;
use portal_types::ports::order_gateway::OrderGateway;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::board::{BoardView, OrderBoard, DEFAULT_HIGHLIGHT};
use super::notify::{FeedEntry, NotificationFeed};
use super::scheduler::{PollResult, PollSettings, PollStatus, PollingScheduler};
use super::status::{StatusChange, StatusUpdateCoordinator, UpdatePolicy};
use crate::errors::AppError;

#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    pub poll: PollSettings,
    pub highlight_for: Duration,
    pub default_policy: UpdatePolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll: PollSettings::default(),
            highlight_for: DEFAULT_HIGHLIGHT,
            default_policy: UpdatePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PortalView {
    #[serde(flatten)]
    pub board: BoardView,
    pub poll: PollStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub reachable: bool,
    pub order_count: usize,
    pub latency_ms: u64,
}

/// Everything the owner dashboard talks to, wired together.
pub struct PortalService<G: OrderGateway> {
    gateway: Arc<G>,
    board: OrderBoard,
    scheduler: PollingScheduler<G>,
    coordinator: StatusUpdateCoordinator<G>,
    notifications: Arc<NotificationFeed>,
    default_policy: UpdatePolicy,
}

impl<G: OrderGateway> PortalService<G> {
    pub fn new(gateway: Arc<G>, settings: SyncSettings) -> Self {
        let board = OrderBoard::new(settings.highlight_for);
        let notifications = Arc::new(NotificationFeed::new());
        let scheduler = PollingScheduler::new(
            gateway.clone(),
            board.clone(),
            settings.poll,
            notifications.clone(),
        );
        let coordinator =
            StatusUpdateCoordinator::new(gateway.clone(), scheduler.clone(), notifications.clone());
        Self {
            gateway,
            board,
            scheduler,
            coordinator,
            notifications,
            default_policy: settings.default_policy,
        }
    }

    pub fn board(&self) -> &OrderBoard {
        &self.board
    }

    pub fn scheduler(&self) -> &PollingScheduler<G> {
        &self.scheduler
    }

    pub async fn start(&self) -> bool {
        self.scheduler.start().await
    }

    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        info!("portal sync stopped");
    }

    pub async fn view(&self) -> PortalView {
        PortalView {
            board: self.board.view().await,
            poll: self.scheduler.status().await,
        }
    }

    pub async fn order(&self, order_id: &str) -> Result<Order, AppError> {
        self.board
            .order(order_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("order {order_id}")))
    }

    pub async fn change_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        policy: Option<UpdatePolicy>,
        prompt: &dyn ConfirmPrompt,
    ) -> Result<StatusChange, AppError> {
        let policy = policy.unwrap_or(self.default_policy);
        Ok(self
            .coordinator
            .change_status(order_id, status, policy, prompt)
            .await?)
    }

    pub async fn refresh(&self) -> PollResult {
        self.scheduler.refresh().await
    }

    pub async fn set_visibility(&self, visible: bool) {
        self.scheduler.set_visibility(visible).await
    }

    pub async fn set_online(&self, online: bool) {
        self.scheduler.set_online(online).await
    }

    /// A live fetch whose failure is reported instead of papered over.
    pub async fn test_connection(&self) -> Result<ConnectionReport, AppError> {
        let started = Instant::now();
        let orders = self
            .gateway
            .try_fetch_orders(&CancellationToken::new())
            .await?;
        Ok(ConnectionReport {
            reachable: true,
            order_count: orders.len(),
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    pub async fn analytics(&self) -> AnalyticsSummary {
        self.gateway.fetch_analytics().await
    }

    pub async fn customers(&self) -> Vec<Customer> {
        self.gateway.fetch_customers().await
    }

    pub fn notifications(&self, since: u64) -> Vec<FeedEntry> {
        self.notifications.since(since)
    }
}
