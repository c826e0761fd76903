//! The order list as the owner sees it.
//!
//! Only the polling scheduler and the status coordinator write here. Every
//! change bumps a revision counter so observers can wait on it instead of
//! re-reading on a timer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use portal_types::domain::order::{Order, OrderStatus};
use portal_types::ports::order_gateway::OrderList;
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tracing::debug;

use super::reconcile::{order_ids, reconcile};

pub const DEFAULT_HIGHLIGHT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BoardView {
    pub orders: Vec<Order>,
    pub new_order_ids: Vec<String>,
    pub offline: bool,
    pub last_synced: Option<DateTime<Utc>>,
}

/// Record of a locally applied status, kept so it can be undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticUpdate {
    pub order_id: String,
    pub prior: OrderStatus,
    pub applied: OrderStatus,
}

#[derive(Default)]
struct BoardState {
    orders: Vec<Order>,
    // id -> when the "new" marker lapses
    highlighted: HashMap<String, Instant>,
    offline: bool,
    last_synced: Option<DateTime<Utc>>,
}

impl BoardState {
    fn find_mut(&mut self, order_id: &str) -> Option<&mut Order> {
        self.orders.iter_mut().find(|o| o.order_id == order_id)
    }

    fn live_highlights(&self, now: Instant) -> Vec<String> {
        self.orders
            .iter()
            .filter(|o| self.highlighted.get(&o.order_id).is_some_and(|until| *until > now))
            .map(|o| o.order_id.clone())
            .collect()
    }
}

#[derive(Clone)]
pub struct OrderBoard {
    state: Arc<RwLock<BoardState>>,
    revision: Arc<watch::Sender<u64>>,
    highlight_for: Duration,
}

impl Default for OrderBoard {
    fn default() -> Self {
        Self::new(DEFAULT_HIGHLIGHT)
    }
}

impl OrderBoard {
    pub fn new(highlight_for: Duration) -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            state: Arc::new(RwLock::new(BoardState::default())),
            revision: Arc::new(tx),
            highlight_for,
        }
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Replaces the list with a fetch result and returns the newly seen ids.
    ///
    /// Offline data is shown as is: orders coming from a snapshot are not new
    /// to anyone, so nothing gets highlighted.
    pub async fn apply_fetch(&self, list: OrderList) -> Vec<String> {
        let newly_seen = {
            let mut state = self.state.write().await;
            if list.offline {
                state.orders = list.orders;
                state.offline = true;
                Vec::new()
            } else {
                let previous = order_ids(&state.orders);
                let result = reconcile(&previous, list.orders);
                let until = Instant::now() + self.highlight_for;
                for id in &result.newly_seen {
                    state.highlighted.insert(id.clone(), until);
                }
                state.orders = result.orders;
                state.offline = false;
                state.last_synced = Some(Utc::now());
                result.newly_seen
            }
        };
        self.bump();

        if !newly_seen.is_empty() {
            debug!(count = newly_seen.len(), "new orders on the board");
            let board = self.clone();
            let wait = self.highlight_for;
            tokio::spawn(async move {
                tokio::time::sleep(wait).await;
                board.expire_highlights().await;
            });
        }
        newly_seen
    }

    /// Drops lapsed "new" markers. Returns how many were dropped.
    pub async fn expire_highlights(&self) -> usize {
        let removed = {
            let mut state = self.state.write().await;
            let now = Instant::now();
            let before = state.highlighted.len();
            state.highlighted.retain(|_, until| *until > now);
            before - state.highlighted.len()
        };
        if removed > 0 {
            self.bump();
        }
        removed
    }

    pub async fn new_order_ids(&self) -> Vec<String> {
        self.state.read().await.live_highlights(Instant::now())
    }

    pub async fn set_offline(&self, offline: bool) {
        let changed = {
            let mut state = self.state.write().await;
            std::mem::replace(&mut state.offline, offline) != offline
        };
        if changed {
            self.bump();
        }
    }

    pub async fn is_offline(&self) -> bool {
        self.state.read().await.offline
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.state.read().await.orders.clone()
    }

    pub async fn order(&self, order_id: &str) -> Option<Order> {
        self.state
            .read()
            .await
            .orders
            .iter()
            .find(|o| o.order_id == order_id)
            .cloned()
    }

    pub async fn view(&self) -> BoardView {
        let state = self.state.read().await;
        BoardView {
            orders: state.orders.clone(),
            new_order_ids: state.live_highlights(Instant::now()),
            offline: state.offline,
            last_synced: state.last_synced,
        }
    }

    /// Shows `status` right away and remembers what it replaced.
    pub async fn apply_optimistic(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Option<OptimisticUpdate> {
        let update = {
            let mut state = self.state.write().await;
            let order = state.find_mut(order_id)?;
            let prior = order.set_status(status);
            OptimisticUpdate {
                order_id: order_id.to_string(),
                prior,
                applied: status,
            }
        };
        self.bump();
        Some(update)
    }

    /// Restores the prior status unless something has replaced the applied
    /// one in the meantime. A fetch that landed after the update is newer
    /// than our snapshot and wins.
    pub async fn rollback(&self, update: &OptimisticUpdate) -> bool {
        let restored = {
            let mut state = self.state.write().await;
            match state.find_mut(&update.order_id) {
                Some(order) if order.status == update.applied => {
                    order.set_status(update.prior);
                    true
                }
                _ => false,
            }
        };
        if restored {
            self.bump();
        }
        restored
    }
}
