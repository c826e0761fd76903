#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use portal_types::domain::analytics::AnalyticsSummary;
use portal_types::domain::customer::Customer;
use portal_types::domain::order::{Order, OrderStatus};
use portal_types::ports::order_gateway::{
    FetchOutcome, GatewayError, OrderGateway, OrderList, ServerAck,
};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Scripted stand-in for the remote endpoint.
///
/// Fetches pop queued results and fall back to `orders` once the queue is
/// empty. Gates, when set, hold calls until a permit is added.
#[derive(Default)]
pub struct FakeGateway {
    pub fetches: AtomicUsize,
    pub updates: AtomicUsize,
    pub orders: Mutex<Vec<Order>>,
    pub queued: Mutex<VecDeque<OrderList>>,
    pub update_error: Mutex<Option<GatewayError>>,
    pub connection_error: Mutex<Option<GatewayError>>,
    pub update_calls: Mutex<Vec<(String, OrderStatus)>>,
    pub fetch_gate: Option<Arc<Semaphore>>,
    pub update_gate: Option<Arc<Semaphore>>,
    /// Status the endpoint reports after a successful update.
    pub apply_updates: bool,
}

impl FakeGateway {
    pub fn with_orders(orders: Vec<Order>) -> Self {
        Self {
            orders: Mutex::new(orders),
            ..Self::default()
        }
    }

    pub fn gated_fetches(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.fetch_gate = Some(gate.clone());
        (self, gate)
    }

    pub fn gated_updates(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.update_gate = Some(gate.clone());
        (self, gate)
    }

    pub fn applying_updates(mut self) -> Self {
        self.apply_updates = true;
        self
    }

    pub fn queue(&self, list: OrderList) {
        self.queued.lock().unwrap().push_back(list);
    }

    pub fn fail_updates(&self, err: GatewayError) {
        *self.update_error.lock().unwrap() = Some(err);
    }

    pub fn fail_connection(&self, err: GatewayError) {
        *self.connection_error.lock().unwrap() = Some(err);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn next_list(&self) -> OrderList {
        self.queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| OrderList::live(self.orders.lock().unwrap().clone()))
    }
}

#[async_trait]
impl OrderGateway for FakeGateway {
    async fn fetch_orders(&self, cancel: &CancellationToken) -> FetchOutcome {
        if cancel.is_cancelled() {
            return FetchOutcome::Cancelled;
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.fetch_gate {
            tokio::select! {
                _ = cancel.cancelled() => return FetchOutcome::Cancelled,
                permit = gate.acquire() => permit.unwrap().forget(),
            }
        }
        FetchOutcome::Fetched(self.next_list())
    }

    async fn try_fetch_orders(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Order>, GatewayError> {
        if let Some(err) = self.connection_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.orders.lock().unwrap().clone())
    }

    async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<ServerAck, GatewayError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.update_calls
            .lock()
            .unwrap()
            .push((order_id.to_string(), status));
        if let Some(gate) = &self.update_gate {
            gate.acquire().await.unwrap().forget();
        }
        if let Some(err) = self.update_error.lock().unwrap().clone() {
            return Err(err);
        }
        if self.apply_updates {
            let mut orders = self.orders.lock().unwrap();
            if let Some(o) = orders.iter_mut().find(|o| o.order_id == order_id) {
                o.status = status;
            }
        }
        Ok(ServerAck {
            status: Some("success".into()),
            message: Some("Updated".into()),
            data: None,
        })
    }

    async fn fetch_analytics(&self) -> AnalyticsSummary {
        AnalyticsSummary {
            total_orders: self.orders.lock().unwrap().len() as u32,
            ..AnalyticsSummary::default()
        }
    }

    async fn fetch_customers(&self) -> Vec<Customer> {
        Vec::new()
    }
}

pub fn order(id: &str, status: OrderStatus) -> Order {
    Order {
        order_id: id.into(),
        customer_name: "Guest".into(),
        customer_mobile: None,
        items: Vec::new(),
        total_cents: 1_000,
        status,
        created_at: None,
    }
}

/// Lets spawned tasks run; with paused time this also fires due timers.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Yields until `cond` holds, failing after a generous number of rounds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
