mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{order, wait_until, FakeGateway};
use portal_sync::application::portal::{PortalService, SyncSettings};
use portal_sync::application::scheduler::PollResult;
use portal_sync::application::status::{PresetAnswer, StatusChange, UpdatePolicy, GENERIC_FAILURE};
use portal_sync::errors::AppError;
use portal_types::domain::ingest::normalize_orders;
use portal_types::domain::notification::NotificationLevel;
use portal_types::domain::order::OrderStatus;
use portal_types::ports::confirm::ConfirmPrompt;
use portal_types::ports::order_gateway::{GatewayError, OrderList};

/// Records that it was asked before answering.
struct CountingPrompt {
    answer: bool,
    asked: AtomicUsize,
}

#[async_trait]
impl ConfirmPrompt for CountingPrompt {
    async fn confirm(&self, _order_id: &str, _status: OrderStatus) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

async fn loaded(gw: FakeGateway) -> (Arc<FakeGateway>, PortalService<FakeGateway>) {
    let gw = Arc::new(gw);
    let service = PortalService::new(gw.clone(), SyncSettings::default());
    service.refresh().await;
    (gw, service)
}

async fn status_of(service: &PortalService<FakeGateway>, id: &str) -> OrderStatus {
    service.order(id).await.unwrap().status
}

#[tokio::test]
async fn failed_optimistic_update_rolls_back_exactly() {
    let (gw, service) = loaded(FakeGateway::with_orders(vec![order("A", OrderStatus::Pending)])).await;
    gw.fail_updates(GatewayError::Status {
        code: 500,
        message: Some("Sheet locked".into()),
    });

    let err = service
        .change_status("A", OrderStatus::Accepted, Some(UpdatePolicy::Optimistic), &PresetAnswer(true))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Gateway(GatewayError::Status { code: 500, .. })));
    assert_eq!(status_of(&service, "A").await, OrderStatus::Pending);

    let feed = service.notifications(0);
    let last = feed.last().unwrap();
    assert_eq!(last.notification.level, NotificationLevel::Error);
    assert_eq!(last.notification.message, "Sheet locked");
}

#[tokio::test]
async fn failure_without_server_message_uses_generic_text() {
    let (gw, service) = loaded(FakeGateway::with_orders(vec![order("A", OrderStatus::Accepted)])).await;
    gw.fail_updates(GatewayError::Timeout);

    service
        .change_status("A", OrderStatus::Preparing, None, &PresetAnswer(true))
        .await
        .unwrap_err();
    let feed = service.notifications(0);
    assert_eq!(feed.last().unwrap().notification.message, GENERIC_FAILURE);
    assert_eq!(status_of(&service, "A").await, OrderStatus::Accepted);
}

#[tokio::test]
async fn declined_cancellation_touches_nothing() {
    let (gw, service) = loaded(FakeGateway::with_orders(vec![order("A", OrderStatus::Preparing)])).await;
    let prompt = CountingPrompt {
        answer: false,
        asked: AtomicUsize::new(0),
    };
    let revision = service.board().revision();

    let change = service
        .change_status("A", OrderStatus::Cancelled, None, &prompt)
        .await
        .unwrap();
    assert_eq!(
        change,
        StatusChange::Declined {
            order_id: "A".into()
        }
    );
    assert_eq!(prompt.asked.load(Ordering::SeqCst), 1);
    assert_eq!(gw.update_count(), 0);
    assert_eq!(service.board().revision(), revision);
    assert_eq!(status_of(&service, "A").await, OrderStatus::Preparing);
}

#[tokio::test]
async fn confirmed_cancellation_goes_through() {
    let (gw, service) = loaded(FakeGateway::with_orders(vec![order("A", OrderStatus::Ready)])).await;
    let prompt = CountingPrompt {
        answer: true,
        asked: AtomicUsize::new(0),
    };

    service
        .change_status("A", OrderStatus::Cancelled, None, &prompt)
        .await
        .unwrap();
    assert_eq!(gw.update_count(), 1);
    assert_eq!(status_of(&service, "A").await, OrderStatus::Cancelled);
    let feed = service.notifications(0);
    assert_eq!(feed.last().unwrap().notification.message, "Order A cancelled");
}

#[tokio::test]
async fn only_cancellation_asks_for_confirmation() {
    let (_gw, service) = loaded(FakeGateway::with_orders(vec![order("A", OrderStatus::Pending)])).await;
    let prompt = CountingPrompt {
        answer: false,
        asked: AtomicUsize::new(0),
    };

    service
        .change_status("A", OrderStatus::Accepted, None, &prompt)
        .await
        .unwrap();
    assert_eq!(prompt.asked.load(Ordering::SeqCst), 0);
    let feed = service.notifications(0);
    assert_eq!(feed.last().unwrap().notification.message, "Order A updated to accepted");
}

#[tokio::test]
async fn pessimistic_update_waits_for_the_refetch() {
    let (gw, gate) = FakeGateway::with_orders(vec![order("A", OrderStatus::Pending)])
        .applying_updates()
        .gated_updates();
    let (gw, service) = loaded(gw).await;
    let service = Arc::new(service);
    let fetches_before = gw.fetch_count();

    let task = tokio::spawn({
        let service = service.clone();
        async move {
            service
                .change_status("A", OrderStatus::Accepted, Some(UpdatePolicy::Pessimistic), &PresetAnswer(true))
                .await
        }
    });
    wait_until(|| gw.update_count() == 1).await;
    assert_eq!(status_of(&service, "A").await, OrderStatus::Pending);

    gate.add_permits(1);
    let change = task.await.unwrap().unwrap();
    assert!(matches!(change, StatusChange::Applied { policy: UpdatePolicy::Pessimistic, .. }));
    assert_eq!(gw.fetch_count(), fetches_before + 1);
    assert_eq!(status_of(&service, "A").await, OrderStatus::Accepted);
}

#[tokio::test]
async fn pessimistic_failure_leaves_state_alone() {
    let (gw, service) = loaded(FakeGateway::with_orders(vec![order("A", OrderStatus::Pending)])).await;
    gw.fail_updates(GatewayError::Rejected("Order locked".into()));
    let fetches_before = gw.fetch_count();
    let revision = service.board().revision();

    service
        .change_status("A", OrderStatus::Accepted, Some(UpdatePolicy::Pessimistic), &PresetAnswer(true))
        .await
        .unwrap_err();
    assert_eq!(gw.fetch_count(), fetches_before);
    assert_eq!(service.board().revision(), revision);
    assert_eq!(
        service.notifications(0).last().unwrap().notification.message,
        "Order locked"
    );
}

#[tokio::test]
async fn invalid_transitions_never_reach_the_endpoint() {
    let (gw, service) = loaded(FakeGateway::with_orders(vec![
        order("A", OrderStatus::Pending),
        order("B", OrderStatus::Served),
    ]))
    .await;

    let err = service
        .change_status("A", OrderStatus::Ready, None, &PresetAnswer(true))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    let err = service
        .change_status("B", OrderStatus::Cancelled, None, &PresetAnswer(true))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    let err = service
        .change_status("Z", OrderStatus::Accepted, None, &PresetAnswer(true))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(gw.update_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn new_order_is_marked_then_updated_before_the_ack() {
    let fetched = normalize_orders(&serde_json::json!([
        { "order_id": "ORD-1", "status": "pending", "total": 50.72 }
    ]));
    let (gw, gate) = FakeGateway::with_orders(fetched).gated_updates();
    let (gw, service) = loaded(gw).await;
    let service = Arc::new(service);

    let view = service.view().await;
    assert_eq!(view.board.orders.len(), 1);
    assert_eq!(view.board.orders[0].total_cents, 5072);
    assert_eq!(view.board.new_order_ids, ["ORD-1"]);

    tokio::time::sleep(Duration::from_millis(5_001)).await;
    assert!(service.view().await.board.new_order_ids.is_empty());
    assert_eq!(gw.fetch_count(), 1);

    let task = tokio::spawn({
        let service = service.clone();
        async move {
            service
                .change_status("ORD-1", OrderStatus::Accepted, Some(UpdatePolicy::Optimistic), &PresetAnswer(true))
                .await
        }
    });
    wait_until(|| gw.update_count() == 1).await;
    assert_eq!(status_of(&service, "ORD-1").await, OrderStatus::Accepted);

    gate.add_permits(1);
    task.await.unwrap().unwrap();
    assert_eq!(status_of(&service, "ORD-1").await, OrderStatus::Accepted);
}

#[tokio::test]
async fn pessimistic_update_outlasts_a_poll_already_running() {
    let (gw, gate) = FakeGateway::with_orders(vec![order("A", OrderStatus::Pending)])
        .applying_updates()
        .gated_fetches();
    let gw = Arc::new(gw);
    let service = Arc::new(PortalService::new(gw.clone(), SyncSettings::default()));
    gate.add_permits(1);
    service.refresh().await;

    // This poll read the sheet before the write and lands after the ack.
    gw.queue(OrderList::live(vec![order("A", OrderStatus::Pending)]));
    let stale = tokio::spawn({
        let service = service.clone();
        async move { service.refresh().await }
    });
    wait_until(|| gw.fetch_count() == 2).await;

    let change = tokio::spawn({
        let service = service.clone();
        async move {
            service
                .change_status("A", OrderStatus::Accepted, Some(UpdatePolicy::Pessimistic), &PresetAnswer(true))
                .await
        }
    });
    wait_until(|| gw.update_count() == 1).await;

    gate.add_permits(1);
    assert!(matches!(stale.await.unwrap(), PollResult::Updated { .. }));
    gate.add_permits(1);
    let change = change.await.unwrap().unwrap();

    assert!(matches!(change, StatusChange::Applied { .. }));
    assert_eq!(gw.fetch_count(), 3, "a follow-up fetch runs after the stale one");
    assert_eq!(status_of(&service, "A").await, OrderStatus::Accepted);
}
