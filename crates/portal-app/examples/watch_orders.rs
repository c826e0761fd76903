///  To run :
///  cargo r --example watch_orders
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use portal_cache::{build_store, LocalCache};
use portal_client::RemoteOrderGateway;
use portal_sync::application::portal::{PortalService, SyncSettings};
use portal_sync::application::status::{PresetAnswer, UpdatePolicy};
use portal_types::domain::order::OrderStatus;
use serde_json::{json, Value};
use tempfile::tempdir;

type Sheet = Arc<Mutex<Vec<Value>>>;

// Stand-in for the order sheet endpoint: reads list rows, writes flip a status.
fn apply(sheet: &Sheet, params: &HashMap<String, String>) -> Value {
    let mut rows = sheet.lock().unwrap();
    match params.get("action").map(String::as_str) {
        Some("update_status") => {
            let id = params.get("order_id").cloned().unwrap_or_default();
            let status = params.get("status").cloned().unwrap_or_default();
            for row in rows.iter_mut().filter(|r| r["orderId"] == id.as_str()) {
                row["order_status"] = json!(status);
            }
            json!({ "status": "success", "message": "Updated" })
        }
        _ => json!({ "status": "success", "data": rows.clone() }),
    }
}

async fn exec_get(State(sheet): State<Sheet>, Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    Json(apply(&sheet, &q))
}

async fn exec_post(State(sheet): State<Sheet>, Json(body): Json<Value>) -> Json<Value> {
    let params: HashMap<String, String> = body
        .as_object()
        .map(|fields| {
            fields
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();
    Json(apply(&sheet, &params))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let sheet: Sheet = Arc::new(Mutex::new(vec![
        json!({ "orderId": "ORD-1", "customerName": "Asha", "total_amount": "50.72",
                "order_status": "new", "items": "[{\"item\":\"Masala Dosa\",\"qty\":2,\"price\":12.5}]" }),
        json!({ "id": "ORD-2", "customer": { "name": "Ravi" }, "grand_total": 18,
                "status": "preparing", "timestamp": 1_718_000_000_000_i64 }),
    ]));
    let app = Router::new().route("/exec", get(exec_get).post(exec_post)).with_state(sheet);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = format!("http://{}/exec", listener.local_addr()?);
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let tmp = tempdir()?;
    let cache_url = format!("sqlite://{}", tmp.path().join("cache.db").display());
    let cache = Arc::new(LocalCache::new(build_store(Some(&cache_url)).await?));
    let gateway = Arc::new(RemoteOrderGateway::builder(&endpoint)?.with_cache(cache).build()?);
    let service = PortalService::new(gateway, SyncSettings::default());

    println!("refresh: {:?}", service.refresh().await);
    for order in service.view().await.board.orders {
        println!(
            "{} {} {} {} items={}",
            order.order_id,
            order.customer_name,
            order.status,
            order.total_cents,
            order.item_count()
        );
    }

    let change = service
        .change_status("ORD-1", OrderStatus::Accepted, Some(UpdatePolicy::Pessimistic), &PresetAnswer(true))
        .await?;
    println!("change: {change:?}");
    println!("ORD-1 is now {}", service.order("ORD-1").await?.status);
    for entry in service.notifications(0) {
        println!("[{:?}] {}", entry.notification.level, entry.notification.message);
    }

    server.abort();
    Ok(())
}
