use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ingest::{cents, count, pick, text};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopItem {
    pub name: String,
    pub quantity: u32,
    pub revenue_cents: i64,
}

/// Sales figures as computed by the endpoint. Empty when unavailable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalyticsSummary {
    pub total_orders: u32,
    pub total_revenue_cents: i64,
    pub avg_ticket_cents: i64,
    pub top_items: Vec<TopItem>,
}

impl AnalyticsSummary {
    pub fn from_value(value: &Value) -> Self {
        let Some(record) = value.as_object() else {
            return Self::default();
        };
        let top_items = pick(record, &["top_items", "topItems"])
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(Value::as_object)
                    .map(|row| TopItem {
                        name: pick(row, &["name", "item"])
                            .and_then(text)
                            .unwrap_or_default(),
                        quantity: pick(row, &["quantity", "qty", "count"])
                            .and_then(count)
                            .unwrap_or(0),
                        revenue_cents: pick(row, &["revenue", "total"])
                            .and_then(cents)
                            .unwrap_or(0),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            total_orders: pick(record, &["total_orders", "totalOrders"])
                .and_then(count)
                .unwrap_or(0),
            total_revenue_cents: pick(record, &["total_revenue", "totalRevenue", "revenue"])
                .and_then(cents)
                .unwrap_or(0),
            avg_ticket_cents: pick(record, &["avg_ticket", "avgTicket", "average_order_value"])
                .and_then(cents)
                .unwrap_or(0),
            top_items,
        }
    }
}
