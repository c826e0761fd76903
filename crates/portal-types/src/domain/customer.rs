use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ingest::{cents, count, pick, text, timestamp, UNKNOWN_CUSTOMER};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Customer {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    pub order_count: u32,
    pub total_spent_cents: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_order_at: Option<DateTime<Utc>>,
}

impl Customer {
    pub fn from_value(value: &Value) -> Option<Self> {
        let record = value.as_object()?;
        Some(Self {
            name: pick(record, &["name", "customer_name", "customerName"])
                .and_then(text)
                .unwrap_or_else(|| UNKNOWN_CUSTOMER.to_string()),
            mobile: pick(record, &["mobile", "customer_mobile", "phone"]).and_then(text),
            order_count: pick(record, &["order_count", "orders", "total_orders"])
                .and_then(count)
                .unwrap_or(0),
            total_spent_cents: pick(record, &["total_spent", "totalSpent", "lifetime_value"])
                .and_then(cents)
                .unwrap_or(0),
            last_order_at: pick(record, &["last_order_at", "lastOrder", "last_order"])
                .and_then(timestamp),
        })
    }

    pub fn list_from_value(value: &Value) -> Vec<Self> {
        match value {
            Value::Array(rows) => rows.iter().filter_map(Self::from_value).collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_reads_rows_and_defaults() {
        let customers = Customer::list_from_value(&json!([
            { "name": "John", "mobile": 5551234, "orders": "4", "total_spent": 88.5 },
            {},
            7
        ]));
        assert_eq!(customers.len(), 2);
        assert_eq!(customers[0].mobile.as_deref(), Some("5551234"));
        assert_eq!(customers[0].order_count, 4);
        assert_eq!(customers[0].total_spent_cents, 8850);
        assert_eq!(customers[1].name, UNKNOWN_CUSTOMER);
    }
}
