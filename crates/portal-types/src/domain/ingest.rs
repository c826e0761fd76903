//! Normalization of upstream records into the canonical domain shape.
//!
//! The sheet behind the endpoint is filled by several scripts and by hand, so
//! a field can arrive under more than one name. Every canonical field has a
//! fixed precedence list below; the first key holding a non-blank value wins.
//! Optional fields fall back to defaults instead of failing the record.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use super::order::{LineItem, Order, OrderStatus};

pub const UNKNOWN_CUSTOMER: &str = "Unknown Customer";
pub const UNNAMED_ITEM: &str = "Item";

const ORDER_ID_KEYS: &[&str] = &["order_id", "id", "orderId", "order_number"];
const CUSTOMER_NAME_KEYS: &[&str] = &["customer_name", "customerName", "name"];
const CUSTOMER_MOBILE_KEYS: &[&str] = &["customer_mobile", "mobile", "customerPhone", "phone"];
const ITEMS_KEYS: &[&str] = &["items", "line_items", "order_items"];
const TOTAL_KEYS: &[&str] = &["total", "total_amount", "amount", "grand_total"];
const STATUS_KEYS: &[&str] = &["status", "order_status"];
const CREATED_AT_KEYS: &[&str] = &["created_at", "createdAt", "timestamp", "date"];

const ITEM_NAME_KEYS: &[&str] = &["name", "item", "item_name"];
const ITEM_QTY_KEYS: &[&str] = &["quantity", "qty"];
const ITEM_PRICE_KEYS: &[&str] = &["price", "unit_price", "unitPrice"];
const ITEM_NOTES_KEYS: &[&str] = &["notes", "specialInstructions", "special_instructions"];

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M:%S"];

/// First non-blank value among `keys`, in order.
pub fn pick<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| record.get(*k))
        .find(|v| !is_blank(v))
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

pub fn text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn number(v: &Value) -> Option<f64> {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_start_matches('$')
            .replace(',', "")
            .parse::<f64>()
            .ok(),
        _ => None,
    };
    parsed.filter(|x| x.is_finite())
}

/// Decimal currency amount rounded to whole cents.
pub fn cents(v: &Value) -> Option<i64> {
    number(v).map(|x| (x * 100.0).round() as i64)
}

pub fn count(v: &Value) -> Option<u32> {
    number(v)
        .filter(|x| *x >= 0.0)
        .map(|x| x.round().min(f64::from(u32::MAX)) as u32)
}

pub fn timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for fmt in NAIVE_FORMATS {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Some(Utc.from_utc_datetime(&naive));
                }
            }
            s.parse::<f64>().ok().and_then(from_epoch)
        }
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        _ => None,
    }
}

// Apps Script emits epoch milliseconds; older rows carry seconds.
fn from_epoch(raw: f64) -> Option<DateTime<Utc>> {
    let millis = if raw.abs() >= 1e11 { raw } else { raw * 1000.0 };
    DateTime::from_timestamp_millis(millis as i64)
}

/// Builds an [`Order`] from one upstream record.
///
/// Returns `None` only when the record is not an object or carries no usable
/// identifier: without `order_id` the record cannot be reconciled.
pub fn normalize_order(value: &Value) -> Option<Order> {
    let record = value.as_object()?;
    let order_id = pick(record, ORDER_ID_KEYS).and_then(text)?;
    let nested = record.get("customer").and_then(Value::as_object);

    let customer_name = pick(record, CUSTOMER_NAME_KEYS)
        .and_then(text)
        .or_else(|| nested.and_then(|c| pick(c, &["name"])).and_then(text))
        .or_else(|| record.get("customer").and_then(text))
        .unwrap_or_else(|| UNKNOWN_CUSTOMER.to_string());
    let customer_mobile = pick(record, CUSTOMER_MOBILE_KEYS)
        .and_then(text)
        .or_else(|| nested.and_then(|c| pick(c, &["mobile", "phone"])).and_then(text));

    let items = pick(record, ITEMS_KEYS)
        .map(normalize_items)
        .unwrap_or_default();
    let total_cents = pick(record, TOTAL_KEYS).and_then(cents).unwrap_or(0);
    let status = pick(record, STATUS_KEYS)
        .and_then(text)
        .and_then(|s| s.parse::<OrderStatus>().ok())
        .unwrap_or(OrderStatus::Pending);
    let created_at = pick(record, CREATED_AT_KEYS).and_then(timestamp);

    Some(Order {
        order_id,
        customer_name,
        customer_mobile,
        items,
        total_cents,
        status,
        created_at,
    })
}

/// Normalizes an order payload: a list of records or a single record.
pub fn normalize_orders(payload: &Value) -> Vec<Order> {
    match payload {
        Value::Array(rows) => rows
            .iter()
            .enumerate()
            .filter_map(|(idx, row)| {
                let order = normalize_order(row);
                if order.is_none() {
                    warn!(row = idx, "skipping order record without an identifier");
                }
                order
            })
            .collect(),
        Value::Object(_) => normalize_order(payload).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn normalize_items(value: &Value) -> Vec<LineItem> {
    match value {
        // Sheet cells hold the item list as a JSON string.
        Value::String(raw) => serde_json::from_str::<Value>(raw)
            .map(|parsed| match parsed {
                Value::Array(_) => normalize_items(&parsed),
                _ => Vec::new(),
            })
            .unwrap_or_default(),
        Value::Array(rows) => rows.iter().filter_map(normalize_item).collect(),
        _ => Vec::new(),
    }
}

fn normalize_item(value: &Value) -> Option<LineItem> {
    match value {
        Value::Object(record) => Some(LineItem {
            name: pick(record, ITEM_NAME_KEYS)
                .and_then(text)
                .unwrap_or_else(|| UNNAMED_ITEM.to_string()),
            quantity: pick(record, ITEM_QTY_KEYS).and_then(count).unwrap_or(1),
            unit_price_cents: pick(record, ITEM_PRICE_KEYS).and_then(cents).unwrap_or(0),
            notes: pick(record, ITEM_NOTES_KEYS).and_then(text),
        }),
        Value::String(name) if !name.trim().is_empty() => Some(LineItem {
            name: name.trim().to_string(),
            quantity: 1,
            unit_price_cents: 0,
            notes: None,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_record_maps_one_to_one() {
        let order = normalize_order(&json!({
            "order_id": "ORD-1",
            "customer_name": "John Smith",
            "customer_mobile": "+1234567890",
            "items": [
                { "name": "Margherita Pizza", "quantity": 2, "price": 15.99 },
                { "name": "Caesar Salad", "quantity": 1, "price": 8.99, "notes": "no croutons" }
            ],
            "total": 50.72,
            "status": "pending",
            "created_at": "2024-03-01T12:30:00Z"
        }))
        .unwrap();

        assert_eq!(order.order_id, "ORD-1");
        assert_eq!(order.customer_name, "John Smith");
        assert_eq!(order.customer_mobile.as_deref(), Some("+1234567890"));
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].unit_price_cents, 1599);
        assert_eq!(order.items[1].notes.as_deref(), Some("no croutons"));
        assert_eq!(order.total_cents, 5072);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(
            order.created_at.unwrap().to_rfc3339(),
            "2024-03-01T12:30:00+00:00"
        );
    }

    #[test]
    fn alternate_names_follow_precedence() {
        let order = normalize_order(&json!({
            "id": 42,
            "orderId": "ignored",
            "customerName": "Sarah",
            "customerPhone": "+1987654321",
            "line_items": "[{\"item\":\"Burger\",\"qty\":\"3\",\"unit_price\":\"$4.50\"}]",
            "total_amount": "13.50",
            "order_status": "READY",
            "createdAt": 1_709_296_200_000_i64
        }))
        .unwrap();

        assert_eq!(order.order_id, "42");
        assert_eq!(order.customer_name, "Sarah");
        assert_eq!(order.customer_mobile.as_deref(), Some("+1987654321"));
        assert_eq!(order.items[0].name, "Burger");
        assert_eq!(order.items[0].quantity, 3);
        assert_eq!(order.items[0].unit_price_cents, 450);
        assert_eq!(order.total_cents, 1350);
        assert_eq!(order.status, OrderStatus::Ready);
        assert_eq!(order.created_at.unwrap().timestamp(), 1_709_296_200);
    }

    #[test]
    fn missing_optional_fields_take_defaults() {
        let order = normalize_order(&json!({ "order_id": "ORD-9", "customer_name": "  " })).unwrap();
        assert_eq!(order.customer_name, UNKNOWN_CUSTOMER);
        assert!(order.items.is_empty());
        assert_eq!(order.total_cents, 0);
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.created_at.is_none());
        assert!(order.customer_mobile.is_none());
    }

    #[test]
    fn nested_customer_and_unknown_status() {
        let order = normalize_order(&json!({
            "order_id": "ORD-3",
            "customer": { "name": "Ana", "mobile": "555" },
            "status": "teleported",
            "timestamp": "2024-03-01 08:00:00"
        }))
        .unwrap();
        assert_eq!(order.customer_name, "Ana");
        assert_eq!(order.customer_mobile.as_deref(), Some("555"));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.created_at.unwrap().timestamp(), 1_709_280_000);
    }

    #[test]
    fn list_payload_skips_records_without_id() {
        let orders = normalize_orders(&json!([
            { "order_id": "A" },
            { "customer_name": "no id" },
            "garbage",
            { "id": "B" }
        ]));
        let ids: Vec<_> = orders.iter().map(|o| o.order_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn single_object_and_scalars() {
        assert_eq!(normalize_orders(&json!({ "order_id": "X" })).len(), 1);
        assert!(normalize_orders(&json!("nope")).is_empty());
        assert!(normalize_orders(&Value::Null).is_empty());
    }

    #[test]
    fn epoch_seconds_are_scaled() {
        let ts = timestamp(&json!(1_709_296_200)).unwrap();
        assert_eq!(ts.timestamp(), 1_709_296_200);
    }
}
