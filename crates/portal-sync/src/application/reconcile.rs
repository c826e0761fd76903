use std::collections::HashSet;

use portal_types::domain::order::Order;

/// A fetched list checked against the ids shown before it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// In the order the server returned them.
    pub orders: Vec<Order>,
    /// Ids present now but absent from the previous set, in list order.
    pub newly_seen: Vec<String>,
}

pub fn order_ids(orders: &[Order]) -> HashSet<String> {
    orders.iter().map(|o| o.order_id.clone()).collect()
}

pub fn reconcile(previous: &HashSet<String>, fetched: Vec<Order>) -> Reconciliation {
    let mut seen = HashSet::new();
    let newly_seen = fetched
        .iter()
        .map(|o| o.order_id.as_str())
        .filter(|id| !previous.contains(*id) && seen.insert(*id))
        .map(str::to_string)
        .collect();
    Reconciliation {
        orders: fetched,
        newly_seen,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_types::domain::order::OrderStatus;

    fn order(id: &str) -> Order {
        Order {
            order_id: id.into(),
            customer_name: "Guest".into(),
            customer_mobile: None,
            items: Vec::new(),
            total_cents: 0,
            status: OrderStatus::Pending,
            created_at: None,
        }
    }

    #[test]
    fn new_ids_are_the_set_difference() {
        let previous = order_ids(&[order("A"), order("B")]);
        let r = reconcile(&previous, vec![order("C"), order("A"), order("D")]);
        assert_eq!(r.newly_seen, ["C", "D"]);
        let ids: Vec<_> = r.orders.iter().map(|o| o.order_id.as_str()).collect();
        assert_eq!(ids, ["C", "A", "D"]);
    }

    #[test]
    fn second_pass_over_same_list_sees_nothing_new() {
        let fetched = vec![order("A"), order("B")];
        let first = reconcile(&HashSet::new(), fetched.clone());
        assert_eq!(first.newly_seen.len(), 2);

        let known = order_ids(&first.orders);
        let second = reconcile(&known, fetched);
        assert!(second.newly_seen.is_empty());
    }

    #[test]
    fn duplicate_rows_count_once() {
        let r = reconcile(&HashSet::new(), vec![order("A"), order("A")]);
        assert_eq!(r.newly_seen, ["A"]);
        assert_eq!(r.orders.len(), 2);
    }
}
