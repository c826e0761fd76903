pub mod confirm;
pub mod key_value_store;
pub mod notifier;
pub mod order_cache;
pub mod order_gateway;
