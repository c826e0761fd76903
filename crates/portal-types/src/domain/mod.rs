pub mod analytics;
pub mod customer;
pub mod ingest;
pub mod notification;
pub mod order;
