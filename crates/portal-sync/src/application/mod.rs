pub mod board;
pub mod notify;
pub mod portal;
pub mod reconcile;
pub mod scheduler;
pub mod status;
