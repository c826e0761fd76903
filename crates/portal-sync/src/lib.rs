//! portal-sync: order polling, reconciliation and status updates for the
//! owner portal (core + inbound HTTP)

pub mod config;
pub mod errors;

pub mod application;

pub use portal_types::{domain, ports};

pub mod inbound; // HTTP adapter (server + handlers)
