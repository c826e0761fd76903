//! portal-types: domain model and ports shared by the owner portal crates.

pub mod domain;
pub mod ports;
