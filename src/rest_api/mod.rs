//! HTTP surface of the operator
//!
//! Liveness, readiness and the Prometheus scrape endpoint.

mod dto;
mod handlers;
mod server;

pub use server::{router, run_server};
