//! `credbroker` HTTP server.
//!
//! Wires the core lifecycle managers and a storage backend into an Axum
//! router speaking the synchronous subset of the Open Service Broker API at
//! `/v2/*`, plus a health probe and the per-binding usage document.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
