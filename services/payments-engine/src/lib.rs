//! Payments engine
//!
//! The service side of the financial truth core: payment and refund intent
//! lifecycles, the settlement orchestrator (the ledger's single writer), and
//! the webhook ingress pipeline, exposed over the v1 HTTP surface.

pub mod audit;
pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod providers;
pub mod services;
