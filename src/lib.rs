//! Signal relay hub: ingest analyzer signals, persist them, fan them out to
//! live dashboards, and record sentiment votes and simulated trades.

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod logging;
pub mod notify;
pub mod service;
pub mod web;
