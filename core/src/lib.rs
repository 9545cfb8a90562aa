//! Daily health ledger: one row per date, merged from a wearable and from
//! nutrition sources, with weekly rollups, alerts and AI summaries on top.

pub mod alerts;
pub mod dates;
pub mod db;
pub mod error;
pub mod ledger;
pub mod macrofactor;
pub mod manual;
pub mod models;
pub mod oura;
pub mod retry;
pub mod service;
pub mod store;
pub mod summary;
pub mod weekly;
