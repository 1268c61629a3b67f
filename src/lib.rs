//! Hydrocarbon: a personal feed-aggregation service. Users subscribe to
//! content sources and receive normalized posts; a scraping orchestrator
//! periodically crawls subscribed sources through compiled-in plugins and
//! persists what they emit.

pub mod api;
pub mod app;
pub mod domain;
pub mod infra;
pub mod ports;
