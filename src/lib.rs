pub mod alerts;
pub mod api;
pub mod breaker;
pub mod config;
pub mod error;
pub mod indexing;
pub mod ingest;
pub mod logbus;
pub mod metrics;
pub mod models;
pub mod processor;
pub mod store;
pub mod sweeper;
