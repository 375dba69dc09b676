pub mod config;
pub mod constants;
pub mod domain;
pub mod error;

// Batch pipeline: ingestion, processing stages, orchestration
pub mod pipeline;

// Layered boundaries for application and infrastructure
pub mod app;
pub mod infra;

pub mod observability;
