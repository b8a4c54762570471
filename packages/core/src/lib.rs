// Library root: exposes internal modules for integration tests in `tests/`.
// Production entry point remains `src/main.rs`.

pub mod accessor;
pub mod api;
pub mod cache;
pub mod db;
pub mod error;
pub mod intervals;
pub mod metrics;
pub mod publisher;
pub mod repository;
pub mod retry;
pub mod scheduler;
pub mod updater;
pub mod workflow;

// Startup plumbing used by the binary.
pub mod cli;
pub mod config;
pub mod logging;
