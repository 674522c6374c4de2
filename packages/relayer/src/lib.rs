//! Mars Credit Bridge Relayer - Library interface
//!
//! Re-exports internal modules for use in integration tests.

pub mod api;
pub mod backfill;
pub mod cache;
pub mod config;
pub mod confirmation;
pub mod metrics;
pub mod oracle;
pub mod registry;
pub mod retry;
pub mod settlement;
pub mod shutdown;
pub mod types;
pub mod watchers;
