//! L1 (EVM) chain support
//!
//! ## Submodules
//!
//! - `client` - alloy-backed [`OriginChain`](crate::chain::OriginChain) implementation
//! - `contracts` - bridge contract bindings using alloy sol! macro
//! - `events` - `TokensLocked` log decoding

pub mod client;
pub mod contracts;
pub mod events;

pub use client::{EvmBridgeClient, EvmBridgeConfig};
pub use contracts::MarsBridge;
pub use events::parse_lock_log;
