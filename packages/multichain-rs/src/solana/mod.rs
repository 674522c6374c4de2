//! Solana chain support
//!
//! ## Submodules
//!
//! - `client` - nonblocking-RPC [`DestinationChain`](crate::chain::DestinationChain) implementation
//! - `instructions` - SPL token, associated token account and memo instruction builders
//! - `parse` - extraction of bridge mints, burns and memos from transactions

#[cfg(feature = "solana")]
pub mod client;
pub mod instructions;
pub mod parse;

#[cfg(feature = "solana")]
pub use client::{parse_keypair, SolanaMintClient, SolanaMintConfig};
pub use instructions::associated_token_address;
