//! Multichain-RS: shared chain library for the Mars Credit bridge relayer
//!
//! - **Chain interfaces** - [`OriginChain`] (L1 bridge contract) and [`DestinationChain`] (Solana mint)
//! - **Errors** - [`ChainError`] classification into transient, rate-limited and permanent
//! - **Amounts** - 18 ↔ 9 decimal conversion, truncating towards the destination
//! - **Memos** - bridge id tags on mints, L1 recipients on burns
//! - **EVM Module** - alloy bindings and client for the L1 bridge contract
//! - **Solana Module** - nonblocking RPC client, instruction builders, transaction parsing
//! - **Testing Module** - in-memory chains for relayer tests
//!
//! ## Feature Flags
//!
//! - `evm` - Enable the L1 client (default)
//! - `solana` - Enable the Solana client (default)
//! - `testing` - Enable mock chains
//! - `full` - Enable all features

pub mod amount;
pub mod chain;
pub mod error;
pub mod hash;
pub mod memo;
pub mod redact;
pub mod types;

#[cfg(feature = "evm")]
pub mod evm;

// instruction helpers are also used by the mock chains
pub mod solana;

#[cfg(feature = "testing")]
pub mod testing;

pub use amount::{dest_to_origin, origin_to_dest, DEST_DECIMALS, L1_DECIMALS};
pub use chain::{DestinationChain, OriginChain, PreparedTransaction};
pub use error::ChainError;
pub use hash::{keccak256, origin_tx_id};
pub use memo::{bridge_memo, burn_memo, parse_bridge_id, parse_l1_recipient};
pub use types::{BurnRecord, DestTransaction, EvmAddress, LockEvent, MintRecord, SignatureInfo};
