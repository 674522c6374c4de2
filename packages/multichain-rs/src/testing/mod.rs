//! Testing Utilities Module
//!
//! In-memory chains implementing [`OriginChain`](crate::chain::OriginChain)
//! and [`DestinationChain`](crate::chain::DestinationChain), with failure
//! injection, for exercising the relayer without RPC endpoints.
//!
//! ## Submodules
//!
//! - `mock_origin` - L1 bridge contract with lock logs, receipts and an unlock guard
//! - `mock_destination` - Solana mint with signature history, token accounts and memos
//! - `assertions` - Common test assertions

pub mod assertions;
pub mod mock_destination;
pub mod mock_origin;

pub use assertions::*;
pub use mock_destination::*;
pub use mock_origin::*;
