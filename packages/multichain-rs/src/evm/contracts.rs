//! L1 bridge contract ABI
//!
//! Only the surface the relayer touches is bound here.

use alloy::sol;

sol! {
    #[sol(rpc)]
    contract MarsBridge {
        /// Tokens escrowed on L1 pending a mint on Solana
        event TokensLocked(address indexed user, uint256 amount, string solanaRecipient, uint256 indexed bridgeId);

        /// Tokens released on L1 for a Solana burn
        event TokensUnlocked(address indexed recipient, uint256 amount, bytes32 indexed solanaTxId, uint256 indexed bridgeId);

        function isSolanaTxProcessed(bytes32 solanaTxId) external view returns (bool processed);

        /// Reverts when `solanaTxId` was already processed
        function unlockTokens(address recipient, uint256 amount, bytes32 solanaTxId) external;

        function bridgeCount() external view returns (uint256 count);
    }
}
