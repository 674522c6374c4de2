//! Bridge-relevant content of Solana transactions

use solana_sdk::{instruction::CompiledInstruction, pubkey::Pubkey};

use super::instructions::{
    is_memo_program, is_token_program, TAG_BURN, TAG_BURN_CHECKED, TAG_MINT_TO,
    TAG_MINT_TO_CHECKED,
};
use crate::types::{BurnRecord, DestTransaction, MintRecord};

/// Instruction with account indexes into the transaction's full key list
#[derive(Debug, Clone)]
pub struct RawInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

impl From<&CompiledInstruction> for RawInstruction {
    fn from(ix: &CompiledInstruction) -> Self {
        Self {
            program_id_index: ix.program_id_index,
            accounts: ix.accounts.clone(),
            data: ix.data.clone(),
        }
    }
}

/// Transaction metadata carried through parsing unchanged
#[derive(Debug, Clone)]
pub struct TxHeader {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub failed: bool,
}

/// Collect memos plus mints and burns of `mint`
///
/// Instructions referencing accounts outside `account_keys` are ignored.
pub fn parse_bridge_transaction(
    header: TxHeader,
    account_keys: &[Pubkey],
    instructions: &[RawInstruction],
    mint: &Pubkey,
) -> DestTransaction {
    let mut memos = Vec::new();
    let mut mints = Vec::new();
    let mut burns = Vec::new();

    let key = |index: u8| account_keys.get(index as usize);

    for ix in instructions {
        let Some(program_id) = key(ix.program_id_index) else {
            continue;
        };

        if is_memo_program(program_id) {
            memos.push(String::from_utf8_lossy(&ix.data).into_owned());
            continue;
        }

        if !is_token_program(program_id) || ix.data.len() < 9 {
            continue;
        }

        let Ok(amount_bytes) = <[u8; 8]>::try_from(&ix.data[1..9]) else {
            continue;
        };
        let amount = u64::from_le_bytes(amount_bytes);
        let account = |position: usize| ix.accounts.get(position).and_then(|i| key(*i));

        match ix.data[0] {
            // MintTo: [mint, destination, authority]
            TAG_MINT_TO | TAG_MINT_TO_CHECKED => {
                if let (Some(ix_mint), Some(destination)) = (account(0), account(1)) {
                    if ix_mint == mint {
                        mints.push(MintRecord {
                            token_account: destination.to_string(),
                            amount,
                        });
                    }
                }
            }
            // Burn: [account, mint, owner]
            TAG_BURN | TAG_BURN_CHECKED => {
                if let (Some(source), Some(ix_mint), Some(owner)) =
                    (account(0), account(1), account(2))
                {
                    if ix_mint == mint {
                        burns.push(BurnRecord {
                            token_account: source.to_string(),
                            owner: owner.to_string(),
                            amount,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    DestTransaction {
        signature: header.signature,
        slot: header.slot,
        block_time: header.block_time,
        failed: header.failed,
        memos,
        mints,
        burns,
    }
}
