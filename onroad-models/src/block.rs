// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::address::Address;
use crate::token::TokenId;
use num::BigUint;
use onroad_hash::Hash;
use serde::{Deserialize, Serialize};

/// Kind of an account block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlockType {
    /// send that creates a contract
    SendCreate = 1,
    /// send that calls a contract (or a plain transfer)
    SendCall = 2,
    /// send issued by a built-in contract as a reward
    SendReward = 3,
    /// receive of a send
    Receive = 4,
    /// receive of a send whose contract execution failed
    ReceiveError = 5,
    /// send refunding a failed contract call
    SendRefund = 6,
    /// receive block of the genesis snapshot, without originating send
    GenesisReceive = 7,
}

impl BlockType {
    /// true for every kind of send
    pub fn is_send(&self) -> bool {
        matches!(
            self,
            BlockType::SendCreate | BlockType::SendCall | BlockType::SendReward | BlockType::SendRefund
        )
    }

    /// true for every kind of receive
    pub fn is_receive(&self) -> bool {
        matches!(
            self,
            BlockType::Receive | BlockType::ReceiveError | BlockType::GenesisReceive
        )
    }
}

/// Block of an account chain.
///
/// A send moves `amount` of `token_id` from `account_address` into escrow for
/// `to_address`. A receive, on the chain of the recipient, takes it out of
/// escrow and references the send through `from_block_hash`. Contract accounts
/// emit the sends triggered by a receive in its `send_block_list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBlock {
    /// kind of block
    pub block_type: BlockType,
    /// hash of the block
    pub hash: Hash,
    /// height on the account chain
    pub height: u64,
    /// hash of the previous block of the account chain
    pub prev_hash: Hash,
    /// owner of the account chain
    pub account_address: Address,
    /// recipient of a send, unused for receives
    pub to_address: Address,
    /// send received by a receive, unused for sends
    pub from_block_hash: Hash,
    /// transferred token, for sends
    pub token_id: TokenId,
    /// transferred amount, for sends
    pub amount: BigUint,
    /// sends generated by a contract while processing this receive
    pub send_block_list: Vec<AccountBlock>,
}

impl AccountBlock {
    /// true if the block is a send
    pub fn is_send_block(&self) -> bool {
        self.block_type.is_send()
    }

    /// true if the block is a receive
    pub fn is_receive_block(&self) -> bool {
        self.block_type.is_receive()
    }
}
