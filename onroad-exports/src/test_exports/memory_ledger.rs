// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::error::OnRoadError;
use crate::ledger::OnRoadLedger;
use num::BigUint;
use onroad_hash::Hash;
use onroad_models::{
    AccountBlock, Address, BlockType, HashHeight, SnapshotBlock, SnapshotChunk, TokenId,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// In-memory ledger.
///
/// Blocks are appended unconfirmed and confirmed all at once by `snapshot`.
/// Height 1 is an empty genesis snapshot.
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

struct LedgerState {
    blocks: HashMap<Hash, AccountBlock>,
    genesis: HashSet<Hash>,
    snapshots: Vec<SnapshotChunk>,
    unconfirmed: Vec<AccountBlock>,
    heads: HashMap<Address, (u64, Hash)>,
    nonce: u64,
}

impl LedgerState {
    fn next_hash(&mut self, kind: &[u8]) -> Hash {
        self.nonce += 1;
        Hash::compute_from(&[kind, &self.nonce.to_be_bytes()[..]].concat())
    }

    fn latest(&self) -> &SnapshotBlock {
        self.snapshots
            .last()
            .and_then(|chunk| chunk.snapshot_block.as_ref())
            .expect("the genesis snapshot is never rolled back")
    }

    fn new_block(
        &mut self,
        block_type: BlockType,
        account_address: Address,
        to_address: Address,
        from_block_hash: Hash,
        token_id: TokenId,
        amount: BigUint,
    ) -> AccountBlock {
        let hash = self.next_hash(b"account block");
        let (height, prev_hash) = self
            .heads
            .get(&account_address)
            .copied()
            .unwrap_or((0, Hash::zero()));
        self.heads.insert(account_address, (height + 1, hash));
        AccountBlock {
            block_type,
            hash,
            height: height + 1,
            prev_hash,
            account_address,
            to_address,
            from_block_hash,
            token_id,
            amount,
            send_block_list: Vec::new(),
        }
    }

    fn append(&mut self, block: AccountBlock) -> AccountBlock {
        for generated in &block.send_block_list {
            self.blocks.insert(generated.hash, generated.clone());
        }
        self.blocks.insert(block.hash, block.clone());
        self.unconfirmed.push(block.clone());
        block
    }

    fn canonical(&self, height: u64) -> Option<&SnapshotChunk> {
        if height == 0 {
            return None;
        }
        self.snapshots.get((height - 1) as usize)
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    /// Ledger holding only the genesis snapshot
    pub fn new() -> Self {
        let genesis = SnapshotBlock {
            hash: Hash::compute_from(b"genesis snapshot"),
            prev_hash: Hash::zero(),
            height: 1,
        };
        MemoryLedger {
            state: RwLock::new(LedgerState {
                blocks: HashMap::new(),
                genesis: HashSet::new(),
                snapshots: vec![SnapshotChunk {
                    snapshot_block: Some(genesis),
                    account_blocks: Vec::new(),
                }],
                unconfirmed: Vec::new(),
                heads: HashMap::new(),
                nonce: 0,
            }),
        }
    }

    /// Append an unconfirmed send of `amount` of `token_id` from `from` to `to`
    pub fn send(&self, from: Address, to: Address, token_id: TokenId, amount: u64) -> AccountBlock {
        let mut state = self.state.write();
        let block = state.new_block(
            BlockType::SendCall,
            from,
            to,
            Hash::zero(),
            token_id,
            BigUint::from(amount),
        );
        state.append(block)
    }

    /// Append an unconfirmed receive of `send_hash` on the chain of `by`
    pub fn receive(&self, by: Address, send_hash: Hash) -> AccountBlock {
        self.contract_receive(by, send_hash, &[])
    }

    /// Append an unconfirmed receive of `send_hash` on the chain of `by`, which
    /// emits the sends `generated` (recipient, token, amount)
    pub fn contract_receive(
        &self,
        by: Address,
        send_hash: Hash,
        generated: &[(Address, TokenId, u64)],
    ) -> AccountBlock {
        let mut state = self.state.write();
        let (token_id, amount) = state
            .blocks
            .get(&send_hash)
            .map(|send| (send.token_id, send.amount.clone()))
            .unwrap_or_default();
        let mut block = state.new_block(
            BlockType::Receive,
            by,
            by,
            send_hash,
            token_id,
            amount,
        );
        for (to, token_id, amount) in generated {
            let send = state.new_block(
                BlockType::SendCall,
                by,
                *to,
                Hash::zero(),
                *token_id,
                BigUint::from(*amount),
            );
            block.send_block_list.push(send);
        }
        state.append(block)
    }

    /// Append an unconfirmed genesis receive crediting `address`
    pub fn genesis_receive(&self, address: Address, token_id: TokenId, amount: u64) -> AccountBlock {
        let mut state = self.state.write();
        let block = state.new_block(
            BlockType::GenesisReceive,
            address,
            address,
            Hash::zero(),
            token_id,
            BigUint::from(amount),
        );
        state.genesis.insert(block.hash);
        state.append(block)
    }

    /// Next snapshot, confirming every unconfirmed block, without committing it
    pub fn prepare_snapshot(&self) -> SnapshotChunk {
        let mut state = self.state.write();
        let prev = state.latest().clone();
        let hash = state.next_hash(b"snapshot block");
        SnapshotChunk {
            snapshot_block: Some(SnapshotBlock {
                hash,
                prev_hash: prev.hash,
                height: prev.height + 1,
            }),
            account_blocks: state.unconfirmed.clone(),
        }
    }

    /// Commit a snapshot built by `prepare_snapshot`
    pub fn commit_snapshot(&self, chunk: &SnapshotChunk) {
        let mut state = self.state.write();
        let confirmed: HashSet<Hash> = chunk.account_blocks.iter().map(|block| block.hash).collect();
        state
            .unconfirmed
            .retain(|block| !confirmed.contains(&block.hash));
        state.snapshots.push(chunk.clone());
    }

    /// Confirm every unconfirmed block in a new snapshot
    pub fn snapshot(&self) -> SnapshotChunk {
        let chunk = self.prepare_snapshot();
        self.commit_snapshot(&chunk);
        chunk
    }

    /// Roll the snapshot chain back to `height`, forgetting the account blocks
    /// confirmed above it. Returns the removed chunks by ascending height.
    pub fn rollback_to(&self, height: u64) -> Vec<SnapshotChunk> {
        let mut state = self.state.write();
        let keep = height.max(1) as usize;
        if keep >= state.snapshots.len() {
            return Vec::new();
        }
        let removed = state.snapshots.split_off(keep);
        for chunk in &removed {
            for block in &chunk.account_blocks {
                state.blocks.remove(&block.hash);
                state.genesis.remove(&block.hash);
                for generated in &block.send_block_list {
                    state.blocks.remove(&generated.hash);
                }
            }
        }
        removed
    }

    /// Identity of the latest snapshot
    pub fn latest(&self) -> HashHeight {
        self.state.read().latest().hash_height()
    }
}

impl OnRoadLedger for MemoryLedger {
    fn latest_snapshot(&self) -> Result<HashHeight, OnRoadError> {
        Ok(self.latest())
    }

    fn snapshot_hash_at(&self, height: u64) -> Result<Option<Hash>, OnRoadError> {
        Ok(self
            .state
            .read()
            .canonical(height)
            .and_then(|chunk| chunk.snapshot_block.as_ref())
            .map(|snapshot| snapshot.hash))
    }

    fn snapshot_blocks_by_height(
        &self,
        height: u64,
        ascending: bool,
        count: u64,
    ) -> Result<Vec<SnapshotBlock>, OnRoadError> {
        let state = self.state.read();
        let mut result = Vec::new();
        let mut current = height;
        while (result.len() as u64) < count {
            let Some(snapshot) = state
                .canonical(current)
                .and_then(|chunk| chunk.snapshot_block.clone())
            else {
                break;
            };
            result.push(snapshot);
            current = if ascending {
                current + 1
            } else {
                match current.checked_sub(1) {
                    Some(next) => next,
                    None => break,
                }
            };
        }
        Ok(result)
    }

    fn sub_ledger(&self, start: u64, end: u64) -> Result<Vec<SnapshotChunk>, OnRoadError> {
        let state = self.state.read();
        Ok((start.max(1)..=end)
            .map_while(|height| state.canonical(height).cloned())
            .collect())
    }

    fn account_block_by_hash(&self, hash: &Hash) -> Result<Option<AccountBlock>, OnRoadError> {
        Ok(self.state.read().blocks.get(hash).cloned())
    }

    fn is_genesis_account_block(&self, hash: &Hash) -> bool {
        self.state.read().genesis.contains(hash)
    }

    fn unconfirmed_blocks(&self, address: &Address) -> Vec<AccountBlock> {
        self.state
            .read()
            .unconfirmed
            .iter()
            .filter(|block| &block.account_address == address)
            .cloned()
            .collect()
    }

    fn all_unconfirmed_blocks(&self) -> Vec<AccountBlock> {
        self.state.read().unconfirmed.clone()
    }

    fn load_all_on_road(&self) -> Result<BTreeMap<Address, Vec<Hash>>, OnRoadError> {
        let state = self.state.read();
        let mut sends = Vec::new();
        let mut received = BTreeSet::new();
        for chunk in &state.snapshots {
            for block in &chunk.account_blocks {
                if block.is_send_block() {
                    sends.push(block);
                    continue;
                }
                if state.genesis.contains(&block.hash) {
                    continue;
                }
                received.insert(block.from_block_hash);
                if block.account_address.is_contract() {
                    sends.extend(block.send_block_list.iter());
                }
            }
        }
        let mut on_road: BTreeMap<Address, Vec<Hash>> = BTreeMap::new();
        for send in sends {
            if !received.contains(&send.hash) {
                on_road.entry(send.to_address).or_default().push(send.hash);
            }
        }
        Ok(on_road)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_confirms_pending_blocks() {
        let ledger = MemoryLedger::new();
        let alice = Address::user_from_data(b"alice");
        let bob = Address::user_from_data(b"bob");
        let token = TokenId::from_data(b"VITE");

        let send = ledger.send(alice, bob, token, 100);
        assert_eq!(ledger.unconfirmed_blocks(&alice), vec![send.clone()]);
        assert!(ledger.unconfirmed_blocks(&bob).is_empty());

        let chunk = ledger.snapshot();
        assert_eq!(chunk.account_blocks, vec![send.clone()]);
        assert_eq!(ledger.latest().height, 2);
        assert!(ledger.all_unconfirmed_blocks().is_empty());
        assert_eq!(
            ledger.load_all_on_road().unwrap().get(&bob),
            Some(&vec![send.hash])
        );

        ledger.receive(bob, send.hash);
        ledger.snapshot();
        assert!(ledger.load_all_on_road().unwrap().is_empty());
    }

    #[test]
    fn test_rollback_forgets_confirmed_blocks() {
        let ledger = MemoryLedger::new();
        let alice = Address::user_from_data(b"alice");
        let bob = Address::user_from_data(b"bob");
        let token = TokenId::from_data(b"VITE");

        ledger.snapshot();
        let send = ledger.send(alice, bob, token, 100);
        ledger.snapshot();
        let removed = ledger.rollback_to(2);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].snapshot_block.as_ref().unwrap().height, 3);
        assert_eq!(ledger.latest().height, 2);
        assert!(ledger.account_block_by_hash(&send.hash).unwrap().is_none());
        assert!(ledger.snapshot_hash_at(3).unwrap().is_none());

        let headers = ledger.snapshot_blocks_by_height(2, false, 5).unwrap();
        assert_eq!(
            headers.iter().map(|h| h.height).collect::<Vec<_>>(),
            vec![2, 1]
        );
    }
}
