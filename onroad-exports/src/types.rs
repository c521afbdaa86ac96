// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Values manipulated by the on-road index

use num::{BigInt, BigUint, Zero};
use onroad_models::{Address, HashHeight, TokenId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Amount and number of transfers on their way to one address, for one token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    /// sum of the amounts of the unreceived sends
    pub total_amount: BigUint,
    /// number of unreceived sends
    pub count: u64,
}

impl TokenBalance {
    /// true if nothing is on the road
    pub fn is_empty(&self) -> bool {
        self.count == 0 && self.total_amount.is_zero()
    }
}

/// Change of a `TokenBalance`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedTokenBalance {
    /// amount change
    pub amount: BigInt,
    /// count change
    pub count: i64,
}

impl SignedTokenBalance {
    /// Add another change to this one
    pub fn merge(&mut self, other: &SignedTokenBalance) {
        self.amount += &other.amount;
        self.count += other.count;
    }
}

/// Absolute on-road totals: address -> token -> balance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbsoluteIndex(pub BTreeMap<Address, BTreeMap<TokenId, TokenBalance>>);

impl AbsoluteIndex {
    /// number of addresses with something on the road
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// true if nothing is on the road for anybody
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Balances of `address`
    pub fn get(&self, address: &Address) -> Option<&BTreeMap<TokenId, TokenBalance>> {
        self.0.get(address)
    }

    /// Copy of the entries of the given addresses
    pub fn restricted_to(&self, addresses: &BTreeSet<Address>) -> AbsoluteIndex {
        AbsoluteIndex(
            addresses
                .iter()
                .filter_map(|address| {
                    self.0
                        .get(address)
                        .map(|balances| (*address, balances.clone()))
                })
                .collect(),
        )
    }
}

/// Signed change of the on-road totals: address -> token -> change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedIndex(pub BTreeMap<Address, BTreeMap<TokenId, SignedTokenBalance>>);

impl SignedIndex {
    /// Record a change for `(address, token_id)`
    pub fn add(&mut self, address: Address, token_id: TokenId, amount: BigInt, count: i64) {
        self.0
            .entry(address)
            .or_default()
            .entry(token_id)
            .or_default()
            .merge(&SignedTokenBalance { amount, count });
    }

    /// Add every change of `other` to this one
    pub fn merge(&mut self, other: &SignedIndex) {
        for (address, balances) in &other.0 {
            let entry = self.0.entry(*address).or_default();
            for (token_id, balance) in balances {
                entry.entry(*token_id).or_default().merge(balance);
            }
        }
    }

    /// true if no address is touched
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Absolute index persisted at a given snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// snapshot at which the index was computed
    pub at: HashHeight,
    /// on-road totals once the snapshot is confirmed
    pub index: AbsoluteIndex,
}

/// Delta contributed by one confirmed snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// confirmed snapshot
    pub at: HashHeight,
    /// change of the on-road totals caused by the snapshot
    pub delta: Arc<SignedIndex>,
}

/// Answer to an on-road query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnRoadSummary {
    /// queried address
    pub address: Address,
    /// number of unreceived sends, all tokens together
    pub total_count: u64,
    /// per token on-road balance
    pub balances: BTreeMap<TokenId, TokenBalance>,
}

impl OnRoadSummary {
    /// Summary of `address` from its balances
    pub fn new(address: Address, balances: BTreeMap<TokenId, TokenBalance>) -> Self {
        OnRoadSummary {
            address,
            total_count: balances.values().map(|balance| balance.count).sum(),
            balances,
        }
    }
}

/// Lifecycle state of the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexStatus {
    /// not initialized yet
    Uninitialized,
    /// serving queries
    Ready,
    /// rebuilding its checkpoint store
    Rebuilding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_merge_accumulates_per_token() {
        let alice = Address::user_from_data(b"alice");
        let vite = TokenId::from_data(b"VITE");
        let other = TokenId::from_data(b"OTHER");

        let mut left = SignedIndex::default();
        left.add(alice, vite, BigInt::from(10), 1);
        let mut right = SignedIndex::default();
        right.add(alice, vite, BigInt::from(-4), -1);
        right.add(alice, other, BigInt::from(7), 1);
        left.merge(&right);

        let balances = &left.0[&alice];
        assert_eq!(balances[&vite].amount, BigInt::from(6));
        assert_eq!(balances[&vite].count, 0);
        assert_eq!(balances[&other].count, 1);
    }

    #[test]
    fn test_summary_counts_every_token() {
        let alice = Address::user_from_data(b"alice");
        let mut balances = BTreeMap::new();
        for (seed, count) in [(&b"A"[..], 2u64), (&b"B"[..], 3u64)] {
            balances.insert(
                TokenId::from_data(seed),
                TokenBalance {
                    total_amount: BigUint::from(count * 10),
                    count,
                },
            );
        }
        let summary = OnRoadSummary::new(alice, balances);
        assert_eq!(summary.total_count, 5);
        let json = serde_json::to_string(&summary).unwrap();
        let back: OnRoadSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);
    }
}
