// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Pure computations on on-road indexes: the delta of a batch of confirmed
//! blocks, the fold of several deltas, and the application of a delta onto
//! absolute totals.

use num::{BigInt, Zero};
use onroad_exports::{AbsoluteIndex, OnRoadError, OnRoadLedger, SignedIndex, TokenBalance};
use onroad_hash::Hash;
use onroad_models::{AccountBlock, Address, TokenId};
use std::collections::{btree_map::Entry, BTreeMap, BTreeSet};

/// Net change of the on-road totals caused by confirming `blocks` together.
///
/// A send and its receive confirmed in the same batch cancel out. A send alone
/// puts `+amount, +1` on the road of its recipient; a receive alone takes
/// `-amount, -1` off the road of its account, using the token and amount of the
/// send it receives. Genesis receives have no send and are skipped.
pub(crate) fn compute_delta<'b>(
    ledger: &dyn OnRoadLedger,
    blocks: impl IntoIterator<Item = &'b AccountBlock>,
) -> Result<SignedIndex, OnRoadError> {
    // unmatched half of each transfer, by send hash
    let mut unmatched: BTreeMap<Hash, &AccountBlock> = BTreeMap::new();
    let mut match_half = |send_hash: Hash, block: &'b AccountBlock| match unmatched.entry(send_hash) {
        Entry::Occupied(other) if other.get().is_send_block() != block.is_send_block() => {
            other.remove();
        }
        Entry::Occupied(mut other) => {
            other.insert(block);
        }
        Entry::Vacant(slot) => {
            slot.insert(block);
        }
    };

    for block in blocks {
        if block.is_send_block() {
            match_half(block.hash, block);
            continue;
        }
        if ledger.is_genesis_account_block(&block.hash) {
            continue;
        }
        match_half(block.from_block_hash, block);
        if block.account_address.is_contract() {
            for generated in &block.send_block_list {
                match_half(generated.hash, generated);
            }
        }
    }

    let mut delta = SignedIndex::default();
    for (send_hash, block) in unmatched {
        if block.is_send_block() {
            delta.add(
                block.to_address,
                block.token_id,
                BigInt::from(block.amount.clone()),
                1,
            );
        } else {
            let send = ledger.account_block_by_hash(&send_hash)?.ok_or(
                OnRoadError::MissingSourceBlock {
                    send_hash,
                    receive_hash: block.hash,
                },
            )?;
            delta.add(
                block.account_address,
                send.token_id,
                -BigInt::from(send.amount),
                -1,
            );
        }
    }
    Ok(delta)
}

/// Sum of `deltas`, keeping only the addresses of `filter` if any
pub(crate) fn fold_deltas<'d>(
    filter: Option<&BTreeSet<Address>>,
    deltas: impl IntoIterator<Item = &'d SignedIndex>,
) -> SignedIndex {
    let mut folded = SignedIndex::default();
    for delta in deltas {
        match filter {
            None => folded.merge(delta),
            Some(addresses) => {
                for address in addresses {
                    if let Some(balances) = delta.0.get(address) {
                        let entry = folded.0.entry(*address).or_default();
                        for (token_id, balance) in balances {
                            entry.entry(*token_id).or_default().merge(balance);
                        }
                    }
                }
            }
        }
    }
    folded
}

/// Apply `delta` onto `base`.
///
/// Nothing is modified if any touched balance would become negative, or hold an
/// amount without any transfer. Balances falling back to zero are removed.
pub(crate) fn apply_delta(base: &mut AbsoluteIndex, delta: &SignedIndex) -> Result<(), OnRoadError> {
    let mut updates: Vec<(Address, TokenId, TokenBalance)> = Vec::new();
    let mut conflicts: Vec<String> = Vec::new();
    for (address, balances) in &delta.0 {
        for (token_id, change) in balances {
            let (amount, count) = match base.0.get(address).and_then(|b| b.get(token_id)) {
                Some(old) => (
                    BigInt::from(old.total_amount.clone()) + &change.amount,
                    old.count as i128 + change.count as i128,
                ),
                None => (change.amount.clone(), change.count as i128),
            };
            let total_amount = amount.to_biguint();
            match (total_amount, u64::try_from(count)) {
                (Some(total_amount), Ok(count)) if count > 0 || total_amount.is_zero() => {
                    updates.push((*address, *token_id, TokenBalance { total_amount, count }));
                }
                _ => conflicts.push(format!(
                    "address={} token={} amount={} count={}",
                    address, token_id, amount, count
                )),
            }
        }
    }
    if !conflicts.is_empty() {
        return Err(OnRoadError::ConflictError(conflicts.join(" | ")));
    }

    for (address, token_id, balance) in updates {
        if balance.is_empty() {
            if let Some(balances) = base.0.get_mut(&address) {
                balances.remove(&token_id);
                if balances.is_empty() {
                    base.0.remove(&address);
                }
            }
        } else {
            base.0.entry(address).or_default().insert(token_id, balance);
        }
    }
    Ok(())
}

/// true if some balance of `delta` is not zero
pub(crate) fn has_effect(delta: &SignedIndex) -> bool {
    delta
        .0
        .values()
        .flat_map(|balances| balances.values())
        .any(|balance| balance.count != 0 || !balance.amount.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use num::BigUint;
    use onroad_exports::test_exports::MemoryLedger;
    use onroad_exports::MockOnRoadLedger;
    use rand::seq::SliceRandom;

    fn addresses() -> (Address, Address, TokenId) {
        (
            Address::user_from_data(b"alice"),
            Address::user_from_data(b"bob"),
            TokenId::from_data(b"VITE"),
        )
    }

    fn balance(amount: u64, count: u64) -> TokenBalance {
        TokenBalance {
            total_amount: BigUint::from(amount),
            count,
        }
    }

    #[test]
    fn test_send_and_receive_in_same_batch_cancel() {
        let ledger = MemoryLedger::new();
        let (alice, bob, vite) = addresses();
        let send = ledger.send(alice, bob, vite, 100);
        let receive = ledger.receive(bob, send.hash);

        let delta = compute_delta(&ledger, [&receive, &send]).unwrap();
        assert!(delta.is_empty());
        let delta = compute_delta(&ledger, [&send, &receive]).unwrap();
        assert!(delta.is_empty());
    }

    #[test]
    fn test_lone_halves_move_the_amount_on_and_off_the_road() {
        let ledger = MemoryLedger::new();
        let (alice, bob, vite) = addresses();
        let send = ledger.send(alice, bob, vite, 100);
        let receive = ledger.receive(bob, send.hash);

        let on = compute_delta(&ledger, [&send]).unwrap();
        assert_eq!(on.0[&bob][&vite].amount, BigInt::from(100));
        assert_eq!(on.0[&bob][&vite].count, 1);
        assert!(!on.0.contains_key(&alice));

        let off = compute_delta(&ledger, [&receive]).unwrap();
        assert_eq!(off.0[&bob][&vite].amount, BigInt::from(-100));
        assert_eq!(off.0[&bob][&vite].count, -1);

        assert!(!has_effect(&fold_deltas(None, [&on, &off])));
    }

    #[test]
    fn test_genesis_receive_is_skipped() {
        let ledger = MemoryLedger::new();
        let (alice, _, vite) = addresses();
        let genesis = ledger.genesis_receive(alice, vite, 1_000);
        assert!(compute_delta(&ledger, [&genesis]).unwrap().is_empty());
    }

    #[test]
    fn test_contract_generated_sends_are_reconciled() {
        let ledger = MemoryLedger::new();
        let (alice, bob, vite) = addresses();
        let contract = Address::contract_from_data(b"dex");
        let call = ledger.send(alice, contract, vite, 50);
        let execution = ledger.contract_receive(contract, call.hash, &[(bob, vite, 20)]);
        let generated = &execution.send_block_list[0];

        // the call is received and the generated send is on the road
        let delta = compute_delta(&ledger, [&call, &execution]).unwrap();
        assert!(!delta.0.contains_key(&contract));
        assert_eq!(delta.0[&bob][&vite].amount, BigInt::from(20));

        // bob receives the generated send in the same batch
        let payout = ledger.receive(bob, generated.hash);
        let delta = compute_delta(&ledger, [&call, &execution, &payout]).unwrap();
        assert!(delta.is_empty());
    }

    #[test]
    fn test_missing_send_is_reported() {
        let (_, bob, _) = addresses();
        let receive_hash = Hash::compute_from(b"receive");
        let send_hash = Hash::compute_from(b"send");
        let ledger = MemoryLedger::new();
        let mut receive = ledger.receive(bob, send_hash);
        receive.hash = receive_hash;

        let mut mock = MockOnRoadLedger::new();
        mock.expect_is_genesis_account_block().return_const(false);
        mock.expect_account_block_by_hash()
            .with(mockall::predicate::eq(send_hash))
            .times(1)
            .returning(|_| Ok(None));
        assert_matches!(
            compute_delta(&mock, [&receive]),
            Err(OnRoadError::MissingSourceBlock { send_hash: s, receive_hash: r })
                if s == send_hash && r == receive_hash
        );
    }

    #[test]
    fn test_fold_is_order_independent() {
        let mut rng = rand::thread_rng();
        let (alice, bob, vite) = addresses();
        let other = TokenId::from_data(b"OTHER");
        let mut deltas: Vec<SignedIndex> = (0..12i64)
            .map(|i| {
                let mut delta = SignedIndex::default();
                delta.add(alice, vite, BigInt::from(i * 7 - 30), i % 3 - 1);
                delta.add(if i % 2 == 0 { bob } else { alice }, other, BigInt::from(i), 1);
                delta
            })
            .collect();
        let expected = fold_deltas(None, &deltas);
        for _ in 0..10 {
            deltas.shuffle(&mut rng);
            assert_eq!(fold_deltas(None, &deltas), expected);
        }

        let only_bob = BTreeSet::from([bob]);
        let filtered = fold_deltas(Some(&only_bob), &deltas);
        assert_eq!(filtered.0.len(), 1);
        assert_eq!(filtered.0[&bob], expected.0[&bob]);
    }

    #[test]
    fn test_apply_rejects_instead_of_clamping() {
        let (alice, bob, vite) = addresses();
        let mut base = AbsoluteIndex::default();
        base.0.insert(bob, BTreeMap::from([(vite, balance(100, 1))]));
        let before = base.clone();

        // more received than sent
        let mut delta = SignedIndex::default();
        delta.add(bob, vite, BigInt::from(-150), -1);
        assert_matches!(apply_delta(&mut base, &delta), Err(OnRoadError::ConflictError(_)));

        // amount left without any transfer
        let mut delta = SignedIndex::default();
        delta.add(bob, vite, BigInt::from(-50), -1);
        assert_matches!(apply_delta(&mut base, &delta), Err(OnRoadError::ConflictError(_)));

        // negative count, alongside a valid change for alice
        let mut delta = SignedIndex::default();
        delta.add(alice, vite, BigInt::from(5), 1);
        delta.add(bob, vite, BigInt::from(-100), -2);
        assert_matches!(apply_delta(&mut base, &delta), Err(OnRoadError::ConflictError(_)));

        assert_eq!(base, before);
    }

    #[test]
    fn test_apply_prunes_emptied_balances() {
        let (alice, bob, vite) = addresses();
        let mut base = AbsoluteIndex::default();
        base.0.insert(bob, BTreeMap::from([(vite, balance(100, 1))]));

        let mut delta = SignedIndex::default();
        delta.add(bob, vite, BigInt::from(-100), -1);
        delta.add(alice, vite, BigInt::from(0), 1);
        apply_delta(&mut base, &delta).unwrap();
        assert!(base.get(&bob).is_none());
        assert_eq!(base.get(&alice).unwrap()[&vite], balance(0, 1));
    }
}
