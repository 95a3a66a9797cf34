use flash_ledger::{
    Amount, BatchStore, ExpiryWindow, Ledger, LedgerConfig, ManualClock, OpenMint, TokenConfig,
    SECONDS_PER_DAY,
};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Mint { to: usize, amount: Amount },
    Transfer { from: usize, to: usize, amount: Amount },
    Wait { secs: u64 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..4usize, 1..1_000u128).prop_map(|(to, amount)| Op::Mint { to, amount }),
        (0..4usize, 0..4usize, 1..1_500u128)
            .prop_map(|(from, to, amount)| Op::Transfer { from, to, amount }),
        (0..4 * SECONDS_PER_DAY).prop_map(|secs| Op::Wait { secs }),
    ]
}

fn account(idx: usize) -> String {
    format!("acct-{idx}")
}

proptest! {
    #[test]
    fn stored_plus_decayed_equals_supply(ops in prop::collection::vec(op(), 1..60)) {
        let clock = ManualClock::new(0);
        let config = LedgerConfig {
            token: TokenConfig { decimals: 0, ..TokenConfig::default() },
            initial_reserve: 0,
            ..LedgerConfig::default()
        };
        let ledger = Ledger::new(config, clock.clone(), OpenMint).unwrap();
        let mut minted: Amount = 0;

        for op in ops {
            match op {
                Op::Mint { to, amount } => {
                    ledger.mint(&account(0), &account(to), amount).unwrap();
                    minted += amount;
                }
                Op::Transfer { from, to, amount } => {
                    let live_before = ledger.balance_of(&account(from));
                    let result = ledger.transfer(&account(from), &account(to), amount);
                    prop_assert_eq!(result.is_ok(), from != to && amount <= live_before);
                }
                Op::Wait { secs } => clock.advance(secs),
            }
            let stored: Amount = (0..4).map(|i| ledger.stored_balance_of(&account(i))).sum();
            let live: Amount = (0..4).map(|i| ledger.balance_of(&account(i))).sum();
            prop_assert_eq!(ledger.total_supply(), minted);
            prop_assert_eq!(stored + ledger.decayed_supply(), minted);
            prop_assert!(live <= stored);
        }
    }

    #[test]
    fn live_sum_never_grows_with_time(
        deposits in prop::collection::vec((1..500u128, 0..30 * SECONDS_PER_DAY), 1..20),
        t1 in 0..40 * SECONDS_PER_DAY,
        gap in 0..40 * SECONDS_PER_DAY,
    ) {
        let mut deposits = deposits;
        deposits.sort_by_key(|(_, at)| *at);
        let mut store = BatchStore::new();
        for (amount, at) in deposits {
            store.append(amount, at);
        }
        let window = ExpiryWindow::default();
        prop_assert!(store.live_sum(t1 + gap, window) <= store.live_sum(t1, window));
    }
}
