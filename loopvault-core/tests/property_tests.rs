//! Property tests for ledger, policy, and amount invariants.
//!
//! Uses proptest to verify:
//! 1. Borrow/repay sequences never drive `borrowed` negative
//! 2. Rejected mutations leave the record unchanged
//! 3. Mutations on one position never affect another
//! 4. Allowed leverage is non-decreasing in cycles up to the cap
//! 5. Amount decimal strings survive parse → display
//! 6. Aborted opens leave the engine exactly as before

use chrono::Utc;
use proptest::prelude::*;
use loopvault_core::collab::{Collaborators, ManualClock, TokenLedger};
use loopvault_core::domain::{AccountId, Amount, Asset, Bps, PositionId};
use loopvault_core::engine::EngineConfig;
use loopvault_core::ledger::PositionLedger;
use loopvault_core::policy::{LeveragePolicy, PolicyParams};
use loopvault_core::sim::{SimPool, SimTokens, SimVault};
use loopvault_core::SimEngine;

// ── Strategies (proptest) ────────────────────────────────────────────

#[derive(Debug, Clone)]
enum DebtOp {
    Borrow(u64),
    Repay(u64),
}

fn arb_debt_op() -> impl Strategy<Value = DebtOp> {
    prop_oneof![
        (0..10_000u64).prop_map(DebtOp::Borrow),
        (0..10_000u64).prop_map(DebtOp::Repay),
    ]
}

fn arb_amount() -> impl Strategy<Value = Amount> {
    (0..u64::MAX, 0..1_000_000_000_000_000_000u128)
        .prop_map(|(whole, frac)| Amount::from_raw(u128::from(whole) * 1_000_000_000_000_000_000 + frac))
}

fn arb_params() -> impl Strategy<Value = PolicyParams> {
    (1..10_000u16, 1..20u32, 0..500u16).prop_map(|(rate, max_cycles, fee)| PolicyParams {
        cycle_rate: Bps(rate.min(9_999)),
        max_cycles,
        origination_fee: Bps(fee),
        ..PolicyParams::default()
    })
}

// ── 1–2. Borrow / repay ──────────────────────────────────────────────

proptest! {
    /// `borrowed` tracks a shadow counter exactly; over-repays fail and
    /// change nothing.
    #[test]
    fn borrowed_never_negative(ops in prop::collection::vec(arb_debt_op(), 1..60)) {
        let id = PositionId(1);
        let mut ledger = PositionLedger::default();
        ledger.create_position(id, Amount::from_units(1), Utc::now()).unwrap();
        let mut shadow: u64 = 0;

        for op in ops {
            match op {
                DebtOp::Borrow(n) => {
                    ledger.borrow(id, Amount::from_units(n)).unwrap();
                    shadow += n;
                }
                DebtOp::Repay(n) => {
                    let before = ledger.get(id).cloned();
                    let result = ledger.repay(id, Amount::from_units(n));
                    if n > shadow {
                        prop_assert!(result.is_err());
                        prop_assert_eq!(ledger.get(id).cloned(), before);
                    } else {
                        prop_assert!(result.is_ok());
                        shadow -= n;
                    }
                }
            }
            prop_assert_eq!(ledger.borrowed(id).unwrap(), Amount::from_units(shadow));
        }
    }
}

// ── 3. Isolation ─────────────────────────────────────────────────────

proptest! {
    /// Mutating position A leaves position B's record byte-for-byte equal.
    #[test]
    fn positions_are_isolated(
        borrow in 0..1_000_000u64,
        deposit in 0..1_000_000u64,
        shares in 0..1_000_000u64,
    ) {
        let (a, b) = (PositionId(1), PositionId(2));
        let mut ledger = PositionLedger::default();
        let now = Utc::now();
        ledger.create_position(a, Amount::from_units(10), now).unwrap();
        ledger.create_position(b, Amount::from_units(20), now).unwrap();
        let b_before = ledger.get(b).cloned();

        ledger.borrow(a, Amount::from_units(borrow)).unwrap();
        ledger.deposit_principal(a, Amount::from_units(deposit)).unwrap();
        ledger.add_shares(a, Amount::from_units(shares)).unwrap();
        let _ = ledger.withdraw_principal(a, Amount::from_units(deposit + 11));
        let _ = ledger.remove_shares(a, Amount::from_units(shares + 1));

        prop_assert_eq!(ledger.get(b).cloned(), b_before);
    }
}

// ── 4. Policy monotonicity ───────────────────────────────────────────

proptest! {
    /// More cycles never allow less leverage, and the cap is enforced.
    #[test]
    fn leverage_non_decreasing_in_cycles(params in arb_params(), principal in 0..10_000_000u64) {
        let max = params.max_cycles;
        let policy = LeveragePolicy::new(params, AccountId::new("gov")).unwrap();
        let principal = Amount::from_units(principal);

        let mut previous = Amount::ZERO;
        for cycles in 0..=max {
            let leverage = policy.allowed_leverage(principal, cycles).unwrap();
            prop_assert!(leverage >= previous);
            previous = leverage;
        }
        prop_assert!(policy.allowed_leverage(principal, max + 1).is_err());
    }

    /// Collateral cost is non-decreasing in leverage.
    #[test]
    fn collateral_cost_monotone(a in 0..u64::MAX, b in 0..u64::MAX) {
        let policy = LeveragePolicy::new(PolicyParams::default(), AccountId::new("gov")).unwrap();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let lo = policy.collateral_cost(Amount::from_units(lo)).unwrap();
        let hi = policy.collateral_cost(Amount::from_units(hi)).unwrap();
        prop_assert!(lo <= hi);
    }
}

// ── 5. Amount formatting ─────────────────────────────────────────────

proptest! {
    #[test]
    fn amount_display_parses_back(amount in arb_amount()) {
        let text = amount.to_string();
        prop_assert_eq!(text.parse::<Amount>().unwrap(), amount);
    }
}

// ── 6. Aborted open ──────────────────────────────────────────────────

fn acct(name: &str) -> AccountId {
    AccountId::new(name)
}

fn small_world() -> SimEngine {
    let depth = Amount::from_units(1_000_000);
    let mut tokens = SimTokens::new();
    tokens.mint(Asset::Principal, &acct("alice"), Amount::from_units(10_000)).unwrap();
    tokens.mint(Asset::Collateral, &acct("alice"), Amount::from_units(100_000)).unwrap();
    tokens.mint(Asset::Debt, &acct("reserve"), depth).unwrap();
    tokens.mint(Asset::Debt, &acct("pool"), depth).unwrap();
    tokens.mint(Asset::Principal, &acct("pool"), depth).unwrap();
    SimEngine::new(
        EngineConfig::default(),
        LeveragePolicy::new(PolicyParams::default(), acct("governance")).unwrap(),
        Collaborators::new(
            tokens,
            SimPool::new(acct("pool"), depth, depth, Bps(4)),
            SimVault::new(acct("vault")),
        ),
        ManualClock::new(Utc::now()),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A swap failing in any cycle leaves every balance and the ledger as
    /// they were.
    #[test]
    fn failed_cycle_changes_nothing(
        principal in 1..5_000u64,
        cycles in 1..=10u32,
        fail_at in 0..10u32,
    ) {
        let fail_at = fail_at % cycles;
        let mut engine = small_world();
        engine.collaborators_mut().pool.fail_swap_after(fail_at);
        let before = engine.collaborators().tokens.clone();

        let result = engine.open(
            &acct("alice"),
            Amount::from_units(principal),
            cycles,
            Amount::from_units(100_000),
        );
        prop_assert!(result.is_err());
        prop_assert!(engine.ledger().is_empty());
        for (asset, account, amount) in before.balances() {
            prop_assert_eq!(engine.collaborators().tokens.balance_of(asset, account), amount);
        }
        prop_assert_eq!(engine.settlement().watermark(), Amount::ZERO);
    }
}
