//! Integration tests for the position ledger.
//!
//! 1. End-to-end borrow / repay / deposit / withdraw on one position.
//! 2. Identifier reuse after deletion.
//! 3. Transaction isolation across positions.

use chrono::{Duration, TimeZone, Utc};
use loopvault_core::domain::{Amount, PositionId};
use loopvault_core::ledger::{LedgerError, PositionLedger};

const ID: PositionId = PositionId(1234);

fn units(n: u64) -> Amount {
    Amount::from_units(n)
}

// ──────────────────────────────────────────────
// End-to-end
// ──────────────────────────────────────────────

#[test]
fn borrow_repay_deposit_withdraw() {
    let mut ledger = PositionLedger::default();
    let opened = Utc.with_ymd_and_hms(2022, 7, 8, 23, 14, 39).unwrap();
    ledger.create_position(ID, units(1_000_000), opened).unwrap();

    ledger.borrow(ID, units(10_000)).unwrap();
    ledger.repay(ID, units(1_000)).unwrap();
    assert_eq!(ledger.borrowed(ID).unwrap(), units(9_000));

    ledger.deposit_principal(ID, units(50_000)).unwrap();
    assert_eq!(ledger.total_principal_value(ID).unwrap(), units(1_050_000));

    ledger.withdraw_principal(ID, units(30_000)).unwrap();
    assert_eq!(ledger.total_principal_value(ID).unwrap(), units(1_020_000));

    let err = ledger.withdraw_principal(ID, units(1_020_001)).unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    assert_eq!(ledger.total_principal_value(ID).unwrap(), units(1_020_000));

    // The original contribution is recorded separately and never drawn down.
    assert_eq!(ledger.principal(ID).unwrap(), units(1_000_000));
    assert_eq!(ledger.expire_time(ID).unwrap(), opened + Duration::days(369));
}

#[test]
fn missing_position_is_not_found_everywhere() {
    let mut ledger = PositionLedger::default();
    let id = PositionId(7);
    assert_eq!(ledger.borrow(id, units(1)), Err(LedgerError::NotFound(id)));
    assert_eq!(ledger.repay(id, units(1)), Err(LedgerError::NotFound(id)));
    assert_eq!(ledger.deposit_principal(id, units(1)), Err(LedgerError::NotFound(id)));
    assert_eq!(ledger.withdraw_principal(id, units(1)), Err(LedgerError::NotFound(id)));
    assert_eq!(ledger.add_shares(id, units(1)), Err(LedgerError::NotFound(id)));
    assert_eq!(ledger.remove_shares(id, units(1)), Err(LedgerError::NotFound(id)));
    assert!(ledger.principal(id).is_err());
}

// ──────────────────────────────────────────────
// Identifier lifecycle
// ──────────────────────────────────────────────

#[test]
fn deleted_identifier_can_be_reused() {
    let mut ledger = PositionLedger::new(30);
    let now = Utc::now();
    ledger.create_position(ID, units(5), now).unwrap();
    ledger.add_shares(ID, units(5)).unwrap();
    let removed = ledger.delete_position(ID).unwrap();
    assert_eq!(removed.yield_shares, units(5));

    ledger.create_position(ID, units(9), now).unwrap();
    let fresh = ledger.get(ID).unwrap();
    assert_eq!(fresh.principal, units(9));
    assert_eq!(fresh.yield_shares, Amount::ZERO);
    assert_eq!(fresh.time_to_live_days, 30);
}

// ──────────────────────────────────────────────
// Transactions
// ──────────────────────────────────────────────

#[test]
fn transaction_touches_only_staged_positions() {
    let mut ledger = PositionLedger::default();
    let now = Utc::now();
    let other = PositionId(1);
    ledger.create_position(ID, units(10), now).unwrap();
    ledger.create_position(other, units(20), now).unwrap();
    ledger.borrow(other, units(3)).unwrap();

    let mut tx = ledger.begin();
    tx.borrow(ID, units(4)).unwrap();
    tx.add_shares(ID, units(14)).unwrap();
    assert_eq!(tx.commit(), 1);

    assert_eq!(ledger.borrowed(ID).unwrap(), units(4));
    assert_eq!(ledger.borrowed(other).unwrap(), units(3));
    assert_eq!(ledger.total_borrowed().unwrap(), units(7));
}

#[test]
fn delete_inside_transaction_respects_staged_debt() {
    let mut ledger = PositionLedger::default();
    ledger.create_position(ID, units(10), Utc::now()).unwrap();

    let mut tx = ledger.begin();
    tx.borrow(ID, units(1)).unwrap();
    assert!(matches!(
        tx.delete_position(ID),
        Err(LedgerError::OutstandingDebt { .. })
    ));
    tx.repay(ID, units(1)).unwrap();
    tx.delete_position(ID).unwrap();
    tx.commit();

    assert!(ledger.is_empty());
}
