//! Position ledger: keyed store of position records with atomic mutators.
//!
//! The ledger owns a map from `PositionId` to a value-type `PositionRecord`.
//! Every mutator validates against a copy of the record and only writes it
//! back if the whole operation succeeds, so a rejected call leaves no trace.
//!
//! Multi-step requests use [`LedgerTransaction`]: mutations are staged in an
//! overlay and applied together on `commit()`. Dropping the transaction
//! discards them. The transaction holds the ledger's only mutable borrow, so
//! nothing else can observe a half-built position.

mod transaction;

pub use transaction::LedgerTransaction;

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::{Amount, AmountError, PositionId, PositionRecord};

/// Default position lifetime.
pub const DEFAULT_TIME_TO_LIVE_DAYS: u32 = 369;

/// Longest lifetime a configuration may ask for (100 years).
pub const MAX_TIME_TO_LIVE_DAYS: u32 = 36_500;

/// Errors from ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("position {0} already exists")]
    AlreadyExists(PositionId),

    #[error("position {0} not found")]
    NotFound(PositionId),

    #[error("position {id} still has {borrowed} borrowed")]
    OutstandingDebt { id: PositionId, borrowed: Amount },

    #[error("repay of {requested} exceeds {borrowed} borrowed on position {id}")]
    InsufficientDebt {
        id: PositionId,
        requested: Amount,
        borrowed: Amount,
    },

    #[error("withdrawal of {requested} exceeds {available} principal on position {id}")]
    InsufficientBalance {
        id: PositionId,
        requested: Amount,
        available: Amount,
    },

    #[error("removal of {requested} shares exceeds {available} held by position {id}")]
    InsufficientShares {
        id: PositionId,
        requested: Amount,
        available: Amount,
    },

    #[error("arithmetic overflow on position {0}")]
    Overflow(PositionId),
}

/// Keyed store of position records.
#[derive(Debug, Clone)]
pub struct PositionLedger {
    records: BTreeMap<PositionId, PositionRecord>,
    time_to_live_days: u32,
}

impl Default for PositionLedger {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_TO_LIVE_DAYS)
    }
}

impl PositionLedger {
    pub fn new(time_to_live_days: u32) -> Self {
        Self {
            records: BTreeMap::new(),
            time_to_live_days,
        }
    }

    /// Lifetime stamped on newly created positions.
    pub fn time_to_live_days(&self) -> u32 {
        self.time_to_live_days
    }

    /// Open a scoped transaction.
    pub fn begin(&mut self) -> LedgerTransaction<'_> {
        LedgerTransaction::new(self)
    }

    fn apply<R>(
        &mut self,
        op: impl FnOnce(&mut LedgerTransaction<'_>) -> Result<R, LedgerError>,
    ) -> Result<R, LedgerError> {
        let mut tx = self.begin();
        let out = op(&mut tx)?;
        tx.commit();
        Ok(out)
    }

    // ── Mutators ─────────────────────────────────────────────────────

    pub fn create_position(
        &mut self,
        id: PositionId,
        principal: Amount,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.apply(|tx| tx.create_position(id, principal, now))
    }

    /// Remove a position. Requires zero outstanding debt.
    pub fn delete_position(&mut self, id: PositionId) -> Result<PositionRecord, LedgerError> {
        self.apply(|tx| tx.delete_position(id))
    }

    pub fn borrow(&mut self, id: PositionId, amount: Amount) -> Result<(), LedgerError> {
        self.apply(|tx| tx.borrow(id, amount))
    }

    pub fn repay(&mut self, id: PositionId, amount: Amount) -> Result<(), LedgerError> {
        self.apply(|tx| tx.repay(id, amount))
    }

    pub fn deposit_principal(&mut self, id: PositionId, amount: Amount) -> Result<(), LedgerError> {
        self.apply(|tx| tx.deposit_principal(id, amount))
    }

    pub fn withdraw_principal(&mut self, id: PositionId, amount: Amount) -> Result<(), LedgerError> {
        self.apply(|tx| tx.withdraw_principal(id, amount))
    }

    pub fn add_shares(&mut self, id: PositionId, amount: Amount) -> Result<(), LedgerError> {
        self.apply(|tx| tx.add_shares(id, amount))
    }

    pub fn remove_shares(&mut self, id: PositionId, amount: Amount) -> Result<(), LedgerError> {
        self.apply(|tx| tx.remove_shares(id, amount))
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get(&self, id: PositionId) -> Option<&PositionRecord> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: PositionId) -> bool {
        self.records.contains_key(&id)
    }

    fn record(&self, id: PositionId) -> Result<&PositionRecord, LedgerError> {
        self.records.get(&id).ok_or(LedgerError::NotFound(id))
    }

    pub fn principal(&self, id: PositionId) -> Result<Amount, LedgerError> {
        Ok(self.record(id)?.principal)
    }

    pub fn total_principal_value(&self, id: PositionId) -> Result<Amount, LedgerError> {
        Ok(self.record(id)?.total_principal_value)
    }

    pub fn borrowed(&self, id: PositionId) -> Result<Amount, LedgerError> {
        Ok(self.record(id)?.borrowed)
    }

    pub fn shares(&self, id: PositionId) -> Result<Amount, LedgerError> {
        Ok(self.record(id)?.yield_shares)
    }

    pub fn time_opened(&self, id: PositionId) -> Result<DateTime<Utc>, LedgerError> {
        Ok(self.record(id)?.opened_at)
    }

    pub fn time_to_live(&self, id: PositionId) -> Result<Duration, LedgerError> {
        Ok(self.record(id)?.time_to_live())
    }

    pub fn expire_time(&self, id: PositionId) -> Result<DateTime<Utc>, LedgerError> {
        Ok(self.record(id)?.expires_at())
    }

    /// `now >= expires_at`.
    pub fn is_expired(&self, id: PositionId, now: DateTime<Utc>) -> Result<bool, LedgerError> {
        Ok(self.record(id)?.is_expired(now))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = PositionId> + '_ {
        self.records.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PositionId, &PositionRecord)> + '_ {
        self.records.iter().map(|(id, r)| (*id, r))
    }

    /// Sum of outstanding debt across all positions.
    pub fn total_borrowed(&self) -> Result<Amount, AmountError> {
        Amount::checked_sum(self.records.values().map(|r| r.borrowed))
    }

    /// Sum of vault shares held across all positions.
    pub fn total_shares(&self) -> Result<Amount, AmountError> {
        Amount::checked_sum(self.records.values().map(|r| r.yield_shares))
    }
}
