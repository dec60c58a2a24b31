use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::{LedgerError, PositionLedger};
use crate::domain::{Amount, PositionId, PositionRecord};

/// Scoped ledger transaction.
///
/// Reads go through the staging overlay first, then the committed records.
/// `commit()` writes the overlay back in one step; dropping the transaction
/// discards it.
pub struct LedgerTransaction<'a> {
    ledger: &'a mut PositionLedger,
    /// `None` marks a staged deletion.
    staged: BTreeMap<PositionId, Option<PositionRecord>>,
}

impl<'a> LedgerTransaction<'a> {
    pub(super) fn new(ledger: &'a mut PositionLedger) -> Self {
        Self {
            ledger,
            staged: BTreeMap::new(),
        }
    }

    pub fn get(&self, id: PositionId) -> Option<&PositionRecord> {
        match self.staged.get(&id) {
            Some(staged) => staged.as_ref(),
            None => self.ledger.records.get(&id),
        }
    }

    pub fn contains(&self, id: PositionId) -> bool {
        self.get(id).is_some()
    }

    /// Number of positions with staged changes.
    pub fn pending(&self) -> usize {
        self.staged.len()
    }

    /// Apply `f` to a copy of the record and stage the copy only on success.
    fn mutate(
        &mut self,
        id: PositionId,
        f: impl FnOnce(&mut PositionRecord) -> Result<(), LedgerError>,
    ) -> Result<(), LedgerError> {
        let mut record = self.get(id).cloned().ok_or(LedgerError::NotFound(id))?;
        f(&mut record)?;
        self.staged.insert(id, Some(record));
        Ok(())
    }

    pub fn create_position(
        &mut self,
        id: PositionId,
        principal: Amount,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if self.contains(id) {
            return Err(LedgerError::AlreadyExists(id));
        }
        let record = PositionRecord::new(principal, now, self.ledger.time_to_live_days);
        self.staged.insert(id, Some(record));
        Ok(())
    }

    pub fn delete_position(&mut self, id: PositionId) -> Result<PositionRecord, LedgerError> {
        let record = self.get(id).cloned().ok_or(LedgerError::NotFound(id))?;
        if record.has_debt() {
            return Err(LedgerError::OutstandingDebt {
                id,
                borrowed: record.borrowed,
            });
        }
        self.staged.insert(id, None);
        Ok(record)
    }

    pub fn borrow(&mut self, id: PositionId, amount: Amount) -> Result<(), LedgerError> {
        self.mutate(id, |r| {
            r.borrowed = r
                .borrowed
                .checked_add(amount)
                .map_err(|_| LedgerError::Overflow(id))?;
            Ok(())
        })
    }

    pub fn repay(&mut self, id: PositionId, amount: Amount) -> Result<(), LedgerError> {
        self.mutate(id, |r| {
            r.borrowed = r
                .borrowed
                .checked_sub(amount)
                .ok_or(LedgerError::InsufficientDebt {
                    id,
                    requested: amount,
                    borrowed: r.borrowed,
                })?;
            Ok(())
        })
    }

    pub fn deposit_principal(&mut self, id: PositionId, amount: Amount) -> Result<(), LedgerError> {
        self.mutate(id, |r| {
            r.total_principal_value = r
                .total_principal_value
                .checked_add(amount)
                .map_err(|_| LedgerError::Overflow(id))?;
            Ok(())
        })
    }

    /// Withdrawals draw on the whole non-interest balance; `principal` is a
    /// record of the original contribution and is left as is.
    pub fn withdraw_principal(&mut self, id: PositionId, amount: Amount) -> Result<(), LedgerError> {
        self.mutate(id, |r| {
            r.total_principal_value = r.total_principal_value.checked_sub(amount).ok_or(
                LedgerError::InsufficientBalance {
                    id,
                    requested: amount,
                    available: r.total_principal_value,
                },
            )?;
            Ok(())
        })
    }

    pub fn add_shares(&mut self, id: PositionId, amount: Amount) -> Result<(), LedgerError> {
        self.mutate(id, |r| {
            r.yield_shares = r
                .yield_shares
                .checked_add(amount)
                .map_err(|_| LedgerError::Overflow(id))?;
            Ok(())
        })
    }

    pub fn remove_shares(&mut self, id: PositionId, amount: Amount) -> Result<(), LedgerError> {
        self.mutate(id, |r| {
            r.yield_shares =
                r.yield_shares
                    .checked_sub(amount)
                    .ok_or(LedgerError::InsufficientShares {
                        id,
                        requested: amount,
                        available: r.yield_shares,
                    })?;
            Ok(())
        })
    }

    /// Apply every staged change. Returns the number of positions written.
    pub fn commit(self) -> usize {
        let written = self.staged.len();
        for (id, staged) in self.staged {
            match staged {
                Some(record) => {
                    self.ledger.records.insert(id, record);
                }
                None => {
                    self.ledger.records.remove(&id);
                }
            }
        }
        written
    }

    /// Discard every staged change.
    pub fn rollback(self) {}
}
