use super::{FailAfter, SnapshotStack};
use crate::collab::{Checkpoint, ExternalError, Journaled, YieldVault};
use crate::domain::{AccountId, Amount};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Books {
    assets: Amount,
    shares: Amount,
}

/// Share-accounted vault. The first deposit mints shares 1:1; later ones at
/// the current assets-per-share, rounded down in the vault's favour.
#[derive(Debug, Clone)]
pub struct SimVault {
    account: AccountId,
    books: Books,
    fail_deposit: FailAfter,
    fail_redeem: FailAfter,
    journal: SnapshotStack<Books>,
}

impl SimVault {
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            books: Books::default(),
            fail_deposit: FailAfter::default(),
            fail_redeem: FailAfter::default(),
            journal: SnapshotStack::default(),
        }
    }

    /// Book yield. The matching principal must be minted to the vault
    /// account separately.
    pub fn accrue(&mut self, amount: Amount) -> Result<(), ExternalError> {
        self.books.assets = self.books.assets.checked_add(amount)?;
        Ok(())
    }

    /// Book a loss of up to `amount`. Returns the amount actually written off.
    pub fn write_down(&mut self, amount: Amount) -> Amount {
        let lost = amount.min(self.books.assets);
        self.books.assets = self.books.assets.saturating_sub(lost);
        lost
    }

    pub fn fail_deposit_after(&mut self, calls: u32) {
        self.fail_deposit = FailAfter::arm(calls);
    }

    pub fn fail_redeem_after(&mut self, calls: u32) {
        self.fail_redeem = FailAfter::arm(calls);
    }

    fn value_of(&self, shares: Amount) -> Result<Amount, ExternalError> {
        if self.books.shares.is_zero() {
            return Ok(Amount::ZERO);
        }
        Ok(self
            .books
            .assets
            .mul_div_floor(shares.raw(), self.books.shares.raw())?)
    }
}

impl Journaled for SimVault {
    fn checkpoint(&mut self) -> Checkpoint {
        self.journal.push(&self.books)
    }

    fn revert_to(&mut self, checkpoint: Checkpoint) -> Result<(), ExternalError> {
        self.books = self.journal.revert(checkpoint)?;
        Ok(())
    }

    fn release(&mut self, checkpoint: Checkpoint) {
        self.journal.release(checkpoint);
    }
}

impl YieldVault for SimVault {
    fn account(&self) -> &AccountId {
        &self.account
    }

    fn deposit(&mut self, amount: Amount) -> Result<Amount, ExternalError> {
        if self.fail_deposit.tick() {
            return Err(ExternalError::Unavailable("vault deposit failed".into()));
        }
        let Books { assets, shares } = self.books;
        let minted = if shares.is_zero() {
            amount
        } else if assets.is_zero() {
            return Err(ExternalError::VaultRejected(
                "vault has shares outstanding but no assets".into(),
            ));
        } else {
            amount.mul_div_floor(shares.raw(), assets.raw())?
        };
        if minted.is_zero() && !amount.is_zero() {
            return Err(ExternalError::VaultRejected(format!(
                "deposit of {amount} mints no shares"
            )));
        }
        self.books = Books {
            assets: assets.checked_add(amount)?,
            shares: shares.checked_add(minted)?,
        };
        Ok(minted)
    }

    fn redeem(&mut self, shares: Amount) -> Result<Amount, ExternalError> {
        if self.fail_redeem.tick() {
            return Err(ExternalError::Unavailable("vault redeem failed".into()));
        }
        let remaining_shares = self.books.shares.checked_sub(shares).ok_or_else(|| {
            ExternalError::VaultRejected(format!(
                "redeem of {shares} shares exceeds {} outstanding",
                self.books.shares
            ))
        })?;
        let value = self.value_of(shares)?;
        self.books = Books {
            assets: self.books.assets.saturating_sub(value),
            shares: remaining_shares,
        };
        Ok(value)
    }

    fn total_assets(&self) -> Amount {
        self.books.assets
    }

    fn total_shares(&self) -> Amount {
        self.books.shares
    }

    fn preview_value(&self, shares: Amount) -> Result<Amount, ExternalError> {
        self.value_of(shares)
    }

    fn skim(&mut self, amount: Amount) -> Result<(), ExternalError> {
        self.books.assets = self.books.assets.checked_sub(amount).ok_or_else(|| {
            ExternalError::VaultRejected(format!(
                "skim of {amount} exceeds {} assets",
                self.books.assets
            ))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> SimVault {
        SimVault::new(AccountId::new("vault"))
    }

    #[test]
    fn first_deposit_is_one_to_one() {
        let mut v = vault();
        assert_eq!(v.deposit(Amount::from_units(100)).unwrap(), Amount::from_units(100));
        assert_eq!(v.total_assets(), Amount::from_units(100));
        assert_eq!(v.total_shares(), Amount::from_units(100));
    }

    #[test]
    fn accrual_raises_share_value() {
        let mut v = vault();
        v.deposit(Amount::from_units(100)).unwrap();
        v.accrue(Amount::from_units(10)).unwrap();
        assert_eq!(
            v.preview_value(Amount::from_units(50)).unwrap(),
            Amount::from_units(55)
        );
        let minted = v.deposit(Amount::from_units(11)).unwrap();
        assert_eq!(minted, Amount::from_units(10));
        assert_eq!(v.redeem(minted).unwrap(), Amount::from_units(11));
    }

    #[test]
    fn over_redeem_and_over_skim_fail() {
        let mut v = vault();
        v.deposit(Amount::from_units(5)).unwrap();
        assert!(v.redeem(Amount::from_units(6)).is_err());
        assert!(v.skim(Amount::from_units(6)).is_err());
        v.skim(Amount::from_units(1)).unwrap();
        assert_eq!(v.total_assets(), Amount::from_units(4));
    }

    #[test]
    fn revert_restores_books() {
        let mut v = vault();
        let cp = v.checkpoint();
        v.deposit(Amount::from_units(5)).unwrap();
        v.revert_to(cp).unwrap();
        assert_eq!(v.total_shares(), Amount::ZERO);
    }
}
