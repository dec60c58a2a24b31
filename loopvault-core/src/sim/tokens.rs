use std::collections::BTreeMap;

use super::SnapshotStack;
use crate::collab::{Checkpoint, ExternalError, Journaled, TokenLedger};
use crate::domain::{AccountId, Amount, Asset};

type Balances = BTreeMap<(Asset, AccountId), Amount>;

/// In-memory token balances.
#[derive(Debug, Clone, Default)]
pub struct SimTokens {
    balances: Balances,
    journal: SnapshotStack<Balances>,
}

impl SimTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` out of thin air.
    pub fn mint(&mut self, asset: Asset, account: &AccountId, amount: Amount) -> Result<(), ExternalError> {
        let balance = self
            .balances
            .entry((asset, account.clone()))
            .or_insert(Amount::ZERO);
        *balance = balance.checked_add(amount)?;
        Ok(())
    }

    /// Total of `asset` across all accounts.
    pub fn supply(&self, asset: Asset) -> Result<Amount, ExternalError> {
        let amounts = self
            .balances
            .iter()
            .filter(|((a, _), _)| *a == asset)
            .map(|(_, amount)| *amount);
        Ok(Amount::checked_sum(amounts)?)
    }

    /// Non-zero balances, ordered by asset then account.
    pub fn balances(&self) -> impl Iterator<Item = (Asset, &AccountId, Amount)> + '_ {
        self.balances
            .iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|((asset, account), amount)| (*asset, account, *amount))
    }
}

impl Journaled for SimTokens {
    fn checkpoint(&mut self) -> Checkpoint {
        self.journal.push(&self.balances)
    }

    fn revert_to(&mut self, checkpoint: Checkpoint) -> Result<(), ExternalError> {
        self.balances = self.journal.revert(checkpoint)?;
        Ok(())
    }

    fn release(&mut self, checkpoint: Checkpoint) {
        self.journal.release(checkpoint);
    }
}

impl TokenLedger for SimTokens {
    fn transfer(
        &mut self,
        asset: Asset,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), ExternalError> {
        let available = self.balance_of(asset, from);
        let remaining = available
            .checked_sub(amount)
            .ok_or_else(|| ExternalError::InsufficientFunds {
                asset,
                account: from.clone(),
                needed: amount,
                available,
            })?;
        if from == to || amount.is_zero() {
            return Ok(());
        }
        let credited = self.balance_of(asset, to).checked_add(amount)?;
        self.balances.insert((asset, from.clone()), remaining);
        self.balances.insert((asset, to.clone()), credited);
        Ok(())
    }

    fn balance_of(&self, asset: Asset, account: &AccountId) -> Amount {
        self.balances
            .get(&(asset, account.clone()))
            .copied()
            .unwrap_or(Amount::ZERO)
    }
}
