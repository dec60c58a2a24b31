//! Rebase settlement.
//!
//! The vault's principal grows as yield accrues. The protocol keeps a
//! watermark of the assets it has already accounted for; any growth above it
//! is a rebase gain, and the configured rebase fee of that gain is skimmed to
//! the treasury. Deposits and redemptions move the watermark by the same
//! amount, so they never register as gain or loss.
//!
//! The watermark only rises through gains: if the vault loses value, nothing
//! is charged until it has recovered past the previous high.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::collab::{ExternalError, TokenLedger, YieldVault};
use crate::domain::{AccountId, Amount, AmountError, Asset, Bps};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    #[error(transparent)]
    External(#[from] ExternalError),

    #[error("arithmetic overflow in settlement")]
    Overflow,
}

impl From<AmountError> for SettlementError {
    fn from(_: AmountError) -> Self {
        SettlementError::Overflow
    }
}

/// Result of one settlement pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SettlementOutcome {
    /// Growth above the watermark found by this pass.
    pub gain: Amount,
    /// Amount sent to the treasury.
    pub fee: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseSettlement {
    watermark: Amount,
    total_collected: Amount,
    settlements: u64,
}

impl RebaseSettlement {
    pub fn new(watermark: Amount) -> Self {
        Self {
            watermark,
            total_collected: Amount::ZERO,
            settlements: 0,
        }
    }

    pub fn watermark(&self) -> Amount {
        self.watermark
    }

    pub fn total_collected(&self) -> Amount {
        self.total_collected
    }

    /// Number of passes that collected a non-zero fee.
    pub fn settlements(&self) -> u64 {
        self.settlements
    }

    /// Growth of `total_assets` above the watermark.
    pub fn pending_gain(&self, total_assets: Amount) -> Amount {
        total_assets.saturating_sub(self.watermark)
    }

    pub fn record_inflow(&mut self, amount: Amount) -> Result<(), AmountError> {
        self.watermark = self.watermark.checked_add(amount)?;
        Ok(())
    }

    pub fn record_outflow(&mut self, amount: Amount) {
        self.watermark = self.watermark.saturating_sub(amount);
    }

    /// Skim `rate` of the pending gain to `treasury`.
    ///
    /// Not atomic on its own: a transfer failure after the skim leaves the
    /// vault short. Callers wrap this in a collaborator checkpoint.
    pub fn settle<T: TokenLedger, V: YieldVault>(
        &mut self,
        rate: Bps,
        tokens: &mut T,
        vault: &mut V,
        treasury: &AccountId,
    ) -> Result<SettlementOutcome, SettlementError> {
        let total_assets = vault.total_assets();
        let gain = self.pending_gain(total_assets);
        if gain.is_zero() {
            return Ok(SettlementOutcome::default());
        }

        let fee = rate.apply(gain)?;
        if !fee.is_zero() {
            vault.skim(fee)?;
            let vault_account = vault.account().clone();
            tokens.transfer(Asset::Principal, &vault_account, treasury, fee)?;
            self.total_collected = self.total_collected.checked_add(fee)?;
            self.settlements += 1;
        }
        self.watermark = total_assets.saturating_sub(fee);

        info!(%gain, %fee, watermark = %self.watermark, "rebase settled");
        Ok(SettlementOutcome { gain, fee })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposits_and_withdrawals_are_not_gain() {
        let mut s = RebaseSettlement::new(Amount::from_units(100));
        s.record_inflow(Amount::from_units(50)).unwrap();
        assert_eq!(s.pending_gain(Amount::from_units(150)), Amount::ZERO);
        s.record_outflow(Amount::from_units(20));
        assert_eq!(s.pending_gain(Amount::from_units(130)), Amount::ZERO);
        assert_eq!(s.pending_gain(Amount::from_units(133)), Amount::from_units(3));
    }

    #[test]
    fn loss_does_not_lower_the_watermark() {
        let s = RebaseSettlement::new(Amount::from_units(100));
        assert_eq!(s.pending_gain(Amount::from_units(90)), Amount::ZERO);
        assert_eq!(s.watermark(), Amount::from_units(100));
    }
}
