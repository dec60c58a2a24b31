use super::{FailAfter, SnapshotStack};
use crate::collab::{AmmPool, Checkpoint, ExternalError, Journaled};
use crate::domain::{AccountId, Amount, Asset, Bps, BPS_DENOMINATOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reserves {
    debt: Amount,
    principal: Amount,
}

impl Reserves {
    fn side(&self, asset: Asset) -> Amount {
        match asset {
            Asset::Debt => self.debt,
            _ => self.principal,
        }
    }

    fn side_mut(&mut self, asset: Asset) -> &mut Amount {
        match asset {
            Asset::Debt => &mut self.debt,
            _ => &mut self.principal,
        }
    }
}

/// Constant-product pool between the debt and principal assets.
///
/// Reserves are the pool's own books and must be seeded to match the tokens
/// minted to [`SimPool::account`]. The swap fee stays in the pool.
#[derive(Debug, Clone)]
pub struct SimPool {
    account: AccountId,
    reserves: Reserves,
    fee: Bps,
    fail_swap: FailAfter,
    journal: SnapshotStack<Reserves>,
}

impl SimPool {
    pub fn new(account: AccountId, debt_reserve: Amount, principal_reserve: Amount, fee: Bps) -> Self {
        Self {
            account,
            reserves: Reserves {
                debt: debt_reserve,
                principal: principal_reserve,
            },
            fee,
            fail_swap: FailAfter::default(),
            journal: SnapshotStack::default(),
        }
    }

    pub fn reserve(&self, asset: Asset) -> Amount {
        self.reserves.side(asset)
    }

    pub fn fee(&self) -> Bps {
        self.fee
    }

    /// Let `calls` swaps succeed, then fail the next one.
    pub fn fail_swap_after(&mut self, calls: u32) {
        self.fail_swap = FailAfter::arm(calls);
    }

    fn check_pair(asset_in: Asset, asset_out: Asset) -> Result<(), ExternalError> {
        match (asset_in, asset_out) {
            (Asset::Debt, Asset::Principal) | (Asset::Principal, Asset::Debt) => Ok(()),
            _ => Err(ExternalError::UnsupportedPair {
                asset_in,
                asset_out,
            }),
        }
    }

    fn fee_keep(&self) -> u128 {
        BPS_DENOMINATOR - u128::from(self.fee.0.min(Bps::FULL.0))
    }

    /// Output for `amount_in` at the current reserves, after the fee.
    fn amount_out(&self, asset_in: Asset, asset_out: Asset, amount_in: Amount) -> Result<Amount, ExternalError> {
        let reserve_in = self.reserves.side(asset_in);
        let reserve_out = self.reserves.side(asset_out);
        let effective_in = amount_in.mul_div_floor(self.fee_keep(), BPS_DENOMINATOR)?;
        let denominator = reserve_in.checked_add(effective_in)?;
        if denominator.is_zero() {
            return Err(ExternalError::InsufficientLiquidity {
                asset: asset_out,
                requested: Amount::ZERO,
            });
        }
        Ok(reserve_out.mul_div_floor(effective_in.raw(), denominator.raw())?)
    }
}

impl Journaled for SimPool {
    fn checkpoint(&mut self) -> Checkpoint {
        self.journal.push(&self.reserves)
    }

    fn revert_to(&mut self, checkpoint: Checkpoint) -> Result<(), ExternalError> {
        self.reserves = self.journal.revert(checkpoint)?;
        Ok(())
    }

    fn release(&mut self, checkpoint: Checkpoint) {
        self.journal.release(checkpoint);
    }
}

impl AmmPool for SimPool {
    fn account(&self) -> &AccountId {
        &self.account
    }

    fn swap(
        &mut self,
        amount_in: Amount,
        asset_in: Asset,
        asset_out: Asset,
        max_slippage: Bps,
    ) -> Result<Amount, ExternalError> {
        Self::check_pair(asset_in, asset_out)?;
        if self.fail_swap.tick() {
            return Err(ExternalError::Unavailable("pool swap failed".into()));
        }

        let reserve_in = self.reserves.side(asset_in);
        let reserve_out = self.reserves.side(asset_out);
        if reserve_in.is_zero() || reserve_out.is_zero() {
            return Err(ExternalError::InsufficientLiquidity {
                asset: asset_out,
                requested: amount_in,
            });
        }

        let out = self.amount_out(asset_in, asset_out, amount_in)?;
        let spot = amount_in.mul_div_floor(reserve_out.raw(), reserve_in.raw())?;
        let min_out = max_slippage.complement().apply(spot)?;
        if out < min_out {
            return Err(ExternalError::SlippageExceeded { min_out, out });
        }

        let remaining = reserve_out
            .checked_sub(out)
            .ok_or(ExternalError::InsufficientLiquidity {
                asset: asset_out,
                requested: out,
            })?;
        *self.reserves.side_mut(asset_in) = reserve_in.checked_add(amount_in)?;
        *self.reserves.side_mut(asset_out) = remaining;
        Ok(out)
    }

    fn quote_exact_out(
        &self,
        amount_out: Amount,
        asset_in: Asset,
        asset_out: Asset,
    ) -> Result<Amount, ExternalError> {
        Self::check_pair(asset_in, asset_out)?;
        if amount_out.is_zero() {
            return Ok(Amount::ZERO);
        }
        let reserve_in = self.reserves.side(asset_in);
        let reserve_out = self.reserves.side(asset_out);
        let depth = reserve_out
            .checked_sub(amount_out)
            .filter(|d| !d.is_zero())
            .ok_or(ExternalError::InsufficientLiquidity {
                asset: asset_out,
                requested: amount_out,
            })?;

        // x·y = k solved for the input, then grossed up by the fee. Both
        // steps round up so the quoted input always buys `amount_out`.
        let effective_in = reserve_in.mul_div_ceil(amount_out.raw(), depth.raw())?;
        Ok(effective_in.mul_div_ceil(BPS_DENOMINATOR, self.fee_keep())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(fee_bps: u16) -> SimPool {
        SimPool::new(
            AccountId::new("pool"),
            Amount::from_units(1_000_000),
            Amount::from_units(1_000_000),
            Bps(fee_bps),
        )
    }

    #[test]
    fn swap_moves_reserves() {
        let mut p = pool(0);
        let out = p
            .swap(Amount::from_units(90), Asset::Debt, Asset::Principal, Bps(100))
            .unwrap();
        assert!(out < Amount::from_units(90));
        assert!(out > "89.99".parse::<Amount>().unwrap());
        assert_eq!(p.reserve(Asset::Debt), Amount::from_units(1_000_090));
        assert_eq!(
            p.reserve(Asset::Principal),
            Amount::from_units(1_000_000).checked_sub(out).unwrap()
        );
    }

    #[test]
    fn slippage_limit_is_enforced() {
        let mut p = SimPool::new(
            AccountId::new("pool"),
            Amount::from_units(100),
            Amount::from_units(100),
            Bps(0),
        );
        let err = p
            .swap(Amount::from_units(50), Asset::Debt, Asset::Principal, Bps(100))
            .unwrap_err();
        assert!(matches!(err, ExternalError::SlippageExceeded { .. }));
        assert_eq!(p.reserve(Asset::Debt), Amount::from_units(100));
    }

    #[test]
    fn exact_out_quote_buys_at_least_the_target() {
        let mut p = pool(4);
        let target = Amount::from_units(171);
        let input = p.quote_exact_out(target, Asset::Principal, Asset::Debt).unwrap();
        let out = p
            .swap(input, Asset::Principal, Asset::Debt, Bps(100))
            .unwrap();
        assert!(out >= target);
    }

    #[test]
    fn unsupported_pair_and_injected_failure() {
        let mut p = pool(0);
        assert!(matches!(
            p.swap(Amount::ONE, Asset::Collateral, Asset::Debt, Bps(100)),
            Err(ExternalError::UnsupportedPair { .. })
        ));
        p.fail_swap_after(1);
        p.swap(Amount::ONE, Asset::Debt, Asset::Principal, Bps(100)).unwrap();
        assert!(p.swap(Amount::ONE, Asset::Debt, Asset::Principal, Bps(100)).is_err());
        p.swap(Amount::ONE, Asset::Debt, Asset::Principal, Bps(100)).unwrap();
    }
}
