//! Policy module: the risk curve.
//!
//! Converts a principal amount and a cycle count into the leverage a position
//! may draw, and a leverage amount into its collateral cost. Each cycle
//! borrows a fixed fraction (`cycle_rate`) of the previous cycle's amount,
//! starting from the principal:
//!
//! ```text
//! b_1 = principal × rate
//! b_k = b_{k-1} × rate
//! allowed_leverage(principal, n) = b_1 + … + b_n
//! ```
//!
//! With the default 90% rate, 100 principal over 2 cycles allows 90 + 81 = 171.
//! Every step rounds down.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{AccountId, Amount, AmountError, Bps};

/// Errors from policy queries and parameter changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("{requested} cycles exceeds the maximum of {max}")]
    CycleLimitExceeded { requested: u32, max: u32 },

    #[error("arithmetic overflow in policy computation")]
    Overflow,

    #[error("account '{0}' may not change policy parameters")]
    Unauthorized(AccountId),

    #[error("{name} must be below 100% (got {rate})")]
    InvalidRate { name: &'static str, rate: Bps },

    #[error("invalid policy configuration: {0}")]
    InvalidConfig(String),
}

impl From<AmountError> for PolicyError {
    fn from(_: AmountError) -> Self {
        PolicyError::Overflow
    }
}

/// Configured risk parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyParams {
    /// Fraction of the previous cycle's amount borrowed in the next cycle.
    pub cycle_rate: Bps,
    pub max_cycles: u32,
    /// Collateral tokens required per unit of leverage (fixed-point ratio).
    pub collateral_per_leverage: Amount,
    pub origination_fee: Bps,
    pub rebase_fee: Bps,
}

impl Default for PolicyParams {
    fn default() -> Self {
        Self {
            cycle_rate: Bps(9_000),
            max_cycles: 10,
            collateral_per_leverage: Amount::ONE,
            origination_fee: Bps(500),
            rebase_fee: Bps(1_000),
        }
    }
}

impl PolicyParams {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_cycles == 0 {
            return Err(PolicyError::InvalidConfig(
                "max_cycles must be at least 1".into(),
            ));
        }
        check_fraction("cycle_rate", self.cycle_rate)?;
        check_fraction("origination_fee", self.origination_fee)?;
        check_fraction("rebase_fee", self.rebase_fee)?;
        Ok(())
    }
}

fn check_fraction(name: &'static str, rate: Bps) -> Result<(), PolicyError> {
    if rate.is_fraction() {
        Ok(())
    } else {
        Err(PolicyError::InvalidRate { name, rate })
    }
}

/// Everything a caller needs to decide whether to open a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeverageQuote {
    pub principal: Amount,
    pub cycles: u32,
    /// Debt drawn in each cycle.
    pub schedule: Vec<Amount>,
    pub leverage: Amount,
    pub collateral_cost: Amount,
    pub origination_fee: Amount,
}

/// The policy module: parameters plus the governance account allowed to
/// change them.
#[derive(Debug, Clone)]
pub struct LeveragePolicy {
    params: PolicyParams,
    governance: AccountId,
}

impl LeveragePolicy {
    pub fn new(params: PolicyParams, governance: AccountId) -> Result<Self, PolicyError> {
        params.validate()?;
        Ok(Self { params, governance })
    }

    pub fn params(&self) -> &PolicyParams {
        &self.params
    }

    pub fn governance(&self) -> &AccountId {
        &self.governance
    }

    pub fn max_cycles(&self) -> u32 {
        self.params.max_cycles
    }

    fn check_cycles(&self, cycles: u32) -> Result<(), PolicyError> {
        if cycles > self.params.max_cycles {
            return Err(PolicyError::CycleLimitExceeded {
                requested: cycles,
                max: self.params.max_cycles,
            });
        }
        Ok(())
    }

    /// Debt drawn in each of `cycles` cycles.
    pub fn cycle_schedule(&self, principal: Amount, cycles: u32) -> Result<Vec<Amount>, PolicyError> {
        self.check_cycles(cycles)?;
        let mut schedule = Vec::with_capacity(cycles as usize);
        let mut base = principal;
        for _ in 0..cycles {
            base = self.params.cycle_rate.apply(base)?;
            schedule.push(base);
        }
        Ok(schedule)
    }

    /// Maximum debt obtainable for `principal` over `cycles` cycles.
    pub fn allowed_leverage(&self, principal: Amount, cycles: u32) -> Result<Amount, PolicyError> {
        let schedule = self.cycle_schedule(principal, cycles)?;
        Ok(Amount::checked_sum(schedule)?)
    }

    /// Collateral tokens required to take `leverage`. Rounds down.
    pub fn collateral_cost(&self, leverage: Amount) -> Result<Amount, PolicyError> {
        Ok(leverage.mul_ratio(self.params.collateral_per_leverage)?)
    }

    pub fn origination_fee_rate(&self) -> Bps {
        self.params.origination_fee
    }

    pub fn rebase_fee_rate(&self) -> Bps {
        self.params.rebase_fee
    }

    /// Origination fee owed on `borrowed` total debt. Rounds down.
    pub fn origination_fee(&self, borrowed: Amount) -> Result<Amount, PolicyError> {
        Ok(self.params.origination_fee.apply(borrowed)?)
    }

    pub fn quote(&self, principal: Amount, cycles: u32) -> Result<LeverageQuote, PolicyError> {
        let schedule = self.cycle_schedule(principal, cycles)?;
        let leverage = Amount::checked_sum(schedule.iter().copied())?;
        Ok(LeverageQuote {
            principal,
            cycles,
            collateral_cost: self.collateral_cost(leverage)?,
            origination_fee: self.origination_fee(leverage)?,
            schedule,
            leverage,
        })
    }

    fn authorize(&self, caller: &AccountId) -> Result<(), PolicyError> {
        if caller != &self.governance {
            return Err(PolicyError::Unauthorized(caller.clone()));
        }
        Ok(())
    }

    /// Governance-gated change of the collateral ratio.
    pub fn set_collateral_per_leverage(
        &mut self,
        caller: &AccountId,
        ratio: Amount,
    ) -> Result<(), PolicyError> {
        self.authorize(caller)?;
        self.params.collateral_per_leverage = ratio;
        Ok(())
    }

    /// Governance-gated change of both fee rates.
    pub fn set_fee_rates(
        &mut self,
        caller: &AccountId,
        origination: Bps,
        rebase: Bps,
    ) -> Result<(), PolicyError> {
        self.authorize(caller)?;
        check_fraction("origination_fee", origination)?;
        check_fraction("rebase_fee", rebase)?;
        self.params.origination_fee = origination;
        self.params.rebase_fee = rebase;
        Ok(())
    }
}
