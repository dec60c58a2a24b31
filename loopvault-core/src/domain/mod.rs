//! Domain types for LoopVault

pub mod amount;
pub mod ids;
pub mod position;

pub use amount::{Amount, AmountError, Bps, BPS_DENOMINATOR, DECIMALS, SCALE};
pub use ids::{AccountId, IdGen, PositionId, RequestId};
pub use position::PositionRecord;

/// Assets the protocol moves between accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    /// Yield-bearing stable asset positions are denominated in.
    Principal,
    /// Borrowed asset drawn from the shared reserve.
    Debt,
    /// Upfront token sized by the policy module.
    Collateral,
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Asset::Principal => "principal",
            Asset::Debt => "debt",
            Asset::Collateral => "collateral",
        };
        f.write_str(name)
    }
}
