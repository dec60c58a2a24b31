//! LoopVault Core: leveraged yield positions over a rebasing vault.
//!
//! This crate contains the accounting heart of the protocol:
//! - Domain types (fixed-point amounts, ids, position records)
//! - Position ledger with scoped, all-or-nothing transactions
//! - Policy module (cycle schedule, leverage cap, collateral cost, fees)
//! - Leverage orchestrator (open / close / withdraw state machine)
//! - Rebase settlement (fee on vault growth above a watermark)
//! - Collaborator traits and in-memory simulators

pub mod collab;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod policy;
pub mod settlement;
pub mod sim;

pub use collab::{AmmPool, Clock, ClockError, Collaborators, ManualClock, SystemClock, TokenLedger, YieldVault};
pub use domain::{AccountId, Amount, Asset, Bps, PositionId, PositionRecord};
pub use engine::{EngineConfig, EngineError, LeverageEngine, Redeem};
pub use error::ErrorKind;
pub use ledger::{LedgerError, PositionLedger};
pub use policy::{LeveragePolicy, LeverageQuote, PolicyError, PolicyParams};
pub use settlement::RebaseSettlement;

/// Engine wired to the in-memory simulators.
pub type SimEngine = LeverageEngine<sim::SimTokens, sim::SimPool, sim::SimVault>;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: core types are Send + Sync, so a simulated world
    /// can be moved onto a worker thread.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Amount>();
        require_sync::<Amount>();
        require_send::<PositionRecord>();
        require_sync::<PositionRecord>();
        require_send::<PositionLedger>();
        require_sync::<PositionLedger>();
        require_send::<LeveragePolicy>();
        require_sync::<LeveragePolicy>();
        require_send::<RebaseSettlement>();
        require_sync::<RebaseSettlement>();
        require_send::<EngineError>();
        require_sync::<EngineError>();
        require_send::<engine::RequestAudit>();
        require_sync::<engine::RequestAudit>();
        require_send::<ManualClock>();
        require_sync::<ManualClock>();

        require_send::<SimEngine>();
        require_sync::<SimEngine>();
    }
}
