//! External collaborators: token balances, the swap pool, the yield vault.
//!
//! The orchestrator never touches balances directly. Everything it moves
//! goes through these traits, so the engine can run against the in-memory
//! simulators in [`crate::sim`] or any other implementation.
//!
//! Every collaborator is [`Journaled`]: the engine takes a checkpoint before
//! a multi-step request and reverts to it if any step fails. That is what
//! makes `open`, `close`, and rebase settlement all-or-nothing across the
//! ledger and its counterparties.

pub mod clock;

pub use clock::{Clock, ClockError, ManualClock, SystemClock};

use thiserror::Error;

use crate::domain::{AccountId, Amount, Asset, Bps};

/// Opaque marker returned by [`Journaled::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Checkpoint(pub u64);

/// Failure reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalError {
    #[error("'{account}' holds {available} {asset}, needs {needed}")]
    InsufficientFunds {
        asset: Asset,
        account: AccountId,
        needed: Amount,
        available: Amount,
    },

    #[error("swap returned {out}, below the minimum of {min_out}")]
    SlippageExceeded { min_out: Amount, out: Amount },

    #[error("pool cannot pay out {requested} {asset}")]
    InsufficientLiquidity { asset: Asset, requested: Amount },

    #[error("pool does not trade {asset_in} for {asset_out}")]
    UnsupportedPair { asset_in: Asset, asset_out: Asset },

    #[error("vault rejected the call: {0}")]
    VaultRejected(String),

    #[error("unknown checkpoint {0:?}")]
    UnknownCheckpoint(Checkpoint),

    #[error("arithmetic overflow in collaborator")]
    Overflow,

    #[error("{0}")]
    Unavailable(String),
}

impl From<crate::domain::AmountError> for ExternalError {
    fn from(_: crate::domain::AmountError) -> Self {
        ExternalError::Overflow
    }
}

/// State that can be checkpointed and rolled back.
///
/// Checkpoints nest as a stack: reverting to or releasing a checkpoint also
/// discards every checkpoint taken after it.
pub trait Journaled {
    fn checkpoint(&mut self) -> Checkpoint;

    /// Restore the state captured by `checkpoint`.
    fn revert_to(&mut self, checkpoint: Checkpoint) -> Result<(), ExternalError>;

    /// Keep the current state and forget `checkpoint`.
    fn release(&mut self, checkpoint: Checkpoint);
}

/// Balances of every asset, keyed by account.
pub trait TokenLedger: Journaled {
    fn transfer(
        &mut self,
        asset: Asset,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), ExternalError>;

    fn balance_of(&self, asset: Asset, account: &AccountId) -> Amount;
}

/// Swap venue between the debt and principal assets.
///
/// The pool swaps against the tokens already sitting in its own account;
/// callers move `amount_in` to [`AmmPool::account`] first and collect the
/// output from it afterwards.
pub trait AmmPool: Journaled {
    /// The pool's token account.
    fn account(&self) -> &AccountId;

    /// Swap `amount_in` of `asset_in`. Fails if the output is worse than the
    /// spot price by more than `max_slippage`.
    fn swap(
        &mut self,
        amount_in: Amount,
        asset_in: Asset,
        asset_out: Asset,
        max_slippage: Bps,
    ) -> Result<Amount, ExternalError>;

    /// Input of `asset_in` needed to receive at least `amount_out`.
    fn quote_exact_out(
        &self,
        amount_out: Amount,
        asset_in: Asset,
        asset_out: Asset,
    ) -> Result<Amount, ExternalError>;
}

/// Share-accounted yield vault over the principal asset.
///
/// `deposit` and `redeem` adjust the vault's books only. Principal tokens
/// enter and leave through [`YieldVault::account`] via the token ledger.
pub trait YieldVault: Journaled {
    fn account(&self) -> &AccountId;

    /// Book `amount` of deposited principal. Returns shares minted.
    fn deposit(&mut self, amount: Amount) -> Result<Amount, ExternalError>;

    /// Burn `shares`. Returns the principal they were worth.
    fn redeem(&mut self, shares: Amount) -> Result<Amount, ExternalError>;

    fn total_assets(&self) -> Amount;

    fn total_shares(&self) -> Amount;

    /// Principal `shares` would redeem for right now.
    fn preview_value(&self, shares: Amount) -> Result<Amount, ExternalError>;

    /// Remove `amount` of assets without burning shares. Used to take the
    /// protocol's cut of accrued yield; the matching tokens are transferred
    /// out of the vault account by the caller.
    fn skim(&mut self, amount: Amount) -> Result<(), ExternalError>;
}

/// The three counterparties one engine talks to.
#[derive(Debug, Clone)]
pub struct Collaborators<T, P, V> {
    pub tokens: T,
    pub pool: P,
    pub vault: V,
}

/// Checkpoints of all three collaborators taken together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollabCheckpoint {
    tokens: Checkpoint,
    pool: Checkpoint,
    vault: Checkpoint,
}

impl<T: TokenLedger, P: AmmPool, V: YieldVault> Collaborators<T, P, V> {
    pub fn new(tokens: T, pool: P, vault: V) -> Self {
        Self {
            tokens,
            pool,
            vault,
        }
    }

    pub fn checkpoint(&mut self) -> CollabCheckpoint {
        CollabCheckpoint {
            tokens: self.tokens.checkpoint(),
            pool: self.pool.checkpoint(),
            vault: self.vault.checkpoint(),
        }
    }

    /// Revert all three. Every revert is attempted even if an earlier one
    /// fails; the first failure is returned.
    pub fn revert_to(&mut self, checkpoint: CollabCheckpoint) -> Result<(), ExternalError> {
        let tokens = self.tokens.revert_to(checkpoint.tokens);
        let pool = self.pool.revert_to(checkpoint.pool);
        let vault = self.vault.revert_to(checkpoint.vault);
        tokens.and(pool).and(vault)
    }

    pub fn release(&mut self, checkpoint: CollabCheckpoint) {
        self.tokens.release(checkpoint.tokens);
        self.pool.release(checkpoint.pool);
        self.vault.release(checkpoint.vault);
    }
}
