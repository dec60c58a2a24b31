//! In-memory collaborators for simulation and tests.
//!
//! - [`SimTokens`]: balance map with minting
//! - [`SimPool`]: constant-product pool between the debt and principal assets
//! - [`SimVault`]: share-accounted vault whose assets grow by `accrue`
//!
//! Each keeps a stack of state snapshots to implement [`Journaled`], and the
//! pool and vault can be told to fail after a number of calls so tests can
//! exercise the engine's rollback paths.
//!
//! [`Journaled`]: crate::collab::Journaled

mod pool;
mod snapshot;
mod tokens;
mod vault;

pub use pool::SimPool;
pub use snapshot::SnapshotStack;
pub use tokens::SimTokens;
pub use vault::SimVault;

/// Countdown used for failure injection: `None` never fires, `Some(0)` fires
/// on the next call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FailAfter(Option<u32>);

impl FailAfter {
    pub(crate) fn arm(calls: u32) -> Self {
        Self(Some(calls))
    }

    /// Count one call. Returns true if this call should fail.
    pub(crate) fn tick(&mut self) -> bool {
        match self.0 {
            Some(0) => {
                self.0 = None;
                true
            }
            Some(n) => {
                self.0 = Some(n - 1);
                false
            }
            None => false,
        }
    }
}
