use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::amount::Amount;

/// Accounting state of one leveraged position.
///
/// A plain value type: records never share sub-objects, so mutating one
/// position cannot touch another. Interest is not stored; it is derived from
/// vault state on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRecord {
    /// Principal originally contributed at creation.
    pub principal: Amount,
    /// Principal plus later deposits minus withdrawals.
    pub total_principal_value: Amount,
    /// Outstanding debt-asset amount.
    pub borrowed: Amount,
    /// Vault claim units held by this position.
    pub yield_shares: Amount,
    pub opened_at: DateTime<Utc>,
    pub time_to_live_days: u32,
}

impl PositionRecord {
    pub fn new(principal: Amount, opened_at: DateTime<Utc>, time_to_live_days: u32) -> Self {
        Self {
            principal,
            total_principal_value: principal,
            borrowed: Amount::ZERO,
            yield_shares: Amount::ZERO,
            opened_at,
            time_to_live_days,
        }
    }

    pub fn time_to_live(&self) -> Duration {
        Duration::days(i64::from(self.time_to_live_days))
    }

    /// Saturates at the latest representable instant.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.opened_at
            .checked_add_signed(self.time_to_live())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    pub fn has_debt(&self) -> bool {
        !self.borrowed.is_zero()
    }
}
