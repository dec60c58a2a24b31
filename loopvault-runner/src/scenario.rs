//! Scenario files: actors, starting balances, and an ordered list of
//! requests against a simulated world.
//!
//! ```toml
//! name = "open-and-close"
//!
//! [[actors]]
//! name = "alice"
//! principal = "1000"
//! collateral = "1000"
//!
//! [[steps]]
//! action = "open"
//! actor = "alice"
//! principal = "100"
//! cycles = 2
//! collateral = "171"
//! label = "first"
//!
//! [[steps]]
//! action = "close"
//! actor = "bob"
//! position = "first"
//! expect_error = "unauthorized"
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use loopvault_core::domain::Amount;
use loopvault_core::ErrorKind;

use crate::config::ConfigError;

/// 2024-01-01T00:00:00Z, the default simulated start time.
pub const DEFAULT_START_SECS: i64 = 1_704_067_200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    /// RFC 3339 start time. Defaults to [`DEFAULT_START_SECS`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actors: Vec<Actor>,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

/// A participant and the tokens minted to it before the first step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    #[serde(default)]
    pub principal: Amount,
    #[serde(default)]
    pub collateral: Amount,
    #[serde(default)]
    pub debt: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioStep {
    #[serde(flatten)]
    pub action: Action,
    /// The step must fail with this kind; absent means it must succeed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_error: Option<ErrorKind>,
}

impl ScenarioStep {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            expect_error: None,
        }
    }

    pub fn expecting(action: Action, kind: ErrorKind) -> Self {
        Self {
            action,
            expect_error: Some(kind),
        }
    }
}

/// Positions are referred to by the label given at open time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Open {
        actor: String,
        principal: Amount,
        cycles: u32,
        collateral: Amount,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    /// Full close.
    Close { actor: String, position: String },
    /// Partial close of `shares`.
    Withdraw {
        actor: String,
        position: String,
        shares: Amount,
    },
    Deposit {
        actor: String,
        position: String,
        amount: Amount,
    },
    Transfer {
        actor: String,
        position: String,
        to: String,
    },
    /// Vault yield.
    Rebase { gain: Amount },
    /// Vault loss.
    Loss { amount: Amount },
    Settle,
    AdvanceDays { days: i64 },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Open { .. } => "open",
            Action::Close { .. } => "close",
            Action::Withdraw { .. } => "withdraw",
            Action::Deposit { .. } => "deposit",
            Action::Transfer { .. } => "transfer",
            Action::Rebase { .. } => "rebase",
            Action::Loss { .. } => "loss",
            Action::Settle => "settle",
            Action::AdvanceDays { .. } => "advance_days",
        }
    }

    pub fn actor(&self) -> Option<&str> {
        match self {
            Action::Open { actor, .. }
            | Action::Close { actor, .. }
            | Action::Withdraw { actor, .. }
            | Action::Deposit { actor, .. }
            | Action::Transfer { actor, .. } => Some(actor),
            _ => None,
        }
    }

    pub fn position(&self) -> Option<&str> {
        match self {
            Action::Open { label, .. } => label.as_deref(),
            Action::Close { position, .. }
            | Action::Withdraw { position, .. }
            | Action::Deposit { position, .. }
            | Action::Transfer { position, .. } => Some(position),
            _ => None,
        }
    }
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: None,
            actors: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start.unwrap_or_else(|| {
            DateTime::<Utc>::from_timestamp(DEFAULT_START_SECS, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
        })
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actors.push(actor);
        self
    }

    pub fn with_step(mut self, step: ScenarioStep) -> Self {
        self.steps.push(step);
        self
    }
}

impl Actor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            principal: Amount::ZERO,
            collateral: Amount::ZERO,
            debt: Amount::ZERO,
        }
    }

    pub fn with_principal(mut self, amount: Amount) -> Self {
        self.principal = amount;
        self
    }

    pub fn with_collateral(mut self, amount: Amount) -> Self {
        self.collateral = amount;
        self
    }
}
