//! Deterministic random scenarios for stress runs.
//!
//! The generator tracks who it expects to own each label so most requests
//! come from the right caller, but it never consults the engine: some steps
//! are meant to fail (wrong caller, too many cycles, too little collateral,
//! unexpired liquidation) and the run must stay conserved regardless.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use loopvault_core::domain::Amount;

use crate::scenario::{Action, Actor, Scenario, ScenarioStep};

const ACTORS: [&str; 3] = ["alice", "bob", "carol"];
const STARTING_PRINCIPAL: u64 = 10_000;
const STARTING_COLLATERAL: u64 = 100_000;

/// Generate a `steps`-long scenario from `seed`. Same inputs, same scenario.
///
/// `liquidator` is the account named in the protocol config; it appears as
/// a caller for close attempts on positions it does not own.
pub fn synthetic_scenario(seed: u64, steps: usize, max_cycles: u32, liquidator: &str) -> Scenario {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut scenario = Scenario::new(format!("synthetic-{seed}"));
    for name in ACTORS {
        scenario = scenario.with_actor(
            Actor::new(name)
                .with_principal(Amount::from_units(STARTING_PRINCIPAL))
                .with_collateral(Amount::from_units(STARTING_COLLATERAL)),
        );
    }

    let mut owners: BTreeMap<String, String> = BTreeMap::new();
    let mut opened = 0usize;

    for _ in 0..steps {
        let roll: u32 = if opened == 0 { 0 } else { rng.gen_range(0..100) };
        let label = pick_label(&mut rng, &owners);
        let action = match (roll, label) {
            (35..=49, Some(label)) => Action::Close {
                actor: caller(&mut rng, &owners, &label, liquidator),
                position: label,
            },
            (50..=59, Some(label)) => Action::Withdraw {
                actor: caller(&mut rng, &owners, &label, liquidator),
                position: label,
                shares: units_and_cents(&mut rng, 1, 300),
            },
            (60..=69, Some(label)) => Action::Deposit {
                actor: caller(&mut rng, &owners, &label, liquidator),
                position: label,
                amount: units_and_cents(&mut rng, 1, 200),
            },
            (70..=74, Some(label)) => {
                let to = ACTORS[rng.gen_range(0..ACTORS.len())].to_string();
                let actor = caller(&mut rng, &owners, &label, liquidator);
                if owners.get(&label) == Some(&actor) {
                    owners.insert(label.clone(), to.clone());
                }
                Action::Transfer {
                    actor,
                    position: label,
                    to,
                }
            }
            (75..=84, _) => Action::Rebase {
                gain: units_and_cents(&mut rng, 1, 50),
            },
            (85..=87, _) => Action::Loss {
                amount: units_and_cents(&mut rng, 1, 20),
            },
            (88..=94, _) => Action::Settle,
            (95..=99, _) => Action::AdvanceDays {
                days: rng.gen_range(1..=400),
            },
            _ => {
                let actor = ACTORS[rng.gen_range(0..ACTORS.len())].to_string();
                let principal = units_and_cents(&mut rng, 1, 1_000);
                let cycles = rng.gen_range(0..=max_cycles.saturating_add(1));
                let multiple = rng.gen_range(0..=10u64);
                let collateral = principal
                    .mul_div_floor(u128::from(multiple), 1)
                    .unwrap_or(principal);
                let label = format!("p{opened}");
                opened += 1;
                owners.insert(label.clone(), actor.clone());
                Action::Open {
                    actor,
                    principal,
                    cycles,
                    collateral,
                    label: Some(label),
                }
            }
        };
        scenario = scenario.with_step(ScenarioStep::new(action));
    }
    scenario
}

fn pick_label(rng: &mut StdRng, owners: &BTreeMap<String, String>) -> Option<String> {
    if owners.is_empty() {
        return None;
    }
    owners.keys().nth(rng.gen_range(0..owners.len())).cloned()
}

/// Usually the expected owner; sometimes another actor or the liquidator.
fn caller(
    rng: &mut StdRng,
    owners: &BTreeMap<String, String>,
    label: &str,
    liquidator: &str,
) -> String {
    match rng.gen_range(0..10) {
        0 => liquidator.to_string(),
        1 => ACTORS[rng.gen_range(0..ACTORS.len())].to_string(),
        _ => owners
            .get(label)
            .cloned()
            .unwrap_or_else(|| ACTORS[0].to_string()),
    }
}

fn units_and_cents(rng: &mut StdRng, min: u64, max: u64) -> Amount {
    let whole = Amount::from_units(rng.gen_range(min..=max));
    let cents = Amount::from_raw(u128::from(rng.gen_range(0..100u64)) * 10_000_000_000_000_000);
    whole.checked_add(cents).unwrap_or(whole)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_scenario() {
        assert_eq!(
            synthetic_scenario(7, 50, 10, "liquidator"),
            synthetic_scenario(7, 50, 10, "liquidator")
        );
    }

    #[test]
    fn different_seeds_differ() {
        assert_ne!(
            synthetic_scenario(1, 50, 10, "liquidator").steps,
            synthetic_scenario(2, 50, 10, "liquidator").steps
        );
    }

    #[test]
    fn first_step_is_an_open() {
        let scenario = synthetic_scenario(42, 5, 10, "liquidator");
        assert_eq!(scenario.steps.len(), 5);
        assert!(matches!(scenario.steps[0].action, Action::Open { .. }));
        assert_eq!(scenario.actors.len(), ACTORS.len());
    }

    #[test]
    fn references_only_generated_labels() {
        let scenario = synthetic_scenario(3, 200, 10, "liquidator");
        let mut labels = std::collections::HashSet::new();
        for step in &scenario.steps {
            if let Action::Open { label: Some(label), .. } = &step.action {
                labels.insert(label.clone());
            } else if let Some(position) = step.action.position() {
                assert!(labels.contains(position), "{position} used before open");
            }
        }
    }
}
