//! The economics constitution: an immutable table of named bounds.
//!
//! Loaded once at process start and never mutated by this core; governance
//! over the table itself is an external concern. Every bound is an inclusive
//! `[min, max]` interval of exact decimals — the guard boundary policy
//! (values at the bound pass, strict violations fail) lives in
//! [`crate::guard`], the table only states the limits.

use crate::decimal::FixedDecimal;
use crate::{CertrailError, Result};
use serde::{Deserialize, Serialize};

/// Inclusive `[min, max]` interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bound {
    pub min: FixedDecimal,
    pub max: FixedDecimal,
}

impl Bound {
    pub fn new(min: FixedDecimal, max: FixedDecimal) -> Result<Self> {
        let bound = Bound { min, max };
        bound.validate()?;
        Ok(bound)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min.compare(&self.max) == std::cmp::Ordering::Greater {
            return Err(CertrailError::Config(format!(
                "bound min {} exceeds max {}",
                self.min, self.max
            )));
        }
        Ok(())
    }

    /// Inclusive containment: values exactly at min or max are inside.
    pub fn contains(&self, value: &FixedDecimal) -> bool {
        use std::cmp::Ordering::Less;
        value.compare(&self.min) != Less && self.max.compare(value) != Less
    }
}

/// Named bounds checked by the economics guard. One field per guard category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomicsConstitution {
    /// Reward granted for a single action.
    pub action_reward: Bound,
    /// Total emission allowed within one logical day.
    pub daily_emission: Bound,
    /// Fractional share of a base amount granted as reward.
    pub reward_fraction: Bound,
    /// Resonance draw as a fraction of total supply.
    pub resonance_draw: Bound,
    /// Per-node allocation as a fraction of the node pool.
    pub node_allocation_fraction: Bound,
    /// Single entity's share of a pooled amount.
    pub entity_pool_share: Bound,
    /// Issuance allowed within one epoch.
    pub epoch_issuance: Bound,
    /// Governance quorum threshold.
    pub quorum: Bound,
}

fn dec(s: &str) -> FixedDecimal {
    FixedDecimal::from_decimal_string(s).expect("baseline constant")
}

impl EconomicsConstitution {
    /// Baseline table. Deployments load their own via [`Self::from_json_str`];
    /// these values bound a conservative default economy.
    pub fn baseline() -> Self {
        EconomicsConstitution {
            action_reward: Bound {
                min: dec("0.1"),
                max: dec("100"),
            },
            daily_emission: Bound {
                min: dec("0"),
                max: dec("10000"),
            },
            reward_fraction: Bound {
                min: dec("0"),
                max: dec("1"),
            },
            resonance_draw: Bound {
                min: dec("0"),
                max: dec("0.05"),
            },
            node_allocation_fraction: Bound {
                min: dec("0"),
                max: dec("0.2"),
            },
            entity_pool_share: Bound {
                min: dec("0"),
                max: dec("0.1"),
            },
            epoch_issuance: Bound {
                min: dec("0"),
                max: dec("50000"),
            },
            quorum: Bound {
                min: dec("0.1"),
                max: dec("0.9"),
            },
        }
    }

    /// Load a table from its JSON form (bounds as decimal strings) and
    /// validate it.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let table: EconomicsConstitution = serde_json::from_str(s)
            .map_err(|e| CertrailError::Config(format!("invalid constitution JSON: {e}")))?;
        table.validate()?;
        Ok(table)
    }

    /// Structural validation: every bound is ordered, and fraction-valued
    /// categories stay within `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("action_reward", &self.action_reward),
            ("daily_emission", &self.daily_emission),
            ("reward_fraction", &self.reward_fraction),
            ("resonance_draw", &self.resonance_draw),
            ("node_allocation_fraction", &self.node_allocation_fraction),
            ("entity_pool_share", &self.entity_pool_share),
            ("epoch_issuance", &self.epoch_issuance),
            ("quorum", &self.quorum),
        ];
        for (name, bound) in named {
            bound
                .validate()
                .map_err(|e| CertrailError::Config(format!("{name}: {e}")))?;
        }

        let unit = Bound {
            min: FixedDecimal::ZERO,
            max: FixedDecimal::ONE,
        };
        for (name, bound) in [
            ("reward_fraction", &self.reward_fraction),
            ("resonance_draw", &self.resonance_draw),
            ("node_allocation_fraction", &self.node_allocation_fraction),
            ("entity_pool_share", &self.entity_pool_share),
            ("quorum", &self.quorum),
        ] {
            if !unit.contains(&bound.min) || !unit.contains(&bound.max) {
                return Err(CertrailError::Config(format!(
                    "{name} bounds must lie within [0, 1]"
                )));
            }
        }
        Ok(())
    }
}
