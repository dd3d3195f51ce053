//! Economics guard: stateless bound checks over proposed economic deltas.
//!
//! One `validate_*` function per economic category. Each computes its
//! relevant sum or ratio through the certified engine — so the check itself
//! lands in the audit trail — compares exactly against the constitution, and
//! returns a [`ValidationResult`]. A failing check is a first-class, loggable
//! fact, never an `Err`; `Err` is reserved for arithmetic corruption
//! (overflow) surfacing from the engine.
//!
//! Boundary policy, uniform across categories: a value exactly at a bound
//! passes; only strict violations fail. Out-of-bound proposals are rejected,
//! never silently capped. Guards are pure: identical inputs produce
//! bit-identical results.

use crate::audit::{AuditSession, OpContext};
use crate::canonical::CanonicalValue;
use crate::constitution::{Bound, EconomicsConstitution};
use crate::decimal::FixedDecimal;
use crate::engine::{certified_add, certified_div};
use crate::Result;
use std::collections::BTreeMap;

/// Category-specific failure codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum GuardCode {
    ActionRewardOutOfBounds,
    DailyEmissionExceeded,
    RewardFractionOutOfBounds,
    ResonanceDrawExceeded,
    NodeAllocationOutOfBounds,
    EntityPoolShareExceeded,
    EpochIssuanceExceeded,
    QuorumOutOfBounds,
}

impl GuardCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardCode::ActionRewardOutOfBounds => "action_reward_out_of_bounds",
            GuardCode::DailyEmissionExceeded => "daily_emission_exceeded",
            GuardCode::RewardFractionOutOfBounds => "reward_fraction_out_of_bounds",
            GuardCode::ResonanceDrawExceeded => "resonance_draw_exceeded",
            GuardCode::NodeAllocationOutOfBounds => "node_allocation_out_of_bounds",
            GuardCode::EntityPoolShareExceeded => "entity_pool_share_exceeded",
            GuardCode::EpochIssuanceExceeded => "epoch_issuance_exceeded",
            GuardCode::QuorumOutOfBounds => "quorum_out_of_bounds",
        }
    }
}

/// Outcome of a guard check. Produced for every call; the caller decides
/// whether a failure escalates to the circuit breaker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationResult {
    pub passed: bool,
    pub error_code: Option<GuardCode>,
    pub error_message: Option<String>,
    pub details: BTreeMap<String, String>,
}

impl ValidationResult {
    fn pass(details: BTreeMap<String, String>) -> Self {
        ValidationResult {
            passed: true,
            error_code: None,
            error_message: None,
            details,
        }
    }

    fn fail(code: GuardCode, message: String, details: BTreeMap<String, String>) -> Self {
        ValidationResult {
            passed: false,
            error_code: Some(code),
            error_message: Some(message),
            details,
        }
    }
}

fn bound_details(value: &FixedDecimal, bound: &Bound) -> BTreeMap<String, String> {
    let mut details = BTreeMap::new();
    details.insert("value".to_string(), value.to_decimal_string());
    details.insert("min".to_string(), bound.min.to_decimal_string());
    details.insert("max".to_string(), bound.max.to_decimal_string());
    details
}

/// Append the guard's verdict to the session so the trail records every
/// check, passing or failing.
fn record_verdict(
    name: &str,
    result: &ValidationResult,
    session: &mut AuditSession,
    ctx: &OpContext,
) -> Result<()> {
    let mut map = BTreeMap::new();
    map.insert(
        "passed".to_string(),
        CanonicalValue::Int(if result.passed { 1 } else { 0 }),
    );
    if let Some(code) = result.error_code {
        map.insert(
            "error_code".to_string(),
            CanonicalValue::Text(code.as_str().to_string()),
        );
    }
    for (k, v) in &result.details {
        map.insert(format!("detail_{k}"), CanonicalValue::Text(v.clone()));
    }
    session.append(name, CanonicalValue::Map(map), ctx)?;
    Ok(())
}

fn check_bound(
    name: &str,
    code: GuardCode,
    value: &FixedDecimal,
    bound: &Bound,
    extra: &[(&str, String)],
    session: &mut AuditSession,
    ctx: &OpContext,
) -> Result<ValidationResult> {
    let mut details = bound_details(value, bound);
    for (k, v) in extra {
        details.insert((*k).to_string(), v.clone());
    }
    let result = if bound.contains(value) {
        ValidationResult::pass(details)
    } else {
        ValidationResult::fail(
            code,
            format!(
                "{name}: {} outside [{}, {}]",
                value, bound.min, bound.max
            ),
            details,
        )
    };
    record_verdict(name, &result, session, ctx)?;
    Ok(result)
}

/// Fail without a ratio when the denominator of a fractional category is
/// zero; dividing would be arithmetic corruption, but a zero base is a
/// caller-data problem and stays a soft verdict.
fn fail_zero_base(
    name: &str,
    code: GuardCode,
    numerator: &FixedDecimal,
    session: &mut AuditSession,
    ctx: &OpContext,
) -> Result<ValidationResult> {
    let mut details = BTreeMap::new();
    details.insert("value".to_string(), numerator.to_decimal_string());
    details.insert("base".to_string(), "0".to_string());
    let result = ValidationResult::fail(
        code,
        format!("{name}: ratio undefined against a zero base"),
        details,
    );
    record_verdict(name, &result, session, ctx)?;
    Ok(result)
}

/// Per-action reward amount within `action_reward`.
pub fn validate_action_reward(
    proposed: &FixedDecimal,
    constitution: &EconomicsConstitution,
    session: &mut AuditSession,
    ctx: &OpContext,
) -> Result<ValidationResult> {
    check_bound(
        "guard_action_reward",
        GuardCode::ActionRewardOutOfBounds,
        proposed,
        &constitution.action_reward,
        &[],
        session,
        ctx,
    )
}

/// Daily emission after this delta within `daily_emission`.
pub fn validate_daily_emission(
    proposed_delta: &FixedDecimal,
    emitted_today: &FixedDecimal,
    constitution: &EconomicsConstitution,
    session: &mut AuditSession,
    ctx: &OpContext,
) -> Result<ValidationResult> {
    let new_total = certified_add(emitted_today, proposed_delta, session, ctx)?;
    check_bound(
        "guard_daily_emission",
        GuardCode::DailyEmissionExceeded,
        &new_total,
        &constitution.daily_emission,
        &[
            ("proposed_delta", proposed_delta.to_decimal_string()),
            ("emitted_today", emitted_today.to_decimal_string()),
        ],
        session,
        ctx,
    )
}

/// `part / base` within `reward_fraction`.
pub fn validate_reward_fraction(
    part: &FixedDecimal,
    base: &FixedDecimal,
    constitution: &EconomicsConstitution,
    session: &mut AuditSession,
    ctx: &OpContext,
) -> Result<ValidationResult> {
    if base.is_zero() {
        return fail_zero_base(
            "guard_reward_fraction",
            GuardCode::RewardFractionOutOfBounds,
            part,
            session,
            ctx,
        );
    }
    let ratio = certified_div(part, base, session, ctx)?;
    check_bound(
        "guard_reward_fraction",
        GuardCode::RewardFractionOutOfBounds,
        &ratio,
        &constitution.reward_fraction,
        &[("part", part.to_decimal_string()), ("base", base.to_decimal_string())],
        session,
        ctx,
    )
}

/// `draw / total_supply` within `resonance_draw`.
pub fn validate_resonance_draw(
    draw: &FixedDecimal,
    total_supply: &FixedDecimal,
    constitution: &EconomicsConstitution,
    session: &mut AuditSession,
    ctx: &OpContext,
) -> Result<ValidationResult> {
    if total_supply.is_zero() {
        return fail_zero_base(
            "guard_resonance_draw",
            GuardCode::ResonanceDrawExceeded,
            draw,
            session,
            ctx,
        );
    }
    let ratio = certified_div(draw, total_supply, session, ctx)?;
    check_bound(
        "guard_resonance_draw",
        GuardCode::ResonanceDrawExceeded,
        &ratio,
        &constitution.resonance_draw,
        &[
            ("draw", draw.to_decimal_string()),
            ("total_supply", total_supply.to_decimal_string()),
        ],
        session,
        ctx,
    )
}

/// `allocation / node_pool` within `node_allocation_fraction`.
pub fn validate_node_allocation(
    allocation: &FixedDecimal,
    node_pool: &FixedDecimal,
    constitution: &EconomicsConstitution,
    session: &mut AuditSession,
    ctx: &OpContext,
) -> Result<ValidationResult> {
    if node_pool.is_zero() {
        return fail_zero_base(
            "guard_node_allocation",
            GuardCode::NodeAllocationOutOfBounds,
            allocation,
            session,
            ctx,
        );
    }
    let ratio = certified_div(allocation, node_pool, session, ctx)?;
    check_bound(
        "guard_node_allocation",
        GuardCode::NodeAllocationOutOfBounds,
        &ratio,
        &constitution.node_allocation_fraction,
        &[
            ("allocation", allocation.to_decimal_string()),
            ("node_pool", node_pool.to_decimal_string()),
        ],
        session,
        ctx,
    )
}

/// `entity_amount / pool_total` within `entity_pool_share`.
pub fn validate_entity_pool_share(
    entity_amount: &FixedDecimal,
    pool_total: &FixedDecimal,
    constitution: &EconomicsConstitution,
    session: &mut AuditSession,
    ctx: &OpContext,
) -> Result<ValidationResult> {
    if pool_total.is_zero() {
        return fail_zero_base(
            "guard_entity_pool_share",
            GuardCode::EntityPoolShareExceeded,
            entity_amount,
            session,
            ctx,
        );
    }
    let ratio = certified_div(entity_amount, pool_total, session, ctx)?;
    check_bound(
        "guard_entity_pool_share",
        GuardCode::EntityPoolShareExceeded,
        &ratio,
        &constitution.entity_pool_share,
        &[
            ("entity_amount", entity_amount.to_decimal_string()),
            ("pool_total", pool_total.to_decimal_string()),
        ],
        session,
        ctx,
    )
}

/// Epoch issuance after this delta within `epoch_issuance`.
pub fn validate_epoch_issuance(
    proposed: &FixedDecimal,
    issued_this_epoch: &FixedDecimal,
    constitution: &EconomicsConstitution,
    session: &mut AuditSession,
    ctx: &OpContext,
) -> Result<ValidationResult> {
    let new_total = certified_add(issued_this_epoch, proposed, session, ctx)?;
    check_bound(
        "guard_epoch_issuance",
        GuardCode::EpochIssuanceExceeded,
        &new_total,
        &constitution.epoch_issuance,
        &[
            ("proposed", proposed.to_decimal_string()),
            ("issued_this_epoch", issued_this_epoch.to_decimal_string()),
        ],
        session,
        ctx,
    )
}

/// Quorum threshold within `quorum`.
pub fn validate_quorum(
    threshold: &FixedDecimal,
    constitution: &EconomicsConstitution,
    session: &mut AuditSession,
    ctx: &OpContext,
) -> Result<ValidationResult> {
    check_bound(
        "guard_quorum",
        GuardCode::QuorumOutOfBounds,
        threshold,
        &constitution.quorum,
        &[],
        session,
        ctx,
    )
}
