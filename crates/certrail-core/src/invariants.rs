//! Cross-cutting structural invariants over allocation operations.
//!
//! Four named, independently-callable checks guard every restricted-balance
//! allocation: non-transferability, supply conservation, the
//! participation-power cap, and deterministic replay.
//! [`InvariantChecker::validate_all`] runs them in a fixed order and returns
//! every verdict — no short-circuit — so the audit trail records each
//! invariant's outcome even when an earlier one already failed.
//!
//! Like the guards, invariant failures are data ([`InvariantCheckResult`]),
//! never errors; `Err` surfaces only for arithmetic corruption.

use crate::audit::{AuditSession, OpContext};
use crate::canonical::CanonicalValue;
use crate::decimal::FixedDecimal;
use crate::engine::{certified_add, certified_div};
use crate::{Hash32, Result};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Operation names that may never touch a restricted balance class.
pub const DISALLOWED_OPERATIONS: [&str; 5] = ["transfer", "trade", "swap", "sell", "exchange"];

/// Invariant-specific failure codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum InvariantCode {
    NonTransferableViolation,
    NegativeAllocation,
    SupplyMismatch,
    ParticipationPowerExceeded,
    ReplayHashMismatch,
}

impl InvariantCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvariantCode::NonTransferableViolation => "non_transferable_violation",
            InvariantCode::NegativeAllocation => "negative_allocation",
            InvariantCode::SupplyMismatch => "supply_mismatch",
            InvariantCode::ParticipationPowerExceeded => "participation_power_exceeded",
            InvariantCode::ReplayHashMismatch => "replay_hash_mismatch",
        }
    }
}

/// Verdict of one invariant check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvariantCheckResult {
    /// Which invariant produced this verdict.
    pub invariant: &'static str,
    pub passed: bool,
    pub error_code: Option<InvariantCode>,
    pub error_message: Option<String>,
    pub details: BTreeMap<String, String>,
}

impl InvariantCheckResult {
    fn pass(invariant: &'static str, details: BTreeMap<String, String>) -> Self {
        InvariantCheckResult {
            invariant,
            passed: true,
            error_code: None,
            error_message: None,
            details,
        }
    }

    fn fail(
        invariant: &'static str,
        code: InvariantCode,
        message: String,
        details: BTreeMap<String, String>,
    ) -> Self {
        InvariantCheckResult {
            invariant,
            passed: false,
            error_code: Some(code),
            error_message: Some(message),
            details,
        }
    }
}

/// A proposed allocation against a restricted balance class.
///
/// `allocations` is keyed by entity id; the `BTreeMap` fixes the processing
/// order to lexicographic, which is what makes replay deterministic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocationOp {
    pub caller: String,
    pub operation: String,
    pub allocations: BTreeMap<String, FixedDecimal>,
    pub previous_total: FixedDecimal,
    pub new_total: FixedDecimal,
    /// When supplied, the canonical hash of the allocation set must match.
    pub expected_hash: Option<Hash32>,
}

/// Canonical hash of an allocation set: a list of `{amount, entity}` maps in
/// lexicographic entity order.
pub fn allocation_set_hash(allocations: &BTreeMap<String, FixedDecimal>) -> Hash32 {
    let items = allocations
        .iter()
        .map(|(entity, amount)| {
            let mut map = BTreeMap::new();
            map.insert("entity".to_string(), CanonicalValue::Text(entity.clone()));
            map.insert("amount".to_string(), CanonicalValue::Decimal(*amount));
            CanonicalValue::Map(map)
        })
        .collect();
    CanonicalValue::List(items).hash()
}

/// Outcome of validating one op in a batch.
#[derive(Clone, Debug)]
pub struct BatchOutcome {
    pub results: Vec<InvariantCheckResult>,
    pub replay_hash: Hash32,
}

/// Runs the four allocation invariants.
#[derive(Clone, Debug)]
pub struct InvariantChecker {
    allowed_callers: BTreeSet<String>,
    /// Maximum share of `new_total` any single entity may hold.
    power_cap: FixedDecimal,
}

impl InvariantChecker {
    pub fn new(
        allowed_callers: impl IntoIterator<Item = String>,
        power_cap: FixedDecimal,
    ) -> Self {
        InvariantChecker {
            allowed_callers: allowed_callers.into_iter().collect(),
            power_cap,
        }
    }

    fn record(
        result: &InvariantCheckResult,
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
        session.append(
            &format!("invariant_{}", result.invariant),
            CanonicalValue::Map(map),
            ctx,
        )?;
        Ok(())
    }

    /// Only allow-listed callers may mutate the restricted class, and no
    /// disallowed operation name may be used. Fails closed on both.
    pub fn check_non_transferability(
        &self,
        op: &AllocationOp,
        session: &mut AuditSession,
        ctx: &OpContext,
    ) -> Result<InvariantCheckResult> {
        let mut details = BTreeMap::new();
        details.insert("caller".to_string(), op.caller.clone());
        details.insert("operation".to_string(), op.operation.clone());

        let result = if !self.allowed_callers.contains(&op.caller) {
            InvariantCheckResult::fail(
                "non_transferability",
                InvariantCode::NonTransferableViolation,
                format!("caller {:?} is not allow-listed", op.caller),
                details,
            )
        } else if DISALLOWED_OPERATIONS.contains(&op.operation.as_str()) {
            InvariantCheckResult::fail(
                "non_transferability",
                InvariantCode::NonTransferableViolation,
                format!("operation {:?} is forbidden on restricted balances", op.operation),
                details,
            )
        } else {
            InvariantCheckResult::pass("non_transferability", details)
        };
        Self::record(&result, session, ctx)?;
        Ok(result)
    }

    /// `new_total == previous_total + sum(allocations)`, and no allocation
    /// may be negative.
    pub fn check_supply_conservation(
        &self,
        op: &AllocationOp,
        session: &mut AuditSession,
        ctx: &OpContext,
    ) -> Result<InvariantCheckResult> {
        for (entity, amount) in &op.allocations {
            if amount.is_negative() {
                let mut details = BTreeMap::new();
                details.insert("entity".to_string(), entity.clone());
                details.insert("amount".to_string(), amount.to_decimal_string());
                let result = InvariantCheckResult::fail(
                    "supply_conservation",
                    InvariantCode::NegativeAllocation,
                    format!("allocation for {entity:?} is negative"),
                    details,
                );
                Self::record(&result, session, ctx)?;
                return Ok(result);
            }
        }

        let mut sum = FixedDecimal::ZERO;
        for amount in op.allocations.values() {
            sum = certified_add(&sum, amount, session, ctx)?;
        }
        let expected = certified_add(&op.previous_total, &sum, session, ctx)?;

        let mut details = BTreeMap::new();
        details.insert("previous_total".to_string(), op.previous_total.to_decimal_string());
        details.insert("allocated".to_string(), sum.to_decimal_string());
        details.insert("expected_new_total".to_string(), expected.to_decimal_string());
        details.insert("new_total".to_string(), op.new_total.to_decimal_string());

        let result = if expected == op.new_total {
            InvariantCheckResult::pass("supply_conservation", details)
        } else {
            InvariantCheckResult::fail(
                "supply_conservation",
                InvariantCode::SupplyMismatch,
                format!(
                    "new_total {} does not equal previous_total {} + allocations {}",
                    op.new_total, op.previous_total, sum
                ),
                details,
            )
        };
        Self::record(&result, session, ctx)?;
        Ok(result)
    }

    /// No single entity's share of `new_total` may exceed the cap. Shares
    /// exactly at the cap pass.
    pub fn check_participation_power(
        &self,
        op: &AllocationOp,
        session: &mut AuditSession,
        ctx: &OpContext,
    ) -> Result<InvariantCheckResult> {
        let mut details = BTreeMap::new();
        details.insert("cap".to_string(), self.power_cap.to_decimal_string());

        if op.new_total.is_zero() {
            let any_nonzero = op.allocations.values().any(|a| !a.is_zero());
            let result = if any_nonzero {
                InvariantCheckResult::fail(
                    "participation_power",
                    InvariantCode::ParticipationPowerExceeded,
                    "nonzero allocation against a zero total".to_string(),
                    details,
                )
            } else {
                InvariantCheckResult::pass("participation_power", details)
            };
            Self::record(&result, session, ctx)?;
            return Ok(result);
        }

        let mut worst: Option<(&String, FixedDecimal)> = None;
        for (entity, amount) in &op.allocations {
            let share = certified_div(amount, &op.new_total, session, ctx)?;
            let exceeds = match worst {
                Some((_, w)) => share.compare(&w) == std::cmp::Ordering::Greater,
                None => true,
            };
            if exceeds {
                worst = Some((entity, share));
            }
        }

        let result = match worst {
            Some((entity, share))
                if share.compare(&self.power_cap) == std::cmp::Ordering::Greater =>
            {
                details.insert("entity".to_string(), entity.clone());
                details.insert("share".to_string(), share.to_decimal_string());
                InvariantCheckResult::fail(
                    "participation_power",
                    InvariantCode::ParticipationPowerExceeded,
                    format!(
                        "entity {entity:?} holds share {} above cap {}",
                        share, self.power_cap
                    ),
                    details,
                )
            }
            Some((entity, share)) => {
                details.insert("entity".to_string(), entity.clone());
                details.insert("share".to_string(), share.to_decimal_string());
                InvariantCheckResult::pass("participation_power", details)
            }
            None => InvariantCheckResult::pass("participation_power", details),
        };
        Self::record(&result, session, ctx)?;
        Ok(result)
    }

    /// Allocations are processed in lexicographic entity order; when an
    /// expected content hash is supplied, the canonical hash of the
    /// allocation set must match it exactly.
    pub fn check_deterministic_replay(
        &self,
        op: &AllocationOp,
        session: &mut AuditSession,
        ctx: &OpContext,
    ) -> Result<InvariantCheckResult> {
        let actual = allocation_set_hash(&op.allocations);
        let mut details = BTreeMap::new();
        details.insert("allocation_set_hash".to_string(), actual.to_hex());

        let result = match op.expected_hash {
            Some(expected) if expected != actual => {
                details.insert("expected_hash".to_string(), expected.to_hex());
                InvariantCheckResult::fail(
                    "deterministic_replay",
                    InvariantCode::ReplayHashMismatch,
                    "allocation set hash does not match the expected content hash".to_string(),
                    details,
                )
            }
            _ => InvariantCheckResult::pass("deterministic_replay", details),
        };
        Self::record(&result, session, ctx)?;
        Ok(result)
    }

    /// Run all four invariants in fixed order, returning every verdict.
    pub fn validate_all(
        &self,
        op: &AllocationOp,
        session: &mut AuditSession,
        ctx: &OpContext,
    ) -> Result<Vec<InvariantCheckResult>> {
        Ok(vec![
            self.check_non_transferability(op, session, ctx)?,
            self.check_supply_conservation(op, session, ctx)?,
            self.check_participation_power(op, session, ctx)?,
            self.check_deterministic_replay(op, session, ctx)?,
        ])
    }

    /// Validate independent allocation ops in parallel, one fresh session
    /// per op. Sessions are fully independent, so this parallelism cannot
    /// perturb any replay hash.
    pub fn validate_batch(
        &self,
        ops: &[AllocationOp],
        ctx: &OpContext,
    ) -> Vec<Result<BatchOutcome>> {
        ops.par_iter()
            .map(|op| {
                let mut session = AuditSession::open();
                let results = self.validate_all(op, &mut session, ctx)?;
                session.finalize()?;
                Ok(BatchOutcome {
                    results,
                    replay_hash: session.log_hash()?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::OpContext;

    fn dec(s: &str) -> FixedDecimal {
        FixedDecimal::from_decimal_string(s).unwrap()
    }

    fn checker() -> InvariantChecker {
        InvariantChecker::new(
            ["minter".to_string(), "rewarder".to_string()],
            dec("0.1"),
        )
    }

    fn op(allocations: &[(&str, &str)], previous: &str, new: &str) -> AllocationOp {
        AllocationOp {
            caller: "minter".to_string(),
            operation: "allocate".to_string(),
            allocations: allocations
                .iter()
                .map(|(e, a)| (e.to_string(), dec(a)))
                .collect(),
            previous_total: dec(previous),
            new_total: dec(new),
            expected_hash: None,
        }
    }

    fn ctx() -> OpContext {
        OpContext::new("inv-test", 3)
    }

    #[test]
    fn conserved_supply_passes() {
        let mut session = AuditSession::open();
        let r = checker()
            .check_supply_conservation(&op(&[("A", "10"), ("B", "20")], "1000", "1030"), &mut session, &ctx())
            .unwrap();
        assert!(r.passed);
        assert_eq!(r.details["allocated"], "30");
    }

    #[test]
    fn off_by_one_total_fails_with_supply_mismatch() {
        let mut session = AuditSession::open();
        let r = checker()
            .check_supply_conservation(&op(&[("A", "10"), ("B", "20")], "1000", "1031"), &mut session, &ctx())
            .unwrap();
        assert!(!r.passed);
        assert_eq!(r.error_code, Some(InvariantCode::SupplyMismatch));
    }

    #[test]
    fn negative_allocation_fails_immediately() {
        let mut session = AuditSession::open();
        let r = checker()
            .check_supply_conservation(&op(&[("A", "-1"), ("B", "20")], "1000", "1019"), &mut session, &ctx())
            .unwrap();
        assert!(!r.passed);
        assert_eq!(r.error_code, Some(InvariantCode::NegativeAllocation));
        // Failed before any certified addition ran.
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn unlisted_caller_fails_closed() {
        let mut session = AuditSession::open();
        let mut bad = op(&[("A", "10")], "0", "10");
        bad.caller = "intruder".to_string();
        let r = checker()
            .check_non_transferability(&bad, &mut session, &ctx())
            .unwrap();
        assert!(!r.passed);
        assert_eq!(r.error_code, Some(InvariantCode::NonTransferableViolation));
    }

    #[test]
    fn disallowed_operation_names_fail_closed() {
        for name in DISALLOWED_OPERATIONS {
            let mut session = AuditSession::open();
            let mut bad = op(&[("A", "10")], "0", "10");
            bad.operation = name.to_string();
            let r = checker()
                .check_non_transferability(&bad, &mut session, &ctx())
                .unwrap();
            assert!(!r.passed, "operation {name:?} must be rejected");
        }
    }

    #[test]
    fn participation_cap_is_inclusive() {
        let mut session = AuditSession::open();
        // 100 of 1000 is exactly the 0.1 cap.
        let r = checker()
            .check_participation_power(&op(&[("A", "100")], "900", "1000"), &mut session, &ctx())
            .unwrap();
        assert!(r.passed);

        let r = checker()
            .check_participation_power(
                &op(&[("A", "100.000000000000000001")], "900", "1000"),
                &mut session,
                &ctx(),
            )
            .unwrap();
        assert!(!r.passed);
        assert_eq!(r.error_code, Some(InvariantCode::ParticipationPowerExceeded));
    }

    #[test]
    fn insertion_order_never_changes_the_allocation_hash() {
        let forward = op(&[("A", "10"), ("B", "20")], "0", "30");
        let reverse = op(&[("B", "20"), ("A", "10")], "0", "30");
        assert_eq!(
            allocation_set_hash(&forward.allocations),
            allocation_set_hash(&reverse.allocations)
        );
    }

    #[test]
    fn replay_hash_mismatch_is_detected() {
        let mut session = AuditSession::open();
        let mut checked = op(&[("A", "10"), ("B", "20")], "1000", "1030");
        checked.expected_hash = Some(allocation_set_hash(&checked.allocations));
        let r = checker()
            .check_deterministic_replay(&checked, &mut session, &ctx())
            .unwrap();
        assert!(r.passed);

        checked.expected_hash = Some(Hash32([9u8; 32]));
        let r = checker()
            .check_deterministic_replay(&checked, &mut session, &ctx())
            .unwrap();
        assert!(!r.passed);
        assert_eq!(r.error_code, Some(InvariantCode::ReplayHashMismatch));
    }

    #[test]
    fn validate_all_reports_every_verdict() {
        let mut session = AuditSession::open();
        // Bad caller AND bad total: both failures must be visible.
        let mut bad = op(&[("A", "10"), ("B", "20")], "1000", "1031");
        bad.caller = "intruder".to_string();

        let results = checker().validate_all(&bad, &mut session, &ctx()).unwrap();
        assert_eq!(results.len(), 4);
        assert!(!results[0].passed);
        assert!(!results[1].passed);
        assert!(results[2].passed);
        assert!(results[3].passed);
        let names: Vec<&str> = results.iter().map(|r| r.invariant).collect();
        assert_eq!(
            names,
            vec![
                "non_transferability",
                "supply_conservation",
                "participation_power",
                "deterministic_replay"
            ]
        );
    }

    #[test]
    fn batch_validation_matches_sequential_hashes() {
        let ops: Vec<AllocationOp> = (0..8)
            .map(|i| {
                op(
                    &[("A", "10"), ("B", "20")],
                    "1000",
                    if i % 2 == 0 { "1030" } else { "1031" },
                )
            })
            .collect();

        let batch = checker().validate_batch(&ops, &ctx());
        assert_eq!(batch.len(), 8);

        for (i, outcome) in batch.iter().enumerate() {
            let outcome = outcome.as_ref().unwrap();
            let mut session = AuditSession::open();
            let results = checker()
                .validate_all(&ops[i], &mut session, &ctx())
                .unwrap();
            session.finalize().unwrap();
            assert_eq!(outcome.replay_hash, session.log_hash().unwrap());
            assert_eq!(
                outcome.results.iter().map(|r| r.passed).collect::<Vec<_>>(),
                results.iter().map(|r| r.passed).collect::<Vec<_>>()
            );
        }
    }
}
