//! Certified arithmetic engine.
//!
//! Every economically meaningful arithmetic operation goes through these
//! entry points: the result is computed with [`FixedDecimal`] and a
//! structured entry is appended to the active [`AuditSession`] *before* the
//! result is returned. Callers cannot opt out of the logging — that is the
//! mechanism that makes every downstream computation auditable. Refused
//! operations (overflow, division by zero) are logged as `*_failed` entries
//! and then propagated, so the trail also shows what the engine declined to
//! compute.

use crate::audit::AuditSession;
use crate::canonical::CanonicalValue;
use crate::decimal::FixedDecimal;
use crate::{CertrailError, Result};
use std::collections::BTreeMap;
use tracing::debug;

pub use crate::audit::OpContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    fn name(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Div => "div",
        }
    }

    fn apply(self, a: &FixedDecimal, b: &FixedDecimal) -> Result<FixedDecimal> {
        match self {
            ArithOp::Add => a.add(b),
            ArithOp::Sub => a.sub(b),
            ArithOp::Mul => a.mul(b),
            ArithOp::Div => a.div(b),
        }
    }
}

fn operand_details(a: &FixedDecimal, b: &FixedDecimal) -> BTreeMap<String, CanonicalValue> {
    let mut map = BTreeMap::new();
    map.insert("a".to_string(), CanonicalValue::Decimal(*a));
    map.insert("b".to_string(), CanonicalValue::Decimal(*b));
    map
}

fn certified_op(
    op: ArithOp,
    a: &FixedDecimal,
    b: &FixedDecimal,
    session: &mut AuditSession,
    ctx: &OpContext,
) -> Result<FixedDecimal> {
    if session.is_finalized() {
        return Err(CertrailError::SessionReuse(format!(
            "certified {} on a finalized session",
            op.name()
        )));
    }

    match op.apply(a, b) {
        Ok(result) => {
            let mut details = operand_details(a, b);
            details.insert("result".to_string(), CanonicalValue::Decimal(result));
            session.append(op.name(), CanonicalValue::Map(details), ctx)?;
            Ok(result)
        }
        Err(err) => {
            debug!(op = op.name(), error = %err, "certified operation refused");
            let mut details = operand_details(a, b);
            details.insert(
                "error".to_string(),
                CanonicalValue::Text(err.to_string()),
            );
            session.append(
                &format!("{}_failed", op.name()),
                CanonicalValue::Map(details),
                ctx,
            )?;
            Err(err)
        }
    }
}

/// Certified addition: computes `a + b` and logs the operation.
pub fn certified_add(
    a: &FixedDecimal,
    b: &FixedDecimal,
    session: &mut AuditSession,
    ctx: &OpContext,
) -> Result<FixedDecimal> {
    certified_op(ArithOp::Add, a, b, session, ctx)
}

/// Certified subtraction: computes `a - b` and logs the operation.
pub fn certified_sub(
    a: &FixedDecimal,
    b: &FixedDecimal,
    session: &mut AuditSession,
    ctx: &OpContext,
) -> Result<FixedDecimal> {
    certified_op(ArithOp::Sub, a, b, session, ctx)
}

/// Certified multiplication: computes `a * b` and logs the operation.
pub fn certified_mul(
    a: &FixedDecimal,
    b: &FixedDecimal,
    session: &mut AuditSession,
    ctx: &OpContext,
) -> Result<FixedDecimal> {
    certified_op(ArithOp::Mul, a, b, session, ctx)
}

/// Certified division: computes `a / b` (floor) and logs the operation.
pub fn certified_div(
    a: &FixedDecimal,
    b: &FixedDecimal,
    session: &mut AuditSession,
    ctx: &OpContext,
) -> Result<FixedDecimal> {
    certified_op(ArithOp::Div, a, b, session, ctx)
}
