use crate::auth::AuthContext;

use super::ast::{CompareOp, Expr, Side, Value};

/// Read access to the fields of a record under evaluation.
pub trait RuleRecord {
    /// Value of `name`, `Value::Null` when unset.
    fn field(&self, name: &str) -> Value;
}

/// Outcome of comparing two resolved sides.
///
/// An anonymous caller's id never equals a record field, so an unset
/// relation cannot grant access to a caller without a session. Against a
/// constant it behaves as an unset value.
pub fn compare_sides(op: CompareOp, left: &Side<'_>, right: &Side<'_>, record: &dyn RuleRecord) -> bool {
    let value = |side: &Side<'_>| match side {
        Side::Constant(v) => v.clone(),
        Side::AnonymousId => Value::Null,
        Side::Field { name, .. } => record.field(name),
    };

    match (left, right) {
        (Side::AnonymousId, Side::Field { .. }) | (Side::Field { .. }, Side::AnonymousId) => {
            op.apply(false)
        }
        _ => op.apply(value(left).loosely_equals(&value(right))),
    }
}

/// Evaluate `expr`; `&&` and `||` stop at the first deciding clause.
pub fn evaluate(expr: &Expr, auth: &AuthContext, record: &dyn RuleRecord) -> bool {
    match expr {
        Expr::Compare { left, op, right } => {
            compare_sides(*op, &left.resolve(auth), &right.resolve(auth), record)
        }
        Expr::And(items) => items.iter().all(|e| evaluate(e, auth, record)),
        Expr::Or(items) => items.iter().any(|e| evaluate(e, auth, record)),
    }
}
