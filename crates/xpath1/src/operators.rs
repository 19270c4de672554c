//! Comparison, arithmetic and union operators over already-evaluated operands.

use crate::ast::BinaryOperator;
use crate::datasource::DataSourceNode;
use crate::engine::{XPathValue, string_to_number};
use crate::error::XPathError;

/// A single non-node-set operand, or the string value of one member of a node-set.
#[derive(Debug, Clone, PartialEq)]
enum Atomic {
    String(String),
    Number(f64),
    Boolean(bool),
}

impl Atomic {
    fn to_number(&self) -> f64 {
        match self {
            Atomic::String(s) => string_to_number(s),
            Atomic::Number(n) => *n,
            Atomic::Boolean(b) => f64::from(u8::from(*b)),
        }
    }

    fn to_bool(&self) -> bool {
        match self {
            Atomic::String(s) => !s.is_empty(),
            Atomic::Number(n) => *n != 0.0 && !n.is_nan(),
            Atomic::Boolean(b) => *b,
        }
    }

    fn as_string(&self) -> String {
        match self {
            Atomic::String(s) => s.clone(),
            Atomic::Number(n) => crate::engine::number_to_string(*n),
            Atomic::Boolean(b) => b.to_string(),
        }
    }
}

pub(crate) fn evaluate<'a, N: DataSourceNode<'a>>(
    op: BinaryOperator,
    left: XPathValue<N>,
    right: XPathValue<N>,
) -> Result<XPathValue<N>, XPathError> {
    match op {
        BinaryOperator::Union => union(left, right),
        BinaryOperator::Equals
        | BinaryOperator::NotEquals
        | BinaryOperator::LessThan
        | BinaryOperator::LessThanOrEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanOrEqual => Ok(XPathValue::Boolean(compare(op, &left, &right))),
        BinaryOperator::Plus
        | BinaryOperator::Minus
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Modulo => {
            let (l, r) = (left.to_number(), right.to_number());
            let value = match op {
                BinaryOperator::Plus => l + r,
                BinaryOperator::Minus => l - r,
                BinaryOperator::Multiply => l * r,
                BinaryOperator::Divide => l / r,
                _ => l % r,
            };
            Ok(XPathValue::Number(value))
        }
        BinaryOperator::And => Ok(XPathValue::Boolean(left.to_bool() && right.to_bool())),
        BinaryOperator::Or => Ok(XPathValue::Boolean(left.to_bool() || right.to_bool())),
    }
}

fn union<'a, N: DataSourceNode<'a>>(
    left: XPathValue<N>,
    right: XPathValue<N>,
) -> Result<XPathValue<N>, XPathError> {
    match (left, right) {
        (XPathValue::NodeSet(mut l), XPathValue::NodeSet(r)) => {
            l.extend(r);
            l.sort();
            l.dedup();
            Ok(XPathValue::NodeSet(l))
        }
        (l, r) => {
            let culprit = if matches!(l, XPathValue::NodeSet(_)) { r } else { l };
            Err(XPathError::TypeError(format!(
                "the union operator requires node-sets, got a {}",
                culprit.type_name()
            )))
        }
    }
}

/// Turns a value into the atomic operands it contributes to a comparison.
/// A node-set contributes the string value of each of its nodes.
fn atomize<'a, N: DataSourceNode<'a>>(value: &XPathValue<N>) -> Vec<Atomic> {
    match value {
        XPathValue::NodeSet(nodes) => nodes.iter().map(|n| Atomic::String(n.string_value())).collect(),
        XPathValue::String(s) => vec![Atomic::String(s.clone())],
        XPathValue::Number(n) => vec![Atomic::Number(*n)],
        XPathValue::Boolean(b) => vec![Atomic::Boolean(*b)],
    }
}

fn compare<'a, N: DataSourceNode<'a>>(op: BinaryOperator, left: &XPathValue<N>, right: &XPathValue<N>) -> bool {
    // A node-set compared with a boolean is converted as a whole, not member by member.
    match (left, right) {
        (XPathValue::NodeSet(_), XPathValue::Boolean(b)) => {
            return compare_atomic(op, &Atomic::Boolean(left.to_bool()), &Atomic::Boolean(*b));
        }
        (XPathValue::Boolean(b), XPathValue::NodeSet(_)) => {
            return compare_atomic(op, &Atomic::Boolean(*b), &Atomic::Boolean(right.to_bool()));
        }
        _ => {}
    }
    let lefts = atomize(left);
    let rights = atomize(right);
    lefts
        .iter()
        .any(|l| rights.iter().any(|r| compare_atomic(op, l, r)))
}

fn compare_atomic(op: BinaryOperator, left: &Atomic, right: &Atomic) -> bool {
    match op {
        BinaryOperator::Equals | BinaryOperator::NotEquals => {
            let equal = match (left, right) {
                (Atomic::Boolean(_), _) | (_, Atomic::Boolean(_)) => left.to_bool() == right.to_bool(),
                (Atomic::Number(_), _) | (_, Atomic::Number(_)) => left.to_number() == right.to_number(),
                _ => left.as_string() == right.as_string(),
            };
            if op == BinaryOperator::Equals { equal } else { !equal }
        }
        _ => {
            let (l, r) = (left.to_number(), right.to_number());
            match op {
                BinaryOperator::LessThan => l < r,
                BinaryOperator::LessThanOrEqual => l <= r,
                BinaryOperator::GreaterThan => l > r,
                _ => l >= r,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::mock::{MockNode, sample_tree};

    type Value<'t> = XPathValue<MockNode<'t>>;

    #[test]
    fn node_set_equality_is_existential() {
        let tree = sample_tree();
        let paras: Value = XPathValue::NodeSet(vec![tree.node(2), tree.node(6)]);
        let world: Value = XPathValue::String("World".into());
        let nobody: Value = XPathValue::String("Nobody".into());
        assert!(compare(BinaryOperator::Equals, &paras, &world));
        assert!(!compare(BinaryOperator::Equals, &paras, &nobody));
        // Both `=` and `!=` can hold for the same node-set.
        assert!(compare(BinaryOperator::NotEquals, &paras, &world));
    }

    #[test]
    fn empty_node_set_compares_false_except_with_booleans() {
        let empty: Value = XPathValue::NodeSet(vec![]);
        assert!(!compare(BinaryOperator::Equals, &empty, &XPathValue::String(String::new())));
        assert!(!compare(BinaryOperator::NotEquals, &empty, &XPathValue::String(String::new())));
        assert!(compare(BinaryOperator::Equals, &empty, &XPathValue::Boolean(false)));
    }

    #[test]
    fn relational_operators_compare_numbers() {
        let tree = sample_tree();
        let note: Value = XPathValue::NodeSet(vec![tree.node(9)]);
        assert!(compare(BinaryOperator::GreaterThan, &note, &XPathValue::Number(41.0)));
        assert!(compare(BinaryOperator::LessThanOrEqual, &XPathValue::String("3".into()), &note));
        assert!(!compare::<MockNode>(
            BinaryOperator::LessThan,
            &XPathValue::String("abc".into()),
            &XPathValue::Number(1.0)
        ));
    }

    #[test]
    fn arithmetic_follows_ieee_rules() {
        let div = evaluate::<MockNode>(BinaryOperator::Divide, XPathValue::Number(1.0), XPathValue::Number(0.0)).unwrap();
        assert_eq!(div, XPathValue::Number(f64::INFINITY));
        let modulo =
            evaluate::<MockNode>(BinaryOperator::Modulo, XPathValue::Number(-5.0), XPathValue::Number(2.0)).unwrap();
        assert_eq!(modulo, XPathValue::Number(-1.0));
    }

    #[test]
    fn union_rejects_non_node_sets() {
        let result = evaluate::<MockNode>(
            BinaryOperator::Union,
            XPathValue::NodeSet(vec![]),
            XPathValue::Number(1.0),
        );
        assert!(matches!(result, Err(XPathError::TypeError(_))));
    }
}
