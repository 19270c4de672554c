//! The evaluation engine for executing a parsed XPath AST against a generic `DataSourceNode`.

use super::ast::{Axis, BinaryOperator, Expression, LocationPath, NodeTest, NodeTypeTest, Step, UnaryOperator};
use super::functions::{self, FunctionRegistry};
use super::{axes, operators};
use crate::datasource::{DataSourceNode, NodeType};
use crate::error::XPathError;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;

/// Pre-computed `xsl:key` lookups: key name -> key value -> matching nodes in document order.
pub type KeyIndexes<N> = HashMap<String, HashMap<String, Vec<N>>>;

/// Represents the possible result types of an XPath expression evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum XPathValue<N> {
    NodeSet(Vec<N>),
    String(String),
    Number(f64),
    Boolean(bool),
}

impl<'a, N: DataSourceNode<'a>> XPathValue<N> {
    /// Coerces the value to a boolean as per XPath 1.0 rules.
    pub fn to_bool(&self) -> bool {
        match self {
            XPathValue::NodeSet(nodes) => !nodes.is_empty(),
            XPathValue::String(s) => !s.is_empty(),
            XPathValue::Number(n) => *n != 0.0 && !n.is_nan(),
            XPathValue::Boolean(b) => *b,
        }
    }

    /// Coerces the value to a number as per XPath 1.0 rules.
    pub fn to_number(&self) -> f64 {
        match self {
            XPathValue::Number(n) => *n,
            XPathValue::String(s) => string_to_number(s),
            XPathValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            XPathValue::NodeSet(_) => string_to_number(&self.to_string()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            XPathValue::NodeSet(_) => "node-set",
            XPathValue::String(_) => "string",
            XPathValue::Number(_) => "number",
            XPathValue::Boolean(_) => "boolean",
        }
    }
}

impl<'a, N: DataSourceNode<'a>> fmt::Display for XPathValue<N> {
    /// Coerces the value to a string as per XPath 1.0 rules.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XPathValue::NodeSet(nodes) => {
                let first = nodes.iter().min().map(|n| n.string_value());
                f.write_str(first.as_deref().unwrap_or(""))
            }
            XPathValue::String(s) => f.write_str(s),
            XPathValue::Number(n) => f.write_str(&number_to_string(*n)),
            XPathValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Converts a string to a number using the XPath `Number` lexical form: optional
/// surrounding whitespace, an optional minus sign, digits with an optional fraction.
/// Anything else is NaN.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let valid = !digits.is_empty()
        && digits.chars().any(|c| c.is_ascii_digit())
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|&c| c == '.').count() <= 1;
    if valid {
        trimmed.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// Formats a number the way the XPath `string()` function does.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// A container for all state needed during expression evaluation.
/// `'a` is the lifetime of the underlying document.
/// `'d` is the lifetime of the borrowed evaluation environment.
pub struct EvaluationContext<'a, 'd, N: DataSourceNode<'a>> {
    pub context_node: N,
    pub root_node: N,
    /// The node `current()` returns: the XSLT current node, unaffected by predicates.
    pub current_node: N,
    pub functions: &'d FunctionRegistry,
    pub context_position: usize, // 1-based index
    pub context_size: usize,
    pub variables: &'d HashMap<String, XPathValue<N>>,
    pub key_indexes: &'d KeyIndexes<N>,
    /// Prefix -> namespace URI bindings used to resolve prefixed name tests.
    pub namespaces: Option<&'d HashMap<String, String>>,
    /// If true, references to undeclared variables are errors instead of empty strings.
    pub strict: bool,
    _marker: PhantomData<&'a ()>,
}

impl<'a, 'd, N: DataSourceNode<'a>> EvaluationContext<'a, 'd, N> {
    pub fn new(
        context_node: N,
        root_node: N,
        functions: &'d FunctionRegistry,
        variables: &'d HashMap<String, XPathValue<N>>,
        key_indexes: &'d KeyIndexes<N>,
    ) -> Self {
        Self {
            context_node,
            root_node,
            current_node: context_node,
            functions,
            context_position: 1,
            context_size: 1,
            variables,
            key_indexes,
            namespaces: None,
            strict: false,
            _marker: PhantomData,
        }
    }

    pub fn with_position(mut self, position: usize, size: usize) -> Self {
        self.context_position = position;
        self.context_size = size;
        self
    }

    pub fn with_namespaces(mut self, namespaces: &'d HashMap<String, String>) -> Self {
        self.namespaces = Some(namespaces);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// A copy of this context focused on another node, keeping `current()` unchanged.
    pub fn focus(&self, node: N, position: usize, size: usize) -> Self {
        Self {
            context_node: node,
            root_node: self.root_node,
            current_node: self.current_node,
            functions: self.functions,
            context_position: position,
            context_size: size,
            variables: self.variables,
            key_indexes: self.key_indexes,
            namespaces: self.namespaces,
            strict: self.strict,
            _marker: PhantomData,
        }
    }

    pub fn resolve_prefix(&self, prefix: &str) -> Result<&'d str, XPathError> {
        self.namespaces
            .and_then(|map| map.get(prefix))
            .map(String::as_str)
            .ok_or_else(|| XPathError::UnknownPrefix(prefix.to_string()))
    }
}

/// Evaluates a compiled expression and returns a concrete `XPathValue`.
pub fn evaluate<'a, N>(
    expr: &Expression,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<XPathValue<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    match expr {
        Expression::Literal(s) => Ok(XPathValue::String(s.clone())),
        Expression::Number(n) => Ok(XPathValue::Number(*n)),
        Expression::LocationPath(path) => Ok(XPathValue::NodeSet(evaluate_location_path(path, e_ctx)?)),
        Expression::Variable(name) => match e_ctx.variables.get(name) {
            Some(value) => Ok(value.clone()),
            None if e_ctx.strict => Err(XPathError::UnknownVariable(name.clone())),
            None => {
                log::debug!("Undeclared variable ${} evaluated as an empty string", name);
                Ok(XPathValue::String(String::new()))
            }
        },
        Expression::FunctionCall { name, args } => {
            let mut evaluated_args = Vec::with_capacity(args.len());
            for arg in args {
                evaluated_args.push(evaluate(arg, e_ctx)?);
            }
            functions::evaluate_function(name, evaluated_args, e_ctx)
        }
        Expression::Filter { primary, predicates } => match evaluate(primary, e_ctx)? {
            XPathValue::NodeSet(mut nodes) => {
                nodes.sort();
                Ok(XPathValue::NodeSet(apply_predicates(nodes, predicates, e_ctx)?))
            }
            other => Err(XPathError::TypeError(format!(
                "predicates can only filter a node-set, got a {}",
                other.type_name()
            ))),
        },
        Expression::BinaryOp { left, op, right } => match op {
            BinaryOperator::Or => Ok(XPathValue::Boolean(
                evaluate(left, e_ctx)?.to_bool() || evaluate(right, e_ctx)?.to_bool(),
            )),
            BinaryOperator::And => Ok(XPathValue::Boolean(
                evaluate(left, e_ctx)?.to_bool() && evaluate(right, e_ctx)?.to_bool(),
            )),
            _ => operators::evaluate(*op, evaluate(left, e_ctx)?, evaluate(right, e_ctx)?),
        },
        Expression::UnaryOp { op, expr } => {
            let val = evaluate(expr, e_ctx)?;
            match op {
                UnaryOperator::Minus => Ok(XPathValue::Number(-val.to_number())),
            }
        }
    }
}

fn evaluate_location_path<'a, N>(
    path: &LocationPath,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let mut current_nodes = if let Some(start_expr) = &path.start_point {
        match evaluate(start_expr, e_ctx)? {
            XPathValue::NodeSet(nodes) => nodes,
            other => {
                return Err(XPathError::TypeError(format!(
                    "a location path cannot start from a {}",
                    other.type_name()
                )));
            }
        }
    } else if path.is_absolute {
        vec![e_ctx.root_node]
    } else {
        vec![e_ctx.context_node]
    };

    for step in &path.steps {
        current_nodes = evaluate_step(step, &current_nodes, e_ctx)?;
    }
    Ok(current_nodes)
}

/// Evaluates one step for every context node; predicates apply per context node, and the
/// union of the results comes back in document order without duplicates.
fn evaluate_step<'a, N>(
    step: &Step,
    context_nodes: &[N],
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for &node in context_nodes {
        let mut candidates = Vec::new();
        for candidate in axes::collect(step.axis, node) {
            if node_matches_test(candidate, &step.node_test, step.axis, e_ctx)? {
                candidates.push(candidate);
            }
        }
        for selected in apply_predicates(candidates, &step.predicates, e_ctx)? {
            if seen.insert(selected) {
                result.push(selected);
            }
        }
    }
    result.sort();
    Ok(result)
}

/// Checks a single node against a node test, using the principal node type of `axis`.
pub fn node_matches_test<'a, N>(
    node: N,
    test: &NodeTest,
    axis: Axis,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<bool, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let principal = if axis == Axis::Attribute {
        NodeType::Attribute
    } else {
        NodeType::Element
    };
    let node_type = node.node_type();
    Ok(match test {
        NodeTest::Wildcard => node_type == principal,
        NodeTest::NamespaceWildcard(prefix) => {
            let uri = e_ctx.resolve_prefix(prefix)?;
            node_type == principal && node.namespace_uri() == Some(uri)
        }
        NodeTest::Name { prefix, local } => {
            let uri = match prefix {
                Some(p) => Some(e_ctx.resolve_prefix(p)?),
                None => None,
            };
            node_type == principal
                && node.name().is_some_and(|q| q.local_part == local)
                && node.namespace_uri() == uri
        }
        NodeTest::NodeType(NodeTypeTest::Text) => node_type == NodeType::Text,
        NodeTest::NodeType(NodeTypeTest::Comment) => node_type == NodeType::Comment,
        NodeTest::NodeType(NodeTypeTest::ProcessingInstruction(target)) => {
            node_type == NodeType::ProcessingInstruction
                && target
                    .as_deref()
                    .is_none_or(|t| node.name().is_some_and(|q| q.local_part == t))
        }
        NodeTest::NodeType(NodeTypeTest::Node) => true,
    })
}

/// Filters nodes by each predicate in turn. `nodes` must already be in the order that
/// positions refer to (axis order for steps, document order for filter expressions).
pub fn apply_predicates<'a, N>(
    nodes: Vec<N>,
    predicates: &[Expression],
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let mut remaining = nodes;
    for predicate in predicates {
        let size = remaining.len();
        let mut kept = Vec::with_capacity(size);
        for (i, node) in remaining.into_iter().enumerate() {
            let predicate_ctx = e_ctx.focus(node, i + 1, size);
            let keep = match evaluate(predicate, &predicate_ctx)? {
                XPathValue::Number(n) => n == (i + 1) as f64,
                other => other.to_bool(),
            };
            if keep {
                kept.push(node);
            }
        }
        remaining = kept;
    }
    Ok(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::mock::{MockNode, MockTree, sample_tree};
    use crate::parser::parse_expression;

    fn eval<'t>(
        tree: &'t MockTree,
        expr: &str,
        vars: &HashMap<String, XPathValue<MockNode<'t>>>,
    ) -> Result<XPathValue<MockNode<'t>>, XPathError> {
        let funcs = FunctionRegistry::default();
        let keys = KeyIndexes::new();
        let e_ctx = EvaluationContext::new(tree.root(), tree.root(), &funcs, vars, &keys);
        evaluate(&parse_expression(expr)?, &e_ctx)
    }

    fn ids(value: XPathValue<MockNode<'_>>) -> Vec<usize> {
        match value {
            XPathValue::NodeSet(nodes) => nodes.iter().map(|n| n.id).collect(),
            other => panic!("expected a node-set, got {:?}", other),
        }
    }

    #[test]
    fn predicate_by_attribute() {
        let tree = sample_tree();
        let vars = HashMap::new();
        assert_eq!(ids(eval(&tree, "doc/para[@id='p2']", &vars).unwrap()), vec![6]);
    }

    #[test]
    fn positional_predicates_apply_per_context_node() {
        let mut tree = MockTree::new();
        let list = tree.element(0, "list");
        for _ in 0..2 {
            let group = tree.element(list, "group");
            tree.element(group, "item");
            tree.element(group, "item");
        }
        let vars = HashMap::new();
        let result = ids(eval(&tree, "list/group/item[1]", &vars).unwrap());
        assert_eq!(result, vec![3, 6]);
        let result = ids(eval(&tree, "(list/group/item)[1]", &vars).unwrap());
        assert_eq!(result, vec![3]);
    }

    #[test]
    fn reverse_axis_positions_count_backwards() {
        let tree = sample_tree();
        let vars = HashMap::new();
        let result = ids(eval(&tree, "doc/note/preceding-sibling::para[1]", &vars).unwrap());
        assert_eq!(result, vec![6]);
    }

    #[test]
    fn union_is_sorted_and_deduplicated() {
        let tree = sample_tree();
        let vars = HashMap::new();
        let result = ids(eval(&tree, "doc/note | doc/para | doc/para[1]", &vars).unwrap());
        assert_eq!(result, vec![2, 6, 9]);
    }

    #[test]
    fn path_from_variable_node_set() {
        let tree = sample_tree();
        let mut vars = HashMap::new();
        vars.insert("p".to_string(), XPathValue::NodeSet(vec![tree.node(2)]));
        let result = eval(&tree, "$p/text()", &vars).unwrap();
        assert_eq!(result.to_string(), "Hello");
    }

    #[test]
    fn path_from_a_string_is_a_type_error() {
        let tree = sample_tree();
        let mut vars = HashMap::new();
        vars.insert("s".to_string(), XPathValue::String("x".to_string()));
        assert!(matches!(
            eval(&tree, "$s/para", &vars),
            Err(XPathError::TypeError(_))
        ));
    }

    #[test]
    fn strict_mode_rejects_undeclared_variables() {
        let tree = sample_tree();
        let funcs = FunctionRegistry::default();
        let vars = HashMap::new();
        let keys = KeyIndexes::new();
        let expr = parse_expression("$missing").unwrap();

        let lenient = EvaluationContext::new(tree.root(), tree.root(), &funcs, &vars, &keys);
        assert_eq!(evaluate(&expr, &lenient).unwrap().to_string(), "");

        let strict = lenient.with_strict(true);
        assert_eq!(
            evaluate(&expr, &strict),
            Err(XPathError::UnknownVariable("missing".to_string()))
        );
    }

    #[test]
    fn prefixed_name_tests_resolve_through_namespaces() {
        let mut tree = MockTree::new();
        let doc = tree.element(0, "doc");
        tree.element_ns(doc, "a", "item", "urn:a");
        tree.element(doc, "item");
        let funcs = FunctionRegistry::default();
        let vars = HashMap::new();
        let keys = KeyIndexes::new();
        let mut namespaces = HashMap::new();
        namespaces.insert("x".to_string(), "urn:a".to_string());
        let e_ctx = EvaluationContext::new(tree.root(), tree.root(), &funcs, &vars, &keys)
            .with_namespaces(&namespaces);

        let prefixed = evaluate(&parse_expression("doc/x:item").unwrap(), &e_ctx).unwrap();
        assert_eq!(ids(prefixed), vec![2]);
        let plain = evaluate(&parse_expression("doc/item").unwrap(), &e_ctx).unwrap();
        assert_eq!(ids(plain), vec![3]);
        assert_eq!(
            evaluate(&parse_expression("doc/y:item").unwrap(), &e_ctx),
            Err(XPathError::UnknownPrefix("y".to_string()))
        );
    }

    #[test]
    fn number_formatting_follows_xpath() {
        assert_eq!(number_to_string(5.0), "5");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(2.5), "2.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
        assert!(string_to_number("1e3").is_nan());
        assert!(string_to_number("+1").is_nan());
        assert_eq!(string_to_number(" -12.5 "), -12.5);
    }
}
