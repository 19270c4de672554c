//! Defines the Abstract Syntax Tree (AST) for XPath 1.0 expressions.

/// The top-level expression that can be evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(String),
    Number(f64),
    LocationPath(LocationPath),
    Variable(String),
    FunctionCall {
        name: String,
        args: Vec<Expression>,
    },
    /// A primary expression followed by predicates, like `$items[2]` or `(a|b)[last()]`.
    Filter {
        primary: Box<Expression>,
        predicates: Vec<Expression>,
    },
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expression>,
    },
}

impl Expression {
    pub fn is_location_path(&self) -> bool {
        matches!(self, Expression::LocationPath(_))
    }

    /// Calls `visit` with the name of every function call in the expression tree.
    pub fn for_each_function(&self, visit: &mut dyn FnMut(&str)) {
        match self {
            Expression::Literal(_) | Expression::Number(_) | Expression::Variable(_) => {}
            Expression::LocationPath(path) => {
                if let Some(start) = &path.start_point {
                    start.for_each_function(visit);
                }
                for step in &path.steps {
                    for predicate in &step.predicates {
                        predicate.for_each_function(visit);
                    }
                }
            }
            Expression::FunctionCall { name, args } => {
                visit(name);
                for arg in args {
                    arg.for_each_function(visit);
                }
            }
            Expression::Filter { primary, predicates } => {
                primary.for_each_function(visit);
                for predicate in predicates {
                    predicate.for_each_function(visit);
                }
            }
            Expression::BinaryOp { left, right, .. } => {
                left.for_each_function(visit);
                right.for_each_function(visit);
            }
            Expression::UnaryOp { expr, .. } => expr.for_each_function(visit),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Logical
    Or,
    And,
    // Equality
    Equals,
    NotEquals,
    // Relational
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    // Additive
    Plus,
    Minus,
    // Multiplicative
    Multiply,
    Divide,
    Modulo,
    // Set
    Union,
}

/// Represents a full location path, like `/child::foo`, `descendant::bar[1]`, or `$var/item`.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationPath {
    /// An optional starting expression, for paths like `$var/foo` or `key('k', 1)/foo`.
    pub start_point: Option<Box<Expression>>,
    /// True if the path starts from the document root. Meaningless if `start_point` is `Some`.
    pub is_absolute: bool,
    pub steps: Vec<Step>,
}

/// A single step in a location path, like `child::foo[position() > 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub node_test: NodeTest,
    pub predicates: Vec<Expression>,
}

impl Step {
    /// The `descendant-or-self::node()` step that `//` abbreviates.
    pub fn descendant_or_self() -> Self {
        Step {
            axis: Axis::DescendantOrSelf,
            node_test: NodeTest::NodeType(NodeTypeTest::Node),
            predicates: vec![],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Attribute,
    Namespace,
    Parent,
    Ancestor,
    AncestorOrSelf,
    SelfAxis,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
}

impl Axis {
    /// Reverse axes number their nodes in reverse document order for positional predicates.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Ancestor | Axis::AncestorOrSelf | Axis::PrecedingSibling | Axis::Preceding
        )
    }
}

/// A test to apply to nodes on a given axis to see if they should be included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// `*`
    Wildcard,
    /// `prefix:*`
    NamespaceWildcard(String),
    /// `local` or `prefix:local`
    Name {
        prefix: Option<String>,
        local: String,
    },
    NodeType(NodeTypeTest),
}

impl NodeTest {
    /// Default template priority contributed by a single-step pattern with this test
    /// (XSLT 1.0, section 5.5).
    pub fn default_priority(&self) -> f64 {
        match self {
            NodeTest::Name { .. } => 0.0,
            NodeTest::NodeType(NodeTypeTest::ProcessingInstruction(Some(_))) => 0.0,
            NodeTest::NamespaceWildcard(_) => -0.25,
            NodeTest::Wildcard | NodeTest::NodeType(_) => -0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTypeTest {
    Text,
    Node,
    Comment,
    /// `processing-instruction()` with an optional target literal.
    ProcessingInstruction(Option<String>),
}
