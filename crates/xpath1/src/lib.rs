//! XPath 1.0 for the xslproc stylesheet processor.
//!
//! Expressions are parsed once with [`parse_expression`] and evaluated any number of times
//! against any tree that implements [`DataSourceNode`].

pub mod ast;
pub mod axes;
pub mod datasource;
pub mod engine;
pub mod error;
pub mod functions;
pub mod operators;
pub mod parser;

pub use ast::{Axis, BinaryOperator, Expression, LocationPath, NodeTest, NodeTypeTest, Step};
pub use datasource::{DataSourceNode, NodeType, QName};
pub use engine::{
    EvaluationContext, KeyIndexes, XPathValue, apply_predicates, evaluate, node_matches_test,
};
pub use error::XPathError;
pub use functions::{ExtensionFn, ExtensionValue, FunctionRegistry};
pub use parser::parse_expression;
