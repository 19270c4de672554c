//! XSLT 1.0 processor over roxmltree documents.
//!
//! A stylesheet is compiled once into a [`CompiledStylesheet`] and applied by a push-model
//! executor that drives an [`OutputBuilder`]. Nothing fails fast: parse, compile and runtime
//! problems are pushed into an [`ErrorQueue`] that the caller drains after each phase.

pub mod ast;
pub mod compiler;
pub mod datasources;
pub mod error;
pub mod executor;
pub mod output;
pub mod pattern;
pub mod processor;
pub mod result;
pub mod serializer;
pub mod util;

mod compiler_handlers;
mod executor_handlers;

pub use ast::CompiledStylesheet;
pub use datasources::xml::{XmlDocument, XmlNode, parse_document};
pub use datasources::{DataSourceNode, NodeType, QName};
pub use error::{ErrorQueue, ExecutionError, Level, Location, ProcessorError, XsltError};
pub use output::{OutputBuilder, ResultTreeBuilder};
pub use processor::{DEFAULT_MAX_TEMPLATE_DEPTH, XsltProcessor};
pub use result::{OutputMethod, OutputName, OutputSettings, ResultDocument, ResultElement, ResultNode};
pub use serializer::serialize;
pub use xslproc_xpath1::{ExtensionFn, ExtensionValue, FunctionRegistry};
