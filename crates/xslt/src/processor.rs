//! The public face of the crate: import a stylesheet once, then transform source documents,
//! collecting every problem into an [`ErrorQueue`].

use crate::ast::CompiledStylesheet;
use crate::compiler::{self, INSTRUCTIONS};
use crate::datasources::xml::XmlNode;
use crate::error::{ErrorQueue, Level, ProcessorError};
use crate::executor::TemplateExecutor;
use crate::output::ResultTreeBuilder;
use crate::result::ResultDocument;
use crate::serializer;
use std::collections::HashMap;
use xslproc_xpath1::FunctionRegistry;

pub const DEFAULT_MAX_TEMPLATE_DEPTH: usize = 500;

#[derive(Debug)]
pub struct XsltProcessor {
    functions: FunctionRegistry,
    parameters: HashMap<String, String>,
    stylesheet: Option<CompiledStylesheet>,
    strict: bool,
    max_template_depth: usize,
}

impl Default for XsltProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl XsltProcessor {
    pub fn new() -> Self {
        let mut functions = FunctionRegistry::new();
        functions.declare_instructions(INSTRUCTIONS.iter().copied());
        XsltProcessor {
            functions,
            parameters: HashMap::new(),
            stylesheet: None,
            strict: true,
            max_template_depth: DEFAULT_MAX_TEMPLATE_DEPTH,
        }
    }

    /// In strict mode undeclared variables are errors and undeclared `call-template`
    /// parameters are logged.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_max_template_depth(mut self, depth: usize) -> Self {
        self.max_template_depth = depth;
        self
    }

    /// Replaces the extension functions available to expressions.
    pub fn register_functions(&mut self, mut functions: FunctionRegistry) {
        functions.declare_instructions(INSTRUCTIONS.iter().copied());
        log::debug!("Registered {} extension function(s)", functions.extension_count());
        self.functions = functions;
    }

    /// Binds top-level `xsl:param`s by name, replacing any earlier binding.
    pub fn set_parameters(&mut self, parameters: HashMap<String, String>) {
        self.parameters = parameters;
    }

    pub fn stylesheet(&self) -> Option<&CompiledStylesheet> {
        self.stylesheet.as_ref()
    }

    /// Compiles a parsed stylesheet. Returns false when the compiler queued any error; the
    /// stylesheet is then not kept.
    pub fn import_stylesheet(
        &mut self,
        doc: &roxmltree::Document,
        uri: &str,
        queue: &mut ErrorQueue,
    ) -> bool {
        let before = queue.len();
        let compiled = compiler::compile(doc, uri, queue);
        if queue.len() > before {
            log::debug!("Stylesheet '{}' failed to compile", uri);
            self.stylesheet = None;
            return false;
        }
        self.stylesheet = Some(compiled);
        true
    }

    /// Runs the imported stylesheet over `source` and returns the result tree.
    pub fn transform_to_document(
        &self,
        source: &roxmltree::Document,
        queue: &mut ErrorQueue,
    ) -> Option<ResultDocument> {
        let Some(stylesheet) = &self.stylesheet else {
            queue.report(Level::Fatal, "no stylesheet has been imported", "", 0);
            return None;
        };

        let root = XmlNode::root_of(source, &stylesheet.whitespace);
        let mut executor = TemplateExecutor::new(
            stylesheet,
            &self.functions,
            root,
            self.strict,
            self.max_template_depth,
        );
        let mut builder = ResultTreeBuilder::new();
        match executor
            .prepare(&self.parameters)
            .and_then(|()| executor.execute(&mut builder))
        {
            Ok(()) => Some(builder.finish(stylesheet.output.clone())),
            Err(e) => {
                queue.push(ProcessorError::from_execution(&e, &stylesheet.uri));
                None
            }
        }
    }

    /// Runs the imported stylesheet and serializes the result per its `xsl:output`.
    pub fn transform_to_xml(
        &self,
        source: &roxmltree::Document,
        queue: &mut ErrorQueue,
    ) -> Option<String> {
        let document = self.transform_to_document(source, queue)?;
        match serializer::serialize(&document) {
            Ok(text) => Some(text),
            Err(e) => {
                queue.report(Level::Error, format!("serialization failed: {}", e), "", 0);
                None
            }
        }
    }
}
