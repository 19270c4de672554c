//! The transform lifecycle: parse the XML, parse the stylesheet, import it, execute it, and
//! collect diagnostics after every phase. Each call owns its context; nothing is shared.

use crate::collector::ErrorCollector;
use crate::config::EngineConfig;
use crate::diagnostic::{Diagnostic, Level, Phase};
use crate::error::{EngineError, SourceSnapshot, TransformFailure};
use crate::locator::{CallerContext, ResolvedFile, classify};
use std::collections::HashMap;
use xslproc_xpath1::FunctionRegistry;

#[cfg(feature = "xslt")]
use xslproc_xslt::{
    ErrorQueue, OutputMethod, OutputSettings, ProcessorError, ResultDocument, XsltProcessor,
    parse_document, serialize,
};

/// Extension functions callable from stylesheet expressions.
pub type ExtensionFunctions = FunctionRegistry;

pub const DEFAULT_STYLESHEET_URI: &str = "stylesheet.xsl";

/// The stylesheet `tidy` runs: an indented identity transform.
pub const TIDY_STYLESHEET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:output method="xml" indent="yes"/>
  <xsl:strip-space elements="*"/>
  <xsl:template match="node() | @*">
    <xsl:copy>
      <xsl:apply-templates select="node() | @*"/>
    </xsl:copy>
  </xsl:template>
</xsl:stylesheet>
"#;

/// True when this build carries an XSLT processor.
pub fn is_transform_processor_available() -> bool {
    cfg!(feature = "xslt")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Serialized text following the stylesheet's `xsl:output`.
    #[default]
    Xml,
    /// The result tree itself.
    Document,
}

#[derive(Debug, Clone)]
pub enum TransformOutput {
    Xml(String),
    #[cfg(feature = "xslt")]
    Document(ResultDocument),
}

impl TransformOutput {
    /// The output as text; a document is serialized per its output settings.
    pub fn to_text(&self) -> Result<String, EngineError> {
        match self {
            TransformOutput::Xml(text) => Ok(text.clone()),
            #[cfg(feature = "xslt")]
            TransformOutput::Document(doc) => Ok(serialize(doc)?),
        }
    }
}

/// The immutable input of one transform.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub xml: String,
    pub xsl: String,
    pub output: OutputMode,
    pub parameters: HashMap<String, String>,
    pub functions: Option<ExtensionFunctions>,
    /// Labels XSL diagnostics and runtime error messages.
    pub stylesheet_uri: String,
}

impl TransformRequest {
    pub fn new(xml: impl Into<String>, xsl: impl Into<String>) -> Self {
        TransformRequest {
            xml: xml.into(),
            xsl: xsl.into(),
            output: OutputMode::Xml,
            parameters: HashMap::new(),
            functions: None,
            stylesheet_uri: DEFAULT_STYLESHEET_URI.to_string(),
        }
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn with_parameters<I, K, V>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.parameters = parameters
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    pub fn with_functions(mut self, functions: ExtensionFunctions) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn with_stylesheet_uri(mut self, uri: impl Into<String>) -> Self {
        self.stylesheet_uri = uri.into();
        self
    }
}

/// State owned by a single call.
#[derive(Debug, Clone, Default)]
pub struct TransformContext {
    pub collector: ErrorCollector,
    pub last_xml: Option<String>,
    pub last_xsl: Option<String>,
    pub stylesheet_uri: String,
}

#[cfg_attr(not(feature = "xslt"), allow(dead_code))]
impl TransformContext {
    fn new(stylesheet_uri: &str) -> Self {
        TransformContext {
            stylesheet_uri: stylesheet_uri.to_string(),
            ..Default::default()
        }
    }

    pub fn snapshot(&self) -> SourceSnapshot {
        SourceSnapshot {
            xml: self.last_xml.clone(),
            xsl: self.last_xsl.clone(),
            stylesheet_uri: self.stylesheet_uri.clone(),
        }
    }
}

/// What one call produced: an output, or the diagnostics explaining why there is none.
#[derive(Debug, Clone)]
pub struct TransformAttempt {
    pub output: Option<TransformOutput>,
    pub context: TransformContext,
}

impl TransformAttempt {
    #[cfg_attr(not(feature = "xslt"), allow(dead_code))]
    fn failed(context: TransformContext) -> Self {
        TransformAttempt {
            output: None,
            context,
        }
    }

    pub fn is_success(&self) -> bool {
        self.output.is_some() && !self.context.collector.has_errors()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.context.collector.all()
    }

    /// Turns the attempt into a result, locating the failure with `caller`'s help.
    pub fn into_result(self, caller: &CallerContext) -> Result<TransformOutput, TransformFailure> {
        let snapshot = self.context.snapshot();
        if let Some(failure) = classify(self.context.collector.all(), caller) {
            return Err(failure.with_snapshot(snapshot));
        }
        match self.output {
            Some(output) => Ok(output),
            None => {
                let missing =
                    Diagnostic::new(Phase::Processing, Level::Error, "transform produced no output");
                Err(TransformFailure {
                    primary: missing.clone(),
                    file: ResolvedFile::Unknown,
                    line: 0,
                    diagnostics: vec![missing],
                    snapshot,
                })
            }
        }
    }
}

/// Runs transforms with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct TransformEngine {
    config: EngineConfig,
}

impl TransformEngine {
    pub fn new(config: EngineConfig) -> Self {
        TransformEngine { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_transform_processor_available(&self) -> bool {
        is_transform_processor_available()
    }

    /// Transforms `request.xml` with `request.xsl`. Problems in either document are
    /// diagnostics in the returned attempt; only a missing processor is an `Err`.
    pub fn transform(&self, request: &TransformRequest) -> Result<TransformAttempt, EngineError> {
        if !is_transform_processor_available() {
            log::warn!("Transform requested but no XSLT processor is available");
            return Err(EngineError::ProcessorUnavailable);
        }
        self.run(request)
    }

    #[cfg(not(feature = "xslt"))]
    fn run(&self, _request: &TransformRequest) -> Result<TransformAttempt, EngineError> {
        Err(EngineError::ProcessorUnavailable)
    }

    #[cfg(feature = "xslt")]
    fn run(&self, request: &TransformRequest) -> Result<TransformAttempt, EngineError> {
        let uri = request.stylesheet_uri.as_str();
        let mut context = TransformContext::new(uri);
        let mut queue = ErrorQueue::new();
        context.last_xml = Some(request.xml.clone());
        context.last_xsl = Some(request.xsl.clone());

        log::debug!("Parsing XML input ({} bytes)", request.xml.len());
        let source = match parse_document(&request.xml) {
            Ok(doc) => Some(doc),
            Err(e) => {
                queue.push(ProcessorError::from_parse(&e, ""));
                None
            }
        };
        context.collector.record(&mut queue, Phase::Xml);
        let Some(source) = source else {
            return Ok(TransformAttempt::failed(context));
        };

        log::debug!("Parsing stylesheet '{}'", uri);
        let stylesheet = match parse_document(&request.xsl) {
            Ok(doc) => Some(doc),
            Err(e) => {
                queue.push(ProcessorError::from_parse(&e, uri));
                None
            }
        };
        context.collector.record(&mut queue, Phase::Xsl);
        let Some(stylesheet) = stylesheet else {
            return Ok(TransformAttempt::failed(context));
        };

        let mut processor = XsltProcessor::new()
            .with_strict(self.config.strict)
            .with_max_template_depth(self.config.max_template_depth);
        if let Some(functions) = &request.functions {
            processor.register_functions(functions.clone());
        }
        processor.set_parameters(request.parameters.clone());

        let imported = processor.import_stylesheet(&stylesheet, uri, &mut queue);
        context.collector.record(&mut queue, Phase::Xsl);
        if !imported {
            return Ok(TransformAttempt::failed(context));
        }

        log::debug!("Executing '{}' in {:?} mode", uri, request.output);
        let output = match request.output {
            OutputMode::Xml => processor
                .transform_to_xml(&source, &mut queue)
                .map(TransformOutput::Xml),
            OutputMode::Document => processor
                .transform_to_document(&source, &mut queue)
                .map(TransformOutput::Document),
        };
        context.collector.record(&mut queue, Phase::Processing);

        if context.collector.has_errors() {
            return Ok(TransformAttempt::failed(context));
        }
        Ok(TransformAttempt { output, context })
    }

    /// Re-indents XML text with the identity stylesheet, dropping whitespace-only text.
    /// Malformed input fails like any other transform, with `Xml` diagnostics.
    pub fn tidy(&self, xml: &str) -> Result<TransformAttempt, EngineError> {
        let request = TransformRequest::new(xml, TIDY_STYLESHEET)
            .with_output(OutputMode::Document)
            .with_stylesheet_uri("tidy.xsl");
        self.transform(&request)
    }

    /// `tidy` for a result tree, serialized as plain XML first.
    #[cfg(feature = "xslt")]
    pub fn tidy_document(&self, document: &ResultDocument) -> Result<TransformAttempt, EngineError> {
        if !is_transform_processor_available() {
            return Err(EngineError::ProcessorUnavailable);
        }
        let mut plain = document.clone();
        plain.output = OutputSettings {
            method: OutputMethod::Xml,
            method_explicit: true,
            ..Default::default()
        };
        self.tidy(&serialize(&plain)?)
    }
}
