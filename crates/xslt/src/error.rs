use thiserror::Error;
use xslproc_xpath1::XPathError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub col: usize,
}

impl Location {
    /// The position of a byte offset within a parsed document.
    pub fn at(doc: &roxmltree::Document, pos: usize) -> Self {
        let text_pos = doc.text_pos_at(pos);
        Location {
            line: text_pos.row as usize,
            col: text_pos.col as usize,
        }
    }

    pub fn of(node: roxmltree::Node) -> Self {
        Self::at(node.document(), node.range().start)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.col)
    }
}

impl From<(usize, usize)> for Location {
    fn from((line, col): (usize, usize)) -> Self {
        Location { line, col }
    }
}

/// Severity of a pending processor error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Warning,
    Error,
    Fatal,
}

/// One error raised by the parser, compiler or executor, waiting to be collected.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorError {
    pub message: String,
    /// The stylesheet URI for compile errors; empty when the error has no source file.
    pub file: String,
    /// 1-based, 0 when unknown.
    pub line: usize,
    pub level: Level,
}

impl ProcessorError {
    /// A well-formedness error reported by the XML parser.
    pub fn from_parse(err: &roxmltree::Error, file: &str) -> Self {
        ProcessorError {
            message: err.to_string(),
            file: file.to_string(),
            line: err.pos().row as usize,
            level: Level::Fatal,
        }
    }

    /// A failure during execution. The location lives in the message text only.
    pub fn from_execution(err: &ExecutionError, stylesheet_uri: &str) -> Self {
        let level = if err.is_terminated() {
            Level::Fatal
        } else {
            Level::Error
        };
        let (line, message) = match err {
            ExecutionError::At {
                line,
                element,
                source,
            } => (
                *line,
                format!(
                    "runtime error: file {} line {} element {}: {}",
                    stylesheet_uri, line, element, source
                ),
            ),
            other => (0, format!("runtime error: file {}: {}", stylesheet_uri, other)),
        };
        ProcessorError {
            message,
            file: String::new(),
            line,
            level,
        }
    }
}

/// The pending-error accumulator threaded through every processing phase.
///
/// Producers push into it; the caller drains it after each phase so that no error is
/// ever reported twice.
#[derive(Debug, Default)]
pub struct ErrorQueue {
    pending: Vec<ProcessorError>,
}

impl ErrorQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ProcessorError) {
        log::debug!("queued {:?} at line {}: {}", error.level, error.line, error.message);
        self.pending.push(error);
    }

    pub fn report(&mut self, level: Level, message: impl Into<String>, file: &str, line: usize) {
        self.push(ProcessorError {
            message: message.into(),
            file: file.to_string(),
            line,
            level,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessorError> {
        self.pending.iter()
    }

    /// Takes every pending error, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<ProcessorError> {
        std::mem::take(&mut self.pending)
    }
}

#[derive(Error, Debug)]
pub enum XsltError {
    #[error("XML parsing error: {0}")]
    XmlParse(#[from] roxmltree::Error),

    #[error("Quick-XML error: {0}")]
    QuickXml(#[from] quick_xml::Error),

    #[error("XPath error: {0}")]
    XPath(#[from] XPathError),

    #[error("Template structure error at {location}: {message}")]
    TemplateStructure { message: String, location: Location },

    #[error("Unsupported pattern '{0}': {1}")]
    Pattern(String, String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 encoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("{0}")]
    XPath(#[from] XPathError),

    #[error("no template named '{0}'")]
    UnknownTemplate(String),

    #[error("attribute set '{0}' is not defined")]
    UnknownAttributeSet(String),

    #[error("template recursion exceeded {0} levels")]
    RecursionLimit(usize),

    #[error("terminated by xsl:message: {0}")]
    Terminated(String),

    #[error("'{0}' is not a valid name")]
    InvalidName(String),

    #[error("line {line} element {element}: {source}")]
    At {
        line: usize,
        element: String,
        #[source]
        source: Box<ExecutionError>,
    },
}

impl ExecutionError {
    /// Attaches the innermost instruction location; an already located error is kept as is.
    pub fn at(self, line: usize, element: &str) -> Self {
        match self {
            located @ ExecutionError::At { .. } => located,
            other => ExecutionError::At {
                line,
                element: element.to_string(),
                source: Box::new(other),
            },
        }
    }

    pub fn is_terminated(&self) -> bool {
        match self {
            ExecutionError::Terminated(_) => true,
            ExecutionError::At { source, .. } => source.is_terminated(),
            _ => false,
        }
    }
}
