use crate::config::ConfigError;
use crate::diagnostic::Diagnostic;
use crate::locator::ResolvedFile;
use thiserror::Error;

/// Errors of the engine itself. Problems in the XML or the stylesheet are never reported
/// here; they are diagnostics.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no XSLT processor is available in this build")]
    ProcessorUnavailable,

    #[cfg(feature = "xslt")]
    #[error("Serialization failed: {0}")]
    Serialize(#[from] xslproc_xslt::XsltError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// The payloads a failed call worked on, kept for excerpt rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub xml: Option<String>,
    pub xsl: Option<String>,
    pub stylesheet_uri: String,
}

/// A failed transform: the diagnostic judged responsible, where it points, and everything
/// else that was collected.
#[derive(Error, Debug, Clone)]
#[error("{}", .primary.message)]
pub struct TransformFailure {
    pub primary: Diagnostic,
    pub file: ResolvedFile,
    /// 1-based; 0 when unknown.
    pub line: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub snapshot: SourceSnapshot,
}

impl TransformFailure {
    pub fn with_snapshot(mut self, snapshot: SourceSnapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.file != ResolvedFile::Unknown
    }
}
