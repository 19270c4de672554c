//! The structured diagnostic recorded for every problem met during a transform.

use serde::Serialize;
use std::fmt;

/// The processing phase a diagnostic was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Parsing the XML input.
    Xml,
    /// Parsing or importing the stylesheet.
    Xsl,
    /// Executing the transform.
    Processing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Xml => "XML",
            Phase::Xsl => "XSL",
            Phase::Processing => "Processing",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Warning,
    Error,
    Fatal,
}

#[cfg(feature = "xslt")]
impl From<xslproc_xslt::Level> for Level {
    fn from(level: xslproc_xslt::Level) -> Self {
        match level {
            xslproc_xslt::Level::Warning => Level::Warning,
            xslproc_xslt::Level::Error => Level::Error,
            xslproc_xslt::Level::Fatal => Level::Fatal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub phase: Phase,
    pub message: String,
    /// Possibly empty; runtime errors name their file inside `message` instead.
    pub file: String,
    /// 1-based; 0 when unknown.
    pub line: usize,
    pub level: Level,
}

impl Diagnostic {
    pub fn new(phase: Phase, level: Level, message: impl Into<String>) -> Self {
        Diagnostic {
            phase,
            message: message.into(),
            file: String::new(),
            line: 0,
            level,
        }
    }

    pub fn with_location(mut self, file: impl Into<String>, line: usize) -> Self {
        self.file = file.into();
        self.line = line;
        self
    }

    pub fn has_file(&self) -> bool {
        !self.file.trim().is_empty()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_file() {
            write!(f, "[{}:{}] ", self.file, self.line)?;
        }
        write!(f, "{} {:?}: {}", self.phase, self.level, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_location_only_when_known() {
        let located = Diagnostic::new(Phase::Xsl, Level::Error, "bad").with_location("a.xsl", 4);
        assert_eq!(located.to_string(), "[a.xsl:4] XSL Error: bad");
        let bare = Diagnostic::new(Phase::Processing, Level::Fatal, "stop");
        assert_eq!(bare.to_string(), "Processing Fatal: stop");
    }

    #[test]
    fn whitespace_file_is_not_a_file() {
        let d = Diagnostic::new(Phase::Xml, Level::Error, "x").with_location("  ", 1);
        assert!(!d.has_file());
    }

    #[test]
    fn serializes_in_lowercase() {
        let d = Diagnostic::new(Phase::Xml, Level::Fatal, "m").with_location("", 2);
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["phase"], "xml");
        assert_eq!(json["level"], "fatal");
        assert_eq!(json["line"], 2);
    }
}
