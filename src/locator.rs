//! Works out which file and line a failed transform most likely points at.
//!
//! Processors report locations in several shapes: structured fields on parse and compile
//! errors, and free text on runtime errors. The matchers below are tried in order and the
//! first one that resolves wins.

use crate::diagnostic::{Diagnostic, Phase};
use crate::error::{SourceSnapshot, TransformFailure};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static STYLESHEET_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(/?[^/\s]+/.+\.xsl) line (\d+)")
        .expect("BUG: invalid STYLESHEET_PATH_RE regex literal")
});

static IDENTIFIER_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([^:]+): (.+) line (\d+)")
        .expect("BUG: invalid IDENTIFIER_LINE_RE regex literal")
});

/// Where a failure was located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedFile {
    /// The in-memory XML input of the call.
    XmlDocument,
    Path(String),
    Unknown,
}

impl fmt::Display for ResolvedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedFile::XmlDocument => f.write_str("XML"),
            ResolvedFile::Path(path) => f.write_str(path),
            ResolvedFile::Unknown => Ok(()),
        }
    }
}

/// What the caller knows that the diagnostics do not.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    /// The template file being rendered, used when a message names a line but no file.
    pub active_template: Option<String>,
}

impl CallerContext {
    pub fn with_active_template(template: impl Into<String>) -> Self {
        CallerContext {
            active_template: Some(template.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Index of the primary diagnostic.
    pub primary: usize,
    pub file: ResolvedFile,
    pub line: usize,
}

/// Rule 1: the first XML diagnostic points at the XML input.
pub fn match_xml_phase(diagnostics: &[Diagnostic]) -> Option<Resolution> {
    let (index, diagnostic) = diagnostics
        .iter()
        .enumerate()
        .find(|(_, d)| d.phase == Phase::Xml)?;
    Some(Resolution {
        primary: index,
        file: ResolvedFile::XmlDocument,
        line: diagnostic.line,
    })
}

/// Rule 2: the first diagnostic that carries a file of its own.
pub fn match_structured_file(diagnostics: &[Diagnostic]) -> Option<Resolution> {
    let (index, diagnostic) = diagnostics.iter().enumerate().find(|(_, d)| d.has_file())?;
    Some(Resolution {
        primary: index,
        file: ResolvedFile::Path(diagnostic.file.clone()),
        line: diagnostic.line,
    })
}

/// Rule 3: a message naming a stylesheet path with a directory and a line.
pub fn match_stylesheet_path(diagnostics: &[Diagnostic]) -> Option<Resolution> {
    diagnostics.iter().enumerate().find_map(|(index, d)| {
        let captures = STYLESHEET_PATH_RE.captures(&d.message)?;
        let line = captures[2].parse().ok()?;
        Some(Resolution {
            primary: index,
            file: ResolvedFile::Path(captures[1].to_string()),
            line,
        })
    })
}

/// Rule 4: a message of the form `identifier: text line N`. The file is the caller's
/// active template.
pub fn match_identifier_line(
    diagnostics: &[Diagnostic],
    context: &CallerContext,
) -> Option<Resolution> {
    diagnostics.iter().enumerate().find_map(|(index, d)| {
        let captures = IDENTIFIER_LINE_RE.captures(&d.message)?;
        let line = captures[3].parse().ok()?;
        Some(Resolution {
            primary: index,
            file: context
                .active_template
                .clone()
                .map_or(ResolvedFile::Unknown, ResolvedFile::Path),
            line,
        })
    })
}

/// Runs the matchers in priority order. An unresolved failure points at the first
/// diagnostic with an unknown file and line 0.
pub fn resolve(diagnostics: &[Diagnostic], context: &CallerContext) -> Option<Resolution> {
    if diagnostics.is_empty() {
        return None;
    }
    let resolution = match_xml_phase(diagnostics)
        .or_else(|| match_structured_file(diagnostics))
        .or_else(|| match_stylesheet_path(diagnostics))
        .or_else(|| match_identifier_line(diagnostics, context))
        .unwrap_or(Resolution {
            primary: 0,
            file: ResolvedFile::Unknown,
            line: 0,
        });
    log::debug!(
        "Resolved {} diagnostic(s) to '{}' line {}",
        diagnostics.len(),
        resolution.file,
        resolution.line
    );
    Some(resolution)
}

/// Builds the failure for a non-empty diagnostic list; `None` when there is nothing to report.
pub fn classify(diagnostics: &[Diagnostic], context: &CallerContext) -> Option<TransformFailure> {
    let resolution = resolve(diagnostics, context)?;
    Some(TransformFailure {
        primary: diagnostics[resolution.primary].clone(),
        file: resolution.file,
        line: resolution.line,
        diagnostics: diagnostics.to_vec(),
        snapshot: SourceSnapshot::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Level;

    fn diag(phase: Phase, message: &str, file: &str, line: usize) -> Diagnostic {
        Diagnostic::new(phase, Level::Error, message).with_location(file, line)
    }

    #[test]
    fn xml_phase_wins_over_everything() {
        let diagnostics = vec![
            diag(Phase::Xsl, "compile", "a.xsl", 9),
            diag(Phase::Xml, "unclosed", "", 3),
        ];
        let resolution = resolve(&diagnostics, &CallerContext::default()).unwrap();
        assert_eq!(resolution.file, ResolvedFile::XmlDocument);
        assert_eq!(resolution.line, 3);
        assert_eq!(resolution.primary, 1);
    }

    #[test]
    fn structured_file_skips_blank_files() {
        let diagnostics = vec![
            diag(Phase::Processing, "no file", "  ", 1),
            diag(Phase::Xsl, "bad", "pages/home.xsl", 12),
        ];
        let resolution = match_structured_file(&diagnostics).unwrap();
        assert_eq!(resolution.file, ResolvedFile::Path("pages/home.xsl".into()));
        assert_eq!(resolution.line, 12);
    }

    #[test]
    fn stylesheet_path_needs_a_directory() {
        let with_dir = vec![diag(
            Phase::Processing,
            "runtime error: file /workspace/pages/home.xsl line 14 element value-of",
            "",
            0,
        )];
        let resolution = match_stylesheet_path(&with_dir).unwrap();
        assert_eq!(resolution.file, ResolvedFile::Path("/workspace/pages/home.xsl".into()));
        assert_eq!(resolution.line, 14);

        let bare = vec![diag(Phase::Processing, "file home.xsl line 2", "", 0)];
        assert!(match_stylesheet_path(&bare).is_none());
    }

    #[test]
    fn stylesheet_path_is_case_insensitive() {
        let diagnostics = vec![diag(Phase::Processing, "in pages/Home.XSL LINE 7", "", 0)];
        let resolution = match_stylesheet_path(&diagnostics).unwrap();
        assert_eq!(resolution.file, ResolvedFile::Path("pages/Home.XSL".into()));
        assert_eq!(resolution.line, 7);
    }

    #[test]
    fn identifier_line_uses_the_active_template() {
        let diagnostics = vec![diag(
            Phase::Processing,
            "runtime error: file stylesheet.xsl line 5 element value-of: boom",
            "",
            0,
        )];
        let context = CallerContext::with_active_template("views/home.xsl");
        let resolution = match_identifier_line(&diagnostics, &context).unwrap();
        assert_eq!(resolution.file, ResolvedFile::Path("views/home.xsl".into()));
        assert_eq!(resolution.line, 5);

        let unknown = match_identifier_line(&diagnostics, &CallerContext::default()).unwrap();
        assert_eq!(unknown.file, ResolvedFile::Unknown);
    }

    #[test]
    fn unmatched_diagnostics_are_unresolved() {
        let diagnostics = vec![diag(Phase::Processing, "something odd", "", 0)];
        let failure = classify(&diagnostics, &CallerContext::default()).unwrap();
        assert_eq!(failure.file, ResolvedFile::Unknown);
        assert_eq!(failure.line, 0);
        assert_eq!(failure.primary.message, "something odd");
    }

    #[test]
    fn empty_list_has_no_failure() {
        assert!(classify(&[], &CallerContext::default()).is_none());
    }
}
