//! Turns a [`TransformFailure`] into a report for operators: the message and location, an
//! excerpt of the offending source, and the full diagnostic list.

use crate::config::EngineConfig;
use crate::error::TransformFailure;
use crate::locator::ResolvedFile;
use quick_xml::escape::escape;
use regex::Regex;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

const BUILTIN_TEMPLATE: &str = include_str!("../templates/report.html");

static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^:]+):").expect("BUG: invalid LABEL_RE regex literal"));

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{(\w+)\}\}").expect("BUG: invalid PLACEHOLDER_RE regex literal")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcerptLine {
    /// 1-based.
    pub number: usize,
    pub text: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEntry {
    /// `file:line`, with the workspace root stripped; `None` when the diagnostic has no file.
    pub location: Option<String>,
    pub message: String,
}

/// A rendered failure. `to_html` fills the report template; `Display` gives plain text.
#[derive(Debug, Clone)]
pub struct Report {
    pub url: String,
    pub title: String,
    pub message: String,
    pub file: String,
    pub line: usize,
    pub excerpt: Vec<ExcerptLine>,
    pub errors: Vec<ErrorEntry>,
    template: String,
}

pub struct DiagnosticRenderer {
    config: EngineConfig,
}

impl DiagnosticRenderer {
    pub fn new(config: EngineConfig) -> Self {
        DiagnosticRenderer { config }
    }

    pub fn render(&self, failure: &TransformFailure) -> Report {
        Report {
            url: self.config.base_url.clone(),
            title: self.config.report_title.clone(),
            message: failure.primary.message.clone(),
            file: failure.file.to_string(),
            line: failure.line,
            excerpt: self.excerpt(failure),
            errors: failure
                .diagnostics
                .iter()
                .map(|d| ErrorEntry {
                    location: d
                        .has_file()
                        .then(|| format!("{}:{}", self.strip_workspace_root(&d.file), d.line)),
                    message: d.message.clone(),
                })
                .collect(),
            template: self.load_template(),
        }
    }

    /// The lines around the failure: `excerpt_window` before, the error line, and
    /// `excerpt_window` after. Empty when the line is unknown or the source unreadable.
    pub fn excerpt(&self, failure: &TransformFailure) -> Vec<ExcerptLine> {
        if failure.line == 0 {
            return Vec::new();
        }
        let Some(source) = self.excerpt_source(failure) else {
            return Vec::new();
        };
        let window = self.config.excerpt_window;
        let start = failure.line.saturating_sub(window.saturating_add(1));
        let end = failure.line.saturating_add(window);
        source
            .lines()
            .enumerate()
            .skip(start)
            .take(end - start)
            .map(|(index, text)| ExcerptLine {
                number: index + 1,
                text: text.to_string(),
                is_error: index + 1 == failure.line,
            })
            .collect()
    }

    fn excerpt_source(&self, failure: &TransformFailure) -> Option<String> {
        let snapshot = &failure.snapshot;
        match &failure.file {
            ResolvedFile::XmlDocument => snapshot.xml.clone(),
            ResolvedFile::Path(path) if *path == snapshot.stylesheet_uri && snapshot.xsl.is_some() => {
                snapshot.xsl.clone()
            }
            ResolvedFile::Path(path) => {
                let mut on_disk = PathBuf::from(path);
                if on_disk.is_relative()
                    && let Some(root) = &self.config.workspace_root
                {
                    on_disk = root.join(on_disk);
                }
                match std::fs::read_to_string(&on_disk) {
                    Ok(text) => Some(text),
                    Err(e) => {
                        log::debug!("No excerpt for {}: {}", on_disk.display(), e);
                        None
                    }
                }
            }
            ResolvedFile::Unknown => None,
        }
    }

    fn strip_workspace_root(&self, file: &str) -> String {
        match &self.config.workspace_root {
            Some(root) => file.replace(&format!("{}/", root.display()), ""),
            None => file.to_string(),
        }
    }

    fn load_template(&self) -> String {
        let Some(path) = &self.config.report_template else {
            return BUILTIN_TEMPLATE.to_string();
        };
        std::fs::read_to_string(path).unwrap_or_else(|e| {
            log::warn!(
                "Report template {} unreadable ({}); using the built-in one",
                path.display(),
                e
            );
            BUILTIN_TEMPLATE.to_string()
        })
    }
}

fn highlight_labels(escaped: &str) -> String {
    LABEL_RE
        .replace_all(escaped, r#"<span class="important">${1}:</span>"#)
        .into_owned()
}

/// Plain-text counterpart of `highlight_labels`: `text:` becomes `*text:*`.
fn mark_labels(text: &str) -> String {
    LABEL_RE.replace_all(text, "*${1}:*").into_owned()
}

fn odd_class(odd: bool) -> &'static str {
    if odd { " class=\"odd\"" } else { "" }
}

impl Report {
    /// A tab-indented plain rendition, embedded in the HTML report as `{{markdown}}`.
    pub fn markdown(&self) -> String {
        let mut out = format!("\t{}\n\t{} line {}\n\n", self.message, self.file, self.line);
        for line in &self.excerpt {
            out.push_str(&format!("\t{}\t{}\n", line.number, line.text));
        }
        out
    }

    pub fn lines_html(&self) -> String {
        let mut html = String::new();
        for (i, line) in self.excerpt.iter().enumerate() {
            let text = if line.text.trim().is_empty() {
                line.text.clone()
            } else {
                format!("\t{}", line.text)
            };
            html.push_str(&format!(
                "<li{}{}><strong>{}:</strong> <code>{}</code></li>",
                odd_class(i % 2 == 0),
                if line.is_error { " id=\"error\"" } else { "" },
                line.number,
                escape(text.as_str()).replace('\t', "&nbsp;&nbsp;&nbsp;&nbsp;"),
            ));
        }
        html
    }

    pub fn errors_html(&self) -> String {
        let mut html = String::new();
        for (i, entry) in self.errors.iter().enumerate() {
            let location = entry
                .location
                .as_deref()
                .map(|loc| format!("<span class=\"important\">[{}]</span> ", escape(loc)))
                .unwrap_or_default();
            html.push_str(&format!(
                "<li{}><code>{}{}</code></li>",
                odd_class(i % 2 == 0),
                location,
                highlight_labels(&escape(entry.message.as_str())),
            ));
        }
        html
    }

    /// Fills the template in one pass, so placeholder text inside a filled value stays literal.
    /// Unknown placeholders are left untouched.
    pub fn to_html(&self) -> String {
        PLACEHOLDER_RE
            .replace_all(&self.template, |caps: &regex::Captures<'_>| match &caps[1] {
                "url" => escape(self.url.as_str()).into_owned(),
                "title" => escape(self.title.as_str()).into_owned(),
                "message" => escape(self.message.as_str()).into_owned(),
                "line" => self.line.to_string(),
                "file" => escape(self.file.as_str()).into_owned(),
                "markdown" => escape(self.markdown().as_str()).into_owned(),
                "lines" => self.lines_html(),
                "processing_errors" => self.errors_html(),
                _ => caps[0].to_string(),
            })
            .into_owned()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", self.message)?;
        if !self.file.is_empty() {
            writeln!(f, "  in {} line {}", self.file, self.line)?;
        }
        if !self.excerpt.is_empty() {
            writeln!(f)?;
            for line in &self.excerpt {
                let marker = if line.is_error { '>' } else { ' ' };
                writeln!(f, "{} {:>5} | {}", marker, line.number, line.text)?;
            }
        }
        if !self.errors.is_empty() {
            writeln!(f)?;
            writeln!(f, "Diagnostics:")?;
            for entry in &self.errors {
                match &entry.location {
                    Some(location) => {
                        writeln!(f, "  [{}] {}", location, mark_labels(&entry.message))?
                    }
                    None => writeln!(f, "  {}", mark_labels(&entry.message))?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{Diagnostic, Level, Phase};
    use crate::error::SourceSnapshot;

    fn failure(file: ResolvedFile, line: usize, xml: &str) -> TransformFailure {
        let primary = Diagnostic::new(Phase::Xml, Level::Fatal, "tag mismatch: expected b")
            .with_location("", line);
        TransformFailure {
            primary: primary.clone(),
            file,
            line,
            diagnostics: vec![primary],
            snapshot: SourceSnapshot {
                xml: Some(xml.to_string()),
                xsl: Some("<xsl:stylesheet/>".to_string()),
                stylesheet_uri: "stylesheet.xsl".to_string(),
            },
        }
    }

    fn numbered(count: usize) -> String {
        (1..=count).map(|n| format!("line {}", n)).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn excerpt_is_centred_on_the_error_line() {
        let renderer = DiagnosticRenderer::new(EngineConfig::default().with_excerpt_window(2));
        let excerpt = renderer.excerpt(&failure(ResolvedFile::XmlDocument, 5, &numbered(10)));
        let numbers: Vec<usize> = excerpt.iter().map(|l| l.number).collect();
        assert_eq!(numbers, vec![3, 4, 5, 6, 7]);
        assert!(excerpt[2].is_error);
        assert_eq!(excerpt[2].text, "line 5");
    }

    #[test]
    fn excerpt_is_clamped_at_the_edges() {
        let renderer = DiagnosticRenderer::new(EngineConfig::default());
        let excerpt = renderer.excerpt(&failure(ResolvedFile::XmlDocument, 1, &numbered(3)));
        assert_eq!(excerpt.len(), 3);
        assert!(excerpt[0].is_error);
    }

    #[test]
    fn stylesheet_uri_uses_the_last_xsl() {
        let renderer = DiagnosticRenderer::new(EngineConfig::default());
        let excerpt =
            renderer.excerpt(&failure(ResolvedFile::Path("stylesheet.xsl".into()), 1, "<a/>"));
        assert_eq!(excerpt[0].text, "<xsl:stylesheet/>");
    }

    #[test]
    fn unknown_location_has_no_excerpt() {
        let renderer = DiagnosticRenderer::new(EngineConfig::default());
        assert!(renderer.excerpt(&failure(ResolvedFile::Unknown, 3, "x")).is_empty());
        assert!(renderer.excerpt(&failure(ResolvedFile::XmlDocument, 0, "x")).is_empty());
        let missing = ResolvedFile::Path("/definitely/not/here.xsl".into());
        assert!(renderer.excerpt(&failure(missing, 2, "x")).is_empty());
    }

    #[test]
    fn html_rows_escape_and_indent() {
        let renderer = DiagnosticRenderer::new(EngineConfig::default().with_excerpt_window(1));
        let report = renderer.render(&failure(ResolvedFile::XmlDocument, 2, "<a>\n\t<b>\n"));
        assert_eq!(
            report.lines_html(),
            "<li class=\"odd\"><strong>1:</strong> <code>&nbsp;&nbsp;&nbsp;&nbsp;&lt;a&gt;</code></li>\
             <li id=\"error\"><strong>2:</strong> <code>&nbsp;&nbsp;&nbsp;&nbsp;&nbsp;&nbsp;&nbsp;&nbsp;&lt;b&gt;</code></li>"
        );
    }

    #[test]
    fn error_list_strips_the_workspace_and_highlights_labels() {
        let renderer =
            DiagnosticRenderer::new(EngineConfig::default().with_workspace_root("/srv/workspace"));
        let diagnostic = Diagnostic::new(Phase::Xsl, Level::Error, "element xsl:foo: not <allowed>")
            .with_location("/srv/workspace/pages/home.xsl", 7);
        let mut failed = failure(ResolvedFile::Path("pages/home.xsl".into()), 7, "");
        failed.diagnostics = vec![diagnostic];
        let report = renderer.render(&failed);
        assert_eq!(report.errors[0].location.as_deref(), Some("pages/home.xsl:7"));
        assert_eq!(
            report.errors_html(),
            "<li class=\"odd\"><code><span class=\"important\">[pages/home.xsl:7]</span> \
             <span class=\"important\">element xsl:</span><span class=\"important\">foo:</span> \
             not &lt;allowed&gt;</code></li>"
        );
    }

    #[test]
    fn template_placeholders_are_filled() {
        let renderer = DiagnosticRenderer::new(
            EngineConfig::default().with_base_url("https://cms.example"),
        );
        let html = renderer.render(&failure(ResolvedFile::XmlDocument, 1, "<a>")).to_html();
        assert!(html.contains("<title>XSLT Processing Error</title>"));
        assert!(html.contains("https://cms.example"));
        assert!(html.contains("tag mismatch: expected b"));
        assert!(html.contains("<code>XML</code>"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn plain_text_marks_the_error_line() {
        let renderer = DiagnosticRenderer::new(EngineConfig::default().with_excerpt_window(0));
        let text = renderer.render(&failure(ResolvedFile::XmlDocument, 2, "a\nb")).to_string();
        assert!(text.contains(">     2 | b"));
        assert!(text.contains("  in XML line 2"));
    }

    #[test]
    fn huge_line_numbers_do_not_overflow() {
        use crate::locator::{CallerContext, classify};

        let diagnostics = vec![Diagnostic::new(
            Phase::Processing,
            Level::Error,
            format!("runtime error: file pages/home.xsl line {} element xsl:if: boom", usize::MAX),
        )];
        let failed = classify(&diagnostics, &CallerContext::default())
            .unwrap()
            .with_snapshot(SourceSnapshot {
                xml: None,
                xsl: Some(numbered(3)),
                stylesheet_uri: "pages/home.xsl".to_string(),
            });
        assert_eq!(failed.line, usize::MAX);
        let report = DiagnosticRenderer::new(EngineConfig::default()).render(&failed);
        assert!(report.excerpt.is_empty());

        let in_memory = failure(ResolvedFile::XmlDocument, usize::MAX, &numbered(3));
        assert!(DiagnosticRenderer::new(EngineConfig::default()).excerpt(&in_memory).is_empty());
    }

    #[test]
    fn huge_excerpt_window_shows_the_whole_source() {
        let config =
            EngineConfig::from_json_str(&format!(r#"{{ "excerpt_window": {} }}"#, usize::MAX))
                .unwrap();
        let renderer = DiagnosticRenderer::new(config);
        let report = renderer.render(&failure(ResolvedFile::XmlDocument, 2, &numbered(4)));
        assert_eq!(report.excerpt.len(), 4);
        assert!(report.excerpt[1].is_error);
    }

    #[test]
    fn placeholders_inside_values_stay_literal() {
        let renderer = DiagnosticRenderer::new(EngineConfig::default().with_excerpt_window(0));
        let mut failed = failure(ResolvedFile::XmlDocument, 1, "<a>");
        failed.primary.message = "bad {{lines}} and {{processing_errors}}".to_string();
        let mut report = renderer.render(&failed);
        report.template = "{{message}}|{{lines}}|{{unknown}}".to_string();
        assert_eq!(
            report.to_html(),
            "bad {{lines}} and {{processing_errors}}|\
             <li class=\"odd\" id=\"error\"><strong>1:</strong> <code>&nbsp;&nbsp;&nbsp;&nbsp;&lt;a&gt;</code></li>|\
             {{unknown}}"
        );
    }

    #[test]
    fn plain_text_marks_message_labels() {
        let renderer = DiagnosticRenderer::new(EngineConfig::default());
        let text = renderer.render(&failure(ResolvedFile::XmlDocument, 1, "<a>")).to_string();
        assert!(text.contains("  *tag mismatch:* expected b"));
    }
}
