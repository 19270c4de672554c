use std::fs;
use tempfile::TempDir;
use xslproc::{
    CallerContext, Diagnostic, DiagnosticRenderer, EngineConfig, Level, Phase, ResolvedFile,
    classify,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn stylesheet_lines(count: usize) -> String {
    (1..=count)
        .map(|n| format!("<!-- line {} -->", n))
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn excerpt_is_read_relative_to_the_workspace() -> TestResult {
    let workspace = TempDir::new()?;
    fs::create_dir(workspace.path().join("pages"))?;
    fs::write(workspace.path().join("pages/home.xsl"), stylesheet_lines(30))?;

    let diagnostics = vec![Diagnostic::new(
        Phase::Processing,
        Level::Error,
        "runtime error: file pages/home.xsl line 20 element xsl:value-of: boom",
    )];
    let failure = classify(&diagnostics, &CallerContext::default()).unwrap();
    assert_eq!(failure.file, ResolvedFile::Path("pages/home.xsl".into()));

    let config = EngineConfig::default()
        .with_workspace_root(workspace.path())
        .with_excerpt_window(3);
    let report = DiagnosticRenderer::new(config).render(&failure);
    let numbers: Vec<usize> = report.excerpt.iter().map(|l| l.number).collect();
    assert_eq!(numbers, (17..=23).collect::<Vec<_>>());
    assert!(report.excerpt[3].is_error);
    assert_eq!(report.excerpt[3].text, "<!-- line 20 -->");
    Ok(())
}

#[test]
fn unresolved_failure_still_renders() -> TestResult {
    let diagnostics = vec![Diagnostic::new(
        Phase::Processing,
        Level::Fatal,
        "the processor gave up",
    )];
    let failure = classify(&diagnostics, &CallerContext::default()).unwrap();
    assert!(!failure.is_resolved());

    let report = DiagnosticRenderer::new(EngineConfig::default()).render(&failure);
    assert!(report.excerpt.is_empty());
    assert_eq!(report.file, "");
    let html = report.to_html();
    assert!(html.contains("the processor gave up"));
    assert!(html.contains("<ul class=\"excerpt\"></ul>"));
    Ok(())
}

#[test]
fn custom_template_replaces_the_builtin_one() -> TestResult {
    let dir = TempDir::new()?;
    let template = dir.path().join("report.html");
    fs::write(&template, "<h1>{{title}}</h1><p>{{file}}:{{line}}</p>")?;

    let diagnostics = vec![
        Diagnostic::new(Phase::Xml, Level::Fatal, "unexpected end of stream").with_location("", 2),
    ];
    let failure = classify(&diagnostics, &CallerContext::default()).unwrap();
    let config = EngineConfig::default()
        .with_report_template(&template)
        .with_report_title("Broken page");
    let html = DiagnosticRenderer::new(config).render(&failure).to_html();
    assert_eq!(html, "<h1>Broken page</h1><p>XML:2</p>");
    Ok(())
}

#[test]
fn missing_template_falls_back_to_the_builtin_one() -> TestResult {
    let diagnostics = vec![Diagnostic::new(Phase::Xsl, Level::Error, "bad")];
    let failure = classify(&diagnostics, &CallerContext::default()).unwrap();
    let config = EngineConfig::default().with_report_template("/no/such/template.html");
    let html = DiagnosticRenderer::new(config).render(&failure).to_html();
    assert!(html.starts_with("<!DOCTYPE html>"));
    Ok(())
}

#[cfg(feature = "xslt")]
#[test]
fn xml_failure_report_shows_the_input() -> TestResult {
    use xslproc::{TransformEngine, TransformRequest};

    let xml = "<page>\n  <title>Home</title>\n  <body>\n</page>";
    let attempt = TransformEngine::default().transform(&TransformRequest::new(
        xml,
        r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform"/>"#,
    ))?;
    let failure = attempt.into_result(&CallerContext::default()).unwrap_err();
    let report = DiagnosticRenderer::new(EngineConfig::default()).render(&failure);

    assert_eq!(report.file, "XML");
    assert_eq!(report.excerpt.len(), 4);
    assert!(report.excerpt.iter().any(|l| l.is_error));
    assert!(report.to_html().contains("&lt;title&gt;Home&lt;/title&gt;"));
    Ok(())
}

#[test]
fn config_file_round_trip() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("engine.json");
    fs::write(&path, r#"{ "strict": false, "base_url": "https://cms.example" }"#)?;
    let config = EngineConfig::from_json_file(&path)?;
    assert!(!config.strict);
    assert_eq!(config.base_url, "https://cms.example");
    assert_eq!(config.excerpt_window, 11);
    Ok(())
}
