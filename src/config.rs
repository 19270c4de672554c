use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Settings shared by the engine and the diagnostic renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Undeclared variables are errors; undeclared `call-template` parameters are logged.
    pub strict: bool,

    /// Lines shown on each side of the error line in a report excerpt.
    ///
    /// Defaults to `11`.
    pub excerpt_window: usize,

    /// Nesting depth at which template recursion is reported as a processing error.
    ///
    /// Defaults to `500`.
    pub max_template_depth: usize,

    /// Stripped from file paths in the diagnostic list; relative excerpt paths resolve
    /// against it.
    pub workspace_root: Option<PathBuf>,

    /// Substituted for `{{url}}` in the HTML report.
    pub base_url: String,

    pub report_title: String,

    /// An HTML template replacing the built-in report template.
    pub report_template: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict: true,
            excerpt_window: 11,
            max_template_depth: 500,
            workspace_root: None,
            base_url: String::new(),
            report_title: "XSLT Processing Error".to_string(),
            report_template: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("Loading engine configuration from {}", path.display());
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_template_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_template_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_strict(mut self, strict: bool) -> Self { self.strict = strict; self }

    pub fn with_excerpt_window(mut self, window: usize) -> Self { self.excerpt_window = window; self }

    pub fn with_max_template_depth(mut self, depth: usize) -> Self { self.max_template_depth = depth; self }

    pub fn with_workspace_root<P: Into<PathBuf>>(mut self, root: P) -> Self { self.workspace_root = Some(root.into()); self }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self { self.base_url = url.into(); self }

    pub fn with_report_title(mut self, title: impl Into<String>) -> Self { self.report_title = title.into(); self }

    pub fn with_report_template<P: Into<PathBuf>>(mut self, path: P) -> Self { self.report_template = Some(path.into()); self }
}
