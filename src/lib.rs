//! XSLT 1.0 transformations with phase-tagged diagnostics.
//!
//! [`TransformEngine`] runs a transform and collects every diagnostic the XML parser, the
//! stylesheet compiler and the executor raise. A failed call is turned into a
//! [`TransformFailure`] by the [`locator`], which picks the diagnostic responsible and
//! where it points, and [`DiagnosticRenderer`] renders that as an HTML or plain-text report.

pub mod collector;
pub mod config;
pub mod diagnostic;
pub mod engine;
pub mod error;
pub mod locator;
pub mod params;
pub mod render;

pub use collector::ErrorCollector;
pub use config::{ConfigError, EngineConfig};
pub use diagnostic::{Diagnostic, Level, Phase};
pub use engine::{
    DEFAULT_STYLESHEET_URI, ExtensionFunctions, OutputMode, TIDY_STYLESHEET, TransformAttempt,
    TransformContext, TransformEngine, TransformOutput, TransformRequest,
    is_transform_processor_available,
};
pub use error::{EngineError, SourceSnapshot, TransformFailure};
pub use locator::{CallerContext, Resolution, ResolvedFile, classify, resolve};
pub use params::flatten_parameters;
pub use render::{DiagnosticRenderer, ErrorEntry, ExcerptLine, Report};

pub use xslproc_xpath1::{ExtensionValue, FunctionRegistry};

#[cfg(feature = "xslt")]
pub use xslproc_xslt::{OutputMethod, OutputSettings, ResultDocument, serialize};
