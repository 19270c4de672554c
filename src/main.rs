use clap::{Parser, Subcommand};
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use xslproc::{
    CallerContext, DiagnosticRenderer, EngineConfig, EngineError, OutputMode,
    TransformEngine, TransformFailure, TransformRequest, flatten_parameters,
    is_transform_processor_available,
};

#[derive(Parser, Debug)]
#[command(name = "xslproc", version, about = "Run XSLT 1.0 transforms and report their errors")]
struct Args {
    /// JSON engine configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transform an XML file with a stylesheet and print the result
    Transform {
        xml: PathBuf,
        xsl: PathBuf,

        /// A stylesheet parameter, as name=value
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// A JSON file of parameters; nested keys are joined with '-'
        #[arg(long)]
        params_json: Option<PathBuf>,

        /// Build the result tree and serialize it afterwards
        #[arg(long, default_value_t = false)]
        document: bool,

        /// Name used for the stylesheet in diagnostics (defaults to the XSL path)
        #[arg(long)]
        stylesheet_uri: Option<String>,

        /// Template the caller was rendering, for locating errors without a file
        #[arg(long)]
        active_template: Option<String>,

        /// Write an HTML error report here when the transform fails
        #[arg(long)]
        report: Option<PathBuf>,

        /// Print the collected diagnostics as JSON on failure
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Re-indent an XML file
    Tidy { xml: PathBuf },
    /// Report whether this build can transform
    Probe,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))
}

fn main() -> ExitCode {
    if env::var("RUST_LOG").is_err() {
        unsafe {
            env::set_var("RUST_LOG", "xslproc=warn");
        }
    }
    env_logger::init();

    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("xslproc: {}", e);
            ExitCode::from(2)
        }
    }
}

fn run(args: Args) -> Result<ExitCode, EngineError> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let engine = TransformEngine::new(config.clone());

    match args.command {
        Command::Probe => {
            let available = is_transform_processor_available();
            println!("{}", if available { "available" } else { "unavailable" });
            Ok(if available { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::Tidy { xml } => {
            let attempt = engine.tidy(&fs::read_to_string(&xml)?)?;
            finish(&config, attempt.into_result(&CallerContext::default()), None, false)
        }
        Command::Transform {
            xml,
            xsl,
            params,
            params_json,
            document,
            stylesheet_uri,
            active_template,
            report,
            json,
        } => {
            let mut parameters: HashMap<String, String> = HashMap::new();
            if let Some(path) = params_json {
                let data: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
                parameters.extend(flatten_parameters(data));
            }
            parameters.extend(params);

            let uri = stylesheet_uri.unwrap_or_else(|| xsl.display().to_string());
            let request = TransformRequest::new(fs::read_to_string(&xml)?, fs::read_to_string(&xsl)?)
                .with_output(if document { OutputMode::Document } else { OutputMode::Xml })
                .with_parameters(parameters)
                .with_stylesheet_uri(uri);

            let caller = match active_template {
                Some(template) => CallerContext::with_active_template(template),
                None => CallerContext::default(),
            };
            let attempt = engine.transform(&request)?;
            finish(&config, attempt.into_result(&caller), report.as_deref(), json)
        }
    }
}

fn finish(
    config: &EngineConfig,
    result: Result<xslproc::TransformOutput, TransformFailure>,
    report_path: Option<&Path>,
    json: bool,
) -> Result<ExitCode, EngineError> {
    let failure = match result {
        Ok(output) => {
            print!("{}", output.to_text()?);
            return Ok(ExitCode::SUCCESS);
        }
        Err(failure) => failure,
    };

    let report = DiagnosticRenderer::new(config.clone()).render(&failure);
    if json {
        println!("{}", serde_json::to_string_pretty(&failure.diagnostics)?);
    } else {
        eprint!("{}", report);
    }
    if let Some(path) = report_path {
        fs::write(path, report.to_html())?;
        log::info!("Wrote error report to {}", path.display());
    }
    Ok(ExitCode::FAILURE)
}
