//! Defines the registry and built-in implementations for XPath 1.0 functions, plus the XSLT
//! additions (`current`, `key`, `generate-id`, `format-number` and friends).

use super::engine::{EvaluationContext, XPathValue};
use crate::datasource::{DataSourceNode, NodeType};
use crate::error::XPathError;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";

/// A value crossing the boundary into or out of a caller-supplied extension function.
/// Node-sets are passed as the string values of their nodes, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionValue {
    String(String),
    Number(f64),
    Boolean(bool),
    NodeSet(Vec<String>),
}

pub type ExtensionFn =
    Arc<dyn Fn(&[ExtensionValue]) -> Result<ExtensionValue, String> + Send + Sync>;

const BUILTINS: &[&str] = &[
    "last",
    "position",
    "count",
    "id",
    "local-name",
    "namespace-uri",
    "name",
    "string",
    "concat",
    "starts-with",
    "contains",
    "substring-before",
    "substring-after",
    "substring",
    "string-length",
    "normalize-space",
    "translate",
    "boolean",
    "not",
    "true",
    "false",
    "lang",
    "number",
    "sum",
    "floor",
    "ceiling",
    "round",
    "current",
    "key",
    "generate-id",
    "format-number",
    "system-property",
    "function-available",
    "element-available",
];

/// Extension functions callable from expressions, and the instruction names reported by
/// `element-available()`.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    extensions: HashMap<String, ExtensionFn>,
    instructions: HashSet<String>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.extensions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("extensions", &names)
            .field("instructions", &self.instructions.len())
            .finish()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an extension under `name`, which may be a plain or prefixed name.
    pub fn register(&mut self, name: impl Into<String>, function: ExtensionFn) {
        self.extensions.insert(name.into(), function);
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[ExtensionValue]) -> Result<ExtensionValue, String> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(function));
    }

    /// Looks an extension up by the exact name used in the expression, then by its local part.
    pub fn get(&self, name: &str) -> Option<&ExtensionFn> {
        self.extensions.get(name).or_else(|| {
            let local = name.rsplit(':').next().unwrap_or(name);
            self.extensions.get(local)
        })
    }

    pub fn is_builtin(name: &str) -> bool {
        BUILTINS.contains(&name)
    }

    pub fn is_available(&self, name: &str) -> bool {
        Self::is_builtin(name) || self.get(name).is_some()
    }

    /// Declares the local names of XSLT instructions the host implements.
    pub fn declare_instructions<'n>(&mut self, names: impl IntoIterator<Item = &'n str>) {
        self.instructions.extend(names.into_iter().map(str::to_string));
    }

    pub fn is_instruction(&self, local: &str) -> bool {
        self.instructions.contains(local)
    }

    pub fn extension_count(&self) -> usize {
        self.extensions.len()
    }
}

/// Dispatches a function call to the correct implementation.
pub fn evaluate_function<'a, 'd, N: DataSourceNode<'a>>(
    name: &str,
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    match name {
        // Node-set
        "last" => func_last(args, e_ctx),
        "position" => func_position(args, e_ctx),
        "count" => func_count(args),
        "id" => func_id(args, e_ctx),
        "local-name" => func_local_name(args, e_ctx),
        "namespace-uri" => func_namespace_uri(args, e_ctx),
        "name" => func_name(args, e_ctx),

        // String
        "string" => func_string(args, e_ctx),
        "concat" => func_concat(args),
        "starts-with" => func_starts_with(args),
        "contains" => func_contains(args),
        "substring-before" => func_substring_before(args),
        "substring-after" => func_substring_after(args),
        "substring" => func_substring(args),
        "string-length" => func_string_length(args, e_ctx),
        "normalize-space" => func_normalize_space(args, e_ctx),
        "translate" => func_translate(args),

        // Boolean
        "boolean" => func_boolean(args),
        "not" => func_not(args),
        "true" => func_constant(args, "true", true),
        "false" => func_constant(args, "false", false),
        "lang" => func_lang(args, e_ctx),

        // Number
        "number" => func_number(args, e_ctx),
        "sum" => func_sum(args),
        "floor" => func_unary_number(args, "floor", f64::floor),
        "ceiling" => func_unary_number(args, "ceiling", f64::ceil),
        "round" => func_unary_number(args, "round", xpath_round),

        // XSLT
        "current" => func_current(args, e_ctx),
        "key" => func_key(args, e_ctx),
        "generate-id" => func_generate_id(args, e_ctx),
        "format-number" => func_format_number(args),
        "system-property" => func_system_property(args, e_ctx),
        "function-available" => func_function_available(args, e_ctx),
        "element-available" => func_element_available(args, e_ctx),

        _ => call_extension(name, args, e_ctx),
    }
}

fn call_extension<'a, 'd, N: DataSourceNode<'a>>(
    name: &str,
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    let Some(function) = e_ctx.functions.get(name) else {
        return Err(XPathError::UnknownFunction(name.to_string()));
    };
    let converted: Vec<ExtensionValue> = args
        .into_iter()
        .map(|arg| match arg {
            XPathValue::NodeSet(mut nodes) => {
                nodes.sort();
                ExtensionValue::NodeSet(nodes.iter().map(|n| n.string_value()).collect())
            }
            XPathValue::String(s) => ExtensionValue::String(s),
            XPathValue::Number(n) => ExtensionValue::Number(n),
            XPathValue::Boolean(b) => ExtensionValue::Boolean(b),
        })
        .collect();
    let result = function(&converted).map_err(|message| XPathError::ExtensionFailed {
        function: name.to_string(),
        message,
    })?;
    Ok(match result {
        ExtensionValue::String(s) => XPathValue::String(s),
        ExtensionValue::Number(n) => XPathValue::Number(n),
        ExtensionValue::Boolean(b) => XPathValue::Boolean(b),
        // Strings cannot become nodes of the source tree; keep the first as the value.
        ExtensionValue::NodeSet(values) => {
            XPathValue::String(values.into_iter().next().unwrap_or_default())
        }
    })
}

fn expect_args<N>(
    args: &[XPathValue<N>],
    function: &str,
    range: std::ops::RangeInclusive<usize>,
) -> Result<(), XPathError> {
    if range.contains(&args.len()) {
        return Ok(());
    }
    let expected = match (range.start(), range.end()) {
        (s, e) if s == e && *s == 1 => "1 argument".to_string(),
        (s, e) if s == e => format!("{} arguments", s),
        (s, e) if *e == usize::MAX => format!("at least {} arguments", s),
        (s, e) => format!("{} to {} arguments", s, e),
    };
    Err(XPathError::arity(function, &expected))
}

/// The first node in document order of an optional node-set argument, or the context node.
fn node_argument<'a, 'd, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
    function: &str,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<Option<N>, XPathError> {
    expect_args(&args, function, 0..=1)?;
    if args.is_empty() {
        return Ok(Some(e_ctx.context_node));
    }
    match args.remove(0) {
        XPathValue::NodeSet(nodes) => Ok(nodes.into_iter().min()),
        v => Err(XPathError::TypeError(format!(
            "{}() argument must be a node-set, got a {}",
            function,
            v.type_name()
        ))),
    }
}

fn string_or_context<'a, 'd, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
    function: &str,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<String, XPathError> {
    expect_args(&args, function, 0..=1)?;
    Ok(if args.is_empty() {
        e_ctx.context_node.string_value()
    } else {
        args.remove(0).to_string()
    })
}

fn two_strings<'a, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
    function: &str,
) -> Result<(String, String), XPathError> {
    expect_args(&args, function, 2..=2)?;
    let second = args.remove(1).to_string();
    let first = args.remove(0).to_string();
    Ok((first, second))
}

// --- Node-Set Functions ---

fn func_last<'a, 'd, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    expect_args(&args, "last", 0..=0)?;
    Ok(XPathValue::Number(e_ctx.context_size as f64))
}

fn func_position<'a, 'd, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    expect_args(&args, "position", 0..=0)?;
    Ok(XPathValue::Number(e_ctx.context_position as f64))
}

fn func_count<'a, N: DataSourceNode<'a>>(mut args: Vec<XPathValue<N>>) -> Result<XPathValue<N>, XPathError> {
    expect_args(&args, "count", 1..=1)?;
    match args.remove(0) {
        XPathValue::NodeSet(nodes) => Ok(XPathValue::Number(nodes.len() as f64)),
        v => Err(XPathError::TypeError(format!(
            "count() argument must be a node-set, got a {}",
            v.type_name()
        ))),
    }
}

fn func_id<'a, 'd, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    expect_args(&args, "id", 1..=1)?;
    let tokens: Vec<String> = match args.remove(0) {
        XPathValue::NodeSet(nodes) => nodes.iter().map(|n| n.string_value()).collect(),
        other => vec![other.to_string()],
    };
    let ids_to_find: HashSet<&str> = tokens.iter().flat_map(|t| t.split_whitespace()).collect();
    if ids_to_find.is_empty() {
        return Ok(XPathValue::NodeSet(vec![]));
    }

    // Without DTD attribute types, `id` and `xml:id` attributes are treated as IDs.
    let mut results = Vec::new();
    let mut stack: Vec<N> = e_ctx.root_node.children().collect();
    while let Some(node) = stack.pop() {
        if node.node_type() == NodeType::Element {
            let matched = node.attributes().any(|attr| {
                attr.name().is_some_and(|q| {
                    q.local_part == "id"
                        && (q.prefix.is_none() || q.prefix == Some("xml"))
                        && ids_to_find.contains(attr.string_value().as_str())
                })
            });
            if matched {
                results.push(node);
            }
        }
        stack.extend(node.children());
    }
    results.sort();
    results.dedup();
    Ok(XPathValue::NodeSet(results))
}

fn func_local_name<'a, 'd, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    let node = node_argument(args, "local-name", e_ctx)?;
    let name = node
        .and_then(|n| n.name().map(|q| q.local_part.to_string()))
        .unwrap_or_default();
    Ok(XPathValue::String(name))
}

fn func_namespace_uri<'a, 'd, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    let node = node_argument(args, "namespace-uri", e_ctx)?;
    let uri = node.and_then(|n| n.namespace_uri()).unwrap_or_default();
    Ok(XPathValue::String(uri.to_string()))
}

fn func_name<'a, 'd, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    let node = node_argument(args, "name", e_ctx)?;
    let name = node
        .and_then(|n| n.name().map(|q| q.to_string()))
        .unwrap_or_default();
    Ok(XPathValue::String(name))
}

// --- String Functions ---

fn func_string<'a, 'd, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    Ok(XPathValue::String(string_or_context(args, "string", e_ctx)?))
}

fn func_concat<'a, N: DataSourceNode<'a>>(args: Vec<XPathValue<N>>) -> Result<XPathValue<N>, XPathError> {
    expect_args(&args, "concat", 2..=usize::MAX)?;
    Ok(XPathValue::String(args.iter().map(|v| v.to_string()).collect()))
}

fn func_starts_with<'a, N: DataSourceNode<'a>>(args: Vec<XPathValue<N>>) -> Result<XPathValue<N>, XPathError> {
    let (s1, s2) = two_strings(args, "starts-with")?;
    Ok(XPathValue::Boolean(s1.starts_with(&s2)))
}

fn func_contains<'a, N: DataSourceNode<'a>>(args: Vec<XPathValue<N>>) -> Result<XPathValue<N>, XPathError> {
    let (s1, s2) = two_strings(args, "contains")?;
    Ok(XPathValue::Boolean(s1.contains(&s2)))
}

fn func_substring_before<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    let (s1, s2) = two_strings(args, "substring-before")?;
    let before = s1.find(&s2).map(|i| s1[..i].to_string()).unwrap_or_default();
    Ok(XPathValue::String(before))
}

fn func_substring_after<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    let (s1, s2) = two_strings(args, "substring-after")?;
    let after = s1
        .find(&s2)
        .map(|i| s1[i + s2.len()..].to_string())
        .unwrap_or_default();
    Ok(XPathValue::String(after))
}

fn func_substring<'a, N: DataSourceNode<'a>>(mut args: Vec<XPathValue<N>>) -> Result<XPathValue<N>, XPathError> {
    expect_args(&args, "substring", 2..=3)?;
    let length = if args.len() == 3 {
        Some(xpath_round(args.remove(2).to_number()))
    } else {
        None
    };
    let first = xpath_round(args.remove(1).to_number());
    let s = args.remove(0).to_string();
    let last = length.map_or(f64::INFINITY, |l| first + l);

    // Comparisons against NaN are false, so NaN bounds select nothing.
    let result = s
        .chars()
        .enumerate()
        .filter(|(i, _)| {
            let pos = (*i + 1) as f64;
            pos >= first && pos < last
        })
        .map(|(_, c)| c)
        .collect();
    Ok(XPathValue::String(result))
}

fn func_string_length<'a, 'd, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    let s = string_or_context(args, "string-length", e_ctx)?;
    Ok(XPathValue::Number(s.chars().count() as f64))
}

fn func_normalize_space<'a, 'd, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    let s = string_or_context(args, "normalize-space", e_ctx)?;
    Ok(XPathValue::String(s.split_whitespace().collect::<Vec<_>>().join(" ")))
}

fn func_translate<'a, N: DataSourceNode<'a>>(mut args: Vec<XPathValue<N>>) -> Result<XPathValue<N>, XPathError> {
    expect_args(&args, "translate", 3..=3)?;
    let to: Vec<char> = args.remove(2).to_string().chars().collect();
    let from: Vec<char> = args.remove(1).to_string().chars().collect();
    let s = args.remove(0).to_string();
    let result = s
        .chars()
        .filter_map(|c| match from.iter().position(|&f| f == c) {
            Some(i) => to.get(i).copied(),
            None => Some(c),
        })
        .collect();
    Ok(XPathValue::String(result))
}

// --- Boolean Functions ---

fn func_boolean<'a, N: DataSourceNode<'a>>(mut args: Vec<XPathValue<N>>) -> Result<XPathValue<N>, XPathError> {
    expect_args(&args, "boolean", 1..=1)?;
    Ok(XPathValue::Boolean(args.remove(0).to_bool()))
}

fn func_not<'a, N: DataSourceNode<'a>>(mut args: Vec<XPathValue<N>>) -> Result<XPathValue<N>, XPathError> {
    expect_args(&args, "not", 1..=1)?;
    Ok(XPathValue::Boolean(!args.remove(0).to_bool()))
}

fn func_constant<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    function: &str,
    value: bool,
) -> Result<XPathValue<N>, XPathError> {
    expect_args(&args, function, 0..=0)?;
    Ok(XPathValue::Boolean(value))
}

fn func_lang<'a, 'd, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    expect_args(&args, "lang", 1..=1)?;
    let wanted = args.remove(0).to_string().to_lowercase();
    let mut current = Some(e_ctx.context_node);
    while let Some(node) = current {
        let declared = node.attributes().find(|attr| {
            attr.name()
                .is_some_and(|q| q.prefix == Some("xml") && q.local_part == "lang")
        });
        if let Some(attr) = declared {
            let lang = attr.string_value().to_lowercase();
            let matches = lang == wanted
                || lang
                    .strip_prefix(wanted.as_str())
                    .is_some_and(|rest| rest.starts_with('-'));
            return Ok(XPathValue::Boolean(matches));
        }
        current = node.parent();
    }
    Ok(XPathValue::Boolean(false))
}

// --- Number Functions ---

fn func_number<'a, 'd, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    expect_args(&args, "number", 0..=1)?;
    let value = if args.is_empty() {
        XPathValue::NodeSet(vec![e_ctx.context_node])
    } else {
        args.remove(0)
    };
    Ok(XPathValue::Number(value.to_number()))
}

fn func_sum<'a, N: DataSourceNode<'a>>(mut args: Vec<XPathValue<N>>) -> Result<XPathValue<N>, XPathError> {
    expect_args(&args, "sum", 1..=1)?;
    match args.remove(0) {
        XPathValue::NodeSet(nodes) => {
            let total = nodes
                .iter()
                .map(|n| crate::engine::string_to_number(&n.string_value()))
                .sum();
            Ok(XPathValue::Number(total))
        }
        v => Err(XPathError::TypeError(format!(
            "sum() argument must be a node-set, got a {}",
            v.type_name()
        ))),
    }
}

fn func_unary_number<'a, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
    function: &str,
    op: fn(f64) -> f64,
) -> Result<XPathValue<N>, XPathError> {
    expect_args(&args, function, 1..=1)?;
    Ok(XPathValue::Number(op(args.remove(0).to_number())))
}

/// Rounds half towards positive infinity, leaving NaN and infinities untouched.
fn xpath_round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else if (-0.5..0.0).contains(&n) {
        -0.0
    } else {
        (n + 0.5).floor()
    }
}

// --- XSLT Functions ---

fn func_current<'a, 'd, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    expect_args(&args, "current", 0..=0)?;
    Ok(XPathValue::NodeSet(vec![e_ctx.current_node]))
}

fn func_key<'a, 'd, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    expect_args(&args, "key", 2..=2)?;
    let key_value_arg = args.remove(1);
    let key_name = args.remove(0).to_string();

    let Some(key_index) = e_ctx.key_indexes.get(&key_name) else {
        log::warn!("key('{}') refers to an undeclared key", key_name);
        return Ok(XPathValue::NodeSet(vec![]));
    };

    let key_values = match key_value_arg {
        XPathValue::NodeSet(nodes) => nodes.iter().map(|n| n.string_value()).collect(),
        other => vec![other.to_string()],
    };

    let mut result_nodes: Vec<N> = key_values
        .iter()
        .filter_map(|value| key_index.get(value))
        .flatten()
        .copied()
        .collect();
    result_nodes.sort();
    result_nodes.dedup();
    Ok(XPathValue::NodeSet(result_nodes))
}

fn func_generate_id<'a, 'd, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    let Some(node) = node_argument(args, "generate-id", e_ctx)? else {
        return Ok(XPathValue::String(String::new()));
    };
    let mut hasher = DefaultHasher::new();
    node.hash(&mut hasher);
    // Prefixed with a letter so the id is a valid NCName.
    Ok(XPathValue::String(format!("id{}", hasher.finish())))
}

fn func_format_number<'a, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    expect_args(&args, "format-number", 2..=3)?;
    if args.len() == 3 {
        log::debug!("format-number(): named decimal formats are not supported, using the default");
        args.truncate(2);
    }
    let pattern = args.remove(1).to_string();
    let number = args.remove(0).to_number();
    format_number(number, &pattern)
        .map(XPathValue::String)
        .map_err(|message| XPathError::FunctionError {
            function: "format-number()".to_string(),
            message,
        })
}

/// Formats with a JDK `DecimalFormat` style picture using the default decimal format.
pub fn format_number(number: f64, picture: &str) -> Result<String, String> {
    if number.is_nan() {
        return Ok("NaN".to_string());
    }
    let mut sub_pictures = picture.splitn(2, ';');
    let positive = sub_pictures.next().unwrap_or_default();
    let negative = sub_pictures.next();

    let (prefix, body, suffix) = split_picture(positive)?;
    let (prefix, suffix) = match (number.is_sign_negative() && number != 0.0, negative) {
        (true, Some(neg)) => {
            let (p, _, s) = split_picture(neg)?;
            (p, s)
        }
        (true, None) => (format!("-{}", prefix), suffix),
        (false, _) => (prefix, suffix),
    };
    if number.is_infinite() {
        return Ok(format!("{}Infinity{}", prefix, suffix));
    }

    let mut value = number.abs();
    if prefix.contains('%') || suffix.contains('%') {
        value *= 100.0;
    } else if prefix.contains('\u{2030}') || suffix.contains('\u{2030}') {
        value *= 1000.0;
    }

    let (int_picture, frac_picture) = match body.split_once('.') {
        Some((i, f)) => (i, f),
        None => (body.as_str(), ""),
    };
    let min_int = int_picture.chars().filter(|&c| c == '0').count();
    let min_frac = frac_picture.chars().filter(|&c| c == '0').count();
    let max_frac = frac_picture.chars().filter(|&c| c == '0' || c == '#').count();
    let grouping = int_picture
        .rfind(',')
        .map(|i| int_picture[i + 1..].chars().filter(|&c| c == '0' || c == '#').count())
        .filter(|&size| size > 0);

    let fixed = format!("{:.*}", max_frac, value);
    let (int_digits, frac_digits) = match fixed.split_once('.') {
        Some((i, f)) => (i.to_string(), f.to_string()),
        None => (fixed, String::new()),
    };
    let mut frac_digits = frac_digits;
    while frac_digits.len() > min_frac && frac_digits.ends_with('0') {
        frac_digits.pop();
    }
    let mut int_digits = int_digits.trim_start_matches('0').to_string();
    while int_digits.len() < min_int {
        int_digits.insert(0, '0');
    }
    if int_digits.is_empty() && frac_digits.is_empty() {
        int_digits.push('0');
    }

    let mut grouped = String::new();
    if let Some(size) = grouping {
        let len = int_digits.len();
        for (i, c) in int_digits.chars().enumerate() {
            if i > 0 && (len - i) % size == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
    } else {
        grouped = int_digits;
    }

    let mut out = prefix;
    out.push_str(&grouped);
    if !frac_digits.is_empty() {
        out.push('.');
        out.push_str(&frac_digits);
    }
    out.push_str(&suffix);
    Ok(out)
}

/// Splits a sub-picture into its literal prefix, digit body and literal suffix.
fn split_picture(picture: &str) -> Result<(String, String, String), String> {
    let is_body = |c: char| matches!(c, '0' | '#' | ',' | '.');
    let start = picture.find(is_body);
    let end = picture.rfind(is_body);
    match (start, end) {
        (Some(start), Some(end)) => {
            let body = &picture[start..=end];
            if body.matches('.').count() > 1 {
                return Err(format!("picture '{}' has more than one decimal separator", picture));
            }
            Ok((
                picture[..start].to_string(),
                body.to_string(),
                picture[end + 1..].to_string(),
            ))
        }
        _ => Err(format!("picture '{}' contains no digit placeholders", picture)),
    }
}

/// Splits a QName argument and reports whether its prefix denotes the XSLT namespace.
fn xslt_local_name<'s, 'a, 'd, N: DataSourceNode<'a>>(
    name: &'s str,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Option<&'s str> {
    let (prefix, local) = name.split_once(':')?;
    let in_xslt = match e_ctx.namespaces {
        Some(map) => map.get(prefix).is_some_and(|uri| uri == XSLT_NAMESPACE),
        None => prefix == "xsl",
    };
    in_xslt.then_some(local)
}

fn func_system_property<'a, 'd, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    expect_args(&args, "system-property", 1..=1)?;
    let name = args.remove(0).to_string();
    Ok(match xslt_local_name(&name, e_ctx) {
        Some("version") => XPathValue::Number(1.0),
        Some("vendor") => XPathValue::String("xslproc".to_string()),
        Some("vendor-url") => XPathValue::String("https://crates.io/crates/xslproc".to_string()),
        _ => XPathValue::String(String::new()),
    })
}

fn func_function_available<'a, 'd, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    expect_args(&args, "function-available", 1..=1)?;
    let name = args.remove(0).to_string();
    Ok(XPathValue::Boolean(e_ctx.functions.is_available(&name)))
}

fn func_element_available<'a, 'd, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    expect_args(&args, "element-available", 1..=1)?;
    let name = args.remove(0).to_string();
    let available = xslt_local_name(&name, e_ctx).is_some_and(|local| e_ctx.functions.is_instruction(local));
    Ok(XPathValue::Boolean(available))
}
