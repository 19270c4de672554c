//! XSLT `match` patterns, compiled from the XPath parser's location paths.
use crate::error::XsltError;
use std::fmt;
use xslproc_xpath1::{
    Axis, BinaryOperator, DataSourceNode, EvaluationContext, Expression, LocationPath, NodeTest,
    NodeType, NodeTypeTest, XPathError, apply_predicates, node_matches_test, parse_expression,
};

/// How a step relates to the step on its left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Separator {
    /// `/`
    Parent,
    /// `//`
    Ancestor,
}

#[derive(Debug, Clone, PartialEq)]
struct MatchStep {
    axis: Axis,
    node_test: NodeTest,
    predicates: Vec<Expression>,
    separator: Separator,
}

#[derive(Debug, Clone, PartialEq)]
struct LocationPathPattern {
    is_absolute: bool,
    steps: Vec<MatchStep>,
}

/// A compiled XSLT match pattern; a union like `para|note` holds one path per alternative.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    paths: Vec<LocationPathPattern>,
    original_text: String,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original_text)
    }
}

pub fn parse(text: &str) -> Result<Pattern, XsltError> {
    let unsupported = |message: String| XsltError::Pattern(text.to_string(), message);
    let expression = parse_expression(text).map_err(|e| unsupported(e.to_string()))?;

    let mut alternatives = Vec::new();
    flatten_union(expression, &mut alternatives);

    let mut paths = Vec::with_capacity(alternatives.len());
    for alternative in alternatives {
        let Expression::LocationPath(path) = alternative else {
            return Err(unsupported("patterns must be location paths".into()));
        };
        paths.push(convert_path(path).map_err(unsupported)?);
    }
    Ok(Pattern {
        paths,
        original_text: text.trim().to_string(),
    })
}

fn flatten_union(expression: Expression, out: &mut Vec<Expression>) {
    match expression {
        Expression::BinaryOp {
            left,
            op: BinaryOperator::Union,
            right,
        } => {
            flatten_union(*left, out);
            flatten_union(*right, out);
        }
        other => out.push(other),
    }
}

fn convert_path(path: LocationPath) -> Result<LocationPathPattern, String> {
    if path.start_point.is_some() {
        return Err("id() and key() anchors are not supported in patterns".into());
    }
    let mut steps = Vec::with_capacity(path.steps.len());
    let mut separator = Separator::Parent;
    for step in path.steps {
        let is_descendant_separator = step.axis == Axis::DescendantOrSelf
            && step.node_test == NodeTest::NodeType(NodeTypeTest::Node)
            && step.predicates.is_empty();
        if is_descendant_separator {
            separator = Separator::Ancestor;
            continue;
        }
        if !matches!(step.axis, Axis::Child | Axis::Attribute) {
            return Err(format!(
                "only the child and attribute axes are allowed, found {:?}",
                step.axis
            ));
        }
        steps.push(MatchStep {
            axis: step.axis,
            node_test: step.node_test,
            predicates: step.predicates,
            separator,
        });
        separator = Separator::Parent;
    }
    if separator == Separator::Ancestor {
        return Err("a pattern cannot end with '//'".into());
    }
    if steps.is_empty() && !path.is_absolute {
        return Err("empty pattern".into());
    }
    Ok(LocationPathPattern {
        is_absolute: path.is_absolute,
        steps,
    })
}

impl Pattern {
    /// Whether `node` matches any alternative of this pattern.
    pub fn matches<'a, N>(&self, node: N, e_ctx: &EvaluationContext<'a, '_, N>) -> Result<bool, XPathError>
    where
        N: DataSourceNode<'a> + 'a,
    {
        for path in &self.paths {
            if path.matches(node, e_ctx)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Splits a union into one pattern per alternative, so each can carry its own priority.
    pub fn split(self) -> Vec<Pattern> {
        let text = self.original_text;
        self.paths
            .into_iter()
            .map(|path| Pattern {
                paths: vec![path],
                original_text: text.clone(),
            })
            .collect()
    }

    /// The default priority of a template rule with this pattern (XSLT 1.0, section 5.5).
    pub fn default_priority(&self) -> f64 {
        self.paths
            .iter()
            .map(LocationPathPattern::default_priority)
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

impl LocationPathPattern {
    fn default_priority(&self) -> f64 {
        match self.steps.as_slice() {
            [step] if !self.is_absolute && step.predicates.is_empty() => {
                step.node_test.default_priority()
            }
            _ => 0.5,
        }
    }

    fn matches<'a, N>(&self, node: N, e_ctx: &EvaluationContext<'a, '_, N>) -> Result<bool, XPathError>
    where
        N: DataSourceNode<'a> + 'a,
    {
        if self.steps.is_empty() {
            // "/"
            return Ok(node.node_type() == NodeType::Root);
        }
        self.matches_from(node, self.steps.len() - 1, e_ctx)
    }

    /// Matches `steps[..=index]` right to left, with `node` standing for `steps[index]`.
    fn matches_from<'a, N>(
        &self,
        node: N,
        index: usize,
        e_ctx: &EvaluationContext<'a, '_, N>,
    ) -> Result<bool, XPathError>
    where
        N: DataSourceNode<'a> + 'a,
    {
        let step = &self.steps[index];
        if !step.matches(node, e_ctx)? {
            return Ok(false);
        }
        let parent = node.parent();
        if index == 0 {
            return Ok(match (self.is_absolute, step.separator) {
                (false, _) | (true, Separator::Ancestor) => true,
                (true, Separator::Parent) => {
                    parent.is_some_and(|p| p.node_type() == NodeType::Root)
                }
            });
        }
        match step.separator {
            Separator::Parent => match parent {
                Some(p) => self.matches_from(p, index - 1, e_ctx),
                None => Ok(false),
            },
            Separator::Ancestor => {
                let mut ancestor = parent;
                while let Some(candidate) = ancestor {
                    if self.matches_from(candidate, index - 1, e_ctx)? {
                        return Ok(true);
                    }
                    ancestor = candidate.parent();
                }
                Ok(false)
            }
        }
    }
}

impl MatchStep {
    fn matches<'a, N>(&self, node: N, e_ctx: &EvaluationContext<'a, '_, N>) -> Result<bool, XPathError>
    where
        N: DataSourceNode<'a> + 'a,
    {
        let type_ok = match self.axis {
            Axis::Attribute => node.node_type() == NodeType::Attribute,
            _ => !matches!(node.node_type(), NodeType::Root | NodeType::Attribute),
        };
        if !type_ok || !node_matches_test(node, &self.node_test, self.axis, e_ctx)? {
            return Ok(false);
        }
        if self.predicates.is_empty() {
            return Ok(true);
        }
        let Some(parent) = node.parent() else {
            return Ok(false);
        };
        // Positions count among the siblings that pass the node test.
        let siblings: Box<dyn Iterator<Item = N> + 'a> = match self.axis {
            Axis::Attribute => parent.attributes(),
            _ => parent.children(),
        };
        let mut candidates = Vec::new();
        for sibling in siblings {
            if node_matches_test(sibling, &self.node_test, self.axis, e_ctx)? {
                candidates.push(sibling);
            }
        }
        Ok(apply_predicates(candidates, &self.predicates, e_ctx)?.contains(&node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasources::xml::{XmlDocument, XmlNode};
    use std::collections::HashMap;
    use xslproc_xpath1::{FunctionRegistry, KeyIndexes};

    const DOC: &str = r#"<doc><sec><para id="p1">One</para><para>Two</para></sec><para>Top</para></doc>"#;

    fn all_nodes<'a>(node: XmlNode<'a, 'a>, out: &mut Vec<XmlNode<'a, 'a>>) {
        out.push(node);
        out.extend(node.attributes());
        for child in node.children() {
            all_nodes(child, out);
        }
    }

    /// Returns the string values of every node the pattern matches.
    fn matching(pattern: &str) -> Vec<String> {
        let doc = XmlDocument::parse(DOC).unwrap();
        let root = doc.root_node();
        let funcs = FunctionRegistry::default();
        let vars = HashMap::new();
        let keys = KeyIndexes::new();
        let e_ctx = EvaluationContext::new(root, root, &funcs, &vars, &keys);
        let pattern = parse(pattern).unwrap();
        let mut nodes = Vec::new();
        all_nodes(root, &mut nodes);
        nodes
            .into_iter()
            .filter(|n| pattern.matches(*n, &e_ctx).unwrap())
            .map(|n| match n.name() {
                Some(q) if n.node_type() != NodeType::Text => format!("{}={}", q, n.string_value()),
                _ => n.string_value(),
            })
            .collect()
    }

    #[test]
    fn test_pattern_parsing() {
        for ok in ["foo", "foo/bar", "/", "/*", "/root/item", "foo|bar", "text()", "@id", "a//b", "//b"] {
            assert!(parse(ok).is_ok(), "{ok}");
        }
        for bad in ["ancestor::a", "a//", "key('k', 1)", "1 + 2", "$var", "."] {
            assert!(parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_simple_and_path_matches() {
        assert_eq!(matching("sec/para"), vec!["para=One", "para=Two"]);
        assert_eq!(matching("/doc/para"), vec!["para=Top"]);
        assert_eq!(matching("doc//para").len(), 3);
        assert_eq!(matching("sec/para/text()"), vec!["One", "Two"]);
    }

    #[test]
    fn test_root_and_wildcards() {
        assert_eq!(matching("/"), vec!["OneTwoTop"]);
        assert_eq!(matching("/*"), vec!["doc=OneTwoTop"]);
        assert_eq!(matching("@*"), vec!["id=p1"]);
        assert!(matching("node()").iter().all(|n| !n.starts_with("id=")));
    }

    #[test]
    fn test_predicates_count_among_siblings() {
        assert_eq!(matching("para[1]"), vec!["para=One", "para=Top"]);
        assert_eq!(matching("para[@id]"), vec!["para=One"]);
        assert_eq!(matching("sec/para[last()]"), vec!["para=Two"]);
    }

    #[test]
    fn test_default_priorities() {
        assert_eq!(parse("para").unwrap().default_priority(), 0.0);
        assert_eq!(parse("*").unwrap().default_priority(), -0.5);
        assert_eq!(parse("text()").unwrap().default_priority(), -0.5);
        assert_eq!(parse("sec/para").unwrap().default_priority(), 0.5);
        assert_eq!(parse("para[1]").unwrap().default_priority(), 0.5);
        assert_eq!(parse("/").unwrap().default_priority(), 0.5);
        let split = parse("para|*").unwrap().split();
        assert_eq!(split.len(), 2);
        assert_eq!(split[1].default_priority(), -0.5);
    }
}
