//! The compiled form of an XSLT 1.0 stylesheet.
use crate::error::Location;
use crate::pattern::Pattern;
use crate::result::{OutputName, OutputSettings};
use std::collections::HashMap;
use xslproc_xpath1::Expression;

/// One piece of an attribute value template.
#[derive(Debug, Clone, PartialEq)]
pub enum AvtPart {
    Static(String),
    Dynamic(Expression),
}

/// An attribute value that may contain `{expr}` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValueTemplate {
    Static(String),
    Dynamic(Vec<AvtPart>),
}

/// A pre-compiled, executable block of instructions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparsedTemplate(pub Vec<LocatedInstruction>);

impl PreparsedTemplate {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An instruction together with the stylesheet element it came from, used to locate
/// runtime errors.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedInstruction {
    pub location: Location,
    pub element: String,
    pub instruction: XsltInstruction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue {
    Select(Expression),
    Body(PreparsedTemplate),
    Empty,
}

/// An `xsl:param` declaration on a template.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default_value: VariableValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithParam {
    pub name: String,
    pub value: VariableValue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDataType {
    #[default]
    Text,
    Number,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub select: Expression,
    pub order: SortOrder,
    pub data_type: SortDataType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct When {
    pub test: Expression,
    pub body: PreparsedTemplate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XsltInstruction {
    /// A literal result element copied from the stylesheet.
    LiteralElement {
        name: OutputName,
        attributes: Vec<(OutputName, AttributeValueTemplate)>,
        namespaces: Vec<(Option<String>, String)>,
        use_attribute_sets: Vec<String>,
        body: PreparsedTemplate,
    },
    Text {
        value: String,
        disable_escaping: bool,
    },
    ValueOf {
        select: Expression,
    },
    ApplyTemplates {
        select: Option<Expression>,
        mode: Option<String>,
        sort_keys: Vec<SortKey>,
        params: Vec<WithParam>,
    },
    CallTemplate {
        name: String,
        params: Vec<WithParam>,
    },
    ForEach {
        select: Expression,
        sort_keys: Vec<SortKey>,
        body: PreparsedTemplate,
    },
    If {
        test: Expression,
        body: PreparsedTemplate,
    },
    Choose {
        whens: Vec<When>,
        otherwise: Option<PreparsedTemplate>,
    },
    Variable {
        name: String,
        value: VariableValue,
    },
    CopyOf {
        select: Expression,
    },
    Copy {
        use_attribute_sets: Vec<String>,
        body: PreparsedTemplate,
    },
    Element {
        name: AttributeValueTemplate,
        namespace: Option<AttributeValueTemplate>,
        use_attribute_sets: Vec<String>,
        body: PreparsedTemplate,
    },
    Attribute {
        name: AttributeValueTemplate,
        namespace: Option<AttributeValueTemplate>,
        body: PreparsedTemplate,
    },
    Comment {
        body: PreparsedTemplate,
    },
    ProcessingInstruction {
        name: AttributeValueTemplate,
        body: PreparsedTemplate,
    },
    Message {
        terminate: bool,
        body: PreparsedTemplate,
    },
    Number {
        value: Option<Expression>,
        count: Option<Pattern>,
        format: AttributeValueTemplate,
    },
}

/// A compiled `<xsl:template match="...">` rule.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateRule {
    pub pattern: Pattern,
    pub priority: f64,
    pub mode: Option<String>,
    pub body: PreparsedTemplate,
    pub params: Vec<Param>,
    /// Declaration order; later rules win priority ties.
    pub order: usize,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedTemplate {
    pub params: Vec<Param>,
    pub body: PreparsedTemplate,
    pub location: Location,
}

/// `<xsl:key name="..." match="..." use="..."/>`
#[derive(Debug, Clone, PartialEq)]
pub struct KeyDefinition {
    pub name: String,
    pub pattern: Pattern,
    pub use_expr: Expression,
    pub location: Location,
}

/// A top-level `xsl:variable` or `xsl:param`.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalBinding {
    pub name: String,
    pub value: VariableValue,
    pub is_param: bool,
    pub location: Location,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet {
    pub use_attribute_sets: Vec<String>,
    pub attributes: PreparsedTemplate,
}

/// A name test from `xsl:strip-space` or `xsl:preserve-space`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    Any,
    Namespace(String),
    Name {
        namespace: Option<String>,
        local: String,
    },
}

impl NameTest {
    fn priority(&self) -> f64 {
        match self {
            NameTest::Any => -0.5,
            NameTest::Namespace(_) => -0.25,
            NameTest::Name { .. } => 0.0,
        }
    }

    fn matches(&self, namespace: Option<&str>, local: &str) -> bool {
        match self {
            NameTest::Any => true,
            NameTest::Namespace(uri) => namespace == Some(uri.as_str()),
            NameTest::Name {
                namespace: ns,
                local: l,
            } => ns.as_deref() == namespace && l == local,
        }
    }
}

/// Which source elements lose their whitespace-only text children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhitespaceRules {
    pub strip: Vec<NameTest>,
    pub preserve: Vec<NameTest>,
}

impl WhitespaceRules {
    pub fn is_empty(&self) -> bool {
        self.strip.is_empty()
    }

    /// The most specific matching test decides; `preserve` wins a tie.
    pub fn should_strip(&self, namespace: Option<&str>, local: &str) -> bool {
        let best = |tests: &[NameTest]| {
            tests
                .iter()
                .filter(|t| t.matches(namespace, local))
                .map(NameTest::priority)
                .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))))
        };
        match (best(&self.strip), best(&self.preserve)) {
            (Some(strip), Some(preserve)) => strip > preserve,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// The complete output of the compiler.
#[derive(Debug, Clone, Default)]
pub struct CompiledStylesheet {
    /// Match rules per mode, best candidate first.
    pub template_rules: HashMap<Option<String>, Vec<TemplateRule>>,
    pub named_templates: HashMap<String, NamedTemplate>,
    pub globals: Vec<GlobalBinding>,
    pub keys: Vec<KeyDefinition>,
    pub attribute_sets: HashMap<String, AttributeSet>,
    pub output: OutputSettings,
    pub whitespace: WhitespaceRules,
    /// Prefix bindings in scope on the stylesheet element, used by expressions.
    pub namespaces: HashMap<String, String>,
    pub uri: String,
}

impl CompiledStylesheet {
    /// Orders every mode's rules so the first match is the one to instantiate.
    pub(crate) fn sort_rules(&mut self) {
        for rules in self.template_rules.values_mut() {
            rules.sort_by(|a, b| {
                b.priority
                    .partial_cmp(&a.priority)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.order.cmp(&a.order))
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(local: &str) -> NameTest {
        NameTest::Name {
            namespace: None,
            local: local.into(),
        }
    }

    #[test]
    fn more_specific_whitespace_test_wins() {
        let rules = WhitespaceRules {
            strip: vec![NameTest::Any],
            preserve: vec![name("pre")],
        };
        assert!(rules.should_strip(None, "div"));
        assert!(!rules.should_strip(None, "pre"));

        let rules = WhitespaceRules {
            strip: vec![name("pre")],
            preserve: vec![NameTest::Any],
        };
        assert!(rules.should_strip(None, "pre"));
        assert!(!rules.should_strip(None, "div"));
    }

    #[test]
    fn preserve_wins_equal_priority() {
        let rules = WhitespaceRules {
            strip: vec![name("a")],
            preserve: vec![name("a")],
        };
        assert!(!rules.should_strip(None, "a"));
        assert!(!WhitespaceRules::default().should_strip(None, "a"));
    }
}
