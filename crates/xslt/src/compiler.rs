//! Defines the `CompilerBuilder`, which walks a parsed stylesheet tree and produces a
//! `CompiledStylesheet`. Errors are reported to the queue with the element's line and
//! compilation carries on, so one pass surfaces every problem.
use crate::ast::{AttributeValueTemplate, CompiledStylesheet, LocatedInstruction, PreparsedTemplate};
use crate::error::{ErrorQueue, Level, Location};
use crate::util;
use roxmltree::Node;
use std::collections::HashSet;
use xslproc_xpath1::{Expression, parse_expression};

pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";

/// Local names of the instructions this processor implements, for `element-available()`.
pub const INSTRUCTIONS: &[&str] = &[
    "apply-templates",
    "attribute",
    "call-template",
    "choose",
    "comment",
    "copy",
    "copy-of",
    "element",
    "for-each",
    "if",
    "message",
    "number",
    "processing-instruction",
    "text",
    "value-of",
    "variable",
];

/// The main entry point for compiling a stylesheet.
pub fn compile(doc: &roxmltree::Document, uri: &str, queue: &mut ErrorQueue) -> CompiledStylesheet {
    let mut builder = CompilerBuilder::new(uri, queue);
    builder.compile_document(doc);
    builder.finalize()
}

pub(crate) struct CompilerBuilder<'q> {
    pub(crate) stylesheet: CompiledStylesheet,
    queue: &'q mut ErrorQueue,
    /// Namespace URIs never copied onto literal result elements.
    pub(crate) excluded_namespaces: HashSet<String>,
    pub(crate) next_order: usize,
}

impl<'q> CompilerBuilder<'q> {
    fn new(uri: &str, queue: &'q mut ErrorQueue) -> Self {
        let stylesheet = CompiledStylesheet {
            uri: uri.to_string(),
            ..CompiledStylesheet::default()
        };
        Self {
            stylesheet,
            queue,
            excluded_namespaces: HashSet::from([XSLT_NAMESPACE.to_string()]),
            next_order: 0,
        }
    }

    fn finalize(mut self) -> CompiledStylesheet {
        self.stylesheet.sort_rules();
        log::debug!(
            "Compiled '{}': {} rule mode(s), {} named template(s), {} global(s)",
            self.stylesheet.uri,
            self.stylesheet.template_rules.len(),
            self.stylesheet.named_templates.len(),
            self.stylesheet.globals.len()
        );
        self.stylesheet
    }

    fn compile_document(&mut self, doc: &roxmltree::Document) {
        let root = doc.root_element();
        for ns in root.namespaces() {
            if let Some(prefix) = ns.name() {
                self.stylesheet
                    .namespaces
                    .insert(prefix.to_string(), ns.uri().to_string());
            }
        }

        if is_xsl(root, "stylesheet") || is_xsl(root, "transform") {
            self.handle_stylesheet(root);
        } else if root.attribute((XSLT_NAMESPACE, "version")).is_some() {
            self.handle_simplified_stylesheet(root);
        } else {
            self.report(
                root,
                format!(
                    "element {}: not an XSLT stylesheet (expected xsl:stylesheet or xsl:version)",
                    element_name(root)
                ),
            );
        }
    }

    // --- Diagnostics ---

    pub(crate) fn report(&mut self, node: Node, message: impl Into<String>) {
        let line = Location::of(node).line;
        let uri = self.stylesheet.uri.clone();
        self.queue.report(Level::Error, message, &uri, line);
    }

    /// Logs a construct that is accepted but ignored. Not queued: every queued entry fails
    /// the transform.
    pub(crate) fn warn(&self, node: Node, message: &str) {
        log::warn!("{} line {}: {}", self.stylesheet.uri, Location::of(node).line, message);
    }

    // --- Attribute helpers ---

    pub(crate) fn required_attr<'n>(&mut self, node: Node<'n, '_>, name: &str) -> Option<&'n str> {
        let value = node.attribute(name);
        if value.is_none() {
            self.report(
                node,
                format!(
                    "element {}: missing required attribute '{}'",
                    element_name(node),
                    name
                ),
            );
        }
        value
    }

    pub(crate) fn parse_xpath(&mut self, node: Node, text: &str) -> Option<Expression> {
        match parse_expression(text) {
            Ok(expr) => Some(expr),
            Err(e) => {
                self.report(node, format!("element {}: {}", element_name(node), e));
                None
            }
        }
    }

    pub(crate) fn required_xpath(&mut self, node: Node, attr: &str) -> Option<Expression> {
        let text = self.required_attr(node, attr)?;
        self.parse_xpath(node, text)
    }

    pub(crate) fn optional_xpath(&mut self, node: Node, attr: &str) -> Option<Option<Expression>> {
        match node.attribute(attr) {
            Some(text) => self.parse_xpath(node, text).map(Some),
            None => Some(None),
        }
    }

    pub(crate) fn parse_avt(&mut self, node: Node, text: &str) -> Option<AttributeValueTemplate> {
        match util::parse_avt(text) {
            Ok(avt) => Some(avt),
            Err(e) => {
                self.report(node, format!("element {}: {}", element_name(node), e));
                None
            }
        }
    }

    pub(crate) fn optional_avt(
        &mut self,
        node: Node,
        attr: &str,
    ) -> Option<Option<AttributeValueTemplate>> {
        match node.attribute(attr) {
            Some(text) => self.parse_avt(node, text).map(Some),
            None => Some(None),
        }
    }

    // --- Template bodies ---

    pub(crate) fn compile_body(&mut self, node: Node) -> PreparsedTemplate {
        self.compile_sequence(node, &[])
    }

    /// Compiles the children of `node`, leaving out the XSLT elements named in `collected`,
    /// which the caller has already taken care of.
    pub(crate) fn compile_sequence(&mut self, node: Node, collected: &[&str]) -> PreparsedTemplate {
        let mut body = Vec::new();
        for child in node.children() {
            if child.is_text() {
                let text = child.text().unwrap_or_default();
                if !text.trim().is_empty() {
                    body.push(LocatedInstruction {
                        location: Location::of(child),
                        element: "text()".to_string(),
                        instruction: crate::ast::XsltInstruction::Text {
                            value: text.to_string(),
                            disable_escaping: false,
                        },
                    });
                }
                continue;
            }
            if !child.is_element() {
                continue;
            }
            let tag = child.tag_name();
            if tag.namespace() == Some(XSLT_NAMESPACE) && collected.contains(&tag.name()) {
                continue;
            }
            let instruction = if tag.namespace() == Some(XSLT_NAMESPACE) {
                self.compile_instruction(child)
            } else {
                self.handle_literal_result_element(child)
            };
            if let Some(instruction) = instruction {
                body.push(LocatedInstruction {
                    location: Location::of(child),
                    element: element_name(child),
                    instruction,
                });
            }
        }
        PreparsedTemplate(body)
    }

    fn compile_instruction(&mut self, node: Node) -> Option<crate::ast::XsltInstruction> {
        match node.tag_name().name() {
            "apply-templates" => self.handle_apply_templates(node),
            "call-template" => self.handle_call_template(node),
            "for-each" => self.handle_for_each(node),
            "if" => self.handle_if(node),
            "choose" => self.handle_choose(node),
            "variable" => self.handle_local_variable(node),
            "value-of" => self.handle_value_of(node),
            "text" => Some(self.handle_text(node)),
            "copy" => Some(self.handle_copy(node)),
            "copy-of" => self.handle_copy_of(node),
            "element" => self.handle_element(node),
            "attribute" => self.handle_attribute(node),
            "comment" => Some(self.handle_comment(node)),
            "processing-instruction" => self.handle_processing_instruction(node),
            "message" => Some(self.handle_message(node)),
            "number" => self.handle_number(node),
            other @ ("param" | "sort" | "with-param" | "when" | "otherwise") => {
                self.report(node, format!("element xsl:{}: not allowed here", other));
                None
            }
            other => {
                self.report(
                    node,
                    format!("element xsl:{}: unknown or unsupported XSLT instruction", other),
                );
                None
            }
        }
    }

    pub(crate) fn parse_attribute_set_names(&self, value: Option<&str>) -> Vec<String> {
        value
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

pub(crate) fn is_xsl(node: Node, local: &str) -> bool {
    node.is_element()
        && node.tag_name().namespace() == Some(XSLT_NAMESPACE)
        && node.tag_name().name() == local
}

/// The element's name as written in the stylesheet, e.g. `xsl:value-of`.
pub(crate) fn element_name(node: Node) -> String {
    let tag = node.tag_name();
    match tag.namespace().and_then(|uri| node.lookup_prefix(uri)) {
        Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, tag.name()),
        _ => tag.name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{VariableValue, XsltInstruction};
    use crate::datasources::xml::parse_document;

    fn compile_text(xsl: &str) -> (CompiledStylesheet, Vec<crate::error::ProcessorError>) {
        let doc = parse_document(xsl).unwrap();
        let mut queue = ErrorQueue::new();
        let compiled = compile(&doc, "test.xsl", &mut queue);
        (compiled, queue.drain())
    }

    #[test]
    fn compiles_rules_named_templates_and_globals() {
        let (compiled, errors) = compile_text(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                <xsl:param name="title" select="'Untitled'"/>
                <xsl:variable name="count" select="3"/>
                <xsl:template match="/"><out><xsl:apply-templates/></out></xsl:template>
                <xsl:template match="item|entry" mode="list"><li/></xsl:template>
                <xsl:template name="helper"><xsl:param name="x"/><xsl:value-of select="$x"/></xsl:template>
            </xsl:stylesheet>"#,
        );
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(compiled.template_rules[&None].len(), 1);
        assert_eq!(compiled.template_rules[&Some("list".to_string())].len(), 2);
        let helper = &compiled.named_templates["helper"];
        assert_eq!(helper.params[0].name, "x");
        assert_eq!(helper.params[0].default_value, VariableValue::Empty);
        assert_eq!(helper.body.0.len(), 1);
        assert_eq!(compiled.globals.len(), 2);
        assert!(compiled.globals[0].is_param);
    }

    #[test]
    fn collects_every_error_with_its_line() {
        let (_, errors) = compile_text(
            "<xsl:stylesheet version=\"1.0\" xmlns:xsl=\"http://www.w3.org/1999/XSL/Transform\">\n\
             <xsl:template match=\"/\">\n\
             <xsl:value-of/>\n\
             <xsl:if test=\"((\"/>\n\
             </xsl:template>\n\
             </xsl:stylesheet>",
        );
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].line, 3);
        assert_eq!(errors[0].file, "test.xsl");
        assert!(errors[0].message.contains("missing required attribute 'select'"));
        assert_eq!(errors[1].line, 4);
        assert!(errors[1].message.starts_with("element xsl:if"));
    }

    #[test]
    fn whitespace_only_text_is_dropped_except_in_xsl_text() {
        let (compiled, _) = compile_text(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                <xsl:template match="/">
                    <xsl:text> </xsl:text>
                    Hello
                </xsl:template>
            </xsl:stylesheet>"#,
        );
        let body = &compiled.template_rules[&None][0].body.0;
        assert_eq!(body.len(), 2);
        assert_eq!(
            body[0].instruction,
            XsltInstruction::Text {
                value: " ".into(),
                disable_escaping: false
            }
        );
        assert!(matches!(&body[1].instruction, XsltInstruction::Text { value, .. } if value.trim() == "Hello"));
    }

    #[test]
    fn simplified_stylesheet_becomes_root_rule() {
        let (compiled, errors) = compile_text(
            r#"<html xsl:version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform"><p><xsl:value-of select="/doc"/></p></html>"#,
        );
        assert!(errors.is_empty());
        let rule = &compiled.template_rules[&None][0];
        assert_eq!(rule.pattern.to_string(), "/");
        assert_eq!(rule.body.0[0].element, "html");
    }

    #[test]
    fn non_stylesheet_document_is_rejected() {
        let (_, errors) = compile_text("<root/>");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("not an XSLT stylesheet"));
    }

    #[test]
    fn rule_order_prefers_priority_then_last_declared() {
        let (compiled, _) = compile_text(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                <xsl:template match="*"><a/></xsl:template>
                <xsl:template match="item"><b/></xsl:template>
                <xsl:template match="item"><c/></xsl:template>
                <xsl:template match="node()" priority="2"><d/></xsl:template>
            </xsl:stylesheet>"#,
        );
        let names: Vec<String> = compiled.template_rules[&None]
            .iter()
            .map(|rule| rule.body.0[0].element.clone())
            .collect();
        assert_eq!(names, vec!["d", "c", "b", "a"]);
    }
}
