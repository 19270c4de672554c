//! Handlers for top-level stylesheet elements.

use crate::ast::{
    AttributeSet, GlobalBinding, KeyDefinition, LocatedInstruction, NameTest, NamedTemplate,
    PreparsedTemplate, TemplateRule,
};
use crate::compiler::{CompilerBuilder, XSLT_NAMESPACE, element_name};
use crate::error::Location;
use crate::pattern;
use crate::result::OutputMethod;
use crate::util::yes_no;
use roxmltree::Node;

impl CompilerBuilder<'_> {
    pub(crate) fn handle_stylesheet(&mut self, root: Node) {
        if root.attribute("version").is_none() {
            self.warn(root, "xsl:stylesheet has no version attribute");
        }
        for attr in ["exclude-result-prefixes", "extension-element-prefixes"] {
            if let Some(prefixes) = root.attribute(attr) {
                self.exclude_prefixes(root, prefixes);
            }
        }

        for child in root.children().filter(Node::is_element) {
            if child.tag_name().namespace() != Some(XSLT_NAMESPACE) {
                // Top-level elements in other namespaces are ignored.
                continue;
            }
            match child.tag_name().name() {
                "template" => self.handle_template(child),
                "variable" => self.handle_global(child, false),
                "param" => self.handle_global(child, true),
                "key" => self.handle_key(child),
                "attribute-set" => self.handle_attribute_set(child),
                "output" => self.handle_output(child),
                "strip-space" => self.handle_space(child, true),
                "preserve-space" => self.handle_space(child, false),
                other @ ("import" | "include") => self.report(
                    child,
                    format!("element xsl:{}: stylesheet modules are not supported", other),
                ),
                other @ ("decimal-format" | "namespace-alias") => {
                    self.warn(child, &format!("xsl:{} is ignored", other))
                }
                other => self.report(
                    child,
                    format!("element xsl:{}: not allowed at the top level", other),
                ),
            }
        }
    }

    /// A literal result element carrying `xsl:version` is the body of a `match="/"` rule.
    pub(crate) fn handle_simplified_stylesheet(&mut self, root: Node) {
        let Some(instruction) = self.handle_literal_result_element(root) else {
            return;
        };
        let Ok(pattern) = pattern::parse("/") else {
            return;
        };
        let location = Location::of(root);
        let rule = TemplateRule {
            priority: pattern.default_priority(),
            pattern,
            mode: None,
            body: PreparsedTemplate(vec![LocatedInstruction {
                location,
                element: element_name(root),
                instruction,
            }]),
            params: vec![],
            order: 0,
            location,
        };
        self.stylesheet.template_rules.entry(None).or_default().push(rule);
    }

    fn handle_template(&mut self, node: Node) {
        let name = node.attribute("name");
        let match_text = node.attribute("match");
        if name.is_none() && match_text.is_none() {
            self.report(
                node,
                "element xsl:template: requires a 'match' or 'name' attribute",
            );
            return;
        }

        let location = Location::of(node);
        let params = self.compile_params(node);
        let body = self.compile_sequence(node, &["param"]);

        if let Some(name) = name {
            let template = NamedTemplate {
                params: params.clone(),
                body: body.clone(),
                location,
            };
            if self
                .stylesheet
                .named_templates
                .insert(name.to_string(), template)
                .is_some()
            {
                self.report(
                    node,
                    format!("element xsl:template: duplicate template name '{}'", name),
                );
            }
        }

        let Some(match_text) = match_text else {
            return;
        };
        let pattern = match pattern::parse(match_text) {
            Ok(pattern) => pattern,
            Err(e) => {
                self.report(node, format!("element xsl:template: {}", e));
                return;
            }
        };
        let explicit_priority = match node.attribute("priority") {
            Some(text) => match text.trim().parse::<f64>() {
                Ok(priority) => Some(priority),
                Err(_) => {
                    self.report(
                        node,
                        format!("element xsl:template: invalid priority '{}'", text),
                    );
                    return;
                }
            },
            None => None,
        };

        let mode = node.attribute("mode").map(str::to_string);
        let order = self.next_order;
        self.next_order += 1;
        let alternatives = match explicit_priority {
            Some(_) => vec![pattern],
            None => pattern.split(),
        };
        let rules = self.stylesheet.template_rules.entry(mode.clone()).or_default();
        for alternative in alternatives {
            rules.push(TemplateRule {
                priority: explicit_priority.unwrap_or_else(|| alternative.default_priority()),
                pattern: alternative,
                mode: mode.clone(),
                body: body.clone(),
                params: params.clone(),
                order,
                location,
            });
        }
    }

    fn handle_global(&mut self, node: Node, is_param: bool) {
        let Some(name) = self.required_attr(node, "name") else {
            return;
        };
        if self.stylesheet.globals.iter().any(|g| g.name == name) {
            self.report(
                node,
                format!("element {}: duplicate global binding '{}'", element_name(node), name),
            );
            return;
        }
        let Some(value) = self.compile_variable_value(node) else {
            return;
        };
        self.stylesheet.globals.push(GlobalBinding {
            name: name.to_string(),
            value,
            is_param,
            location: Location::of(node),
        });
    }

    fn handle_key(&mut self, node: Node) {
        let (Some(name), Some(match_text)) = (
            self.required_attr(node, "name"),
            self.required_attr(node, "match"),
        ) else {
            return;
        };
        let Some(use_expr) = self.required_xpath(node, "use") else {
            return;
        };
        match pattern::parse(match_text) {
            Ok(pattern) => self.stylesheet.keys.push(KeyDefinition {
                name: name.to_string(),
                pattern,
                use_expr,
                location: Location::of(node),
            }),
            Err(e) => self.report(node, format!("element xsl:key: {}", e)),
        }
    }

    fn handle_attribute_set(&mut self, node: Node) {
        let Some(name) = self.required_attr(node, "name") else {
            return;
        };
        let use_attribute_sets = self.parse_attribute_set_names(node.attribute("use-attribute-sets"));
        let attributes = self.compile_body(node);
        // Sets with the same name merge, later attributes winning.
        let set = self
            .stylesheet
            .attribute_sets
            .entry(name.to_string())
            .or_insert_with(AttributeSet::default);
        set.use_attribute_sets.extend(use_attribute_sets);
        set.attributes.0.extend(attributes.0);
    }

    fn handle_output(&mut self, node: Node) {
        let mut output = std::mem::take(&mut self.stylesheet.output);
        if let Some(method) = node.attribute("method") {
            output.method_explicit = true;
            output.method = match method.trim() {
                "xml" => OutputMethod::Xml,
                "html" => OutputMethod::Html,
                "text" => OutputMethod::Text,
                other => {
                    self.warn(node, &format!("unknown output method '{}', using xml", other));
                    OutputMethod::Xml
                }
            };
        }
        if node.has_attribute("indent") {
            output.indent = yes_no(node.attribute("indent"));
        }
        if node.has_attribute("omit-xml-declaration") {
            output.omit_xml_declaration = yes_no(node.attribute("omit-xml-declaration"));
        }
        if let Some(standalone) = node.attribute("standalone") {
            output.standalone = Some(yes_no(Some(standalone)));
        }
        if let Some(encoding) = node.attribute("encoding") {
            output.encoding = Some(encoding.to_string());
        }
        if let Some(public) = node.attribute("doctype-public") {
            output.doctype_public = Some(public.to_string());
        }
        if let Some(system) = node.attribute("doctype-system") {
            output.doctype_system = Some(system.to_string());
        }
        self.stylesheet.output = output;
    }

    fn handle_space(&mut self, node: Node, strip: bool) {
        let Some(elements) = self.required_attr(node, "elements") else {
            return;
        };
        for token in elements.split_whitespace() {
            let test = match token.split_once(':') {
                None if token == "*" => NameTest::Any,
                None => NameTest::Name {
                    namespace: None,
                    local: token.to_string(),
                },
                Some((prefix, local)) => {
                    let Some(uri) = node.lookup_namespace_uri(Some(prefix)) else {
                        self.report(
                            node,
                            format!(
                                "element {}: namespace prefix '{}' is not declared",
                                element_name(node),
                                prefix
                            ),
                        );
                        continue;
                    };
                    if local == "*" {
                        NameTest::Namespace(uri.to_string())
                    } else {
                        NameTest::Name {
                            namespace: Some(uri.to_string()),
                            local: local.to_string(),
                        }
                    }
                }
            };
            if strip {
                self.stylesheet.whitespace.strip.push(test);
            } else {
                self.stylesheet.whitespace.preserve.push(test);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::NameTest;
    use crate::compiler::compile;
    use crate::datasources::xml::parse_document;
    use crate::error::ErrorQueue;
    use crate::result::OutputMethod;

    fn compile_ok(xsl: &str) -> crate::ast::CompiledStylesheet {
        let doc = parse_document(xsl).unwrap();
        let mut queue = ErrorQueue::new();
        let compiled = compile(&doc, "t.xsl", &mut queue);
        assert!(queue.is_empty(), "{:?}", queue.drain());
        compiled
    }

    #[test]
    fn output_and_whitespace_declarations() {
        let compiled = compile_ok(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform" xmlns:d="urn:d">
                <xsl:output method="html" indent="yes" doctype-system="about:legacy-compat"/>
                <xsl:strip-space elements="* d:*"/>
                <xsl:preserve-space elements="pre d:code"/>
            </xsl:stylesheet>"#,
        );
        assert_eq!(compiled.output.method, OutputMethod::Html);
        assert!(compiled.output.method_explicit);
        assert!(compiled.output.indent);
        assert_eq!(compiled.output.doctype_system.as_deref(), Some("about:legacy-compat"));
        assert_eq!(
            compiled.whitespace.strip,
            vec![NameTest::Any, NameTest::Namespace("urn:d".into())]
        );
        assert_eq!(compiled.whitespace.preserve.len(), 2);
    }

    #[test]
    fn keys_and_attribute_sets() {
        let compiled = compile_ok(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                <xsl:key name="by-id" match="item" use="@id"/>
                <xsl:attribute-set name="base"><xsl:attribute name="class">b</xsl:attribute></xsl:attribute-set>
                <xsl:attribute-set name="base"><xsl:attribute name="lang">en</xsl:attribute></xsl:attribute-set>
            </xsl:stylesheet>"#,
        );
        assert_eq!(compiled.keys[0].name, "by-id");
        assert_eq!(compiled.attribute_sets["base"].attributes.0.len(), 2);
    }

    #[test]
    fn unsupported_top_level_elements_are_errors() {
        let doc = parse_document(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                <xsl:import href="other.xsl"/>
                <xsl:template/>
                <xsl:template match="a[" />
            </xsl:stylesheet>"#,
        )
        .unwrap();
        let mut queue = ErrorQueue::new();
        compile(&doc, "t.xsl", &mut queue);
        let errors = queue.drain();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].message.contains("not supported"));
        assert_eq!(errors[1].line, 3);
        assert_eq!(errors[2].line, 4);
    }
}
