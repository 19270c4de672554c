//! Handlers for flow control: `if`, `choose`, `for-each`, `apply-templates`, `call-template`.

use crate::ast::{SortDataType, SortKey, SortOrder, When, XsltInstruction};
use crate::compiler::{CompilerBuilder, element_name, is_xsl};
use roxmltree::Node;

impl CompilerBuilder<'_> {
    pub(crate) fn handle_if(&mut self, node: Node) -> Option<XsltInstruction> {
        let test = self.required_xpath(node, "test")?;
        let body = self.compile_body(node);
        Some(XsltInstruction::If { test, body })
    }

    pub(crate) fn handle_choose(&mut self, node: Node) -> Option<XsltInstruction> {
        let mut whens = Vec::new();
        let mut otherwise = None;
        for child in node.children().filter(Node::is_element) {
            if is_xsl(child, "when") && otherwise.is_none() {
                if let Some(test) = self.required_xpath(child, "test") {
                    let body = self.compile_body(child);
                    whens.push(When { test, body });
                }
            } else if is_xsl(child, "otherwise") && otherwise.is_none() {
                otherwise = Some(self.compile_body(child));
            } else {
                self.report(
                    child,
                    format!("element {}: not allowed inside xsl:choose", element_name(child)),
                );
            }
        }
        if whens.is_empty() {
            self.report(node, "element xsl:choose: requires at least one xsl:when");
            return None;
        }
        Some(XsltInstruction::Choose { whens, otherwise })
    }

    pub(crate) fn handle_for_each(&mut self, node: Node) -> Option<XsltInstruction> {
        let select = self.required_xpath(node, "select")?;
        let sort_keys = self.compile_sort_keys(node);
        let body = self.compile_sequence(node, &["sort"]);
        Some(XsltInstruction::ForEach {
            select,
            sort_keys,
            body,
        })
    }

    pub(crate) fn handle_apply_templates(&mut self, node: Node) -> Option<XsltInstruction> {
        let select = self.optional_xpath(node, "select")?;
        let sort_keys = self.compile_sort_keys(node);
        let params = self.compile_with_params(node);
        for child in node.children().filter(Node::is_element) {
            if !(is_xsl(child, "sort") || is_xsl(child, "with-param")) {
                self.report(
                    child,
                    format!(
                        "element {}: not allowed inside xsl:apply-templates",
                        element_name(child)
                    ),
                );
            }
        }
        Some(XsltInstruction::ApplyTemplates {
            select,
            mode: node.attribute("mode").map(str::to_string),
            sort_keys,
            params,
        })
    }

    pub(crate) fn handle_call_template(&mut self, node: Node) -> Option<XsltInstruction> {
        let name = self.required_attr(node, "name")?;
        let params = self.compile_with_params(node);
        Some(XsltInstruction::CallTemplate {
            name: name.to_string(),
            params,
        })
    }

    fn compile_sort_keys(&mut self, node: Node) -> Vec<SortKey> {
        let mut keys = Vec::new();
        for child in node.children().filter(|c| is_xsl(*c, "sort")) {
            let Some(select) = self.parse_xpath(child, child.attribute("select").unwrap_or(".")) else {
                continue;
            };
            let order = match child.attribute("order") {
                None | Some("ascending") => SortOrder::Ascending,
                Some("descending") => SortOrder::Descending,
                Some(other) => {
                    self.report(child, format!("element xsl:sort: invalid order '{}'", other));
                    continue;
                }
            };
            let data_type = match child.attribute("data-type") {
                None | Some("text") => SortDataType::Text,
                Some("number") => SortDataType::Number,
                Some(other) => {
                    self.warn(child, &format!("sort data-type '{}' treated as text", other));
                    SortDataType::Text
                }
            };
            if child.has_attribute("lang") || child.has_attribute("case-order") {
                self.warn(child, "xsl:sort lang and case-order are ignored");
            }
            keys.push(SortKey {
                select,
                order,
                data_type,
            });
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{SortDataType, SortOrder, XsltInstruction};
    use crate::compiler::compile;
    use crate::datasources::xml::parse_document;
    use crate::error::ErrorQueue;

    fn first_instruction(template_body: &str) -> (XsltInstruction, usize) {
        let xsl = format!(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                <xsl:template match="/">{}</xsl:template>
            </xsl:stylesheet>"#,
            template_body
        );
        let doc = parse_document(&xsl).unwrap();
        let mut queue = ErrorQueue::new();
        let compiled = compile(&doc, "t.xsl", &mut queue);
        let body = &compiled.template_rules[&None][0].body.0;
        (body[0].instruction.clone(), queue.len())
    }

    #[test]
    fn for_each_with_sort_keys() {
        let (instruction, errors) = first_instruction(
            r#"<xsl:for-each select="item">
                 <xsl:sort select="@n" data-type="number" order="descending"/>
                 <xsl:value-of select="."/>
               </xsl:for-each>"#,
        );
        assert_eq!(errors, 0);
        let XsltInstruction::ForEach { sort_keys, body, .. } = instruction else {
            panic!("expected for-each");
        };
        assert_eq!(sort_keys[0].order, SortOrder::Descending);
        assert_eq!(sort_keys[0].data_type, SortDataType::Number);
        assert_eq!(body.0.len(), 1);
    }

    #[test]
    fn apply_templates_with_mode_and_params() {
        let (instruction, errors) = first_instruction(
            r#"<xsl:apply-templates select="*" mode="toc"><xsl:with-param name="depth" select="1"/></xsl:apply-templates>"#,
        );
        assert_eq!(errors, 0);
        let XsltInstruction::ApplyTemplates { mode, params, select, .. } = instruction else {
            panic!("expected apply-templates");
        };
        assert_eq!(mode.as_deref(), Some("toc"));
        assert_eq!(params[0].name, "depth");
        assert!(select.is_some());
    }

    #[test]
    fn choose_rejects_stray_children() {
        let (instruction, errors) = first_instruction(
            r#"<xsl:choose><xsl:when test="1">a</xsl:when><xsl:otherwise>b</xsl:otherwise><p/></xsl:choose>"#,
        );
        assert_eq!(errors, 1);
        assert!(matches!(instruction, XsltInstruction::Choose { whens, otherwise: Some(_) } if whens.len() == 1));
    }
}
