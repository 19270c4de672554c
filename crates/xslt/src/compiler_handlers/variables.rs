use crate::ast::{Param, VariableValue, WithParam, XsltInstruction};
use crate::compiler::{CompilerBuilder, element_name, is_xsl};
use roxmltree::Node;

impl CompilerBuilder<'_> {
    /// The value of a variable-binding element: its `select`, else its content, else empty.
    pub(crate) fn compile_variable_value(&mut self, node: Node) -> Option<VariableValue> {
        if let Some(select) = node.attribute("select") {
            let has_content = node
                .children()
                .any(|c| c.is_element() || c.text().is_some_and(|t| !t.trim().is_empty()));
            if has_content {
                self.report(
                    node,
                    format!(
                        "element {}: cannot have both a select attribute and content",
                        element_name(node)
                    ),
                );
                return None;
            }
            return self.parse_xpath(node, select).map(VariableValue::Select);
        }
        let body = self.compile_body(node);
        Some(if body.is_empty() {
            VariableValue::Empty
        } else {
            VariableValue::Body(body)
        })
    }

    pub(crate) fn handle_local_variable(&mut self, node: Node) -> Option<XsltInstruction> {
        let name = self.required_attr(node, "name")?;
        let value = self.compile_variable_value(node)?;
        Some(XsltInstruction::Variable {
            name: name.to_string(),
            value,
        })
    }

    /// Collects the `xsl:param` children of a template.
    pub(crate) fn compile_params(&mut self, node: Node) -> Vec<Param> {
        let mut params = Vec::new();
        for child in node.children().filter(|c| is_xsl(*c, "param")) {
            let Some(name) = self.required_attr(child, "name") else {
                continue;
            };
            if params.iter().any(|p: &Param| p.name == name) {
                self.report(child, format!("element xsl:param: duplicate parameter '{}'", name));
                continue;
            }
            if let Some(default_value) = self.compile_variable_value(child) {
                params.push(Param {
                    name: name.to_string(),
                    default_value,
                });
            }
        }
        params
    }

    /// Collects the `xsl:with-param` children of `apply-templates` or `call-template`.
    pub(crate) fn compile_with_params(&mut self, node: Node) -> Vec<WithParam> {
        let mut params = Vec::new();
        for child in node.children().filter(|c| is_xsl(*c, "with-param")) {
            let Some(name) = self.required_attr(child, "name") else {
                continue;
            };
            if let Some(value) = self.compile_variable_value(child) {
                params.push(WithParam {
                    name: name.to_string(),
                    value,
                });
            }
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{VariableValue, XsltInstruction};
    use crate::compiler::compile;
    use crate::datasources::xml::parse_document;
    use crate::error::ErrorQueue;

    #[test]
    fn variable_forms() {
        let doc = parse_document(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                <xsl:template match="/">
                    <xsl:variable name="a" select="1"/>
                    <xsl:variable name="b">text</xsl:variable>
                    <xsl:variable name="c"/>
                    <xsl:variable name="d" select="1">oops</xsl:variable>
                </xsl:template>
            </xsl:stylesheet>"#,
        )
        .unwrap();
        let mut queue = ErrorQueue::new();
        let compiled = compile(&doc, "t.xsl", &mut queue);
        let values: Vec<&VariableValue> = compiled.template_rules[&None][0]
            .body
            .0
            .iter()
            .filter_map(|i| match &i.instruction {
                XsltInstruction::Variable { value, .. } => Some(value),
                _ => None,
            })
            .collect();
        assert_eq!(values.len(), 3);
        assert!(matches!(values[0], VariableValue::Select(_)));
        assert!(matches!(values[1], VariableValue::Body(_)));
        assert_eq!(values[2], &VariableValue::Empty);
        assert_eq!(queue.len(), 1);
    }
}
