//! Handlers for instructions that create result nodes.

use crate::ast::{AttributeValueTemplate, XsltInstruction};
use crate::compiler::CompilerBuilder;
use crate::pattern;
use crate::util::yes_no;
use roxmltree::Node;

impl CompilerBuilder<'_> {
    pub(crate) fn handle_value_of(&mut self, node: Node) -> Option<XsltInstruction> {
        let select = self.required_xpath(node, "select")?;
        Some(XsltInstruction::ValueOf { select })
    }

    pub(crate) fn handle_copy_of(&mut self, node: Node) -> Option<XsltInstruction> {
        let select = self.required_xpath(node, "select")?;
        Some(XsltInstruction::CopyOf { select })
    }

    /// `xsl:text` keeps its content verbatim, whitespace included.
    pub(crate) fn handle_text(&mut self, node: Node) -> XsltInstruction {
        if node.children().any(|c| c.is_element()) {
            self.report(node, "element xsl:text: cannot contain elements");
        }
        XsltInstruction::Text {
            value: node.children().filter_map(|c| c.text()).collect(),
            disable_escaping: yes_no(node.attribute("disable-output-escaping")),
        }
    }

    pub(crate) fn handle_copy(&mut self, node: Node) -> XsltInstruction {
        XsltInstruction::Copy {
            use_attribute_sets: self.parse_attribute_set_names(node.attribute("use-attribute-sets")),
            body: self.compile_body(node),
        }
    }

    pub(crate) fn handle_element(&mut self, node: Node) -> Option<XsltInstruction> {
        let name_text = self.required_attr(node, "name")?;
        let name = self.parse_avt(node, name_text)?;
        let namespace = self.optional_avt(node, "namespace")?;
        Some(XsltInstruction::Element {
            name,
            namespace,
            use_attribute_sets: self.parse_attribute_set_names(node.attribute("use-attribute-sets")),
            body: self.compile_body(node),
        })
    }

    pub(crate) fn handle_attribute(&mut self, node: Node) -> Option<XsltInstruction> {
        let name_text = self.required_attr(node, "name")?;
        let name = self.parse_avt(node, name_text)?;
        let namespace = self.optional_avt(node, "namespace")?;
        Some(XsltInstruction::Attribute {
            name,
            namespace,
            body: self.compile_body(node),
        })
    }

    pub(crate) fn handle_comment(&mut self, node: Node) -> XsltInstruction {
        XsltInstruction::Comment {
            body: self.compile_body(node),
        }
    }

    pub(crate) fn handle_processing_instruction(&mut self, node: Node) -> Option<XsltInstruction> {
        let name_text = self.required_attr(node, "name")?;
        let name = self.parse_avt(node, name_text)?;
        Some(XsltInstruction::ProcessingInstruction {
            name,
            body: self.compile_body(node),
        })
    }

    pub(crate) fn handle_message(&mut self, node: Node) -> XsltInstruction {
        XsltInstruction::Message {
            terminate: yes_no(node.attribute("terminate")),
            body: self.compile_body(node),
        }
    }

    pub(crate) fn handle_number(&mut self, node: Node) -> Option<XsltInstruction> {
        if let Some(level) = node.attribute("level").filter(|l| *l != "single") {
            self.warn(node, &format!("xsl:number level '{}' is treated as single", level));
        }
        if node.has_attribute("from") {
            self.warn(node, "xsl:number 'from' is ignored");
        }
        let value = self.optional_xpath(node, "value")?;
        let count = match node.attribute("count") {
            Some(text) => match pattern::parse(text) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    self.report(node, format!("element xsl:number: {}", e));
                    return None;
                }
            },
            None => None,
        };
        let format = self
            .optional_avt(node, "format")?
            .unwrap_or_else(|| AttributeValueTemplate::Static("1".to_string()));
        Some(XsltInstruction::Number {
            value,
            count,
            format,
        })
    }
}
