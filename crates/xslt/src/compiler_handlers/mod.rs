pub(super) mod control_flow;
pub(super) mod nodes;
pub(super) mod stylesheet;
pub(super) mod variables;

use crate::ast::XsltInstruction;
use crate::compiler::{CompilerBuilder, XSLT_NAMESPACE, element_name};
use crate::result::{OutputName, XML_NAMESPACE};
use roxmltree::Node;

// Handlers for shared logic that doesn't fit neatly into one file.
// They are implemented as methods on CompilerBuilder.

impl CompilerBuilder<'_> {
    pub(crate) fn handle_literal_result_element(&mut self, node: Node) -> Option<XsltInstruction> {
        let saved_exclusions = self.excluded_namespaces.clone();
        for attr in ["exclude-result-prefixes", "extension-element-prefixes"] {
            if let Some(prefixes) = node.attribute((XSLT_NAMESPACE, attr)) {
                self.exclude_prefixes(node, prefixes);
            }
        }

        let tag = node.tag_name();
        let name = OutputName {
            prefix: tag
                .namespace()
                .and_then(|uri| node.lookup_prefix(uri))
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            local: tag.name().to_string(),
            namespace: tag.namespace().map(str::to_string),
        };

        let mut attributes = Vec::new();
        let mut use_attribute_sets = Vec::new();
        let mut failed = false;
        for attr in node.attributes() {
            if attr.namespace() == Some(XSLT_NAMESPACE) {
                if attr.name() == "use-attribute-sets" {
                    use_attribute_sets = self.parse_attribute_set_names(Some(attr.value()));
                }
                continue;
            }
            let Some(value) = self.parse_avt(node, attr.value()) else {
                failed = true;
                continue;
            };
            let prefix = match attr.namespace() {
                Some(XML_NAMESPACE) => Some("xml"),
                Some(uri) => node.lookup_prefix(uri),
                None => None,
            };
            attributes.push((
                OutputName {
                    prefix: prefix.map(str::to_string),
                    local: attr.name().to_string(),
                    namespace: attr.namespace().map(str::to_string),
                },
                value,
            ));
        }

        let namespaces = node
            .namespaces()
            .filter(|ns| ns.uri() != XML_NAMESPACE && !self.excluded_namespaces.contains(ns.uri()))
            .map(|ns| (ns.name().map(str::to_string), ns.uri().to_string()))
            .collect();

        let body = self.compile_body(node);
        self.excluded_namespaces = saved_exclusions;
        if failed {
            return None;
        }
        Some(XsltInstruction::LiteralElement {
            name,
            attributes,
            namespaces,
            use_attribute_sets,
            body,
        })
    }

    /// Adds the namespaces named by an `exclude-result-prefixes` style list to the exclusions.
    pub(crate) fn exclude_prefixes(&mut self, node: Node, prefixes: &str) {
        for token in prefixes.split_whitespace() {
            let prefix = if token == "#default" { None } else { Some(token) };
            match node.lookup_namespace_uri(prefix) {
                Some(uri) => {
                    self.excluded_namespaces.insert(uri.to_string());
                }
                None => self.report(
                    node,
                    format!(
                        "element {}: namespace prefix '{}' is not declared",
                        element_name(node),
                        token
                    ),
                ),
            }
        }
    }
}
