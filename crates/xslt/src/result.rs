//! The generic result tree produced by a transform, and its `xsl:output` settings.

use crate::error::XsltError;

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// A name in the result tree. The prefix is a hint; the serializer declares whatever
/// binding the namespace needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputName {
    pub prefix: Option<String>,
    pub local: String,
    pub namespace: Option<String>,
}

impl OutputName {
    pub fn local(local: impl Into<String>) -> Self {
        OutputName {
            prefix: None,
            local: local.into(),
            namespace: None,
        }
    }

    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.local),
            None => self.local.clone(),
        }
    }

    fn from_node(node: roxmltree::Node) -> Self {
        let tag = node.tag_name();
        OutputName {
            prefix: tag.namespace().and_then(|uri| node.lookup_prefix(uri)).map(str::to_string),
            local: tag.name().to_string(),
            namespace: tag.namespace().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMethod {
    #[default]
    Xml,
    Html,
    Text,
}

/// Serialization parameters taken from `xsl:output`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputSettings {
    pub method: OutputMethod,
    /// False until a stylesheet names a method; the html method is then inferred from the result.
    pub method_explicit: bool,
    pub indent: bool,
    pub omit_xml_declaration: bool,
    pub encoding: Option<String>,
    pub standalone: Option<bool>,
    pub doctype_public: Option<String>,
    pub doctype_system: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultElement {
    pub name: OutputName,
    pub attributes: Vec<(OutputName, String)>,
    /// Namespace declarations requested on this element, as `(prefix, uri)`.
    pub namespaces: Vec<(Option<String>, String)>,
    pub children: Vec<ResultNode>,
}

impl ResultElement {
    pub fn new(name: OutputName) -> Self {
        ResultElement {
            name,
            attributes: vec![],
            namespaces: vec![],
            children: vec![],
        }
    }

    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name.namespace.is_none() && name.local == local)
            .map(|(_, value)| value.as_str())
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultNode {
    Element(ResultElement),
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

fn collect_text(nodes: &[ResultNode], out: &mut String) {
    for node in nodes {
        match node {
            ResultNode::Element(el) => collect_text(&el.children, out),
            ResultNode::Text(text) => out.push_str(text),
            ResultNode::Comment(_) | ResultNode::ProcessingInstruction { .. } => {}
        }
    }
}

/// The document produced by a transform in `Document` mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultDocument {
    pub children: Vec<ResultNode>,
    pub output: OutputSettings,
}

impl ResultDocument {
    /// Builds a result document from XML text, so documents obtained as text can be tidied.
    pub fn parse(text: &str) -> Result<Self, XsltError> {
        let doc = crate::datasources::xml::parse_document(text)?;
        let children = doc.root().children().filter_map(convert_node).collect();
        Ok(ResultDocument {
            children,
            output: OutputSettings::default(),
        })
    }

    /// The single top-level element, if the document is well-formed.
    pub fn document_element(&self) -> Option<&ResultElement> {
        self.children.iter().find_map(|node| match node {
            ResultNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

fn convert_node(node: roxmltree::Node) -> Option<ResultNode> {
    match node.node_type() {
        roxmltree::NodeType::Element => {
            let mut element = ResultElement::new(OutputName::from_node(node));
            let inherited: Vec<(Option<&str>, &str)> = node
                .parent_element()
                .map(|p| p.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
                .unwrap_or_default();
            for ns in node.namespaces() {
                if ns.uri() != XML_NAMESPACE && !inherited.contains(&(ns.name(), ns.uri())) {
                    element
                        .namespaces
                        .push((ns.name().map(str::to_string), ns.uri().to_string()));
                }
            }
            for attr in node.attributes() {
                let prefix = match attr.namespace() {
                    Some(XML_NAMESPACE) => Some("xml"),
                    Some(uri) => node.lookup_prefix(uri),
                    None => None,
                };
                element.attributes.push((
                    OutputName {
                        prefix: prefix.map(str::to_string),
                        local: attr.name().to_string(),
                        namespace: attr.namespace().map(str::to_string),
                    },
                    attr.value().to_string(),
                ));
            }
            element.children = node.children().filter_map(convert_node).collect();
            Some(ResultNode::Element(element))
        }
        roxmltree::NodeType::Text => node.text().map(|t| ResultNode::Text(t.to_string())),
        roxmltree::NodeType::Comment => node.text().map(|t| ResultNode::Comment(t.to_string())),
        roxmltree::NodeType::PI => node.pi().map(|pi| ResultNode::ProcessingInstruction {
            target: pi.target.to_string(),
            data: pi.value.unwrap_or_default().to_string(),
        }),
        roxmltree::NodeType::Root => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_structure_and_local_declarations() {
        let doc = ResultDocument::parse(
            r#"<r xmlns:a="urn:a"><a:item a:flag="1">x</a:item><!--c--><?pi data?></r>"#,
        )
        .unwrap();
        let root = doc.document_element().unwrap();
        assert_eq!(root.namespaces, vec![(Some("a".to_string()), "urn:a".to_string())]);
        let ResultNode::Element(item) = &root.children[0] else {
            panic!("expected an element");
        };
        assert_eq!(item.name.qualified(), "a:item");
        assert!(item.namespaces.is_empty());
        assert_eq!(item.attributes[0].0.namespace.as_deref(), Some("urn:a"));
        assert_eq!(root.children[1], ResultNode::Comment("c".into()));
        assert_eq!(
            root.children[2],
            ResultNode::ProcessingInstruction {
                target: "pi".into(),
                data: "data".into()
            }
        );
        assert_eq!(doc.text_content(), "x");
    }

    #[test]
    fn parse_rejects_malformed_text() {
        assert!(matches!(
            ResultDocument::parse("<a><b></a>"),
            Err(XsltError::XmlParse(_))
        ));
    }
}
