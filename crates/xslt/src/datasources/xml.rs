// XML datasource implementation using roxmltree
use crate::ast::WhitespaceRules;
use crate::result::XML_NAMESPACE;
use roxmltree::Node;
use std::hash::{Hash, Hasher};
use xslproc_xpath1::{DataSourceNode, NodeType, QName};

/// Parses XML text the way every document in this crate is parsed: DTDs are accepted.
pub fn parse_document(text: &str) -> Result<roxmltree::Document<'_>, roxmltree::Error> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    roxmltree::Document::parse_with_options(text, options)
}

/// An owned source document together with the whitespace rules applied while navigating it.
pub struct XmlDocument<'input> {
    doc: roxmltree::Document<'input>,
    strip: WhitespaceRules,
}

impl<'input> XmlDocument<'input> {
    pub fn parse(text: &'input str) -> Result<Self, roxmltree::Error> {
        Ok(Self::from_document(parse_document(text)?))
    }

    pub fn from_document(doc: roxmltree::Document<'input>) -> Self {
        Self {
            doc,
            strip: WhitespaceRules::default(),
        }
    }

    /// Applies `xsl:strip-space` / `xsl:preserve-space` rules to every later navigation.
    pub fn strip_whitespace(&mut self, rules: WhitespaceRules) {
        self.strip = rules;
    }

    pub fn document(&self) -> &roxmltree::Document<'input> {
        &self.doc
    }

    pub fn root_node(&self) -> XmlNode<'_, 'input> {
        XmlNode::root_of(&self.doc, &self.strip)
    }
}

#[derive(Debug, Clone, Copy)]
enum Handle<'a, 'input> {
    /// A regular node (root, element, text, comment or processing instruction).
    Node(Node<'a, 'input>),
    /// roxmltree keeps attributes as data on elements, so they are addressed by index.
    Attribute { parent: Node<'a, 'input>, index: usize },
}

/// A navigable node of a roxmltree document. Whitespace-only text nodes are hidden from
/// `children()` when the rules say their parent element strips space.
#[derive(Debug, Clone, Copy)]
pub struct XmlNode<'a, 'input> {
    handle: Handle<'a, 'input>,
    rules: &'a WhitespaceRules,
}

impl<'a, 'input> XmlNode<'a, 'input> {
    pub fn root_of(doc: &'a roxmltree::Document<'input>, rules: &'a WhitespaceRules) -> Self {
        XmlNode {
            handle: Handle::Node(doc.root()),
            rules,
        }
    }

    fn wrap(&self, node: Node<'a, 'input>) -> Self {
        XmlNode {
            handle: Handle::Node(node),
            rules: self.rules,
        }
    }

    /// The underlying roxmltree node, or `None` for an attribute.
    pub fn inner(&self) -> Option<Node<'a, 'input>> {
        match self.handle {
            Handle::Node(node) => Some(node),
            Handle::Attribute { .. } => None,
        }
    }

    fn is_stripped(&self, node: Node<'a, 'input>) -> bool {
        if !node.is_text() || !node.text().is_some_and(|t| t.trim().is_empty()) {
            return false;
        }
        node.parent_element().is_some_and(|parent| {
            let tag = parent.tag_name();
            self.rules.should_strip(tag.namespace(), tag.name())
        })
    }

    fn order_key(&self) -> (usize, usize) {
        match self.handle {
            Handle::Node(node) => (node.id().get() as usize, 0),
            Handle::Attribute { parent, index } => (parent.id().get() as usize, index + 1),
        }
    }
}

impl PartialEq for XmlNode<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        self.order_key() == other.order_key()
    }
}

impl Eq for XmlNode<'_, '_> {}

impl PartialOrd for XmlNode<'_, '_> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// Node ids follow document order, and an element's attributes sit between the element and its
// first child.
impl Ord for XmlNode<'_, '_> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let (a_id, a_attr) = self.order_key();
        let (b_id, b_attr) = other.order_key();
        match (self.handle, other.handle) {
            (Handle::Attribute { .. }, Handle::Node(_)) if a_id != b_id && b_id > a_id => {
                std::cmp::Ordering::Less
            }
            _ => (a_id, a_attr).cmp(&(b_id, b_attr)),
        }
    }
}

impl Hash for XmlNode<'_, '_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.order_key().hash(state);
    }
}

impl<'a> DataSourceNode<'a> for XmlNode<'a, 'a> {
    fn node_type(&self) -> NodeType {
        match self.handle {
            Handle::Node(node) => match node.node_type() {
                roxmltree::NodeType::Root => NodeType::Root,
                roxmltree::NodeType::Element => NodeType::Element,
                roxmltree::NodeType::Text => NodeType::Text,
                roxmltree::NodeType::Comment => NodeType::Comment,
                roxmltree::NodeType::PI => NodeType::ProcessingInstruction,
            },
            Handle::Attribute { .. } => NodeType::Attribute,
        }
    }

    fn name(&self) -> Option<QName<'a>> {
        match self.handle {
            Handle::Node(node) if node.is_element() => {
                let tag = node.tag_name();
                Some(QName {
                    prefix: tag.namespace().and_then(|uri| node.lookup_prefix(uri)),
                    local_part: tag.name(),
                })
            }
            Handle::Node(node) => node.pi().map(|pi| QName {
                prefix: None,
                local_part: pi.target,
            }),
            Handle::Attribute { parent, index } => parent.attributes().nth(index).map(|attr| {
                let prefix = match attr.namespace() {
                    Some(XML_NAMESPACE) => Some("xml"),
                    Some(uri) => parent.lookup_prefix(uri),
                    None => None,
                };
                QName {
                    prefix,
                    local_part: attr.name(),
                }
            }),
        }
    }

    fn namespace_uri(&self) -> Option<&'a str> {
        match self.handle {
            Handle::Node(node) if node.is_element() => node.tag_name().namespace(),
            Handle::Node(_) => None,
            Handle::Attribute { parent, index } => {
                parent.attributes().nth(index).and_then(|attr| attr.namespace())
            }
        }
    }

    fn namespaces(&self) -> Vec<(Option<String>, String)> {
        match self.handle {
            Handle::Node(node) if node.is_element() => node
                .namespaces()
                .filter(|ns| ns.uri() != XML_NAMESPACE)
                .map(|ns| (ns.name().map(str::to_string), ns.uri().to_string()))
                .collect(),
            _ => vec![],
        }
    }

    fn string_value(&self) -> String {
        match self.handle {
            Handle::Node(node) => match node.node_type() {
                roxmltree::NodeType::Root | roxmltree::NodeType::Element => node
                    .descendants()
                    .filter(|n| n.is_text() && !self.is_stripped(*n))
                    .filter_map(|n| n.text())
                    .collect(),
                roxmltree::NodeType::PI => node
                    .pi()
                    .and_then(|pi| pi.value)
                    .unwrap_or_default()
                    .to_string(),
                _ => node.text().unwrap_or_default().to_string(),
            },
            Handle::Attribute { parent, index } => parent
                .attributes()
                .nth(index)
                .map(|attr| attr.value().to_string())
                .unwrap_or_default(),
        }
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self.handle {
            Handle::Node(node) if node.is_element() => {
                let rules = self.rules;
                let count = node.attributes().len();
                Box::new((0..count).map(move |index| XmlNode {
                    handle: Handle::Attribute {
                        parent: node,
                        index,
                    },
                    rules,
                }))
            }
            _ => Box::new(std::iter::empty()),
        }
    }

    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self.handle {
            Handle::Node(node) => {
                let this = *self;
                Box::new(
                    node.children()
                        .filter(move |child| !this.is_stripped(*child))
                        .map(move |child| this.wrap(child)),
                )
            }
            Handle::Attribute { .. } => Box::new(std::iter::empty()),
        }
    }

    fn parent(&self) -> Option<Self> {
        match self.handle {
            Handle::Node(node) => node.parent().map(|p| self.wrap(p)),
            Handle::Attribute { parent, .. } => Some(self.wrap(parent)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NameTest;

    fn child<'a>(node: XmlNode<'a, 'a>, local: &str) -> XmlNode<'a, 'a> {
        node.children()
            .find(|n| n.name().is_some_and(|q| q.local_part == local))
            .unwrap()
    }

    #[test]
    fn test_xml_node_attributes() {
        let xml = r#"<root><item id="123" status="active">Text</item></root>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let item = child(child(doc.root_node(), "root"), "item");

        let attrs: Vec<_> = item.attributes().collect();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].node_type(), NodeType::Attribute);
        assert_eq!(attrs[0].name().unwrap().local_part, "id");
        assert_eq!(attrs[1].string_value(), "active");
        assert_eq!(attrs[0].parent(), Some(item));

        // Document order: element, its attributes, then its children.
        let text = item.children().next().unwrap();
        assert!(item < attrs[0]);
        assert!(attrs[0] < attrs[1]);
        assert!(attrs[1] < text);
    }

    #[test]
    fn test_namespaced_names_report_prefix_and_uri() {
        let xml = r#"<a:doc xmlns:a="urn:a" a:kind="x" xml:lang="en"/>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let el = doc.root_node().children().next().unwrap();
        let name = el.name().unwrap();
        assert_eq!((name.prefix, name.local_part), (Some("a"), "doc"));
        assert_eq!(el.namespace_uri(), Some("urn:a"));
        let attr_prefixes: Vec<_> = el.attributes().map(|a| a.name().unwrap().prefix).collect();
        assert_eq!(attr_prefixes, vec![Some("a"), Some("xml")]);
        assert_eq!(el.namespaces(), vec![(Some("a".to_string()), "urn:a".to_string())]);
    }

    #[test]
    fn test_whitespace_stripping_rules() {
        let xml = "<doc>\n  <keep>  </keep>\n  <item> x </item>\n</doc>";
        let mut doc = XmlDocument::parse(xml).unwrap();
        assert_eq!(child(doc.root_node(), "doc").children().count(), 5);

        let mut rules = WhitespaceRules::default();
        rules.strip.push(NameTest::Any);
        rules.preserve.push(NameTest::Name {
            namespace: None,
            local: "keep".into(),
        });
        doc.strip_whitespace(rules);
        let root = child(doc.root_node(), "doc");
        assert_eq!(root.children().count(), 2);
        assert_eq!(child(root, "keep").children().count(), 1);
        assert_eq!(root.string_value(), "   x ");
    }
}
