//! A small in-memory tree for exercising the engine without an XML parser.
//!
//! Nodes must be added in document order: an element, then its attributes, then its children.

use super::{DataSourceNode, NodeType, QName};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

#[derive(Debug)]
struct MockData {
    node_type: NodeType,
    prefix: Option<&'static str>,
    local: &'static str,
    namespace: Option<&'static str>,
    value: String,
    parent: Option<usize>,
    children: Vec<usize>,
    attributes: Vec<usize>,
}

#[derive(Debug)]
pub(crate) struct MockTree {
    nodes: Vec<MockData>,
}

impl MockTree {
    pub(crate) fn new() -> Self {
        let root = MockData {
            node_type: NodeType::Root,
            prefix: None,
            local: "",
            namespace: None,
            value: String::new(),
            parent: None,
            children: vec![],
            attributes: vec![],
        };
        Self { nodes: vec![root] }
    }

    fn push(&mut self, parent: usize, data: MockData, is_attribute: bool) -> usize {
        let id = self.nodes.len();
        self.nodes.push(data);
        if is_attribute {
            self.nodes[parent].attributes.push(id);
        } else {
            self.nodes[parent].children.push(id);
        }
        id
    }

    pub(crate) fn element(&mut self, parent: usize, local: &'static str) -> usize {
        self.push(
            parent,
            MockData {
                node_type: NodeType::Element,
                prefix: None,
                local,
                namespace: None,
                value: String::new(),
                parent: Some(parent),
                children: vec![],
                attributes: vec![],
            },
            false,
        )
    }

    pub(crate) fn element_ns(
        &mut self,
        parent: usize,
        prefix: &'static str,
        local: &'static str,
        namespace: &'static str,
    ) -> usize {
        let id = self.element(parent, local);
        self.nodes[id].prefix = Some(prefix);
        self.nodes[id].namespace = Some(namespace);
        id
    }

    pub(crate) fn attribute(&mut self, parent: usize, local: &'static str, value: &str) -> usize {
        self.push(
            parent,
            MockData {
                node_type: NodeType::Attribute,
                prefix: None,
                local,
                namespace: None,
                value: value.to_string(),
                parent: Some(parent),
                children: vec![],
                attributes: vec![],
            },
            true,
        )
    }

    pub(crate) fn text(&mut self, parent: usize, value: &str) -> usize {
        self.push(
            parent,
            MockData {
                node_type: NodeType::Text,
                prefix: None,
                local: "",
                namespace: None,
                value: value.to_string(),
                parent: Some(parent),
                children: vec![],
                attributes: vec![],
            },
            false,
        )
    }

    pub(crate) fn node(&self, id: usize) -> MockNode<'_> {
        MockNode { id, tree: self }
    }

    pub(crate) fn root(&self) -> MockNode<'_> {
        self.node(0)
    }
}

/// `<doc><para id="p1" lang="en">Hello</para><para id="p2">World</para><note>42</note></doc>`
pub(crate) fn sample_tree() -> MockTree {
    let mut tree = MockTree::new();
    let doc = tree.element(0, "doc");
    let p1 = tree.element(doc, "para");
    tree.attribute(p1, "id", "p1");
    tree.attribute(p1, "lang", "en");
    tree.text(p1, "Hello");
    let p2 = tree.element(doc, "para");
    tree.attribute(p2, "id", "p2");
    tree.text(p2, "World");
    let note = tree.element(doc, "note");
    tree.text(note, "42");
    tree
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct MockNode<'t> {
    pub(crate) id: usize,
    tree: &'t MockTree,
}

impl<'t> MockNode<'t> {
    fn data(&self) -> &'t MockData {
        &self.tree.nodes[self.id]
    }
}

impl PartialEq for MockNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MockNode<'_> {}

impl PartialOrd for MockNode<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MockNode<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Hash for MockNode<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<'t> DataSourceNode<'t> for MockNode<'t> {
    fn node_type(&self) -> NodeType {
        self.data().node_type
    }

    fn name(&self) -> Option<QName<'t>> {
        let data = self.data();
        match data.node_type {
            NodeType::Element | NodeType::Attribute => Some(QName {
                prefix: data.prefix,
                local_part: data.local,
            }),
            _ => None,
        }
    }

    fn namespace_uri(&self) -> Option<&'t str> {
        self.data().namespace
    }

    fn namespaces(&self) -> Vec<(Option<String>, String)> {
        let data = self.data();
        match (data.prefix, data.namespace) {
            (Some(prefix), Some(uri)) => vec![(Some(prefix.to_string()), uri.to_string())],
            _ => vec![],
        }
    }

    fn string_value(&self) -> String {
        let data = self.data();
        match data.node_type {
            NodeType::Root | NodeType::Element => self
                .children()
                .map(|child| child.string_value())
                .collect::<String>(),
            _ => data.value.clone(),
        }
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 't> {
        let tree = self.tree;
        Box::new(
            self.data()
                .attributes
                .iter()
                .map(move |&id| MockNode { id, tree }),
        )
    }

    fn children(&self) -> Box<dyn Iterator<Item = Self> + 't> {
        let tree = self.tree;
        Box::new(
            self.data()
                .children
                .iter()
                .map(move |&id| MockNode { id, tree }),
        )
    }

    fn parent(&self) -> Option<Self> {
        let tree = self.tree;
        self.data().parent.map(|id| MockNode { id, tree })
    }
}
