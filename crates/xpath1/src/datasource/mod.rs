//! Defines the core abstraction for a navigable, read-only document tree.
use std::hash::Hash;

#[cfg(test)]
pub(crate) mod mock;

/// A qualified name, consisting of an optional prefix and a local part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QName<'a> {
    pub prefix: Option<&'a str>,
    pub local_part: &'a str,
}

impl std::fmt::Display for QName<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.prefix {
            Some(prefix) => write!(f, "{}:{}", prefix, self.local_part),
            None => f.write_str(self.local_part),
        }
    }
}

/// The type of a node in the tree, aligned with the XPath 1.0 data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Root,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
}

/// The contract for a node in a read-only, hierarchical document.
///
/// The XPath engine and the XSLT executor are written exclusively against this trait.
/// `Ord` must follow document order: an element sorts before its attributes, and its
/// attributes sort before its children.
///
/// `'a` is the lifetime of the underlying document.
pub trait DataSourceNode<'a>:
    std::fmt::Debug + Clone + Copy + PartialEq + Eq + Hash + PartialOrd + Ord
{
    fn node_type(&self) -> NodeType;

    /// The qualified name of the node. `None` for text, comment and root nodes.
    /// For a processing instruction this is its target.
    fn name(&self) -> Option<QName<'a>>;

    /// The namespace URI of an element or attribute name.
    fn namespace_uri(&self) -> Option<&'a str>;

    /// Namespace bindings in scope on an element, as `(prefix, uri)` pairs.
    /// A `None` prefix is the default namespace.
    fn namespaces(&self) -> Vec<(Option<String>, String)>;

    /// The string value of the node, as defined by the XPath 1.0 `string()` function.
    fn string_value(&self) -> String;

    /// Attribute nodes of an element; empty for every other node type.
    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a>;

    /// Child nodes in document order; empty for leaf nodes.
    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a>;

    /// The parent node. For an attribute, its owning element. `None` for the root.
    fn parent(&self) -> Option<Self>;
}
