//! Defines the `OutputBuilder` trait, which decouples the executor from the tree it produces.

use crate::result::{OutputName, OutputSettings, ResultDocument, ResultElement, ResultNode};

/// The semantic actions of building a result tree, without exposing the concrete node types.
pub trait OutputBuilder {
    fn start_element(&mut self, name: OutputName);
    fn end_element(&mut self);

    /// Requests a namespace declaration on the currently open element.
    fn add_namespace(&mut self, prefix: Option<&str>, uri: &str);

    /// Sets an attribute on the currently open element.
    fn set_attribute(&mut self, name: OutputName, value: &str);

    fn add_text(&mut self, text: &str);
    fn add_comment(&mut self, text: &str);
    fn add_processing_instruction(&mut self, target: &str, data: &str);
}

/// Builds a [`ResultDocument`].
#[derive(Debug, Default)]
pub struct ResultTreeBuilder {
    top_level: Vec<ResultNode>,
    open: Vec<ResultElement>,
}

impl ResultTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn children_mut(&mut self) -> &mut Vec<ResultNode> {
        match self.open.last_mut() {
            Some(element) => &mut element.children,
            None => &mut self.top_level,
        }
    }

    /// Closes any element still open and returns the finished document.
    pub fn finish(mut self, output: OutputSettings) -> ResultDocument {
        while !self.open.is_empty() {
            self.end_element();
        }
        ResultDocument {
            children: self.top_level,
            output,
        }
    }
}

impl OutputBuilder for ResultTreeBuilder {
    fn start_element(&mut self, name: OutputName) {
        self.open.push(ResultElement::new(name));
    }

    fn end_element(&mut self) {
        if let Some(element) = self.open.pop() {
            self.children_mut().push(ResultNode::Element(element));
        }
    }

    fn add_namespace(&mut self, prefix: Option<&str>, uri: &str) {
        if let Some(element) = self.open.last_mut() {
            let binding = (prefix.map(str::to_string), uri.to_string());
            if !element.namespaces.contains(&binding) {
                element.namespaces.push(binding);
            }
        }
    }

    fn set_attribute(&mut self, name: OutputName, value: &str) {
        let Some(element) = self.open.last_mut() else {
            log::warn!("Attribute '{}' ignored: no element is open", name.qualified());
            return;
        };
        if let Some(existing) = element
            .attributes
            .iter_mut()
            .find(|(n, _)| n.local == name.local && n.namespace == name.namespace)
        {
            existing.1 = value.to_string();
        } else {
            element.attributes.push((name, value.to_string()));
        }
    }

    fn add_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let children = self.children_mut();
        if let Some(ResultNode::Text(previous)) = children.last_mut() {
            previous.push_str(text);
        } else {
            children.push(ResultNode::Text(text.to_string()));
        }
    }

    fn add_comment(&mut self, text: &str) {
        self.children_mut().push(ResultNode::Comment(text.to_string()));
    }

    fn add_processing_instruction(&mut self, target: &str, data: &str) {
        self.children_mut().push(ResultNode::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        });
    }
}

/// Keeps only the text of whatever is built into it; the string value of a result tree fragment.
#[derive(Debug, Default)]
pub struct TextCollector {
    text: String,
}

impl TextCollector {
    pub fn into_string(self) -> String {
        self.text
    }
}

impl OutputBuilder for TextCollector {
    fn start_element(&mut self, _name: OutputName) {}
    fn end_element(&mut self) {}
    fn add_namespace(&mut self, _prefix: Option<&str>, _uri: &str) {}
    fn set_attribute(&mut self, _name: OutputName, _value: &str) {}

    fn add_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn add_comment(&mut self, _text: &str) {}
    fn add_processing_instruction(&mut self, _target: &str, _data: &str) {}
}
