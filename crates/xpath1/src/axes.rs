//! Pure functions collecting the nodes on each XPath axis.
//!
//! Every function returns nodes in axis order: document order for forward axes, reverse
//! document order for reverse axes, so that positional predicates count correctly.

use crate::ast::Axis;
use crate::datasource::{DataSourceNode, NodeType};

pub fn collect<'a, N: DataSourceNode<'a>>(axis: Axis, node: N) -> Vec<N> {
    let mut out = Vec::new();
    match axis {
        Axis::Child => out.extend(node.children()),
        Axis::Attribute => out.extend(node.attributes()),
        Axis::Namespace => {}
        Axis::SelfAxis => out.push(node),
        Axis::Descendant => push_descendants(node, &mut out),
        Axis::DescendantOrSelf => {
            out.push(node);
            push_descendants(node, &mut out);
        }
        Axis::Parent => out.extend(node.parent()),
        Axis::Ancestor => push_ancestors(node, &mut out),
        Axis::AncestorOrSelf => {
            out.push(node);
            push_ancestors(node, &mut out);
        }
        Axis::FollowingSibling => out.extend(siblings(node).1),
        Axis::PrecedingSibling => out.extend(siblings(node).0.into_iter().rev()),
        Axis::Following => push_following(node, &mut out),
        Axis::Preceding => {
            push_preceding(node, &mut out);
            out.reverse();
        }
    }
    out
}

fn push_descendants<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    let mut stack: Vec<N> = node.children().collect();
    stack.reverse();
    while let Some(current) = stack.pop() {
        out.push(current);
        let mut children: Vec<N> = current.children().collect();
        children.reverse();
        stack.extend(children);
    }
}

fn push_ancestors<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    let mut current = node.parent();
    while let Some(parent) = current {
        out.push(parent);
        current = parent.parent();
    }
}

/// Splits the siblings of `node` into those before and those after it, both in document order.
/// Attributes and the root have no siblings.
fn siblings<'a, N: DataSourceNode<'a>>(node: N) -> (Vec<N>, Vec<N>) {
    if node.node_type() == NodeType::Attribute {
        return (vec![], vec![]);
    }
    let Some(parent) = node.parent() else {
        return (vec![], vec![]);
    };
    let mut before = Vec::new();
    let mut after = Vec::new();
    let mut seen_self = false;
    for sibling in parent.children() {
        if sibling == node {
            seen_self = true;
        } else if seen_self {
            after.push(sibling);
        } else {
            before.push(sibling);
        }
    }
    (before, after)
}

fn push_following<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    let mut current = node;
    if node.node_type() == NodeType::Attribute {
        // The owner element's content follows its attributes in document order.
        if let Some(owner) = node.parent() {
            push_descendants(owner, out);
            current = owner;
        }
    }
    loop {
        for sibling in siblings(current).1 {
            out.push(sibling);
            push_descendants(sibling, out);
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
}

/// Pushes preceding nodes in document order; the caller reverses them into axis order.
fn push_preceding<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    let mut chain = Vec::new();
    let mut current = if node.node_type() == NodeType::Attribute {
        node.parent()
    } else {
        Some(node)
    };
    while let Some(c) = current {
        chain.push(c);
        current = c.parent();
    }
    // Walk from the outermost ancestor inwards so the output stays in document order.
    for level in chain.into_iter().rev() {
        for sibling in siblings(level).0 {
            out.push(sibling);
            push_descendants(sibling, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::mock::sample_tree;

    #[test]
    fn descendants_come_back_in_document_order() {
        let tree = sample_tree();
        let ids: Vec<usize> = collect(Axis::Descendant, tree.root())
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 5, 6, 8, 9, 10]);
    }

    #[test]
    fn reverse_axes_start_with_the_nearest_node() {
        let tree = sample_tree();
        let text = tree.node(5);
        let ancestors: Vec<usize> = collect(Axis::Ancestor, text).iter().map(|n| n.id).collect();
        assert_eq!(ancestors, vec![2, 1, 0]);

        let note = tree.node(9);
        let preceding: Vec<usize> = collect(Axis::PrecedingSibling, note)
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(preceding, vec![6, 2]);
    }

    #[test]
    fn following_and_preceding_exclude_ancestors_and_descendants() {
        let tree = sample_tree();
        let second_para = tree.node(6);
        let following: Vec<usize> = collect(Axis::Following, second_para)
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(following, vec![9, 10]);

        let preceding: Vec<usize> = collect(Axis::Preceding, second_para)
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(preceding, vec![5, 2]);
    }

    #[test]
    fn attributes_have_no_siblings() {
        let tree = sample_tree();
        let attr = tree.node(3);
        assert!(collect(Axis::FollowingSibling, attr).is_empty());
        assert_eq!(collect(Axis::Parent, attr), vec![tree.node(2)]);
    }
}
