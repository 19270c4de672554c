use crate::ast::PreparsedTemplate;
use crate::executor::{ExecutionError, TemplateExecutor};
use crate::output::OutputBuilder;
use crate::result::OutputName;
use xslproc_xpath1::datasource::{DataSourceNode, NodeType};
use xslproc_xpath1::{self, EvaluationContext, Expression, XPathValue};

/// The result-tree name of an element or attribute of the source tree.
fn output_name_of<'a, N: DataSourceNode<'a>>(node: N) -> OutputName {
    let qname = node.name();
    OutputName {
        prefix: qname.and_then(|q| q.prefix).map(str::to_string),
        local: qname.map(|q| q.local_part).unwrap_or_default().to_string(),
        namespace: node.namespace_uri().map(str::to_string),
    }
}

pub(crate) fn handle_copy_of<'a, N: DataSourceNode<'a> + 'a>(
    select: &Expression,
    e_ctx: &EvaluationContext<'a, '_, N>,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    match xslproc_xpath1::evaluate(select, e_ctx)? {
        XPathValue::NodeSet(nodes) => {
            for node in nodes {
                copy_node(node, builder);
            }
        }
        other => builder.add_text(&other.to_string()),
    }
    Ok(())
}

/// Deep copy of a source node, namespace bindings included.
fn copy_node<'a, N: DataSourceNode<'a>>(node: N, builder: &mut dyn OutputBuilder) {
    match node.node_type() {
        NodeType::Root => {
            for child in node.children() {
                copy_node(child, builder);
            }
        }
        NodeType::Element => {
            builder.start_element(output_name_of(node));
            for (prefix, uri) in node.namespaces() {
                builder.add_namespace(prefix.as_deref(), &uri);
            }
            for attr in node.attributes() {
                builder.set_attribute(output_name_of(attr), &attr.string_value());
            }
            for child in node.children() {
                copy_node(child, builder);
            }
            builder.end_element();
        }
        NodeType::Attribute => builder.set_attribute(output_name_of(node), &node.string_value()),
        NodeType::Text => builder.add_text(&node.string_value()),
        NodeType::Comment => builder.add_comment(&node.string_value()),
        NodeType::ProcessingInstruction => {
            let target = node.name().map(|q| q.local_part).unwrap_or_default();
            builder.add_processing_instruction(target, &node.string_value());
        }
    }
}

/// Shallow copy of the context node; only an element takes the body and attribute sets.
pub(crate) fn handle_copy<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    use_attribute_sets: &[String],
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    match context_node.node_type() {
        NodeType::Element => {
            builder.start_element(output_name_of(context_node));
            for (prefix, uri) in context_node.namespaces() {
                builder.add_namespace(prefix.as_deref(), &uri);
            }
            executor.apply_attribute_sets(
                use_attribute_sets,
                context_node,
                context_position,
                context_size,
                builder,
            )?;
            executor.execute_template(body, context_node, context_position, context_size, builder)?;
            builder.end_element();
        }
        NodeType::Root => {
            executor.execute_template(body, context_node, context_position, context_size, builder)?;
        }
        NodeType::Attribute | NodeType::Text | NodeType::Comment | NodeType::ProcessingInstruction => {
            copy_node(context_node, builder)
        }
    }
    Ok(())
}
