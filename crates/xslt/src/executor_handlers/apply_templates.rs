use crate::ast::{SortKey, WithParam};
use crate::executor::{ExecutionError, TemplateExecutor};
use crate::output::OutputBuilder;
use xslproc_xpath1::datasource::DataSourceNode;
use xslproc_xpath1::{Expression, XPathError, XPathValue};

#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_apply_templates<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    select: Option<&Expression>,
    mode: Option<&str>,
    sort_keys: &[SortKey],
    params: &[WithParam],
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    let nodes_to_process = {
        let merged_vars = executor.get_merged_variables();
        let e_ctx =
            executor.get_eval_context(context_node, &merged_vars, context_position, context_size);
        let mut nodes = match select {
            Some(sel) => match xslproc_xpath1::evaluate(sel, &e_ctx)? {
                XPathValue::NodeSet(nodes) => nodes,
                other => {
                    return Err(XPathError::TypeError(format!(
                        "xsl:apply-templates select must give a node-set, got a {}",
                        other.type_name()
                    ))
                    .into());
                }
            },
            None => context_node.children().collect(),
        };
        executor.sort_node_set(&mut nodes, sort_keys, &merged_vars)?;
        nodes
    };

    let passed =
        executor.evaluate_with_params(params, context_node, context_position, context_size)?;
    executor.apply_templates_to_nodes(&nodes_to_process, mode, &passed, builder)
}
