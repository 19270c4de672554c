use crate::ast::{PreparsedTemplate, SortKey};
use crate::executor::{ExecutionError, TemplateExecutor};
use crate::output::OutputBuilder;
use xslproc_xpath1::datasource::DataSourceNode;
use xslproc_xpath1::{Expression, XPathError, XPathValue};

#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_for_each<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    select: &Expression,
    sort_keys: &[SortKey],
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    let nodes = {
        let merged_vars = executor.get_merged_variables();
        let e_ctx =
            executor.get_eval_context(context_node, &merged_vars, context_position, context_size);
        match xslproc_xpath1::evaluate(select, &e_ctx)? {
            XPathValue::NodeSet(mut nodes) => {
                executor.sort_node_set(&mut nodes, sort_keys, &merged_vars)?;
                nodes
            }
            other => {
                return Err(XPathError::TypeError(format!(
                    "xsl:for-each select must give a node-set, got a {}",
                    other.type_name()
                ))
                .into());
            }
        }
    };

    let inner_context_size = nodes.len();
    for (i, node) in nodes.into_iter().enumerate() {
        executor.execute_template(body, node, i + 1, inner_context_size, builder)?;
    }
    Ok(())
}
