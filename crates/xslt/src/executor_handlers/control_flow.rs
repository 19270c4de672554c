use crate::ast::{PreparsedTemplate, When};
use crate::executor::{ExecutionError, TemplateExecutor};
use crate::output::OutputBuilder;
use xslproc_xpath1::datasource::DataSourceNode;
use xslproc_xpath1::Expression;

pub(crate) fn handle_if<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    test: &Expression,
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    let condition = {
        let merged_vars = executor.get_merged_variables();
        let e_ctx =
            executor.get_eval_context(context_node, &merged_vars, context_position, context_size);
        xslproc_xpath1::evaluate(test, &e_ctx)?.to_bool()
    };
    if condition {
        executor.execute_template(body, context_node, context_position, context_size, builder)?;
    }
    Ok(())
}

pub(crate) fn handle_choose<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    whens: &[When],
    otherwise: Option<&PreparsedTemplate>,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    let chosen = {
        let merged_vars = executor.get_merged_variables();
        let e_ctx =
            executor.get_eval_context(context_node, &merged_vars, context_position, context_size);
        let mut chosen = None;
        for when_block in whens {
            if xslproc_xpath1::evaluate(&when_block.test, &e_ctx)?.to_bool() {
                chosen = Some(&when_block.body);
                break;
            }
        }
        chosen.or(otherwise)
    };
    if let Some(body) = chosen {
        executor.execute_template(body, context_node, context_position, context_size, builder)?;
    }
    Ok(())
}
