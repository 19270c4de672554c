use crate::ast::WithParam;
use crate::executor::{ExecutionError, TemplateExecutor};
use crate::output::OutputBuilder;
use xslproc_xpath1::datasource::DataSourceNode;

pub(crate) fn handle_call_template<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    name: &str,
    params: &[WithParam],
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    let stylesheet = executor.stylesheet;
    let template = stylesheet
        .named_templates
        .get(name)
        .ok_or_else(|| ExecutionError::UnknownTemplate(name.to_string()))?;

    let passed =
        executor.evaluate_with_params(params, context_node, context_position, context_size)?;
    if executor.strict {
        for (passed_name, _) in &passed {
            if !template.params.iter().any(|p| &p.name == passed_name) {
                log::warn!(
                    "Call to template '{}' passes undeclared parameter '{}'",
                    name,
                    passed_name
                );
            }
        }
    }

    executor.enter()?;
    executor.push_scope();
    let result = executor
        .bind_params(&template.params, &passed, context_node, context_position, context_size)
        .and_then(|()| {
            executor.execute_template(
                &template.body,
                context_node,
                context_position,
                context_size,
                builder,
            )
        });
    executor.pop_scope();
    executor.leave();
    result
}
