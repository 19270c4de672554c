//! Handlers for literal output, `value-of`, and the instructions that construct named nodes.

use crate::ast::{AttributeValueTemplate, PreparsedTemplate};
use crate::executor::{ExecutionError, TemplateExecutor};
use crate::output::OutputBuilder;
use crate::result::OutputName;
use crate::util::{is_qname, split_qname};
use xslproc_xpath1::datasource::DataSourceNode;
use xslproc_xpath1::{self, EvaluationContext, Expression};

pub(crate) fn handle_text(text: &str, builder: &mut dyn OutputBuilder) {
    builder.add_text(text);
}

pub(crate) fn handle_value_of<'a, N: DataSourceNode<'a> + 'a>(
    select: &Expression,
    e_ctx: &EvaluationContext<'a, '_, N>,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    let content = xslproc_xpath1::evaluate(select, e_ctx)?.to_string();
    builder.add_text(&content);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_literal_element<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    name: &OutputName,
    attributes: &[(OutputName, AttributeValueTemplate)],
    namespaces: &[(Option<String>, String)],
    use_attribute_sets: &[String],
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    let evaluated = {
        let merged_vars = executor.get_merged_variables();
        let e_ctx =
            executor.get_eval_context(context_node, &merged_vars, context_position, context_size);
        let mut evaluated = Vec::with_capacity(attributes.len());
        for (attr_name, avt) in attributes {
            evaluated.push((attr_name.clone(), executor.evaluate_avt(avt, &e_ctx)?));
        }
        evaluated
    };

    builder.start_element(name.clone());
    for (prefix, uri) in namespaces {
        builder.add_namespace(prefix.as_deref(), uri);
    }
    executor.apply_attribute_sets(
        use_attribute_sets,
        context_node,
        context_position,
        context_size,
        builder,
    )?;
    for (attr_name, value) in evaluated {
        builder.set_attribute(attr_name, &value);
    }
    executor.execute_template(body, context_node, context_position, context_size, builder)?;
    builder.end_element();
    Ok(())
}

/// Evaluates the `name` and `namespace` of `xsl:element` or `xsl:attribute`. Without an
/// explicit namespace, a prefix resolves against the stylesheet's declarations.
fn computed_name<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    name_avt: &AttributeValueTemplate,
    namespace_avt: Option<&AttributeValueTemplate>,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<OutputName, ExecutionError> {
    let qname = executor.evaluate_avt(name_avt, e_ctx)?;
    if !is_qname(&qname) {
        return Err(ExecutionError::InvalidName(qname));
    }
    let (prefix, local) = split_qname(&qname);
    let namespace = match namespace_avt {
        Some(avt) => Some(executor.evaluate_avt(avt, e_ctx)?).filter(|uri| !uri.is_empty()),
        None => match prefix {
            Some(p) => Some(e_ctx.resolve_prefix(p)?.to_string()),
            None => None,
        },
    };
    Ok(OutputName {
        prefix: prefix.filter(|_| namespace.is_some()).map(str::to_string),
        local: local.to_string(),
        namespace,
    })
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_element<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    name_avt: &AttributeValueTemplate,
    namespace_avt: Option<&AttributeValueTemplate>,
    use_attribute_sets: &[String],
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    let name = {
        let merged_vars = executor.get_merged_variables();
        let e_ctx =
            executor.get_eval_context(context_node, &merged_vars, context_position, context_size);
        computed_name(executor, name_avt, namespace_avt, &e_ctx)?
    };

    let declaration = name.namespace.clone().map(|uri| (name.prefix.clone(), uri));
    builder.start_element(name);
    if let Some((prefix, uri)) = declaration {
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
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_attribute<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    name_avt: &AttributeValueTemplate,
    namespace_avt: Option<&AttributeValueTemplate>,
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    let name = {
        let merged_vars = executor.get_merged_variables();
        let e_ctx =
            executor.get_eval_context(context_node, &merged_vars, context_position, context_size);
        computed_name(executor, name_avt, namespace_avt, &e_ctx)?
    };
    if name.prefix.is_none() && name.local == "xmlns" {
        return Err(ExecutionError::InvalidName(name.local));
    }
    let value =
        executor.instantiate_to_string(body, context_node, context_position, context_size)?;
    builder.set_attribute(name, &value);
    Ok(())
}

pub(crate) fn handle_comment<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    let text = executor.instantiate_to_string(body, context_node, context_position, context_size)?;
    builder.add_comment(&text);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_processing_instruction<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    name_avt: &AttributeValueTemplate,
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    let target = {
        let merged_vars = executor.get_merged_variables();
        let e_ctx =
            executor.get_eval_context(context_node, &merged_vars, context_position, context_size);
        executor.evaluate_avt(name_avt, &e_ctx)?
    };
    if !is_qname(&target) || target.contains(':') || target.eq_ignore_ascii_case("xml") {
        return Err(ExecutionError::InvalidName(target));
    }
    let data = executor.instantiate_to_string(body, context_node, context_position, context_size)?;
    builder.add_processing_instruction(&target, data.trim_start());
    Ok(())
}

pub(crate) fn handle_message<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    terminate: bool,
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
) -> Result<(), ExecutionError> {
    let text = executor.instantiate_to_string(body, context_node, context_position, context_size)?;
    if terminate {
        return Err(ExecutionError::Terminated(text));
    }
    log::info!("xsl:message: {}", text);
    Ok(())
}
