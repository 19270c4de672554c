//! The push-model executor: applies a `CompiledStylesheet` to any `DataSourceNode` tree and
//! drives an `OutputBuilder`.
use crate::ast::{
    AttributeValueTemplate, AvtPart, CompiledStylesheet, Param, PreparsedTemplate, SortDataType,
    SortKey, SortOrder, TemplateRule, VariableValue, XsltInstruction,
};
pub use crate::error::ExecutionError;
use crate::executor_handlers as handlers;
use crate::output::{OutputBuilder, TextCollector};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use xslproc_xpath1::datasource::{DataSourceNode, NodeType};
use xslproc_xpath1::{self, EvaluationContext, FunctionRegistry, KeyIndexes, XPathError, XPathValue};

/// A stateful executor that builds a result tree by processing a `CompiledStylesheet`
/// against a generic `DataSourceNode`. It implements the XSLT "push" model.
pub struct TemplateExecutor<'s, 'a, N: DataSourceNode<'a>> {
    pub(crate) stylesheet: &'s CompiledStylesheet,
    functions: &'s FunctionRegistry,
    root_node: N,
    variable_stack: Vec<HashMap<String, XPathValue<N>>>,
    globals: HashMap<String, XPathValue<N>>,
    key_indexes: KeyIndexes<N>,
    pub(crate) strict: bool,
    depth: usize,
    max_depth: usize,
    _marker: PhantomData<&'a ()>,
}

impl<'s, 'a, N: DataSourceNode<'a> + 'a> TemplateExecutor<'s, 'a, N> {
    pub fn new(
        stylesheet: &'s CompiledStylesheet,
        functions: &'s FunctionRegistry,
        root_node: N,
        strict: bool,
        max_depth: usize,
    ) -> Self {
        Self {
            stylesheet,
            functions,
            root_node,
            variable_stack: vec![],
            globals: HashMap::new(),
            key_indexes: KeyIndexes::new(),
            strict,
            depth: 0,
            max_depth,
            _marker: PhantomData,
        }
    }

    /// Indexes every `xsl:key`, then evaluates top-level variables and parameters in
    /// declaration order. `parameters` override the defaults of matching `xsl:param`s.
    pub fn prepare(&mut self, parameters: &HashMap<String, String>) -> Result<(), ExecutionError> {
        self.build_key_indexes()?;

        let stylesheet = self.stylesheet;
        for name in parameters.keys() {
            if !stylesheet.globals.iter().any(|g| g.is_param && &g.name == name) {
                log::debug!("Parameter '{}' is not declared by the stylesheet; ignored", name);
            }
        }

        for global in &stylesheet.globals {
            let value = match parameters.get(&global.name) {
                Some(value) if global.is_param => XPathValue::String(value.clone()),
                _ => self
                    .evaluate_variable_value(&global.value, self.root_node, 1, 1)
                    .map_err(|e| e.at(global.location.line, binding_element(global.is_param)))?,
            };
            self.globals.insert(global.name.clone(), value);
        }
        Ok(())
    }

    /// Runs the transform from the root node in the default mode.
    pub fn execute(&mut self, builder: &mut dyn OutputBuilder) -> Result<(), ExecutionError> {
        let root = self.root_node;
        self.apply_templates_to_nodes(&[root], None, &[], builder)
    }

    fn build_key_indexes(&mut self) -> Result<(), ExecutionError> {
        if self.stylesheet.keys.is_empty() {
            return Ok(());
        }
        let mut all_nodes = Vec::new();
        collect_nodes(self.root_node, &mut all_nodes);

        let mut indexes = KeyIndexes::new();
        for key in &self.stylesheet.keys {
            let index: &mut HashMap<String, Vec<N>> = indexes.entry(key.name.clone()).or_default();
            for &node in &all_nodes {
                let e_ctx = self.get_eval_context(node, &self.globals, 1, 1);
                let matched = key
                    .pattern
                    .matches(node, &e_ctx)
                    .map_err(|e| ExecutionError::from(e).at(key.location.line, "xsl:key"))?;
                if !matched {
                    continue;
                }
                let values = match xslproc_xpath1::evaluate(&key.use_expr, &e_ctx)
                    .map_err(|e| ExecutionError::from(e).at(key.location.line, "xsl:key"))?
                {
                    XPathValue::NodeSet(nodes) => nodes.iter().map(|n| n.string_value()).collect(),
                    other => vec![other.to_string()],
                };
                for value in values {
                    let entry = index.entry(value).or_default();
                    if entry.last() != Some(&node) {
                        entry.push(node);
                    }
                }
            }
        }
        self.key_indexes = indexes;
        Ok(())
    }

    // --- Scope Management ---

    pub(crate) fn push_scope(&mut self) {
        self.variable_stack.push(HashMap::new());
    }

    pub(crate) fn pop_scope(&mut self) {
        self.variable_stack.pop();
    }

    pub(crate) fn set_variable_in_current_scope(&mut self, name: String, value: XPathValue<N>) {
        if let Some(scope) = self.variable_stack.last_mut() {
            scope.insert(name, value);
        }
    }

    pub(crate) fn get_merged_variables(&self) -> HashMap<String, XPathValue<N>> {
        let mut merged = self.globals.clone();
        for scope in &self.variable_stack {
            merged.extend(scope.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }

    pub(crate) fn get_eval_context<'d>(
        &'d self,
        context_node: N,
        merged_variables: &'d HashMap<String, XPathValue<N>>,
        context_position: usize,
        context_size: usize,
    ) -> EvaluationContext<'a, 'd, N> {
        EvaluationContext::new(
            context_node,
            self.root_node,
            self.functions,
            merged_variables,
            &self.key_indexes,
        )
        .with_position(context_position, context_size)
        .with_namespaces(&self.stylesheet.namespaces)
        .with_strict(self.strict)
    }

    /// Guards against runaway recursion; pair with [`Self::leave`].
    pub(crate) fn enter(&mut self) -> Result<(), ExecutionError> {
        if self.depth >= self.max_depth {
            return Err(ExecutionError::RecursionLimit(self.max_depth));
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // --- Evaluation helpers ---

    pub(crate) fn evaluate_avt(
        &self,
        avt: &AttributeValueTemplate,
        e_ctx: &EvaluationContext<'a, '_, N>,
    ) -> Result<String, ExecutionError> {
        match avt {
            AttributeValueTemplate::Static(s) => Ok(s.clone()),
            AttributeValueTemplate::Dynamic(parts) => {
                let mut result = String::new();
                for part in parts {
                    match part {
                        AvtPart::Static(s) => result.push_str(s),
                        AvtPart::Dynamic(expression) => {
                            result.push_str(&xslproc_xpath1::evaluate(expression, e_ctx)?.to_string())
                        }
                    }
                }
                Ok(result)
            }
        }
    }

    /// Evaluates a variable binding. Template content yields its text as a string.
    pub(crate) fn evaluate_variable_value(
        &mut self,
        value: &VariableValue,
        context_node: N,
        context_position: usize,
        context_size: usize,
    ) -> Result<XPathValue<N>, ExecutionError> {
        match value {
            VariableValue::Select(expr) => {
                let merged_vars = self.get_merged_variables();
                let e_ctx =
                    self.get_eval_context(context_node, &merged_vars, context_position, context_size);
                Ok(xslproc_xpath1::evaluate(expr, &e_ctx)?)
            }
            VariableValue::Body(body) => Ok(XPathValue::String(self.instantiate_to_string(
                body,
                context_node,
                context_position,
                context_size,
            )?)),
            VariableValue::Empty => Ok(XPathValue::String(String::new())),
        }
    }

    /// Runs a template body and returns the text it produced.
    pub(crate) fn instantiate_to_string(
        &mut self,
        body: &PreparsedTemplate,
        context_node: N,
        context_position: usize,
        context_size: usize,
    ) -> Result<String, ExecutionError> {
        let mut collector = TextCollector::default();
        self.execute_template(body, context_node, context_position, context_size, &mut collector)?;
        Ok(collector.into_string())
    }

    /// Evaluates `xsl:with-param` values in the caller's context.
    pub(crate) fn evaluate_with_params(
        &mut self,
        params: &[crate::ast::WithParam],
        context_node: N,
        context_position: usize,
        context_size: usize,
    ) -> Result<Vec<(String, XPathValue<N>)>, ExecutionError> {
        let mut evaluated = Vec::with_capacity(params.len());
        for param in params {
            let value = self.evaluate_variable_value(
                &param.value,
                context_node,
                context_position,
                context_size,
            )?;
            evaluated.push((param.name.clone(), value));
        }
        Ok(evaluated)
    }

    /// Binds a template's declared parameters in the current scope.
    pub(crate) fn bind_params(
        &mut self,
        declared: &[Param],
        passed: &[(String, XPathValue<N>)],
        context_node: N,
        context_position: usize,
        context_size: usize,
    ) -> Result<(), ExecutionError> {
        for param in declared {
            let value = match passed.iter().find(|(name, _)| *name == param.name) {
                Some((_, value)) => value.clone(),
                None => self.evaluate_variable_value(
                    &param.default_value,
                    context_node,
                    context_position,
                    context_size,
                )?,
            };
            self.set_variable_in_current_scope(param.name.clone(), value);
        }
        Ok(())
    }

    pub(crate) fn sort_node_set(
        &self,
        nodes: &mut Vec<N>,
        sort_keys: &[SortKey],
        merged_vars: &HashMap<String, XPathValue<N>>,
    ) -> Result<(), ExecutionError> {
        if sort_keys.is_empty() {
            return Ok(());
        }

        let size = nodes.len();
        let mut keyed = Vec::with_capacity(size);
        for (i, &node) in nodes.iter().enumerate() {
            let e_ctx = self.get_eval_context(node, merged_vars, i + 1, size);
            let mut values = Vec::with_capacity(sort_keys.len());
            for key in sort_keys {
                values.push(xslproc_xpath1::evaluate(&key.select, &e_ctx)?);
            }
            keyed.push((node, values));
        }

        keyed.sort_by(|(_, a), (_, b)| {
            for (key_idx, key) in sort_keys.iter().enumerate() {
                let ordering = match key.data_type {
                    SortDataType::Number => {
                        compare_numbers(a[key_idx].to_number(), b[key_idx].to_number())
                    }
                    SortDataType::Text => a[key_idx].to_string().cmp(&b[key_idx].to_string()),
                };
                let final_ordering = if key.order == SortOrder::Descending {
                    ordering.reverse()
                } else {
                    ordering
                };
                if final_ordering != Ordering::Equal {
                    return final_ordering;
                }
            }
            Ordering::Equal
        });

        *nodes = keyed.into_iter().map(|(node, _)| node).collect();
        Ok(())
    }

    // --- Template rules ---

    fn find_template_rule(
        &self,
        node: N,
        mode: Option<&str>,
    ) -> Result<Option<&'s TemplateRule>, ExecutionError> {
        let Some(rules) = self.stylesheet.template_rules.get(&mode.map(str::to_string)) else {
            return Ok(None);
        };
        let e_ctx = self.get_eval_context(node, &self.globals, 1, 1);
        for rule in rules {
            if rule.pattern.matches(node, &e_ctx)? {
                return Ok(Some(rule));
            }
        }
        Ok(None)
    }

    pub(crate) fn apply_templates_to_nodes(
        &mut self,
        nodes: &[N],
        mode: Option<&str>,
        params: &[(String, XPathValue<N>)],
        builder: &mut dyn OutputBuilder,
    ) -> Result<(), ExecutionError> {
        let size = nodes.len();
        for (i, &node) in nodes.iter().enumerate() {
            let position = i + 1;
            match self.find_template_rule(node, mode)? {
                Some(rule) => {
                    self.enter()?;
                    self.push_scope();
                    let result = self
                        .bind_params(&rule.params, params, node, position, size)
                        .and_then(|()| {
                            self.execute_template(&rule.body, node, position, size, builder)
                        })
                        .map_err(|e| e.at(rule.location.line, "xsl:template"));
                    self.pop_scope();
                    self.leave();
                    result?;
                }
                None => self.apply_builtin_rule(node, mode, builder)?,
            }
        }
        Ok(())
    }

    /// The built-in template rules of XSLT 1.0, section 5.8.
    fn apply_builtin_rule(
        &mut self,
        node: N,
        mode: Option<&str>,
        builder: &mut dyn OutputBuilder,
    ) -> Result<(), ExecutionError> {
        match node.node_type() {
            NodeType::Root | NodeType::Element => {
                let children: Vec<N> = node.children().collect();
                self.enter()?;
                let result = self.apply_templates_to_nodes(&children, mode, &[], builder);
                self.leave();
                result
            }
            NodeType::Text | NodeType::Attribute => {
                builder.add_text(&node.string_value());
                Ok(())
            }
            NodeType::Comment | NodeType::ProcessingInstruction => Ok(()),
        }
    }

    /// Applies named attribute sets, including the sets they use, to the open element.
    pub(crate) fn apply_attribute_sets(
        &mut self,
        names: &[String],
        context_node: N,
        context_position: usize,
        context_size: usize,
        builder: &mut dyn OutputBuilder,
    ) -> Result<(), ExecutionError> {
        let mut visiting = HashSet::new();
        for name in names {
            self.apply_attribute_set(
                name,
                &mut visiting,
                context_node,
                context_position,
                context_size,
                builder,
            )?;
        }
        Ok(())
    }

    fn apply_attribute_set(
        &mut self,
        name: &str,
        visiting: &mut HashSet<String>,
        context_node: N,
        context_position: usize,
        context_size: usize,
        builder: &mut dyn OutputBuilder,
    ) -> Result<(), ExecutionError> {
        let stylesheet = self.stylesheet;
        let set = stylesheet
            .attribute_sets
            .get(name)
            .ok_or_else(|| ExecutionError::UnknownAttributeSet(name.to_string()))?;
        if !visiting.insert(name.to_string()) {
            return Err(ExecutionError::XPath(XPathError::TypeError(format!(
                "attribute set '{}' uses itself",
                name
            ))));
        }
        for used in &set.use_attribute_sets {
            self.apply_attribute_set(
                used,
                visiting,
                context_node,
                context_position,
                context_size,
                builder,
            )?;
        }
        self.execute_template(&set.attributes, context_node, context_position, context_size, builder)?;
        visiting.remove(name);
        Ok(())
    }

    // --- Instruction dispatch ---

    /// Processes a template body in a fresh variable scope.
    pub(crate) fn execute_template(
        &mut self,
        template: &PreparsedTemplate,
        context_node: N,
        context_position: usize,
        context_size: usize,
        builder: &mut dyn OutputBuilder,
    ) -> Result<(), ExecutionError> {
        self.push_scope();
        let mut result = Ok(());
        for located in &template.0 {
            result = self
                .execute_instruction(
                    &located.instruction,
                    context_node,
                    context_position,
                    context_size,
                    builder,
                )
                .map_err(|e| e.at(located.location.line, &located.element));
            if result.is_err() {
                break;
            }
        }
        self.pop_scope();
        result
    }

    fn execute_instruction(
        &mut self,
        instruction: &XsltInstruction,
        context_node: N,
        context_position: usize,
        context_size: usize,
        builder: &mut dyn OutputBuilder,
    ) -> Result<(), ExecutionError> {
        match instruction {
            XsltInstruction::Text { value, .. } => {
                handlers::literals::handle_text(value, builder);
                Ok(())
            }
            XsltInstruction::ValueOf { select } => {
                let merged_vars = self.get_merged_variables();
                let e_ctx =
                    self.get_eval_context(context_node, &merged_vars, context_position, context_size);
                handlers::literals::handle_value_of(select, &e_ctx, builder)
            }
            XsltInstruction::LiteralElement {
                name,
                attributes,
                namespaces,
                use_attribute_sets,
                body,
            } => handlers::literals::handle_literal_element(
                self,
                name,
                attributes,
                namespaces,
                use_attribute_sets,
                body,
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::Element {
                name,
                namespace,
                use_attribute_sets,
                body,
            } => handlers::literals::handle_element(
                self,
                name,
                namespace.as_ref(),
                use_attribute_sets,
                body,
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::Attribute {
                name,
                namespace,
                body,
            } => handlers::literals::handle_attribute(
                self,
                name,
                namespace.as_ref(),
                body,
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::Comment { body } => handlers::literals::handle_comment(
                self,
                body,
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::ProcessingInstruction { name, body } => {
                handlers::literals::handle_processing_instruction(
                    self,
                    name,
                    body,
                    context_node,
                    context_position,
                    context_size,
                    builder,
                )
            }
            XsltInstruction::Message { terminate, body } => handlers::literals::handle_message(
                self,
                *terminate,
                body,
                context_node,
                context_position,
                context_size,
            ),
            XsltInstruction::Number {
                value,
                count,
                format,
            } => handlers::number::handle_number(
                self,
                value.as_ref(),
                count.as_ref(),
                format,
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::ApplyTemplates {
                select,
                mode,
                sort_keys,
                params,
            } => handlers::apply_templates::handle_apply_templates(
                self,
                select.as_ref(),
                mode.as_deref(),
                sort_keys,
                params,
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::CallTemplate { name, params } => {
                handlers::call_template::handle_call_template(
                    self,
                    name,
                    params,
                    context_node,
                    context_position,
                    context_size,
                    builder,
                )
            }
            XsltInstruction::ForEach {
                select,
                sort_keys,
                body,
            } => handlers::for_each::handle_for_each(
                self,
                select,
                sort_keys,
                body,
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::If { test, body } => handlers::control_flow::handle_if(
                self,
                test,
                body,
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::Choose { whens, otherwise } => handlers::control_flow::handle_choose(
                self,
                whens,
                otherwise.as_ref(),
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::Variable { name, value } => handlers::variables::handle_variable(
                self,
                name,
                value,
                context_node,
                context_position,
                context_size,
            ),
            XsltInstruction::CopyOf { select } => {
                let merged_vars = self.get_merged_variables();
                let e_ctx =
                    self.get_eval_context(context_node, &merged_vars, context_position, context_size);
                handlers::copy::handle_copy_of(select, &e_ctx, builder)
            }
            XsltInstruction::Copy {
                use_attribute_sets,
                body,
            } => handlers::copy::handle_copy(
                self,
                use_attribute_sets,
                body,
                context_node,
                context_position,
                context_size,
                builder,
            ),
        }
    }
}

fn binding_element(is_param: bool) -> &'static str {
    if is_param { "xsl:param" } else { "xsl:variable" }
}

/// NaN sorts before every number.
fn compare_numbers(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Every node of the tree in document order, attributes included.
fn collect_nodes<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    out.push(node);
    out.extend(node.attributes());
    for child in node.children() {
        collect_nodes(child, out);
    }
}
