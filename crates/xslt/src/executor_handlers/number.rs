//! `xsl:number` for `level="single"`, with decimal, alphabetic and roman formats.

use crate::ast::AttributeValueTemplate;
use crate::executor::{ExecutionError, TemplateExecutor};
use crate::output::OutputBuilder;
use crate::pattern::Pattern;
use xslproc_xpath1::datasource::DataSourceNode;
use xslproc_xpath1::{self, EvaluationContext, Expression};

#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_number<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    value: Option<&Expression>,
    count: Option<&Pattern>,
    format: &AttributeValueTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), ExecutionError> {
    let merged_vars = executor.get_merged_variables();
    let e_ctx = executor.get_eval_context(context_node, &merged_vars, context_position, context_size);
    let format = executor.evaluate_avt(format, &e_ctx)?;

    let number = match value {
        Some(expr) => {
            let n = xslproc_xpath1::evaluate(expr, &e_ctx)?.to_number().round();
            if n.is_nan() || n < 1.0 || n.is_infinite() {
                builder.add_text(&xslproc_xpath1::XPathValue::<N>::Number(n).to_string());
                return Ok(());
            }
            Some(n as u64)
        }
        None => single_level_number(context_node, count, &e_ctx)?,
    };

    if let Some(number) = number {
        builder.add_text(&format_number(number, &format));
    }
    Ok(())
}

/// The position among its matching siblings of the nearest ancestor-or-self that matches
/// `count`, or the node's own type and name when no pattern is given.
fn single_level_number<'a, N: DataSourceNode<'a> + 'a>(
    node: N,
    count: Option<&Pattern>,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Option<u64>, ExecutionError> {
    let counted = |candidate: N| -> Result<bool, ExecutionError> {
        Ok(match count {
            Some(pattern) => pattern.matches(candidate, e_ctx)?,
            None => candidate.node_type() == node.node_type() && candidate.name() == node.name(),
        })
    };

    let mut current = Some(node);
    while let Some(candidate) = current {
        if counted(candidate)? {
            let Some(parent) = candidate.parent() else {
                return Ok(Some(1));
            };
            let mut position = 0;
            for sibling in parent.children() {
                if counted(sibling)? {
                    position += 1;
                }
                if sibling == candidate {
                    break;
                }
            }
            return Ok(Some(position));
        }
        current = candidate.parent();
    }
    Ok(None)
}

/// Applies a format string such as `"1."`, `"(a)"`, `"001"` or `"I"` to a number.
fn format_number(number: u64, format: &str) -> String {
    let token_start = format.find(|c: char| c.is_alphanumeric()).unwrap_or(format.len());
    let token_end = format[token_start..]
        .find(|c: char| !c.is_alphanumeric())
        .map_or(format.len(), |i| token_start + i);
    let prefix = &format[..token_start];
    let token = &format[token_start..token_end];
    let suffix = &format[token_end..];

    let body = match token {
        "a" => alphabetic(number, b'a'),
        "A" => alphabetic(number, b'A'),
        "i" => roman(number).to_lowercase(),
        "I" => roman(number),
        t if !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()) => {
            format!("{:0width$}", number, width = t.len())
        }
        _ => number.to_string(),
    };
    format!("{}{}{}", prefix, body, suffix)
}

fn alphabetic(mut number: u64, base: u8) -> String {
    let mut letters = Vec::new();
    while number > 0 {
        number -= 1;
        letters.push((base + (number % 26) as u8) as char);
        number /= 26;
    }
    letters.iter().rev().collect()
}

fn roman(mut number: u64) -> String {
    if number >= 4000 {
        return number.to_string();
    }
    const NUMERALS: [(u64, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for (value, numeral) in NUMERALS {
        while number >= value {
            out.push_str(numeral);
            number -= value;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_tokens() {
        assert_eq!(format_number(3, "1"), "3");
        assert_eq!(format_number(7, "001"), "007");
        assert_eq!(format_number(28, "a"), "ab");
        assert_eq!(format_number(26, "A"), "Z");
        assert_eq!(format_number(1994, "I"), "MCMXCIV");
        assert_eq!(format_number(4, "(i)"), "(iv)");
        assert_eq!(format_number(2, "1. "), "2. ");
        assert_eq!(format_number(5, ""), "5");
    }
}
