use crate::ast::{AttributeValueTemplate, AvtPart};
use crate::error::XsltError;
use xslproc_xpath1::{XPathError, parse_expression};

/// Parses an attribute value template such as `item-{@id}`. `{{` and `}}` are literal braces.
pub fn parse_avt(text: &str) -> Result<AttributeValueTemplate, XsltError> {
    let malformed = |message: &str| {
        XsltError::XPath(XPathError::XPathParse(text.to_string(), message.to_string()))
    };

    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '}' => return Err(malformed("unmatched '}' in attribute value template")),
            '{' => {
                let mut expr = String::new();
                let mut quote = None;
                let mut closed = false;
                for c in chars.by_ref() {
                    match (c, quote) {
                        ('}', None) => {
                            closed = true;
                            break;
                        }
                        ('\'' | '"', None) => quote = Some(c),
                        (c, Some(q)) if c == q => quote = None,
                        _ => {}
                    }
                    expr.push(c);
                }
                if !closed {
                    return Err(malformed("unterminated '{' in attribute value template"));
                }
                if !literal.is_empty() {
                    parts.push(AvtPart::Static(std::mem::take(&mut literal)));
                }
                parts.push(AvtPart::Dynamic(parse_expression(&expr)?));
            }
            c => literal.push(c),
        }
    }

    if parts.is_empty() {
        return Ok(AttributeValueTemplate::Static(literal));
    }
    if !literal.is_empty() {
        parts.push(AvtPart::Static(literal));
    }
    Ok(AttributeValueTemplate::Dynamic(parts))
}

/// Splits `prefix:local` into its parts.
pub fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

pub fn yes_no(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim() == "yes")
}

/// Whether `name` is a valid XML name, optionally prefixed.
pub fn is_qname(name: &str) -> bool {
    let valid_ncname = |part: &str| {
        let mut chars = part.chars();
        chars
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
            && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
    };
    match name.split_once(':') {
        Some((prefix, local)) => valid_ncname(prefix) && valid_ncname(local),
        None => valid_ncname(name),
    }
}
