//! A `nom`-based parser for the XPath 1.0 expression language.

use super::ast::*;
use crate::error::XPathError;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit0, digit1, multispace0, satisfy},
    combinator::{map, map_res, not, opt, recognize, value},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated},
};

type PResult<'a, O> = IResult<&'a str, O>;

// --- Main Public Parser ---

pub fn parse_expression(input: &str) -> Result<Expression, XPathError> {
    match terminated(expression, multispace0).parse(input) {
        Ok(("", expr)) => Ok(expr),
        Ok((rem, _)) => Err(XPathError::XPathParse(
            input.to_string(),
            format!("unexpected input at '{}'", rem),
        )),
        Err(e) => Err(XPathError::XPathParse(input.to_string(), e.to_string())),
    }
}

// --- Combinators & Helpers ---

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// An operator name that must not run on into a longer name (`or` but not `order`).
fn keyword<'a>(word: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = nom::error::Error<&'a str>> {
    terminated(tag(word), not(satisfy(is_name_char)))
}

/// Left-associative chain of `operand (operator operand)*`.
fn binary_level<'a>(
    input: &'a str,
    operand: fn(&'a str) -> PResult<'a, Expression>,
    operator: fn(&'a str) -> PResult<'a, BinaryOperator>,
) -> PResult<'a, Expression> {
    let (mut input, mut left) = operand(input)?;
    loop {
        match preceded(multispace0, operator).parse(input) {
            Ok((rest, op)) => {
                let (rest, right) = operand(rest)?;
                left = Expression::BinaryOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                };
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, left)),
            Err(e) => return Err(e),
        }
    }
}

// --- Expression Parsers (lowest precedence first) ---

fn expression(input: &str) -> PResult<'_, Expression> {
    or_expr(input)
}

fn or_expr(input: &str) -> PResult<'_, Expression> {
    binary_level(input, and_expr, |i| value(BinaryOperator::Or, keyword("or")).parse(i))
}

fn and_expr(input: &str) -> PResult<'_, Expression> {
    binary_level(input, equality_expr, |i| value(BinaryOperator::And, keyword("and")).parse(i))
}

fn equality_expr(input: &str) -> PResult<'_, Expression> {
    binary_level(input, relational_expr, |i| {
        alt((
            value(BinaryOperator::NotEquals, tag("!=")),
            value(BinaryOperator::Equals, char('=')),
        ))
        .parse(i)
    })
}

fn relational_expr(input: &str) -> PResult<'_, Expression> {
    binary_level(input, additive_expr, |i| {
        alt((
            value(BinaryOperator::LessThanOrEqual, tag("<=")),
            value(BinaryOperator::GreaterThanOrEqual, tag(">=")),
            value(BinaryOperator::LessThan, char('<')),
            value(BinaryOperator::GreaterThan, char('>')),
        ))
        .parse(i)
    })
}

fn additive_expr(input: &str) -> PResult<'_, Expression> {
    binary_level(input, multiplicative_expr, |i| {
        alt((
            value(BinaryOperator::Plus, char('+')),
            value(BinaryOperator::Minus, char('-')),
        ))
        .parse(i)
    })
}

fn multiplicative_expr(input: &str) -> PResult<'_, Expression> {
    binary_level(input, unary_expr, |i| {
        alt((
            value(BinaryOperator::Multiply, char('*')),
            value(BinaryOperator::Divide, keyword("div")),
            value(BinaryOperator::Modulo, keyword("mod")),
        ))
        .parse(i)
    })
}

fn unary_expr(input: &str) -> PResult<'_, Expression> {
    if let Ok((rest, _)) = preceded(multispace0, char::<&str, nom::error::Error<&str>>('-')).parse(input) {
        let (rest, expr) = unary_expr(rest)?;
        return Ok((
            rest,
            Expression::UnaryOp {
                op: UnaryOperator::Minus,
                expr: Box::new(expr),
            },
        ));
    }
    union_expr(input)
}

fn union_expr(input: &str) -> PResult<'_, Expression> {
    binary_level(input, path_expr, |i| value(BinaryOperator::Union, char('|')).parse(i))
}

/// A filter expression optionally continued by a relative path, or a plain location path.
/// Primary expressions are tried first so that `position()` is not read as a step named `position`.
fn path_expr(input: &str) -> PResult<'_, Expression> {
    let (input, _) = multispace0(input)?;
    match filter_expr(input) {
        Ok((rest, primary)) => {
            let (rest, tail) = relative_steps(rest)?;
            if tail.is_empty() {
                return Ok((rest, primary));
            }
            Ok((
                rest,
                Expression::LocationPath(LocationPath {
                    start_point: Some(Box::new(primary)),
                    is_absolute: false,
                    steps: tail,
                }),
            ))
        }
        Err(nom::Err::Error(_)) => map(location_path, Expression::LocationPath).parse(input),
        Err(e) => Err(e),
    }
}

fn filter_expr(input: &str) -> PResult<'_, Expression> {
    let (rest, primary) = primary_expr(input)?;
    let (rest, predicates) = many0(predicate).parse(rest)?;
    if predicates.is_empty() {
        Ok((rest, primary))
    } else {
        Ok((
            rest,
            Expression::Filter {
                primary: Box::new(primary),
                predicates,
            },
        ))
    }
}

fn primary_expr(input: &str) -> PResult<'_, Expression> {
    alt((
        variable_reference,
        map(number_literal, Expression::Number),
        map(string_literal, Expression::Literal),
        function_call,
        delimited(char('('), expression, preceded(multispace0, char(')'))),
    ))
    .parse(input)
}

// --- Literal Parsers ---

fn number_literal(input: &str) -> PResult<'_, f64> {
    map_res(
        recognize(alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        ))),
        str::parse::<f64>,
    )
    .parse(input)
}

fn string_literal(input: &str) -> PResult<'_, String> {
    map(
        alt((
            delimited(char('\''), take_while(|c| c != '\''), char('\'')),
            delimited(char('"'), take_while(|c| c != '"'), char('"')),
        )),
        str::to_string,
    )
    .parse(input)
}

fn variable_reference(input: &str) -> PResult<'_, Expression> {
    map(preceded(char('$'), q_name), |(prefix, local)| {
        Expression::Variable(join_qname(prefix, local))
    })
    .parse(input)
}

// --- Name and NodeTest Parsers ---

fn nc_name(input: &str) -> PResult<'_, &str> {
    recognize(pair(take_while1(is_name_start), take_while(is_name_char))).parse(input)
}

fn q_name(input: &str) -> PResult<'_, (Option<&str>, &str)> {
    alt((
        map(pair(nc_name, preceded(char(':'), nc_name)), |(p, l)| (Some(p), l)),
        map(nc_name, |l| (None, l)),
    ))
    .parse(input)
}

fn join_qname(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) => format!("{}:{}", p, local),
        None => local.to_string(),
    }
}

fn empty_parens(input: &str) -> PResult<'_, ()> {
    value(
        (),
        pair(preceded(multispace0, char('(')), preceded(multispace0, char(')'))),
    )
    .parse(input)
}

fn node_type_test(input: &str) -> PResult<'_, NodeTypeTest> {
    alt((
        value(NodeTypeTest::Text, terminated(tag("text"), empty_parens)),
        value(NodeTypeTest::Node, terminated(tag("node"), empty_parens)),
        value(NodeTypeTest::Comment, terminated(tag("comment"), empty_parens)),
        map(
            preceded(
                tag("processing-instruction"),
                delimited(
                    preceded(multispace0, char('(')),
                    opt(preceded(multispace0, string_literal)),
                    preceded(multispace0, char(')')),
                ),
            ),
            NodeTypeTest::ProcessingInstruction,
        ),
    ))
    .parse(input)
}

pub fn node_test(input: &str) -> PResult<'_, NodeTest> {
    alt((
        value(NodeTest::Wildcard, char('*')),
        map(terminated(nc_name, tag(":*")), |p| NodeTest::NamespaceWildcard(p.to_string())),
        map(node_type_test, NodeTest::NodeType),
        map(q_name, |(prefix, local)| NodeTest::Name {
            prefix: prefix.map(str::to_string),
            local: local.to_string(),
        }),
    ))
    .parse(input)
}

// --- Path Parsers ---

fn axis(input: &str) -> PResult<'_, Axis> {
    terminated(
        alt((
            value(Axis::AncestorOrSelf, tag("ancestor-or-self")),
            value(Axis::Ancestor, tag("ancestor")),
            value(Axis::Attribute, tag("attribute")),
            value(Axis::Child, tag("child")),
            value(Axis::DescendantOrSelf, tag("descendant-or-self")),
            value(Axis::Descendant, tag("descendant")),
            value(Axis::FollowingSibling, tag("following-sibling")),
            value(Axis::Following, tag("following")),
            value(Axis::Namespace, tag("namespace")),
            value(Axis::Parent, tag("parent")),
            value(Axis::PrecedingSibling, tag("preceding-sibling")),
            value(Axis::Preceding, tag("preceding")),
            value(Axis::SelfAxis, tag("self")),
        )),
        preceded(multispace0, tag("::")),
    )
    .parse(input)
}

fn predicate(input: &str) -> PResult<'_, Expression> {
    delimited(
        preceded(multispace0, char('[')),
        expression,
        preceded(multispace0, char(']')),
    )
    .parse(input)
}

/// `..` or `.`, which take no predicates.
fn abbreviated_step(input: &str) -> PResult<'_, Axis> {
    terminated(
        alt((value(Axis::Parent, tag("..")), value(Axis::SelfAxis, char('.')))),
        not(digit1),
    )
    .parse(input)
}

fn step(input: &str) -> PResult<'_, Step> {
    if let Ok((rest, axis)) = abbreviated_step(input) {
        return Ok((
            rest,
            Step {
                axis,
                node_test: NodeTest::NodeType(NodeTypeTest::Node),
                predicates: vec![],
            },
        ));
    }

    let (rest, (axis, node_test)) = alt((
        map(preceded(pair(char('@'), multispace0), node_test), |nt| (Axis::Attribute, nt)),
        pair(map(opt(axis), |a| a.unwrap_or(Axis::Child)), preceded(multispace0, node_test)),
    ))
    .parse(input)?;
    let (rest, predicates) = many0(predicate).parse(rest)?;
    Ok((
        rest,
        Step {
            axis,
            node_test,
            predicates,
        },
    ))
}

/// Zero or more `/step` or `//step` continuations, with `//` expanded.
fn relative_steps(input: &str) -> PResult<'_, Vec<Step>> {
    let (rest, pairs) = many0(pair(
        preceded(multispace0, alt((tag("//"), tag("/")))),
        preceded(multispace0, step),
    ))
    .parse(input)?;
    let mut steps = Vec::new();
    for (separator, step) in pairs {
        if separator == "//" {
            steps.push(Step::descendant_or_self());
        }
        steps.push(step);
    }
    Ok((rest, steps))
}

fn location_path(input: &str) -> PResult<'_, LocationPath> {
    let (rest, is_absolute, mut steps) = if let Ok((rest, _)) = tag::<&str, &str, nom::error::Error<&str>>("//").parse(input) {
        let (rest, first) = preceded(multispace0, step).parse(rest)?;
        (rest, true, vec![Step::descendant_or_self(), first])
    } else if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>('/').parse(input) {
        match preceded(multispace0, step).parse(rest) {
            Ok((rest, first)) => (rest, true, vec![first]),
            // A bare `/` selects the root.
            Err(_) => (rest, true, vec![]),
        }
    } else {
        let (rest, first) = step(input)?;
        (rest, false, vec![first])
    };

    if steps.is_empty() {
        return Ok((
            rest,
            LocationPath {
                start_point: None,
                is_absolute,
                steps,
            },
        ));
    }
    let (rest, tail) = relative_steps(rest)?;
    steps.extend(tail);
    Ok((
        rest,
        LocationPath {
            start_point: None,
            is_absolute,
            steps,
        },
    ))
}

// --- Function Call Parser ---

fn function_call(input: &str) -> PResult<'_, Expression> {
    let (rest, (prefix, local)) = q_name(input)?;
    // Node-type tests look like calls but belong to the step parser.
    if prefix.is_none() && matches!(local, "text" | "node" | "comment" | "processing-instruction") {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }
    let (rest, args) = delimited(
        preceded(multispace0, char('(')),
        separated_list0(preceded(multispace0, char(',')), expression),
        preceded(multispace0, char(')')),
    )
    .parse(rest)?;
    Ok((
        rest,
        Expression::FunctionCall {
            name: join_qname(prefix, local),
            args,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(local: &str) -> NodeTest {
        NodeTest::Name {
            prefix: None,
            local: local.into(),
        }
    }

    fn child(local: &str) -> Step {
        Step {
            axis: Axis::Child,
            node_test: name(local),
            predicates: vec![],
        }
    }

    #[test]
    fn test_parse_simple_path() {
        let result = parse_expression("foo/bar").unwrap();
        assert_eq!(
            result,
            Expression::LocationPath(LocationPath {
                start_point: None,
                is_absolute: false,
                steps: vec![child("foo"), child("bar")],
            })
        );
    }

    #[test]
    fn test_parse_abbreviations() {
        let Expression::LocationPath(lp) = parse_expression("//para/../@id").unwrap() else {
            panic!("expected a location path");
        };
        assert!(lp.is_absolute);
        let axes: Vec<Axis> = lp.steps.iter().map(|s| s.axis).collect();
        assert_eq!(
            axes,
            vec![Axis::DescendantOrSelf, Axis::Child, Axis::Parent, Axis::Attribute]
        );

        let root = parse_expression("/").unwrap();
        assert_eq!(
            root,
            Expression::LocationPath(LocationPath {
                start_point: None,
                is_absolute: true,
                steps: vec![],
            })
        );
    }

    #[test]
    fn test_parse_unary_minus() {
        let result = parse_expression("10 - -5").unwrap();
        assert_eq!(
            result,
            Expression::BinaryOp {
                left: Box::new(Expression::Number(10.0)),
                op: BinaryOperator::Minus,
                right: Box::new(Expression::UnaryOp {
                    op: UnaryOperator::Minus,
                    expr: Box::new(Expression::Number(5.0)),
                }),
            }
        );
    }

    #[test]
    fn test_operator_keywords_do_not_swallow_names() {
        let result = parse_expression("order or android").unwrap();
        assert_eq!(
            result,
            Expression::BinaryOp {
                left: Box::new(Expression::LocationPath(LocationPath {
                    start_point: None,
                    is_absolute: false,
                    steps: vec![child("order")],
                })),
                op: BinaryOperator::Or,
                right: Box::new(Expression::LocationPath(LocationPath {
                    start_point: None,
                    is_absolute: false,
                    steps: vec![child("android")],
                })),
            }
        );
    }

    #[test]
    fn test_star_is_multiply_after_an_operand() {
        let result = parse_expression("2 * *").unwrap();
        let Expression::BinaryOp { op, right, .. } = result else {
            panic!("expected a binary expression");
        };
        assert_eq!(op, BinaryOperator::Multiply);
        assert!(right.is_location_path());
    }

    #[test]
    fn test_parse_axes_and_node_tests() {
        let Expression::LocationPath(lp) =
            parse_expression("ancestor-or-self::x:*/following-sibling::processing-instruction('php')")
                .unwrap()
        else {
            panic!("expected a location path");
        };
        assert_eq!(lp.steps[0].axis, Axis::AncestorOrSelf);
        assert_eq!(lp.steps[0].node_test, NodeTest::NamespaceWildcard("x".into()));
        assert_eq!(lp.steps[1].axis, Axis::FollowingSibling);
        assert_eq!(
            lp.steps[1].node_test,
            NodeTest::NodeType(NodeTypeTest::ProcessingInstruction(Some("php".into())))
        );
    }

    #[test]
    fn test_filter_expression_with_path() {
        let result = parse_expression("$items[2]/name").unwrap();
        let Expression::LocationPath(lp) = result else {
            panic!("expected a location path");
        };
        assert_eq!(
            lp.start_point.as_deref(),
            Some(&Expression::Filter {
                primary: Box::new(Expression::Variable("items".into())),
                predicates: vec![Expression::Number(2.0)],
            })
        );
        assert_eq!(lp.steps, vec![child("name")]);
    }

    #[test]
    fn test_function_calls_and_prefixed_names() {
        let result = parse_expression("ext:upper( string(.) , 'a' )").unwrap();
        let Expression::FunctionCall { name, args } = result else {
            panic!("expected a function call");
        };
        assert_eq!(name, "ext:upper");
        assert_eq!(args.len(), 2);

        let text = parse_expression("text()").unwrap();
        assert!(text.is_location_path());
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse_expression(".5").unwrap(), Expression::Number(0.5));
        assert_eq!(parse_expression("3.").unwrap(), Expression::Number(3.0));
    }

    #[test]
    fn test_rejects_trailing_garbage() {
        let err = parse_expression("foo]").unwrap_err();
        assert!(matches!(err, XPathError::XPathParse(ref expr, _) if expr == "foo]"));
        assert!(parse_expression("1 +").is_err());
    }
}
