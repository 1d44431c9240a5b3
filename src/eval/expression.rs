//! Values and the small expression language used for guard conditions,
//! `expr` attributes and `<value>` prompt segments.
//!
//! The language covers what VoiceXML documents put into `cond` and `expr`
//! attributes in practice: literals, variable references, `!`, unary `-`,
//! `+ -`, comparisons, equality and the short-circuit `&&` / `||` operators.

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, multispace0, satisfy},
    combinator::{all_consuming, map, peek, recognize},
    multi::many0,
    number::complete::recognize_float,
    sequence::{delimited, pair, preceded},
    IResult,
};
use serde::{Deserialize, Serialize};

use super::context::ScriptError;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
        }
    }

    fn as_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
        }
    }

    fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (a, b) => a.as_number() == b.as_number(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum BinaryOperator {
    #[strum(serialize = "||")]
    Or,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "==")]
    Equal,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessThanEqual,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterThanEqual,
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Variable(String),
    Not(Box<Expression>),
    Negate(Box<Expression>),
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    /// Parses a complete expression. Trailing input is a syntax error.
    pub fn parse(source: &str) -> Result<Expression, ScriptError> {
        all_consuming(parse_or)(source)
            .map(|(_, expr)| expr)
            .map_err(|e| ScriptError::Syntax {
                expression: source.to_string(),
                message: e.to_string(),
            })
    }

    /// Evaluates against `lookup`, which resolves a variable name through
    /// the caller's scope chain.
    pub fn evaluate(&self, lookup: &dyn Fn(&str) -> Value) -> Value {
        match self {
            Expression::Literal(value) => value.clone(),
            Expression::Variable(name) => lookup(name),
            Expression::Not(inner) => Value::Boolean(!inner.evaluate(lookup).is_truthy()),
            Expression::Negate(inner) => Value::Number(-inner.evaluate(lookup).as_number()),
            Expression::BinaryOp { op, left, right } => {
                let left = left.evaluate(lookup);
                // && and || return one of their operands
                match op {
                    BinaryOperator::And if !left.is_truthy() => return left,
                    BinaryOperator::And => return right.evaluate(lookup),
                    BinaryOperator::Or if left.is_truthy() => return left,
                    BinaryOperator::Or => return right.evaluate(lookup),
                    _ => {}
                }
                let right = right.evaluate(lookup);
                apply_binary(*op, &left, &right)
            }
        }
    }
}

fn apply_binary(op: BinaryOperator, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOperator::Equal => Value::Boolean(left.loose_eq(right)),
        BinaryOperator::NotEqual => Value::Boolean(!left.loose_eq(right)),
        BinaryOperator::Add => match (left, right) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                Value::String(format!("{}{}", left, right))
            }
            _ => Value::Number(left.as_number() + right.as_number()),
        },
        BinaryOperator::Subtract => Value::Number(left.as_number() - right.as_number()),
        BinaryOperator::LessThan
        | BinaryOperator::LessThanEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanEqual => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => a.partial_cmp(b),
                _ => left.as_number().partial_cmp(&right.as_number()),
            };
            let result = match ordering {
                None => false,
                Some(ordering) => match op {
                    BinaryOperator::LessThan => ordering.is_lt(),
                    BinaryOperator::LessThanEqual => ordering.is_le(),
                    BinaryOperator::GreaterThan => ordering.is_gt(),
                    _ => ordering.is_ge(),
                },
            };
            Value::Boolean(result)
        }
        // short-circuited in Expression::evaluate
        BinaryOperator::And | BinaryOperator::Or => Value::Undefined,
    }
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn fold_binary(
    first: Expression,
    rest: Vec<(BinaryOperator, Expression)>,
) -> Expression {
    rest.into_iter()
        .fold(first, |left, (op, right)| Expression::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
}

fn parse_or(input: &str) -> IResult<&str, Expression> {
    let (input, first) = parse_and(input)?;
    let (input, rest) = many0(pair(
        map(ws(tag("||")), |_| BinaryOperator::Or),
        parse_and,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn parse_and(input: &str) -> IResult<&str, Expression> {
    let (input, first) = parse_equality(input)?;
    let (input, rest) = many0(pair(
        map(ws(tag("&&")), |_| BinaryOperator::And),
        parse_equality,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn parse_equality(input: &str) -> IResult<&str, Expression> {
    let (input, first) = parse_relational(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            map(alt((tag("==="), tag("=="))), |_| BinaryOperator::Equal),
            map(alt((tag("!=="), tag("!="))), |_| BinaryOperator::NotEqual),
        ))),
        parse_relational,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn parse_relational(input: &str) -> IResult<&str, Expression> {
    let (input, first) = parse_additive(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            map(tag("<="), |_| BinaryOperator::LessThanEqual),
            map(tag(">="), |_| BinaryOperator::GreaterThanEqual),
            map(tag("<"), |_| BinaryOperator::LessThan),
            map(tag(">"), |_| BinaryOperator::GreaterThan),
        ))),
        parse_additive,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn parse_additive(input: &str) -> IResult<&str, Expression> {
    let (input, first) = parse_unary(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            map(char('+'), |_| BinaryOperator::Add),
            map(char('-'), |_| BinaryOperator::Subtract),
        ))),
        parse_unary,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn parse_unary(input: &str) -> IResult<&str, Expression> {
    alt((
        map(preceded(ws(char('!')), parse_unary), |e| {
            Expression::Not(Box::new(e))
        }),
        map(preceded(ws(char('-')), parse_unary), |e| {
            Expression::Negate(Box::new(e))
        }),
        parse_primary,
    ))(input)
}

fn parse_primary(input: &str) -> IResult<&str, Expression> {
    ws(alt((
        delimited(char('('), parse_or, char(')')),
        parse_string,
        parse_number,
        parse_identifier,
    )))(input)
}

fn parse_string(input: &str) -> IResult<&str, Expression> {
    map(
        alt((
            delimited(char('\''), take_while(|c| c != '\''), char('\'')),
            delimited(char('"'), take_while(|c| c != '"'), char('"')),
        )),
        |s: &str| Expression::Literal(Value::String(s.to_string())),
    )(input)
}

fn parse_number(input: &str) -> IResult<&str, Expression> {
    let (rest, digits) = preceded(
        // recognize_float also accepts a sign; signs are handled by parse_unary
        peek(satisfy(|c| c.is_ascii_digit() || c == '.')),
        recognize_float,
    )(input)?;
    match digits.parse::<f64>() {
        Ok(n) => Ok((rest, Expression::Literal(Value::Number(n)))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Float,
        ))),
    }
}

fn parse_identifier(input: &str) -> IResult<&str, Expression> {
    let (rest, name) = recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_' || c == '$'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.'),
    ))(input)?;
    let expr = match name {
        "true" => Expression::Literal(Value::Boolean(true)),
        "false" => Expression::Literal(Value::Boolean(false)),
        "null" => Expression::Literal(Value::Null),
        "undefined" => Expression::Literal(Value::Undefined),
        _ => Expression::Variable(name.to_string()),
    };
    Ok((rest, expr))
}
