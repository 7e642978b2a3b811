//! Guard and value expressions for behavior rules
//!
//! Expressions are parsed once when a material is compiled and evaluated
//! against a JSON context tree on every firing. Paths that do not resolve
//! evaluate to `null`; any evaluation error makes a guard false.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{map, map_res, opt, recognize},
    error::ErrorKind,
    multi::separated_list0,
    sequence::{delimited, pair, preceded},
    IResult, Parser,
};
use serde_json::{Number, Value};
use std::cell::Cell;
use thiserror::Error;

use crate::triggers::context::{display_value, lookup, truthy};

/// Binary operators supported in expressions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
    Neq,
    And,
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Expression AST node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
    /// Dotted context path (e.g. `self.emotion.valence`, `memory.items.0`)
    Path(Vec<String>),
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `c ? a : b` or `if c then a else b`
    Conditional {
        condition: Box<Expr>,
        true_expr: Box<Expr>,
        false_expr: Box<Expr>,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Function '{func}' expects {expected} arguments, got {got}")]
    InvalidArgCount {
        func: String,
        expected: usize,
        got: usize,
    },
    #[error("Type mismatch in {op}: {detail}")]
    TypeMismatch { op: String, detail: String },
    #[error("Non-finite numeric result")]
    NonFinite,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("Parse error: {message}")]
pub struct ParseError {
    pub message: String,
}

type PResult<'a, O> = IResult<&'a str, O>;

/// Deepest nesting of parentheses, calls, conditionals and unary operators
pub const MAX_NESTING: usize = 64;

impl Expr {
    /// Parse a complete expression; trailing input is an error
    pub fn parse(source: &str) -> Result<Expr, ParseError> {
        match ternary(source) {
            Ok((rest, expr)) => {
                let rest = rest.trim();
                if rest.is_empty() {
                    Ok(expr)
                } else {
                    Err(ParseError {
                        message: format!("unexpected input at '{}'", rest),
                    })
                }
            }
            Err(nom::Err::Failure(e)) if e.code == ErrorKind::TooLarge => Err(ParseError {
                message: format!("expression nested deeper than {} levels", MAX_NESTING),
            }),
            Err(e) => Err(ParseError {
                message: format!("cannot parse '{}': {:?}", source, e),
            }),
        }
    }

    fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
        Expr::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn evaluate(&self, ctx: &Value) -> Result<Value, EvalError> {
        match self {
            Expr::Number(n) => number(*n),
            Expr::Text(s) => Ok(Value::String(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Path(segments) => Ok(lookup(ctx, segments).cloned().unwrap_or(Value::Null)),
            Expr::UnaryOp { op, operand } => {
                let value = operand.evaluate(ctx)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                    UnaryOp::Neg => number(-as_number(&value, "negation")?),
                }
            }
            Expr::BinOp { op, left, right } => evaluate_binary(*op, left, right, ctx),
            Expr::Conditional {
                condition,
                true_expr,
                false_expr,
            } => {
                if truthy(&condition.evaluate(ctx)?) {
                    true_expr.evaluate(ctx)
                } else {
                    false_expr.evaluate(ctx)
                }
            }
            Expr::Function { name, args } => {
                let values = args
                    .iter()
                    .map(|a| a.evaluate(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                call_function(name, &values)
            }
        }
    }

    /// Evaluate to a finite number (booleans count as 1 / 0)
    pub fn evaluate_number(&self, ctx: &Value) -> Result<f64, EvalError> {
        as_number(&self.evaluate(ctx)?, "numeric expression")
    }

    pub fn evaluate_bool(&self, ctx: &Value) -> Result<bool, EvalError> {
        Ok(truthy(&self.evaluate(ctx)?))
    }

    /// Guard semantics: errors are false
    pub fn guard(&self, ctx: &Value) -> bool {
        self.evaluate_bool(ctx).unwrap_or(false)
    }
}

// ============================================================================
// Parser
// ============================================================================

thread_local! {
    static NESTING: Cell<usize> = const { Cell::new(0) };
}

/// One level of recursive descent; released on drop
struct Nesting;

impl Nesting {
    fn enter(i: &str) -> Result<Self, nom::Err<nom::error::Error<&str>>> {
        let depth = NESTING.with(|n| n.get()) + 1;
        if depth > MAX_NESTING {
            return Err(nom::Err::Failure(nom::error::Error::new(i, ErrorKind::TooLarge)));
        }
        NESTING.with(|n| n.set(depth));
        Ok(Nesting)
    }
}

impl Drop for Nesting {
    fn drop(&mut self) {
        NESTING.with(|n| n.set(n.get().saturating_sub(1)));
    }
}

fn sp(i: &str) -> PResult<'_, &str> {
    multispace0(i)
}

fn symbol<'a>(i: &'a str, sym: &str) -> PResult<'a, &'a str> {
    preceded(sp, tag(sym)).parse(i)
}

/// A keyword must not run into an identifier character
fn keyword<'a>(i: &'a str, word: &str) -> PResult<'a, &'a str> {
    let (rest, matched) = symbol(i, word)?;
    match rest.chars().next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => {
            Err(nom::Err::Error(nom::error::Error::new(i, ErrorKind::Tag)))
        }
        _ => Ok((rest, matched)),
    }
}

fn ternary(i: &str) -> PResult<'_, Expr> {
    let _level = Nesting::enter(i)?;
    let (i, condition) = or_expr(i)?;
    if let Ok((rest, _)) = symbol(i, "?") {
        let (rest, true_expr) = ternary(rest)?;
        let (rest, _) = symbol(rest, ":")?;
        let (rest, false_expr) = ternary(rest)?;
        return Ok((
            rest,
            Expr::Conditional {
                condition: Box::new(condition),
                true_expr: Box::new(true_expr),
                false_expr: Box::new(false_expr),
            },
        ));
    }
    Ok((i, condition))
}

/// Left-associative fold over one precedence level
fn binary_level<'a>(
    input: &'a str,
    operand: fn(&'a str) -> PResult<'a, Expr>,
    ops: &[(&str, BinOp)],
) -> PResult<'a, Expr> {
    let (mut rest, mut left) = operand(input)?;
    'outer: loop {
        for (sym, op) in ops {
            if let Ok((after, _)) = symbol(rest, sym) {
                let (after, right) = operand(after)?;
                left = Expr::binary(*op, left, right);
                rest = after;
                continue 'outer;
            }
        }
        return Ok((rest, left));
    }
}

fn or_expr(i: &str) -> PResult<'_, Expr> {
    binary_level(i, and_expr, &[("||", BinOp::Or)])
}

fn and_expr(i: &str) -> PResult<'_, Expr> {
    binary_level(i, equality, &[("&&", BinOp::And)])
}

fn equality(i: &str) -> PResult<'_, Expr> {
    binary_level(i, comparison, &[("==", BinOp::Eq), ("!=", BinOp::Neq)])
}

fn comparison(i: &str) -> PResult<'_, Expr> {
    binary_level(
        i,
        additive,
        &[
            (">=", BinOp::Gte),
            ("<=", BinOp::Lte),
            (">", BinOp::Gt),
            ("<", BinOp::Lt),
        ],
    )
}

fn additive(i: &str) -> PResult<'_, Expr> {
    binary_level(i, multiplicative, &[("+", BinOp::Add), ("-", BinOp::Sub)])
}

fn multiplicative(i: &str) -> PResult<'_, Expr> {
    binary_level(
        i,
        unary,
        &[("*", BinOp::Mul), ("/", BinOp::Div), ("%", BinOp::Mod)],
    )
}

fn unary(i: &str) -> PResult<'_, Expr> {
    for (sym, op) in [("!", UnaryOp::Not), ("-", UnaryOp::Neg)] {
        if let Ok((rest, _)) = symbol(i, sym) {
            let _level = Nesting::enter(rest)?;
            let (rest, operand) = unary(rest)?;
            return Ok((
                rest,
                Expr::UnaryOp {
                    op,
                    operand: Box::new(operand),
                },
            ));
        }
    }
    primary(i)
}

fn primary(i: &str) -> PResult<'_, Expr> {
    let (i, _) = sp(i)?;
    alt((number_literal, string_literal, parenthesized, word)).parse(i)
}

fn number_literal(i: &str) -> PResult<'_, Expr> {
    map_res(recognize((digit1, opt((char('.'), digit1)))), |s: &str| {
        s.parse::<f64>().map(Expr::Number)
    })
    .parse(i)
}

fn string_literal(i: &str) -> PResult<'_, Expr> {
    map(
        alt((
            delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
            delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
        )),
        |s: &str| Expr::Text(s.to_string()),
    )
    .parse(i)
}

fn parenthesized(i: &str) -> PResult<'_, Expr> {
    let (i, _) = symbol(i, "(")?;
    let (i, inner) = ternary(i)?;
    let (i, _) = symbol(i, ")")?;
    Ok((i, inner))
}

fn identifier(i: &str) -> PResult<'_, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))
    .parse(i)
}

fn path_segment(i: &str) -> PResult<'_, &str> {
    preceded(char('.'), alt((identifier, digit1))).parse(i)
}

fn comma(i: &str) -> PResult<'_, &str> {
    symbol(i, ",")
}

fn word(i: &str) -> PResult<'_, Expr> {
    let (rest, name) = identifier(i)?;
    match name {
        "true" => return Ok((rest, Expr::Bool(true))),
        "false" => return Ok((rest, Expr::Bool(false))),
        "null" => return Ok((rest, Expr::Null)),
        "if" => return if_then_else(rest),
        _ => {}
    }

    if let Ok((after, _)) = symbol(rest, "(") {
        let (after, args) = separated_list0(comma, ternary).parse(after)?;
        let (after, _) = symbol(after, ")")?;
        return Ok((
            after,
            Expr::Function {
                name: name.to_string(),
                args,
            },
        ));
    }

    let mut segments = vec![name.to_string()];
    let mut rest = rest;
    while let Ok((after, segment)) = path_segment(rest) {
        segments.push(segment.to_string());
        rest = after;
    }
    Ok((rest, Expr::Path(segments)))
}

fn if_then_else(i: &str) -> PResult<'_, Expr> {
    let (i, condition) = ternary(i)?;
    let (i, _) = keyword(i, "then")?;
    let (i, true_expr) = ternary(i)?;
    let (i, _) = keyword(i, "else")?;
    let (i, false_expr) = ternary(i)?;
    Ok((
        i,
        Expr::Conditional {
            condition: Box::new(condition),
            true_expr: Box::new(true_expr),
            false_expr: Box::new(false_expr),
        },
    ))
}

// ============================================================================
// Evaluation
// ============================================================================

fn number(n: f64) -> Result<Value, EvalError> {
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or(EvalError::NonFinite)
}

fn as_number(value: &Value, op: &str) -> Result<f64, EvalError> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).ok_or(EvalError::NonFinite),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(EvalError::TypeMismatch {
            op: op.to_string(),
            detail: format!("expected a number, got {}", type_name(other)),
        }),
    }
}

fn as_text<'a>(value: &'a Value, op: &str) -> Result<&'a str, EvalError> {
    value.as_str().ok_or_else(|| EvalError::TypeMismatch {
        op: op.to_string(),
        detail: format!("expected a string, got {}", type_name(value)),
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Equality treating integer and float encodings of a number as the same
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn evaluate_binary(op: BinOp, left: &Expr, right: &Expr, ctx: &Value) -> Result<Value, EvalError> {
    // Logical operators short-circuit
    match op {
        BinOp::And => {
            let l = left.evaluate_bool(ctx)?;
            return Ok(Value::Bool(l && right.evaluate_bool(ctx)?));
        }
        BinOp::Or => {
            let l = left.evaluate_bool(ctx)?;
            return Ok(Value::Bool(l || right.evaluate_bool(ctx)?));
        }
        _ => {}
    }

    let l = left.evaluate(ctx)?;
    let r = right.evaluate(ctx)?;
    match op {
        BinOp::Eq => Ok(Value::Bool(loose_eq(&l, &r))),
        BinOp::Neq => Ok(Value::Bool(!loose_eq(&l, &r))),
        BinOp::Gt | BinOp::Lt | BinOp::Gte | BinOp::Lte => {
            let ordering = match (&l, &r) {
                (Value::String(a), Value::String(b)) => a.cmp(b),
                _ => {
                    let a = as_number(&l, "comparison")?;
                    let b = as_number(&r, "comparison")?;
                    a.total_cmp(&b)
                }
            };
            let result = match op {
                BinOp::Gt => ordering.is_gt(),
                BinOp::Lt => ordering.is_lt(),
                BinOp::Gte => ordering.is_ge(),
                _ => ordering.is_le(),
            };
            Ok(Value::Bool(result))
        }
        BinOp::Add => {
            if l.is_string() || r.is_string() {
                Ok(Value::String(format!("{}{}", display_value(&l), display_value(&r))))
            } else {
                number(as_number(&l, "+")? + as_number(&r, "+")?)
            }
        }
        BinOp::Sub => number(as_number(&l, "-")? - as_number(&r, "-")?),
        BinOp::Mul => number(as_number(&l, "*")? * as_number(&r, "*")?),
        BinOp::Div | BinOp::Mod => {
            let a = as_number(&l, "/")?;
            let b = as_number(&r, "/")?;
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            number(if op == BinOp::Div { a / b } else { a % b })
        }
        BinOp::And => Ok(Value::Bool(truthy(&l) && truthy(&r))),
        BinOp::Or => Ok(Value::Bool(truthy(&l) || truthy(&r))),
    }
}

fn expect_args(func: &str, args: &[Value], expected: usize) -> Result<(), EvalError> {
    if args.len() != expected {
        return Err(EvalError::InvalidArgCount {
            func: func.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn call_function(name: &str, args: &[Value]) -> Result<Value, EvalError> {
    match name {
        "min" | "max" => {
            if args.is_empty() {
                return Err(EvalError::InvalidArgCount {
                    func: name.to_string(),
                    expected: 1,
                    got: 0,
                });
            }
            let mut values = args.iter().map(|a| as_number(a, name));
            let first = values.next().unwrap_or(Ok(0.0))?;
            let result = values.try_fold(first, |acc, v| {
                let v = v?;
                Ok::<f64, EvalError>(if name == "min" { acc.min(v) } else { acc.max(v) })
            })?;
            number(result)
        }
        "abs" | "floor" | "ceil" | "round" | "sqrt" => {
            expect_args(name, args, 1)?;
            let x = as_number(&args[0], name)?;
            number(match name {
                "abs" => x.abs(),
                "floor" => x.floor(),
                "ceil" => x.ceil(),
                "round" => x.round(),
                _ => x.sqrt(),
            })
        }
        "clamp" => {
            expect_args(name, args, 3)?;
            let x = as_number(&args[0], name)?;
            let lo = as_number(&args[1], name)?;
            let hi = as_number(&args[2], name)?;
            number(x.max(lo).min(hi))
        }
        "pow" => {
            expect_args(name, args, 2)?;
            number(as_number(&args[0], name)?.powf(as_number(&args[1], name)?))
        }
        "len" => {
            expect_args(name, args, 1)?;
            let n = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                Value::Null => 0,
                other => {
                    return Err(EvalError::TypeMismatch {
                        op: "len".into(),
                        detail: format!("cannot take length of {}", type_name(other)),
                    })
                }
            };
            number(n as f64)
        }
        "lower" | "upper" => {
            expect_args(name, args, 1)?;
            let text = display_value(&args[0]);
            Ok(Value::String(if name == "lower" {
                text.to_lowercase()
            } else {
                text.to_uppercase()
            }))
        }
        "contains" => {
            expect_args(name, args, 2)?;
            let found = match &args[0] {
                Value::Array(items) => items.iter().any(|item| loose_eq(item, &args[1])),
                Value::Object(map) => map.contains_key(&display_value(&args[1])),
                Value::Null => false,
                other => as_text(other, name)?.contains(display_value(&args[1]).as_str()),
            };
            Ok(Value::Bool(found))
        }
        "starts_with" => {
            expect_args(name, args, 2)?;
            let text = as_text(&args[0], name)?;
            Ok(Value::Bool(text.starts_with(display_value(&args[1]).as_str())))
        }
        "exists" => {
            expect_args(name, args, 1)?;
            Ok(Value::Bool(!args[0].is_null()))
        }
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}
