//! Rate-expression parsing and evaluation.
//!
//! Reaction rates are written as plain strings ("-k1 * A", "1.25 * exp((9500/1.987) *
//! (1/320.0 - 1/T))") and parsed into a small AST that the simulator evaluates at every
//! integrator step. Identifiers resolve against the model environment: components,
//! complementary states, kinetic parameters, step signals and the time variable `t`.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, multispace0},
    combinator::recognize,
    multi::many0,
    number::complete::double,
    sequence::pair,
    IResult, Parser,
};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Error that can occur during rate-expression parsing or evaluation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Failed to parse expression: {message}")]
    ParseError { message: String },

    #[error("Undefined variable: {name}")]
    UndefinedVariable { name: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Undefined function: {name}")]
    UndefinedFunction { name: String },

    #[error("{name}() requires {expected} argument(s), got {got}")]
    WrongArity {
        name: String,
        expected: usize,
        got: usize,
    },
}

/// Result type for expression evaluation
type ExprResult<T> = Result<T, ExpressionError>;

/// A parsed rate expression.
#[derive(Debug, Clone, PartialEq)]
pub enum RateExpr {
    /// Constant number
    Number(f64),

    /// Variable reference (component, state, parameter, step signal or `t`)
    Variable(String),

    /// Negation
    Neg(Box<RateExpr>),

    /// Binary operation
    Binary(BinaryOp, Box<RateExpr>, Box<RateExpr>),

    /// Function call
    Function(String, Vec<RateExpr>),
}

/// Binary operations
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    fn symbol(self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
            BinaryOp::Pow => '^',
        }
    }
}

/// Context supplying variable values during evaluation.
pub trait EvalContext {
    /// Get the value of a variable
    fn value_of(&self, name: &str) -> ExprResult<f64>;

    /// Check if a variable exists
    fn has_variable(&self, name: &str) -> bool;
}

impl EvalContext for HashMap<String, f64> {
    fn value_of(&self, name: &str) -> ExprResult<f64> {
        self.get(name)
            .copied()
            .ok_or_else(|| ExpressionError::UndefinedVariable {
                name: name.to_string(),
            })
    }

    fn has_variable(&self, name: &str) -> bool {
        self.contains_key(name)
    }
}

/// Apply a builtin function to already-evaluated arguments.
fn apply_function(name: &str, args: &[f64]) -> ExprResult<f64> {
    let arity = |expected: usize| -> ExprResult<()> {
        if args.len() != expected {
            Err(ExpressionError::WrongArity {
                name: name.to_string(),
                expected,
                got: args.len(),
            })
        } else {
            Ok(())
        }
    };

    match name {
        "exp" => {
            arity(1)?;
            Ok(args[0].exp())
        }
        "ln" | "log" => {
            arity(1)?;
            Ok(args[0].ln())
        }
        "log10" => {
            arity(1)?;
            Ok(args[0].log10())
        }
        "sqrt" => {
            arity(1)?;
            Ok(args[0].sqrt())
        }
        "abs" => {
            arity(1)?;
            Ok(args[0].abs())
        }
        "sin" => {
            arity(1)?;
            Ok(args[0].sin())
        }
        "cos" => {
            arity(1)?;
            Ok(args[0].cos())
        }
        "tan" => {
            arity(1)?;
            Ok(args[0].tan())
        }
        "pow" => {
            arity(2)?;
            Ok(args[0].powf(args[1]))
        }
        "min" => {
            if args.len() < 2 {
                return Err(ExpressionError::WrongArity {
                    name: name.to_string(),
                    expected: 2,
                    got: args.len(),
                });
            }
            Ok(args.iter().fold(f64::INFINITY, |a, &b| a.min(b)))
        }
        "max" => {
            if args.len() < 2 {
                return Err(ExpressionError::WrongArity {
                    name: name.to_string(),
                    expected: 2,
                    got: args.len(),
                });
            }
            Ok(args.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)))
        }
        _ => Err(ExpressionError::UndefinedFunction {
            name: name.to_string(),
        }),
    }
}

impl RateExpr {
    /// Parse a rate expression from a string.
    ///
    /// The whole input must be consumed; trailing characters are a parse error.
    pub fn parse(input: &str) -> ExprResult<Self> {
        match expression(input.trim()) {
            Ok((rest, expr)) if rest.trim().is_empty() => Ok(expr),
            Ok((rest, _)) => Err(ExpressionError::ParseError {
                message: format!("unexpected trailing characters: '{}'", rest),
            }),
            Err(e) => Err(ExpressionError::ParseError {
                message: format!("{:?}", e),
            }),
        }
    }

    /// Evaluate the expression against the given context.
    pub fn eval<C: EvalContext>(&self, ctx: &C) -> ExprResult<f64> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Variable(name) => ctx.value_of(name),
            Self::Neg(inner) => Ok(-inner.eval(ctx)?),
            Self::Binary(op, left, right) => {
                let lhs = left.eval(ctx)?;
                let rhs = right.eval(ctx)?;
                match op {
                    BinaryOp::Add => Ok(lhs + rhs),
                    BinaryOp::Sub => Ok(lhs - rhs),
                    BinaryOp::Mul => Ok(lhs * rhs),
                    BinaryOp::Div => {
                        if rhs == 0.0 {
                            Err(ExpressionError::DivisionByZero)
                        } else {
                            Ok(lhs / rhs)
                        }
                    }
                    BinaryOp::Pow => Ok(lhs.powf(rhs)),
                }
            }
            Self::Function(name, args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.eval(ctx)?);
                }
                apply_function(name, &values)
            }
        }
    }

    /// All variable names referenced by the expression, sorted and deduplicated.
    ///
    /// Model validation uses this to reject rates referencing undeclared names.
    pub fn variables(&self) -> Vec<String> {
        let mut vars = Vec::new();
        self.collect_variables(&mut vars);
        vars.sort();
        vars.dedup();
        vars
    }

    fn collect_variables(&self, vars: &mut Vec<String>) {
        match self {
            Self::Number(_) => {}
            Self::Variable(name) => vars.push(name.clone()),
            Self::Neg(inner) => inner.collect_variables(vars),
            Self::Binary(_, left, right) => {
                left.collect_variables(vars);
                right.collect_variables(vars);
            }
            Self::Function(_, args) => {
                for arg in args {
                    arg.collect_variables(vars);
                }
            }
        }
    }
}

impl fmt::Display for RateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Variable(name) => write!(f, "{}", name),
            Self::Neg(inner) => write!(f, "-({})", inner),
            Self::Binary(op, left, right) => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Self::Function(name, args) => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

// Parser functions using nom.
//
// Grammar (lowest to highest precedence):
//   expression := term (('+' | '-') term)*          left-associative
//   term       := power (('*' | '/') power)*        left-associative
//   power      := unary ('^' power)?                right-associative
//   unary      := '-' unary | primary
//   primary    := number | function '(' args ')' | variable | '(' expression ')'

fn ws(input: &str) -> IResult<&str, ()> {
    let (input, _) = multispace0::<&str, nom::error::Error<&str>>.parse(input)?;
    Ok((input, ()))
}

/// Parse an identifier (variable or function name)
fn identifier(input: &str) -> IResult<&str, String> {
    let mut parser = recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ));
    let (input, matched) = parser.parse(input)?;
    Ok((input, matched.to_string()))
}

/// Parse a comma-separated argument list (at least one expression)
fn args_list(input: &str) -> IResult<&str, Vec<RateExpr>> {
    let (mut input, first) = expression(input)?;
    let mut args = vec![first];

    loop {
        let (rest, _) = ws(input)?;
        match char::<&str, nom::error::Error<&str>>(',').parse(rest) {
            Ok((rest, _)) => {
                let (rest, arg) = expression(rest)?;
                args.push(arg);
                input = rest;
            }
            Err(_) => break,
        }
    }

    Ok((input, args))
}

/// Parse a function call: identifier '(' args? ')'
fn function_call(input: &str) -> IResult<&str, RateExpr> {
    let (input, name) = identifier(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char::<&str, nom::error::Error<&str>>('(').parse(input)?;
    let (input, _) = ws(input)?;

    if let Ok((input, _)) = char::<&str, nom::error::Error<&str>>(')').parse(input) {
        return Ok((input, RateExpr::Function(name, vec![])));
    }

    let (input, args) = args_list(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char::<&str, nom::error::Error<&str>>(')').parse(input)?;

    Ok((input, RateExpr::Function(name, args)))
}

/// Parse a parenthesized expression
fn parens(input: &str) -> IResult<&str, RateExpr> {
    let (input, _) = char::<&str, nom::error::Error<&str>>('(').parse(input)?;
    let (input, expr) = expression(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char::<&str, nom::error::Error<&str>>(')').parse(input)?;
    Ok((input, expr))
}

/// Parse a primary expression
fn primary(input: &str) -> IResult<&str, RateExpr> {
    if let Ok((rest, num)) = double::<&str, nom::error::Error<&str>>.parse(input) {
        return Ok((rest, RateExpr::Number(num)));
    }
    if let Ok(result) = function_call(input) {
        return Ok(result);
    }
    if let Ok((rest, name)) = identifier(input) {
        return Ok((rest, RateExpr::Variable(name)));
    }
    parens(input)
}

/// Parse a unary expression
fn unary(input: &str) -> IResult<&str, RateExpr> {
    let (input, _) = ws(input)?;
    match char::<&str, nom::error::Error<&str>>('-').parse(input) {
        Ok((rest, _)) => {
            let (rest, inner) = unary(rest)?;
            Ok((rest, RateExpr::Neg(Box::new(inner))))
        }
        Err(_) => primary(input),
    }
}

/// Parse a power expression; `^` associates to the right
fn power(input: &str) -> IResult<&str, RateExpr> {
    let (input, base) = unary(input)?;
    let (rest, _) = ws(input)?;
    match char::<&str, nom::error::Error<&str>>('^').parse(rest) {
        Ok((rest, _)) => {
            let (rest, exponent) = power(rest)?;
            Ok((
                rest,
                RateExpr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)),
            ))
        }
        Err(_) => Ok((input, base)),
    }
}

/// Parse a multiplicative chain; `*` and `/` associate to the left
fn term(input: &str) -> IResult<&str, RateExpr> {
    let (mut input, mut acc) = power(input)?;

    loop {
        let (rest, _) = ws(input)?;
        let op = match rest.chars().next() {
            Some('*') => BinaryOp::Mul,
            Some('/') => BinaryOp::Div,
            _ => break,
        };
        let (rest, rhs) = power(&rest[1..])?;
        acc = RateExpr::Binary(op, Box::new(acc), Box::new(rhs));
        input = rest;
    }

    Ok((input, acc))
}

/// Parse an additive chain; `+` and `-` associate to the left
fn expression(input: &str) -> IResult<&str, RateExpr> {
    let (mut input, mut acc) = term(input)?;

    loop {
        let (rest, _) = ws(input)?;
        let op = match rest.chars().next() {
            Some('+') => BinaryOp::Add,
            Some('-') => BinaryOp::Sub,
            _ => break,
        };
        let (rest, rhs) = term(&rest[1..])?;
        acc = RateExpr::Binary(op, Box::new(acc), Box::new(rhs));
        input = rest;
    }

    Ok((input, acc))
}
