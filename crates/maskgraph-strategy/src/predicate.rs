//! Boolean row predicates used to select rows, e.g.
//! `STATUS = 'CANCELLED' AND (AMOUNT < 10 OR NOTE IS NULL)`.
//!
//! The text is parsed as a PostgreSQL expression and lowered into the small
//! subset evaluated here: comparisons, `AND`/`OR`/`NOT`, `IS [NOT] NULL`,
//! `[NOT] IN`, `[NOT] BETWEEN` and `[NOT] LIKE` over columns and literals.
//!
//! Evaluation follows SQL three-valued logic: comparisons involving NULL are
//! UNKNOWN and a row only matches when the whole predicate is TRUE.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::ControlFlow;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use sqlparser::ast::{self, BinaryOperator, UnaryOperator, Value as SqlValue, visit_expressions};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::Token;
use thiserror::Error;

use maskgraph_core::{Row, Value};
use maskgraph_introspect::{like_matches, like_regex};

/// Deepest boolean nesting accepted after parsing. Long `OR` chains parse
/// into left-deep trees, so this bounds evaluation depth too.
pub const MAX_PREDICATE_DEPTH: usize = 128;

/// Errors raised while compiling or evaluating a predicate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredicateError {
    #[error("syntax error: {0}")]
    Syntax(#[from] ParserError),
    #[error("unsupported expression: {0}")]
    Unsupported(String),
    #[error("predicate nests deeper than {0} levels")]
    TooDeep(usize),
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("cannot compare {left} with {right}")]
    TypeMismatch {
        left: &'static str,
        right: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    fn from_sqlparser(op: &BinaryOperator) -> Option<Self> {
        Some(match op {
            BinaryOperator::Eq => CompareOp::Eq,
            BinaryOperator::NotEq => CompareOp::NotEq,
            BinaryOperator::Lt => CompareOp::Lt,
            BinaryOperator::LtEq => CompareOp::LtEq,
            BinaryOperator::Gt => CompareOp::Gt,
            BinaryOperator::GtEq => CompareOp::GtEq,
            _ => return None,
        })
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Column(String),
    Literal(Value),
}

#[derive(Debug, Clone)]
enum Condition {
    Or(Box<Condition>, Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    Compare(Operand, CompareOp, Operand),
    IsNull {
        operand: Operand,
        negated: bool,
    },
    InList {
        operand: Operand,
        list: Vec<Operand>,
        negated: bool,
    },
    Between {
        operand: Operand,
        low: Operand,
        high: Operand,
        negated: bool,
    },
    Like {
        operand: Operand,
        pattern: Operand,
        /// Set when the pattern is a literal.
        compiled: Option<Regex>,
        negated: bool,
    },
    Bare(Operand),
}

fn unsupported(expr: &ast::Expr) -> PredicateError {
    PredicateError::Unsupported(expr.to_string())
}

fn lower(expr: &ast::Expr, depth: usize) -> Result<Condition, PredicateError> {
    if depth > MAX_PREDICATE_DEPTH {
        return Err(PredicateError::TooDeep(MAX_PREDICATE_DEPTH));
    }
    let next = depth + 1;

    Ok(match expr {
        ast::Expr::Nested(inner) => lower(inner, next)?,
        ast::Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr: inner,
        } => Condition::Not(Box::new(lower(inner, next)?)),
        ast::Expr::BinaryOp { left, op, right } => match op {
            BinaryOperator::And => {
                Condition::And(Box::new(lower(left, next)?), Box::new(lower(right, next)?))
            }
            BinaryOperator::Or => {
                Condition::Or(Box::new(lower(left, next)?), Box::new(lower(right, next)?))
            }
            other => {
                let op = CompareOp::from_sqlparser(other).ok_or_else(|| unsupported(expr))?;
                Condition::Compare(lower_operand(left)?, op, lower_operand(right)?)
            }
        },
        ast::Expr::IsNull(inner) => Condition::IsNull {
            operand: lower_operand(inner)?,
            negated: false,
        },
        ast::Expr::IsNotNull(inner) => Condition::IsNull {
            operand: lower_operand(inner)?,
            negated: true,
        },
        ast::Expr::InList {
            expr: inner,
            list,
            negated,
        } => Condition::InList {
            operand: lower_operand(inner)?,
            list: list.iter().map(lower_operand).collect::<Result<_, _>>()?,
            negated: *negated,
        },
        ast::Expr::Between {
            expr: inner,
            negated,
            low,
            high,
        } => Condition::Between {
            operand: lower_operand(inner)?,
            low: lower_operand(low)?,
            high: lower_operand(high)?,
            negated: *negated,
        },
        ast::Expr::Like {
            negated,
            expr: inner,
            pattern,
            escape_char,
            ..
        } => {
            if escape_char.is_some() {
                return Err(unsupported(expr));
            }
            let pattern = lower_operand(pattern)?;
            let compiled = match &pattern {
                Operand::Literal(Value::Text(text)) => Some(like_regex(text).map_err(|err| {
                    PredicateError::Unsupported(format!("LIKE pattern {text}: {err}"))
                })?),
                _ => None,
            };
            Condition::Like {
                operand: lower_operand(inner)?,
                pattern,
                compiled,
                negated: *negated,
            }
        }
        ast::Expr::Identifier(_) | ast::Expr::CompoundIdentifier(_) | ast::Expr::Value(_) => {
            Condition::Bare(lower_operand(expr)?)
        }
        other => return Err(unsupported(other)),
    })
}

fn lower_operand(expr: &ast::Expr) -> Result<Operand, PredicateError> {
    match expr {
        ast::Expr::Identifier(ident) => Ok(Operand::Column(ident.value.clone())),
        ast::Expr::CompoundIdentifier(idents) => idents
            .last()
            .map(|ident| Operand::Column(ident.value.clone()))
            .ok_or_else(|| unsupported(expr)),
        ast::Expr::Value(value) => literal(&value.value).map(Operand::Literal),
        ast::Expr::Nested(inner) => lower_operand(inner),
        ast::Expr::UnaryOp {
            op: UnaryOperator::Plus,
            expr: inner,
        } => match lower_operand(inner)? {
            number @ Operand::Literal(Value::Int(_) | Value::Float(_)) => Ok(number),
            _ => Err(unsupported(expr)),
        },
        ast::Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr: inner,
        } => match lower_operand(inner)? {
            Operand::Literal(Value::Int(value)) => value
                .checked_neg()
                .map(|value| Operand::Literal(Value::Int(value)))
                .ok_or_else(|| unsupported(expr)),
            Operand::Literal(Value::Float(value)) => Ok(Operand::Literal(Value::Float(-value))),
            _ => Err(unsupported(expr)),
        },
        other => Err(unsupported(other)),
    }
}

fn literal(value: &SqlValue) -> Result<Value, PredicateError> {
    match value {
        SqlValue::Number(text, _long) => {
            if let Ok(value) = text.parse::<i64>() {
                return Ok(Value::Int(value));
            }
            text.parse::<f64>()
                .map(Value::Float)
                .map_err(|_| PredicateError::Unsupported(format!("number {text}")))
        }
        SqlValue::SingleQuotedString(text) => Ok(Value::Text(text.clone())),
        SqlValue::Boolean(value) => Ok(Value::Bool(*value)),
        SqlValue::Null => Ok(Value::Null),
        other => Err(PredicateError::Unsupported(other.to_string())),
    }
}

/// Column names referenced anywhere in `expr`.
fn referenced_columns(expr: &ast::Expr) -> BTreeSet<String> {
    let mut columns = BTreeSet::new();
    let _ = visit_expressions(expr, |expr| {
        match expr {
            ast::Expr::Identifier(ident) => {
                columns.insert(ident.value.clone());
            }
            ast::Expr::CompoundIdentifier(idents) => {
                if let Some(ident) = idents.last() {
                    columns.insert(ident.value.clone());
                }
            }
            _ => {}
        }
        ControlFlow::<()>::Continue(())
    });
    columns
}

/// A compiled row predicate.
#[derive(Debug, Clone)]
pub struct RowPredicate {
    source: String,
    condition: Condition,
    columns: BTreeSet<String>,
}

impl RowPredicate {
    pub fn parse(source: &str) -> Result<Self, PredicateError> {
        let dialect = PostgreSqlDialect {};
        let mut parser = Parser::new(&dialect).try_with_sql(source)?;
        let expr = parser.parse_expr()?;
        parser.expect_token(&Token::EOF)?;

        let condition = lower(&expr, 0)?;
        Ok(Self {
            source: source.to_string(),
            condition,
            columns: referenced_columns(&expr),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Column names referenced anywhere in the predicate.
    pub fn columns(&self) -> BTreeSet<&str> {
        self.columns.iter().map(String::as_str).collect()
    }

    /// Three-valued result: `None` is UNKNOWN.
    pub fn evaluate(&self, row: &Row) -> Result<Option<bool>, PredicateError> {
        eval(&self.condition, row)
    }

    /// True only when the predicate evaluates to TRUE for `row`.
    pub fn matches(&self, row: &Row) -> Result<bool, PredicateError> {
        Ok(self.evaluate(row)? == Some(true))
    }
}

impl FromStr for RowPredicate {
    type Err = PredicateError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Self::parse(source)
    }
}

impl fmt::Display for RowPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn resolve<'a>(operand: &'a Operand, row: &'a Row) -> Result<&'a Value, PredicateError> {
    match operand {
        Operand::Literal(value) => Ok(value),
        Operand::Column(name) => row
            .get(name)
            .ok_or_else(|| PredicateError::UnknownColumn(name.clone())),
    }
}

fn and3(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn or3(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

fn negate_if(value: Option<bool>, negated: bool) -> Option<bool> {
    if negated { value.map(|v| !v) } else { value }
}

fn eval(condition: &Condition, row: &Row) -> Result<Option<bool>, PredicateError> {
    Ok(match condition {
        Condition::Or(left, right) => or3(eval(left, row)?, eval(right, row)?),
        Condition::And(left, right) => and3(eval(left, row)?, eval(right, row)?),
        Condition::Not(inner) => eval(inner, row)?.map(|value| !value),
        Condition::Compare(left, op, right) => {
            compare(resolve(left, row)?, resolve(right, row)?)?.map(|ord| op.holds(ord))
        }
        Condition::IsNull { operand, negated } => {
            Some(resolve(operand, row)?.is_null() != *negated)
        }
        Condition::InList {
            operand,
            list,
            negated,
        } => {
            let value = resolve(operand, row)?;
            let mut result = Some(false);
            for candidate in list {
                let equal = compare(value, resolve(candidate, row)?)?
                    .map(|ord| ord == Ordering::Equal);
                result = or3(result, equal);
                if result == Some(true) {
                    break;
                }
            }
            negate_if(result, *negated)
        }
        Condition::Between {
            operand,
            low,
            high,
            negated,
        } => {
            let value = resolve(operand, row)?;
            let above = compare(value, resolve(low, row)?)?.map(|ord| ord != Ordering::Less);
            let below = compare(value, resolve(high, row)?)?.map(|ord| ord != Ordering::Greater);
            negate_if(and3(above, below), *negated)
        }
        Condition::Like {
            operand,
            pattern,
            compiled,
            negated,
        } => {
            let value = resolve(operand, row)?;
            let result = match (value, resolve(pattern, row)?) {
                (Value::Null, _) | (_, Value::Null) => None,
                (Value::Text(text), Value::Text(pattern)) => Some(match compiled {
                    Some(regex) => regex.is_match(text),
                    None => like_matches(pattern, text),
                }),
                (left, right) => {
                    return Err(PredicateError::TypeMismatch {
                        left: left.type_name(),
                        right: right.type_name(),
                    });
                }
            };
            negate_if(result, *negated)
        }
        Condition::Bare(operand) => match resolve(operand, row)? {
            Value::Null => None,
            Value::Bool(value) => Some(*value),
            other => {
                return Err(PredicateError::TypeMismatch {
                    left: other.type_name(),
                    right: "bool",
                });
            }
        },
    })
}

/// SQL comparison; `None` when either side is NULL.
fn compare(left: &Value, right: &Value) -> Result<Option<Ordering>, PredicateError> {
    let mismatch = || PredicateError::TypeMismatch {
        left: left.type_name(),
        right: right.type_name(),
    };

    let ordering = match (left, right) {
        (Value::Null, _) | (_, Value::Null) => return Ok(None),
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
                return Err(mismatch());
            };
            match a.partial_cmp(&b) {
                Some(ordering) => ordering,
                None => return Ok(None),
            }
        }
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Date(a), Value::Date(b)) => a.cmp(b),
        (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
        (Value::Date(a), Value::Timestamp(b)) => a.and_hms_opt(0, 0, 0).ok_or_else(mismatch)?.cmp(b),
        (Value::Timestamp(a), Value::Date(b)) => a.cmp(&b.and_hms_opt(0, 0, 0).ok_or_else(mismatch)?),
        (Value::Uuid(a), Value::Uuid(b)) => a.cmp(b),
        // Text literals stand in for typed constants, e.g. DUE < '2024-01-31'.
        (Value::Text(text), typed) => {
            return compare(&coerce_text(text, typed).ok_or_else(mismatch)?, typed);
        }
        (typed, Value::Text(text)) => {
            return compare(typed, &coerce_text(text, typed).ok_or_else(mismatch)?);
        }
        _ => return Err(mismatch()),
    };
    Ok(Some(ordering))
}

fn coerce_text(text: &str, target: &Value) -> Option<Value> {
    let text = text.trim();
    match target {
        Value::Int(_) => text.parse().ok().map(Value::Int),
        Value::Float(_) => text.parse().ok().map(Value::Float),
        Value::Bool(_) => match text.to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Some(Value::Bool(true)),
            "false" | "f" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        Value::Date(_) => NaiveDate::parse_from_str(text, "%Y-%m-%d").ok().map(Value::Date),
        Value::Timestamp(_) => ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
            .map(Value::Timestamp)
            .or_else(|| {
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .map(Value::Timestamp)
            }),
        Value::Uuid(_) => uuid::Uuid::parse_str(text).ok().map(Value::Uuid),
        _ => None,
    }
}
