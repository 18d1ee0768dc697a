//! Boolean expression trees evaluated against materialized records.
//!
//! Scans push a predicate tree down to the page level; `eval_expr` walks it
//! against one record at a time. Comparisons require both operands to share
//! a type, and the boolean connectives require boolean operands.

use std::cmp::Ordering;

use crate::access::record::Record;
use crate::error::{EngineError, EngineResult};
use crate::storage::schema::{DataType, Schema};

/// A typed constant or attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    Bool(bool),
    Str(String),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Int,
            Value::Float(_) => DataType::Float,
            Value::Bool(_) => DataType::Bool,
            Value::Str(_) => DataType::String,
        }
    }
}

/// Comparison operators usable inside a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Lt,
    Gt,
}

/// An expression tree pushed down into a table scan.
#[derive(Debug, Clone)]
pub enum Expr {
    Const(Value),
    /// Reference to attribute `k` of the scanned record.
    Attr(usize),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn attr(k: usize) -> Expr {
        Expr::Attr(k)
    }

    pub fn val(v: Value) -> Expr {
        Expr::Const(v)
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
        Expr::Cmp(CmpOp::Eq, Box::new(lhs), Box::new(rhs))
    }

    pub fn lt(lhs: Expr, rhs: Expr) -> Expr {
        Expr::Cmp(CmpOp::Lt, Box::new(lhs), Box::new(rhs))
    }

    pub fn gt(lhs: Expr, rhs: Expr) -> Expr {
        Expr::Cmp(CmpOp::Gt, Box::new(lhs), Box::new(rhs))
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Expr {
        Expr::And(Box::new(lhs), Box::new(rhs))
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Expr {
        Expr::Or(Box::new(lhs), Box::new(rhs))
    }

    pub fn not(inner: Expr) -> Expr {
        Expr::Not(Box::new(inner))
    }
}

/// Evaluate `expr` against `record`, yielding an owned value.
pub fn eval_expr(record: &Record, schema: &Schema, expr: &Expr) -> EngineResult<Value> {
    match expr {
        Expr::Const(v) => Ok(v.clone()),
        Expr::Attr(k) => record.get_attr(schema, *k),
        Expr::Cmp(op, lhs, rhs) => {
            let l = eval_expr(record, schema, lhs)?;
            let r = eval_expr(record, schema, rhs)?;
            compare(*op, &l, &r)
        }
        Expr::And(lhs, rhs) => Ok(Value::Bool(
            truth(record, schema, lhs)? && truth(record, schema, rhs)?,
        )),
        Expr::Or(lhs, rhs) => Ok(Value::Bool(
            truth(record, schema, lhs)? || truth(record, schema, rhs)?,
        )),
        Expr::Not(inner) => Ok(Value::Bool(!truth(record, schema, inner)?)),
    }
}

fn truth(record: &Record, schema: &Schema, expr: &Expr) -> EngineResult<bool> {
    match eval_expr(record, schema, expr)? {
        Value::Bool(b) => Ok(b),
        other => Err(EngineError::AttributeTypeMismatch {
            expected: DataType::Bool,
            found: other.data_type(),
        }),
    }
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> EngineResult<Value> {
    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
        _ => {
            return Err(EngineError::AttributeTypeMismatch {
                expected: lhs.data_type(),
                found: rhs.data_type(),
            })
        }
    };
    let outcome = matches!(
        (op, ordering),
        (CmpOp::Eq, Some(Ordering::Equal))
            | (CmpOp::Lt, Some(Ordering::Less))
            | (CmpOp::Gt, Some(Ordering::Greater))
    );
    Ok(Value::Bool(outcome))
}
