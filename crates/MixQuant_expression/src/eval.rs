// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! The AST interpreter.
//!
//! Evaluation runs under an immutable [`EvalContext`] carrying the raw
//! column map, the observation dates, the current cross-section and its
//! specification, and the active permutation binding. Cross-section
//! markers substitute into identifier templates; an expression referencing
//! a dimension the current section is not mapped into evaluates to a zero
//! series.

use time::Date;

use crate::ast::{BinaryOp, Builtin, Expr, Segment, UnaryOp};
use crate::permutations::PermutationBinding;
use MixQuant_data::{parse_wire_date, CrossSectionSpec, RawPanel, CONSTANT};
use MixQuant_error::MixQuantError;
use MixQuant_transforms as transforms;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Evaluation context for one (expression, cross-section, permutation)
/// combination.
#[derive(Clone, Copy, Debug)]
pub struct EvalContext<'a> {
    /// The raw dataset.
    pub panel: &'a RawPanel,

    /// The cross-section the expression is evaluated for.
    pub section: &'a str,

    /// The cross-section specification (dimension lookups).
    pub spec: &'a CrossSectionSpec,

    /// The active permutation binding.
    pub binding: &'a PermutationBinding,
}

/// Intermediate evaluation value.
#[derive(Clone, Debug)]
enum Value {
    Scalar(f64),
    Series(Vec<f64>),
    Text(String),
    Dates(Vec<Date>),
}

/// Evaluation aborts: a hard error, or the whole-expression zero produced
/// by an unmapped dimension marker.
enum Abort {
    Gated,
    Failed(MixQuantError),
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS, FUNCTIONS, AND MACROS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

impl From<MixQuantError> for Abort {
    fn from(error: MixQuantError) -> Self {
        Self::Failed(error)
    }
}

fn expression_error(message: impl Into<String>) -> Abort {
    Abort::Failed(MixQuantError::ExpressionError(message.into()))
}

/// Evaluates an expression to a full-length series for one cross-section.
///
/// # Errors
/// - `MixQuantError::ExpressionError` on unknown identifiers, bad
///   arguments, malformed date literals, an expression that reduces to a
///   string rather than data, or expression-level arithmetic (`log`,
///   `exp`, `sqrt`, division) that produces a non-finite value which is
///   not an explicit zero. Non-finite values that originate inside the
///   transform primitives are left for the caller to classify as
///   transform failures.
pub fn evaluate_series(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Vec<f64>, MixQuantError> {
    let n = ctx.panel.n_rows();

    match evaluate(expr, ctx) {
        Ok(value) => value_to_series(value, n),
        Err(Abort::Gated) => Ok(vec![0.0; n]),
        Err(Abort::Failed(error)) => Err(error),
    }
}

fn value_to_series(value: Value, n: usize) -> Result<Vec<f64>, MixQuantError> {
    match value {
        Value::Series(series) => {
            if series.len() == n {
                Ok(series)
            } else {
                Err(MixQuantError::ExpressionError(format!(
                    "series length {} does not match dataset length {n}",
                    series.len()
                )))
            }
        }
        Value::Scalar(v) => Ok(vec![v; n]),
        Value::Text(text) => Err(MixQuantError::ExpressionError(format!(
            "expression reduces to the string '{text}', not data"
        ))),
        Value::Dates(_) => Err(MixQuantError::ExpressionError(
            "expression reduces to the observation column, not data".to_string(),
        )),
    }
}

fn evaluate(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value, Abort> {
    match expr {
        Expr::Number(v) => Ok(Value::Scalar(*v)),
        Expr::Str(text) => Ok(Value::Text(text.clone())),
        Expr::Slot(slot) => match ctx.binding.value(*slot) {
            Some(v) => Ok(Value::Scalar(v)),
            None => Err(expression_error(format!("unbound permutation slot ¬{slot}"))),
        },
        Expr::Template(segments) => evaluate_template(segments, ctx),
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, ctx)?;
            apply_unary(*op, value)
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = evaluate(lhs, ctx)?;
            let rhs = evaluate(rhs, ctx)?;
            apply_binary(*op, lhs, rhs)
        }
        Expr::Call { function, args } => evaluate_call(*function, args, ctx),
    }
}

fn evaluate_template(segments: &[Segment], ctx: &EvalContext<'_>) -> Result<Value, Abort> {
    // A bare marker is the substituted string itself, for indicator
    // comparisons like (.region. == 'ang').
    if let [Segment::Marker(dimension)] = segments {
        return Ok(Value::Text(substitute_marker(dimension, ctx)?));
    }

    let mut name = String::new();
    for segment in segments {
        match segment {
            Segment::Text(text) => name.push_str(text),
            Segment::Marker(dimension) => name.push_str(&substitute_marker(dimension, ctx)?),
        }
    }

    if name == "obs" {
        return Ok(Value::Dates(ctx.panel.obs.clone()));
    }
    if name == CONSTANT {
        return Ok(Value::Series(vec![1.0; ctx.panel.n_rows()]));
    }

    match ctx.panel.column(&name) {
        Some(series) => Ok(Value::Series(series.to_vec())),
        None => Err(expression_error(format!("unknown identifier '{name}'"))),
    }
}

fn substitute_marker(dimension: &str, ctx: &EvalContext<'_>) -> Result<String, Abort> {
    if dimension == "crosssection" {
        return Ok(ctx.section.to_string());
    }

    if !ctx.spec.has_dimension(dimension) {
        return Err(expression_error(format!(
            "unknown grouping dimension '{dimension}'"
        )));
    }

    match ctx.spec.dimension_value(dimension, ctx.section) {
        Some(value) => Ok(value.to_string()),
        // Sections outside the dimension resolve the expression to zero.
        None => Err(Abort::Gated),
    }
}

fn apply_unary(op: UnaryOp, value: Value) -> Result<Value, Abort> {
    match op {
        UnaryOp::Neg => match value {
            Value::Scalar(v) => Ok(Value::Scalar(-v)),
            Value::Series(series) => Ok(Value::Series(series.iter().map(|v| -v).collect())),
            Value::Text(_) | Value::Dates(_) => {
                Err(expression_error("cannot negate a non-numeric value"))
            }
        },
    }
}

fn apply_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, Abort> {
    use BinaryOp::*;

    match op {
        Add | Sub | Mul | Pow => {
            let f = |a: f64, b: f64| match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Pow => a.powf(b),
                _ => unreachable!(),
            };
            broadcast_numeric(lhs, rhs, f)
        }
        Div => {
            let quotient = broadcast_numeric(lhs, rhs, |a, b| a / b)?;
            finite_value("division", quotient)
        }
        Ge | Le | Gt | Lt | Eq | Ne => apply_comparison(op, lhs, rhs),
        And | Or => {
            let f = |a: f64, b: f64| {
                let (a, b) = (a != 0.0, b != 0.0);
                let out = if matches!(op, And) { a && b } else { a || b };
                f64::from(out)
            };
            broadcast_numeric(lhs, rhs, f)
        }
    }
}

/// Rejects non-finite results of expression-level arithmetic. Non-finite
/// values arising inside the transform primitives are classified by the
/// caller instead.
fn finite_value(what: &str, value: Value) -> Result<Value, Abort> {
    let bad = match &value {
        Value::Scalar(v) if !v.is_finite() => Some(*v),
        Value::Series(series) => series.iter().find(|v| !v.is_finite()).copied(),
        _ => None,
    };

    match bad {
        Some(bad) => Err(expression_error(format!(
            "{what} produced non-finite value {bad}"
        ))),
        None => Ok(value),
    }
}

/// Like [`finite_value`], for the plain-math call results.
fn finite_series(function: Builtin, series: Vec<f64>) -> Result<Vec<f64>, Abort> {
    match series.iter().find(|v| !v.is_finite()) {
        Some(bad) => Err(expression_error(format!(
            "'{}' produced non-finite value {bad}",
            function.name()
        ))),
        None => Ok(series),
    }
}

fn apply_comparison(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, Abort> {
    match (&lhs, &rhs) {
        // Indicator dummies from substituted dimension values.
        (Value::Text(a), Value::Text(b)) => {
            let equal = a == b;
            match op {
                BinaryOp::Eq => Ok(Value::Scalar(f64::from(equal))),
                BinaryOp::Ne => Ok(Value::Scalar(f64::from(!equal))),
                _ => Err(expression_error(
                    "strings only support '==' and '!=' comparisons",
                )),
            }
        }
        // Date-window indicators against the observation column.
        (Value::Dates(dates), Value::Text(literal)) => {
            let pivot = parse_wire_date(literal)
                .map_err(|_| expression_error(format!("malformed date literal '{literal}'")))?;
            Ok(Value::Series(date_indicator(op, dates, pivot)?))
        }
        (Value::Text(literal), Value::Dates(dates)) => {
            let pivot = parse_wire_date(literal)
                .map_err(|_| expression_error(format!("malformed date literal '{literal}'")))?;
            let flipped = flip_comparison(op);
            Ok(Value::Series(date_indicator(flipped, dates, pivot)?))
        }
        _ => {
            let f = |a: f64, b: f64| {
                let out = match op {
                    BinaryOp::Ge => a >= b,
                    BinaryOp::Le => a <= b,
                    BinaryOp::Gt => a > b,
                    BinaryOp::Lt => a < b,
                    BinaryOp::Eq => a == b,
                    BinaryOp::Ne => a != b,
                    _ => unreachable!(),
                };
                f64::from(out)
            };
            broadcast_numeric(lhs, rhs, f)
        }
    }
}

fn flip_comparison(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::Ge => BinaryOp::Le,
        BinaryOp::Le => BinaryOp::Ge,
        BinaryOp::Gt => BinaryOp::Lt,
        BinaryOp::Lt => BinaryOp::Gt,
        other => other,
    }
}

fn date_indicator(op: BinaryOp, dates: &[Date], pivot: Date) -> Result<Vec<f64>, Abort> {
    let test = |d: &Date| match op {
        BinaryOp::Ge => *d >= pivot,
        BinaryOp::Le => *d <= pivot,
        BinaryOp::Gt => *d > pivot,
        BinaryOp::Lt => *d < pivot,
        BinaryOp::Eq => *d == pivot,
        BinaryOp::Ne => *d != pivot,
        _ => false,
    };
    Ok(dates.iter().map(|d| f64::from(test(d))).collect())
}

fn broadcast_numeric<F>(lhs: Value, rhs: Value, f: F) -> Result<Value, Abort>
where
    F: Fn(f64, f64) -> f64,
{
    match (lhs, rhs) {
        (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(f(a, b))),
        (Value::Series(a), Value::Scalar(b)) => {
            Ok(Value::Series(a.iter().map(|a| f(*a, b)).collect()))
        }
        (Value::Scalar(a), Value::Series(b)) => {
            Ok(Value::Series(b.iter().map(|b| f(a, *b)).collect()))
        }
        (Value::Series(a), Value::Series(b)) => {
            if a.len() != b.len() {
                return Err(expression_error(format!(
                    "series lengths {} and {} do not align",
                    a.len(),
                    b.len()
                )));
            }
            Ok(Value::Series(
                a.iter().zip(b.iter()).map(|(a, b)| f(*a, *b)).collect(),
            ))
        }
        _ => Err(expression_error(
            "operands must be numeric series or scalars",
        )),
    }
}

fn evaluate_call(
    function: Builtin,
    args: &[Expr],
    ctx: &EvalContext<'_>,
) -> Result<Value, Abort> {
    let series = match evaluate(&args[0], ctx)? {
        Value::Series(series) => series,
        Value::Scalar(v) => vec![v; ctx.panel.n_rows()],
        _ => {
            return Err(expression_error(format!(
                "'{}' expects a data series as its first argument",
                function.name()
            )))
        }
    };

    let scalar_arg = |index: usize| -> Result<f64, Abort> {
        match evaluate(&args[index], ctx)? {
            Value::Scalar(v) => Ok(v),
            _ => Err(expression_error(format!(
                "'{}' expects a numeric argument at position {}",
                function.name(),
                index + 1
            ))),
        }
    };

    let shift_arg = |index: usize| -> Result<usize, Abort> {
        let v = scalar_arg(index)?;
        if v < 0.0 || v.fract() != 0.0 {
            return Err(expression_error(format!(
                "'{}' expects a non-negative integer shift, got {v}",
                function.name()
            )));
        }
        Ok(v as usize)
    };

    let rate_arg = |index: usize| -> Result<f64, Abort> {
        let v = scalar_arg(index)?;
        if !(0.0..1.0).contains(&v) {
            return Err(expression_error(format!(
                "'{}' expects a rate in [0, 1), got {v}",
                function.name()
            )));
        }
        Ok(v)
    };

    // Optional trailing pct flag: non-zero (default) converts the
    // saturation parameter from a percentage.
    let pct_arg = |index: usize| -> Result<bool, Abort> {
        if args.len() > index {
            Ok(scalar_arg(index)? != 0.0)
        } else {
            Ok(true)
        }
    };

    let out = match function {
        Builtin::Log => finite_series(function, series.iter().map(|x| x.ln()).collect())?,
        Builtin::Exp => finite_series(function, series.iter().map(|x| x.exp()).collect())?,
        Builtin::Sqrt => finite_series(function, series.iter().map(|x| x.sqrt()).collect())?,
        Builtin::Abs => series.iter().map(|x| x.abs()).collect(),
        Builtin::Sin => series.iter().map(|x| x.sin()).collect(),
        Builtin::Cos => series.iter().map(|x| x.cos()).collect(),
        Builtin::Tan => series.iter().map(|x| x.tan()).collect(),
        Builtin::Lag => transforms::lag(&series, shift_arg(1)?),
        Builtin::Lead => transforms::lead(&series, shift_arg(1)?),
        Builtin::Adstock => transforms::adstock(&series, rate_arg(1)?),
        Builtin::NAdstock => transforms::normalized_adstock(&series, rate_arg(1)?)?,
        Builtin::Dimret => {
            let pct = pct_arg(2)?;
            let info = if pct { rate_arg(1)? } else { scalar_arg(1)? };
            transforms::dimret(&series, info, pct)
        }
        Builtin::NDimret => {
            let pct = pct_arg(2)?;
            let info = if pct { rate_arg(1)? } else { scalar_arg(1)? };
            transforms::normalized_dimret(&series, info, pct)?
        }
        Builtin::DimretAdstock => {
            let rate = rate_arg(1)?;
            let pct = pct_arg(3)?;
            let info = if pct { rate_arg(2)? } else { scalar_arg(2)? };
            transforms::dimret_adstock(&series, rate, info, pct)
        }
        Builtin::NDimretAdstock => {
            let rate = rate_arg(1)?;
            let pct = pct_arg(3)?;
            let info = if pct { rate_arg(2)? } else { scalar_arg(2)? };
            transforms::normalized_dimret_adstock(&series, rate, info, pct)?
        }
    };

    Ok(Value::Series(out))
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
