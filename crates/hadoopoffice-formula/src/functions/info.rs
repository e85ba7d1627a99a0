//! Information functions

use hadoopoffice_core::CellError;

use super::arg;
use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};

fn test_value(args: &[FormulaValue], f: fn(&FormulaValue) -> bool) -> FormulaValue {
    match arg(args, 0) {
        FormulaValue::Array(_) => FormulaValue::Error(CellError::Value),
        v => FormulaValue::Boolean(f(v)),
    }
}

/// ISBLANK(value)
pub fn fn_isblank(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(test_value(args, |v| matches!(v, FormulaValue::Empty)))
}

/// ISNUMBER(value)
pub fn fn_isnumber(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(test_value(args, |v| matches!(v, FormulaValue::Number(_))))
}

/// ISTEXT(value)
pub fn fn_istext(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(test_value(args, |v| matches!(v, FormulaValue::String(_))))
}

/// ISERROR(value)
pub fn fn_iserror(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(test_value(args, |v| matches!(v, FormulaValue::Error(_))))
}

/// NA()
pub fn fn_na(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Error(CellError::Na))
}

/// ROW([reference]) for the current cell
pub fn fn_row(_args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Number(ctx.current_row as f64 + 1.0))
}

/// COLUMN([reference]) for the current cell
pub fn fn_column(_args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Number(ctx.current_col as f64 + 1.0))
}
