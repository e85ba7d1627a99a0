//! Logical functions

use hadoopoffice_core::CellError;

use super::arg;
use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};

fn truth(v: &FormulaValue) -> Result<bool, CellError> {
    match v {
        FormulaValue::Error(e) => Err(*e),
        other => other.as_bool().ok_or(CellError::Value),
    }
}

/// IF(condition, value_if_true, [value_if_false])
pub fn fn_if(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match truth(arg(args, 0)) {
        Ok(true) => arg(args, 1).clone(),
        Ok(false) => args.get(2).cloned().unwrap_or(FormulaValue::Boolean(false)),
        Err(e) => FormulaValue::Error(e),
    })
}

fn fold_logical(args: &[FormulaValue], init: bool, f: fn(bool, bool) -> bool) -> FormulaValue {
    let mut acc = init;
    let mut seen = false;
    for value in args.iter().flat_map(|a| a.flatten()) {
        match value {
            FormulaValue::Error(e) => return FormulaValue::Error(*e),
            FormulaValue::Empty | FormulaValue::String(_) => {}
            other => {
                if let Some(b) = other.as_bool() {
                    acc = f(acc, b);
                    seen = true;
                }
            }
        }
    }
    if seen {
        FormulaValue::Boolean(acc)
    } else {
        FormulaValue::Error(CellError::Value)
    }
}

/// AND(logical1, ...)
pub fn fn_and(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(fold_logical(args, true, |a, b| a && b))
}

/// OR(logical1, ...)
pub fn fn_or(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(fold_logical(args, false, |a, b| a || b))
}

/// NOT(logical)
pub fn fn_not(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match truth(arg(args, 0)) {
        Ok(b) => FormulaValue::Boolean(!b),
        Err(e) => FormulaValue::Error(e),
    })
}

/// IFERROR(value, value_if_error)
pub fn fn_iferror(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match arg(args, 0) {
        FormulaValue::Error(_) => arg(args, 1).clone(),
        other => other.clone(),
    })
}

/// TRUE()
pub fn fn_true(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(true))
}

/// FALSE()
pub fn fn_false(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Evaluator;
    use hadoopoffice_core::Workbook;

    fn eval(formula: &str) -> FormulaValue {
        let wb = Workbook::new();
        Evaluator::new(&wb).evaluate_formula(formula, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_if() {
        assert_eq!(eval("IF(1>0,\"yes\",\"no\")"), FormulaValue::String("yes".into()));
        assert_eq!(eval("IF(FALSE,1)"), FormulaValue::Boolean(false));
        assert_eq!(eval("IF(\"x\",1,2)"), FormulaValue::Error(CellError::Value));
    }

    #[test]
    fn test_and_or_not() {
        assert_eq!(eval("AND(TRUE,1)"), FormulaValue::Boolean(true));
        assert_eq!(eval("AND(TRUE,0)"), FormulaValue::Boolean(false));
        assert_eq!(eval("OR(FALSE,{0,1})"), FormulaValue::Boolean(true));
        assert_eq!(eval("NOT(TRUE())"), FormulaValue::Boolean(false));
    }

    #[test]
    fn test_iferror() {
        assert_eq!(eval("IFERROR(1/0,\"div\")"), FormulaValue::String("div".into()));
        assert_eq!(eval("IFERROR(4,0)"), FormulaValue::Number(4.0));
    }
}
