//! Text functions

use hadoopoffice_core::CellError;

use super::{arg, number_arg};
use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};

fn text_arg(args: &[FormulaValue], idx: usize) -> Result<String, CellError> {
    match arg(args, idx) {
        FormulaValue::Error(e) => Err(*e),
        FormulaValue::Array(_) => Err(CellError::Value),
        v => Ok(v.as_string()),
    }
}

fn count_arg(args: &[FormulaValue], idx: usize, default: usize) -> Result<usize, CellError> {
    if args.len() <= idx {
        return Ok(default);
    }
    let n = number_arg(args, idx)?;
    if n < 0.0 {
        return Err(CellError::Value);
    }
    Ok(n.trunc() as usize)
}

fn text_result(result: Result<String, CellError>) -> FormulaResult<FormulaValue> {
    Ok(match result {
        Ok(s) => FormulaValue::String(s),
        Err(e) => FormulaValue::Error(e),
    })
}

/// CONCATENATE(text1, ...)
pub fn fn_concatenate(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut out = String::new();
    for idx in 0..args.len() {
        match text_arg(args, idx) {
            Ok(s) => out.push_str(&s),
            Err(e) => return Ok(FormulaValue::Error(e)),
        }
    }
    Ok(FormulaValue::String(out))
}

/// LEN(text)
pub fn fn_len(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match text_arg(args, 0) {
        Ok(s) => FormulaValue::Number(s.chars().count() as f64),
        Err(e) => FormulaValue::Error(e),
    })
}

fn left(args: &[FormulaValue]) -> Result<String, CellError> {
    let s = text_arg(args, 0)?;
    let n = count_arg(args, 1, 1)?;
    Ok(s.chars().take(n).collect())
}

fn right(args: &[FormulaValue]) -> Result<String, CellError> {
    let s = text_arg(args, 0)?;
    let n = count_arg(args, 1, 1)?;
    let len = s.chars().count();
    Ok(s.chars().skip(len.saturating_sub(n)).collect())
}

fn mid(args: &[FormulaValue]) -> Result<String, CellError> {
    let s = text_arg(args, 0)?;
    let start = count_arg(args, 1, 1)?;
    let n = count_arg(args, 2, 0)?;
    if start == 0 {
        return Err(CellError::Value);
    }
    Ok(s.chars().skip(start - 1).take(n).collect())
}

/// LEFT(text, [num_chars])
pub fn fn_left(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    text_result(left(args))
}

/// RIGHT(text, [num_chars])
pub fn fn_right(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    text_result(right(args))
}

/// MID(text, start_num, num_chars)
pub fn fn_mid(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    text_result(mid(args))
}

/// UPPER(text)
pub fn fn_upper(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    text_result(text_arg(args, 0).map(|s| s.to_uppercase()))
}

/// LOWER(text)
pub fn fn_lower(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    text_result(text_arg(args, 0).map(|s| s.to_lowercase()))
}

/// TRIM(text): strips outer spaces and collapses inner runs
pub fn fn_trim(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    text_result(text_arg(args, 0).map(|s| {
        s.split(' ')
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }))
}

/// VALUE(text)
pub fn fn_value(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match arg(args, 0) {
        FormulaValue::Error(e) => FormulaValue::Error(*e),
        FormulaValue::Number(n) => FormulaValue::Number(*n),
        v => match v.as_string().trim().parse::<f64>() {
            Ok(n) => FormulaValue::Number(n),
            Err(_) => FormulaValue::Error(CellError::Value),
        },
    })
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

    fn s(v: &str) -> FormulaValue {
        FormulaValue::String(v.into())
    }

    #[test]
    fn test_substrings() {
        assert_eq!(eval("LEFT(\"hadoop\",3)"), s("had"));
        assert_eq!(eval("RIGHT(\"hadoop\")"), s("p"));
        assert_eq!(eval("RIGHT(\"ab\",5)"), s("ab"));
        assert_eq!(eval("MID(\"office\",2,3)"), s("ffi"));
        assert_eq!(eval("MID(\"office\",0,3)"), FormulaValue::Error(CellError::Value));
    }

    #[test]
    fn test_case_and_trim() {
        assert_eq!(eval("UPPER(\"abc\")"), s("ABC"));
        assert_eq!(eval("LOWER(\"ABC\")"), s("abc"));
        assert_eq!(eval("TRIM(\"  a   b \")"), s("a b"));
        assert_eq!(eval("LEN(\"äbc\")"), FormulaValue::Number(3.0));
    }

    #[test]
    fn test_concatenate_and_value() {
        assert_eq!(eval("CONCATENATE(\"a\",1,TRUE)"), s("a1TRUE"));
        assert_eq!(eval("VALUE(\" 12.5 \")"), FormulaValue::Number(12.5));
        assert_eq!(eval("VALUE(\"x\")"), FormulaValue::Error(CellError::Value));
    }
}
