//! Math functions

use hadoopoffice_core::CellError;

use super::number_arg;
use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};

/// Collect numbers from arguments. Direct arguments are coerced, values
/// coming from ranges only count when they are numbers.
fn collect_numbers(args: &[FormulaValue]) -> Result<Vec<f64>, CellError> {
    let mut numbers = Vec::new();
    for arg in args {
        match arg {
            FormulaValue::Array(rows) => {
                for cell in rows.iter().flatten() {
                    match cell {
                        FormulaValue::Number(n) => numbers.push(*n),
                        FormulaValue::Error(e) => return Err(*e),
                        _ => {}
                    }
                }
            }
            FormulaValue::Error(e) => return Err(*e),
            FormulaValue::Empty => {}
            other => match other.as_number() {
                Some(n) => numbers.push(n),
                None => return Err(CellError::Value),
            },
        }
    }
    Ok(numbers)
}

fn aggregate(args: &[FormulaValue], f: impl FnOnce(Vec<f64>) -> FormulaValue) -> FormulaValue {
    match collect_numbers(args) {
        Ok(numbers) => f(numbers),
        Err(e) => FormulaValue::Error(e),
    }
}

/// SUM(number1, ...)
pub fn fn_sum(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(aggregate(args, |n| FormulaValue::Number(n.iter().sum())))
}

/// PRODUCT(number1, ...)
pub fn fn_product(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(aggregate(args, |n| {
        if n.is_empty() {
            FormulaValue::Number(0.0)
        } else {
            FormulaValue::Number(n.iter().product())
        }
    }))
}

/// AVERAGE(number1, ...)
pub fn fn_average(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(aggregate(args, |n| {
        if n.is_empty() {
            FormulaValue::Error(CellError::Div0)
        } else {
            FormulaValue::Number(n.iter().sum::<f64>() / n.len() as f64)
        }
    }))
}

/// MIN(number1, ...)
pub fn fn_min(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(aggregate(args, |n| {
        FormulaValue::Number(n.into_iter().reduce(f64::min).unwrap_or(0.0))
    }))
}

/// MAX(number1, ...)
pub fn fn_max(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(aggregate(args, |n| {
        FormulaValue::Number(n.into_iter().reduce(f64::max).unwrap_or(0.0))
    }))
}

/// COUNT(value1, ...)
pub fn fn_count(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let count = args
        .iter()
        .flat_map(|a| a.flatten())
        .filter(|v| matches!(v, FormulaValue::Number(_)))
        .count();
    Ok(FormulaValue::Number(count as f64))
}

/// COUNTA(value1, ...)
pub fn fn_counta(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let count = args
        .iter()
        .flat_map(|a| a.flatten())
        .filter(|v| !matches!(v, FormulaValue::Empty))
        .count();
    Ok(FormulaValue::Number(count as f64))
}

/// ABS(number)
pub fn fn_abs(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match number_arg(args, 0) {
        Ok(n) => FormulaValue::Number(n.abs()),
        Err(e) => FormulaValue::Error(e),
    })
}

/// INT(number)
pub fn fn_int(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match number_arg(args, 0) {
        Ok(n) => FormulaValue::Number(n.floor()),
        Err(e) => FormulaValue::Error(e),
    })
}

/// SQRT(number)
pub fn fn_sqrt(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match number_arg(args, 0) {
        Ok(n) if n < 0.0 => FormulaValue::Error(CellError::Num),
        Ok(n) => FormulaValue::Number(n.sqrt()),
        Err(e) => FormulaValue::Error(e),
    })
}

/// PI()
pub fn fn_pi(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Number(std::f64::consts::PI))
}

/// MOD(number, divisor); the result has the sign of the divisor
pub fn fn_mod(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let (n, d) = match (number_arg(args, 0), number_arg(args, 1)) {
        (Ok(n), Ok(d)) => (n, d),
        (Err(e), _) | (_, Err(e)) => return Ok(FormulaValue::Error(e)),
    };
    if d == 0.0 {
        return Ok(FormulaValue::Error(CellError::Div0));
    }
    Ok(FormulaValue::Number(n - d * (n / d).floor()))
}

/// POWER(number, power)
pub fn fn_power(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let (b, e) = match (number_arg(args, 0), number_arg(args, 1)) {
        (Ok(b), Ok(e)) => (b, e),
        (Err(e), _) | (_, Err(e)) => return Ok(FormulaValue::Error(e)),
    };
    let result = b.powf(e);
    Ok(if result.is_finite() {
        FormulaValue::Number(result)
    } else {
        FormulaValue::Error(CellError::Num)
    })
}

fn round_with(args: &[FormulaValue], f: fn(f64) -> f64) -> FormulaValue {
    let (n, digits) = match (number_arg(args, 0), number_arg(args, 1)) {
        (Ok(n), Ok(d)) => (n, d.trunc() as i32),
        (Err(e), _) | (_, Err(e)) => return FormulaValue::Error(e),
    };
    let factor = 10f64.powi(digits);
    FormulaValue::Number(f(n * factor) / factor)
}

/// ROUND(number, digits), halves away from zero
pub fn fn_round(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(round_with(args, f64::round))
}

/// ROUNDUP(number, digits), away from zero
pub fn fn_roundup(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(round_with(args, |x| if x < 0.0 { x.floor() } else { x.ceil() }))
}

/// ROUNDDOWN(number, digits), towards zero
pub fn fn_rounddown(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(round_with(args, f64::trunc))
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
    fn test_aggregates() {
        assert_eq!(eval("SUM(1,2,3)"), FormulaValue::Number(6.0));
        assert_eq!(eval("AVERAGE(2,4)"), FormulaValue::Number(3.0));
        assert_eq!(eval("MIN(4,-1,2)"), FormulaValue::Number(-1.0));
        assert_eq!(eval("MAX({1,9;3,4})"), FormulaValue::Number(9.0));
        assert_eq!(eval("PRODUCT(2,3)"), FormulaValue::Number(6.0));
        assert_eq!(eval("COUNT(1,\"a\",{2})"), FormulaValue::Number(2.0));
        assert_eq!(eval("COUNTA(1,\"a\",TRUE)"), FormulaValue::Number(3.0));
        assert_eq!(eval("SUM(1,\"x\")"), FormulaValue::Error(CellError::Value));
        assert_eq!(eval("AVERAGE({\"a\"})"), FormulaValue::Error(CellError::Div0));
    }

    #[test]
    fn test_rounding() {
        assert_eq!(eval("ROUND(2.5,0)"), FormulaValue::Number(3.0));
        assert_eq!(eval("ROUND(-1.25,1)"), FormulaValue::Number(-1.3));
        assert_eq!(eval("ROUNDUP(1.21,1)"), FormulaValue::Number(1.3));
        assert_eq!(eval("ROUNDDOWN(-1.29,1)"), FormulaValue::Number(-1.2));
        assert_eq!(eval("INT(-1.5)"), FormulaValue::Number(-2.0));
    }

    #[test]
    fn test_misc() {
        assert_eq!(eval("MOD(-3,2)"), FormulaValue::Number(1.0));
        assert_eq!(eval("MOD(1,0)"), FormulaValue::Error(CellError::Div0));
        assert_eq!(eval("POWER(2,10)"), FormulaValue::Number(1024.0));
        assert_eq!(eval("SQRT(-1)"), FormulaValue::Error(CellError::Num));
        assert_eq!(eval("ABS(-7)"), FormulaValue::Number(7.0));
    }
}
