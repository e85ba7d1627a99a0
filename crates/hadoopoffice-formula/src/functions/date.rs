//! Date/time functions
//!
//! Dates are Excel serial numbers in the workbook's date system. The 1900
//! system keeps the fictitious 1900-02-29 at serial 60.

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime};
use hadoopoffice_core::format::{datetime_to_serial, serial_to_datetime};
use hadoopoffice_core::CellError;

use super::number_arg;
use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};

fn date_serial(year: f64, month: f64, day: f64, date_1904: bool) -> Result<f64, CellError> {
    let mut year = year.trunc() as i64;
    if (0..1900).contains(&year) {
        year += 1900;
    }
    let month = month.trunc() as i64 - 1;
    let year = year + month.div_euclid(12);
    let month = month.rem_euclid(12) as u32 + 1;
    if !(0..=9999).contains(&year) {
        return Err(CellError::Num);
    }

    let first = NaiveDate::from_ymd_opt(year as i32, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or(CellError::Num)?;
    let dt = first + Duration::days(day.trunc() as i64 - 1);
    let serial = datetime_to_serial(&dt, date_1904);
    if serial < 0.0 {
        return Err(CellError::Num);
    }
    Ok(serial)
}

fn date_part(
    args: &[FormulaValue],
    ctx: &EvaluationContext,
    part: fn(f64, &NaiveDateTime) -> u32,
) -> FormulaValue {
    let serial = match number_arg(args, 0) {
        Ok(n) => n,
        Err(e) => return FormulaValue::Error(e),
    };
    match serial_to_datetime(serial, ctx.date_1904()) {
        Some(dt) => FormulaValue::Number(part(serial, &dt) as f64),
        None => FormulaValue::Error(CellError::Num),
    }
}

fn is_phantom_leap_day(serial: f64, date_1904: bool) -> bool {
    !date_1904 && serial.trunc() == 60.0
}

/// DATE(year, month, day)
pub fn fn_date(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let parts = (|| -> Result<(f64, f64, f64), CellError> {
        Ok((
            number_arg(args, 0)?,
            number_arg(args, 1)?,
            number_arg(args, 2)?,
        ))
    })();
    Ok(match parts.and_then(|(y, m, d)| date_serial(y, m, d, ctx.date_1904())) {
        Ok(serial) => FormulaValue::Number(serial),
        Err(e) => FormulaValue::Error(e),
    })
}

/// YEAR(serial_number)
pub fn fn_year(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(date_part(args, ctx, |_, dt| dt.year() as u32))
}

/// MONTH(serial_number)
pub fn fn_month(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let date_1904 = ctx.date_1904();
    if number_arg(args, 0).is_ok_and(|n| is_phantom_leap_day(n, date_1904)) {
        return Ok(FormulaValue::Number(2.0));
    }
    Ok(date_part(args, ctx, |_, dt| dt.month()))
}

/// DAY(serial_number)
pub fn fn_day(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let date_1904 = ctx.date_1904();
    if number_arg(args, 0).is_ok_and(|n| is_phantom_leap_day(n, date_1904)) {
        return Ok(FormulaValue::Number(29.0));
    }
    Ok(date_part(args, ctx, |_, dt| dt.day()))
}

/// TODAY()
pub fn fn_today(_args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let now = Local::now().naive_local();
    Ok(FormulaValue::Number(
        datetime_to_serial(&now, ctx.date_1904()).floor(),
    ))
}

/// NOW()
pub fn fn_now(_args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let now = Local::now().naive_local();
    Ok(FormulaValue::Number(datetime_to_serial(&now, ctx.date_1904())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Evaluator;
    use hadoopoffice_core::Workbook;

    fn eval_in(wb: &Workbook, formula: &str) -> FormulaValue {
        Evaluator::new(wb).evaluate_formula(formula, 0, 0, 0).unwrap()
    }

    fn eval(formula: &str) -> FormulaValue {
        eval_in(&Workbook::new(), formula)
    }

    #[test]
    fn test_date_serials() {
        assert_eq!(eval("DATE(1900,1,1)"), FormulaValue::Number(1.0));
        assert_eq!(eval("DATE(1900,2,28)"), FormulaValue::Number(59.0));
        assert_eq!(eval("DATE(1900,3,1)"), FormulaValue::Number(61.0));
        assert_eq!(eval("DATE(1999,12,31)"), FormulaValue::Number(36525.0));
        assert_eq!(eval("DATE(99,12,31)"), FormulaValue::Number(36525.0));
        assert_eq!(eval("DATE(2019,13,1)"), eval("DATE(2020,1,1)"));
        assert_eq!(eval("DATE(2020,3,0)"), eval("DATE(2020,2,29)"));
    }

    #[test]
    fn test_date_parts() {
        assert_eq!(eval("YEAR(36525)"), FormulaValue::Number(1999.0));
        assert_eq!(eval("MONTH(36525)"), FormulaValue::Number(12.0));
        assert_eq!(eval("DAY(36525)"), FormulaValue::Number(31.0));
        assert_eq!(eval("MONTH(60)"), FormulaValue::Number(2.0));
        assert_eq!(eval("DAY(60)"), FormulaValue::Number(29.0));
        assert_eq!(eval("YEAR(-1)"), FormulaValue::Error(CellError::Num));
    }

    #[test]
    fn test_date_1904() {
        let mut wb = Workbook::new();
        wb.set_date_1904(true);
        assert_eq!(eval_in(&wb, "DATE(1904,1,2)"), FormulaValue::Number(1.0));
        assert_eq!(eval_in(&wb, "YEAR(0)"), FormulaValue::Number(1904.0));
    }

    #[test]
    fn test_today_is_whole_day() {
        let FormulaValue::Number(today) = eval("TODAY()") else {
            panic!("TODAY did not return a number");
        };
        assert_eq!(today.fract(), 0.0);
        assert!(today > 40000.0);
    }
}
