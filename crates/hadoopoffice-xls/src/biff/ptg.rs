//! Parsed formula tokens (Ptg).
//!
//! FORMULA, SHRFMLA and ARRAY records store formulas as a token list in
//! reverse Polish notation (`rgce`). Decoding runs the tokens against a
//! stack of [`FormulaExpr`] nodes; encoding walks the expression tree and
//! emits operands before their operator.

use hadoopoffice_core::{CellAddress, CellError, CellRange};
use hadoopoffice_formula::{
    BinaryOperator, CellReference, FormulaExpr, RangeReference, UnaryOperator,
};

use super::links::{LinkBuilder, LinkTable, SheetTarget};
use super::payload::Payload;
use super::records::{MAX_COLS, MAX_ROWS};
use super::strings::write_short_string;
use crate::error::{XlsError, XlsResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSpec {
    pub id: u16,
    pub name: &'static str,
    pub min_args: u8,
    pub max_args: u8,
}

const fn spec(id: u16, name: &'static str, min_args: u8, max_args: u8) -> FunctionSpec {
    FunctionSpec {
        id,
        name,
        min_args,
        max_args,
    }
}

/// Built-in functions by BIFF8 function table index. Functions with
/// `min_args == max_args` are written as `PtgFunc`, the others as
/// `PtgFuncVar`.
const FUNCTION_SPECS: &[FunctionSpec] = &[
    spec(0, "COUNT", 0, 30),
    spec(1, "IF", 2, 3),
    spec(2, "ISNA", 1, 1),
    spec(3, "ISERROR", 1, 1),
    spec(4, "SUM", 0, 30),
    spec(5, "AVERAGE", 1, 30),
    spec(6, "MIN", 1, 30),
    spec(7, "MAX", 1, 30),
    spec(8, "ROW", 0, 1),
    spec(9, "COLUMN", 0, 1),
    spec(10, "NA", 0, 0),
    spec(15, "SIN", 1, 1),
    spec(16, "COS", 1, 1),
    spec(17, "TAN", 1, 1),
    spec(18, "ATAN", 1, 1),
    spec(19, "PI", 0, 0),
    spec(20, "SQRT", 1, 1),
    spec(21, "EXP", 1, 1),
    spec(22, "LN", 1, 1),
    spec(23, "LOG10", 1, 1),
    spec(24, "ABS", 1, 1),
    spec(25, "INT", 1, 1),
    spec(26, "SIGN", 1, 1),
    spec(27, "ROUND", 2, 2),
    spec(28, "LOOKUP", 2, 3),
    spec(29, "INDEX", 2, 4),
    spec(30, "REPT", 2, 2),
    spec(31, "MID", 3, 3),
    spec(32, "LEN", 1, 1),
    spec(33, "VALUE", 1, 1),
    spec(34, "TRUE", 0, 0),
    spec(35, "FALSE", 0, 0),
    spec(36, "AND", 1, 30),
    spec(37, "OR", 1, 30),
    spec(38, "NOT", 1, 1),
    spec(39, "MOD", 2, 2),
    spec(48, "TEXT", 2, 2),
    spec(64, "MATCH", 2, 3),
    spec(65, "DATE", 3, 3),
    spec(66, "TIME", 3, 3),
    spec(67, "DAY", 1, 1),
    spec(68, "MONTH", 1, 1),
    spec(69, "YEAR", 1, 1),
    spec(70, "WEEKDAY", 1, 2),
    spec(71, "HOUR", 1, 1),
    spec(72, "MINUTE", 1, 1),
    spec(73, "SECOND", 1, 1),
    spec(74, "NOW", 0, 0),
    spec(82, "SEARCH", 2, 3),
    spec(101, "HLOOKUP", 3, 4),
    spec(102, "VLOOKUP", 3, 4),
    spec(105, "ISREF", 1, 1),
    spec(112, "LOWER", 1, 1),
    spec(113, "UPPER", 1, 1),
    spec(114, "PROPER", 1, 1),
    spec(115, "LEFT", 1, 2),
    spec(116, "RIGHT", 1, 2),
    spec(117, "EXACT", 2, 2),
    spec(118, "TRIM", 1, 1),
    spec(119, "REPLACE", 4, 4),
    spec(120, "SUBSTITUTE", 3, 4),
    spec(124, "FIND", 2, 3),
    spec(126, "ISERR", 1, 1),
    spec(127, "ISTEXT", 1, 1),
    spec(128, "ISNUMBER", 1, 1),
    spec(129, "ISBLANK", 1, 1),
    spec(169, "COUNTA", 0, 30),
    spec(183, "PRODUCT", 0, 30),
    spec(198, "ISLOGICAL", 1, 1),
    spec(212, "ROUNDUP", 2, 2),
    spec(213, "ROUNDDOWN", 2, 2),
    spec(221, "TODAY", 0, 0),
    spec(336, "CONCATENATE", 0, 30),
    spec(337, "POWER", 2, 2),
    spec(345, "SUMIF", 2, 3),
    spec(346, "COUNTIF", 2, 2),
    spec(347, "COUNTBLANK", 1, 1),
];

/// Function table index used by add-in and newer functions whose name is
/// passed as the first argument
const USER_DEFINED_FUNCTION: u16 = 255;

pub fn function_by_id(id: u16) -> Option<&'static FunctionSpec> {
    FUNCTION_SPECS.iter().find(|s| s.id == id)
}

pub fn function_by_name(name: &str) -> Option<&'static FunctionSpec> {
    FUNCTION_SPECS
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(name))
}

// ── Token ids (reference class) ─────────────────────────────────────────
const PTG_EXP: u8 = 0x01;
const PTG_PAREN: u8 = 0x15;
const PTG_MISS_ARG: u8 = 0x16;
const PTG_STR: u8 = 0x17;
const PTG_ATTR: u8 = 0x19;
const PTG_ERR: u8 = 0x1C;
const PTG_BOOL: u8 = 0x1D;
const PTG_INT: u8 = 0x1E;
const PTG_NUM: u8 = 0x1F;
const PTG_FUNC: u8 = 0x21;
const PTG_FUNC_VAR: u8 = 0x22;
const PTG_NAME: u8 = 0x23;
const PTG_REF: u8 = 0x24;
const PTG_AREA: u8 = 0x25;
const PTG_MEM_AREA: u8 = 0x26;
const PTG_MEM_ERR: u8 = 0x27;
const PTG_MEM_NO_MEM: u8 = 0x28;
const PTG_MEM_FUNC: u8 = 0x29;
const PTG_REF_ERR: u8 = 0x2A;
const PTG_AREA_ERR: u8 = 0x2B;
const PTG_REF_N: u8 = 0x2C;
const PTG_AREA_N: u8 = 0x2D;
const PTG_NAME_X: u8 = 0x39;
const PTG_REF_3D: u8 = 0x3A;
const PTG_AREA_3D: u8 = 0x3B;
const PTG_REF_ERR_3D: u8 = 0x3C;
const PTG_AREA_ERR_3D: u8 = 0x3D;

const ATTR_CHOOSE: u8 = 0x04;
const ATTR_SUM: u8 = 0x10;

const COL_RELATIVE: u16 = 0x4000;
const ROW_RELATIVE: u16 = 0x8000;

/// Operand class of an emitted token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Reference = 0x00,
    Value = 0x20,
}

fn binary_op_from_ptg(ptg: u8) -> Option<BinaryOperator> {
    Some(match ptg {
        0x03 => BinaryOperator::Add,
        0x04 => BinaryOperator::Subtract,
        0x05 => BinaryOperator::Multiply,
        0x06 => BinaryOperator::Divide,
        0x07 => BinaryOperator::Power,
        0x08 => BinaryOperator::Concat,
        0x09 => BinaryOperator::LessThan,
        0x0A => BinaryOperator::LessEqual,
        0x0B => BinaryOperator::Equal,
        0x0C => BinaryOperator::GreaterEqual,
        0x0D => BinaryOperator::GreaterThan,
        0x0E => BinaryOperator::NotEqual,
        0x11 => BinaryOperator::Range,
        _ => return None,
    })
}

fn binary_op_ptg(op: BinaryOperator) -> u8 {
    match op {
        BinaryOperator::Add => 0x03,
        BinaryOperator::Subtract => 0x04,
        BinaryOperator::Multiply => 0x05,
        BinaryOperator::Divide => 0x06,
        BinaryOperator::Power => 0x07,
        BinaryOperator::Concat => 0x08,
        BinaryOperator::LessThan => 0x09,
        BinaryOperator::LessEqual => 0x0A,
        BinaryOperator::Equal => 0x0B,
        BinaryOperator::GreaterEqual => 0x0C,
        BinaryOperator::GreaterThan => 0x0D,
        BinaryOperator::NotEqual => 0x0E,
        BinaryOperator::Range => 0x11,
    }
}

/// What a token list is decoded against
pub struct DecodeContext<'a> {
    pub links: &'a LinkTable,
    /// Sheet names in BOUNDSHEET order
    pub sheet_names: &'a [String],
    /// Defined names in NAME record order
    pub names: &'a [String],
    /// Cell the formula belongs to; anchors `PtgRefN`/`PtgAreaN`
    pub row: u32,
    pub col: u16,
}

/// Whether a token list only points at a shared or array formula
/// (`PtgExp`). Returns the anchor cell.
pub fn shared_anchor(rgce: &[u8]) -> Option<(u32, u16)> {
    if rgce.len() >= 5 && rgce[0] == PTG_EXP {
        let row = u16::from_le_bytes([rgce[1], rgce[2]]) as u32;
        let col = u16::from_le_bytes([rgce[3], rgce[4]]);
        Some((row, col))
    } else {
        None
    }
}

fn pop(stack: &mut Vec<FormulaExpr>) -> XlsResult<FormulaExpr> {
    stack
        .pop()
        .ok_or_else(|| XlsError::Formula("token stack underflow".into()))
}

fn pop_args(stack: &mut Vec<FormulaExpr>, count: usize) -> XlsResult<Vec<FormulaExpr>> {
    if stack.len() < count {
        return Err(XlsError::Formula("token stack underflow".into()));
    }
    Ok(stack.split_off(stack.len() - count))
}

fn address(row: u16, col_field: u16) -> CellAddress {
    CellAddress::with_absolute(
        row as u32,
        col_field & 0x00FF,
        col_field & ROW_RELATIVE == 0,
        col_field & COL_RELATIVE == 0,
    )
}

/// `PtgRefN` style address: relative parts are offsets from the cell
fn relative_address(row: u16, col_field: u16, ctx: &DecodeContext) -> CellAddress {
    let row_relative = col_field & ROW_RELATIVE != 0;
    let col_relative = col_field & COL_RELATIVE != 0;
    let r = if row_relative {
        (ctx.row as i64 + row as i16 as i64).rem_euclid(MAX_ROWS as i64) as u32
    } else {
        row as u32
    };
    let c = if col_relative {
        (ctx.col as i64 + (col_field & 0x00FF) as u8 as i8 as i64).rem_euclid(MAX_COLS as i64) as u16
    } else {
        col_field & 0x00FF
    };
    CellAddress::with_absolute(r, c, !row_relative, !col_relative)
}

fn sheet_qualifier(ixti: u16, ctx: &DecodeContext) -> XlsResult<Option<(Option<String>, String)>> {
    Ok(match ctx.links.sheet_target(ixti)? {
        SheetTarget::Internal(idx) => {
            let sheet = ctx
                .sheet_names
                .get(idx)
                .cloned()
                .ok_or_else(|| XlsError::Formula(format!("unknown sheet index {idx}")))?;
            Some((None, sheet))
        }
        SheetTarget::External { file_name, sheet } => Some((Some(file_name), sheet)),
        SheetTarget::Invalid => None,
    })
}

/// Decode a token list into an expression
pub fn decode_rgce(rgce: &[u8], ctx: &DecodeContext) -> XlsResult<FormulaExpr> {
    let mut stack: Vec<FormulaExpr> = Vec::new();
    let mut p = Payload::new("formula token list", rgce);
    while !p.is_at_end() {
        let raw = p.u8()?;
        // Operand tokens carry their class in bits 5-6
        let ptg = if raw >= 0x20 { (raw & 0x1F) | 0x20 } else { raw };
        match ptg {
            0x03..=0x0E | 0x11 => {
                let op = binary_op_from_ptg(ptg)
                    .ok_or_else(|| XlsError::Formula(format!("operator token 0x{ptg:02X}")))?;
                let right = pop(&mut stack)?;
                let left = pop(&mut stack)?;
                stack.push(FormulaExpr::BinaryOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                });
            }
            0x12..=0x14 => {
                let op = match ptg {
                    0x12 => UnaryOperator::Plus,
                    0x13 => UnaryOperator::Negate,
                    _ => UnaryOperator::Percent,
                };
                let operand = pop(&mut stack)?;
                stack.push(FormulaExpr::UnaryOp {
                    op,
                    operand: Box::new(operand),
                });
            }
            PTG_PAREN => {
                let inner = pop(&mut stack)?;
                stack.push(FormulaExpr::Paren(Box::new(inner)));
            }
            PTG_STR => stack.push(FormulaExpr::String(p.short_string()?)),
            PTG_ATTR => {
                let grbit = p.u8()?;
                let data = p.u16()?;
                if grbit & ATTR_CHOOSE != 0 {
                    p.skip((usize::from(data) + 1) * 2)?;
                }
                if grbit & ATTR_SUM != 0 {
                    let arg = pop(&mut stack)?;
                    stack.push(FormulaExpr::Function {
                        name: "SUM".into(),
                        args: vec![arg],
                    });
                }
            }
            PTG_ERR => {
                let code = p.u8()?;
                stack.push(FormulaExpr::Error(CellError::from_code(code)));
            }
            PTG_BOOL => stack.push(FormulaExpr::Boolean(p.u8()? != 0)),
            PTG_INT => stack.push(FormulaExpr::Number(p.u16()? as f64)),
            PTG_NUM => stack.push(FormulaExpr::Number(p.f64()?)),
            PTG_FUNC => {
                let id = p.u16()?;
                let spec = function_by_id(id)
                    .ok_or_else(|| XlsError::Formula(format!("unknown function id {id}")))?;
                let args = pop_args(&mut stack, spec.min_args as usize)?;
                stack.push(FormulaExpr::Function {
                    name: spec.name.to_string(),
                    args,
                });
            }
            PTG_FUNC_VAR => {
                let argc = (p.u8()? & 0x7F) as usize;
                let id = p.u16()? & 0x7FFF;
                let mut args = pop_args(&mut stack, argc)?;
                let name = if id == USER_DEFINED_FUNCTION {
                    if args.is_empty() {
                        return Err(XlsError::Formula("user function without name".into()));
                    }
                    match args.remove(0) {
                        FormulaExpr::NameRef(name) => name,
                        other => {
                            return Err(XlsError::Formula(format!("user function named by {other}")))
                        }
                    }
                } else {
                    function_by_id(id)
                        .ok_or_else(|| XlsError::Formula(format!("unknown function id {id}")))?
                        .name
                        .to_string()
                };
                stack.push(FormulaExpr::Function { name, args });
            }
            PTG_NAME => {
                let index = p.u16()? as usize;
                p.skip(2)?;
                let name = index
                    .checked_sub(1)
                    .and_then(|i| ctx.names.get(i))
                    .ok_or_else(|| XlsError::Formula(format!("unknown defined name {index}")))?;
                stack.push(FormulaExpr::NameRef(name.clone()));
            }
            PTG_REF => {
                let row = p.u16()?;
                let col = p.u16()?;
                stack.push(FormulaExpr::CellRef(CellReference {
                    workbook: None,
                    sheet: None,
                    address: address(row, col),
                }));
            }
            PTG_AREA => {
                let first_row = p.u16()?;
                let last_row = p.u16()?;
                let first_col = p.u16()?;
                let last_col = p.u16()?;
                stack.push(FormulaExpr::RangeRef(RangeReference {
                    workbook: None,
                    sheet: None,
                    range: CellRange::new(address(first_row, first_col), address(last_row, last_col)),
                }));
            }
            // The sub-expression that follows pushes the reference itself
            PTG_MEM_AREA | PTG_MEM_ERR | PTG_MEM_NO_MEM => p.skip(6)?,
            PTG_MEM_FUNC => p.skip(2)?,
            PTG_REF_ERR => {
                p.skip(4)?;
                stack.push(FormulaExpr::Error(CellError::Ref));
            }
            PTG_AREA_ERR => {
                p.skip(8)?;
                stack.push(FormulaExpr::Error(CellError::Ref));
            }
            PTG_REF_N => {
                let row = p.u16()?;
                let col = p.u16()?;
                stack.push(FormulaExpr::CellRef(CellReference {
                    workbook: None,
                    sheet: None,
                    address: relative_address(row, col, ctx),
                }));
            }
            PTG_AREA_N => {
                let first_row = p.u16()?;
                let last_row = p.u16()?;
                let first_col = p.u16()?;
                let last_col = p.u16()?;
                stack.push(FormulaExpr::RangeRef(RangeReference {
                    workbook: None,
                    sheet: None,
                    range: CellRange::new(
                        relative_address(first_row, first_col, ctx),
                        relative_address(last_row, last_col, ctx),
                    ),
                }));
            }
            PTG_NAME_X => {
                let ixti = p.u16()?;
                let index = p.u16()?;
                p.skip(2)?;
                let name = ctx.links.extern_name(ixti, index).ok_or_else(|| {
                    XlsError::Formula(format!("unknown external name {index} of XTI {ixti}"))
                })?;
                stack.push(FormulaExpr::NameRef(name.to_string()));
            }
            PTG_REF_3D => {
                let ixti = p.u16()?;
                let row = p.u16()?;
                let col = p.u16()?;
                stack.push(match sheet_qualifier(ixti, ctx)? {
                    Some((workbook, sheet)) => FormulaExpr::CellRef(CellReference {
                        workbook,
                        sheet: Some(sheet),
                        address: address(row, col),
                    }),
                    None => FormulaExpr::Error(CellError::Ref),
                });
            }
            PTG_AREA_3D => {
                let ixti = p.u16()?;
                let first_row = p.u16()?;
                let last_row = p.u16()?;
                let first_col = p.u16()?;
                let last_col = p.u16()?;
                let range =
                    CellRange::new(address(first_row, first_col), address(last_row, last_col));
                stack.push(match sheet_qualifier(ixti, ctx)? {
                    Some((workbook, sheet)) => FormulaExpr::RangeRef(RangeReference {
                        workbook,
                        sheet: Some(sheet),
                        range,
                    }),
                    None => FormulaExpr::Error(CellError::Ref),
                });
            }
            PTG_REF_ERR_3D => {
                p.skip(6)?;
                stack.push(FormulaExpr::Error(CellError::Ref));
            }
            PTG_AREA_ERR_3D => {
                p.skip(10)?;
                stack.push(FormulaExpr::Error(CellError::Ref));
            }
            PTG_MISS_ARG => return Err(XlsError::Formula("omitted function argument".into())),
            other => return Err(XlsError::Formula(format!("token 0x{other:02X}"))),
        }
    }

    let result = pop(&mut stack)?;
    if !stack.is_empty() {
        return Err(XlsError::Formula(format!(
            "{} operands left after decoding",
            stack.len()
        )));
    }
    Ok(result)
}

/// Encode an expression as a cell formula token list. 3D references get
/// their XTI from `links`.
pub fn encode_formula(expr: &FormulaExpr, links: &mut LinkBuilder) -> XlsResult<Vec<u8>> {
    let mut out = Vec::new();
    encode(expr, Class::Value, &mut out, links)?;
    Ok(out)
}

fn encode_col(address: &CellAddress) -> XlsResult<(u16, u16)> {
    if address.row >= MAX_ROWS || address.col >= MAX_COLS {
        return Err(XlsError::Formula(format!(
            "{address} is outside the BIFF8 grid"
        )));
    }
    let mut col = address.col;
    if !address.col_absolute {
        col |= COL_RELATIVE;
    }
    if !address.row_absolute {
        col |= ROW_RELATIVE;
    }
    Ok((address.row as u16, col))
}

fn encode_ixti(
    workbook: &Option<String>,
    sheet: &Option<String>,
    links: &mut LinkBuilder,
) -> XlsResult<Option<u16>> {
    match (workbook, sheet) {
        (_, Some(sheet)) => links.ixti(workbook.as_deref(), sheet).map(Some),
        (Some(book), None) => Err(XlsError::Formula(format!("workbook {book} without sheet"))),
        (None, None) => Ok(None),
    }
}

fn encode(
    expr: &FormulaExpr,
    class: Class,
    out: &mut Vec<u8>,
    links: &mut LinkBuilder,
) -> XlsResult<()> {
    match expr {
        FormulaExpr::Number(n) => {
            if n.fract() == 0.0 && (0.0..=65535.0).contains(n) {
                out.push(PTG_INT);
                out.extend_from_slice(&(*n as u16).to_le_bytes());
            } else {
                out.push(PTG_NUM);
                out.extend_from_slice(&n.to_le_bytes());
            }
        }
        FormulaExpr::String(s) => {
            if s.encode_utf16().count() > 255 {
                return Err(XlsError::Formula("string constant longer than 255 characters".into()));
            }
            out.push(PTG_STR);
            write_short_string(out, s);
        }
        FormulaExpr::Boolean(b) => {
            out.push(PTG_BOOL);
            out.push(u8::from(*b));
        }
        FormulaExpr::Error(e) => {
            out.push(PTG_ERR);
            out.push(e.code());
        }
        FormulaExpr::CellRef(r) => {
            let (row, col) = encode_col(&r.address)?;
            match encode_ixti(&r.workbook, &r.sheet, links)? {
                Some(ixti) => {
                    out.push(PTG_REF_3D | class as u8);
                    out.extend_from_slice(&ixti.to_le_bytes());
                }
                None => out.push(PTG_REF | class as u8),
            }
            out.extend_from_slice(&row.to_le_bytes());
            out.extend_from_slice(&col.to_le_bytes());
        }
        FormulaExpr::RangeRef(r) => {
            let (first_row, first_col) = encode_col(&r.range.start)?;
            let (last_row, last_col) = encode_col(&r.range.end)?;
            match encode_ixti(&r.workbook, &r.sheet, links)? {
                Some(ixti) => {
                    out.push(PTG_AREA_3D | class as u8);
                    out.extend_from_slice(&ixti.to_le_bytes());
                }
                None => out.push(PTG_AREA | class as u8),
            }
            out.extend_from_slice(&first_row.to_le_bytes());
            out.extend_from_slice(&last_row.to_le_bytes());
            out.extend_from_slice(&first_col.to_le_bytes());
            out.extend_from_slice(&last_col.to_le_bytes());
        }
        FormulaExpr::NameRef(name) => {
            return Err(XlsError::Formula(format!("defined name {name}")));
        }
        FormulaExpr::BinaryOp { op, left, right } => {
            let operand_class = if *op == BinaryOperator::Range {
                Class::Reference
            } else {
                Class::Value
            };
            encode(left, operand_class, out, links)?;
            encode(right, operand_class, out, links)?;
            out.push(binary_op_ptg(*op));
        }
        FormulaExpr::UnaryOp { op, operand } => {
            encode(operand, Class::Value, out, links)?;
            out.push(match op {
                UnaryOperator::Plus => 0x12,
                UnaryOperator::Negate => 0x13,
                UnaryOperator::Percent => 0x14,
            });
        }
        FormulaExpr::Paren(inner) => {
            encode(inner, class, out, links)?;
            out.push(PTG_PAREN);
        }
        FormulaExpr::Function { name, args } => {
            let spec = function_by_name(name)
                .ok_or_else(|| XlsError::Formula(format!("function {name} has no BIFF8 id")))?;
            if args.len() < spec.min_args as usize || args.len() > spec.max_args as usize {
                return Err(XlsError::Formula(format!(
                    "{} takes {} to {} arguments, got {}",
                    spec.name,
                    spec.min_args,
                    spec.max_args,
                    args.len()
                )));
            }
            for arg in args {
                encode(arg, Class::Reference, out, links)?;
            }
            if spec.min_args == spec.max_args {
                out.push(PTG_FUNC | Class::Value as u8);
                out.extend_from_slice(&spec.id.to_le_bytes());
            } else {
                out.push(PTG_FUNC_VAR | Class::Value as u8);
                out.push(args.len() as u8);
                out.extend_from_slice(&spec.id.to_le_bytes());
            }
        }
        FormulaExpr::Array(_) => {
            return Err(XlsError::Formula("array constant".into()));
        }
    }
    Ok(())
}

/// Read the cached-result-independent parts of a FORMULA record:
/// `(row, col, xf, result bytes, rgce)`. Between the result and the token
/// list sit grbit(2) and chn(4).
pub fn split_formula_record<'a>(
    body: &mut Payload<'a>,
) -> XlsResult<(u32, u16, u16, [u8; 8], &'a [u8])> {
    let (row, col, xf) = body.cell_header()?;
    let mut result = [0u8; 8];
    result.copy_from_slice(body.bytes(8)?);
    body.skip(6)?;
    let cce = usize::from(body.u16()?);
    Ok((row, col, xf, result, body.bytes(cce)?))
}

/// Token list of a SHRFMLA or ARRAY record with the range it covers:
/// `(first_row, last_row, first_col, last_col, rgce)`
pub fn split_shared_record<'a>(
    body: &mut Payload<'a>,
    is_array: bool,
) -> XlsResult<(u32, u32, u16, u16, &'a [u8])> {
    let first_row = u32::from(body.u16()?);
    let last_row = u32::from(body.u16()?);
    let first_col = u16::from(body.u8()?);
    let last_col = u16::from(body.u8()?);
    // ARRAY: grbit u16, chn u32. SHRFMLA: reserved u8, cUse u8.
    body.skip(if is_array { 6 } else { 2 })?;
    let cce = usize::from(body.u16()?);
    Ok((first_row, last_row, first_col, last_col, body.bytes(cce)?))
}

/// `PtgRefN` with both parts relative to the formula cell
#[cfg(test)]
fn ref_n(row_offset: i16, col_offset: i8) -> Vec<u8> {
    let mut out = vec![PTG_REF_N | Class::Value as u8];
    out.extend_from_slice(&row_offset.to_le_bytes());
    let col = (col_offset as u8 as u16) | COL_RELATIVE | ROW_RELATIVE;
    out.extend_from_slice(&col.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biff::RecordIter;
    use hadoopoffice_core::{ExternalLink, Workbook};
    use hadoopoffice_formula::parse_formula;

    fn roundtrip(text: &str, wb: &Workbook) -> String {
        let mut builder = LinkBuilder::new(wb);
        let rgce = encode_formula(&parse_formula(text).unwrap(), &mut builder).unwrap();
        let mut links = LinkTable::new();
        for record in RecordIter::new(&builder.to_records()) {
            links.on_record(&record.unwrap()).unwrap();
        }
        let sheet_names: Vec<String> = wb.sheet_names().iter().map(|s| s.to_string()).collect();
        let ctx = DecodeContext {
            links: &links,
            sheet_names: &sheet_names,
            names: &[],
            row: 0,
            col: 0,
        };
        decode_rgce(&rgce, &ctx).unwrap().to_string()
    }

    #[test]
    fn test_formulas_survive_token_encoding() {
        let mut wb = Workbook::new();
        wb.add_worksheet_with_name("Data").unwrap();
        wb.add_external_link(ExternalLink::new("linked.xls"));

        for text in [
            "A3+B3",
            "SUM(A1:C1)*2",
            "IF(A1>=1,\"yes\",\"no\")",
            "-(A1-$B$2)%",
            "ROUND(1.25,1)&\"x\"",
            "Data!A1+SUM(Data!$A$1:B2)",
            "[linked.xls]Sheet1!A1*2",
            "LEFT(\"abc\")",
            "TRUE",
            "#DIV/0!",
        ] {
            assert_eq!(roundtrip(text, &wb), text, "formula {text}");
        }
    }

    #[test]
    fn test_sum_args_use_reference_class() {
        let mut builder = LinkBuilder::new(&Workbook::new());
        let rgce = encode_formula(&parse_formula("SUM(A1:A3)").unwrap(), &mut builder).unwrap();
        assert_eq!(rgce[0], PTG_AREA);
        assert_eq!(rgce[rgce.len() - 4], PTG_FUNC_VAR | 0x20);
    }

    #[test]
    fn test_unsupported_formulas() {
        let mut builder = LinkBuilder::new(&Workbook::new());
        for text in ["IFERROR(A1,0)", "MyName+1", "A70000", "[nolink.xls]Sheet1!A1"] {
            assert!(
                encode_formula(&parse_formula(text).unwrap(), &mut builder).is_err(),
                "formula {text}"
            );
        }
    }

    #[test]
    fn test_shared_formula_tokens_are_cell_relative() {
        let links = LinkTable::new();
        let mut rgce = ref_n(-1, 0);
        rgce.extend(ref_n(-1, 1));
        rgce.push(0x03);
        let ctx = DecodeContext {
            links: &links,
            sheet_names: &[],
            names: &[],
            row: 3,
            col: 0,
        };
        assert_eq!(decode_rgce(&rgce, &ctx).unwrap().to_string(), "A3+B3");
        assert_eq!(shared_anchor(&[PTG_EXP, 2, 0, 0, 0]), Some((2, 0)));
    }

    #[test]
    fn test_attr_sum_and_spaces() {
        let links = LinkTable::new();
        let ctx = DecodeContext {
            links: &links,
            sheet_names: &[],
            names: &[],
            row: 0,
            col: 0,
        };
        // A1:A2 then tAttrSum, then a tAttrSpace
        let rgce = [
            PTG_AREA, 0, 0, 1, 0, 0, 0xC0, 0, 0xC0, PTG_ATTR, ATTR_SUM, 0, 0, PTG_ATTR, 0x40, 0, 1,
        ];
        assert_eq!(decode_rgce(&rgce, &ctx).unwrap().to_string(), "SUM(A1:A2)");
    }
}
