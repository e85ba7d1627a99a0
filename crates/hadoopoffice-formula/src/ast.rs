//! Formula Abstract Syntax Tree types

use std::fmt;

use hadoopoffice_core::{CellAddress, CellError, CellRange, CellRef};

/// Formula expression AST
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaExpr {
    // === Literals ===
    /// Numeric literal
    Number(f64),
    /// String literal
    String(String),
    /// Boolean literal
    Boolean(bool),
    /// Error literal
    Error(CellError),

    // === References ===
    /// Single cell reference
    CellRef(CellReference),
    /// Range reference
    RangeRef(RangeReference),
    /// Defined name
    NameRef(String),

    // === Operators ===
    /// Binary operation
    BinaryOp {
        op: BinaryOperator,
        left: Box<FormulaExpr>,
        right: Box<FormulaExpr>,
    },
    /// Unary operation
    UnaryOp {
        op: UnaryOperator,
        operand: Box<FormulaExpr>,
    },

    /// Parenthesized expression, kept so formulas print back unchanged
    Paren(Box<FormulaExpr>),

    // === Function call ===
    Function {
        name: String,
        args: Vec<FormulaExpr>,
    },

    // === Array ===
    Array(Vec<Vec<FormulaExpr>>),
}

/// Cell reference with optional workbook and sheet
#[derive(Debug, Clone, PartialEq)]
pub struct CellReference {
    /// External workbook: a file name or a 1-based link index
    pub workbook: Option<String>,
    pub sheet: Option<String>,
    pub address: CellAddress,
}

/// Range reference with optional workbook and sheet
#[derive(Debug, Clone, PartialEq)]
pub struct RangeReference {
    pub workbook: Option<String>,
    pub sheet: Option<String>,
    pub range: CellRange,
}

impl CellReference {
    /// Whether this points into another workbook
    pub fn is_external(&self) -> bool {
        self.workbook.is_some()
    }
}

fn shift_address(addr: CellAddress, rows: i64, cols: i64) -> Option<CellAddress> {
    let row = if addr.row_absolute { addr.row as i64 } else { addr.row as i64 + rows };
    let col = if addr.col_absolute { addr.col as i64 } else { addr.col as i64 + cols };
    Some(CellAddress::with_absolute(
        u32::try_from(row).ok()?,
        u16::try_from(col).ok()?,
        addr.row_absolute,
        addr.col_absolute,
    ))
}

impl FormulaExpr {
    /// Rewrite the workbook qualifier of every external reference
    pub fn map_workbooks(&self, f: &mut dyn FnMut(&str) -> String) -> FormulaExpr {
        match self {
            FormulaExpr::CellRef(r) => FormulaExpr::CellRef(CellReference {
                workbook: r.workbook.as_deref().map(&mut *f),
                ..r.clone()
            }),
            FormulaExpr::RangeRef(r) => FormulaExpr::RangeRef(RangeReference {
                workbook: r.workbook.as_deref().map(&mut *f),
                ..r.clone()
            }),
            FormulaExpr::BinaryOp { op, left, right } => FormulaExpr::BinaryOp {
                op: *op,
                left: Box::new(left.map_workbooks(f)),
                right: Box::new(right.map_workbooks(f)),
            },
            FormulaExpr::UnaryOp { op, operand } => FormulaExpr::UnaryOp {
                op: *op,
                operand: Box::new(operand.map_workbooks(f)),
            },
            FormulaExpr::Paren(inner) => FormulaExpr::Paren(Box::new(inner.map_workbooks(f))),
            FormulaExpr::Function { name, args } => FormulaExpr::Function {
                name: name.clone(),
                args: args.iter().map(|a| a.map_workbooks(f)).collect(),
            },
            other => other.clone(),
        }
    }

    /// Every reference into another workbook, as `(workbook, sheet, range)`
    pub fn external_references(&self) -> Vec<(&str, &str, CellRange)> {
        let mut found = Vec::new();
        self.collect_external(&mut found);
        found
    }

    fn collect_external<'a>(&'a self, found: &mut Vec<(&'a str, &'a str, CellRange)>) {
        match self {
            FormulaExpr::CellRef(CellReference {
                workbook: Some(book),
                sheet,
                address,
            }) => found.push((book, sheet.as_deref().unwrap_or_default(), CellRange::new(*address, *address))),
            FormulaExpr::RangeRef(RangeReference {
                workbook: Some(book),
                sheet,
                range,
            }) => found.push((book, sheet.as_deref().unwrap_or_default(), *range)),
            FormulaExpr::BinaryOp { left, right, .. } => {
                left.collect_external(found);
                right.collect_external(found);
            }
            FormulaExpr::UnaryOp { operand, .. } => operand.collect_external(found),
            FormulaExpr::Paren(inner) => inner.collect_external(found),
            FormulaExpr::Function { args, .. } => {
                for arg in args {
                    arg.collect_external(found);
                }
            }
            _ => {}
        }
    }

    /// The formula as it reads when copied `rows` down and `cols` right.
    /// Relative references move, absolute ones stay. References pushed off
    /// the sheet become `#REF!`.
    pub fn shifted(&self, rows: i64, cols: i64) -> FormulaExpr {
        let shift = |e: &FormulaExpr| Box::new(e.shifted(rows, cols));
        match self {
            FormulaExpr::CellRef(r) => match shift_address(r.address, rows, cols) {
                Some(address) => FormulaExpr::CellRef(CellReference {
                    address,
                    ..r.clone()
                }),
                None => FormulaExpr::Error(CellError::Ref),
            },
            FormulaExpr::RangeRef(r) => {
                match (
                    shift_address(r.range.start, rows, cols),
                    shift_address(r.range.end, rows, cols),
                ) {
                    (Some(start), Some(end)) => FormulaExpr::RangeRef(RangeReference {
                        range: CellRange::new(start, end),
                        ..r.clone()
                    }),
                    _ => FormulaExpr::Error(CellError::Ref),
                }
            }
            FormulaExpr::BinaryOp { op, left, right } => FormulaExpr::BinaryOp {
                op: *op,
                left: shift(left.as_ref()),
                right: shift(right.as_ref()),
            },
            FormulaExpr::UnaryOp { op, operand } => FormulaExpr::UnaryOp {
                op: *op,
                operand: shift(operand.as_ref()),
            },
            FormulaExpr::Paren(inner) => FormulaExpr::Paren(shift(inner.as_ref())),
            FormulaExpr::Function { name, args } => FormulaExpr::Function {
                name: name.clone(),
                args: args.iter().map(|a| a.shifted(rows, cols)).collect(),
            },
            other => other.clone(),
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Text
    Concat,

    // Range
    Range,
}

impl BinaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Power => "^",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::Concat => "&",
            BinaryOperator::Range => ":",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Plus,
    Percent,
}

fn write_qualifier(
    f: &mut fmt::Formatter<'_>,
    workbook: &Option<String>,
    sheet: &Option<String>,
) -> fmt::Result {
    match (workbook, sheet) {
        (Some(book), Some(sheet)) => {
            let plain_book = book
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
            if plain_book && CellRef::quote_sheet_name(sheet) == *sheet {
                write!(f, "[{book}]{sheet}!")
            } else {
                write!(f, "'[{}]{}'!", book.replace('\'', "''"), sheet.replace('\'', "''"))
            }
        }
        (None, Some(sheet)) => write!(f, "{}!", CellRef::quote_sheet_name(sheet)),
        _ => Ok(()),
    }
}

/// Renders the formula text without a leading `=`
impl fmt::Display for FormulaExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaExpr::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            FormulaExpr::String(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            FormulaExpr::Boolean(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            FormulaExpr::Error(e) => write!(f, "{e}"),
            FormulaExpr::CellRef(r) => {
                write_qualifier(f, &r.workbook, &r.sheet)?;
                write!(f, "{}", r.address)
            }
            FormulaExpr::RangeRef(r) => {
                write_qualifier(f, &r.workbook, &r.sheet)?;
                write!(f, "{}:{}", r.range.start, r.range.end)
            }
            FormulaExpr::NameRef(name) => f.write_str(name),
            FormulaExpr::BinaryOp { op, left, right } => {
                write!(f, "{}{}{}", left, op.symbol(), right)
            }
            FormulaExpr::UnaryOp { op, operand } => match op {
                UnaryOperator::Negate => write!(f, "-{operand}"),
                UnaryOperator::Plus => write!(f, "+{operand}"),
                UnaryOperator::Percent => write!(f, "{operand}%"),
            },
            FormulaExpr::Paren(inner) => write!(f, "({inner})"),
            FormulaExpr::Function { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            FormulaExpr::Array(rows) => {
                f.write_str("{")?;
                for (r, row) in rows.iter().enumerate() {
                    if r > 0 {
                        f.write_str(";")?;
                    }
                    for (c, item) in row.iter().enumerate() {
                        if c > 0 {
                            f.write_str(",")?;
                        }
                        write!(f, "{item}")?;
                    }
                }
                f.write_str("}")
            }
        }
    }
}
