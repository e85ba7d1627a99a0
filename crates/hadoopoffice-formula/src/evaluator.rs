//! Formula evaluator
//!
//! Evaluates formula ASTs against a [`Workbook`]. Formula cells referenced by
//! other formulas are evaluated recursively, so stale cached results never
//! leak into a calculation. References into other workbooks
//! (`[linked.xlsx]Sheet1!A1`) are resolved through a [`WorkbookSource`].

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use hadoopoffice_core::external::file_name_of;
use hadoopoffice_core::{CellAddress, CellError, CellRange, CellValue, ExternalLink, Workbook};

use crate::ast::{BinaryOperator, CellReference, FormulaExpr, RangeReference, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use crate::functions::FunctionRegistry;
use crate::parser::parse_formula;

/// Global function registry (lazily initialized)
static FUNCTION_REGISTRY: OnceLock<FunctionRegistry> = OnceLock::new();

fn get_function_registry() -> &'static FunctionRegistry {
    FUNCTION_REGISTRY.get_or_init(FunctionRegistry::new)
}

/// Value types during formula evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaValue {
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),
    Array(Vec<Vec<FormulaValue>>),
    Empty,
}

impl FormulaValue {
    /// Convert to number, if possible
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormulaValue::Number(n) => Some(*n),
            FormulaValue::Boolean(true) => Some(1.0),
            FormulaValue::Boolean(false) => Some(0.0),
            FormulaValue::String(s) => s.trim().parse().ok(),
            FormulaValue::Empty => Some(0.0),
            FormulaValue::Array(rows) => rows.first()?.first()?.as_number(),
            FormulaValue::Error(_) => None,
        }
    }

    /// Convert to boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FormulaValue::Boolean(b) => Some(*b),
            FormulaValue::Number(n) => Some(*n != 0.0),
            FormulaValue::Empty => Some(false),
            FormulaValue::String(s) => {
                if s.eq_ignore_ascii_case("TRUE") {
                    Some(true)
                } else if s.eq_ignore_ascii_case("FALSE") {
                    Some(false)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_string(&self) -> String {
        match self {
            FormulaValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            FormulaValue::String(s) => s.clone(),
            FormulaValue::Boolean(true) => "TRUE".to_string(),
            FormulaValue::Boolean(false) => "FALSE".to_string(),
            FormulaValue::Error(e) => e.to_string(),
            FormulaValue::Empty => String::new(),
            FormulaValue::Array(rows) => rows
                .first()
                .and_then(|r| r.first())
                .map(|v| v.as_string())
                .unwrap_or_default(),
        }
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        matches!(self, FormulaValue::Error(_))
    }

    /// Get the error if this is one
    pub fn get_error(&self) -> Option<CellError> {
        match self {
            FormulaValue::Error(e) => Some(*e),
            _ => None,
        }
    }

    /// Iterate over scalar values, flattening arrays row by row
    pub fn flatten(&self) -> Box<dyn Iterator<Item = &FormulaValue> + '_> {
        match self {
            FormulaValue::Array(rows) => Box::new(rows.iter().flatten()),
            other => Box::new(std::iter::once(other)),
        }
    }
}

impl From<&CellValue> for FormulaValue {
    fn from(value: &CellValue) -> Self {
        match value {
            CellValue::Empty => FormulaValue::Empty,
            CellValue::Number(n) => FormulaValue::Number(*n),
            CellValue::Text(s) => FormulaValue::String(s.clone()),
            CellValue::Boolean(b) => FormulaValue::Boolean(*b),
            CellValue::Error(e) => FormulaValue::Error(*e),
            CellValue::Formula { cached, .. } => cached
                .as_deref()
                .map(FormulaValue::from)
                .unwrap_or(FormulaValue::Empty),
        }
    }
}

impl From<FormulaValue> for CellValue {
    fn from(value: FormulaValue) -> Self {
        match value {
            FormulaValue::Empty => CellValue::Empty,
            FormulaValue::Number(n) if n.is_finite() => CellValue::Number(n),
            FormulaValue::Number(_) => CellValue::Error(CellError::Num),
            FormulaValue::String(s) => CellValue::Text(s),
            FormulaValue::Boolean(b) => CellValue::Boolean(b),
            FormulaValue::Error(e) => CellValue::Error(e),
            FormulaValue::Array(rows) => rows
                .into_iter()
                .next()
                .and_then(|r| r.into_iter().next())
                .map(CellValue::from)
                .unwrap_or(CellValue::Error(CellError::Value)),
        }
    }
}

/// Lookup of linked (external) workbooks by file name
pub trait WorkbookSource {
    /// The linked workbook with this file name, if loaded.
    /// `file_name` carries no directory part.
    fn workbook(&self, file_name: &str) -> Option<&Workbook>;
}

/// Linked workbooks held in memory
#[derive(Debug, Default)]
pub struct LinkedWorkbooks {
    books: Vec<(String, Workbook)>,
}

impl LinkedWorkbooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workbook under its file name (directories are dropped)
    pub fn insert(&mut self, file_name: &str, workbook: Workbook) {
        let name = file_name_of(file_name).to_string();
        match self.books.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = workbook,
            None => self.books.push((name, workbook)),
        }
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// File names in insertion order
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.books.iter().map(|(n, _)| n.as_str())
    }
}

impl WorkbookSource for LinkedWorkbooks {
    fn workbook(&self, file_name: &str) -> Option<&Workbook> {
        let name = file_name_of(file_name);
        self.books
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, wb)| wb)
    }
}

type CellKey = (usize, u32, u16);

/// Evaluates formulas of one workbook, memoizing formula cell results
pub struct Evaluator<'a> {
    workbook: &'a Workbook,
    links: Option<&'a dyn WorkbookSource>,
    use_cached_links: bool,
    memo: RefCell<HashMap<CellKey, FormulaValue>>,
    in_progress: RefCell<HashSet<CellKey>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(workbook: &'a Workbook) -> Self {
        Self {
            workbook,
            links: None,
            use_cached_links: false,
            memo: RefCell::new(HashMap::new()),
            in_progress: RefCell::new(HashSet::new()),
        }
    }

    /// Resolve external references through `links`
    pub fn with_links(mut self, links: &'a dyn WorkbookSource) -> Self {
        self.links = Some(links);
        self
    }

    /// Fall back to the values cached in the workbook's external link
    /// records when a linked workbook is not available
    pub fn use_cached_links(mut self, enabled: bool) -> Self {
        self.use_cached_links = enabled;
        self
    }

    pub fn workbook(&self) -> &'a Workbook {
        self.workbook
    }

    /// Value of a cell, evaluating it if it holds a formula
    pub fn evaluate_cell(&self, sheet: usize, row: u32, col: u16) -> FormulaResult<FormulaValue> {
        let Some(worksheet) = self.workbook.worksheet(sheet) else {
            return Ok(FormulaValue::Error(CellError::Ref));
        };
        let text = match worksheet.value_at(row, col) {
            CellValue::Formula { text, .. } => text,
            other => return Ok(other.into()),
        };

        let key = (sheet, row, col);
        if let Some(value) = self.memo.borrow().get(&key) {
            return Ok(value.clone());
        }
        if !self.in_progress.borrow_mut().insert(key) {
            return Err(FormulaError::CircularReference(format!(
                "{}!{}",
                worksheet.name(),
                CellAddress::new(row, col)
            )));
        }
        let result = self.evaluate_formula(text, sheet, row, col);
        self.in_progress.borrow_mut().remove(&key);

        let value = result?;
        self.memo.borrow_mut().insert(key, value.clone());
        Ok(value)
    }

    /// Evaluate formula text as if it were placed in the given cell
    pub fn evaluate_formula(
        &self,
        formula: &str,
        sheet: usize,
        row: u32,
        col: u16,
    ) -> FormulaResult<FormulaValue> {
        let ast = parse_formula(formula)?;
        let ctx = EvaluationContext {
            evaluator: self,
            current_sheet: sheet,
            current_row: row,
            current_col: col,
        };
        evaluate(&ast, &ctx)
    }

    fn sheet_index(&self, sheet: Option<&str>, current: usize) -> Option<usize> {
        match sheet {
            Some(name) => self.workbook.sheet_index(name),
            None => Some(current),
        }
    }

    /// The linked workbook a formula qualifier (`1` or `file.xlsx`) names
    fn external_file_name(&self, qualifier: &str) -> String {
        match qualifier.parse::<usize>() {
            Ok(pos) if pos >= 1 => self
                .workbook
                .external_links()
                .get(pos - 1)
                .map(|l| l.file_name.clone())
                .unwrap_or_else(|| qualifier.to_string()),
            _ => qualifier.to_string(),
        }
    }

    fn external_value(
        &self,
        qualifier: &str,
        sheet: &str,
        row: u32,
        col: u16,
    ) -> FormulaResult<FormulaValue> {
        let file_name = self.external_file_name(qualifier);
        if let Some(linked) = self.links.and_then(|l| l.workbook(&file_name)) {
            let Some(sheet_idx) = linked.sheet_index(sheet) else {
                return Ok(FormulaValue::Error(CellError::Ref));
            };
            return Evaluator::new(linked).evaluate_cell(sheet_idx, row, col);
        }
        if self.use_cached_links {
            if let Some(link) = self.workbook.resolve_external_link(qualifier) {
                log::debug!("using cached value of [{}]{}", link.file_name, sheet);
                return Ok(link
                    .cached_value(sheet, row, col)
                    .map(FormulaValue::from)
                    .unwrap_or(FormulaValue::Empty));
            }
        }
        Err(FormulaError::MissingWorkbook(file_name))
    }
}

/// Context for formula evaluation
pub struct EvaluationContext<'e, 'a> {
    evaluator: &'e Evaluator<'a>,
    /// Current worksheet index
    pub current_sheet: usize,
    /// Current cell row (for ROW())
    pub current_row: u32,
    /// Current cell column (for COLUMN())
    pub current_col: u16,
}

impl<'e, 'a> EvaluationContext<'e, 'a> {
    pub fn workbook(&self) -> &'a Workbook {
        self.evaluator.workbook
    }

    /// Whether dates use the 1904 system
    pub fn date_1904(&self) -> bool {
        self.evaluator.workbook.date_1904()
    }

    /// Get a cell value, evaluating formula cells
    pub fn get_cell_value(&self, cell_ref: &CellReference) -> FormulaResult<FormulaValue> {
        let (row, col) = (cell_ref.address.row, cell_ref.address.col);
        if let Some(book) = &cell_ref.workbook {
            let sheet = cell_ref.sheet.as_deref().unwrap_or_default();
            return self.evaluator.external_value(book, sheet, row, col);
        }
        match self
            .evaluator
            .sheet_index(cell_ref.sheet.as_deref(), self.current_sheet)
        {
            Some(sheet) => self.evaluator.evaluate_cell(sheet, row, col),
            None => Ok(FormulaValue::Error(CellError::Ref)),
        }
    }

    /// Get a range of cell values as an array
    pub fn get_range_values(&self, range_ref: &RangeReference) -> FormulaResult<FormulaValue> {
        let range = &range_ref.range;
        let mut rows = Vec::with_capacity(range.row_count() as usize);
        for row in range.start.row..=range.end.row {
            let mut cols = Vec::with_capacity(range.col_count() as usize);
            for col in range.start.col..=range.end.col {
                let cell = CellReference {
                    workbook: range_ref.workbook.clone(),
                    sheet: range_ref.sheet.clone(),
                    address: CellAddress::new(row, col),
                };
                cols.push(self.get_cell_value(&cell)?);
            }
            rows.push(cols);
        }
        Ok(FormulaValue::Array(rows))
    }
}

/// Evaluate a formula expression
pub fn evaluate(expr: &FormulaExpr, ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match expr {
        // === Literals ===
        FormulaExpr::Number(n) => Ok(FormulaValue::Number(*n)),
        FormulaExpr::String(s) => Ok(FormulaValue::String(s.clone())),
        FormulaExpr::Boolean(b) => Ok(FormulaValue::Boolean(*b)),
        FormulaExpr::Error(e) => Ok(FormulaValue::Error(*e)),

        // === References ===
        FormulaExpr::CellRef(cell_ref) => ctx.get_cell_value(cell_ref),
        FormulaExpr::RangeRef(range_ref) => ctx.get_range_values(range_ref),
        FormulaExpr::NameRef(_) => Ok(FormulaValue::Error(CellError::Name)),

        // === Operators ===
        FormulaExpr::BinaryOp { op, left, right } => evaluate_binary_op(*op, left, right, ctx),
        FormulaExpr::UnaryOp { op, operand } => evaluate_unary_op(*op, operand, ctx),
        FormulaExpr::Paren(inner) => evaluate(inner, ctx),

        // === Functions ===
        FormulaExpr::Function { name, args } => evaluate_function(name, args, ctx),

        // === Arrays ===
        FormulaExpr::Array(rows) => {
            let mut result_rows = Vec::with_capacity(rows.len());
            for row in rows {
                let mut result_row = Vec::with_capacity(row.len());
                for expr in row {
                    result_row.push(evaluate(expr, ctx)?);
                }
                result_rows.push(result_row);
            }
            Ok(FormulaValue::Array(result_rows))
        }
    }
}

/// Evaluate a binary operation
fn evaluate_binary_op(
    op: BinaryOperator,
    left: &FormulaExpr,
    right: &FormulaExpr,
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let left_val = evaluate(left, ctx)?;
    let right_val = evaluate(right, ctx)?;

    // Propagate errors
    if let Some(e) = left_val.get_error() {
        return Ok(FormulaValue::Error(e));
    }
    if let Some(e) = right_val.get_error() {
        return Ok(FormulaValue::Error(e));
    }

    let arithmetic = |f: fn(f64, f64) -> FormulaValue| -> FormulaValue {
        match (left_val.as_number(), right_val.as_number()) {
            (Some(l), Some(r)) => f(l, r),
            _ => FormulaValue::Error(CellError::Value),
        }
    };

    Ok(match op {
        BinaryOperator::Add => arithmetic(|l, r| FormulaValue::Number(l + r)),
        BinaryOperator::Subtract => arithmetic(|l, r| FormulaValue::Number(l - r)),
        BinaryOperator::Multiply => arithmetic(|l, r| FormulaValue::Number(l * r)),
        BinaryOperator::Divide => arithmetic(|l, r| {
            if r == 0.0 {
                FormulaValue::Error(CellError::Div0)
            } else {
                FormulaValue::Number(l / r)
            }
        }),
        BinaryOperator::Power => arithmetic(|l, r| {
            let result = l.powf(r);
            if result.is_finite() {
                FormulaValue::Number(result)
            } else {
                FormulaValue::Error(CellError::Num)
            }
        }),

        BinaryOperator::Equal => FormulaValue::Boolean(compare_values(&left_val, &right_val) == 0),
        BinaryOperator::NotEqual => {
            FormulaValue::Boolean(compare_values(&left_val, &right_val) != 0)
        }
        BinaryOperator::LessThan => {
            FormulaValue::Boolean(compare_values(&left_val, &right_val) < 0)
        }
        BinaryOperator::LessEqual => {
            FormulaValue::Boolean(compare_values(&left_val, &right_val) <= 0)
        }
        BinaryOperator::GreaterThan => {
            FormulaValue::Boolean(compare_values(&left_val, &right_val) > 0)
        }
        BinaryOperator::GreaterEqual => {
            FormulaValue::Boolean(compare_values(&left_val, &right_val) >= 0)
        }

        BinaryOperator::Concat => {
            FormulaValue::String(left_val.as_string() + &right_val.as_string())
        }

        // A range built from non-reference operands
        BinaryOperator::Range => FormulaValue::Error(CellError::Ref),
    })
}

/// Compare two values for ordering (Excel-style comparison)
pub(crate) fn compare_values(left: &FormulaValue, right: &FormulaValue) -> i32 {
    static ZERO: FormulaValue = FormulaValue::Number(0.0);
    let left = if *left == FormulaValue::Empty { &ZERO } else { left };
    let right = if *right == FormulaValue::Empty { &ZERO } else { right };

    match (left, right) {
        (FormulaValue::Number(l), FormulaValue::Number(r)) => {
            l.partial_cmp(r).map_or(0, |o| o as i32)
        }

        // Strings compare case-insensitively
        (FormulaValue::String(l), FormulaValue::String(r)) => {
            l.to_lowercase().cmp(&r.to_lowercase()) as i32
        }

        // Booleans: FALSE < TRUE
        (FormulaValue::Boolean(l), FormulaValue::Boolean(r)) => (*l as i32) - (*r as i32),

        // Mixed types: number < string < boolean
        (FormulaValue::Number(_), FormulaValue::String(_)) => -1,
        (FormulaValue::String(_), FormulaValue::Number(_)) => 1,
        (FormulaValue::Number(_), FormulaValue::Boolean(_)) => -1,
        (FormulaValue::Boolean(_), FormulaValue::Number(_)) => 1,
        (FormulaValue::String(_), FormulaValue::Boolean(_)) => -1,
        (FormulaValue::Boolean(_), FormulaValue::String(_)) => 1,

        (FormulaValue::Error(l), FormulaValue::Error(r)) => (l.code() as i32) - (r.code() as i32),

        _ => 0,
    }
}

/// Evaluate a unary operation
fn evaluate_unary_op(
    op: UnaryOperator,
    operand: &FormulaExpr,
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let val = evaluate(operand, ctx)?;

    if let Some(e) = val.get_error() {
        return Ok(FormulaValue::Error(e));
    }
    if op == UnaryOperator::Plus {
        return Ok(val);
    }

    let Some(n) = val.as_number() else {
        return Ok(FormulaValue::Error(CellError::Value));
    };
    Ok(match op {
        UnaryOperator::Negate => FormulaValue::Number(-n),
        UnaryOperator::Percent => FormulaValue::Number(n / 100.0),
        UnaryOperator::Plus => FormulaValue::Number(n),
    })
}

/// Evaluate a function call
fn evaluate_function(
    name: &str,
    args: &[FormulaExpr],
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let registry = get_function_registry();

    let Some(func) = registry.get(name) else {
        log::warn!("unsupported function {}", name);
        return Ok(FormulaValue::Error(CellError::Name));
    };

    if args.len() < func.min_args {
        return Err(FormulaError::ArgumentCount {
            function: name.to_string(),
            expected: format!("at least {}", func.min_args),
            actual: args.len(),
        });
    }

    if let Some(max) = func.max_args {
        if args.len() > max {
            return Err(FormulaError::ArgumentCount {
                function: name.to_string(),
                expected: format!("at most {}", max),
                actual: args.len(),
            });
        }
    }

    let mut evaluated_args = Vec::with_capacity(args.len());
    for arg in args {
        evaluated_args.push(evaluate(arg, ctx)?);
    }

    (func.implementation)(&evaluated_args, ctx)
}

/// Evaluate every formula in the workbook and store the results as the
/// formulas' cached values. Returns the number of formulas calculated.
///
/// Formulas whose linked workbook is missing keep their previous cached
/// value when `keep_cached_on_missing` is set; otherwise the error is returned.
pub fn calculate_workbook(
    workbook: &mut Workbook,
    links: Option<&dyn WorkbookSource>,
    keep_cached_on_missing: bool,
) -> FormulaResult<usize> {
    let mut results: Vec<(CellKey, CellValue)> = Vec::new();
    {
        let snapshot: &Workbook = workbook;
        let mut evaluator = Evaluator::new(snapshot).use_cached_links(keep_cached_on_missing);
        if let Some(links) = links {
            evaluator = evaluator.with_links(links);
        }
        for (sheet_idx, sheet) in snapshot.worksheets().enumerate() {
            for (row, col, cell) in sheet.iter_cells() {
                if !cell.value.is_formula() {
                    continue;
                }
                match evaluator.evaluate_cell(sheet_idx, row, col) {
                    Ok(value) => results.push(((sheet_idx, row, col), value.into())),
                    Err(FormulaError::MissingWorkbook(name)) if keep_cached_on_missing => {
                        log::warn!("linked workbook {} missing, keeping cached value", name);
                    }
                    Err(e @ FormulaError::MissingWorkbook(_)) | Err(e @ FormulaError::Parse(_)) => {
                        return Err(e)
                    }
                    Err(e) => {
                        log::warn!(
                            "formula in {}!{} not calculated: {}",
                            sheet.name(),
                            CellAddress::new(row, col),
                            e
                        );
                        results.push(((sheet_idx, row, col), CellValue::Error(CellError::Value)));
                    }
                }
            }
        }
    }

    let count = results.len();
    for ((sheet_idx, row, col), value) in results {
        let Some(cell) = workbook
            .worksheet_mut(sheet_idx)
            .and_then(|ws| ws.cell_at_mut(row, col))
        else {
            continue;
        };
        if let CellValue::Formula { cached, .. } = &mut cell.value {
            *cached = Some(Box::new(value));
        }
    }
    Ok(count)
}

/// Register every workbook named by an external reference as an
/// [`ExternalLink`] and cache the current values of the referenced cells,
/// so that readers without access to the linked files still see them.
///
/// Returns the number of links of the workbook afterwards.
pub fn register_external_links(
    workbook: &mut Workbook,
    links: Option<&dyn WorkbookSource>,
) -> FormulaResult<usize> {
    let mut referenced: Vec<(String, String, CellRange)> = Vec::new();
    for sheet in workbook.worksheets() {
        for (_, _, cell) in sheet.iter_cells() {
            let Some(text) = cell.value.formula_text() else {
                continue;
            };
            let ast = parse_formula(text)?;
            for (book, sheet_name, range) in ast.external_references() {
                referenced.push((book.to_string(), sheet_name.to_string(), range));
            }
        }
    }

    for (book, sheet_name, range) in referenced {
        let idx = match book.parse::<usize>() {
            Ok(pos) if pos >= 1 && pos <= workbook.external_links().len() => pos - 1,
            _ => workbook.add_external_link(ExternalLink::new(file_name_of(&book))),
        };
        let file_name = workbook.external_links()[idx].file_name.clone();
        let values: Vec<(u32, u16, CellValue)> = match links.and_then(|l| l.workbook(&file_name)) {
            Some(linked) => match linked.sheet_index(&sheet_name) {
                Some(sheet_idx) => {
                    let evaluator = Evaluator::new(linked);
                    range
                        .cells()
                        .map(|(row, col)| {
                            let value = evaluator
                                .evaluate_cell(sheet_idx, row, col)
                                .map(CellValue::from)
                                .unwrap_or(CellValue::Error(CellError::Value));
                            (row, col, value)
                        })
                        .collect()
                }
                None => Vec::new(),
            },
            None => Vec::new(),
        };

        let link = &mut workbook.external_links_mut()[idx];
        link.sheet_index_or_insert(&sheet_name);
        for (row, col, value) in values {
            if !value.is_empty() {
                link.set_cached_value(&sheet_name, row, col, value);
            }
        }
    }
    Ok(workbook.external_links().len())
}
