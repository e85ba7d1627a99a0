//! Built-in Excel functions

pub mod date;
pub mod info;
pub mod logical;
pub mod math;
pub mod text;

use std::collections::HashMap;

use hadoopoffice_core::CellError;

use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};

/// Function implementation signature
///
/// Functions can consult the evaluation context (date system, current
/// sheet/cell) to match Excel semantics.
pub type FunctionImpl = fn(&[FormulaValue], &EvaluationContext) -> FormulaResult<FormulaValue>;

/// Function definition
pub struct FunctionDef {
    /// Function name (uppercase)
    pub name: &'static str,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    /// Implementation
    pub implementation: FunctionImpl,
    /// Is volatile (recalculates every time)
    pub volatile: bool,
}

/// Function registry
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionDef>,
}

impl FunctionRegistry {
    /// Create a new registry with all built-in functions
    pub fn new() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
        };

        registry.register_math_functions();
        registry.register_logical_functions();
        registry.register_text_functions();
        registry.register_info_functions();
        registry.register_date_functions();

        registry
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(&name.to_uppercase())
    }

    /// Whether a function of this name is known
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Register a function
    pub fn register(&mut self, def: FunctionDef) {
        self.functions.insert(def.name.to_uppercase(), def);
    }

    fn add(
        &mut self,
        name: &'static str,
        min_args: usize,
        max_args: Option<usize>,
        implementation: FunctionImpl,
    ) {
        self.register(FunctionDef {
            name,
            min_args,
            max_args,
            implementation,
            volatile: false,
        });
    }

    fn register_math_functions(&mut self) {
        self.add("SUM", 1, None, math::fn_sum);
        self.add("PRODUCT", 1, None, math::fn_product);
        self.add("AVERAGE", 1, None, math::fn_average);
        self.add("MIN", 1, None, math::fn_min);
        self.add("MAX", 1, None, math::fn_max);
        self.add("COUNT", 1, None, math::fn_count);
        self.add("COUNTA", 1, None, math::fn_counta);
        self.add("ABS", 1, Some(1), math::fn_abs);
        self.add("INT", 1, Some(1), math::fn_int);
        self.add("SQRT", 1, Some(1), math::fn_sqrt);
        self.add("PI", 0, Some(0), math::fn_pi);
        self.add("MOD", 2, Some(2), math::fn_mod);
        self.add("POWER", 2, Some(2), math::fn_power);
        self.add("ROUND", 2, Some(2), math::fn_round);
        self.add("ROUNDUP", 2, Some(2), math::fn_roundup);
        self.add("ROUNDDOWN", 2, Some(2), math::fn_rounddown);
    }

    fn register_logical_functions(&mut self) {
        self.add("IF", 2, Some(3), logical::fn_if);
        self.add("AND", 1, None, logical::fn_and);
        self.add("OR", 1, None, logical::fn_or);
        self.add("NOT", 1, Some(1), logical::fn_not);
        self.add("IFERROR", 2, Some(2), logical::fn_iferror);
        self.add("TRUE", 0, Some(0), logical::fn_true);
        self.add("FALSE", 0, Some(0), logical::fn_false);
    }

    fn register_text_functions(&mut self) {
        self.add("CONCATENATE", 1, None, text::fn_concatenate);
        self.add("LEN", 1, Some(1), text::fn_len);
        self.add("LEFT", 1, Some(2), text::fn_left);
        self.add("RIGHT", 1, Some(2), text::fn_right);
        self.add("MID", 3, Some(3), text::fn_mid);
        self.add("UPPER", 1, Some(1), text::fn_upper);
        self.add("LOWER", 1, Some(1), text::fn_lower);
        self.add("TRIM", 1, Some(1), text::fn_trim);
        self.add("VALUE", 1, Some(1), text::fn_value);
    }

    fn register_info_functions(&mut self) {
        self.add("ISBLANK", 1, Some(1), info::fn_isblank);
        self.add("ISNUMBER", 1, Some(1), info::fn_isnumber);
        self.add("ISTEXT", 1, Some(1), info::fn_istext);
        self.add("ISERROR", 1, Some(1), info::fn_iserror);
        self.add("NA", 0, Some(0), info::fn_na);
        self.add("ROW", 0, Some(1), info::fn_row);
        self.add("COLUMN", 0, Some(1), info::fn_column);
    }

    fn register_date_functions(&mut self) {
        self.add("DATE", 3, Some(3), date::fn_date);
        self.add("YEAR", 1, Some(1), date::fn_year);
        self.add("MONTH", 1, Some(1), date::fn_month);
        self.add("DAY", 1, Some(1), date::fn_day);

        self.register(FunctionDef {
            name: "NOW",
            min_args: 0,
            max_args: Some(0),
            implementation: date::fn_now,
            volatile: true,
        });
        self.register(FunctionDef {
            name: "TODAY",
            min_args: 0,
            max_args: Some(0),
            implementation: date::fn_today,
            volatile: true,
        });
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static EMPTY: FormulaValue = FormulaValue::Empty;

/// Argument at `idx`, or an empty value when omitted
pub(crate) fn arg(args: &[FormulaValue], idx: usize) -> &FormulaValue {
    args.get(idx).unwrap_or(&EMPTY)
}

/// Numeric argument at `idx`. Errors pass through, text that is not a
/// number is `#VALUE!`.
pub(crate) fn number_arg(args: &[FormulaValue], idx: usize) -> Result<f64, CellError> {
    match arg(args, idx) {
        FormulaValue::Error(e) => Err(*e),
        FormulaValue::Array(_) => Err(CellError::Value),
        v => v.as_number().ok_or(CellError::Value),
    }
}
