//! # hadoopoffice-formula
//!
//! Formula parser and evaluator for hadoopoffice workbooks.
//!
//! This crate provides:
//! - Formula parsing (text → AST, and AST → text)
//! - Formula evaluation against a [`hadoopoffice_core::Workbook`], including
//!   references into linked workbooks
//! - A small set of built-in Excel functions
//!
//! ## Example
//!
//! ```rust,ignore
//! use hadoopoffice_formula::Evaluator;
//!
//! let value = Evaluator::new(&workbook).evaluate_cell(0, 2, 0)?;
//! ```

pub mod ast;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod parser;

pub use ast::{BinaryOperator, CellReference, FormulaExpr, RangeReference, UnaryOperator};
pub use error::{FormulaError, FormulaResult};
pub use evaluator::{
    calculate_workbook, evaluate, register_external_links, EvaluationContext, Evaluator,
    FormulaValue, LinkedWorkbooks, WorkbookSource,
};
pub use functions::FunctionRegistry;
pub use parser::parse_formula;
