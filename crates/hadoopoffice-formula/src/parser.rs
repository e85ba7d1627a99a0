//! Formula parser
//!
//! A recursive descent parser for Excel formulas with proper operator precedence.
//! References may be qualified by a sheet (`Sheet1!A1`, `'My Sheet'!A1`) and by
//! an external workbook (`[linked.xlsx]Sheet1!A1`, `[1]Sheet1!A1`).

use crate::ast::{BinaryOperator, CellReference, FormulaExpr, RangeReference, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use hadoopoffice_core::{CellAddress, CellError, CellRange};

/// Parse a formula string into an AST. The leading `=` is optional.
///
/// # Example
/// ```rust
/// use hadoopoffice_formula::parse_formula;
///
/// let ast = parse_formula("=1+2").unwrap();
/// let ast = parse_formula("A3+B3").unwrap();
/// let ast = parse_formula("[linked.xlsx]Sheet1!B1*2").unwrap();
/// ```
pub fn parse_formula(formula: &str) -> FormulaResult<FormulaExpr> {
    let formula = formula.trim();
    let formula = formula.strip_prefix('=').unwrap_or(formula);
    if formula.is_empty() {
        return Err(FormulaError::Parse("Empty formula".into()));
    }

    let mut parser = FormulaParser::new(formula);
    let expr = parser.parse_expression()?;

    if !matches!(parser.current_token(), Token::Eof) || !parser.is_at_end() {
        return Err(FormulaError::Parse(format!(
            "Unexpected characters after expression: '{}'",
            &parser.input[parser.token_start..]
        )));
    }

    Ok(expr)
}

/// Token types
#[derive(Debug, Clone, PartialEq)]
enum Token {
    // Literals
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),

    // Identifiers and references
    Identifier(String), // Function name or defined name
    CellRef(String),    // Cell reference like A1, $A$1
    SheetRef {
        workbook: Option<String>,
        sheet: String,
    },

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Percent,
    Ampersand,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Colon,
    Comma,
    Semicolon,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,

    Unknown(char),

    // End of input
    Eof,
}

/// Formula parser
struct FormulaParser<'a> {
    input: &'a str,
    pos: usize,
    token_start: usize,
    current_token: Option<Token>,
}

impl<'a> FormulaParser<'a> {
    fn new(input: &'a str) -> Self {
        let mut parser = Self {
            input,
            pos: 0,
            token_start: 0,
            current_token: None,
        };
        parser.advance_token();
        parser
    }

    // === Token scanning ===

    fn advance_token(&mut self) {
        self.skip_whitespace();
        self.token_start = self.pos;
        self.current_token = Some(self.scan_token());
    }

    fn scan_token(&mut self) -> Token {
        let Some(c) = self.peek_char() else {
            return Token::Eof;
        };

        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '^' => Some(Token::Caret),
            '%' => Some(Token::Percent),
            '&' => Some(Token::Ampersand),
            ':' => Some(Token::Colon),
            ',' => Some(Token::Comma),
            ';' => Some(Token::Semicolon),
            '(' => Some(Token::LeftParen),
            ')' => Some(Token::RightParen),
            '{' => Some(Token::LeftBrace),
            '}' => Some(Token::RightBrace),
            '=' => Some(Token::Equal),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return token;
        }

        // Two-character operators
        if c == '<' {
            self.advance();
            if self.peek_char() == Some('=') {
                self.advance();
                return Token::LessEqual;
            } else if self.peek_char() == Some('>') {
                self.advance();
                return Token::NotEqual;
            }
            return Token::LessThan;
        }

        if c == '>' {
            self.advance();
            if self.peek_char() == Some('=') {
                self.advance();
                return Token::GreaterEqual;
            }
            return Token::GreaterThan;
        }

        if c == '"' {
            return self.scan_string();
        }

        if c == '\'' {
            return self.scan_quoted_sheet();
        }

        if c == '[' {
            return self.scan_external_sheet();
        }

        if c.is_ascii_digit()
            || (c == '.' && self.peek_char_at(1).map_or(false, |c| c.is_ascii_digit()))
        {
            return self.scan_number();
        }

        // Identifier, cell reference, or boolean/error
        if c.is_alphabetic() || c == '_' || c == '$' || c == '#' || c == '\\' {
            return self.scan_identifier_or_ref();
        }

        self.advance();
        Token::Unknown(c)
    }

    fn scan_string(&mut self) -> Token {
        self.advance(); // Skip opening quote

        let mut s = String::new();
        while let Some(c) = self.peek_char() {
            if c == '"' {
                // Check for escaped quote ("")
                if self.peek_char_at(1) == Some('"') {
                    s.push('"');
                    self.advance();
                    self.advance();
                } else {
                    break;
                }
            } else {
                s.push(c);
                self.advance();
            }
        }

        // Skip closing quote
        if self.peek_char() == Some('"') {
            self.advance();
        }

        Token::String(s)
    }

    /// `'Sheet name'!` or `'[book.xlsx]Sheet name'!`
    fn scan_quoted_sheet(&mut self) -> Token {
        self.advance();
        let mut name = String::new();
        while let Some(c) = self.peek_char() {
            self.advance();
            if c == '\'' {
                if self.peek_char() == Some('\'') {
                    name.push('\'');
                    self.advance();
                    continue;
                }
                break;
            }
            name.push(c);
        }
        if self.peek_char() != Some('!') {
            return Token::Unknown('\'');
        }
        self.advance();
        match name.strip_prefix('[').and_then(|rest| rest.split_once(']')) {
            Some((book, sheet)) => Token::SheetRef {
                workbook: Some(book.to_string()),
                sheet: sheet.to_string(),
            },
            None => Token::SheetRef {
                workbook: None,
                sheet: name,
            },
        }
    }

    /// `[book.xlsx]Sheet1!` or `[1]Sheet1!`
    fn scan_external_sheet(&mut self) -> Token {
        self.advance();
        let start = self.pos;
        while self.peek_char().map_or(false, |c| c != ']') {
            self.advance();
        }
        let book = self.input[start..self.pos].to_string();
        if self.peek_char() != Some(']') {
            return Token::Unknown('[');
        }
        self.advance();
        let sheet_start = self.pos;
        while self
            .peek_char()
            .map_or(false, |c| c.is_alphanumeric() || c == '_' || c == '.')
        {
            self.advance();
        }
        let sheet = self.input[sheet_start..self.pos].to_string();
        if self.peek_char() != Some('!') || sheet.is_empty() {
            return Token::Unknown('[');
        }
        self.advance();
        Token::SheetRef {
            workbook: Some(book),
            sheet,
        }
    }

    fn scan_number(&mut self) -> Token {
        let start = self.pos;

        while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }

        if self.peek_char() == Some('.') {
            self.advance();
            while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        if self.peek_char().map_or(false, |c| c == 'e' || c == 'E')
            && self
                .peek_char_at(1)
                .map_or(false, |c| c.is_ascii_digit() || c == '+' || c == '-')
        {
            self.advance();
            if self.peek_char().map_or(false, |c| c == '+' || c == '-') {
                self.advance();
            }
            while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let num_str = &self.input[start..self.pos];
        match num_str.parse() {
            Ok(num) => Token::Number(num),
            Err(_) => Token::Unknown('0'),
        }
    }

    fn scan_identifier_or_ref(&mut self) -> Token {
        // Error values first (#VALUE!, #REF!, etc.)
        if self.peek_char() == Some('#') {
            let start = self.pos;
            self.advance();
            while self.peek_char().map_or(false, |c| {
                c.is_ascii_alphanumeric() || c == '!' || c == '/' || c == '?'
            }) {
                let c = self.peek_char();
                self.advance();
                if matches!(c, Some('!') | Some('?')) {
                    break;
                }
            }
            let error_str = &self.input[start..self.pos];
            if let Some(err) = CellError::parse(error_str) {
                return Token::Error(err);
            }
            return Token::Identifier(error_str.to_string());
        }

        let start = self.pos;
        while self.peek_char().map_or(false, |c| {
            c.is_alphanumeric() || c == '_' || c == '$' || c == '.' || c == '\\'
        }) {
            self.advance();
        }

        let text = &self.input[start..self.pos];

        if self.peek_char() == Some('!') {
            self.advance();
            return Token::SheetRef {
                workbook: None,
                sheet: text.to_string(),
            };
        }

        // TRUE/FALSE are literals unless called as functions
        let upper = text.to_uppercase();
        if upper == "TRUE" && self.peek_char() != Some('(') {
            return Token::Boolean(true);
        }
        if upper == "FALSE" && self.peek_char() != Some('(') {
            return Token::Boolean(false);
        }

        // LOG10(100) is a function call, not a cell reference
        if Self::is_cell_reference(text) && self.peek_char() != Some('(') {
            return Token::CellRef(text.to_string());
        }

        Token::Identifier(text.to_string())
    }

    fn is_cell_reference(text: &str) -> bool {
        // [$]letters[$]digits
        let bytes = text.as_bytes();
        let mut i = 0;
        if bytes.get(i) == Some(&b'$') {
            i += 1;
        }
        let letter_start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
            i += 1;
        }
        if i == letter_start || i - letter_start > 3 {
            return false;
        }
        if bytes.get(i) == Some(&b'$') {
            i += 1;
        }
        let digit_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i != digit_start && i == bytes.len()
    }

    // === Helper methods ===

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().map_or(false, |c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn current_token(&self) -> &Token {
        self.current_token.as_ref().unwrap_or(&Token::Eof)
    }

    fn consume(&mut self) -> Token {
        let token = self.current_token.take().unwrap_or(Token::Eof);
        self.advance_token();
        token
    }

    fn expect(&mut self, expected: &Token) -> FormulaResult<()> {
        if self.current_token() == expected {
            self.consume();
            Ok(())
        } else {
            Err(FormulaError::Parse(format!(
                "Expected {:?}, got {:?}",
                expected,
                self.current_token()
            )))
        }
    }

    // === Expression parsing with precedence ===
    // Precedence (lowest to highest):
    // 1. Comparison: =, <>, <, <=, >, >=
    // 2. Concatenation: &
    // 3. Addition/Subtraction: +, -
    // 4. Multiplication/Division: *, /
    // 5. Exponentiation: ^
    // 6. Unary: -, +, %
    // 7. Range: :
    // 8. Primary: literals, references, function calls, parentheses

    fn parse_expression(&mut self) -> FormulaResult<FormulaExpr> {
        self.parse_comparison()
    }

    fn binary(op: BinaryOperator, left: FormulaExpr, right: FormulaExpr) -> FormulaExpr {
        FormulaExpr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn parse_comparison(&mut self) -> FormulaResult<FormulaExpr> {
        let mut left = self.parse_concatenation()?;

        loop {
            let op = match self.current_token() {
                Token::Equal => BinaryOperator::Equal,
                Token::NotEqual => BinaryOperator::NotEqual,
                Token::LessThan => BinaryOperator::LessThan,
                Token::LessEqual => BinaryOperator::LessEqual,
                Token::GreaterThan => BinaryOperator::GreaterThan,
                Token::GreaterEqual => BinaryOperator::GreaterEqual,
                _ => break,
            };
            self.consume();
            let right = self.parse_concatenation()?;
            left = Self::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_concatenation(&mut self) -> FormulaResult<FormulaExpr> {
        let mut left = self.parse_additive()?;

        while matches!(self.current_token(), Token::Ampersand) {
            self.consume();
            let right = self.parse_additive()?;
            left = Self::binary(BinaryOperator::Concat, left, right);
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> FormulaResult<FormulaExpr> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.current_token() {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Subtract,
                _ => break,
            };
            self.consume();
            let right = self.parse_multiplicative()?;
            left = Self::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> FormulaResult<FormulaExpr> {
        let mut left = self.parse_exponent()?;

        loop {
            let op = match self.current_token() {
                Token::Star => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                _ => break,
            };
            self.consume();
            let right = self.parse_exponent()?;
            left = Self::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_exponent(&mut self) -> FormulaResult<FormulaExpr> {
        let mut left = self.parse_unary()?;

        // Excel evaluates ^ left to right
        while matches!(self.current_token(), Token::Caret) {
            self.consume();
            let right = self.parse_unary()?;
            left = Self::binary(BinaryOperator::Power, left, right);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> FormulaResult<FormulaExpr> {
        let prefix = match self.current_token() {
            Token::Minus => Some(UnaryOperator::Negate),
            Token::Plus => Some(UnaryOperator::Plus),
            _ => None,
        };
        if let Some(op) = prefix {
            self.consume();
            let operand = self.parse_unary()?;
            return Ok(FormulaExpr::UnaryOp {
                op,
                operand: Box::new(operand),
            });
        }

        let mut expr = self.parse_range()?;

        while matches!(self.current_token(), Token::Percent) {
            self.consume();
            expr = FormulaExpr::UnaryOp {
                op: UnaryOperator::Percent,
                operand: Box::new(expr),
            };
        }

        Ok(expr)
    }

    fn parse_range(&mut self) -> FormulaResult<FormulaExpr> {
        let left = self.parse_primary()?;

        if !matches!(self.current_token(), Token::Colon) {
            return Ok(left);
        }
        self.consume();
        let right = self.parse_primary()?;

        if let (FormulaExpr::CellRef(start_ref), FormulaExpr::CellRef(end_ref)) = (&left, &right) {
            // Sheet1!A1:B2 carries the qualifier on the first corner only
            if end_ref.sheet.is_some()
                && (end_ref.sheet != start_ref.sheet || end_ref.workbook != start_ref.workbook)
            {
                return Err(FormulaError::Parse(
                    "Range references must be on the same sheet".into(),
                ));
            }
            return Ok(FormulaExpr::RangeRef(RangeReference {
                workbook: start_ref.workbook.clone(),
                sheet: start_ref.sheet.clone(),
                range: CellRange::new(start_ref.address, end_ref.address),
            }));
        }

        Ok(Self::binary(BinaryOperator::Range, left, right))
    }

    fn parse_primary(&mut self) -> FormulaResult<FormulaExpr> {
        match self.current_token().clone() {
            Token::Number(n) => {
                self.consume();
                Ok(FormulaExpr::Number(n))
            }

            Token::String(s) => {
                self.consume();
                Ok(FormulaExpr::String(s))
            }

            Token::Boolean(b) => {
                self.consume();
                Ok(FormulaExpr::Boolean(b))
            }

            Token::Error(e) => {
                self.consume();
                Ok(FormulaExpr::Error(e))
            }

            Token::LeftParen => {
                self.consume();
                let expr = self.parse_expression()?;
                self.expect(&Token::RightParen)?;
                Ok(FormulaExpr::Paren(Box::new(expr)))
            }

            Token::LeftBrace => self.parse_array(),

            Token::SheetRef { workbook, sheet } => {
                self.consume();
                self.parse_sheet_reference(workbook, sheet)
            }

            Token::CellRef(ref_str) => {
                self.consume();
                Self::cell_reference(None, None, &ref_str)
            }

            Token::Identifier(name) => {
                self.consume();
                if matches!(self.current_token(), Token::LeftParen) {
                    self.parse_function_call(name)
                } else {
                    Ok(FormulaExpr::NameRef(name))
                }
            }

            other => Err(FormulaError::Parse(format!("Unexpected token: {:?}", other))),
        }
    }

    fn parse_array(&mut self) -> FormulaResult<FormulaExpr> {
        self.expect(&Token::LeftBrace)?;

        let mut rows = Vec::new();
        let mut current_row = Vec::new();

        if !matches!(self.current_token(), Token::RightBrace) {
            current_row.push(self.parse_expression()?);

            loop {
                match self.current_token() {
                    Token::Comma => {
                        self.consume();
                        current_row.push(self.parse_expression()?);
                    }
                    Token::Semicolon => {
                        self.consume();
                        rows.push(std::mem::take(&mut current_row));
                        current_row.push(self.parse_expression()?);
                    }
                    Token::RightBrace => break,
                    _ => {
                        return Err(FormulaError::Parse(
                            "Expected ',' ';' or '}' in array".into(),
                        ))
                    }
                }
            }
        }

        if !current_row.is_empty() {
            rows.push(current_row);
        }

        self.expect(&Token::RightBrace)?;
        Ok(FormulaExpr::Array(rows))
    }

    fn parse_function_call(&mut self, name: String) -> FormulaResult<FormulaExpr> {
        self.expect(&Token::LeftParen)?;

        let mut args = Vec::new();

        if !matches!(self.current_token(), Token::RightParen) {
            args.push(self.parse_expression()?);

            while matches!(self.current_token(), Token::Comma) {
                self.consume();
                args.push(self.parse_expression()?);
            }
        }

        self.expect(&Token::RightParen)?;

        Ok(FormulaExpr::Function {
            name: name.to_uppercase(),
            args,
        })
    }

    fn parse_sheet_reference(
        &mut self,
        workbook: Option<String>,
        sheet: String,
    ) -> FormulaResult<FormulaExpr> {
        match self.current_token().clone() {
            Token::CellRef(ref_str) => {
                self.consume();
                Self::cell_reference(workbook, Some(sheet), &ref_str)
            }
            other => Err(FormulaError::Parse(format!(
                "Expected cell reference after sheet name, got {:?}",
                other
            ))),
        }
    }

    fn cell_reference(
        workbook: Option<String>,
        sheet: Option<String>,
        ref_str: &str,
    ) -> FormulaResult<FormulaExpr> {
        let address = CellAddress::parse(ref_str).map_err(|e| {
            FormulaError::Parse(format!("Invalid cell reference '{}': {}", ref_str, e))
        })?;

        Ok(FormulaExpr::CellRef(CellReference {
            workbook,
            sheet,
            address,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_formula("=42").unwrap(), FormulaExpr::Number(42.0));
        assert_eq!(parse_formula("3.14").unwrap(), FormulaExpr::Number(3.14));
        assert_eq!(parse_formula("=1e10").unwrap(), FormulaExpr::Number(1e10));
    }

    #[test]
    fn test_parse_string() {
        let ast = parse_formula("=\"Hello \"\"World\"\"\"").unwrap();
        assert_eq!(ast, FormulaExpr::String("Hello \"World\"".into()));
    }

    #[test]
    fn test_parse_precedence() {
        let ast = parse_formula("=1+2*3").unwrap();
        if let FormulaExpr::BinaryOp { op, left, right } = ast {
            assert_eq!(op, BinaryOperator::Add);
            assert_eq!(*left, FormulaExpr::Number(1.0));
            assert!(matches!(
                *right,
                FormulaExpr::BinaryOp {
                    op: BinaryOperator::Multiply,
                    ..
                }
            ));
        } else {
            panic!("Expected BinaryOp");
        }
    }

    #[test]
    fn test_parse_cell_reference() {
        let ast = parse_formula("A3+B3").unwrap();
        assert_eq!(ast.to_string(), "A3+B3");

        let ast = parse_formula("=$B$2").unwrap();
        if let FormulaExpr::CellRef(cell_ref) = ast {
            assert_eq!((cell_ref.address.row, cell_ref.address.col), (1, 1));
            assert!(cell_ref.address.row_absolute);
        } else {
            panic!("Expected CellRef");
        }
    }

    #[test]
    fn test_parse_sheet_references() {
        let ast = parse_formula("=Sheet2!A1:B3").unwrap();
        match ast {
            FormulaExpr::RangeRef(r) => {
                assert_eq!(r.sheet.as_deref(), Some("Sheet2"));
                assert_eq!(r.range.end.row, 2);
            }
            other => panic!("Expected RangeRef, got {other:?}"),
        }

        let ast = parse_formula("='My Sheet'!C4").unwrap();
        assert_eq!(ast.to_string(), "'My Sheet'!C4");
    }

    #[test]
    fn test_parse_external_references() {
        let ast = parse_formula("[linked.xlsx]Sheet1!B1+1").unwrap();
        let FormulaExpr::BinaryOp { left, .. } = ast else {
            panic!("Expected BinaryOp");
        };
        match *left {
            FormulaExpr::CellRef(r) => {
                assert_eq!(r.workbook.as_deref(), Some("linked.xlsx"));
                assert_eq!(r.sheet.as_deref(), Some("Sheet1"));
            }
            other => panic!("Expected CellRef, got {other:?}"),
        }

        let ast = parse_formula("'[linked 2.xls]Sheet1'!A1").unwrap();
        assert!(matches!(ast, FormulaExpr::CellRef(ref r) if r.workbook.as_deref() == Some("linked 2.xls")));

        let ast = parse_formula("[1]Sheet1!A1").unwrap();
        assert!(matches!(ast, FormulaExpr::CellRef(ref r) if r.workbook.as_deref() == Some("1")));
    }

    #[test]
    fn test_parse_functions_and_errors() {
        let ast = parse_formula("=sum(A1:A3,#N/A)").unwrap();
        match ast {
            FormulaExpr::Function { name, args } => {
                assert_eq!(name, "SUM");
                assert_eq!(args[1], FormulaExpr::Error(CellError::Na));
            }
            other => panic!("Expected Function, got {other:?}"),
        }
        assert_eq!(parse_formula("=IF(A1>0,\"y\",(1+2))").unwrap().to_string(), "IF(A1>0,\"y\",(1+2))");
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_formula("").is_err());
        assert!(parse_formula("=1+").is_err());
        assert!(parse_formula("=SUM(1").is_err());
        assert!(parse_formula("=1 2").is_err());
    }
}
