use std::fmt;

use crate::ast::{Node, Token};
use crate::evaluator::{self, SymbolBinding};
use crate::lexer::{LexError, Lexer};
use crate::parser::{Parser, SyntaxError};
use crate::value::CellValue;

/// A compiled expression: the original text, the token buffer it lexed
/// into, and the tree the parser produced.
///
/// Compilation is all-or-nothing; a value of this type always holds an
/// evaluable tree. Evaluating is repeatable: variables are resolved freshly
/// through the binding on every call, so the same expression can run
/// against row after row.
///
/// # Examples
///
/// ```
/// use tabcalc::{CellValue, EnvBinding, Expression};
///
/// let mut expr = Expression::compile("(2 + 3) * 4").unwrap();
/// assert_eq!(expr.evaluate(&mut EnvBinding), CellValue::Number(20.0));
/// ```
#[derive(Debug)]
pub struct Expression {
    text: String,
    tokens: Vec<Token>,
    root: Node,
}

/// Why a compilation failed.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Tokenization error
    Lex(LexError),
    /// Parse error
    Syntax(SyntaxError),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Lex(e) => write!(f, "{}", e),
            CompileError::Syntax(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Lex(e) => Some(e),
            CompileError::Syntax(e) => Some(e),
        }
    }
}

impl From<LexError> for CompileError {
    fn from(e: LexError) -> Self {
        CompileError::Lex(e)
    }
}

impl From<SyntaxError> for CompileError {
    fn from(e: SyntaxError) -> Self {
        CompileError::Syntax(e)
    }
}

impl Expression {
    /// Tokenize and parse `text` into an evaluable expression.
    pub fn compile(text: &str) -> Result<Self, CompileError> {
        let tokens = Lexer::new(text).tokenize()?;
        let root = Parser::new(&tokens).parse()?;
        Ok(Expression {
            text: text.to_string(),
            tokens,
            root,
        })
    }

    /// Evaluate against a symbol binding, yielding the resulting value.
    pub fn evaluate(&mut self, binding: &mut dyn SymbolBinding) -> CellValue {
        evaluator::evaluate(&mut self.root, binding)
    }

    /// Evaluate and report only whether the result is true, the shape used
    /// when an expression filters rows.
    pub fn evaluate_is_true(&mut self, binding: &mut dyn SymbolBinding) -> bool {
        self.evaluate(binding).is_true()
    }

    /// The source text the expression was compiled from.
    pub fn source(&self) -> &str {
        &self.text
    }

    /// The lexed token buffer, in source order.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Indented rendering of the compiled tree.
    pub fn render_tree(&self) -> String {
        self.root.render_tree()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Compile and evaluate in one step, for one-shot callers.
pub fn compile_and_evaluate(
    text: &str,
    binding: &mut dyn SymbolBinding,
) -> Result<CellValue, CompileError> {
    let mut expr = Expression::compile(text)?;
    Ok(expr.evaluate(binding))
}
