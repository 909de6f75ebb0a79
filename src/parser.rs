use std::fmt;

use crate::ast::{Node, Token, TokenKind, VarSlot};
use crate::ops::{Arity, OpCode};

/// A syntactic failure. The offending token is shown by re-rendering the
/// whole token stream with a caret underneath, mirroring the lexer's
/// caret-on-source display.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    /// The token stream rendered as `#1 <add> $x ...`
    pub rendered: String,
    /// Byte offset of the caret within `rendered`
    pub caret: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    /// A value was expected but an operator or the end of input was found
    ValueExpected,
    /// An operator was expected but a value was found
    OperatorExpected,
    /// `)` without a matching `(`
    UnmatchedParen,
    /// `(` never closed
    UnclosedParen,
    /// `?` without a matching `:`
    MissingElse,
    /// `:` without a pending `?`
    DanglingElse,
    /// An operator was reduced with too few operands (e.g. a trailing one)
    MissingOperand,
    /// Parser invariant breached; not a property of the input
    Internal,
}

impl SyntaxErrorKind {
    fn describe(self) -> &'static str {
        match self {
            SyntaxErrorKind::ValueExpected => "expected a value",
            SyntaxErrorKind::OperatorExpected => "expected an operator",
            SyntaxErrorKind::UnmatchedParen => "closing parenthesis without an open group",
            SyntaxErrorKind::UnclosedParen => "parenthesis never closed",
            SyntaxErrorKind::MissingElse => "conditional '?' without ':'",
            SyntaxErrorKind::DanglingElse => "':' without a preceding '?'",
            SyntaxErrorKind::MissingOperand => "operator is missing an operand",
            SyntaxErrorKind::Internal => "internal parser error",
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "syntax error: {}", self.kind.describe())?;
        writeln!(f, "{}", self.rendered)?;
        write!(f, "{}^", "-".repeat(self.caret))
    }
}

impl std::error::Error for SyntaxError {}

/// An operator waiting on the pending stack, remembering which token it came
/// from so errors can point back at it.
#[derive(Debug, Clone, Copy)]
struct PendingOp {
    code: OpCode,
    token: usize,
}

/// Operator-precedence parser over a lexed token buffer.
///
/// Runs two alternating states (expect-value, expect-operator) over the
/// token stream, keeping an operand stack of finished subtrees and a stack
/// of pending operators that are reduced by priority.
pub struct Parser<'a> {
    tokens: &'a [Token],
    position: usize,
    operands: Vec<Node>,
    operators: Vec<PendingOp>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Parser {
            tokens,
            position: 0,
            operands: Vec::new(),
            operators: Vec::new(),
        }
    }

    /// Parse the whole token buffer into a single expression tree.
    pub fn parse(mut self) -> Result<Node, SyntaxError> {
        loop {
            self.expect_value()?;
            if !self.expect_operator()? {
                break;
            }
        }

        while !self.operators.is_empty() {
            self.reduce()?;
        }

        match (self.operands.pop(), self.operands.is_empty()) {
            (Some(root), true) => Ok(root),
            _ => Err(self.error_at_end(SyntaxErrorKind::Internal)),
        }
    }

    fn next(&mut self) -> Option<(usize, &'a Token)> {
        let index = self.position;
        let token = self.tokens.get(index)?;
        self.position += 1;
        Some((index, token))
    }

    /// Expect-value state: literals and variables become operands; unary
    /// operators and `(` pile up on the operator stack and keep the state
    /// expecting a value. A leading binary `-` is reinterpreted as negation.
    fn expect_value(&mut self) -> Result<(), SyntaxError> {
        loop {
            let Some((index, token)) = self.next() else {
                return Err(self.error_at_end(SyntaxErrorKind::ValueExpected));
            };

            match &token.kind {
                TokenKind::Literal(value) => {
                    self.operands.push(Node::Literal(value.clone()));
                    return Ok(());
                }
                TokenKind::Variable(name) => {
                    self.operands.push(Node::Variable(VarSlot::new(name.clone())));
                    return Ok(());
                }
                TokenKind::Op(code) => {
                    let code = if *code == OpCode::Sub { OpCode::Neg } else { *code };
                    if code.arity() == Arity::Unary {
                        self.operators.push(PendingOp { code, token: index });
                    } else {
                        return Err(self.error_at(index, SyntaxErrorKind::ValueExpected));
                    }
                }
            }
        }
    }

    /// Expect-operator state. Returns false when the tokens are exhausted
    /// and the expression is complete up to the final reduction drain.
    fn expect_operator(&mut self) -> Result<bool, SyntaxError> {
        loop {
            let Some((index, token)) = self.next() else {
                return Ok(false);
            };

            let code = match &token.kind {
                TokenKind::Op(code) => *code,
                _ => return Err(self.error_at(index, SyntaxErrorKind::OperatorExpected)),
            };

            if code == OpCode::ParClose {
                // reduce back to the matching open marker and drop it,
                // then this state continues: ")" is not an operator itself
                loop {
                    match self.operators.last().map(|op| op.code) {
                        None => {
                            return Err(self.error_at(index, SyntaxErrorKind::UnmatchedParen));
                        }
                        Some(OpCode::ParOpen) => {
                            self.operators.pop();
                            break;
                        }
                        Some(_) => self.reduce()?,
                    }
                }
                continue;
            }

            match code.arity() {
                Arity::Binary | Arity::TernaryPart => {
                    while let Some(top) = self.operators.last().map(|op| op.code) {
                        if top.opri() >= code.ipri() {
                            self.reduce()?;
                        } else {
                            break;
                        }
                    }
                    self.operators.push(PendingOp { code, token: index });
                    return Ok(true);
                }
                Arity::Unary => {
                    return Err(self.error_at(index, SyntaxErrorKind::OperatorExpected));
                }
            }
        }
    }

    /// Pop the top pending operator, pop its operand(s), and push the
    /// resulting tree node back as an operand.
    fn reduce(&mut self) -> Result<(), SyntaxError> {
        let Some(op) = self.operators.pop() else {
            return Err(self.error_at_end(SyntaxErrorKind::Internal));
        };

        match op.code {
            OpCode::ParOpen => Err(self.error_at(op.token, SyntaxErrorKind::UnclosedParen)),
            OpCode::If => Err(self.error_at(op.token, SyntaxErrorKind::MissingElse)),
            OpCode::Else => self.reduce_ternary(op),
            code if code.arity() == Arity::Unary => {
                let operand = self.pop_operand(&op)?;
                self.operands.push(Node::Unary {
                    op: code,
                    operand: Box::new(operand),
                });
                Ok(())
            }
            code => {
                let right = self.pop_operand(&op)?;
                let left = self.pop_operand(&op)?;
                self.operands.push(Node::Binary {
                    op: code,
                    left: Box::new(left),
                    right: Box::new(right),
                });
                Ok(())
            }
        }
    }

    /// Assemble the conditional from its two markers.
    ///
    /// Reducing an `:` opens a chain of pending else-values. Walking down
    /// the operator stack, every further `:` adds its else-value to the
    /// chain and every `?` pairs off with the most recently added entry,
    /// forming one ternary node; the chain must drain completely before
    /// anything other than a ternary marker may surface.
    fn reduce_ternary(&mut self, first: PendingOp) -> Result<(), SyntaxError> {
        let value = self.pop_operand(&first)?;
        let mut pending: Vec<Node> = vec![value];
        let mut last_else = first;

        loop {
            let Some(op) = self.operators.pop() else {
                return Err(self.error_at(last_else.token, SyntaxErrorKind::DanglingElse));
            };

            match op.code {
                OpCode::Else => {
                    let value = self.pop_operand(&op)?;
                    pending.push(value);
                    last_else = op;
                }
                OpCode::If => {
                    let Some(else_branch) = pending.pop() else {
                        return Err(self.error_at(op.token, SyntaxErrorKind::Internal));
                    };
                    let then_branch = self.pop_operand(&op)?;
                    let cond = self.pop_operand(&op)?;
                    self.operands.push(Node::Ternary {
                        cond: Box::new(cond),
                        then_branch: Box::new(then_branch),
                        else_branch: Box::new(else_branch),
                    });
                    if pending.is_empty() {
                        return Ok(());
                    }
                }
                _ => {
                    return Err(self.error_at(last_else.token, SyntaxErrorKind::DanglingElse));
                }
            }
        }
    }

    fn pop_operand(&mut self, op: &PendingOp) -> Result<Node, SyntaxError> {
        self.operands
            .pop()
            .ok_or_else(|| self.error_at(op.token, SyntaxErrorKind::MissingOperand))
    }

    /// Render the token stream and place the caret under token `index`.
    fn error_at(&self, index: usize, kind: SyntaxErrorKind) -> SyntaxError {
        let (rendered, caret) = render_tokens(self.tokens, Some(index));
        SyntaxError {
            kind,
            rendered,
            caret,
        }
    }

    /// As `error_at`, with the caret just past the last token.
    fn error_at_end(&self, kind: SyntaxErrorKind) -> SyntaxError {
        let (rendered, caret) = render_tokens(self.tokens, None);
        SyntaxError {
            kind,
            rendered,
            caret,
        }
    }
}

fn render_tokens(tokens: &[Token], highlight: Option<usize>) -> (String, usize) {
    let mut rendered = String::new();
    let mut caret = None;

    for (i, token) in tokens.iter().enumerate() {
        if !rendered.is_empty() {
            rendered.push(' ');
        }
        if Some(i) == highlight {
            caret = Some(rendered.len());
        }
        rendered.push_str(&token.kind.repr());
    }

    // no highlight: the problem sits just past the last token
    let caret = caret.unwrap_or(rendered.len());
    (rendered, caret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::value::CellValue;

    fn parse(text: &str) -> Result<Node, SyntaxError> {
        let tokens = Lexer::new(text).tokenize().unwrap();
        Parser::new(&tokens).parse()
    }

    #[test]
    fn test_precedence_shape() {
        // 1 + 2 * 3 keeps the multiplication below the addition
        match parse("1 + 2 * 3").unwrap() {
            Node::Binary { op: OpCode::Add, right, .. } => {
                assert!(matches!(*right, Node::Binary { op: OpCode::Mul, .. }));
            }
            other => panic!("expected addition at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_parentheses_shape() {
        match parse("(1 + 2) * 3").unwrap() {
            Node::Binary { op: OpCode::Mul, left, .. } => {
                assert!(matches!(*left, Node::Binary { op: OpCode::Add, .. }));
            }
            other => panic!("expected multiplication at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_leading_minus_is_negation() {
        match parse("-x * 2").unwrap() {
            Node::Binary { op: OpCode::Mul, left, .. } => {
                assert!(matches!(*left, Node::Unary { op: OpCode::Neg, .. }));
            }
            other => panic!("expected multiplication at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_power_is_right_associative() {
        match parse("2 ^ 3 ^ 2").unwrap() {
            Node::Binary { op: OpCode::Pow, right, .. } => {
                assert!(matches!(*right, Node::Binary { op: OpCode::Pow, .. }));
            }
            other => panic!("expected power at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_assignment_binds_loosely() {
        match parse("x = 1 + 2").unwrap() {
            Node::Binary { op: OpCode::Set, left, right } => {
                assert!(matches!(*left, Node::Variable(_)));
                assert!(matches!(*right, Node::Binary { op: OpCode::Add, .. }));
            }
            other => panic!("expected assignment at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_ternary_shape() {
        match parse("a ? 1 : 2").unwrap() {
            Node::Ternary { cond, then_branch, else_branch } => {
                assert!(matches!(*cond, Node::Variable(_)));
                assert_eq!(*then_branch, Node::Literal(CellValue::Number(1.0)));
                assert_eq!(*else_branch, Node::Literal(CellValue::Number(2.0)));
            }
            other => panic!("expected a conditional at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_ternary_nests_to_the_right() {
        // a ? 1 : b ? 2 : 3  ==  a ? 1 : (b ? 2 : 3)
        match parse("a ? 1 : b ? 2 : 3").unwrap() {
            Node::Ternary { else_branch, .. } => {
                assert!(matches!(*else_branch, Node::Ternary { .. }));
            }
            other => panic!("expected a conditional at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_ternary_nests_in_then_branch() {
        // a ? b ? 1 : 2 : 3  pairs the inner '?' with the first ':'
        match parse("a ? b ? 1 : 2 : 3").unwrap() {
            Node::Ternary { then_branch, else_branch, .. } => {
                assert!(matches!(*then_branch, Node::Ternary { .. }));
                assert_eq!(*else_branch, Node::Literal(CellValue::Number(3.0)));
            }
            other => panic!("expected a conditional at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_else() {
        let err = parse("1 ? 2").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::MissingElse);
    }

    #[test]
    fn test_dangling_else() {
        let err = parse("1 : 2").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::DanglingElse);
    }

    #[test]
    fn test_unclosed_paren() {
        let err = parse("(1 + 2").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnclosedParen);
    }

    #[test]
    fn test_unmatched_close() {
        let err = parse("1 + 2)").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnmatchedParen);
    }

    #[test]
    fn test_two_values_in_a_row() {
        let err = parse("1 2").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::OperatorExpected);
        assert_eq!(err.rendered, "#1 #2");
        assert_eq!(err.caret, 3);
    }

    #[test]
    fn test_trailing_operator() {
        let err = parse("1 +").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::ValueExpected);
    }

    #[test]
    fn test_empty_input() {
        let err = parse("").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::ValueExpected);
    }

    #[test]
    fn test_operator_in_value_position() {
        let err = parse("* 2").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::ValueExpected);
        assert_eq!(err.caret, 0);
    }
}
