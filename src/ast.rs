use crate::ops::OpCode;
use crate::value::CellValue;

/// A lexed token with its 0-based column in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub column: usize,
}

/// What the lexer recognized at a position.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Quoted string or numeric literal
    ///
    /// # Examples
    /// ```text
    /// 42
    /// 3.14
    /// 'low'
    /// ```
    Literal(CellValue),

    /// Identifier naming an externally bound variable
    ///
    /// # Examples
    /// ```text
    /// total
    /// col_9
    /// _tmp
    /// ```
    Variable(String),

    /// Operator or group marker from the catalog
    Op(OpCode),
}

impl TokenKind {
    /// Compact rendering used when a token stream is echoed back in a
    /// syntax diagnostic: `#14`, `'low'`, `$total`, `<add>`.
    pub fn repr(&self) -> String {
        match self {
            TokenKind::Literal(CellValue::Number(n)) => {
                format!("#{}", crate::float::format_double(*n))
            }
            TokenKind::Literal(CellValue::Text(s)) => format!("'{}'", s),
            TokenKind::Variable(name) => format!("${}", name),
            TokenKind::Op(code) => format!("<{}>", code.name()),
        }
    }
}

/// Resolution state of a variable's lookup slot.
///
/// The embedding application may stash a lookup index here on first
/// resolution (a column id, an interned symbol, ...) and reuse it on every
/// later read or write of the same node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Binding {
    #[default]
    Unbound,
    Cached(usize),
}

/// A variable occurrence in the tree: its name, the embedder's cached
/// lookup slot, and the value most recently supplied or assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct VarSlot {
    pub name: String,
    pub binding: Binding,
    pub value: CellValue,
}

impl VarSlot {
    pub fn new(name: String) -> Self {
        VarSlot {
            name,
            binding: Binding::Unbound,
            value: CellValue::default(),
        }
    }
}

/// A node of the compiled expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal value
    Literal(CellValue),

    /// Variable resolved through the symbol binding at evaluation time
    Variable(VarSlot),

    /// `!x` or `-x`
    Unary { op: OpCode, operand: Box<Node> },

    /// Arithmetic, comparison, logical, guard, or assignment operator
    Binary {
        op: OpCode,
        left: Box<Node>,
        right: Box<Node>,
    },

    /// `cond ? a : b`
    Ternary {
        cond: Box<Node>,
        then_branch: Box<Node>,
        else_branch: Box<Node>,
    },
}

impl Node {
    fn repr(&self) -> String {
        match self {
            Node::Literal(v) => TokenKind::Literal(v.clone()).repr(),
            Node::Variable(slot) => format!("${}", slot.name),
            Node::Unary { op, .. } => format!("<{}>", op.name()),
            Node::Binary { op, .. } => format!("<{}>", op.name()),
            Node::Ternary { .. } => "<if>".to_string(),
        }
    }

    /// Indented one-node-per-line rendering of the tree, for debugging and
    /// the command line `--tree` flag.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        out.push_str(&" ".repeat(depth * 4));
        out.push_str(&self.repr());
        out.push('\n');
        match self {
            Node::Literal(_) | Node::Variable(_) => {}
            Node::Unary { operand, .. } => operand.render_into(out, depth + 1),
            Node::Binary { left, right, .. } => {
                left.render_into(out, depth + 1);
                right.render_into(out, depth + 1);
            }
            Node::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                cond.render_into(out, depth + 1);
                then_branch.render_into(out, depth + 1);
                else_branch.render_into(out, depth + 1);
            }
        }
    }
}
