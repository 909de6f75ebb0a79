use std::env;

use log::{debug, warn};

use crate::ast::{Binding, Node, VarSlot};
use crate::ops::OpCode;
use crate::value::CellValue;

/// Resolves variable reads and persists variable writes for one embedding.
///
/// The evaluator owns no symbol table of its own: every variable occurrence
/// is handed to the binding, which writes the current value into the slot on
/// `get` and stores the slot's value under its name on `set`. Whatever
/// context the embedding needs (a table row, a map, ...) lives inside the
/// binding implementation. A binding may cache a lookup index in
/// [`VarSlot::binding`] on first resolution and short-cut later lookups of
/// the same node.
pub trait SymbolBinding {
    fn get(&mut self, var: &mut VarSlot);
    fn set(&mut self, var: &mut VarSlot);
}

/// Evaluate a compiled tree against a symbol binding.
///
/// Evaluation always produces a value: arithmetic reads text operands as
/// zero, division by (near-)zero yields the text `DIV0`, and the boolean
/// operators report 1 or 0. `&&`, `||`, the `#` guard, and the conditional
/// evaluate their lazy operands only when needed, so bindings are not
/// consulted for skipped subtrees.
pub fn evaluate(root: &mut Node, binding: &mut dyn SymbolBinding) -> CellValue {
    eval_node(root, binding)
}

fn bool_value(truth: bool) -> CellValue {
    CellValue::Number(if truth { 1.0 } else { 0.0 })
}

fn eval_node(node: &mut Node, binding: &mut dyn SymbolBinding) -> CellValue {
    match node {
        Node::Literal(value) => value.clone(),

        Node::Variable(slot) => {
            binding.get(slot);
            slot.value.clone()
        }

        Node::Unary { op, operand } => {
            let value = eval_node(operand, binding);
            match *op {
                OpCode::Not => bool_value(!value.is_true()),
                OpCode::Neg => CellValue::Number(-value.number()),
                other => {
                    warn!("unary evaluation of <{}>", other.name());
                    CellValue::default()
                }
            }
        }

        Node::Binary { op, left, right } => match *op {
            OpCode::And => {
                if !eval_node(left, binding).is_true() {
                    bool_value(false)
                } else {
                    bool_value(eval_node(right, binding).is_true())
                }
            }

            OpCode::Or => {
                if eval_node(left, binding).is_true() {
                    bool_value(true)
                } else {
                    bool_value(eval_node(right, binding).is_true())
                }
            }

            // guard: the right side only runs when the condition holds
            OpCode::Opt => {
                if eval_node(left, binding).is_true() {
                    eval_node(right, binding)
                } else {
                    CellValue::Number(0.0)
                }
            }

            OpCode::Set => {
                let value = eval_node(right, binding);
                match left.as_mut() {
                    Node::Variable(slot) => {
                        slot.value = value.clone();
                        binding.set(slot);
                        value
                    }
                    _ => {
                        warn!("assignment target is not a variable");
                        CellValue::default()
                    }
                }
            }

            OpCode::Div => {
                let numerator = eval_node(left, binding).number();
                let divisor = eval_node(right, binding).number();
                if divisor.abs() > f64::MIN_POSITIVE {
                    CellValue::Number(numerator / divisor)
                } else {
                    CellValue::Text("DIV0".to_string())
                }
            }

            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Mod | OpCode::Pow => {
                let a = eval_node(left, binding).number();
                let b = eval_node(right, binding).number();
                CellValue::Number(match *op {
                    OpCode::Add => a + b,
                    OpCode::Sub => a - b,
                    OpCode::Mul => a * b,
                    OpCode::Mod => a % b,
                    _ => a.powf(b),
                })
            }

            OpCode::Eq | OpCode::Ne | OpCode::Lt | OpCode::Gt | OpCode::Le | OpCode::Ge => {
                let a = eval_node(left, binding);
                let b = eval_node(right, binding);
                let ord = a.compare(&b);
                bool_value(match *op {
                    OpCode::Eq => ord == std::cmp::Ordering::Equal,
                    OpCode::Ne => ord != std::cmp::Ordering::Equal,
                    OpCode::Lt => ord == std::cmp::Ordering::Less,
                    OpCode::Gt => ord == std::cmp::Ordering::Greater,
                    OpCode::Le => ord != std::cmp::Ordering::Greater,
                    _ => ord != std::cmp::Ordering::Less,
                })
            }

            other => {
                warn!("binary evaluation of <{}>", other.name());
                CellValue::default()
            }
        },

        Node::Ternary {
            cond,
            then_branch,
            else_branch,
        } => {
            if eval_node(cond, binding).is_true() {
                eval_node(then_branch, binding)
            } else {
                eval_node(else_branch, binding)
            }
        }
    }
}

/// Standalone fallback binding against the process environment.
///
/// Reads parse the environment text as a cell value (numeric when the whole
/// text is a number); an unset variable reads as 0. Writes store the value's
/// textual form back into the environment.
pub struct EnvBinding;

impl SymbolBinding for EnvBinding {
    fn get(&mut self, var: &mut VarSlot) {
        let value = match env::var(&var.name) {
            Ok(text) => CellValue::from_auto(&text),
            Err(_) => CellValue::Number(0.0),
        };
        debug!("getenv '{}' -> {}", var.name, value);
        var.value = value;
    }

    fn set(&mut self, var: &mut VarSlot) {
        let text = var.value.as_text();
        debug!("setenv '{}' <- '{}'", var.name, text);
        // mutating the environment is process-global; this standalone
        // binding assumes the single-threaded embedding the core requires
        unsafe { env::set_var(&var.name, &text) };
    }
}

/// In-memory binding over named entries; the go-to binding for tests and
/// the command line.
///
/// Unknown names are created on first touch with value 0, and the entry
/// index is cached in the variable's slot so repeated reads of the same
/// node skip the name search, the same scheme a table embedding uses with
/// column ids.
///
/// # Examples
///
/// ```
/// use tabcalc::{CellValue, Expression, MapBinding};
///
/// let mut vars = MapBinding::new();
/// vars.define("price", CellValue::Number(12.5));
/// vars.define("qty", CellValue::Number(4.0));
///
/// let mut expr = Expression::compile("total = price * qty").unwrap();
/// assert_eq!(expr.evaluate(&mut vars), CellValue::Number(50.0));
/// assert_eq!(vars.value_of("total"), Some(&CellValue::Number(50.0)));
/// ```
#[derive(Debug, Default)]
pub struct MapBinding {
    entries: Vec<(String, CellValue)>,
}

impl MapBinding {
    pub fn new() -> Self {
        MapBinding::default()
    }

    /// Set a variable, creating it if needed.
    pub fn define(&mut self, name: &str, value: CellValue) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    /// Current value of a variable, if it exists.
    pub fn value_of(&self, name: &str) -> Option<&CellValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Entry index for a slot, honoring and refreshing its cached binding.
    fn slot_index(&mut self, var: &mut VarSlot) -> usize {
        if let Binding::Cached(index) = var.binding {
            if self.entries.get(index).is_some_and(|(n, _)| *n == var.name) {
                return index;
            }
        }
        let index = match self.entries.iter().position(|(n, _)| *n == var.name) {
            Some(index) => index,
            None => {
                self.entries.push((var.name.clone(), CellValue::default()));
                self.entries.len() - 1
            }
        };
        var.binding = Binding::Cached(index);
        index
    }
}

impl SymbolBinding for MapBinding {
    fn get(&mut self, var: &mut VarSlot) {
        let index = self.slot_index(var);
        var.value = self.entries[index].1.clone();
    }

    fn set(&mut self, var: &mut VarSlot) {
        let index = self.slot_index(var);
        self.entries[index].1 = var.value.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    /// Binding that counts how often it is consulted.
    struct CountingBinding {
        gets: usize,
        sets: usize,
    }

    impl SymbolBinding for CountingBinding {
        fn get(&mut self, var: &mut VarSlot) {
            self.gets += 1;
            var.value = CellValue::Number(7.0);
        }

        fn set(&mut self, _var: &mut VarSlot) {
            self.sets += 1;
        }
    }

    fn tree(text: &str) -> Node {
        let tokens = Lexer::new(text).tokenize().unwrap();
        Parser::new(&tokens).parse().unwrap()
    }

    #[test]
    fn test_short_circuit_skips_binding() {
        let mut binding = CountingBinding { gets: 0, sets: 0 };

        let mut and_tree = tree("0 && x");
        assert_eq!(evaluate(&mut and_tree, &mut binding), CellValue::Number(0.0));
        assert_eq!(binding.gets, 0);

        let mut or_tree = tree("1 || x");
        assert_eq!(evaluate(&mut or_tree, &mut binding), CellValue::Number(1.0));
        assert_eq!(binding.gets, 0);
        assert_eq!(binding.sets, 0);
    }

    #[test]
    fn test_guard_right_side_is_lazy() {
        let mut binding = CountingBinding { gets: 0, sets: 0 };

        let mut skipped = tree("0 # (x = 5)");
        assert_eq!(evaluate(&mut skipped, &mut binding), CellValue::Number(0.0));
        assert_eq!(binding.sets, 0);

        let mut taken = tree("1 # (x = 5)");
        assert_eq!(evaluate(&mut taken, &mut binding), CellValue::Number(5.0));
        assert_eq!(binding.sets, 1);
    }

    #[test]
    fn test_ternary_evaluates_one_branch() {
        let mut binding = CountingBinding { gets: 0, sets: 0 };
        let mut t = tree("1 ? 10 : x");
        assert_eq!(evaluate(&mut t, &mut binding), CellValue::Number(10.0));
        assert_eq!(binding.gets, 0);
    }

    #[test]
    fn test_map_binding_caches_slot() {
        let mut vars = MapBinding::new();
        vars.define("x", CellValue::Number(3.0));

        let mut t = tree("x + 1");
        assert_eq!(evaluate(&mut t, &mut vars), CellValue::Number(4.0));

        // the variable node now carries the entry index
        fn find_slot(node: &Node) -> Option<&VarSlot> {
            match node {
                Node::Variable(slot) => Some(slot),
                Node::Binary { left, right, .. } => {
                    find_slot(left).or_else(|| find_slot(right))
                }
                _ => None,
            }
        }
        let slot = find_slot(&t).unwrap();
        assert_eq!(slot.binding, Binding::Cached(0));
    }

    #[test]
    fn test_assignment_creates_entry() {
        let mut vars = MapBinding::new();
        let mut t = tree("fresh = 2 + 2");
        assert_eq!(evaluate(&mut t, &mut vars), CellValue::Number(4.0));
        assert_eq!(vars.value_of("fresh"), Some(&CellValue::Number(4.0)));
    }
}
