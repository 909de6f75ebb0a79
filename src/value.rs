use std::cmp::Ordering;
use std::fmt;

use crate::float::{format_double, parse_double};

/// Tolerance for treating a numeric value as true in boolean contexts.
pub const EPSILON: f64 = 1e-9;

/// A scalar cell value used throughout the expression language.
///
/// Every value is either a floating-point number or a text string; there is
/// no null. A text value reads as the number `0.0` wherever a numeric view is
/// required, which also makes it falsy in boolean contexts.
///
/// # Examples
///
/// ```
/// use tabcalc::CellValue;
///
/// let n = CellValue::Number(42.0);
/// let t = CellValue::Text("item9".to_string());
///
/// assert!(n.is_number());
/// assert_eq!(t.number(), 0.0);
/// assert!(!t.is_true());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Floating-point number
    Number(f64),

    /// UTF-8 text
    Text(String),
}

impl CellValue {
    /// Parse a value from raw text: if the whole input is a valid decimal
    /// number the result is numeric, otherwise the text is kept verbatim.
    ///
    /// # Examples
    ///
    /// ```
    /// use tabcalc::CellValue;
    ///
    /// assert_eq!(CellValue::from_auto("2.5"), CellValue::Number(2.5));
    /// assert_eq!(CellValue::from_auto("2.5kg"), CellValue::Text("2.5kg".to_string()));
    /// ```
    pub fn from_auto(text: &str) -> Self {
        let (value, consumed) = parse_double(text);
        if consumed > 0 && consumed == text.len() {
            CellValue::Number(value)
        } else {
            CellValue::Text(text.to_string())
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, CellValue::Number(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self, CellValue::Text(_))
    }

    /// Numeric view of the value; text reads as zero.
    pub fn number(&self) -> f64 {
        match self {
            CellValue::Number(n) => *n,
            CellValue::Text(_) => 0.0,
        }
    }

    /// Truthiness used by the boolean operators and conditionals.
    pub fn is_true(&self) -> bool {
        self.number().abs() > EPSILON
    }

    /// Textual view of the value; numbers are rendered compactly with
    /// eleven significant digits.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Number(n) => format_double(*n),
            CellValue::Text(s) => s.clone(),
        }
    }

    /// Total-order comparison.
    ///
    /// Numbers compare numerically, text compares in natural order (embedded
    /// digit runs by magnitude), and any text is greater than any number so
    /// that mixed collections still sort deterministically.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::cmp::Ordering;
    /// use tabcalc::CellValue;
    ///
    /// let a = CellValue::Text("item10".to_string());
    /// let b = CellValue::Text("item9".to_string());
    /// assert_eq!(a.compare(&b), Ordering::Greater);
    ///
    /// let t = CellValue::Text("a".to_string());
    /// let n = CellValue::Number(999999.0);
    /// assert_eq!(t.compare(&n), Ordering::Greater);
    /// ```
    pub fn compare(&self, other: &CellValue) -> Ordering {
        match (self, other) {
            (CellValue::Text(a), CellValue::Text(b)) => natural_compare(a, b),
            (CellValue::Text(_), CellValue::Number(_)) => Ordering::Greater,
            (CellValue::Number(_), CellValue::Text(_)) => Ordering::Less,
            (CellValue::Number(a), CellValue::Number(b)) => {
                // incomparable (NaN) counts as equal
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
        }
    }
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Number(0.0)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{}", format_double(*n)),
            CellValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Natural text ordering: characters compare bytewise, except that a digit
/// run in both strings at the same position compares as an unsigned integer
/// magnitude, so `"item10"` sorts after `"item9"`. A digit facing a non-digit
/// sorts first, and a string that ends first sorts first.
fn natural_compare(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);

    loop {
        let c1 = match a.get(i) {
            Some(c) => *c,
            None => {
                return if j < b.len() { Ordering::Less } else { Ordering::Equal };
            }
        };
        let c2 = match b.get(j) {
            Some(c) => *c,
            None => return Ordering::Greater,
        };

        match (c1.is_ascii_digit(), c2.is_ascii_digit()) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (true, true) => {
                let (u1, next_i) = scan_magnitude(a, i);
                let (u2, next_j) = scan_magnitude(b, j);
                if u1 != u2 {
                    return u1.cmp(&u2);
                }
                i = next_i;
                j = next_j;
            }
            (false, false) => {
                if c1 != c2 {
                    return c1.cmp(&c2);
                }
                i += 1;
                j += 1;
            }
        }
    }
}

/// Read a maximal digit run as an unsigned magnitude, saturating on overflow.
fn scan_magnitude(s: &[u8], mut i: usize) -> (u64, usize) {
    let mut value: u64 = 0;
    while let Some(c) = s.get(i) {
        if !c.is_ascii_digit() {
            break;
        }
        value = value.saturating_mul(10).saturating_add((c - b'0') as u64);
        i += 1;
    }
    (value, i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_truthiness() {
        assert!(CellValue::Number(1.0).is_true());
        assert!(CellValue::Number(-0.5).is_true());
        assert!(!CellValue::Number(0.0).is_true());
        assert!(!CellValue::Number(1e-12).is_true());
        assert!(!text("anything").is_true());
    }

    #[test]
    fn test_numeric_ordering() {
        let a = CellValue::Number(10.0);
        let b = CellValue::Number(9.0);
        assert_eq!(a.compare(&b), Ordering::Greater);
        assert_eq!(b.compare(&a), Ordering::Less);
        assert_eq!(a.compare(&a), Ordering::Equal);
    }

    #[test]
    fn test_text_beats_number() {
        assert_eq!(text("a").compare(&CellValue::Number(999999.0)), Ordering::Greater);
        assert_eq!(CellValue::Number(999999.0).compare(&text("a")), Ordering::Less);
    }

    #[test]
    fn test_natural_ordering() {
        assert_eq!(text("item10").compare(&text("item9")), Ordering::Greater);
        assert_eq!(text("item9").compare(&text("item10")), Ordering::Less);
        assert_eq!(text("item07").compare(&text("item7")), Ordering::Equal);
        assert_eq!(text("foo").compare(&text("foo3")), Ordering::Less);
        assert_eq!(text("a1b").compare(&text("a1c")), Ordering::Less);
    }

    #[test]
    fn test_digit_sorts_before_other_characters() {
        assert_eq!(text("a1").compare(&text("a!")), Ordering::Less);
        assert_eq!(text("x9").compare(&text("xa")), Ordering::Less);
    }

    #[test]
    fn test_from_auto() {
        assert_eq!(CellValue::from_auto("42"), CellValue::Number(42.0));
        assert_eq!(CellValue::from_auto("-1.5e3"), CellValue::Number(-1500.0));
        assert_eq!(CellValue::from_auto(""), text(""));
        assert_eq!(CellValue::from_auto("12 men"), text("12 men"));
    }
}
