/// Constrained arithmetic formulas.
///
/// Free-form calculated fields are arithmetic over record fields, e.g.
/// `time_spent / 3600000` or `(points * 2) + {Story Points}`. Only numbers,
/// field references, `+ - * /`, unary minus and parentheses are accepted;
/// there is no function call, comparison or string support.
///
/// Field references are bare identifiers (dotted paths allowed) or any text
/// wrapped in braces. Each reference is replaced by the record's numeric
/// value for that field.
use crate::fields::{coerce_number, get_path};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Why a formula could not be evaluated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    /// Unexpected character in the input
    #[error("unexpected character '{0}' at {1}")]
    UnexpectedChar(char, usize),

    /// The token stream does not form an expression
    #[error("malformed expression")]
    Malformed,

    /// A referenced field is missing or not numeric
    #[error("field '{0}' has no numeric value")]
    NonNumericField(String),

    /// The result is infinite or NaN (e.g. division by zero)
    #[error("result is not a finite number")]
    NonFinite,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Field(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' | '-' | '*' | '/' | '(' | ')' => {
                chars.next();
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '(' => Token::LParen,
                    _ => Token::RParen,
                });
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n = literal.parse().map_err(|_| FormulaError::Malformed)?;
                tokens.push(Token::Number(n));
            }
            '{' => {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, ch)) => name.push(ch),
                        None => return Err(FormulaError::Malformed),
                    }
                }
                tokens.push(Token::Field(name.trim().to_string()));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' || d == '.' {
                        name.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Field(name));
            }
            other => return Err(FormulaError::UnexpectedChar(other, pos)),
        }
    }
    Ok(tokens)
}

/// Recursive-descent evaluator over a token slice.
struct Evaluator<'a> {
    tokens: &'a [Token],
    pos: usize,
    record: &'a JsonValue,
}

impl Evaluator<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64, FormulaError> {
        let mut value = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Token::Minus => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> Result<f64, FormulaError> {
        let mut value = self.factor()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.pos += 1;
                    value *= self.factor()?;
                }
                Token::Slash => {
                    self.pos += 1;
                    value /= self.factor()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    // factor := number | field | '-' factor | '(' expr ')'
    fn factor(&mut self) -> Result<f64, FormulaError> {
        match self.next().cloned() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Field(name)) => get_path(self.record, &name)
                .and_then(coerce_number)
                .ok_or(FormulaError::NonNumericField(name)),
            Some(Token::Minus) => Ok(-self.factor()?),
            Some(Token::Plus) => self.factor(),
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(FormulaError::Malformed),
                }
            }
            _ => Err(FormulaError::Malformed),
        }
    }
}

/// Evaluate a formula against one record.
pub fn evaluate(formula: &str, record: &JsonValue) -> Result<f64, FormulaError> {
    let tokens = tokenize(formula)?;
    let mut evaluator = Evaluator {
        tokens: &tokens,
        pos: 0,
        record,
    };
    let value = evaluator.expr()?;
    if evaluator.pos != tokens.len() {
        return Err(FormulaError::Malformed);
    }
    if !value.is_finite() {
        return Err(FormulaError::NonFinite);
    }
    Ok(value)
}

/// Evaluate a formula, yielding `0` on any failure.
pub fn evaluate_or_zero(formula: &str, record: &JsonValue) -> f64 {
    evaluate(formula, record).unwrap_or_else(|e| {
        tracing::trace!(formula, error = %e, "formula evaluated to 0");
        0.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_precedence_and_parens() {
        let r = json!({});
        assert_eq!(evaluate("1 + 2 * 3", &r), Ok(7.0));
        assert_eq!(evaluate("(1 + 2) * 3", &r), Ok(9.0));
        assert_eq!(evaluate("10 / 4 - 1", &r), Ok(1.5));
        assert_eq!(evaluate("-(2 + 3)", &r), Ok(-5.0));
    }

    #[test]
    fn test_field_substitution() {
        let r = json!({"time_spent": "7200000", "points": 3, "meta": {"w": 2}, "Story Points": 5});
        assert_eq!(evaluate("time_spent / 3600000", &r), Ok(2.0));
        assert_eq!(evaluate("points * meta.w", &r), Ok(6.0));
        assert_eq!(evaluate("{Story Points} + 1", &r), Ok(6.0));
    }

    #[test]
    fn test_failures() {
        let r = json!({"name": "x", "zero": 0});
        assert_eq!(evaluate("name + 1", &r), Err(FormulaError::NonNumericField("name".into())));
        assert_eq!(evaluate("1 / zero", &r), Err(FormulaError::NonFinite));
        assert_eq!(evaluate("1 +", &r), Err(FormulaError::Malformed));
        assert_eq!(evaluate("(1", &r), Err(FormulaError::Malformed));
        assert_eq!(evaluate("1 2", &r), Err(FormulaError::Malformed));
        assert!(matches!(evaluate("alert(1); 2", &r), Err(_)));
        assert_eq!(evaluate("a; b", &r), Err(FormulaError::UnexpectedChar(';', 1)));
    }

    #[test]
    fn test_evaluate_or_zero() {
        assert_eq!(evaluate_or_zero("missing * 2", &json!({})), 0.0);
        assert_eq!(evaluate_or_zero("4 * 2", &json!({})), 8.0);
    }
}
