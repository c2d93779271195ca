//! Arithmetic expression evaluator
//!
//! Recursive-descent parser over decimal literals, `+ - * / ^` (also `**`),
//! parentheses and unary sign. `^` binds tighter than unary minus and is
//! right-associative, so `-2^2` is `-4` and `2^3^2` is `512`.
//!
//! Input length and nesting depth are bounded: every `(`, unary sign and
//! exponent adds a level, and past [`MAX_DEPTH`] evaluation fails instead of
//! recursing further.

use serde_json::{json, Number, Value};

/// Longest expression accepted, in characters
pub const MAX_EXPRESSION_LEN: usize = 4096;

/// Deepest nesting of parentheses, signs and exponents
pub const MAX_DEPTH: usize = 256;

/// Structured evaluation failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalcError {
    #[error("Unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Unexpected input at position {pos}")]
    TrailingInput { pos: usize },

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Result is not a finite number")]
    NonFinite,

    #[error("Expression is {len} characters long, limit is {limit}")]
    TooLong { len: usize, limit: usize },

    #[error("Expression nests deeper than {limit} levels")]
    TooDeep { limit: usize },
}

/// Evaluate an expression to a finite `f64`
pub fn evaluate(expression: &str) -> Result<f64, CalcError> {
    let chars: Vec<char> = expression.chars().collect();
    if chars.len() > MAX_EXPRESSION_LEN {
        return Err(CalcError::TooLong {
            len: chars.len(),
            limit: MAX_EXPRESSION_LEN,
        });
    }

    let mut parser = Parser {
        chars,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    parser.skip_ws();
    if parser.pos < parser.chars.len() {
        return Err(match parser.chars[parser.pos] {
            ')' => CalcError::TrailingInput { pos: parser.pos },
            ch if ch.is_ascii_digit() || ch == '.' || ch == '(' => {
                CalcError::TrailingInput { pos: parser.pos }
            }
            ch => CalcError::UnexpectedChar { ch, pos: parser.pos },
        });
    }
    if !value.is_finite() {
        return Err(CalcError::NonFinite);
    }
    Ok(value)
}

/// JSON number for a result; integral values become integers
pub fn to_json_number(value: f64) -> Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if value.fract() == 0.0 && value.abs() < MAX_EXACT {
        json!(value as i64)
    } else {
        Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Run `f` one nesting level deeper
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, CalcError>) -> Result<T, CalcError> {
        if self.depth >= MAX_DEPTH {
            return Err(CalcError::TooDeep { limit: MAX_DEPTH });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn skip_ws(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.get(self.pos).copied()
    }

    fn peek_power(&mut self) -> bool {
        match self.peek() {
            Some('^') => {
                self.pos += 1;
                true
            }
            Some('*') if self.chars.get(self.pos + 1) == Some(&'*') => {
                self.pos += 2;
                true
            }
            _ => false,
        }
    }

    fn expr(&mut self) -> Result<f64, CalcError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some('+') => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some('-') => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some('*') if self.chars.get(self.pos + 1) != Some(&'*') => {
                    self.pos += 1;
                    value *= self.unary()?;
                }
                Some('/') => {
                    self.pos += 1;
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        return Err(CalcError::DivisionByZero);
                    }
                    value /= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    fn unary(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.nested(Self::unary)?)
            }
            Some('+') => {
                self.pos += 1;
                self.nested(Self::unary)
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.primary()?;
        if self.peek_power() {
            // Right operand re-enters unary so `2^-1` and `2^3^2` parse
            let exponent = self.nested(Self::unary)?;
            Ok(base.powf(exponent))
        } else {
            Ok(base)
        }
    }

    fn primary(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            None => Err(CalcError::UnexpectedEnd),
            Some('(') => {
                self.pos += 1;
                let value = self.nested(Self::expr)?;
                match self.peek() {
                    Some(')') => {
                        self.pos += 1;
                        Ok(value)
                    }
                    Some(ch) => Err(CalcError::UnexpectedChar { ch, pos: self.pos }),
                    None => Err(CalcError::UnexpectedEnd),
                }
            }
            Some(ch) if ch.is_ascii_digit() || ch == '.' => self.number(),
            Some(ch) => Err(CalcError::UnexpectedChar { ch, pos: self.pos }),
        }
    }

    fn number(&mut self) -> Result<f64, CalcError> {
        let start = self.pos;
        while self.pos < self.chars.len()
            && (self.chars[self.pos].is_ascii_digit() || self.chars[self.pos] == '.')
        {
            self.pos += 1;
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse::<f64>()
            .map_err(|_| CalcError::InvalidNumber(literal))
    }
}
