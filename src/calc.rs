//! Restricted arithmetic evaluator for the `/calc` command.
//!
//! Grammar:
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := factor (('*' | '/') factor)*
//! factor := ('+' | '-') factor | number | '(' expr ')'
//! number := digits ['.' digits] | '.' digits
//! ```
//!
//! Anything outside `[0-9\s+\-*/().]` is rejected before tokenizing.

use thiserror::Error;

const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("expression contains unsupported characters")]
    UnsafeCharacters,
    #[error("empty expression")]
    Empty,
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unexpected '{token}' at position {pos}")]
    UnexpectedToken { token: String, pos: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("division by zero")]
    DivisionByZero,
    #[error("expression is nested too deeply")]
    TooDeep,
    #[error("result is not a finite number")]
    NotFinite,
}

/// Whether `expr` only contains characters the calculator accepts.
pub fn is_safe(expr: &str) -> bool {
    !expr.is_empty()
        && expr
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_whitespace() || "+-*/().".contains(c))
}

/// Evaluate `expr` with standard precedence and real division.
pub fn evaluate(expr: &str) -> Result<f64, CalcError> {
    if expr.trim().is_empty() {
        return Err(CalcError::Empty);
    }
    if !is_safe(expr) {
        return Err(CalcError::UnsafeCharacters);
    }

    let tokens = tokenize(expr)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some((token, pos)) = parser.peek_with_pos() {
        return Err(CalcError::UnexpectedToken {
            token: token.to_string(),
            pos,
        });
    }
    if !value.is_finite() {
        return Err(CalcError::NotFinite);
    }
    Ok(value)
}

/// Integral results print without a fractional part (`13`, not `13.0`).
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", format_number(*n)),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

fn tokenize(expr: &str) -> Result<Vec<(Token, usize)>, CalcError> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let token = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::LParen,
            ')' => Token::RParen,
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value = parse_number(&literal)?;
                tokens.push((Token::Number(value), start));
                continue;
            }
            other => {
                return Err(CalcError::UnexpectedToken {
                    token: other.to_string(),
                    pos: i,
                })
            }
        };
        tokens.push((token, i));
        i += 1;
    }

    Ok(tokens)
}

fn parse_number(literal: &str) -> Result<f64, CalcError> {
    let dots = literal.matches('.').count();
    if dots > 1 || literal == "." {
        return Err(CalcError::InvalidNumber(literal.to_string()));
    }
    literal
        .parse::<f64>()
        .map_err(|_| CalcError::InvalidNumber(literal.to_string()))
}

struct Parser<'a> {
    tokens: &'a [(Token, usize)],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_with_pos(&self) -> Option<(&Token, usize)> {
        self.tokens.get(self.pos).map(|(t, p)| (t, *p))
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expr(&mut self) -> Result<f64, CalcError> {
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

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.factor()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.pos += 1;
                    value *= self.factor()?;
                }
                Token::Slash => {
                    self.pos += 1;
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err(CalcError::DivisionByZero);
                    }
                    value /= divisor;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64, CalcError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CalcError::TooDeep);
        }
        let result = self.factor_inner();
        self.depth -= 1;
        result
    }

    fn factor_inner(&mut self) -> Result<f64, CalcError> {
        match self.next() {
            Some((Token::Number(n), _)) => Ok(n),
            Some((Token::Plus, _)) => self.factor(),
            Some((Token::Minus, _)) => Ok(-self.factor()?),
            Some((Token::LParen, _)) => {
                let value = self.expr()?;
                match self.next() {
                    Some((Token::RParen, _)) => Ok(value),
                    Some((token, pos)) => Err(CalcError::UnexpectedToken {
                        token: token.to_string(),
                        pos,
                    }),
                    None => Err(CalcError::UnexpectedEnd),
                }
            }
            Some((token, pos)) => Err(CalcError::UnexpectedToken {
                token: token.to_string(),
                pos,
            }),
            None => Err(CalcError::UnexpectedEnd),
        }
    }
}
