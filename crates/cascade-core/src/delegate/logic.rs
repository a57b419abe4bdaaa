//! Restricted boolean expressions over run-condition indices.
//!
//! `condition_logic` combines the positional results of a delegation's
//! `run_conditions`, e.g. `"0 and (1 or 2)"`. The language is exactly:
//! decimal indices, `and`, `or`, `not`, and parentheses. Anything else —
//! including an index with no corresponding condition — is a validation
//! error. There is no fallback to a general-purpose evaluator.

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Index(usize),
    And,
    Or,
    Not,
    Open,
    Close,
}

#[derive(Debug, Clone)]
enum Expr {
    Index(usize),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// Parses `expr` and checks every index falls inside `0..condition_count`.
pub fn validate(expr: &str, condition_count: usize) -> Result<()> {
    let parsed = parse(expr)?;
    check_indices(&parsed, condition_count)
}

/// Evaluates `expr` against the positional condition results.
pub fn evaluate(expr: &str, values: &[bool]) -> Result<bool> {
    let parsed = parse(expr)?;
    check_indices(&parsed, values.len())?;
    Ok(eval(&parsed, values))
}

fn tokenize(expr: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();
    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '0'..='9' => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let index = digits.parse().map_err(|_| bad_token(&digits))?;
                tokens.push(Token::Index(index));
            }
            'a'..='z' => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_lowercase() {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => return Err(bad_token(&word)),
                });
            }
            _ => return Err(bad_token(&ch.to_string())),
        }
    }
    Ok(tokens)
}

fn bad_token(token: &str) -> EngineError {
    EngineError::validation(format!(
        "condition_logic token '{}' is not an index, 'and', 'or', 'not', or parenthesis",
        token
    ))
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    // or_expr := and_expr ("or" and_expr)*
    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // and_expr := unary ("and" unary)*
    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // unary := "not" unary | atom
    fn unary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.atom()
    }

    // atom := INDEX | "(" or_expr ")"
    fn atom(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Index(i)) => Ok(Expr::Index(i)),
            Some(Token::Open) => {
                let inner = self.or_expr()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(EngineError::validation(
                        "condition_logic has an unclosed parenthesis",
                    )),
                }
            }
            other => Err(EngineError::validation(format!(
                "condition_logic expected an index or '(', found {:?}",
                other
            ))),
        }
    }
}

fn parse(expr: &str) -> Result<Expr> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err(EngineError::validation("condition_logic is empty"));
    }
    let mut parser = Parser {
        tokens,
        position: 0,
    };
    let parsed = parser.or_expr()?;
    if parser.position != parser.tokens.len() {
        return Err(EngineError::validation(format!(
            "condition_logic has trailing tokens after position {}",
            parser.position
        )));
    }
    Ok(parsed)
}

fn check_indices(expr: &Expr, count: usize) -> Result<()> {
    match expr {
        Expr::Index(i) => {
            if *i >= count {
                Err(EngineError::validation(format!(
                    "condition_logic references index {} but only {} run_conditions are declared",
                    i, count
                )))
            } else {
                Ok(())
            }
        }
        Expr::Not(inner) => check_indices(inner, count),
        Expr::And(a, b) | Expr::Or(a, b) => {
            check_indices(a, count)?;
            check_indices(b, count)
        }
    }
}

fn eval(expr: &Expr, values: &[bool]) -> bool {
    match expr {
        Expr::Index(i) => values[*i],
        Expr::Not(inner) => !eval(inner, values),
        Expr::And(a, b) => eval(a, values) && eval(b, values),
        Expr::Or(a, b) => eval(a, values) || eval(b, values),
    }
}
