//! Arithmetic formulas for user-defined data columns
//!
//! Supports `+ - * / ^`, unary minus, parentheses, numeric literals,
//! identifiers and the functions `sin cos tan sqrt abs exp ln`.

use thiserror::Error;

/// Errors raised while parsing or evaluating a formula
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),

    #[error("unexpected end of formula")]
    UnexpectedEnd,

    #[error("unexpected '{0}'")]
    UnexpectedToken(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Ident(name) => write!(f, "{}", name),
            Token::Op(op) => write!(f, "{}", op),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Sin,
    Cos,
    Tan,
    Sqrt,
    Abs,
    Exp,
    Ln,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "sin" => Some(Function::Sin),
            "cos" => Some(Function::Cos),
            "tan" => Some(Function::Tan),
            "sqrt" => Some(Function::Sqrt),
            "abs" => Some(Function::Abs),
            "exp" => Some(Function::Exp),
            "ln" => Some(Function::Ln),
            _ => None,
        }
    }

    fn apply(self, x: f64) -> f64 {
        match self {
            Function::Sin => x.sin(),
            Function::Cos => x.cos(),
            Function::Tan => x.tan(),
            Function::Sqrt => x.sqrt(),
            Function::Abs => x.abs(),
            Function::Exp => x.exp(),
            Function::Ln => x.ln(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Var(String),
    Neg(Box<Expr>),
    Binary(char, Box<Expr>, Box<Expr>),
    Call(Function, Box<Expr>),
}

impl Expr {
    fn eval<F>(&self, lookup: &F) -> Result<f64, FormulaError>
    where
        F: Fn(&str) -> Option<f64>,
    {
        Ok(match self {
            Expr::Number(n) => *n,
            Expr::Var(name) => lookup(name).ok_or_else(|| FormulaError::UnknownVariable(name.clone()))?,
            Expr::Neg(inner) => -inner.eval(lookup)?,
            Expr::Call(function, arg) => function.apply(arg.eval(lookup)?),
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.eval(lookup)?;
                let b = rhs.eval(lookup)?;
                match op {
                    '+' => a + b,
                    '-' => a - b,
                    '*' => a * b,
                    '/' => a / b,
                    _ => a.powf(b),
                }
            }
        })
    }

    fn collect_vars<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Number(_) => {}
            Expr::Var(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Neg(inner) | Expr::Call(_, inner) => inner.collect_vars(out),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_vars(out);
                rhs.collect_vars(out);
            }
        }
    }
}

/// A parsed formula
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expression()?;
        if let Some(token) = parser.peek() {
            return Err(FormulaError::UnexpectedToken(token.to_string()));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Identifiers the formula refers to, in order of first use
    pub fn variables(&self) -> Vec<&str> {
        let mut vars = Vec::new();
        self.expr.collect_vars(&mut vars);
        vars
    }

    /// Evaluate with identifiers resolved by `lookup`
    pub fn eval<F>(&self, lookup: F) -> Result<f64, FormulaError>
    where
        F: Fn(&str) -> Option<f64>,
    {
        self.expr.eval(&lookup)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn tokenize(source: &str) -> Result<Vec<Token>, FormulaError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // exponent: 1e-3, 2.5E4
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| FormulaError::UnexpectedToken(text.clone()))?;
            tokens.push(Token::Number(value));
        } else if is_ident_start(c) {
            let start = i;
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            let token = match c {
                '+' | '-' | '*' | '/' | '^' => Token::Op(c),
                '(' => Token::LParen,
                ')' => Token::RParen,
                _ => return Err(FormulaError::UnexpectedChar(c, i)),
            };
            tokens.push(token);
            i += 1;
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_op(&mut self, ops: &[char]) -> Option<char> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    // expression := term (('+' | '-') term)*
    fn expression(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        while let Some(op) = self.eat_op(&['+', '-']) {
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // term := unary (('*' | '/') unary)*
    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&['*', '/']) {
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // unary := '-' unary | power
    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if self.eat_op(&['-']).is_some() {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.power()
    }

    // power := primary ('^' unary)?, right associative
    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.primary()?;
        if self.eat_op(&['^']).is_some() {
            let exponent = self.unary()?;
            return Ok(Expr::Binary('^', Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    let function =
                        Function::from_name(&name).ok_or_else(|| FormulaError::UnknownFunction(name.clone()))?;
                    self.pos += 1;
                    let arg = self.expression()?;
                    self.expect_rparen()?;
                    Ok(Expr::Call(function, Box::new(arg)))
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect_rparen()?;
                Ok(inner)
            }
            Some(token) => Err(FormulaError::UnexpectedToken(token.to_string())),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    fn expect_rparen(&mut self) -> Result<(), FormulaError> {
        match self.next() {
            Some(Token::RParen) => Ok(()),
            Some(token) => Err(FormulaError::UnexpectedToken(token.to_string())),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> f64 {
        Formula::parse(source)
            .unwrap()
            .eval(|name| match name {
                "x" => Some(3.0),
                "v_x" => Some(-2.0),
                "m" => Some(0.5),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3"), 7.0);
        assert_eq!(eval("(1 + 2) * 3"), 9.0);
        assert_eq!(eval("2 ^ 3 ^ 2"), 512.0);
        assert_eq!(eval("-2 ^ 2"), -4.0);
        assert_eq!(eval("10 / 4 - 1"), 1.5);
        assert_eq!(eval("1.5e2"), 150.0);
    }

    #[test]
    fn test_variables_and_functions() {
        assert_eq!(eval("m * v_x ^ 2 / 2"), 1.0);
        assert_eq!(eval("abs(v_x) + sqrt(x * 3)"), 5.0);
        assert_eq!(eval("ln(exp(0)) + x"), 3.0);

        let formula = Formula::parse("x * x + m").unwrap();
        assert_eq!(formula.variables(), vec!["x", "m"]);
        assert_eq!(formula.source(), "x * x + m");
    }

    #[test]
    fn test_errors() {
        assert_eq!(Formula::parse("1 +"), Err(FormulaError::UnexpectedEnd));
        assert_eq!(Formula::parse("2 $ 3"), Err(FormulaError::UnexpectedChar('$', 2)));
        assert_eq!(
            Formula::parse("foo(1)"),
            Err(FormulaError::UnknownFunction("foo".to_string()))
        );
        assert!(matches!(Formula::parse("(1 + 2"), Err(FormulaError::UnexpectedEnd)));
        assert!(matches!(Formula::parse("1 2"), Err(FormulaError::UnexpectedToken(_))));

        let formula = Formula::parse("y + 1").unwrap();
        assert_eq!(
            formula.eval(|_| None),
            Err(FormulaError::UnknownVariable("y".to_string()))
        );
    }
}
