//! Tokenizer and parser for the condition sub-language.
//!
//! The grammar is a restricted expression language with a Python-like
//! surface: boolean combinators, comparisons, identity-to-null,
//! membership, arithmetic, attribute/subscript access, and literal
//! displays. The whitelist is enforced *here*: call forms, lambdas,
//! comprehensions, generators, imports, and assignments never produce an
//! AST; they are rejected during parsing, before any evaluation.

use super::EvalError;

/// Parsed expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(serde_json::Value),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Name(String),
    Attribute {
        base: Box<Expr>,
        attr: String,
    },
    Subscript {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    BoolOp {
        op: BoolOpKind,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoolOpKind {
    And,
    Or,
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Kw(Kw),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Assign,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kw {
    And,
    Or,
    Not,
    Is,
    In,
    If,
    Else,
    True,
    False,
    None,
    Lambda,
    For,
    Import,
}

fn keyword(ident: &str) -> Option<Kw> {
    match ident {
        "and" => Some(Kw::And),
        "or" => Some(Kw::Or),
        "not" => Some(Kw::Not),
        "is" => Some(Kw::Is),
        "in" => Some(Kw::In),
        "if" => Some(Kw::If),
        "else" => Some(Kw::Else),
        "True" => Some(Kw::True),
        "False" => Some(Kw::False),
        "None" => Some(Kw::None),
        "lambda" => Some(Kw::Lambda),
        "for" => Some(Kw::For),
        "import" => Some(Kw::Import),
        _ => None,
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match keyword(&ident) {
                    Some(kw) => tokens.push(Token::Kw(kw)),
                    None => tokens.push(Token::Ident(ident)),
                }
            }
            c if c.is_ascii_digit() => {
                let mut number = String::new();
                let mut is_float = false;
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() {
                        number.push(c);
                        chars.next();
                    } else if c == '.' && !is_float {
                        // A digit must follow for this to be a float part;
                        // otherwise the dot is attribute access (2.x is not
                        // valid here anyway).
                        let mut lookahead = chars.clone();
                        lookahead.next();
                        if lookahead.peek().is_some_and(|d| d.is_ascii_digit()) {
                            is_float = true;
                            number.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    } else {
                        break;
                    }
                }
                if is_float {
                    let value = number
                        .parse::<f64>()
                        .map_err(|_| EvalError::Syntax(format!("invalid number: {number}")))?;
                    tokens.push(Token::Float(value));
                } else {
                    let value = number
                        .parse::<i64>()
                        .map_err(|_| EvalError::Syntax(format!("invalid number: {number}")))?;
                    tokens.push(Token::Int(value));
                }
            }
            '\'' | '"' => {
                let quote = ch;
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    if c == quote {
                        closed = true;
                        break;
                    }
                    if c == '\\' {
                        match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some(other) => text.push(other),
                            None => break,
                        }
                    } else {
                        text.push(c);
                    }
                }
                if !closed {
                    return Err(EvalError::Syntax("unterminated string literal".to_string()));
                }
                tokens.push(Token::Str(text));
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            '{' => {
                chars.next();
                tokens.push(Token::LBrace);
            }
            '}' => {
                chars.next();
                tokens.push(Token::RBrace);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            ':' => {
                chars.next();
                tokens.push(Token::Colon);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    tokens.push(Token::DoubleSlash);
                } else {
                    tokens.push(Token::Slash);
                }
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::EqEq);
                } else {
                    tokens.push(Token::Assign);
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::NotEq);
                } else {
                    return Err(EvalError::Syntax("unexpected character: !".to_string()));
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            other => {
                return Err(EvalError::Syntax(format!("unexpected character: {other}")));
            }
        }
    }

    Ok(tokens)
}

/// Parse an expression string into an [`Expr`], rejecting every
/// non-whitelisted construct.
pub fn parse(source: &str) -> Result<Expr, EvalError> {
    if source.trim().is_empty() {
        return Err(EvalError::Syntax("empty expression".to_string()));
    }
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(Token::Assign) => Err(EvalError::Syntax(
            "assignment is not allowed in conditions".to_string(),
        )),
        Some(tok) => Err(EvalError::Syntax(format!("unexpected token: {tok:?}"))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek2(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), EvalError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(EvalError::Syntax(format!(
                "expected {what}, found {:?}",
                self.peek()
            )))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, EvalError> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<Expr, EvalError> {
        let value = self.parse_or()?;
        if self.eat(&Token::Kw(Kw::If)) {
            let condition = self.parse_or()?;
            self.expect(Token::Kw(Kw::Else), "'else' in conditional expression")?;
            let otherwise = self.parse_ternary()?;
            return Ok(Expr::Ternary {
                condition: Box::new(condition),
                then: Box::new(value),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(value)
    }

    fn parse_or(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Kw(Kw::Or)) {
            let right = self.parse_and()?;
            left = Expr::BoolOp {
                op: BoolOpKind::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::Kw(Kw::And)) {
            let right = self.parse_not()?;
            left = Expr::BoolOp {
                op: BoolOpKind::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, EvalError> {
        if self.eat(&Token::Kw(Kw::Not)) {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    /// Comparisons chain Python-style: `a < b < c` means `a < b and b < c`.
    fn parse_comparison(&mut self) -> Result<Expr, EvalError> {
        let first = self.parse_arith()?;
        let mut comparisons: Vec<Expr> = Vec::new();
        let mut previous = first.clone();

        while let Some(op) = self.comparison_op()? {
            let right = self.parse_arith()?;
            comparisons.push(Expr::Compare {
                op,
                left: Box::new(previous),
                right: Box::new(right.clone()),
            });
            previous = right;
        }

        match comparisons.len() {
            0 => Ok(first),
            1 => Ok(comparisons.pop().expect("len checked")),
            _ => {
                let mut iter = comparisons.into_iter();
                let mut combined = iter.next().expect("len checked");
                for next in iter {
                    combined = Expr::BoolOp {
                        op: BoolOpKind::And,
                        left: Box::new(combined),
                        right: Box::new(next),
                    };
                }
                Ok(combined)
            }
        }
    }

    fn comparison_op(&mut self) -> Result<Option<CompareOp>, EvalError> {
        let op = match self.peek() {
            Some(Token::EqEq) => Some(CompareOp::Eq),
            Some(Token::NotEq) => Some(CompareOp::Ne),
            Some(Token::Lt) => Some(CompareOp::Lt),
            Some(Token::Le) => Some(CompareOp::Le),
            Some(Token::Gt) => Some(CompareOp::Gt),
            Some(Token::Ge) => Some(CompareOp::Ge),
            Some(Token::Kw(Kw::In)) => Some(CompareOp::In),
            Some(Token::Kw(Kw::Not)) if self.peek2() == Some(&Token::Kw(Kw::In)) => {
                self.pos += 1;
                Some(CompareOp::NotIn)
            }
            Some(Token::Kw(Kw::Is)) => {
                self.pos += 1;
                if self.eat(&Token::Kw(Kw::Not)) {
                    return Ok(Some(CompareOp::IsNot));
                }
                return Ok(Some(CompareOp::Is));
            }
            _ => None,
        };
        if op.is_some() {
            self.pos += 1;
        }
        Ok(op)
    }

    fn parse_arith(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::DoubleSlash) => BinaryOp::FloorDiv,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_factor()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, EvalError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                let operand = self.parse_factor()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            Some(Token::Plus) => {
                self.pos += 1;
                let operand = self.parse_factor()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Pos,
                    operand: Box::new(operand),
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, EvalError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let attr = match self.next() {
                        Some(Token::Ident(name)) => name,
                        other => {
                            return Err(EvalError::Syntax(format!(
                                "expected attribute name after '.', found {other:?}"
                            )))
                        }
                    };
                    expr = Expr::Attribute {
                        base: Box::new(expr),
                        attr,
                    };
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.parse_expr()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Subscript {
                        base: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Some(Token::LParen) => {
                    // A parenthesis after a postfix expression is a call form.
                    return Err(EvalError::Unsafe(
                        "function call (Call) is not allowed".to_string(),
                    ));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        match self.next() {
            Some(Token::Int(n)) => Ok(Expr::Literal(serde_json::Value::from(n))),
            Some(Token::Float(f)) => Ok(Expr::Literal(serde_json::Value::from(f))),
            Some(Token::Str(s)) => Ok(Expr::Literal(serde_json::Value::from(s))),
            Some(Token::Kw(Kw::True)) => Ok(Expr::Literal(serde_json::Value::Bool(true))),
            Some(Token::Kw(Kw::False)) => Ok(Expr::Literal(serde_json::Value::Bool(false))),
            Some(Token::Kw(Kw::None)) => Ok(Expr::Literal(serde_json::Value::Null)),
            Some(Token::Ident(name)) => Ok(Expr::Name(name)),
            Some(Token::Kw(Kw::Lambda)) => Err(EvalError::Unsafe(
                "lambda (Lambda) is not allowed".to_string(),
            )),
            Some(Token::Kw(Kw::Import)) => {
                Err(EvalError::Unsafe("import is not allowed".to_string()))
            }
            Some(Token::LParen) => {
                if self.eat(&Token::RParen) {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.parse_expr()?;
                if self.peek() == Some(&Token::Kw(Kw::For)) {
                    return Err(EvalError::Unsafe(
                        "generator expression (GeneratorExp) is not allowed".to_string(),
                    ));
                }
                if self.eat(&Token::Comma) {
                    let mut items = vec![first];
                    while self.peek() != Some(&Token::RParen) {
                        items.push(self.parse_expr()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect(Token::RParen, "')'")?;
                    return Ok(Expr::Tuple(items));
                }
                self.expect(Token::RParen, "')'")?;
                Ok(first)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if self.peek() == Some(&Token::Kw(Kw::For)) {
                            return Err(EvalError::Unsafe(
                                "comprehension (ListComp) is not allowed".to_string(),
                            ));
                        }
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                        if self.peek() == Some(&Token::RBracket) {
                            break;
                        }
                    }
                    self.expect(Token::RBracket, "']'")?;
                }
                Ok(Expr::List(items))
            }
            Some(Token::LBrace) => {
                let mut entries = Vec::new();
                if !self.eat(&Token::RBrace) {
                    loop {
                        let key = self.parse_expr()?;
                        if self.peek() == Some(&Token::Kw(Kw::For)) {
                            return Err(EvalError::Unsafe(
                                "comprehension (DictComp) is not allowed".to_string(),
                            ));
                        }
                        self.expect(Token::Colon, "':' in dict literal")?;
                        let value = self.parse_expr()?;
                        if self.peek() == Some(&Token::Kw(Kw::For)) {
                            return Err(EvalError::Unsafe(
                                "comprehension (DictComp) is not allowed".to_string(),
                            ));
                        }
                        entries.push((key, value));
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                        if self.peek() == Some(&Token::RBrace) {
                            break;
                        }
                    }
                    self.expect(Token::RBrace, "'}'")?;
                }
                Ok(Expr::Dict(entries))
            }
            other => Err(EvalError::Syntax(format!(
                "unexpected token: {other:?}"
            ))),
        }
    }
}
