// src/lang/lexer.rs

//! Tokenizer for cell source.
//!
//! Produces a flat token stream with 1-based line/column positions. Newlines
//! are significant (they separate statements) except inside brackets, where
//! they are skipped so long list literals and call argument lists can span
//! several lines.

use std::fmt;

use crate::lang::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),

    // Keywords.
    True,
    False,
    None,
    And,
    Or,
    Not,
    If,
    Else,
    Fn,
    Await,

    // Punctuation / operators.
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Assign,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,

    /// Statement separator (newline or `;`).
    Sep,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "name '{name}'"),
            TokenKind::Int(v) => write!(f, "integer {v}"),
            TokenKind::Float(v) => write!(f, "float {v}"),
            TokenKind::Str(_) => write!(f, "string literal"),
            TokenKind::Sep => write!(f, "end of statement"),
            TokenKind::Eof => write!(f, "end of input"),
            other => write!(f, "'{}'", symbol(other)),
        }
    }
}

fn symbol(kind: &TokenKind) -> &'static str {
    match kind {
        TokenKind::True => "true",
        TokenKind::False => "false",
        TokenKind::None => "none",
        TokenKind::And => "and",
        TokenKind::Or => "or",
        TokenKind::Not => "not",
        TokenKind::If => "if",
        TokenKind::Else => "else",
        TokenKind::Fn => "fn",
        TokenKind::Await => "await",
        TokenKind::LParen => "(",
        TokenKind::RParen => ")",
        TokenKind::LBracket => "[",
        TokenKind::RBracket => "]",
        TokenKind::Comma => ",",
        TokenKind::Assign => "=",
        TokenKind::Plus => "+",
        TokenKind::Minus => "-",
        TokenKind::Star => "*",
        TokenKind::StarStar => "**",
        TokenKind::Slash => "/",
        TokenKind::SlashSlash => "//",
        TokenKind::Percent => "%",
        TokenKind::EqEq => "==",
        TokenKind::NotEq => "!=",
        TokenKind::Lt => "<",
        TokenKind::LtEq => "<=",
        TokenKind::Gt => ">",
        TokenKind::GtEq => ">=",
        _ => "?",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

/// Tokenize a whole cell body.
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: usize,
    column: usize,
    /// Bracket nesting depth; newlines inside brackets are not separators.
    depth: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
            line: 1,
            column: 1,
            depth: 0,
            tokens: Vec::new(),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn push(&mut self, kind: TokenKind, line: usize, column: usize) {
        self.tokens.push(Token { kind, line, column });
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        while let Some(c) = self.peek() {
            let (line, column) = (self.line, self.column);

            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\n' => {
                    self.bump();
                    if self.depth == 0 {
                        self.push(TokenKind::Sep, line, column);
                    }
                }
                ';' => {
                    self.bump();
                    self.push(TokenKind::Sep, line, column);
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '0'..='9' => {
                    let kind = self.number(line, column)?;
                    self.push(kind, line, column);
                }
                '"' | '\'' => {
                    let s = self.string(c, line, column)?;
                    self.push(TokenKind::Str(s), line, column);
                }
                c if c == '_' || c.is_alphabetic() => {
                    let word = self.word();
                    self.push(keyword_or_ident(word), line, column);
                }
                _ => {
                    let kind = self.operator(c, line, column)?;
                    self.push(kind, line, column);
                }
            }
        }

        let (line, column) = (self.line, self.column);
        if self.depth > 0 {
            return Err(SyntaxError::new("unclosed bracket at end of input", line, column));
        }
        self.push(TokenKind::Eof, line, column);
        Ok(self.tokens)
    }

    fn word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        word
    }

    fn number(&mut self, line: usize, column: usize) -> Result<TokenKind, SyntaxError> {
        let mut text = String::new();
        let mut is_float = false;

        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {
                    if c != '_' {
                        text.push(c);
                    }
                    self.bump();
                }
                '.' if !is_float => {
                    is_float = true;
                    text.push(c);
                    self.bump();
                }
                'e' | 'E' => {
                    is_float = true;
                    text.push(c);
                    self.bump();
                    if let Some(sign @ ('+' | '-')) = self.peek() {
                        text.push(sign);
                        self.bump();
                    }
                }
                _ => break,
            }
        }

        if is_float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| SyntaxError::new(format!("invalid float literal '{text}'"), line, column))
        } else {
            text.parse::<i64>().map(TokenKind::Int).map_err(|_| {
                SyntaxError::new(format!("integer literal '{text}' out of range"), line, column)
            })
        }
    }

    fn string(&mut self, quote: char, line: usize, column: usize) -> Result<String, SyntaxError> {
        self.bump();
        let mut out = String::new();

        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(SyntaxError::new("unterminated string literal", line, column));
                }
                Some(c) if c == quote => return Ok(out),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some('\'') => '\'',
                        Some(other) => {
                            return Err(SyntaxError::new(
                                format!("unknown escape '\\{other}'"),
                                self.line,
                                self.column,
                            ));
                        }
                        None => {
                            return Err(SyntaxError::new(
                                "unterminated string literal",
                                line,
                                column,
                            ));
                        }
                    };
                    out.push(escaped);
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn operator(&mut self, c: char, line: usize, column: usize) -> Result<TokenKind, SyntaxError> {
        self.bump();
        let next = self.peek();

        let (kind, consumed_next) = match (c, next) {
            ('(', _) => {
                self.depth += 1;
                (TokenKind::LParen, false)
            }
            ('[', _) => {
                self.depth += 1;
                (TokenKind::LBracket, false)
            }
            (')' | ']', _) => {
                if self.depth == 0 {
                    return Err(SyntaxError::new(format!("unmatched '{c}'"), line, column));
                }
                self.depth -= 1;
                let kind = if c == ')' {
                    TokenKind::RParen
                } else {
                    TokenKind::RBracket
                };
                (kind, false)
            }
            (',', _) => (TokenKind::Comma, false),
            ('+', _) => (TokenKind::Plus, false),
            ('-', _) => (TokenKind::Minus, false),
            ('%', _) => (TokenKind::Percent, false),
            ('*', Some('*')) => (TokenKind::StarStar, true),
            ('*', _) => (TokenKind::Star, false),
            ('/', Some('/')) => (TokenKind::SlashSlash, true),
            ('/', _) => (TokenKind::Slash, false),
            ('=', Some('=')) => (TokenKind::EqEq, true),
            ('=', _) => (TokenKind::Assign, false),
            ('!', Some('=')) => (TokenKind::NotEq, true),
            ('<', Some('=')) => (TokenKind::LtEq, true),
            ('<', _) => (TokenKind::Lt, false),
            ('>', Some('=')) => (TokenKind::GtEq, true),
            ('>', _) => (TokenKind::Gt, false),
            _ => {
                return Err(SyntaxError::new(
                    format!("unexpected character '{c}'"),
                    line,
                    column,
                ));
            }
        };

        if consumed_next {
            self.bump();
        }
        Ok(kind)
    }
}

fn keyword_or_ident(word: String) -> TokenKind {
    match word.as_str() {
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "none" => TokenKind::None,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "fn" => TokenKind::Fn,
        "await" => TokenKind::Await,
        _ => TokenKind::Ident(word),
    }
}
