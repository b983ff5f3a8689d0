use crate::token::{Token, TokenKind};

use log::trace;
use unicode_xid::UnicodeXID;

/// Produces tokens one at a time. Lexing never fails: unknown input
/// becomes an `Illegal` token and the parser reports it.
#[derive(Debug, Clone)]
pub struct Lexer {
    source: Vec<char>,

    current: usize,
    line: usize,
    col: usize,
    done: bool,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            current: 0,
            line: 1,
            col: 1,
            done: false,
        }
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.current).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.source.get(self.current + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.current += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn advance_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn read_while(&mut self, start: usize, pred: impl Fn(char) -> bool) -> String {
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.advance();
        }
        self.source[start..self.current].iter().collect()
    }

    /// Reads a string literal whose opening quote has been consumed.
    /// The error value is the literal of the resulting `Illegal` token.
    fn lex_string(&mut self) -> Result<String, &'static str> {
        let start = self.current;
        let mut backslashes = 0;
        loop {
            match self.peek() {
                None | Some('\n') => return Err("\""),
                Some('"') if backslashes % 2 == 0 => break,
                Some('\\') => backslashes += 1,
                Some(_) => backslashes = 0,
            }
            self.advance();
        }
        let raw: String = self.source[start..self.current].iter().collect();
        self.advance(); // closing quote
        unquote(&raw).ok_or("invalid string")
    }

    pub fn next_token(&mut self) -> Token {
        let offset = self.current;
        let line = self.line;
        let col = self.col;
        let token = |kind: TokenKind, literal: String| Token {
            kind,
            literal,
            offset,
            line,
            col,
        };

        let c = match self.advance() {
            Some(c) => c,
            None => {
                self.done = true;
                return token(TokenKind::Eof, String::new());
            }
        };

        let kind = match c {
            ' ' | '\t' => {
                while matches!(self.peek(), Some(' ' | '\t' | '\r')) {
                    self.advance();
                }
                TokenKind::Ws
            }
            '=' if self.advance_if('=') => TokenKind::Eq,
            '=' => TokenKind::Assign,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '!' if self.advance_if('=') => TokenKind::NotEq,
            '!' => TokenKind::Bang,
            '/' if self.peek() == Some('/') => {
                let comment = self.read_while(offset, |c| c != '\n');
                return token(TokenKind::Comment, comment);
            }
            '/' => TokenKind::Slash,
            '*' => TokenKind::Asterisk,
            '%' => TokenKind::Percent,
            '<' if self.advance_if('=') => TokenKind::LtEq,
            '<' => TokenKind::Lt,
            '>' if self.advance_if('=') => TokenKind::GtEq,
            '>' => TokenKind::Gt,
            ':' if self.advance_if('=') => TokenKind::Declare,
            ':' => TokenKind::Colon,
            '{' => TokenKind::LCurly,
            '}' => TokenKind::RCurly,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '\n' => TokenKind::Nl,
            '.' if self.peek() == Some('.') && self.peek_next() == Some('.') => {
                self.advance();
                self.advance();
                TokenKind::Dot3
            }
            '.' => TokenKind::Dot,
            '"' => {
                return match self.lex_string() {
                    Ok(literal) => token(TokenKind::StringLit, literal),
                    Err(literal) => token(TokenKind::Illegal, literal.into()),
                };
            }
            c if is_ident_start(c) => {
                let ident = self.read_while(offset, is_ident_continue);
                return match TokenKind::from_keyword_str(&ident) {
                    Some(keyword) => token(keyword, String::new()),
                    None => token(TokenKind::Ident, ident),
                };
            }
            c if c.is_ascii_digit() => {
                let num = self.read_while(offset, |c| c.is_ascii_digit() || c == '.');
                return token(TokenKind::NumLit, num);
            }
            c => return token(TokenKind::Illegal, c.to_string()),
        };

        token(kind, String::new())
    }

    /// Lexes the whole input. The last token is always `Eof`.
    pub fn lex(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        while !self.done {
            let token = self.next_token();
            trace!("token {}", token);
            tokens.push(token);
        }
        tokens
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_xid_start()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_xid_continue()
}

/// Reports whether `s` would lex as a single identifier.
pub fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().map_or(false, is_ident_start) && chars.all(is_ident_continue)
}

/// Renders the token stream one token per line, ending with EOF.
pub fn dump(source: &str) -> String {
    let mut out = String::new();
    for token in Lexer::new(source).lex() {
        out.push_str(&token.to_string());
        out.push('\n');
    }
    out
}

/// Interprets the escape sequences of a double quoted string body.
pub fn unquote(raw: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut chars = raw.chars();
    let mut buf = [0u8; 4];

    while let Some(c) = chars.next() {
        if c != '\\' {
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let escaped = chars.next()?;
        let simple = match escaped {
            'a' => Some('\u{7}'),
            'b' => Some('\u{8}'),
            'f' => Some('\u{c}'),
            'n' => Some('\n'),
            'r' => Some('\r'),
            't' => Some('\t'),
            'v' => Some('\u{b}'),
            '\\' => Some('\\'),
            '"' => Some('"'),
            _ => None,
        };
        if let Some(c) = simple {
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match escaped {
            'x' => {
                let digits: String = (0..2).filter_map(|_| chars.next()).collect();
                if digits.len() != 2 {
                    return None;
                }
                bytes.push(u8::from_str_radix(&digits, 16).ok()?);
            }
            '0'..='7' => {
                let mut digits = escaped.to_string();
                for _ in 0..2 {
                    digits.push(chars.next()?);
                }
                let value = u32::from_str_radix(&digits, 8).ok()?;
                bytes.push(u8::try_from(value).ok()?);
            }
            'u' | 'U' => {
                let width = if escaped == 'u' { 4 } else { 8 };
                let digits: String = (0..width).filter_map(|_| chars.next()).collect();
                if digits.len() != width {
                    return None;
                }
                let code = u32::from_str_radix(&digits, 16).ok()?;
                let c = char::from_u32(code)?;
                bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            _ => return None,
        }
    }

    Some(String::from_utf8_lossy(&bytes).into_owned())
}
