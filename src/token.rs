use std::fmt;

use crate::common::{quote, Error, Position, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenKind {
    Illegal,
    Eof,
    Comment,

    Ident,
    NumLit,
    StringLit,

    // operators
    Declare,
    Assign,
    Plus,
    Minus,
    Bang,
    Asterisk,
    Slash,
    Percent,

    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,

    // symbols
    LParen,
    RParen,
    LBracket,
    RBracket,
    LCurly,
    RCurly,

    Colon,
    Ws,
    Nl,
    Dot,
    Dot3,

    // type keywords
    Num,
    String,
    Bool,
    Any,

    // keywords
    True,
    False,
    And,
    Or,

    If,
    Else,
    Func,
    Return,
    On,
    For,
    Range,
    While,
    Break,
    End,
}

impl TokenKind {
    pub fn from_keyword_str(name: &str) -> Option<TokenKind> {
        match name {
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            "and" => Some(TokenKind::And),
            "or" => Some(TokenKind::Or),
            "num" => Some(TokenKind::Num),
            "string" => Some(TokenKind::String),
            "bool" => Some(TokenKind::Bool),
            "any" => Some(TokenKind::Any),
            "if" => Some(TokenKind::If),
            "else" => Some(TokenKind::Else),
            "func" => Some(TokenKind::Func),
            "on" => Some(TokenKind::On),
            "return" => Some(TokenKind::Return),
            "for" => Some(TokenKind::For),
            "range" => Some(TokenKind::Range),
            "while" => Some(TokenKind::While),
            "break" => Some(TokenKind::Break),
            "end" => Some(TokenKind::End),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Illegal => "ILLEGAL",
            Self::Eof => "EOF",
            Self::Comment => "COMMENT",
            Self::Ident => "IDENT",
            Self::NumLit => "NUM_LIT",
            Self::StringLit => "STRING_LIT",
            Self::Declare => "DECLARE",
            Self::Assign => "ASSIGN",
            Self::Plus => "PLUS",
            Self::Minus => "MINUS",
            Self::Bang => "BANG",
            Self::Asterisk => "ASTERISK",
            Self::Slash => "SLASH",
            Self::Percent => "PERCENT",
            Self::Eq => "EQ",
            Self::NotEq => "NOT_EQ",
            Self::Lt => "LT",
            Self::Gt => "GT",
            Self::LtEq => "LTEQ",
            Self::GtEq => "GTEQ",
            Self::LParen => "LPAREN",
            Self::RParen => "RPAREN",
            Self::LBracket => "LBRACKET",
            Self::RBracket => "RBRACKET",
            Self::LCurly => "LCURLY",
            Self::RCurly => "RCURLY",
            Self::Colon => "COLON",
            Self::Ws => "WS",
            Self::Nl => "NL",
            Self::Dot => "DOT",
            Self::Dot3 => "DOT3",
            Self::Num => "NUM",
            Self::String => "STRING",
            Self::Bool => "BOOL",
            Self::Any => "ANY",
            Self::True => "TRUE",
            Self::False => "FALSE",
            Self::And => "AND",
            Self::Or => "OR",
            Self::If => "IF",
            Self::Else => "ELSE",
            Self::Func => "FUNC",
            Self::Return => "RETURN",
            Self::On => "ON",
            Self::For => "FOR",
            Self::Range => "RANGE",
            Self::While => "WHILE",
            Self::Break => "BREAK",
            Self::End => "END",
        }
    }

    /// Surface syntax of fixed-text tokens. Tokens carrying a literal
    /// (identifiers, numbers, strings, comments) and EOF have none.
    pub fn surface(&self) -> &'static str {
        match self {
            Self::Illegal => "💣",
            Self::Eof | Self::Comment | Self::Ident | Self::NumLit | Self::StringLit => "",
            Self::Declare => ":=",
            Self::Assign => "=",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Bang => "!",
            Self::Asterisk => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::LtEq => "<=",
            Self::GtEq => ">=",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LCurly => "{",
            Self::RCurly => "}",
            Self::Colon => ":",
            Self::Ws => " ",
            Self::Nl => "\n",
            Self::Dot => ".",
            Self::Dot3 => "...",
            Self::Num => "num",
            Self::String => "string",
            Self::Bool => "bool",
            Self::Any => "any",
            Self::True => "true",
            Self::False => "false",
            Self::And => "and",
            Self::Or => "or",
            Self::If => "if",
            Self::Else => "else",
            Self::Func => "func",
            Self::Return => "return",
            Self::On => "on",
            Self::For => "for",
            Self::Range => "range",
            Self::While => "while",
            Self::Break => "break",
            Self::End => "end",
        }
    }

    /// Human readable form used in error messages.
    pub fn format_details(&self) -> String {
        match self {
            Self::Eof => "end of input".into(),
            Self::Nl => "end of line".into(),
            Self::Ident => "identifier".into(),
            _ => quote(self.surface()),
        }
    }

    pub fn is_type_keyword(&self) -> bool {
        matches!(self, Self::Num | Self::String | Self::Bool | Self::Any)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: String,
    pub offset: usize,
    pub line: usize,
    pub col: usize,
}

impl Token {
    /// A token that has no place in the source, e.g. for builtin
    /// declarations.
    pub fn synthetic(kind: TokenKind, literal: &str) -> Token {
        Token {
            kind,
            literal: literal.into(),
            offset: 0,
            line: 0,
            col: 0,
        }
    }

    pub fn pos(&self) -> Position {
        Position {
            offset: self.offset,
            line: self.line,
            col: self.col,
        }
    }

    pub fn span(&self) -> Span {
        let len = match self.kind {
            TokenKind::Ident | TokenKind::NumLit | TokenKind::Comment | TokenKind::Ws => {
                self.literal.chars().count()
            }
            TokenKind::StringLit => quote(&self.literal).chars().count(),
            _ => self.kind.surface().chars().count(),
        };
        self.offset..self.offset + len
    }

    pub fn location(&self) -> String {
        self.pos().location()
    }

    pub fn error_at(&self, message: &str) -> Error {
        Error {
            message: message.into(),
            span: self.span(),
            pos: self.pos(),
        }
    }

    /// Surface syntax of the token as it would be written in a program.
    pub fn format(&self) -> String {
        match self.kind {
            TokenKind::Comment | TokenKind::Ident | TokenKind::NumLit => self.literal.clone(),
            TokenKind::StringLit => quote(&self.literal),
            _ => self.kind.surface().into(),
        }
    }

    pub fn format_details(&self) -> String {
        match self.kind {
            TokenKind::Comment | TokenKind::Ident | TokenKind::NumLit => self.literal.clone(),
            TokenKind::StringLit => format!("\"{}\"", self.literal),
            _ => self.kind.format_details(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Comment | TokenKind::Ident | TokenKind::NumLit | TokenKind::StringLit => {
                write!(f, "{} {}", self.kind, quote(&self.literal))
            }
            TokenKind::Illegal => {
                write!(f, "ILLEGAL 💥 {} at {}", quote(&self.literal), self.location())
            }
            _ => write!(f, "{}", self.kind),
        }
    }
}
