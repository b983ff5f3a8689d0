use std::fmt;

use thiserror::Error;

use crate::{parser::ParseErrors, token::Token};

/// Runtime faults triggered by the evaluated program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanicKind {
    Bounds,
    IndexValue,
    RangeValue,
    MapKey,
    Slice,
    BadArguments,
    AnyConversion,
    VarNotSet,
}

impl fmt::Display for PanicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bounds => "index out of bounds",
            Self::IndexValue => "expected integer index",
            Self::RangeValue => "bad range value",
            Self::MapKey => "no value for map key",
            Self::Slice => "bad slice",
            Self::BadArguments => "bad arguments",
            Self::AnyConversion => "error converting any to type",
            Self::VarNotSet => "variable has not been set yet",
        })
    }
}

/// Disagreements between the parser and the evaluator. A parsed program
/// never triggers these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalKind {
    UnknownNode,
    Type,
    RangeType,
    NoVariable,
    Operation,
    AssignmentTarget,
    EventHandler,
}

impl fmt::Display for InternalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnknownNode => "unknown AST node",
            Self::Type => "type error",
            Self::RangeType => "bad range type",
            Self::NoVariable => "no variable",
            Self::Operation => "unknown operation",
            Self::AssignmentTarget => "bad assignment target",
            Self::EventHandler => "bad event handler",
        })
    }
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Parse(#[from] ParseErrors),
    #[error("panic: {0}: {1}")]
    Panic(PanicKind, String),
    #[error("internal error: {0}: {1}")]
    Internal(InternalKind, String),
    #[error("stopped")]
    Stopped,
    #[error("exit {0}")]
    Exit(i32),
    /// Raised by the `panic` builtin.
    #[error("{0}")]
    UserPanic(String),
    #[error("{location}: {source}")]
    At {
        location: String,
        source: Box<EvalError>,
    },
}

impl EvalError {
    pub fn panic(kind: PanicKind, detail: impl Into<String>) -> Self {
        EvalError::Panic(kind, detail.into())
    }

    pub fn internal(kind: InternalKind, detail: impl Into<String>) -> Self {
        EvalError::Internal(kind, detail.into())
    }

    /// Prefixes the error with the location of `token`, unless it already
    /// carries one or is a control flow error.
    pub fn at(self, token: &Token) -> Self {
        match self {
            EvalError::At { .. }
            | EvalError::Stopped
            | EvalError::Exit(_)
            | EvalError::Parse(_) => self,
            err => EvalError::At {
                location: token.location(),
                source: Box::new(err),
            },
        }
    }

    /// The error without location information.
    pub fn unlocated(&self) -> &EvalError {
        match self {
            EvalError::At { source, .. } => source.unlocated(),
            err => err,
        }
    }

    /// Reports whether the error is a runtime fault of the program,
    /// including calls to `panic`.
    pub fn is_panic(&self) -> bool {
        matches!(
            self.unlocated(),
            EvalError::Panic(..) | EvalError::UserPanic(_)
        )
    }

    pub fn panic_kind(&self) -> Option<PanicKind> {
        match self.unlocated() {
            EvalError::Panic(kind, _) => Some(*kind),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.unlocated() {
            EvalError::Exit(code) => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    fn token_at(line: usize, col: usize) -> Token {
        Token {
            kind: TokenKind::Ident,
            literal: "x".into(),
            offset: 0,
            line,
            col,
        }
    }

    #[test]
    fn located_messages() {
        let err = EvalError::panic(PanicKind::Bounds, "5").at(&token_at(3, 7));
        assert_eq!(err.to_string(), "line 3 column 7: panic: index out of bounds: 5");
        let again = err.at(&token_at(1, 1));
        assert_eq!(again.to_string(), "line 3 column 7: panic: index out of bounds: 5");
        assert_eq!(again.panic_kind(), Some(PanicKind::Bounds));
        assert!(again.is_panic());
    }

    #[test]
    fn control_flow_is_not_located() {
        let exit = EvalError::Exit(2).at(&token_at(1, 1));
        assert_eq!(exit.to_string(), "exit 2");
        assert_eq!(exit.exit_code(), Some(2));
        assert!(!exit.is_panic());
        assert_eq!(EvalError::Stopped.at(&token_at(1, 1)).to_string(), "stopped");
    }

    #[test]
    fn user_panics() {
        let err = EvalError::UserPanic("oh no".into()).at(&token_at(2, 1));
        assert_eq!(err.to_string(), "line 2 column 1: oh no");
        assert!(err.is_panic());
        assert_eq!(err.panic_kind(), None);
        let internal = EvalError::internal(InternalKind::Operation, "(unary) -true");
        assert_eq!(internal.to_string(), "internal error: unknown operation: (unary) -true");
    }
}
