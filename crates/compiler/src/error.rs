//! Compile-time error taxonomy
//!
//! Every failure aborts the in-progress compilation and surfaces exactly one
//! single-line message; there are no warnings, no recovery, and no partial
//! bytecode. Lexical and structural errors carry a source position
//! (0-indexed internally, displayed 1-indexed).

use scm_core::value::FixnumOverflow;

#[derive(Debug)]
pub enum CompileError {
    /// Unrecognized token, illegal identifier start, or unterminated string.
    Lex {
        message: String,
        line: usize,
        column: usize,
    },
    /// Unexpected token or end of input, missing paren, duplicate binding
    /// name, duplicate formal, or missing let body.
    Parse {
        message: String,
        line: usize,
        column: usize,
    },
    /// Wrong number of operands to a fixed-arity operator.
    Arity {
        operator: &'static str,
        expected: usize,
        found: usize,
    },
    /// Unbound variable or reference to an unknown closure label.
    Semantic(String),
    /// Integer literal outside the 62-bit signed fixnum range.
    Overflow(String),
    /// Failure reading source or writing bytecode.
    Io(std::io::Error),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Lex {
                message,
                line,
                column,
            } => write!(f, "lex error at line {}, column {}: {}", line + 1, column + 1, message),
            CompileError::Parse {
                message,
                line,
                column,
            } => write!(
                f,
                "parse error at line {}, column {}: {}",
                line + 1,
                column + 1,
                message
            ),
            CompileError::Arity {
                operator,
                expected,
                found,
            } => write!(
                f,
                "wrong number of arguments to {}: expected {}, found {}",
                operator, expected, found
            ),
            CompileError::Semantic(message) => write!(f, "{}", message),
            CompileError::Overflow(message) => write!(f, "{}", message),
            CompileError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        CompileError::Io(e)
    }
}

impl From<FixnumOverflow> for CompileError {
    fn from(e: FixnumOverflow) -> Self {
        CompileError::Overflow(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_display_one_indexed() {
        let err = CompileError::Lex {
            message: "unrecognized token".to_string(),
            line: 0,
            column: 4,
        };
        assert_eq!(err.to_string(), "lex error at line 1, column 5: unrecognized token");
    }

    #[test]
    fn test_arity_message_names_operator() {
        let err = CompileError::Arity {
            operator: "add1",
            expected: 1,
            found: 3,
        };
        assert_eq!(
            err.to_string(),
            "wrong number of arguments to add1: expected 1, found 3"
        );
    }

    #[test]
    fn test_overflow_from_fixnum() {
        let err = CompileError::from(FixnumOverflow(i64::MAX));
        assert!(err.to_string().contains("2^62 - 1"));
    }
}
