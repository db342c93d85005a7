//! schemexp - a small Scheme interpreter
//!
//! This crate implements the core of a Scheme interpreter: a reader that
//! turns source text into s-expression trees, a trampolined evaluator with
//! lexically chained environments and proper tail calls, lazy evaluation
//! through `delay`/`force` thunks, and a registry of primitive procedures.
//! A thin REPL/CLI driver lives in the `repl` module and the `schemexp`
//! binary.
//!
//! ```scheme
//! (define (fact n) (if (<= n 0) 1 (* n (fact (- n 1)))))
//! (fact 6)                ; 720
//! (force (delay (+ 1 2))) ; 3, evaluated on demand and memoized
//! ```
//!
//! The value model is a single sum type, [`ast::Value`]; pairs, lambdas
//! and thunks are reference-shared so that `set-car!`/`set-cdr!` mutation
//! and closure capture behave like they do in a real Scheme heap.
//!
//! ## Modules
//!
//! - `reader`: tokenizer and parser, source text to `Value` trees
//! - `ast`: the `Value` sum type, printing and equality
//! - `evaluator`: environments, the reduction loop, special forms
//! - `builtins`: primitive procedures and the bootstrap prelude
//! - `repl`: the interactive/batch driver
//! - `signal`: process-wide shutdown intent raised by `(exit)`

use std::fmt;

/// Maximum nesting depth accepted by the reader. Deeply nested input is
/// rejected instead of overflowing the parser's stack.
pub const MAX_PARSE_DEPTH: usize = 128;

/// Error types for the interpreter.
///
/// Every error renders as a single-line message; the wording of lookup
/// and parse errors is part of the observable behavior and is covered by
/// tests.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Lexing or parsing failure: unterminated string, `missing ')'`,
    /// `unexpected ')'`, nesting deeper than [`MAX_PARSE_DEPTH`].
    ParseError(String),
    /// Malformed special form: bad binding shapes, misplaced `else`,
    /// wrong operand counts for syntax.
    SyntaxError(String),
    /// Wrong value kind for an operation.
    TypeError(String),
    /// Wrong number of arguments to a lambda or builtin.
    ArityError(String),
    /// Symbol lookup failed all the way to the root environment.
    UnboundSymbol(String),
    /// `set!` of a symbol that no enclosing frame defines.
    SetBeforeDefine(String),
    /// Any other evaluation failure.
    EvalError(String),
    /// `load` could not open or read a file.
    IoError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ParseError(msg) => write!(f, "syntax error: {msg}"),
            Error::SyntaxError(msg) => write!(f, "{msg}"),
            Error::TypeError(msg) => write!(f, "{msg}"),
            Error::ArityError(msg) => write!(f, "{msg}"),
            Error::UnboundSymbol(name) => write!(f, "symbol {name} unbound"),
            Error::SetBeforeDefine(name) => {
                write!(f, "variable {name} cannot set! before define")
            }
            Error::EvalError(msg) => write!(f, "{msg}"),
            Error::IoError(msg) => write!(f, "{msg}"),
        }
    }
}

pub mod ast;
pub mod builtins;
pub mod evaluator;
pub mod reader;
pub mod repl;
pub mod signal;
