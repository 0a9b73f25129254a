//! Yalix - a small Lisp evaluated by walking the expression tree
//!
//! This crate provides the evaluation engine for a Scheme-like language built from atoms,
//! symbols and lists. Expressions are evaluated against lexically scoped environments and
//! support closures, recursion, a fixed set of special forms, quoting with optional
//! hygienic renaming, and memoized deferred computation.
//!
//! ```scheme
//! (define (factorial x)
//!   (if (zero? x) 1 (* x (factorial (- x 1)))))
//! (factorial 10)               ; 3628800
//! ((lambda (x . rest) rest) 1 2 3)   ; (2 3)
//! (define p (delay (+ 1 2)))
//! (p)                          ; 3, computed once
//! `(bob# bob#)                 ; (bob__7__auto__ bob__7__auto__)
//! ```
//!
//! ## Evaluation protocol
//!
//! Every [`ast::Value`] implements three operations: `evaluate`, `apply` and
//! `quoted_form`. Evaluating a non-empty list evaluates its head and hands the
//! *unevaluated* arguments to the head's `apply`. Closures evaluate their arguments
//! strictly in the caller's environment, special forms decide for themselves.
//!
//! ## Modules
//!
//! - `ast`: the closed value/expression representation
//! - `evaluator`: environments, the evaluation protocol and closure application
//! - `specialforms`: `if`, `let`, `define`, `lambda`, `begin`, `quote`, `delay`, `symbol`, ...
//! - `builtinops`: native functions and interpreter bootstrap
//! - `reader`: s-expression reader (feature `reader`)

use std::fmt;

/// Maximum nesting depth accepted by the reader
pub const MAX_PARSE_DEPTH: usize = 64;

/// Default limit on nested list evaluations (applications of any callable).
/// Evaluation recurses on the native stack; at this depth a debug build still fits in a
/// 2 MiB thread stack, so deep language-level recursion ends in an error instead.
pub const MAX_EVAL_DEPTH: usize = 128;

/// Which side of an arity check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArityKind {
    /// Fewer arguments than required
    Insufficient,
    /// More arguments than a fixed-arity callable accepts
    Excessive,
}

impl fmt::Display for ArityKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ArityKind::Insufficient => write!(f, "insufficient"),
            ArityKind::Excessive => write!(f, "excessive"),
        }
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    ParseError(String),
    /// Name bound neither locally nor globally
    UnboundName(String),
    /// Local assignment target is missing from the local chain
    AssignmentError(String),
    NotCallable(String),
    ArityError {
        kind: ArityKind,
        expected: usize,
        supplied: usize,
        expression: Option<String>, // Optional callee context
    },
    /// Misplaced or duplicated variadic marker
    MalformedLambda(String),
    TypeError(String),
    TooFewArguments(String),
    TooManyArguments(String),
    UnknownSpecialForm(String),
    /// Applying a name declared with `(define name)` and never given a value
    UnboundInvocation,
    EvalError(String),
}

impl Error {
    /// Create an ArityError without callee context
    pub fn arity_error(kind: ArityKind, expected: usize, supplied: usize) -> Self {
        Error::ArityError {
            kind,
            expected,
            supplied,
            expression: None,
        }
    }

    /// Create an ArityError naming the callee expression
    pub fn arity_error_with_expr(
        kind: ArityKind,
        expected: usize,
        supplied: usize,
        expression: String,
    ) -> Self {
        Error::ArityError {
            kind,
            expected,
            supplied,
            expression: Some(expression),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ParseError(msg) => write!(f, "ParseError: {msg}"),
            Error::UnboundName(name) => write!(f, "'{name}' is unbound in environment"),
            Error::AssignmentError(name) => write!(
                f,
                "assignment disallowed: '{name}' is unbound in local environment"
            ),
            Error::NotCallable(what) => write!(f, "cannot invoke with: '{what}'"),
            Error::ArityError {
                kind,
                expected,
                supplied,
                expression,
            } => match expression {
                Some(expr) => write!(
                    f,
                    "call to '{expr}' applied with {kind} arity: {expected} args expected, {supplied} supplied"
                ),
                None => write!(
                    f,
                    "applied with {kind} arity: {expected} args expected, {supplied} supplied"
                ),
            },
            Error::MalformedLambda(msg) => write!(f, "invalid variadic argument spec: {msg}"),
            Error::TypeError(msg) => write!(f, "Type error: {msg}"),
            Error::TooFewArguments(form) => write!(f, "too few arguments supplied to {form}"),
            Error::TooManyArguments(form) => write!(f, "too many arguments supplied to {form}"),
            Error::UnknownSpecialForm(name) => write!(f, "Unknown special form: '{name}'"),
            Error::UnboundInvocation => write!(f, "cannot invoke with: <unbound>"),
            Error::EvalError(msg) => write!(f, "EvaluationError: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod specialforms;

#[cfg(feature = "reader")]
pub mod reader;
