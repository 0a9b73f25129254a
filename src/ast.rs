//! This module defines the closed set of expression/value variants the evaluator works
//! with. The main enum, [`Value`], doubles as source expression and runtime result: a
//! reader produces atoms, symbols and lists, evaluation additionally produces closures,
//! promises, special forms and the unbound marker. Ergonomic helpers such as [`val`],
//! [`sym`] and [`nil`] are provided for building expressions in code and tests, together
//! with conversion traits from common Rust literals. Display renders values in
//! s-expression syntax.

use crate::Error;
use crate::evaluator::{CapturedEnvironment, Environment};
use std::cell::OnceCell;
use std::rc::Rc;

/// Type alias for number values in interpreter
pub type NumberType = i64;

/// Formal that marks the following formal as the rest parameter: `(lambda (x . rest) ...)`
pub const VARIADIC_MARKER: &str = ".";

/// Suffix that asks syntax-quote to rename a symbol: `bob#`
pub const HYGIENE_SUFFIX: char = '#';

/// Canonical erased native function type.
///
/// Natives receive ownership of their evaluated arguments, with any rest sequence already
/// flattened into the vector.
pub type OperationFn = dyn Fn(Vec<Value>) -> Result<Value, Error>;

/// Literal payload of an atom
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Nil,
    Bool(bool),
    Number(NumberType),
    String(String),
}

/// Core expression/value type
///
/// To build an expression, use the helper functions:
/// - `val(42)` for atoms, `sym("name")` for symbols, `nil()` for the nil atom
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub enum Value {
    /// Literal data, evaluates to itself
    Atom(Atom),
    /// Reference resolved through the environment
    Symbol(String),
    /// Call syntax when evaluated, plain data when quoted or returned
    List(Vec<Value>),
    /// Unevaluated lambda definition
    Lambda(Rc<Lambda>),
    /// Lambda bound to its defining environment
    Closure(Rc<Closure>),
    /// Named built-in expression transformer
    SpecialForm(String),
    /// Memoized deferred computation
    Promise(Rc<Promise>),
    /// Declared with `(define name)` but never given a value
    Unbound,
}

/// Body of a lambda: language expressions or a host function
#[derive(Clone)]
pub enum Body {
    Exprs(Vec<Value>),
    Native(Rc<OperationFn>),
}

/// Formal parameters plus body. Formals may contain [`VARIADIC_MARKER`]; placement is
/// validated when the lambda is evaluated into a closure.
#[derive(Clone)]
pub struct Lambda {
    pub(crate) formals: Vec<String>,
    pub(crate) body: Body,
}

impl Lambda {
    pub fn new(formals: Vec<String>, body: Vec<Value>) -> Self {
        Lambda {
            formals,
            body: Body::Exprs(body),
        }
    }

    pub fn native(formals: Vec<String>, func: Rc<OperationFn>) -> Self {
        Lambda {
            formals,
            body: Body::Native(func),
        }
    }

    pub fn formals(&self) -> &[String] {
        &self.formals
    }

    /// Position of the variadic marker, which is also the number of required formals
    pub fn variadic_position(&self) -> Option<usize> {
        self.formals.iter().position(|f| f == VARIADIC_MARKER)
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic_position().is_some()
    }

    /// Number of formals, marker and rest name included
    pub fn arity(&self) -> usize {
        self.formals.len()
    }
}

impl std::fmt::Debug for Lambda {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Lambda(formals={:?})", self.formals)
    }
}

/// A lambda together with the environment it was evaluated in
pub struct Closure {
    pub(crate) lambda: Rc<Lambda>,
    pub(crate) env: CapturedEnvironment,
}

impl Closure {
    pub fn new(lambda: Rc<Lambda>, env: Environment) -> Self {
        Closure {
            lambda,
            env: env.downgrade(),
        }
    }

    pub fn lambda(&self) -> &Lambda {
        &self.lambda
    }

    /// The captured environment, unless its interpreter has since been dropped
    pub fn env(&self) -> Option<Environment> {
        self.env.upgrade()
    }
}

/// Wraps a zero-argument closure; the first force caches its outcome, error included
pub struct Promise {
    pub(crate) closure: Rc<Closure>,
    pub(crate) outcome: OnceCell<Result<Value, Error>>,
}

impl Promise {
    pub fn new(closure: Rc<Closure>) -> Self {
        Promise {
            closure,
            outcome: OnceCell::new(),
        }
    }

    pub fn is_realized(&self) -> bool {
        self.outcome.get().is_some()
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Atom(atom) => write!(f, "Atom({atom:?})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::List(list) => {
                write!(f, "List(")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::Lambda(lambda) => write!(f, "Lambda(formals={:?})", lambda.formals),
            Value::Closure(closure) => {
                write!(f, "Closure(formals={:?})", closure.lambda.formals)
            }
            Value::SpecialForm(name) => write!(f, "SpecialForm({name})"),
            Value::Promise(promise) => match promise.outcome.get() {
                Some(outcome) => write!(f, "Promise({outcome:?})"),
                None => write!(f, "Promise(<unrealized>)"),
            },
            Value::Unbound => write!(f, "Unbound"),
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<Atom> for Value {
    fn from(atom: Atom) -> Self {
        Value::Atom(atom)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Atom(Atom::String(s.to_owned()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Atom(Atom::String(s))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Atom(Atom::Bool(b))
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Atom(Atom::Number(NumberType::from(n)))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(|x| x.into()).collect())
    }
}

// Fallible conversions from `Value` back into primitive Rust types.

impl std::convert::TryInto<NumberType> for Value {
    type Error = Error;

    fn try_into(self) -> Result<NumberType, Error> {
        if let Value::Atom(Atom::Number(n)) = self {
            Ok(n)
        } else {
            Err(Error::TypeError(format!("cannot convert '{self}' to number")))
        }
    }
}

impl std::convert::TryInto<bool> for Value {
    type Error = Error;

    fn try_into(self) -> Result<bool, Error> {
        if let Value::Atom(Atom::Bool(b)) = self {
            Ok(b)
        } else {
            Err(Error::TypeError(format!("cannot convert '{self}' to bool")))
        }
    }
}

/// Helper function for creating symbols - works great in mixed lists!
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating Values from anything convertible
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for the nil atom
pub fn nil() -> Value {
    Value::Atom(Atom::Nil)
}

impl std::fmt::Display for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Atom::Nil => write!(f, "nil"),
            Atom::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Atom::Number(n) => write!(f, "{n}"),
            Atom::String(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Atom(atom) => write!(f, "{atom}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::List(elements) => {
                write!(f, "(")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }
            Value::Lambda(lambda) => write!(f, "#<lambda ({})>", lambda.formals.join(" ")),
            Value::Closure(closure) => {
                write!(f, "#<closure ({})>", closure.lambda.formals.join(" "))
            }
            Value::SpecialForm(name) => write!(f, "#<special-form {name}>"),
            Value::Promise(promise) => match promise.outcome.get() {
                Some(Ok(value)) => write!(f, "#<promise {value}>"),
                Some(Err(_)) => write!(f, "#<promise failed>"),
                None => write!(f, "#<promise unrealized>"),
            },
            Value::Unbound => write!(f, "<unbound>"),
        }
    }
}

impl Value {
    /// Nil atom or empty list
    pub fn is_nil(&self) -> bool {
        match self {
            Value::Atom(Atom::Nil) => true,
            Value::List(list) => list.is_empty(),
            _ => false,
        }
    }

    /// Symbol name, if this is a symbol
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(name) => Some(name),
            _ => None,
        }
    }

    /// Text used by the `symbol` special form: strings contribute their raw contents
    pub(crate) fn to_symbol_text(&self) -> String {
        match self {
            Value::Atom(Atom::String(s)) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Atom(a), Value::Atom(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            // Callables and promises compare by identity
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Promise(a), Value::Promise(b)) => Rc::ptr_eq(a, b),
            (Value::SpecialForm(a), Value::SpecialForm(b)) => a == b,
            (Value::Unbound, Value::Unbound) => true,
            _ => false,
        }
    }
}
