//! Built-in native function registry.
//!
//! Every native is an ordinary closure as far as the evaluator is concerned: its lambda
//! carries formals generated from the declared [`Arity`] and a host function as body.
//! Arity is therefore checked by the same machinery that checks user lambdas, and the
//! host function receives its evaluated arguments with any rest list already flattened.
//!
//! ```scheme
//! (+ 1 2 3)            ; 6
//! (< 1 2 3)            ; #t (chained)
//! (cons 1 (list 2 3))  ; (1 2 3)
//! (car ())             ; nil
//! ```
//!
//! ## Error Handling
//!
//! Natives are strictly typed: no truthiness and no coercion between numbers and strings.
//! Arithmetic is checked and reports overflow or division by zero as an evaluation error.
//!
//! ## Adding New Operations
//!
//! 1. Implement a function with the signature `fn(Vec<Value>) -> Result<Value, Error>`
//! 2. Add it to `BUILTIN_OPS` with its identifier and arity
//! 3. Add tests covering the error paths

use crate::ast::{Atom, Closure, Lambda, NumberType, VARIADIC_MARKER, Value, nil};
use crate::evaluator::{Environment, next_id};
use crate::{ArityKind, Error};
use std::rc::Rc;
use std::sync::LazyLock;

/// Declared argument count of a native function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many arguments
    Exact(usize),
    /// At least this many arguments
    AtLeast(usize),
    /// Any number of arguments, including none
    Any,
}

impl Arity {
    /// Formal parameter names encoding this arity, e.g. `(arg1 . rest)` for `AtLeast(1)`
    pub fn formals(self) -> Vec<String> {
        let (required, variadic) = match self {
            Arity::Exact(n) => (n, false),
            Arity::AtLeast(n) => (n, true),
            Arity::Any => (0, true),
        };
        let mut formals: Vec<String> = (1..=required).map(|i| format!("arg{i}")).collect();
        if variadic {
            formals.push(VARIADIC_MARKER.to_owned());
            formals.push("rest".to_owned());
        }
        formals
    }
}

/// Signature of every registry entry
pub type NativeFn = fn(Vec<Value>) -> Result<Value, Error>;

/// Definition of a built-in operation
#[derive(Debug, Clone, Copy)]
pub struct BuiltinOp {
    /// Global name the operation is bound to
    pub id: &'static str,
    pub func: NativeFn,
    pub arity: Arity,
}

//
// Builtin Function Implementations
//

fn numbers(args: Vec<Value>) -> Result<Vec<NumberType>, Error> {
    args.into_iter()
        .map(<Value as TryInto<NumberType>>::try_into)
        .collect()
}

/// Pull the single argument out of an `Exact(1)` native's argument vector
fn single(args: Vec<Value>) -> Result<Value, Error> {
    let supplied = args.len();
    let mut iter = args.into_iter();
    match (iter.next(), iter.next()) {
        (Some(value), None) => Ok(value),
        (None, _) => Err(Error::arity_error(ArityKind::Insufficient, 1, supplied)),
        (Some(_), Some(_)) => Err(Error::arity_error(ArityKind::Excessive, 1, supplied)),
    }
}

fn pair(args: Vec<Value>) -> Result<(Value, Value), Error> {
    let supplied = args.len();
    let mut iter = args.into_iter();
    match (iter.next(), iter.next(), iter.next()) {
        (Some(first), Some(second), None) => Ok((first, second)),
        (_, _, None) => Err(Error::arity_error(ArityKind::Insufficient, 2, supplied)),
        _ => Err(Error::arity_error(ArityKind::Excessive, 2, supplied)),
    }
}

// Macro to generate chained numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(args: Vec<Value>) -> Result<Value, Error> {
            let nums = numbers(args)?;
            Ok(Value::from(nums.windows(2).all(|w| match w {
                [a, b] => a $op b,
                _ => true,
            })))
        }
    };
}

numeric_comparison!(builtin_eq, ==);
numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_ge, >=);

fn builtin_add(args: Vec<Value>) -> Result<Value, Error> {
    let mut sum: NumberType = 0;
    for n in numbers(args)? {
        sum = sum
            .checked_add(n)
            .ok_or_else(|| Error::EvalError("Integer overflow in addition".into()))?;
    }
    Ok(Value::from(sum))
}

fn builtin_sub(args: Vec<Value>) -> Result<Value, Error> {
    let nums = numbers(args)?;
    let Some((first, rest)) = nums.split_first() else {
        return Err(Error::arity_error(ArityKind::Insufficient, 1, 0));
    };

    if rest.is_empty() {
        return first
            .checked_neg()
            .map(Value::from)
            .ok_or_else(|| Error::EvalError("Integer overflow in negation".into()));
    }

    let mut result = *first;
    for n in rest {
        result = result
            .checked_sub(*n)
            .ok_or_else(|| Error::EvalError("Integer overflow in subtraction".into()))?;
    }
    Ok(Value::from(result))
}

fn builtin_mul(args: Vec<Value>) -> Result<Value, Error> {
    let mut product: NumberType = 1;
    for n in numbers(args)? {
        product = product
            .checked_mul(n)
            .ok_or_else(|| Error::EvalError("Integer overflow in multiplication".into()))?;
    }
    Ok(Value::from(product))
}

fn builtin_div(args: Vec<Value>) -> Result<Value, Error> {
    let nums = numbers(args)?;
    let Some((first, rest)) = nums.split_first() else {
        return Err(Error::arity_error(ArityKind::Insufficient, 2, 0));
    };

    let mut result = *first;
    for n in rest {
        if *n == 0 {
            return Err(Error::EvalError("Division by zero".into()));
        }
        result = result
            .checked_div(*n)
            .ok_or_else(|| Error::EvalError("Integer overflow in division".into()))?;
    }
    Ok(Value::from(result))
}

fn builtin_zero(args: Vec<Value>) -> Result<Value, Error> {
    let n: NumberType = single(args)?.try_into()?;
    Ok(Value::from(n == 0))
}

fn builtin_not(args: Vec<Value>) -> Result<Value, Error> {
    let b: bool = single(args)?.try_into()?;
    Ok(Value::from(!b))
}

fn builtin_list(args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::List(args))
}

fn builtin_cons(args: Vec<Value>) -> Result<Value, Error> {
    match pair(args)? {
        (first, Value::List(tail)) => {
            let mut list = Vec::with_capacity(tail.len() + 1);
            list.push(first);
            list.extend(tail);
            Ok(Value::List(list))
        }
        (first, Value::Atom(Atom::Nil)) => Ok(Value::List(vec![first])),
        (_, other) => Err(Error::TypeError(format!(
            "cons requires a list as second argument, got '{other}'"
        ))),
    }
}

fn builtin_car(args: Vec<Value>) -> Result<Value, Error> {
    match single(args)? {
        Value::List(list) => Ok(list.into_iter().next().unwrap_or_else(nil)),
        Value::Atom(Atom::Nil) => Ok(nil()),
        other => Err(Error::TypeError(format!("car requires a list, got '{other}'"))),
    }
}

fn builtin_cdr(args: Vec<Value>) -> Result<Value, Error> {
    match single(args)? {
        Value::List(list) => Ok(Value::List(list.into_iter().skip(1).collect())),
        Value::Atom(Atom::Nil) => Ok(nil()),
        other => Err(Error::TypeError(format!("cdr requires a list, got '{other}'"))),
    }
}

fn builtin_is_nil(args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::from(single(args)?.is_nil()))
}

fn builtin_is_atom(args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::from(matches!(single(args)?, Value::Atom(_))))
}

fn builtin_is_symbol(args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::from(matches!(single(args)?, Value::Symbol(_))))
}

fn builtin_is_promise(args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::from(matches!(single(args)?, Value::Promise(_))))
}

fn builtin_is_realized(args: Vec<Value>) -> Result<Value, Error> {
    match single(args)? {
        Value::Promise(promise) => Ok(Value::from(promise.is_realized())),
        other => Err(Error::TypeError(format!(
            "realized? requires a promise, got '{other}'"
        ))),
    }
}

fn builtin_gensym(_args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::Symbol(format!("G__{}", next_id())))
}

fn builtin_error(args: Vec<Value>) -> Result<Value, Error> {
    let parts: Vec<String> = args.iter().map(Value::to_symbol_text).collect();

    let message = if parts.is_empty() {
        "Error".to_owned()
    } else {
        parts.join(" ")
    };

    Err(Error::EvalError(message))
}

/// Global registry of all built-in operations
pub static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn op(id: &'static str, arity: Arity, func: NativeFn) -> BuiltinOp {
        BuiltinOp { id, func, arity }
    }

    vec![
        // Arithmetic operations
        op("+", Arity::Any, builtin_add),
        op("-", Arity::AtLeast(1), builtin_sub),
        op("*", Arity::Any, builtin_mul),
        op("/", Arity::AtLeast(2), builtin_div),
        // Comparison operations
        op("=", Arity::AtLeast(2), builtin_eq),
        op("<", Arity::AtLeast(2), builtin_lt),
        op(">", Arity::AtLeast(2), builtin_gt),
        op("<=", Arity::AtLeast(2), builtin_le),
        op(">=", Arity::AtLeast(2), builtin_ge),
        op("zero?", Arity::Exact(1), builtin_zero),
        // Logical operations
        op("not", Arity::Exact(1), builtin_not),
        // List operations
        op("list", Arity::Any, builtin_list),
        op("cons", Arity::Exact(2), builtin_cons),
        op("car", Arity::Exact(1), builtin_car),
        op("cdr", Arity::Exact(1), builtin_cdr),
        // Predicates
        op("nil?", Arity::Exact(1), builtin_is_nil),
        op("atom?", Arity::Exact(1), builtin_is_atom),
        op("symbol?", Arity::Exact(1), builtin_is_symbol),
        op("promise?", Arity::Exact(1), builtin_is_promise),
        op("realized?", Arity::Exact(1), builtin_is_realized),
        // Misc
        op("gensym", Arity::Exact(0), builtin_gensym),
        op("error", Arity::Any, builtin_error),
    ]
});

/// Find a builtin operation by its identifier
pub fn find_builtin_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_OPS.iter().find(|op| op.id == id)
}

/// Bind every registry entry, plus `nil`, in the global frame
pub fn install_builtin_ops(env: &Environment) {
    for op in BUILTIN_OPS.iter() {
        env.register_builtin_function(op.id, op.arity, op.func);
    }
    env.set_global("nil", nil());
    tracing::debug!(count = BUILTIN_OPS.len(), "installed builtin functions");
}

impl Environment {
    /// Register a host function as a global native closure.
    ///
    /// The function receives its evaluated arguments with the rest list flattened; arity
    /// is checked before it is called.
    ///
    /// ```
    /// use yalix::ast::val;
    /// use yalix::builtinops::Arity;
    /// use yalix::evaluator::create_global_env;
    ///
    /// let env = create_global_env();
    /// env.register_builtin_function("answer", Arity::Exact(0), |_| Ok(val(42)));
    /// assert!(env.includes("answer"));
    /// ```
    pub fn register_builtin_function<F>(&self, name: &str, arity: Arity, func: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, Error> + 'static,
    {
        let lambda = Lambda::native(arity.formals(), Rc::new(func));
        let closure = Closure::new(Rc::new(lambda), self.clone());
        self.set_global(name, Value::Closure(Rc::new(closure)));
    }
}
