//! Closure application: arity validation and parameter binding.
//!
//! Arguments always arrive unevaluated. Each ordinary formal takes the value of its
//! argument expression evaluated in the *caller's* environment and is bound into the
//! closure's *captured* environment. At the variadic marker the remaining arguments are
//! evaluated into a list bound to the formal after the marker, and binding stops.

use crate::ast::{Body, Closure, Lambda, VARIADIC_MARKER, Value};
use crate::evaluator::{CallSite, Environment, eval_body};
use crate::{ArityKind, Error};

/// Validate the number of supplied arguments against the lambda's formals.
/// Insufficient arity is reported before excessive arity.
pub(crate) fn check_arity(lambda: &Lambda, call: &CallSite<'_>) -> Result<(), Error> {
    let supplied = call.args.len();
    let required = lambda.variadic_position().unwrap_or(lambda.arity());

    if supplied < required {
        return Err(Error::arity_error_with_expr(
            ArityKind::Insufficient,
            required,
            supplied,
            call.target.to_string(),
        ));
    }

    if !lambda.is_variadic() && supplied != lambda.arity() {
        return Err(Error::arity_error_with_expr(
            ArityKind::Excessive,
            lambda.arity(),
            supplied,
            call.target.to_string(),
        ));
    }

    Ok(())
}

/// Extend `captured` with the formals bound to the evaluated arguments
pub(crate) fn bind(
    lambda: &Lambda,
    captured: &Environment,
    args: &[Value],
    caller: &Environment,
) -> Result<Environment, Error> {
    let mut extended = captured.clone();
    let mut remaining = args.iter();
    let mut formals = lambda.formals.iter();

    while let Some(formal) = formals.next() {
        if formal == VARIADIC_MARKER {
            let Some(rest_name) = formals.next() else {
                return Err(Error::MalformedLambda(format!(
                    "({})",
                    lambda.formals.join(" ")
                )));
            };
            let rest = remaining
                .map(|arg| arg.evaluate(caller))
                .collect::<Result<Vec<_>, _>>()?;
            extended = extended.extend(rest_name, Value::List(rest));
            break;
        }

        let Some(arg) = remaining.next() else {
            return Err(Error::arity_error(
                ArityKind::Insufficient,
                lambda.arity(),
                args.len(),
            ));
        };
        let value = arg.evaluate(caller)?;
        extended = extended.extend(formal, value);
    }

    extended.increase_stack_depth();
    Ok(extended)
}

/// Arity check, bind, then run the body in the extended environment
pub(crate) fn apply_closure(
    closure: &Closure,
    env: &Environment,
    call: &CallSite<'_>,
) -> Result<Value, Error> {
    check_arity(&closure.lambda, call)?;
    let captured = closure.env.upgrade().ok_or_else(|| {
        Error::EvalError(format!(
            "'{}' outlived the interpreter it was defined in",
            call.target
        ))
    })?;
    let extended = bind(&closure.lambda, &captured, call.args, env)?;

    match &closure.lambda.body {
        Body::Exprs(exprs) => eval_body(exprs, &extended),
        Body::Native(func) => func(native_args(&closure.lambda, &extended)?),
    }
}

/// Read the bound formals back out of the environment, flattening the rest list
fn native_args(lambda: &Lambda, env: &Environment) -> Result<Vec<Value>, Error> {
    let mut args = Vec::with_capacity(lambda.arity());
    let mut formals = lambda.formals.iter();

    while let Some(formal) = formals.next() {
        if formal == VARIADIC_MARKER {
            if let Some(rest_name) = formals.next() {
                match env.lookup(rest_name)? {
                    Value::List(rest) => args.extend(rest),
                    other => args.push(other),
                }
            }
            break;
        }
        args.push(env.lookup(formal)?);
    }

    Ok(args)
}
