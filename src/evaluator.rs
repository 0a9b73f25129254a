use crate::Error;
use crate::ast::{Closure, HYGIENE_SUFFIX, Value, nil};
use crate::builtinops::install_builtin_ops;
use crate::specialforms::{SYNTAX_QUOTE_ID, install_special_forms};
use std::rc::Rc;

pub mod binding;
pub mod environment;

pub use environment::{CapturedEnvironment, Environment, next_id};

/// Target expression plus unevaluated argument expressions of one invocation
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    pub target: &'a Value,
    pub args: &'a [Value],
}

impl<'a> CallSite<'a> {
    pub fn new(target: &'a Value, args: &'a [Value]) -> Self {
        CallSite { target, args }
    }
}

/// Evaluate an expression (public API)
pub fn eval(expr: &Value, env: &Environment) -> Result<Value, Error> {
    expr.evaluate(env)
}

/// Evaluate each expression in order, yielding the last value (nil for an empty body)
pub(crate) fn eval_body(exprs: &[Value], env: &Environment) -> Result<Value, Error> {
    let mut result = nil();
    for expr in exprs {
        result = expr.evaluate(env)?;
    }
    Ok(result)
}

impl Value {
    pub fn evaluate(&self, env: &Environment) -> Result<Value, Error> {
        match self {
            Value::Atom(_) => Ok(self.clone()),

            Value::Symbol(name) => env.lookup(name),

            Value::List(elements) => {
                let [funexp, params @ ..] = elements.as_slice() else {
                    return Ok(nil());
                };

                tracing::trace!(
                    depth = env.stack_depth(),
                    "{}{}",
                    "  ".repeat(env.stack_depth()),
                    self
                );

                let _guard = env.enter_call()?;
                // Argument evaluation is up to the callee
                let callable = funexp.evaluate(env)?;
                callable.apply(env, &CallSite::new(funexp, params))
            }

            Value::Lambda(lambda) => {
                if lambda.is_variadic() {
                    let markers = lambda
                        .formals
                        .iter()
                        .filter(|f| *f == crate::ast::VARIADIC_MARKER)
                        .count();
                    let position = lambda.variadic_position();
                    if markers > 1 || position != lambda.arity().checked_sub(2) {
                        return Err(Error::MalformedLambda(format!(
                            "({})",
                            lambda.formals.join(" ")
                        )));
                    }
                }
                Ok(Value::Closure(Rc::new(Closure::new(
                    Rc::clone(lambda),
                    env.clone(),
                ))))
            }

            Value::Closure(_) | Value::SpecialForm(_) | Value::Promise(_) | Value::Unbound => {
                Ok(self.clone())
            }
        }
    }

    pub fn apply(&self, env: &Environment, call: &CallSite<'_>) -> Result<Value, Error> {
        match self {
            Value::Closure(closure) => binding::apply_closure(closure, env, call),

            Value::SpecialForm(name) => {
                let form = crate::specialforms::transform(name, call.args)?;
                form.evaluate(env)
            }

            Value::Promise(promise) => {
                if let Some(outcome) = promise.outcome.get() {
                    return outcome.clone();
                }
                tracing::trace!(promise = %self, "realizing promise");
                let outcome = binding::apply_closure(&promise.closure, env, call);
                // A re-entrant force may already have stored an outcome; the first one wins
                let _ = promise.outcome.set(outcome);
                promise
                    .outcome
                    .get()
                    .cloned()
                    .unwrap_or_else(|| Ok(nil()))
            }

            Value::Unbound => Err(Error::UnboundInvocation),

            Value::Atom(_) | Value::Symbol(_) | Value::List(_) | Value::Lambda(_) => {
                Err(Error::NotCallable(self.to_string()))
            }
        }
    }

    pub fn quoted_form(&self, env: &Environment) -> Result<Value, Error> {
        match self {
            Value::Symbol(name) => {
                if let Some(base) = name.strip_suffix(HYGIENE_SUFFIX)
                    && env.includes_local(SYNTAX_QUOTE_ID)
                {
                    let id = env.lookup(SYNTAX_QUOTE_ID)?;
                    return Ok(Value::Symbol(format!("{base}__{id}__auto__")));
                }
                Ok(self.clone())
            }

            Value::List(elements) => elements
                .iter()
                .map(|elem| elem.quoted_form(env))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),

            Value::Atom(_)
            | Value::Lambda(_)
            | Value::Closure(_)
            | Value::SpecialForm(_)
            | Value::Promise(_)
            | Value::Unbound => Ok(self.clone()),
        }
    }
}

/// Create an environment with every special form and builtin function installed globally
pub fn create_global_env() -> Environment {
    let env = Environment::new();
    install_special_forms(&env);
    install_builtin_ops(&env);
    tracing::debug!(
        globals = env.global_names().len(),
        "created global environment"
    );
    env
}
