//! Special-form dispatcher.
//!
//! Special forms are ordinary global bindings whose value is a
//! [`Value::SpecialForm`]. Applying one looks its transformer up by name in
//! [`SPECIAL_FORMS`]; the transformer turns the call-site's *unevaluated* arguments
//! into a [`Form`], which is then evaluated in the caller's environment. This is what
//! lets `if` skip its untaken branch and `quote` skip evaluation altogether.
//!
//! | Form           | Shape                                   |
//! |----------------|-----------------------------------------|
//! | `if`           | `(if test then [else])`                 |
//! | `let`          | `(let (name expr) body...)`             |
//! | `let*`         | `(let* ((name expr)...) body...)`       |
//! | `letrec`       | `(letrec ((name expr)...) body...)`     |
//! | `set!`         | `(set! name expr)`                      |
//! | `define`       | `(define name [expr])`, `(define (name formal...) body...)` |
//! | `lambda`, `λ`  | `(lambda (formal...) body...)`          |
//! | `begin`        | `(begin expr...)`                       |
//! | `quote`        | `(quote expr)`                          |
//! | `syntax-quote` | `(syntax-quote expr)`                   |
//! | `delay`        | `(delay expr...)`                       |
//! | `symbol`       | `(symbol text)`                         |
//! | `eval`         | `(eval expr)`                           |

use crate::ast::{Atom, Lambda, Promise, Value, nil};
use crate::evaluator::{Environment, eval_body, next_id};
use crate::{ArityKind, Error};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::LazyLock;

/// Local name carrying the identifier of the active syntax-quote expansion
pub const SYNTAX_QUOTE_ID: &str = "G__syntax_quote_id";

/// Turns unevaluated arguments into a form to evaluate
pub type Transformer = fn(&[Value]) -> Result<Form, Error>;

/// Expression produced by a special-form transformer
#[derive(Debug)]
pub enum Form {
    If {
        test: Value,
        then: Value,
        otherwise: Value,
    },
    /// Sequential local bindings followed by a body; `let` always has exactly one
    Let {
        bindings: Vec<(String, Value)>,
        body: Vec<Value>,
    },
    /// Every name is bound before any expression is evaluated
    LetRec {
        bindings: Vec<(String, Value)>,
        body: Vec<Value>,
    },
    Set {
        name: String,
        expr: Value,
    },
    Define {
        name: String,
        definition: Definition,
    },
    Lambda(Lambda),
    Body(Vec<Value>),
    Quote(Value),
    SyntaxQuote(Value),
    Delay(Vec<Value>),
    Symbol(String),
    Eval(Value),
}

/// Right-hand side of a `define`
pub enum Definition {
    /// `(define name)`: bound to the unbound marker
    Declared,
    Expr(Value),
    Function(Lambda),
}

impl std::fmt::Debug for Definition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Definition::Declared => write!(f, "Declared"),
            Definition::Expr(expr) => write!(f, "Expr({expr:?})"),
            Definition::Function(lambda) => write!(f, "Function({:?})", lambda.formals()),
        }
    }
}

/// Global registry of special forms
pub static SPECIAL_FORMS: LazyLock<HashMap<&'static str, Transformer>> = LazyLock::new(|| {
    let forms: [(&'static str, Transformer); 14] = [
        ("if", transform_if),
        ("let", transform_let),
        ("let*", transform_let_star),
        ("letrec", transform_letrec),
        ("set!", transform_set),
        ("define", transform_define),
        ("lambda", transform_lambda),
        ("λ", transform_lambda),
        ("begin", |args| Ok(Form::Body(args.to_vec()))),
        ("quote", |args| Ok(Form::Quote(single_arg("quote", args)?))),
        ("syntax-quote", |args| {
            Ok(Form::SyntaxQuote(single_arg("syntax-quote", args)?))
        }),
        ("delay", |args| Ok(Form::Delay(args.to_vec()))),
        ("symbol", |args| {
            Ok(Form::Symbol(single_arg("symbol", args)?.to_symbol_text()))
        }),
        ("eval", |args| Ok(Form::Eval(single_arg("eval", args)?))),
    ];
    forms.into_iter().collect()
});

/// Bind every special form under its own name in the global frame
pub fn install_special_forms(env: &Environment) {
    for name in SPECIAL_FORMS.keys() {
        env.set_global(name, Value::SpecialForm((*name).to_owned()));
    }
    tracing::debug!(count = SPECIAL_FORMS.len(), "installed special forms");
}

/// Run the named transformer over unevaluated arguments
pub fn transform(name: &str, args: &[Value]) -> Result<Form, Error> {
    let transformer = SPECIAL_FORMS
        .get(name)
        .ok_or_else(|| Error::UnknownSpecialForm(name.to_owned()))?;
    transformer(args)
}

fn single_arg(form: &str, args: &[Value]) -> Result<Value, Error> {
    match args {
        [arg] => Ok(arg.clone()),
        [] => Err(Error::arity_error_with_expr(
            ArityKind::Insufficient,
            1,
            0,
            form.to_owned(),
        )),
        _ => Err(Error::arity_error_with_expr(
            ArityKind::Excessive,
            1,
            args.len(),
            form.to_owned(),
        )),
    }
}

fn transform_if(args: &[Value]) -> Result<Form, Error> {
    match args {
        [test, then] => Ok(Form::If {
            test: test.clone(),
            then: then.clone(),
            otherwise: nil(),
        }),
        [test, then, otherwise] => Ok(Form::If {
            test: test.clone(),
            then: then.clone(),
            otherwise: otherwise.clone(),
        }),
        [] | [_] => Err(Error::arity_error_with_expr(
            ArityKind::Insufficient,
            2,
            args.len(),
            "if".into(),
        )),
        _ => Err(Error::arity_error_with_expr(
            ArityKind::Excessive,
            3,
            args.len(),
            "if".into(),
        )),
    }
}

/// Validate one `(name expr)` binding form
fn binding_pair(form: &Value) -> Result<(String, Value), Error> {
    let Value::List(items) = form else {
        return Err(Error::TypeError(format!(
            "let binding form applied with invalid type: '{form}' is not a list"
        )));
    };
    match items.as_slice() {
        [Value::Symbol(name), expr] => Ok((name.clone(), expr.clone())),
        [other, _] => Err(Error::TypeError(format!(
            "let binding form applied with invalid type: '{other}' is not a symbol"
        ))),
        _ => {
            let kind = if items.len() < 2 {
                ArityKind::Insufficient
            } else {
                ArityKind::Excessive
            };
            Err(Error::arity_error(kind, 2, items.len()))
        }
    }
}

fn transform_let(args: &[Value]) -> Result<Form, Error> {
    let [binding, body @ ..] = args else {
        return Err(Error::arity_error_with_expr(
            ArityKind::Insufficient,
            1,
            0,
            "let".into(),
        ));
    };
    Ok(Form::Let {
        bindings: vec![binding_pair(binding)?],
        body: body.to_vec(),
    })
}

/// `((name expr)...)` followed by a body, shared by `let*` and `letrec`
fn binding_list(
    form: &str,
    args: &[Value],
) -> Result<(Vec<(String, Value)>, Vec<Value>), Error> {
    let [bindings, body @ ..] = args else {
        return Err(Error::arity_error_with_expr(
            ArityKind::Insufficient,
            1,
            0,
            form.to_owned(),
        ));
    };
    let Value::List(forms) = bindings else {
        return Err(Error::TypeError(format!(
            "{form} bindings must be a list, got '{bindings}'"
        )));
    };
    let pairs = forms.iter().map(binding_pair).collect::<Result<_, _>>()?;
    Ok((pairs, body.to_vec()))
}

fn transform_let_star(args: &[Value]) -> Result<Form, Error> {
    let (bindings, body) = binding_list("let*", args)?;
    Ok(Form::Let { bindings, body })
}

fn transform_letrec(args: &[Value]) -> Result<Form, Error> {
    let (bindings, body) = binding_list("letrec", args)?;
    for (i, (name, _)) in bindings.iter().enumerate() {
        if bindings.iter().skip(i + 1).any(|(other, _)| other == name) {
            return Err(Error::EvalError(format!(
                "'{name}' is not distinct in letrec"
            )));
        }
    }
    Ok(Form::LetRec { bindings, body })
}

fn transform_set(args: &[Value]) -> Result<Form, Error> {
    match args {
        [Value::Symbol(name), expr] => Ok(Form::Set {
            name: name.clone(),
            expr: expr.clone(),
        }),
        [other, _] => Err(Error::TypeError(format!(
            "set! target '{other}' is not a symbol"
        ))),
        _ => {
            let kind = if args.len() < 2 {
                ArityKind::Insufficient
            } else {
                ArityKind::Excessive
            };
            Err(Error::arity_error_with_expr(kind, 2, args.len(), "set!".into()))
        }
    }
}

fn formal_names(formals: &[Value]) -> Result<Vec<String>, Error> {
    formals
        .iter()
        .map(|formal| match formal {
            Value::Symbol(name) => Ok(name.clone()),
            other => Err(Error::TypeError(format!(
                "formal parameter '{other}' is not a symbol"
            ))),
        })
        .collect()
}

fn transform_lambda(args: &[Value]) -> Result<Form, Error> {
    match args {
        [Value::List(formals), body @ ..] => {
            Ok(Form::Lambda(Lambda::new(formal_names(formals)?, body.to_vec())))
        }
        [other, ..] => Err(Error::TypeError(format!(
            "lambda formals must be a list, got '{other}'"
        ))),
        [] => Err(Error::arity_error_with_expr(
            ArityKind::Insufficient,
            1,
            0,
            "lambda".into(),
        )),
    }
}

fn transform_define(args: &[Value]) -> Result<Form, Error> {
    match args {
        [] => Err(Error::TooFewArguments("define".into())),

        [Value::Symbol(name), rest @ ..] => {
            let definition = match rest {
                [] => Definition::Declared,
                [expr] => Definition::Expr(expr.clone()),
                _ => return Err(Error::TooManyArguments("define".into())),
            };
            Ok(Form::Define {
                name: name.clone(),
                definition,
            })
        }

        // (define (name formal...) body...) is sugar for a lambda
        [Value::List(signature), body @ ..] => match signature.as_slice() {
            [Value::Symbol(name), formals @ ..] => Ok(Form::Define {
                name: name.clone(),
                definition: Definition::Function(Lambda::new(
                    formal_names(formals)?,
                    body.to_vec(),
                )),
            }),
            _ => Err(Error::TypeError(format!(
                "define signature must start with a symbol, got '{}'",
                Value::List(signature.clone())
            ))),
        },

        [other, ..] => Err(Error::TypeError(format!(
            "cannot define '{other}': not a symbol"
        ))),
    }
}

impl Form {
    /// Evaluate the form in the environment the special form was applied in
    pub fn evaluate(self, env: &Environment) -> Result<Value, Error> {
        match self {
            Form::If {
                test,
                then,
                otherwise,
            } => match test.evaluate(env)? {
                Value::Atom(Atom::Bool(true)) => then.evaluate(env),
                Value::Atom(Atom::Bool(false)) => otherwise.evaluate(env),
                other => Err(Error::TypeError(format!(
                    "cannot convert '{other}' to bool"
                ))),
            },

            Form::Let { bindings, body } => {
                let mut extended = env.clone();
                for (name, expr) in bindings {
                    let value = expr.evaluate(&extended)?;
                    extended = extended.extend(&name, value);
                    extended.increase_stack_depth();
                }
                eval_body(&body, &extended)
            }

            Form::LetRec { bindings, body } => {
                let mut extended = env.clone();
                for (name, _) in &bindings {
                    extended = extended.extend(name, Value::Unbound);
                    extended.increase_stack_depth();
                }
                let result = bindings
                    .iter()
                    .try_for_each(|(name, expr)| {
                        let value = expr.evaluate(&extended)?;
                        extended.set_local(name, value)
                    })
                    .and_then(|()| eval_body(&body, &extended));

                let names: Vec<String> = bindings.into_iter().map(|(name, _)| name).collect();
                extended.release_recursive(&names);
                result
            }

            Form::Set { name, expr } => {
                let value = expr.evaluate(env)?;
                env.set_local(&name, value)?;
                Ok(nil())
            }

            Form::Define { name, definition } => {
                let value = match definition {
                    Definition::Declared => Value::Unbound,
                    Definition::Expr(expr) => expr.evaluate(env)?,
                    Definition::Function(lambda) => Value::Lambda(Rc::new(lambda)).evaluate(env)?,
                };
                tracing::debug!(name = %name, "define");
                env.set_global(&name, value);
                Ok(Value::Symbol(name))
            }

            Form::Lambda(lambda) => Value::Lambda(Rc::new(lambda)).evaluate(env),

            Form::Body(exprs) => eval_body(&exprs, env),

            Form::Quote(expr) => expr.quoted_form(env),

            Form::SyntaxQuote(expr) => {
                if env.includes_local(SYNTAX_QUOTE_ID) {
                    return expr.quoted_form(env);
                }
                let activated = env.extend(SYNTAX_QUOTE_ID, Value::Atom(Atom::Number(next_id())));
                expr.quoted_form(&activated)
            }

            Form::Delay(body) => {
                match Value::Lambda(Rc::new(Lambda::new(vec![], body))).evaluate(env)? {
                    Value::Closure(closure) => Ok(Value::Promise(Rc::new(Promise::new(closure)))),
                    other => Err(Error::TypeError(format!(
                        "delay expected a closure, got '{other}'"
                    ))),
                }
            }

            Form::Symbol(name) => Value::Symbol(name).evaluate(env),

            Form::Eval(expr) => expr.evaluate(env)?.evaluate(env),
        }
    }
}
