#![cfg(feature = "reader")]
#![expect(clippy::unwrap_used)] // test code OK

use std::cell::Cell;
use std::rc::Rc;
use yalix::ast::{Closure, Lambda, Value, nil, sym, val};
use yalix::builtinops::Arity;
use yalix::evaluator::{CallSite, Environment, create_global_env, eval};
use yalix::reader::{parse_expression, parse_program};
use yalix::{ArityKind, Error};

/// Evaluate every expression of `source` in order, returning the last result
fn run(env: &Environment, source: &str) -> Result<Value, Error> {
    let mut result = nil();
    for expr in parse_program(source)? {
        result = eval(&expr, env)?;
    }
    Ok(result)
}

#[test]
fn extension_never_disturbs_earlier_environments() {
    let env = Environment::new();
    let once = env.extend("x", val("a"));
    let twice = once.extend("x", val("b"));

    assert!(env.lookup("x").is_err());
    assert_eq!(once.lookup("x").unwrap(), val("a"));
    assert_eq!(twice.lookup("x").unwrap(), val("b"));
}

#[test]
fn globals_and_locals_do_not_bleed() {
    let env = Environment::new();
    env.set_global("a", val(12));
    let derived = env.extend("a", val(16));

    env.set_global("a", val(99));
    assert_eq!(derived.lookup("a").unwrap(), val(16));

    derived.set_local("a", val(3)).unwrap();
    assert_eq!(env.lookup("a").unwrap(), val(99));
    assert_eq!(derived.lookup("a").unwrap(), val(3));
}

#[test]
fn arity_errors_for_fixed_closures() {
    let env = create_global_env();
    run(&env, "(define (pair a b) (list a b))").unwrap();

    assert_eq!(
        run(&env, "(pair 1)").unwrap_err(),
        Error::arity_error_with_expr(ArityKind::Insufficient, 2, 1, "pair".into())
    );
    assert_eq!(
        run(&env, "(pair 1 2 3)").unwrap_err(),
        Error::arity_error_with_expr(ArityKind::Excessive, 2, 3, "pair".into())
    );
    assert_eq!(run(&env, "(pair 1 2)").unwrap(), val([1, 2]));
}

#[test]
fn variadic_binding_and_native_sum() {
    let env = create_global_env();
    assert_eq!(
        run(&env, "((lambda (x . rest) (list x rest)) 15 11 9 3)").unwrap(),
        val(vec![val(15), val([11, 9, 3])])
    );
    assert_eq!(run(&env, "(+ 15 11 9 3)").unwrap(), val(38));
}

#[test]
fn promise_computes_once() {
    let env = create_global_env();
    let runs = Rc::new(Cell::new(0));
    let counter = Rc::clone(&runs);
    env.register_builtin_function("five", Arity::Exact(0), move |_| {
        counter.set(counter.get() + 1);
        Ok(val(5))
    });

    let promise = run(&env, "(delay (five))").unwrap();
    let target = sym("p");
    for _ in 0..2 {
        let forced = promise.apply(&env, &CallSite::new(&target, &[])).unwrap();
        assert_eq!(forced, val(5));
    }
    assert_eq!(runs.get(), 1);

    // forcing through the language is the same cached value
    env.set_global("p", promise);
    assert_eq!(run(&env, "(p)").unwrap(), val(5));
    assert_eq!(run(&env, "(realized? p)").unwrap(), val(true));
    assert_eq!(runs.get(), 1);
}

#[test]
fn recursive_factorial() {
    let env = create_global_env();
    let result = run(
        &env,
        "(define factorial
           (lambda (x)
             (if (zero? x)
                 1
                 (* x (factorial (- x 1))))))
         (factorial 10)",
    )
    .unwrap();
    assert_eq!(result, val(3628800));
}

#[test]
fn let_binding_shapes() {
    let env = create_global_env();
    assert_eq!(
        run(&env, "(let (f \"Hello\") (list f f))").unwrap(),
        val(["Hello", "Hello"])
    );
    assert_eq!(
        run(&env, "(let (f \"Hello\" 3) (list f f))").unwrap_err(),
        Error::arity_error(ArityKind::Excessive, 2, 3)
    );
}

#[test]
fn quote_leaves_elements_unevaluated() {
    let env = create_global_env();
    let result = eval(&parse_expression("(quote (1 2 (quote hello)))").unwrap(), &env).unwrap();
    let Value::List(items) = result else {
        panic!("expected a list");
    };
    assert_eq!(items.len(), 3);
    assert_eq!(items[2], val(vec![sym("quote"), sym("hello")]));
}

#[test]
fn syntax_quote_renames_per_expansion() {
    let env = create_global_env();
    let template = parse_expression("(syntax-quote (let (bob# 1) bob#))").unwrap();

    let rename_of = |expansion: Value| -> (Value, Value) {
        let Value::List(items) = expansion else {
            panic!("expected a list");
        };
        let Value::List(binding) = &items[1] else {
            panic!("expected a binding form");
        };
        (binding[0].clone(), items[2].clone())
    };

    let (first_bound, first_used) = rename_of(eval(&template, &env).unwrap());
    let (second_bound, second_used) = rename_of(eval(&template, &env).unwrap());

    assert_eq!(first_bound, first_used);
    assert_eq!(second_bound, second_used);
    assert_ne!(first_bound, second_bound);
    assert_ne!(first_bound, sym("bob#"));
}

#[test]
fn hygienic_expansion_evaluates() {
    let env = create_global_env();
    let expansion = run(&env, "`(let (tmp# 21) (+ tmp# tmp#))").unwrap();
    assert_eq!(eval(&expansion, &env).unwrap(), val(42));
}

#[test]
fn let_star_sees_earlier_bindings() {
    let env = create_global_env();
    assert_eq!(
        run(&env, "(let* ((a 2) (b (* a 10)) (c (+ a b))) c)").unwrap(),
        val(22)
    );
}

#[test]
fn deep_recursion_is_an_error_not_a_crash() {
    let env = create_global_env();
    env.set_call_depth_limit(48);
    run(&env, "(define (down n) (if (zero? n) 'done (down (- n 1))))").unwrap();

    assert_eq!(run(&env, "(down 20)").unwrap(), sym("done"));
    let err = run(&env, "(down 100000)").unwrap_err();
    assert!(matches!(err, Error::EvalError(_)), "unexpected {err:?}");
}

#[test]
fn default_depth_limit_fires_before_the_thread_stack_runs_out() {
    // the default size for spawned threads, and for the test harness's own
    let handle = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(|| {
            let env = create_global_env();
            run(&env, "(define (sum n) (if (zero? n) 0 (+ n (sum (- n 1)))))").unwrap();
            // values hold `Rc`s, so only their printed form leaves the thread
            let sum = |n: i64| run(&env, &format!("(sum {n})")).map(|v| v.to_string());
            (sum(30), [120, 1000, 100000].map(sum))
        })
        .unwrap();

    let (shallow, deep) = handle.join().unwrap();
    assert_eq!(shallow.unwrap(), "465");
    for result in deep {
        let err = result.unwrap_err();
        assert!(
            matches!(&err, Error::EvalError(msg) if msg.contains("depth limit")),
            "unexpected {err:?}"
        );
    }
}

#[test]
fn set_updates_a_local_seen_by_closures() {
    let env = create_global_env();
    assert_eq!(
        run(&env, "(let (froobe 43) (set! froobe 91) (+ froobe 11))").unwrap(),
        val(102)
    );
    assert_eq!(
        run(
            &env,
            "(let (x 1)
               (define peek (lambda () x))
               (set! x 2)
               (peek))"
        )
        .unwrap(),
        val(2)
    );

    let err = run(&env, "(set! froobe 91)").unwrap_err();
    assert_eq!(err, Error::AssignmentError("froobe".into()));

    // globals are not assignable with set!
    run(&env, "(define g 1)").unwrap();
    assert!(run(&env, "(set! g 2)").is_err());
    assert_eq!(run(&env, "g").unwrap(), val(1));
}

#[test]
fn letrec_supports_recursive_local_functions() {
    let env = create_global_env();
    run(
        &env,
        "(define (sum-below n)
           (letrec ((accum (λ (x)
                             (if (< x n)
                                 (+ x (accum (+ x 1)))
                                 0))))
             (accum 0)))",
    )
    .unwrap();
    assert_eq!(run(&env, "(sum-below 10)").unwrap(), val(45));

    let result = run(
        &env,
        "(letrec ((even? (lambda (n) (if (zero? n) #t (odd? (- n 1)))))
                  (odd? (lambda (n) (if (zero? n) #f (even? (- n 1))))))
           (list (even? 10) (odd? 7) (even? 3)))",
    )
    .unwrap();
    assert_eq!(result, val([true, true, false]));
    assert!(!env.includes("even?"));
}

#[test]
fn letrec_function_can_be_returned() {
    let env = create_global_env();
    run(
        &env,
        "(define countdown
           (letrec ((down (lambda (n) (if (zero? n) 'done (down (- n 1))))))
             down))",
    )
    .unwrap();
    assert_eq!(run(&env, "(countdown 5)").unwrap(), sym("done"));
}

#[test]
fn eval_runs_data_as_code() {
    let env = create_global_env();
    assert_eq!(run(&env, "(eval '(+ 1 2))").unwrap(), val(3));
    assert_eq!(run(&env, "(eval (list '* 6 7))").unwrap(), val(42));
    assert_eq!(run(&env, "(let (x 5) (eval 'x))").unwrap(), val(5));
    assert_eq!(run(&env, "(eval 7)").unwrap(), val(7));
}

#[test]
fn symbol_form_resolves_names() {
    let env = create_global_env();
    run(&env, "(define answer 42)").unwrap();
    assert_eq!(run(&env, "(symbol \"answer\")").unwrap(), val(42));
}

#[test]
fn define_inside_let_is_global() {
    let env = create_global_env();
    run(&env, "(let (v 7) (define seen v))").unwrap();
    assert_eq!(run(&env, "seen").unwrap(), val(7));
    assert!(run(&env, "v").is_err());
}

#[test]
fn independent_interpreters_do_not_share_globals() {
    let first = create_global_env();
    let second = create_global_env();
    run(&first, "(define only-here 1)").unwrap();

    assert!(first.includes("only-here"));
    assert!(!second.includes("only-here"));
}

#[test]
fn closure_built_by_hand() {
    let env = create_global_env();
    let lambda = Lambda::new(vec!["n".into()], vec![parse_expression("(* n n)").unwrap()]);
    env.set_global(
        "square",
        Value::Closure(Rc::new(Closure::new(Rc::new(lambda), env.clone()))),
    );
    assert_eq!(run(&env, "(square 12)").unwrap(), val(144));
}

#[test]
fn errors_abort_the_whole_evaluation() {
    let env = create_global_env();
    let err = run(&env, "(list 1 (car 2) (undefined))").unwrap_err();
    assert!(matches!(err, Error::TypeError(_)), "unexpected {err:?}");

    let err = run(&env, "(if (error \"stop\" 1) 2 3)").unwrap_err();
    assert_eq!(err, Error::EvalError("stop 1".into()));
}
